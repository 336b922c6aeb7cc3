use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use crate::models::enums::{str_enum, Condition};

str_enum!(
    /// Every symptom the checklist can offer, in first-appearance order.
    Symptom {
        Headaches => "Headaches",
        Seizures => "Seizures",
        VisionProblems => "Vision problems",
        NauseaVomiting => "Nausea and vomiting",
        BalanceCoordination => "Difficulty with balance and coordination",
        PersonalityChanges => "Changes in personality or behavior",
        LimbWeaknessNumbness => "Weakness or numbness in limbs",
        VisionChanges => "Vision changes",
        HearingLoss => "Hearing loss or ringing in the ears",
        WeaknessNumbness => "Weakness or numbness",
        SpeechMovement => "Difficulty with speech or movement",
        NoSpecificSymptoms => "No specific symptoms related to a tumor; symptoms are typically related to other conditions.",
        WeightChange => "Unexplained weight gain or loss",
        MenstrualSexualChanges => "Changes in menstrual cycle or sexual function",
        HandFootGrowth => "Growth of hands and feet (in case of acromegaly)",
        Fatigue => "Fatigue",
        MoodCognitiveChanges => "Changes in mood or cognitive functions",
    }
);

/// Reference table: which symptoms each condition lists.
///
/// Built once, read-only afterwards. A symptom may belong to several
/// conditions; the reverse index answers that in one lookup.
#[derive(Debug, Clone)]
pub struct SymptomCatalog {
    entries: Vec<(Condition, Vec<Symptom>)>,
    by_symptom: BTreeMap<Symptom, BTreeSet<Condition>>,
}

static STANDARD: OnceLock<SymptomCatalog> = OnceLock::new();

impl SymptomCatalog {
    /// Build a catalog from condition → symptoms entries.
    ///
    /// Duplicate symptoms inside one condition are collapsed; entry order
    /// is kept as the display order.
    pub fn from_entries(entries: Vec<(Condition, Vec<Symptom>)>) -> Self {
        let mut by_symptom: BTreeMap<Symptom, BTreeSet<Condition>> = BTreeMap::new();
        let entries: Vec<(Condition, Vec<Symptom>)> = entries
            .into_iter()
            .map(|(condition, symptoms)| {
                let mut seen = BTreeSet::new();
                let unique: Vec<Symptom> =
                    symptoms.into_iter().filter(|s| seen.insert(*s)).collect();
                for symptom in &unique {
                    by_symptom.entry(*symptom).or_default().insert(condition);
                }
                (condition, unique)
            })
            .collect();

        Self { entries, by_symptom }
    }

    /// The brain-tumor checklist shipped with the application.
    pub fn standard() -> &'static SymptomCatalog {
        STANDARD.get_or_init(|| {
            use Symptom::*;
            Self::from_entries(vec![
                (
                    Condition::Glioma,
                    vec![
                        Headaches,
                        Seizures,
                        VisionProblems,
                        NauseaVomiting,
                        BalanceCoordination,
                        PersonalityChanges,
                        LimbWeaknessNumbness,
                    ],
                ),
                (
                    Condition::Meningioma,
                    vec![
                        Headaches,
                        Seizures,
                        VisionChanges,
                        HearingLoss,
                        NauseaVomiting,
                        WeaknessNumbness,
                        SpeechMovement,
                    ],
                ),
                (Condition::NoTumor, vec![NoSpecificSymptoms]),
                (
                    Condition::PituitaryTumor,
                    vec![
                        Headaches,
                        VisionProblems,
                        WeightChange,
                        MenstrualSexualChanges,
                        HandFootGrowth,
                        Fatigue,
                        MoodCognitiveChanges,
                    ],
                ),
            ])
        })
    }

    pub fn entries(&self) -> &[(Condition, Vec<Symptom>)] {
        &self.entries
    }

    pub fn conditions(&self) -> impl Iterator<Item = Condition> + '_ {
        self.entries.iter().map(|(c, _)| *c)
    }

    /// Symptoms listed for a condition (empty if the condition is absent).
    pub fn symptoms_for(&self, condition: Condition) -> &[Symptom] {
        self.entries
            .iter()
            .find(|(c, _)| *c == condition)
            .map(|(_, s)| s.as_slice())
            .unwrap_or(&[])
    }

    /// Conditions that list a symptom.
    pub fn conditions_for(&self, symptom: Symptom) -> Option<&BTreeSet<Condition>> {
        self.by_symptom.get(&symptom)
    }

    /// Checkbox list: each symptom once, in first-appearance order.
    pub fn checklist(&self) -> Vec<Symptom> {
        let mut seen = BTreeSet::new();
        self.entries
            .iter()
            .flat_map(|(_, symptoms)| symptoms.iter().copied())
            .filter(|s| seen.insert(*s))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn standard_catalog_lists_four_conditions() {
        let catalog = SymptomCatalog::standard();
        let conditions: Vec<Condition> = catalog.conditions().collect();
        assert_eq!(conditions, Condition::ALL);
    }

    #[test]
    fn standard_catalog_symptom_counts() {
        let catalog = SymptomCatalog::standard();
        assert_eq!(catalog.symptoms_for(Condition::Glioma).len(), 7);
        assert_eq!(catalog.symptoms_for(Condition::Meningioma).len(), 7);
        assert_eq!(catalog.symptoms_for(Condition::NoTumor).len(), 1);
        assert_eq!(catalog.symptoms_for(Condition::PituitaryTumor).len(), 7);
    }

    #[test]
    fn shared_symptoms_map_to_every_condition() {
        let catalog = SymptomCatalog::standard();
        let headaches = catalog.conditions_for(Symptom::Headaches).unwrap();
        assert_eq!(headaches.len(), 3);
        assert!(!headaches.contains(&Condition::NoTumor));

        let seizures = catalog.conditions_for(Symptom::Seizures).unwrap();
        assert_eq!(
            seizures.iter().copied().collect::<Vec<_>>(),
            vec![Condition::Glioma, Condition::Meningioma]
        );
    }

    #[test]
    fn checklist_is_deduplicated_in_first_appearance_order() {
        let checklist = SymptomCatalog::standard().checklist();
        assert_eq!(checklist.len(), Symptom::ALL.len());
        assert_eq!(checklist, Symptom::ALL);
    }

    #[test]
    fn duplicate_symptoms_in_entry_are_collapsed() {
        let catalog = SymptomCatalog::from_entries(vec![(
            Condition::Glioma,
            vec![Symptom::Fatigue, Symptom::Fatigue, Symptom::Seizures],
        )]);
        assert_eq!(
            catalog.symptoms_for(Condition::Glioma),
            &[Symptom::Fatigue, Symptom::Seizures]
        );
    }

    #[test]
    fn missing_condition_has_no_symptoms() {
        let catalog = SymptomCatalog::from_entries(vec![]);
        assert!(catalog.symptoms_for(Condition::Glioma).is_empty());
        assert!(catalog.conditions_for(Symptom::Headaches).is_none());
    }

    #[test]
    fn symptom_labels_parse() {
        assert_eq!(
            Symptom::from_str("Hearing loss or ringing in the ears").unwrap(),
            Symptom::HearingLoss
        );
        assert!(Symptom::from_str("headaches").is_err());
    }
}
