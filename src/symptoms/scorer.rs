use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use thiserror::Error;

use super::catalog::{Symptom, SymptomCatalog};
use crate::models::enums::Condition;

pub const EMPTY_SELECTION_MESSAGE: &str = "Please select at least one symptom.";
pub const AMBIGUOUS_MESSAGE: &str =
    "There may be a clash between multiple conditions. Please consult a doctor.";
pub const NO_MATCH_MESSAGE: &str =
    "No matching conditions found. Please consult a doctor for further evaluation.";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScoreError {
    #[error("{}", EMPTY_SELECTION_MESSAGE)]
    EmptySelection,

    #[error("Unknown symptom: {0:?}")]
    UnknownSymptom(String),
}

/// Match ratio of one condition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionScore {
    pub condition: Condition,
    pub matched: usize,
    pub total: usize,
    /// matched / total × 100, in [0, 100].
    pub percentage: f64,
}

impl ConditionScore {
    fn new(condition: Condition, matched: usize, total: usize) -> Self {
        let percentage = if total == 0 {
            0.0
        } else {
            matched as f64 / total as f64 * 100.0
        };
        Self {
            condition,
            matched,
            total,
            percentage,
        }
    }

    /// Exact ratio comparison (cross-multiplied), so 1/2 and 2/4 tie.
    fn cmp_ratio(&self, other: &Self) -> Ordering {
        let lhs = self.matched * other.total.max(1);
        let rhs = other.matched * self.total.max(1);
        lhs.cmp(&rhs)
    }

    /// Percentage formatted as in the checklist result ("28.57%").
    pub fn formatted(&self) -> String {
        format!("{:.2}%", self.percentage)
    }
}

/// Which guidance applies to a score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScoreSignal {
    /// One condition has the strictly highest ratio.
    Leading { condition: Condition },
    /// Several conditions share the highest ratio.
    Ambiguous { conditions: Vec<Condition> },
    /// The highest ratio is zero.
    NoMatch,
}

impl ScoreSignal {
    /// Guidance text for the user, when the signal calls for one.
    pub fn guidance(&self) -> Option<&'static str> {
        match self {
            Self::Leading { .. } => None,
            Self::Ambiguous { .. } => Some(AMBIGUOUS_MESSAGE),
            Self::NoMatch => Some(NO_MATCH_MESSAGE),
        }
    }
}

/// Full scoring result: every condition's score plus the signal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosisScore {
    pub selected: Vec<Symptom>,
    pub scores: Vec<ConditionScore>,
    pub signal: ScoreSignal,
}

impl DiagnosisScore {
    /// Condition → percentage view of the scores.
    pub fn percentages(&self) -> BTreeMap<Condition, f64> {
        self.scores
            .iter()
            .map(|s| (s.condition, s.percentage))
            .collect()
    }

    pub fn percentage_of(&self, condition: Condition) -> Option<f64> {
        self.scores
            .iter()
            .find(|s| s.condition == condition)
            .map(|s| s.percentage)
    }
}

/// Score a symptom selection against every condition of the catalog.
///
/// Each condition is scored independently; percentages do not sum to 100.
/// An empty selection is rejected before any computation.
pub fn score(
    catalog: &SymptomCatalog,
    selected: &BTreeSet<Symptom>,
) -> Result<DiagnosisScore, ScoreError> {
    if selected.is_empty() {
        return Err(ScoreError::EmptySelection);
    }

    let scores: Vec<ConditionScore> = catalog
        .entries()
        .iter()
        .map(|(condition, symptoms)| {
            let matched = symptoms.iter().filter(|s| selected.contains(s)).count();
            ConditionScore::new(*condition, matched, symptoms.len())
        })
        .collect();

    let signal = classify_signal(&scores);
    tracing::debug!(
        selected = selected.len(),
        signal = ?signal,
        "Symptom selection scored"
    );

    Ok(DiagnosisScore {
        selected: selected.iter().copied().collect(),
        scores,
        signal,
    })
}

/// Parse checklist labels, then score them.
///
/// Labels must match a symptom exactly; duplicates are ignored.
pub fn score_labels<S: AsRef<str>>(
    catalog: &SymptomCatalog,
    labels: &[S],
) -> Result<DiagnosisScore, ScoreError> {
    let selected = parse_selection(labels)?;
    score(catalog, &selected)
}

/// Turn checklist labels into a symptom set.
pub fn parse_selection<S: AsRef<str>>(labels: &[S]) -> Result<BTreeSet<Symptom>, ScoreError> {
    labels
        .iter()
        .map(|label| {
            let label = label.as_ref();
            label
                .parse::<Symptom>()
                .map_err(|_| ScoreError::UnknownSymptom(label.to_string()))
        })
        .collect()
}

fn classify_signal(scores: &[ConditionScore]) -> ScoreSignal {
    let Some(best) = scores.iter().max_by(|a, b| a.cmp_ratio(b)) else {
        return ScoreSignal::NoMatch;
    };

    if best.matched == 0 {
        return ScoreSignal::NoMatch;
    }

    let leaders: Vec<Condition> = scores
        .iter()
        .filter(|s| s.cmp_ratio(best) == Ordering::Equal)
        .map(|s| s.condition)
        .collect();

    if leaders.len() > 1 {
        ScoreSignal::Ambiguous {
            conditions: leaders,
        }
    } else {
        ScoreSignal::Leading {
            condition: best.condition,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selection(symptoms: &[Symptom]) -> BTreeSet<Symptom> {
        symptoms.iter().copied().collect()
    }

    #[test]
    fn headaches_and_seizures_are_ambiguous() {
        let result = score(
            SymptomCatalog::standard(),
            &selection(&[Symptom::Headaches, Symptom::Seizures]),
        )
        .unwrap();

        assert_eq!(
            result.signal,
            ScoreSignal::Ambiguous {
                conditions: vec![Condition::Glioma, Condition::Meningioma]
            }
        );
        assert_eq!(result.signal.guidance(), Some(AMBIGUOUS_MESSAGE));
        let glioma = result.percentage_of(Condition::Glioma).unwrap();
        let meningioma = result.percentage_of(Condition::Meningioma).unwrap();
        assert_eq!(glioma, meningioma);
        assert!((glioma - 200.0 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn full_mapping_returned_with_signal() {
        let result = score(
            SymptomCatalog::standard(),
            &selection(&[Symptom::Headaches, Symptom::Seizures]),
        )
        .unwrap();
        let percentages = result.percentages();
        assert_eq!(percentages.len(), 4);
        assert_eq!(percentages[&Condition::NoTumor], 0.0);
        assert!((percentages[&Condition::PituitaryTumor] - 100.0 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn single_leader_is_reported() {
        let result = score(
            SymptomCatalog::standard(),
            &selection(&[Symptom::Fatigue, Symptom::WeightChange]),
        )
        .unwrap();
        assert_eq!(
            result.signal,
            ScoreSignal::Leading {
                condition: Condition::PituitaryTumor
            }
        );
        assert_eq!(result.signal.guidance(), None);
    }

    #[test]
    fn no_tumor_entry_scores_one_hundred_percent() {
        let result = score(
            SymptomCatalog::standard(),
            &selection(&[Symptom::NoSpecificSymptoms]),
        )
        .unwrap();
        assert_eq!(result.percentage_of(Condition::NoTumor), Some(100.0));
        assert_eq!(
            result.signal,
            ScoreSignal::Leading {
                condition: Condition::NoTumor
            }
        );
    }

    #[test]
    fn zero_match_yields_no_match_signal() {
        // Fatigue is not listed anywhere in this catalog.
        let catalog = SymptomCatalog::from_entries(vec![
            (Condition::Glioma, vec![Symptom::Headaches, Symptom::Seizures]),
            (Condition::Meningioma, vec![Symptom::HearingLoss]),
        ]);
        let result = score(&catalog, &selection(&[Symptom::Fatigue])).unwrap();

        assert!(result.scores.iter().all(|s| s.percentage == 0.0));
        assert_eq!(result.signal, ScoreSignal::NoMatch);
        assert_eq!(result.signal.guidance(), Some(NO_MATCH_MESSAGE));
    }

    #[test]
    fn empty_selection_is_rejected() {
        let err = score(SymptomCatalog::standard(), &BTreeSet::new()).unwrap_err();
        assert_eq!(err, ScoreError::EmptySelection);
        assert_eq!(err.to_string(), EMPTY_SELECTION_MESSAGE);
    }

    #[test]
    fn label_order_does_not_change_result() {
        let catalog = SymptomCatalog::standard();
        let forward = score_labels(catalog, &["Fatigue", "Headaches", "Vision changes"]).unwrap();
        let backward = score_labels(catalog, &["Vision changes", "Headaches", "Fatigue"]).unwrap();
        assert_eq!(forward, backward);
    }

    #[test]
    fn scoring_is_idempotent() {
        let catalog = SymptomCatalog::standard();
        let picked = selection(&[Symptom::Seizures, Symptom::VisionProblems]);
        let first = score(catalog, &picked).unwrap();
        let second = score(catalog, &picked).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn unknown_label_is_rejected() {
        let err = score_labels(SymptomCatalog::standard(), &["Headaches", "Hiccups"]).unwrap_err();
        assert_eq!(err, ScoreError::UnknownSymptom("Hiccups".into()));
    }

    #[test]
    fn duplicate_labels_count_once() {
        let result =
            score_labels(SymptomCatalog::standard(), &["Fatigue", "Fatigue"]).unwrap();
        assert_eq!(result.selected, vec![Symptom::Fatigue]);
        let pituitary = result
            .scores
            .iter()
            .find(|s| s.condition == Condition::PituitaryTumor)
            .unwrap();
        assert_eq!(pituitary.matched, 1);
    }

    #[test]
    fn equal_proportions_with_different_totals_tie() {
        let catalog = SymptomCatalog::from_entries(vec![
            (Condition::Glioma, vec![Symptom::Headaches, Symptom::Seizures]),
            (
                Condition::Meningioma,
                vec![
                    Symptom::Headaches,
                    Symptom::HearingLoss,
                    Symptom::VisionChanges,
                    Symptom::Fatigue,
                ],
            ),
        ]);
        let result = score(
            &catalog,
            &selection(&[Symptom::Headaches, Symptom::HearingLoss]),
        )
        .unwrap();
        assert!(matches!(result.signal, ScoreSignal::Ambiguous { .. }));
    }

    #[test]
    fn formatted_percentage_has_two_decimals() {
        let score = ConditionScore::new(Condition::Glioma, 2, 7);
        assert_eq!(score.formatted(), "28.57%");
    }

    #[test]
    fn condition_without_symptoms_scores_zero() {
        let score = ConditionScore::new(Condition::NoTumor, 0, 0);
        assert_eq!(score.percentage, 0.0);
    }
}
