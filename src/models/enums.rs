use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// A label that does not name any variant of the target enum.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown {field} label: {value:?}")]
pub struct UnknownLabel {
    pub field: String,
    pub value: String,
}

/// Macro to generate enum with as_str + std::str::FromStr pattern.
///
/// Variants are declared in their canonical order; `ALL` preserves it and
/// the derived `Ord` follows it. Serde goes through the label, not the
/// variant name.
macro_rules! str_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            /// Every variant, in canonical order.
            pub const ALL: &'static [$name] = &[$(Self::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::models::enums::UnknownLabel;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err($crate::models::enums::UnknownLabel {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = <String as serde::Deserialize>::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

pub(crate) use str_enum;

str_enum!(
    /// Classifier output classes. Declaration order IS the model's output
    /// index order; swapping the model must keep it.
    TumorCategory {
        Glioma => "glioma",
        Meningioma => "meningioma",
        NoTumor => "no tumor",
        Pituitary => "pituitary",
    }
);

str_enum!(
    /// Conditions of the symptom checklist. Same four concepts as
    /// `TumorCategory`, with the checklist's display names.
    Condition {
        Glioma => "Glioma",
        Meningioma => "Meningioma",
        NoTumor => "No Tumor",
        PituitaryTumor => "Pituitary Tumor",
    }
);

impl TumorCategory {
    /// Number of classes the model must emit.
    pub const COUNT: usize = 4;

    /// Position of this category in the model output vector.
    pub fn index(&self) -> usize {
        match self {
            Self::Glioma => 0,
            Self::Meningioma => 1,
            Self::NoTumor => 2,
            Self::Pituitary => 3,
        }
    }

    /// Category at a model output index.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn condition(&self) -> Condition {
        match self {
            Self::Glioma => Condition::Glioma,
            Self::Meningioma => Condition::Meningioma,
            Self::NoTumor => Condition::NoTumor,
            Self::Pituitary => Condition::PituitaryTumor,
        }
    }
}

/// Chat roles as the assistant service names them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    User,
    Model,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "model",
        }
    }

    /// Role name for transcript rendering: the model speaks as "assistant".
    pub fn display_role(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "assistant",
        }
    }
}

impl Serialize for MessageRole {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MessageRole {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        match raw.as_str() {
            "user" => Ok(Self::User),
            // Transcripts rendered for display come back with the display name.
            "model" | "assistant" => Ok(Self::Model),
            other => Err(serde::de::Error::custom(UnknownLabel {
                field: "MessageRole".into(),
                value: other.into(),
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn tumor_category_round_trip() {
        for (variant, s) in [
            (TumorCategory::Glioma, "glioma"),
            (TumorCategory::Meningioma, "meningioma"),
            (TumorCategory::NoTumor, "no tumor"),
            (TumorCategory::Pituitary, "pituitary"),
        ] {
            assert_eq!(variant.as_str(), s);
            assert_eq!(TumorCategory::from_str(s).unwrap(), variant);
        }
    }

    #[test]
    fn category_order_matches_model_indices() {
        for (i, category) in TumorCategory::ALL.iter().enumerate() {
            assert_eq!(category.index(), i);
            assert_eq!(TumorCategory::from_index(i), Some(*category));
        }
        assert_eq!(TumorCategory::ALL.len(), TumorCategory::COUNT);
        assert_eq!(TumorCategory::from_index(4), None);
    }

    #[test]
    fn condition_round_trip() {
        for (variant, s) in [
            (Condition::Glioma, "Glioma"),
            (Condition::Meningioma, "Meningioma"),
            (Condition::NoTumor, "No Tumor"),
            (Condition::PituitaryTumor, "Pituitary Tumor"),
        ] {
            assert_eq!(variant.as_str(), s);
            assert_eq!(Condition::from_str(s).unwrap(), variant);
        }
    }

    #[test]
    fn every_category_maps_to_a_distinct_condition() {
        let conditions: Vec<Condition> =
            TumorCategory::ALL.iter().map(|c| c.condition()).collect();
        assert_eq!(conditions, Condition::ALL);
    }

    #[test]
    fn serde_uses_labels() {
        let json = serde_json::to_string(&TumorCategory::NoTumor).unwrap();
        assert_eq!(json, "\"no tumor\"");
        let back: Condition = serde_json::from_str("\"Pituitary Tumor\"").unwrap();
        assert_eq!(back, Condition::PituitaryTumor);
    }

    #[test]
    fn message_role_accepts_display_name() {
        let role: MessageRole = serde_json::from_str("\"assistant\"").unwrap();
        assert_eq!(role, MessageRole::Model);
        assert_eq!(MessageRole::Model.display_role(), "assistant");
        assert_eq!(serde_json::to_string(&MessageRole::Model).unwrap(), "\"model\"");
    }

    #[test]
    fn invalid_enum_returns_error() {
        assert!(TumorCategory::from_str("Glioma").is_err());
        assert!(Condition::from_str("").is_err());
        assert!(serde_json::from_str::<MessageRole>("\"system\"").is_err());
    }
}
