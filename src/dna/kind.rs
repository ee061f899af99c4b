//! Classification outcome

use super::DnaError;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Result of classifying a DNA grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DnaKind {
    Mutant,
    Human,
}

impl DnaKind {
    pub const ALL: [DnaKind; 2] = [DnaKind::Mutant, DnaKind::Human];

    /// Label used on the wire and as the storage key
    pub fn as_str(&self) -> &'static str {
        match self {
            DnaKind::Mutant => "Mutant",
            DnaKind::Human => "Human",
        }
    }
}

impl Display for DnaKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DnaKind {
    type Err = DnaError;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        match label {
            "Mutant" => Ok(DnaKind::Mutant),
            "Human" => Ok(DnaKind::Human),
            other => Err(DnaError::UnsupportedKind(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_parse_back() {
        for kind in DnaKind::ALL {
            assert_eq!(kind.as_str().parse::<DnaKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_label_is_unsupported() {
        let err = "Cyborg".parse::<DnaKind>().unwrap_err();
        assert!(matches!(err, DnaError::UnsupportedKind(ref label) if label == "Cyborg"));
    }

    #[test]
    fn test_labels_are_case_sensitive() {
        assert!("mutant".parse::<DnaKind>().is_err());
        assert!("HUMAN".parse::<DnaKind>().is_err());
    }

    #[test]
    fn test_serde_uses_labels() {
        assert_eq!(serde_json::to_string(&DnaKind::Mutant).unwrap(), "\"Mutant\"");
        let kind: DnaKind = serde_json::from_str("\"Human\"").unwrap();
        assert_eq!(kind, DnaKind::Human);
    }
}
