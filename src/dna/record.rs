//! Classified sample, as stored and published
//!
//! JSON shape: `{"uuid": "...", "dna": ["..."], "type": "Mutant", "classified_at": "..."}`

use super::DnaKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DnaRecord {
    /// UUID v4 assigned when the sample is classified
    pub uuid: Uuid,
    pub dna: Vec<String>,
    #[serde(rename = "type")]
    pub kind: DnaKind,
    #[serde(default = "Utc::now")]
    pub classified_at: DateTime<Utc>,
}

impl DnaRecord {
    pub fn new(dna: Vec<String>, kind: DnaKind) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            dna,
            kind,
            classified_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_uses_type_field() {
        let record = DnaRecord::new(vec!["ACGT".to_string()], DnaKind::Mutant);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["type"], "Mutant");
        assert_eq!(value["dna"], json!(["ACGT"]));
        assert!(value.get("kind").is_none());
    }

    #[test]
    fn test_record_without_timestamp_parses() {
        let payload = json!({
            "uuid": "8a7c1d52-1f6e-4b7c-9d0f-5e8d2a1c3b4f",
            "dna": ["AAAA", "CCCC", "GGGG", "TTTT"],
            "type": "Human"
        });
        let record: DnaRecord = serde_json::from_value(payload).unwrap();
        assert_eq!(record.kind, DnaKind::Human);
        assert_eq!(record.dna.len(), 4);
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let payload = json!({
            "uuid": "8a7c1d52-1f6e-4b7c-9d0f-5e8d2a1c3b4f",
            "dna": [],
            "type": "Cyborg"
        });
        assert!(serde_json::from_value::<DnaRecord>(payload).is_err());
    }

    #[test]
    fn test_fresh_records_get_distinct_ids() {
        let a = DnaRecord::new(vec![], DnaKind::Human);
        let b = DnaRecord::new(vec![], DnaKind::Human);
        assert_ne!(a.uuid, b.uuid);
    }
}
