//! Topic canonicalization and bus topic names

/// Normalize an MQTT topic: one leading slash, no empty segments, no
/// trailing slash (except for the root topic `/`).
pub fn canonicalize_topic(topic: &str) -> String {
    let segments: Vec<&str> = topic.split('/').filter(|s| !s.is_empty()).collect();
    format!("/{}", segments.join("/"))
}

/// Topic names used by the detector
pub struct TopicBuilder;

impl TopicBuilder {
    /// Classified records: `/dna/{service_id}/classified`
    pub fn classified_topic(service_id: &str) -> String {
        canonicalize_topic(&format!("/dna/{service_id}/classified"))
    }
}
