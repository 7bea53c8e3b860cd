use serde::de::DeserializeOwned;

/// One progress update delivered by the audit service.
///
/// The known fields are typed; anything else in the payload lands in `extra`
/// and is serialized back unchanged.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProgressNotification {
    /// Server-side request id, when the service includes one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub stage: String,
    pub status: String,
    /// Percent complete, `0..=100`.
    pub progress: f64,
    pub message: String,
    /// ISO-8601 timestamp as sent by the service.
    pub timestamp: String,
    /// Fields the consumer does not interpret.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ProgressNotification {
    /// Decodes a notification from a JSON payload.
    ///
    /// Only JSON objects are accepted; missing known fields take their
    /// default values.
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Returns an extension field by name.
    pub fn extra_field(&self, name: &str) -> Option<&serde_json::Value> {
        self.extra.get(name)
    }
}

/// Terminal payload of a successful session.
///
/// The consumer never inspects it; it is handed to the caller exactly as it
/// appeared in the completed frame.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct TerminalResult(serde_json::Value);

impl TerminalResult {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_value(self) -> serde_json::Value {
        self.0
    }

    /// Decodes the payload into a caller-chosen type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.0.clone())
    }

    /// Decodes the payload as a deep audit report.
    pub fn report(&self) -> Result<crate::report::DeepAuditReport, serde_json::Error> {
        self.decode()
    }
}

impl From<serde_json::Value> for TerminalResult {
    fn from(value: serde_json::Value) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extra_fields_survive_a_round_trip() {
        let payload = serde_json::json!({
            "requestId": "req-1",
            "stage": "crawl",
            "status": "running",
            "progress": 40.5,
            "message": "Crawling",
            "timestamp": "2026-01-01T00:00:00Z",
            "pagesSeen": 12,
            "hints": ["a", "b"]
        });
        let notification = ProgressNotification::from_value(payload.clone()).expect("decode");
        assert_eq!(notification.request_id.as_deref(), Some("req-1"));
        assert_eq!(notification.progress, 40.5);
        assert_eq!(
            notification.extra_field("pagesSeen"),
            Some(&serde_json::json!(12))
        );
        assert_eq!(serde_json::to_value(&notification).expect("encode"), payload);
    }

    #[test]
    fn non_object_payloads_are_rejected() {
        assert!(ProgressNotification::from_value(serde_json::json!([1, 2])).is_err());
        assert!(ProgressNotification::from_value(serde_json::json!("text")).is_err());
    }

    #[test]
    fn mistyped_known_field_is_rejected() {
        let payload = serde_json::json!({"stage": "crawl", "progress": "half"});
        assert!(ProgressNotification::from_value(payload).is_err());
    }
}
