use crate::errors::AuditError;

const DEFAULT_CONTENT_TYPE: &str = "text/event-stream";
const DEFAULT_ERROR_FALLBACK: &str = "Audit stream failed";
const DEFAULT_COMPLETION_STAGE: &str = "response_dispatched";
const DEFAULT_COMPLETION_MESSAGE: &str = "Audit completed and final response payload sent.";

/// Configuration for the stream consumer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamConfig {
    /// Content type the response must declare (substring match, ignoring
    /// ASCII case).
    pub expected_content_type: String,
    /// Message used for `error` frames whose payload has no readable message.
    pub error_fallback_message: String,
    /// `stage` given to completion notifications that omit it.
    pub completion_stage: String,
    /// `message` given to completion notifications that omit it.
    pub completion_message: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            expected_content_type: DEFAULT_CONTENT_TYPE.to_string(),
            error_fallback_message: DEFAULT_ERROR_FALLBACK.to_string(),
            completion_stage: DEFAULT_COMPLETION_STAGE.to_string(),
            completion_message: DEFAULT_COMPLETION_MESSAGE.to_string(),
        }
    }
}

impl StreamConfig {
    /// Builds a config from defaults overridden by environment variables.
    ///
    /// - `AUDIT_STREAM_CONTENT_TYPE`
    /// - `AUDIT_STREAM_ERROR_MESSAGE`
    /// - `AUDIT_STREAM_COMPLETION_STAGE`
    /// - `AUDIT_STREAM_COMPLETION_MESSAGE`
    ///
    /// A variable that is set but blank is rejected.
    pub fn from_env() -> Result<Self, AuditError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, AuditError> {
        let mut config = Self::default();
        let overrides: [(&str, &mut String); 4] = [
            ("AUDIT_STREAM_CONTENT_TYPE", &mut config.expected_content_type),
            ("AUDIT_STREAM_ERROR_MESSAGE", &mut config.error_fallback_message),
            ("AUDIT_STREAM_COMPLETION_STAGE", &mut config.completion_stage),
            ("AUDIT_STREAM_COMPLETION_MESSAGE", &mut config.completion_message),
        ];
        for (key, slot) in overrides {
            if let Some(value) = lookup(key) {
                if value.trim().is_empty() {
                    return Err(AuditError::Config(format!("{key} must not be empty")));
                }
                *slot = value;
            }
        }
        Ok(config)
    }

    /// Overrides the expected content type.
    pub fn expected_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.expected_content_type = content_type.into();
        self
    }

    /// Overrides the fallback message for unreadable `error` frames.
    pub fn error_fallback_message(mut self, message: impl Into<String>) -> Self {
        self.error_fallback_message = message.into();
        self
    }

    pub fn completion_stage(mut self, stage: impl Into<String>) -> Self {
        self.completion_stage = stage.into();
        self
    }

    pub fn completion_message(mut self, message: impl Into<String>) -> Self {
        self.completion_message = message.into();
        self
    }

    /// Checks a declared content type against `expected_content_type`.
    pub fn accepts_content_type(&self, declared: &str) -> bool {
        declared
            .to_ascii_lowercase()
            .contains(&self.expected_content_type.to_ascii_lowercase())
    }
}
