use tracing::debug;

use crate::config::StreamConfig;
use crate::notification::{ProgressNotification, TerminalResult};

/// Event-type label of a frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameLabel {
    Progress,
    Completed,
    Error,
    /// Any other label. Interpreted like `Progress`.
    Other(String),
}

impl FrameLabel {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "" | "progress" => Self::Progress,
            "completed" => Self::Completed,
            "error" => Self::Error,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Progress => "progress",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Other(label) => label,
        }
    }
}

/// A frame broken into its label and reassembled payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedFrame {
    pub label: FrameLabel,
    /// `data:` lines joined with `\n`; `None` when the frame had none.
    pub data: Option<String>,
}

/// Parses the lines of one frame.
///
/// The last `event:` line wins. Each `data:` line loses exactly one leading
/// space. Other lines (comments, `id:`, `retry:`) are ignored.
pub fn parse_frame(frame: &str) -> ParsedFrame {
    let mut label = FrameLabel::Progress;
    let mut data_lines: Vec<&str> = Vec::new();
    for raw_line in frame.split('\n') {
        let line = raw_line.strip_suffix('\r').unwrap_or(raw_line);
        if let Some(rest) = line.strip_prefix("event:") {
            label = FrameLabel::parse(rest.trim());
        } else if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }
    let data = if data_lines.is_empty() {
        None
    } else {
        Some(data_lines.join("\n"))
    };
    ParsedFrame { label, data }
}

/// Classified result of interpreting one frame.
#[derive(Clone, Debug, PartialEq)]
pub enum FrameEvent {
    /// An incremental update to forward to the sink.
    Progress(ProgressNotification),
    /// A completion frame. The notification is always delivered; `result` is
    /// present only when the payload carried one.
    Completed {
        notification: ProgressNotification,
        result: Option<TerminalResult>,
    },
    /// An `error` frame. The session must fail with this message.
    Fatal { message: String },
}

#[derive(serde::Deserialize)]
struct ErrorPayload {
    message: Option<String>,
}

/// Turns frames into classified events.
///
/// Malformed progress and completion payloads are dropped; malformed error
/// payloads still produce `FrameEvent::Fatal` with the fallback message.
#[derive(Clone, Debug)]
pub struct EventInterpreter {
    error_fallback_message: String,
    completion_stage: String,
    completion_message: String,
}

impl Default for EventInterpreter {
    fn default() -> Self {
        Self::from_config(&StreamConfig::default())
    }
}

impl EventInterpreter {
    pub fn from_config(config: &StreamConfig) -> Self {
        Self {
            error_fallback_message: config.error_fallback_message.clone(),
            completion_stage: config.completion_stage.clone(),
            completion_message: config.completion_message.clone(),
        }
    }

    /// Interprets one complete frame. `None` means drop it.
    pub fn interpret(&self, frame: &str) -> Option<FrameEvent> {
        let parsed = parse_frame(frame);
        let Some(data) = parsed.data else {
            debug!(label = parsed.label.as_str(), "dropping frame without data lines");
            return None;
        };
        match parsed.label {
            FrameLabel::Error => Some(self.interpret_error(&data)),
            FrameLabel::Completed => self.interpret_completed(&data),
            FrameLabel::Progress | FrameLabel::Other(_) => {
                match serde_json::from_str::<ProgressNotification>(&data) {
                    Ok(notification) => Some(FrameEvent::Progress(notification)),
                    Err(err) => {
                        debug!(label = parsed.label.as_str(), error = %err, "dropping malformed progress frame");
                        None
                    }
                }
            }
        }
    }

    fn interpret_error(&self, data: &str) -> FrameEvent {
        let message = serde_json::from_str::<ErrorPayload>(data)
            .ok()
            .and_then(|payload| payload.message)
            .unwrap_or_else(|| self.error_fallback_message.clone());
        FrameEvent::Fatal { message }
    }

    fn interpret_completed(&self, data: &str) -> Option<FrameEvent> {
        let mut fields = match serde_json::from_str::<serde_json::Value>(data) {
            Ok(serde_json::Value::Object(fields)) => fields,
            Ok(_) => {
                debug!("dropping completed frame whose payload is not an object");
                return None;
            }
            Err(err) => {
                debug!(error = %err, "dropping malformed completed frame");
                return None;
            }
        };

        let result = fields
            .remove("result")
            .filter(|value| !value.is_null())
            .map(TerminalResult::new);

        // A mistyped id is kept as an extension field instead of failing the frame.
        let mistyped_id = fields
            .get("requestId")
            .is_some_and(|value| !value.is_string() && !value.is_null());
        let stray_request_id = if mistyped_id {
            fields.remove("requestId")
        } else {
            None
        };

        default_string(&mut fields, "stage", &self.completion_stage);
        default_string(&mut fields, "status", "completed");
        if !fields.get("progress").is_some_and(serde_json::Value::is_number) {
            fields.insert("progress".into(), serde_json::json!(100));
        }
        default_string(&mut fields, "message", &self.completion_message);
        let now = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        default_string(&mut fields, "timestamp", &now);

        let mut notification = match ProgressNotification::from_value(serde_json::Value::Object(fields)) {
            Ok(notification) => notification,
            Err(err) => {
                debug!(error = %err, "completed frame fields unusable; using completion defaults");
                ProgressNotification {
                    stage: self.completion_stage.clone(),
                    status: "completed".to_string(),
                    progress: 100.0,
                    message: self.completion_message.clone(),
                    timestamp: now,
                    ..Default::default()
                }
            }
        };
        if let Some(request_id) = stray_request_id {
            notification.extra.insert("requestId".to_string(), request_id);
        }
        Some(FrameEvent::Completed {
            notification,
            result,
        })
    }
}

/// Inserts `default` when `key` is missing, `null`, or not a string.
fn default_string(
    fields: &mut serde_json::Map<String, serde_json::Value>,
    key: &str,
    default: &str,
) {
    let usable = fields.get(key).is_some_and(serde_json::Value::is_string);
    if !usable {
        fields.insert(key.to_string(), serde_json::Value::String(default.to_string()));
    }
}
