//! Process-wide `tracing` setup for binaries that host audit streams.
//!
//! The library only emits events; nothing is printed until a binary calls
//! [`init_observability`] (or [`init_with`]).

use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

/// Filter used when neither `AUDIT_STREAM_LOG_LEVEL` nor `RUST_LOG` is usable.
/// Keeps HTTP client chatter at `warn` while showing session lifecycle events.
pub const DEFAULT_FILTER: &str = "warn,audit_stream=info";

const DEFAULT_LOG_FILE: &str = "audit-stream.logs.jsonl";

/// Logging settings resolved from the environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogSettings {
    pub enabled: bool,
    /// `EnvFilter` directives; `None` falls back to `RUST_LOG`, then
    /// [`DEFAULT_FILTER`].
    pub filter: Option<String>,
    /// JSONL output file. Console output on stderr when unset.
    pub json_path: Option<PathBuf>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            filter: None,
            json_path: None,
        }
    }
}

impl LogSettings {
    /// Reads:
    /// - `AUDIT_STREAM_OBSERVABILITY_ENABLED`: `false`/`0`/`off` disables logging.
    /// - `AUDIT_STREAM_LOG_LEVEL`: filter directives, e.g. `audit_stream=debug`.
    /// - `AUDIT_STREAM_JSON_LOG_PATH`: write JSONL to this file instead of stderr.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let enabled = lookup("AUDIT_STREAM_OBSERVABILITY_ENABLED")
            .and_then(|value| parse_bool_env(&value))
            .unwrap_or(true);
        let filter = lookup("AUDIT_STREAM_LOG_LEVEL").filter(|value| !value.trim().is_empty());
        let json_path = lookup("AUDIT_STREAM_JSON_LOG_PATH")
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);
        Self {
            enabled,
            filter,
            json_path,
        }
    }

    fn env_filter(&self) -> tracing_subscriber::EnvFilter {
        if let Some(directives) = &self.filter
            && let Ok(filter) = tracing_subscriber::EnvFilter::try_new(directives)
        {
            return filter;
        }
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_FILTER))
    }
}

fn parse_bool_env(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

/// Splits a log path into the directory and file name `tracing-appender` wants.
fn log_file_location(path: &Path) -> (&Path, &str) {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(DEFAULT_LOG_FILE);
    (dir, file_name)
}

/// Installs the subscriber described by [`LogSettings::from_env`].
pub fn init_observability() {
    init_with(LogSettings::from_env());
}

/// Installs a subscriber once per process. Later calls are ignored, as is an
/// already-installed global subscriber.
pub fn init_with(settings: LogSettings) {
    INIT.get_or_init(|| {
        if !settings.enabled {
            return;
        }

        let env_filter = settings.env_filter();
        if let Some(path) = &settings.json_path {
            let (dir, file_name) = log_file_location(path);
            let _ = std::fs::create_dir_all(dir);
            let writer = tracing_appender::rolling::never(dir, file_name);
            let json_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_target(true)
                .with_writer(writer);
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(json_layer)
                .try_init();
        } else {
            let console_layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr);
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .try_init();
        }
    });
}
