//! Common imports for typical usage.
pub use crate::{
    AbortHandle, AbortSignal, AuditError, AuditRun, AuditRunEvent, AuditStreamConsumer,
    Outcome, ProgressNotification, ProgressSink, Session, SessionId, SessionState,
    StreamConfig, StreamFailure, StreamResponse, TerminalResult,
};
