//! Incremental consumer for audit progress streams.
//!
//! An audit service answers with a long-lived `text/event-stream` response.
//! This crate reassembles frames from arbitrarily chunked bytes, classifies
//! them, forwards progress to a sink, and drives a session to exactly one
//! terminal outcome: completed with a result, failed, or aborted.
//!
//! # Consuming a response
//!
//! ```no_run
//! use audit_stream::prelude::*;
//! use audit_stream::source::ReqwestSource;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), AuditError> {
//! # let response: reqwest::Response = unimplemented!();
//! let consumer = AuditStreamConsumer::new(StreamConfig::from_env()?);
//! let (_abort, mut signal) = AbortHandle::new();
//! let mut session = Session::generated();
//!
//! let print = |_: &SessionId, n: &ProgressNotification| {
//!     println!("[{:>3}%] {} {}", n.progress, n.stage, n.message);
//! };
//! let outcome = consumer
//!     .consume(&mut session, ReqwestSource::from_response(response), &print, &mut signal)
//!     .await?;
//! let report = outcome.into_result()?.report();
//! # let _ = report;
//! # Ok(())
//! # }
//! ```

/// Stream configuration.
pub mod config;
/// Stream orchestrator and cancellation.
pub mod consumer;
/// Incremental UTF-8 decoding.
pub mod decode;
/// Public error and outcome types.
pub mod errors;
/// Frame parsing and classification.
pub mod event;
/// Blank-line frame splitting.
pub mod frame;
/// Progress notification and terminal result types.
pub mod notification;
/// Logging setup.
pub mod observability;
/// Common imports for typical usage.
pub mod prelude;
/// Typed deep audit report.
pub mod report;
/// Task-per-session hosting.
pub mod run;
/// Session state machine.
pub mod session;
/// Progress sinks.
pub mod sink;
/// Byte sources and the response preamble.
pub mod source;

pub use config::StreamConfig;
pub use consumer::{AbortHandle, AbortSignal, AuditStreamConsumer};
pub use errors::{AuditError, Outcome, SourceError, StreamFailure};
pub use event::{EventInterpreter, FrameEvent, FrameLabel};
pub use frame::FrameSplitter;
pub use notification::{ProgressNotification, TerminalResult};
pub use observability::{LogSettings, init_observability, init_with};
pub use run::{AuditRun, AuditRunEvent, AuditRunReport};
pub use session::{Session, SessionId, SessionState};
pub use sink::{ChannelSink, NoopSink, ProgressSink};
pub use source::{ByteSource, ReplaySource, ReqwestSource, StreamResponse};
