use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::StreamConfig;
use crate::decode::Utf8StreamDecoder;
use crate::errors::{AuditError, EMPTY_BODY_MESSAGE, Outcome, StreamFailure};
use crate::event::{EventInterpreter, FrameEvent};
use crate::frame::FrameSplitter;
use crate::notification::ProgressNotification;
use crate::session::{Session, SessionState};
use crate::sink::ProgressSink;
use crate::source::{ByteSource, SourceGuard, StreamResponse};

/// Handle used to request cancellation of a running session.
#[derive(Clone, Debug)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    /// Creates a connected handle/signal pair.
    pub fn new() -> (Self, AbortSignal) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, AbortSignal { rx })
    }

    /// Requests cancellation.
    ///
    /// Takes effect the next time the consumer waits for a chunk; a frame
    /// already being interpreted is finished first.
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Consumer side of an `AbortHandle`.
#[derive(Clone, Debug)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

impl AbortSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_, signal) = AbortHandle::new();
        signal
    }

    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested. Pends forever if every handle
    /// was dropped without aborting.
    async fn aborted(&mut self) {
        if self.rx.wait_for(|aborted| *aborted).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Drives one session from `Running` to a terminal state.
///
/// Reads chunks from the response body, reassembles frames, interprets them,
/// forwards progress to the sink, and produces exactly one `Outcome`. The body
/// is released exactly once on every exit path.
#[derive(Clone, Debug, Default)]
pub struct AuditStreamConsumer {
    config: StreamConfig,
    interpreter: EventInterpreter,
}

impl AuditStreamConsumer {
    pub fn new(config: StreamConfig) -> Self {
        let interpreter = EventInterpreter::from_config(&config);
        Self {
            config,
            interpreter,
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Consumes `response` on behalf of `session`.
    ///
    /// Fails with `AuditError::Protocol` only if `session` is not idle; every
    /// stream-level problem is reported through the returned `Outcome`.
    pub async fn consume<S: ByteSource>(
        &self,
        session: &mut Session,
        response: StreamResponse<S>,
        sink: &dyn ProgressSink,
        abort: &mut AbortSignal,
    ) -> Result<Outcome, AuditError> {
        let StreamResponse {
            status,
            content_type,
            body,
        } = response;
        let mut source = body.map(SourceGuard::new);

        if !session.start() {
            return Err(AuditError::protocol_msg(format!(
                "session {} is {:?}, expected Idle",
                session.id(),
                session.state()
            )));
        }
        info!(session_id = %session.id(), status, "audit stream started");

        let outcome = self
            .drive(
                session,
                status,
                content_type.as_deref(),
                source.as_mut(),
                sink,
                abort,
            )
            .await;

        if let Some(source) = source.as_mut() {
            source.release();
        }

        let state = match &outcome {
            Outcome::Completed(_) => SessionState::Completed,
            Outcome::Failed(_) => SessionState::Failed,
            Outcome::Aborted => SessionState::Aborted,
        };
        session.finish(state);
        match &outcome {
            Outcome::Completed(_) => {
                info!(session_id = %session.id(), notifications = session.history().len(), "audit stream completed");
            }
            Outcome::Failed(failure) => {
                warn!(session_id = %session.id(), error = %failure, "audit stream failed");
            }
            Outcome::Aborted => {
                info!(session_id = %session.id(), "audit stream aborted");
            }
        }
        Ok(outcome)
    }

    async fn drive<S: ByteSource>(
        &self,
        session: &mut Session,
        status: u16,
        content_type: Option<&str>,
        source: Option<&mut SourceGuard<S>>,
        sink: &dyn ProgressSink,
        abort: &mut AbortSignal,
    ) -> Outcome {
        if !(200..300).contains(&status) {
            return Outcome::Failed(StreamFailure::http(status));
        }
        let declared = content_type.unwrap_or_default();
        if !self.config.accepts_content_type(declared) {
            let shown = if declared.is_empty() { "unknown" } else { declared };
            return Outcome::Failed(StreamFailure::protocol(format!(
                "Expected {} but got \"{shown}\"",
                self.config.expected_content_type
            )));
        }
        let Some(source) = source else {
            return Outcome::Failed(StreamFailure::protocol(EMPTY_BODY_MESSAGE));
        };

        let mut decoder = Utf8StreamDecoder::new();
        let mut splitter = FrameSplitter::new();
        loop {
            if abort.is_aborted() {
                return Outcome::Aborted;
            }
            let next = tokio::select! {
                biased;
                _ = abort.aborted() => return Outcome::Aborted,
                next = source.next_chunk() => next,
            };
            match next {
                Some(Ok(chunk)) => {
                    let text = decoder.decode(&chunk);
                    for frame in splitter.push(&text) {
                        if let Some(outcome) = self.dispatch(session, &frame, sink) {
                            return outcome;
                        }
                    }
                }
                Some(Err(err)) => {
                    return Outcome::Failed(StreamFailure::transport(err.message));
                }
                None => break,
            }
        }

        let rest = decoder.finish();
        let mut frames = splitter.push(&rest);
        let tail = splitter.finish();
        frames.extend(tail.clone());
        for frame in &frames {
            if let Some(outcome) = self.dispatch(session, frame, sink) {
                return outcome;
            }
        }

        match session.result() {
            Some(result) => Outcome::Completed(result.clone()),
            None => {
                if let Some(tail) = tail {
                    warn!(session_id = %session.id(), bytes = tail.len(), "stream ended with an unterminated frame and no result");
                }
                Outcome::Failed(StreamFailure::NoResult)
            }
        }
    }

    /// Applies one frame to the session. `Some` stops the loop.
    fn dispatch(
        &self,
        session: &mut Session,
        frame: &str,
        sink: &dyn ProgressSink,
    ) -> Option<Outcome> {
        match self.interpreter.interpret(frame)? {
            FrameEvent::Progress(notification) => {
                deliver(session, notification, sink);
                None
            }
            FrameEvent::Completed {
                notification,
                result,
            } => {
                deliver(session, notification, sink);
                if let Some(result) = result {
                    if session.result().is_some() {
                        debug!(session_id = %session.id(), "replacing earlier terminal result");
                    }
                    session.record_result(result);
                }
                None
            }
            FrameEvent::Fatal { message } => {
                Some(Outcome::Failed(StreamFailure::stream(message)))
            }
        }
    }
}

fn deliver(session: &mut Session, notification: ProgressNotification, sink: &dyn ProgressSink) {
    debug!(
        session_id = %session.id(),
        seq = session.history().len(),
        stage = %notification.stage,
        progress = notification.progress,
        "progress notification"
    );
    sink.on_progress(session.id(), &notification);
    session.record_progress(notification);
}
