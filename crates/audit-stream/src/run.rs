use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

use crate::consumer::{AbortHandle, AbortSignal, AuditStreamConsumer};
use crate::errors::{AuditError, Outcome};
use crate::notification::{ProgressNotification, TerminalResult};
use crate::session::{Session, SessionId, SessionState};
use crate::sink::ProgressSink;
use crate::source::{ByteSource, StreamResponse};

/// Events published by a hosted session, in stream order.
#[derive(Clone, Debug, PartialEq)]
pub enum AuditRunEvent {
    /// First event of every run.
    Started { session_id: SessionId },
    /// A progress notification; `seq` counts from zero.
    Progress {
        session_id: SessionId,
        seq: u64,
        notification: ProgressNotification,
    },
    /// Last event of every run.
    Finished {
        session_id: SessionId,
        outcome: Outcome,
    },
}

/// Final state of a hosted session.
#[derive(Clone, Debug)]
pub struct AuditRunReport {
    pub session: Session,
    pub outcome: Outcome,
}

struct RunSink {
    tx: mpsc::UnboundedSender<AuditRunEvent>,
    shared: Option<Arc<dyn ProgressSink>>,
    seq: std::sync::atomic::AtomicU64,
}

impl ProgressSink for RunSink {
    fn on_progress(&self, session: &SessionId, notification: &ProgressNotification) {
        let seq = self
            .seq
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let _ = self.tx.send(AuditRunEvent::Progress {
            session_id: session.clone(),
            seq,
            notification: notification.clone(),
        });
        if let Some(shared) = &self.shared {
            shared.on_progress(session, notification);
        }
    }
}

/// One session hosted on its own tokio task.
///
/// Use `next_event()` to observe progress as it arrives and `finish()` to get
/// the final session and outcome.
pub struct AuditRun {
    session_id: SessionId,
    rx: mpsc::UnboundedReceiver<AuditRunEvent>,
    final_rx: oneshot::Receiver<Result<AuditRunReport, AuditError>>,
    state_rx: watch::Receiver<SessionState>,
    abort_handle: AbortHandle,
    saw_terminal: bool,
}

impl AuditRun {
    /// Spawns a task that consumes `response` for `session`.
    pub fn spawn<S>(
        consumer: AuditStreamConsumer,
        session: Session,
        response: StreamResponse<S>,
    ) -> Self
    where
        S: ByteSource + 'static,
    {
        Self::spawn_inner(consumer, session, response, None)
    }

    /// Like `spawn`, additionally forwarding notifications to a sink that may
    /// be shared with other runs.
    pub fn spawn_with_sink<S>(
        consumer: AuditStreamConsumer,
        session: Session,
        response: StreamResponse<S>,
        sink: Arc<dyn ProgressSink>,
    ) -> Self
    where
        S: ByteSource + 'static,
    {
        Self::spawn_inner(consumer, session, response, Some(sink))
    }

    fn spawn_inner<S>(
        consumer: AuditStreamConsumer,
        session: Session,
        response: StreamResponse<S>,
        shared: Option<Arc<dyn ProgressSink>>,
    ) -> Self
    where
        S: ByteSource + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let (final_tx, final_rx) = oneshot::channel();
        let (state_tx, state_rx) = watch::channel(session.state());
        let (abort_handle, signal) = AbortHandle::new();
        let session_id = session.id().clone();
        tokio::spawn(run_task(
            consumer,
            session,
            response,
            shared,
            tx,
            final_tx,
            state_tx,
            abort_handle.clone(),
            signal,
        ));
        Self {
            session_id,
            rx,
            final_rx,
            state_rx,
            abort_handle,
            saw_terminal: false,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Returns a handle that can cancel the run.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort_handle.clone()
    }

    /// Latest published session state.
    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Receiver that observes every state change.
    pub fn state_receiver(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// Waits for the next event. Returns `None` once the run has ended and
    /// every event was received.
    pub async fn next_event(&mut self) -> Option<AuditRunEvent> {
        let event = self.rx.recv().await;
        if let Some(AuditRunEvent::Finished { .. }) = &event {
            self.saw_terminal = true;
        }
        event
    }

    /// Drains remaining events and returns the final session and outcome.
    pub async fn finish(mut self) -> Result<AuditRunReport, AuditError> {
        while !self.saw_terminal {
            match self.rx.recv().await {
                Some(AuditRunEvent::Finished { .. }) => self.saw_terminal = true,
                Some(_) => {}
                None => break,
            }
        }
        match self.final_rx.await {
            Ok(report) => report,
            Err(_) => Err(AuditError::protocol_msg(format!(
                "audit task ended without final outcome (session={})",
                self.session_id
            ))),
        }
    }

    /// Runs to the end and returns the terminal result.
    pub async fn collect_result(self) -> Result<TerminalResult, AuditError> {
        self.finish().await?.outcome.into_result()
    }
}

/// Drives one hosted session. Dropping the `AuditRun` closes the event
/// channel, which aborts the session and releases its body.
#[allow(clippy::too_many_arguments)]
async fn run_task<S: ByteSource>(
    consumer: AuditStreamConsumer,
    mut session: Session,
    response: StreamResponse<S>,
    shared: Option<Arc<dyn ProgressSink>>,
    tx: mpsc::UnboundedSender<AuditRunEvent>,
    final_tx: oneshot::Sender<Result<AuditRunReport, AuditError>>,
    state_tx: watch::Sender<SessionState>,
    abort: AbortHandle,
    mut signal: AbortSignal,
) {
    let session_id = session.id().clone();
    let _ = tx.send(AuditRunEvent::Started {
        session_id: session_id.clone(),
    });
    // The consumer rejects non-idle sessions without touching them.
    if session.state() == SessionState::Idle {
        state_tx.send_replace(SessionState::Running);
    }

    let sink = RunSink {
        tx: tx.clone(),
        shared,
        seq: std::sync::atomic::AtomicU64::new(0),
    };
    let consumed = {
        let consume = consumer.consume(&mut session, response, &sink, &mut signal);
        tokio::pin!(consume);
        tokio::select! {
            biased;
            consumed = &mut consume => consumed,
            _ = tx.closed() => {
                debug!(session_id = %session_id, "audit run dropped by its owner; aborting");
                abort.abort();
                consume.await
            }
        }
    };
    drop(sink);

    let final_state = session.state();
    state_tx.send_if_modified(|state| {
        if *state == final_state {
            false
        } else {
            *state = final_state;
            true
        }
    });
    let report = consumed.map(|outcome| {
        let _ = tx.send(AuditRunEvent::Finished {
            session_id: session_id.clone(),
            outcome: outcome.clone(),
        });
        AuditRunReport { session, outcome }
    });
    debug!(session_id = %session_id, ok = report.is_ok(), "audit task finished");
    let _ = final_tx.send(report);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{SourceError, StreamFailure};
    use crate::sink::ChannelSink;
    use crate::source::ReplaySource;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StallingSource {
        first: Option<Bytes>,
        releases: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl ByteSource for StallingSource {
        async fn next_chunk(&mut self) -> Option<Result<Bytes, SourceError>> {
            match self.first.take() {
                Some(chunk) => Some(Ok(chunk)),
                None => std::future::pending().await,
            }
        }

        fn release(&mut self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn frame(label: &str, payload: serde_json::Value) -> String {
        format!("event: {label}\ndata: {payload}\n\n")
    }

    fn audit_body(tag: &str) -> String {
        let mut body = String::new();
        for pct in [10, 50, 90] {
            body.push_str(&frame(
                "progress",
                serde_json::json!({"stage": format!("{tag}-{pct}"), "progress": pct}),
            ));
        }
        body.push_str(&frame(
            "completed",
            serde_json::json!({"timestamp": "2026-05-01T00:00:00Z", "result": {"tag": tag}}),
        ));
        body
    }

    #[tokio::test]
    async fn emits_started_progress_and_finished_in_order() {
        let mut run = AuditRun::spawn(
            AuditStreamConsumer::default(),
            Session::new("run-1"),
            StreamResponse::event_stream(ReplaySource::chunked(audit_body("a").into_bytes(), 7)),
        );

        let first = run.next_event().await.expect("first event");
        assert!(matches!(first, AuditRunEvent::Started { .. }));
        let mut seqs = Vec::new();
        let mut finished = None;
        while let Some(event) = run.next_event().await {
            match event {
                AuditRunEvent::Progress { seq, .. } => seqs.push(seq),
                AuditRunEvent::Finished { outcome, .. } => {
                    finished = Some(outcome);
                    break;
                }
                AuditRunEvent::Started { .. } => panic!("started twice"),
            }
        }
        assert_eq!(seqs, vec![0, 1, 2, 3]);
        assert!(matches!(finished, Some(Outcome::Completed(_))));

        let report = run.finish().await.expect("finish");
        assert_eq!(report.session.state(), SessionState::Completed);
        assert_eq!(report.session.history().len(), 4);
    }

    #[tokio::test]
    async fn collect_result_returns_terminal_payload() {
        let run = AuditRun::spawn(
            AuditStreamConsumer::default(),
            Session::generated(),
            StreamResponse::event_stream(ReplaySource::new([audit_body("x")])),
        );
        let result = run.collect_result().await.expect("result");
        assert_eq!(result.into_value(), serde_json::json!({"tag": "x"}));
    }

    #[tokio::test]
    async fn failure_surfaces_as_typed_error() {
        let body = frame("error", serde_json::json!({"message": "lighthouse crashed"}));
        let run = AuditRun::spawn(
            AuditStreamConsumer::default(),
            Session::new("run-err"),
            StreamResponse::event_stream(ReplaySource::new([body])),
        );
        let err = run.collect_result().await.expect_err("should fail");
        assert_eq!(
            err,
            AuditError::Failed(StreamFailure::stream("lighthouse crashed"))
        );
    }

    #[tokio::test]
    async fn abort_handle_cancels_a_stalled_run() {
        let releases = Arc::new(AtomicUsize::new(0));
        let source = StallingSource {
            first: Some(Bytes::from(frame("progress", serde_json::json!({"stage": "crawl"})))),
            releases: releases.clone(),
        };
        let mut run = AuditRun::spawn(
            AuditStreamConsumer::default(),
            Session::new("run-abort"),
            StreamResponse::event_stream(source),
        );
        let abort = run.abort_handle();
        loop {
            match run.next_event().await.expect("event") {
                AuditRunEvent::Progress { .. } => break,
                AuditRunEvent::Started { .. } => {}
                other => panic!("unexpected event {other:?}"),
            }
        }
        abort.abort();

        let report = run.finish().await.expect("finish");
        assert_eq!(report.outcome, Outcome::Aborted);
        assert_eq!(report.session.state(), SessionState::Aborted);
        assert_eq!(report.session.history().len(), 1);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
        assert!(matches!(
            report.outcome.into_result(),
            Err(AuditError::Aborted)
        ));
    }

    #[tokio::test]
    async fn dropping_the_run_releases_a_stalled_source() {
        let releases = Arc::new(AtomicUsize::new(0));
        let source = StallingSource {
            first: None,
            releases: releases.clone(),
        };
        let run = AuditRun::spawn(
            AuditStreamConsumer::default(),
            Session::new("run-dropped"),
            StreamResponse::event_stream(source),
        );
        let mut states = run.state_receiver();
        drop(run);

        let state = *tokio::time::timeout(
            std::time::Duration::from_secs(5),
            states.wait_for(|state| state.is_terminal()),
        )
        .await
        .expect("run should end once dropped")
        .expect("state channel");
        assert_eq!(state, SessionState::Aborted);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_idle_session_is_never_published_as_running() {
        let consumer = AuditStreamConsumer::default();
        let mut session = Session::new("run-reused");
        let first = consumer
            .consume(
                &mut session,
                StreamResponse::event_stream(ReplaySource::new([audit_body("r")])),
                &crate::sink::NoopSink,
                &mut AbortSignal::never(),
            )
            .await
            .expect("first run");
        assert!(first.is_completed());

        let run = AuditRun::spawn(
            consumer,
            session,
            StreamResponse::event_stream(ReplaySource::new([audit_body("r")])),
        );
        let states = run.state_receiver();
        let err = run.finish().await.expect_err("terminal session");
        assert!(matches!(err, AuditError::Protocol(_)));
        let current = states.borrow();
        assert!(!current.has_changed());
        assert_eq!(*current, SessionState::Completed);
    }

    #[tokio::test]
    async fn state_receiver_reaches_terminal_state() {
        let run = AuditRun::spawn(
            AuditStreamConsumer::default(),
            Session::new("run-state"),
            StreamResponse::event_stream(ReplaySource::new([audit_body("s")])),
        );
        let mut states = run.state_receiver();
        let state = *states
            .wait_for(|state| state.is_terminal())
            .await
            .expect("state channel");
        assert_eq!(state, SessionState::Completed);
        assert_eq!(run.state(), SessionState::Completed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_runs_share_one_sink() {
        let (sink, mut rx) = ChannelSink::new();
        let sink: Arc<dyn ProgressSink> = Arc::new(sink);
        let runs: Vec<AuditRun> = ["a", "b", "c"]
            .into_iter()
            .map(|tag| {
                AuditRun::spawn_with_sink(
                    AuditStreamConsumer::default(),
                    Session::new(tag),
                    StreamResponse::event_stream(ReplaySource::chunked(
                        audit_body(tag).into_bytes(),
                        5,
                    )),
                    sink.clone(),
                )
            })
            .collect();
        for run in runs {
            assert!(run.finish().await.expect("finish").outcome.is_completed());
        }
        drop(sink);

        let mut per_session: std::collections::HashMap<String, Vec<String>> =
            std::collections::HashMap::new();
        while let Some((id, notification)) = rx.recv().await {
            per_session
                .entry(id.to_string())
                .or_default()
                .push(notification.stage);
        }
        for tag in ["a", "b", "c"] {
            assert_eq!(
                per_session.get(tag).cloned().unwrap_or_default(),
                vec![
                    format!("{tag}-10"),
                    format!("{tag}-50"),
                    format!("{tag}-90"),
                    "response_dispatched".to_string(),
                ]
            );
        }
    }
}
