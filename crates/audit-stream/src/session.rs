use std::fmt;

use crate::notification::{ProgressNotification, TerminalResult};

/// Identifier of one audit session.
#[derive(Clone, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Generates a random id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Lifecycle of a session.
///
/// `Idle -> Running -> {Completed, Failed, Aborted}`. Terminal states have no
/// outgoing transitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Running,
    Completed,
    Failed,
    Aborted,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Aborted)
    }
}

/// One in-flight audit request: lifecycle, delivered progress, and result.
///
/// Only the consumer mutates a session; everyone else reads it.
#[derive(Clone, Debug)]
pub struct Session {
    id: SessionId,
    state: SessionState,
    history: Vec<ProgressNotification>,
    result: Option<TerminalResult>,
}

impl Session {
    pub fn new(id: impl Into<SessionId>) -> Self {
        Self {
            id: id.into(),
            state: SessionState::Idle,
            history: Vec::new(),
            result: None,
        }
    }

    /// Creates a session with a generated id.
    pub fn generated() -> Self {
        Self::new(SessionId::generate())
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == SessionState::Running
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Progress notifications in delivery order.
    pub fn history(&self) -> &[ProgressNotification] {
        &self.history
    }

    /// Last terminal result seen, if any.
    pub fn result(&self) -> Option<&TerminalResult> {
        self.result.as_ref()
    }

    /// `Idle -> Running`. Returns `false` if the session is not idle.
    pub(crate) fn start(&mut self) -> bool {
        if self.state != SessionState::Idle {
            return false;
        }
        self.state = SessionState::Running;
        true
    }

    pub(crate) fn record_progress(&mut self, notification: ProgressNotification) -> bool {
        if !self.is_running() {
            return false;
        }
        self.history.push(notification);
        true
    }

    /// Stores a terminal result, replacing any earlier one.
    pub(crate) fn record_result(&mut self, result: TerminalResult) -> bool {
        if !self.is_running() {
            return false;
        }
        self.result = Some(result);
        true
    }

    /// `Running -> terminal`. Returns `false` if not running.
    pub(crate) fn finish(&mut self, state: SessionState) -> bool {
        if !self.is_running() || !state.is_terminal() {
            return false;
        }
        self.state = state;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(stage: &str) -> ProgressNotification {
        ProgressNotification {
            stage: stage.into(),
            ..Default::default()
        }
    }

    #[test]
    fn lifecycle_runs_idle_to_terminal_once() {
        let mut session = Session::new("s-1");
        assert_eq!(session.state(), SessionState::Idle);
        assert!(!session.record_progress(note("early")));
        assert!(session.start());
        assert!(session.is_running());
        assert!(session.record_progress(note("a")));
        assert!(session.finish(SessionState::Failed));
        assert!(!session.is_running());
        assert!(!session.finish(SessionState::Completed));
        assert!(!session.record_progress(note("late")));
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(session.history().len(), 1);
    }

    #[test]
    fn finish_rejects_non_terminal_target() {
        let mut session = Session::new("s-2");
        session.start();
        assert!(!session.finish(SessionState::Idle));
        assert!(session.is_running());
    }

    #[test]
    fn later_result_replaces_earlier() {
        let mut session = Session::generated();
        session.start();
        session.record_result(TerminalResult::new(serde_json::json!(1)));
        session.record_result(TerminalResult::new(serde_json::json!(2)));
        assert_eq!(session.result().map(TerminalResult::as_value), Some(&serde_json::json!(2)));
    }

    #[test]
    fn start_only_from_idle() {
        let mut session = Session::new("s-3");
        assert!(session.start());
        assert!(!session.start());
    }
}
