// Conversational session lifecycle.
//
// The session is a small state machine; every change goes through
// `next_state` so illegal combinations (a close pending on an idle
// session, activity before connect) cannot be expressed.

/// Lifecycle of one underlying assistant connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session has been started yet
    Idle,
    /// Connect in flight; not yet usable
    Connecting,
    /// Connected; accepts audio, text and images
    Active,
    /// End-of-turn signalled; drains the reply, then closes
    ClosePending,
    /// Connection closed; a new session may be started
    Closed,
}

impl SessionState {
    /// A session exists (audio and images are still relayed while a close
    /// is pending).
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Active | SessionState::ClosePending)
    }

    /// Text injection is only allowed while fully active.
    pub fn accepts_text(&self) -> bool {
        matches!(self, SessionState::Active)
    }
}

/// Events that drive the session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    ConnectStarted,
    ConnectSucceeded,
    ConnectFailed,
    FinishTurnRequested,
    TurnCompleted,
    SessionEnded,
}

/// The single transition function. Unexpected combinations leave the state
/// unchanged; callers treat an unchanged result as "nothing to do".
pub fn next_state(current: SessionState, event: SessionEvent) -> SessionState {
    use SessionEvent::*;
    use SessionState::*;

    match (current, event) {
        (Idle | Closed, ConnectStarted) => Connecting,
        (Connecting, ConnectSucceeded) => Active,
        (Connecting, ConnectFailed) => Idle,
        (Active, FinishTurnRequested) => ClosePending,
        (ClosePending, TurnCompleted) => Closed,
        // A completed turn on an active session just opens the next turn
        (Active, TurnCompleted) => Active,
        (Connecting | Active | ClosePending, SessionEnded) => Closed,
        (state, _) => state,
    }
}
