/// Where the supervisor is in one start/stop cycle of its worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, derive_more::Display)]
pub enum HandshakeState {
    #[default]
    NotStarted,
    Launching,
    Running,
    Stopping,
    Stopped,
    TimedOut,
}

impl HandshakeState {
    pub fn can_start(&self) -> bool {
        matches!(self, Self::NotStarted | Self::Stopped | Self::TimedOut)
    }

    /// States only move forward within a cycle; a new cycle begins from a startable state.
    pub fn can_transition_to(&self, next: HandshakeState) -> bool {
        use HandshakeState::*;
        match (self, next) {
            (from, Launching | Running) if from.can_start() => true,
            (Launching, Running | TimedOut | Stopped) => true,
            (Running, Stopping) => true,
            (Stopping, Stopped | TimedOut) => true,
            _ => false,
        }
    }
}
