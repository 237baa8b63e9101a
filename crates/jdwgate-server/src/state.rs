#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Disconnected,
    /// A client socket is open; no handshake yet.
    Connected,
    /// Device channel open and handshake exchanged.
    Attached,
    Running,
    Suspended,
}

/// Per-session state. Owned by the session runner and lent to the dispatcher
/// for the duration of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    phase: SessionPhase,
    looping: bool,
    target_running: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            phase: SessionPhase::Disconnected,
            looping: false,
            target_running: false,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Whether the receive/dispatch loop should keep going.
    pub fn is_looping(&self) -> bool {
        self.looping
    }

    /// Whether the remote VM is executing; console output is only polled
    /// while this is set.
    pub fn target_running(&self) -> bool {
        self.target_running
    }

    pub(crate) fn connected(&mut self) {
        self.set_phase(SessionPhase::Connected);
    }

    pub(crate) fn attached(&mut self) {
        debug_assert_eq!(self.phase, SessionPhase::Connected);
        self.set_phase(SessionPhase::Attached);
    }

    /// Enters the receive loop. The device is halted after attach, so the
    /// target is not running until the debugger resumes it.
    pub(crate) fn start_running(&mut self) {
        debug_assert_eq!(self.phase, SessionPhase::Attached);
        self.looping = true;
        self.target_running = false;
        self.set_phase(SessionPhase::Running);
    }

    pub(crate) fn suspend(&mut self) {
        self.target_running = false;
        if self.phase == SessionPhase::Running {
            self.set_phase(SessionPhase::Suspended);
        }
    }

    pub(crate) fn resume(&mut self) {
        self.target_running = true;
        if self.phase == SessionPhase::Suspended {
            self.set_phase(SessionPhase::Running);
        }
    }

    /// Asks the loop to finish after the current reply.
    pub(crate) fn dispose(&mut self) {
        self.looping = false;
        self.target_running = false;
    }

    pub(crate) fn disconnect(&mut self) {
        self.looping = false;
        self.target_running = false;
        self.set_phase(SessionPhase::Disconnected);
    }

    fn set_phase(&mut self, phase: SessionPhase) {
        if self.phase != phase {
            tracing::trace!(target: "jdwgate.session", from = ?self.phase, to = ?phase, "session phase");
            self.phase = phase;
        }
    }
}
