use std::sync::atomic::{AtomicU8, Ordering};

/// Top-level run state observed by the drain loop.
///
/// Transitions are one-way once the loop leaves `Running`:
/// ```text
/// running → quitting   (signal / audio server shutdown)
/// running → error      (fatal condition)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Quitting,
    Error,
}

const RUNNING: u8 = 0;
const QUITTING: u8 = 1;
const ERROR: u8 = 2;

/// Shared run-state flag word.
///
/// Written by the real-time thread (shutdown notification, protocol
/// violations) and by signal handlers; read by the drain loop at the top of
/// each iteration. A store may be observed one iteration late, which is
/// acceptable.
#[derive(Debug)]
pub struct SharedRunState(AtomicU8);

impl SharedRunState {
    pub fn new() -> Self {
        Self(AtomicU8::new(RUNNING))
    }

    pub fn get(&self) -> RunState {
        match self.0.load(Ordering::Acquire) {
            RUNNING => RunState::Running,
            QUITTING => RunState::Quitting,
            _ => RunState::Error,
        }
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::Acquire) == RUNNING
    }

    /// Request a clean shutdown. Ignored if a fatal error already occurred.
    pub fn request_stop(&self) {
        let _ = self
            .0
            .compare_exchange(RUNNING, QUITTING, Ordering::AcqRel, Ordering::Acquire);
    }

    /// Mark the run as failed. Overrides a pending clean shutdown.
    pub fn fail(&self) {
        self.0.store(ERROR, Ordering::Release);
    }
}

impl Default for SharedRunState {
    fn default() -> Self {
        Self::new()
    }
}
