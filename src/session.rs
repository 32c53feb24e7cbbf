//! Progress and outcome of the current update attempt.

use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UpdatePhase {
    #[default]
    Idle,
    Checking,
    Available,
    UpToDate,
    Downloading,
    Extracting,
    Launching,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub phase: UpdatePhase,
    pub last_error: Option<String>,
    /// Download progress in `[0, 1]`.
    pub progress: f64,
}

/// Caller-owned state of the current update attempt.
///
/// Create one per host and pass it to every [`UpdateService`](crate::service::UpdateService)
/// call. It is only written by the update flow and is reset at the start of
/// each check.
#[derive(Debug, Default)]
pub struct UpdateSession {
    state: Mutex<SessionSnapshot>,
}

impl UpdateSession {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SessionSnapshot> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.lock().clone()
    }

    pub fn phase(&self) -> UpdatePhase {
        self.lock().phase
    }

    pub fn progress(&self) -> f64 {
        self.lock().progress
    }

    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    pub(crate) fn reset(&self) {
        *self.lock() = SessionSnapshot::default();
    }

    pub(crate) fn set_phase(&self, phase: UpdatePhase) {
        self.lock().phase = phase;
    }

    pub(crate) fn set_progress(&self, fraction: f64) {
        self.lock().progress = fraction.clamp(0.0, 1.0);
    }

    pub(crate) fn fail(&self, error: impl Into<String>) {
        let mut state = self.lock();
        state.phase = UpdatePhase::Failed;
        state.last_error = Some(error.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fail_then_reset() {
        let session = UpdateSession::new();
        session.set_phase(UpdatePhase::Downloading);
        session.set_progress(0.4);
        session.fail("network error: boom");

        let snap = session.snapshot();
        assert_eq!(snap.phase, UpdatePhase::Failed);
        assert_eq!(snap.last_error.as_deref(), Some("network error: boom"));
        assert_eq!(snap.progress, 0.4);

        session.reset();
        assert_eq!(session.snapshot(), SessionSnapshot::default());
    }

    #[test]
    fn progress_is_clamped() {
        let session = UpdateSession::new();
        session.set_progress(1.7);
        assert_eq!(session.progress(), 1.0);
        session.set_progress(-0.2);
        assert_eq!(session.progress(), 0.0);
    }
}
