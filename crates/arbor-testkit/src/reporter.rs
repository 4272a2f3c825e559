//! Recording error sink for testing.

use arbor_core::{EngineError, ReportEffects};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Error sink that records everything it receives.
#[derive(Clone, Default)]
pub struct RecordingReporter {
    errors: Arc<Mutex<Vec<EngineError>>>,
}

impl RecordingReporter {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every error reported so far.
    pub fn snapshot(&self) -> Vec<EngineError> {
        self.lock().clone()
    }

    /// Drain the recorded errors.
    pub fn take(&self) -> Vec<EngineError> {
        std::mem::take(&mut *self.lock())
    }

    /// Whether nothing has been reported.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<EngineError>> {
        self.errors.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ReportEffects for RecordingReporter {
    fn report(&self, error: &EngineError) {
        tracing::debug!(%error, "error reported to sink");
        self.lock().push(error.clone());
    }
}
