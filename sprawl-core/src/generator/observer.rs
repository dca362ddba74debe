//! Diagnostic hooks for the generation path.

use super::backend::BackendError;
use crate::coord::Coordinate;

/// Receives generation diagnostics. Every method defaults to doing nothing.
pub trait GenerationObserver: Send + Sync {
    /// A single backend attempt failed. More attempts may follow.
    fn attempt_failed(&self, _coordinate: Coordinate, _attempt: u32, _error: &BackendError) {}

    /// Generation gave up and a fallback description is being used instead.
    fn fell_back(&self, _coordinate: Coordinate, _error: &BackendError) {}

    /// The backend produced a usable description.
    fn generated(&self, _coordinate: Coordinate, _attempts: u32) {}
}

/// Reports through `tracing`. This is the default observer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl GenerationObserver for TracingObserver {
    fn attempt_failed(&self, coordinate: Coordinate, attempt: u32, error: &BackendError) {
        tracing::debug!(%coordinate, attempt, %error, "generation attempt failed");
    }

    fn fell_back(&self, coordinate: Coordinate, error: &BackendError) {
        tracing::warn!(%coordinate, %error, "generation failed, using fallback description");
    }

    fn generated(&self, coordinate: Coordinate, attempts: u32) {
        tracing::debug!(%coordinate, attempts, "location generated");
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentObserver;

impl GenerationObserver for SilentObserver {}
