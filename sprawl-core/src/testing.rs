//! Testing utilities for the sprawl.
//!
//! This module provides tools for deterministic tests:
//! - `MockBackend` returns scripted replies and records every request
//! - `RecordingObserver` captures generation diagnostics
//! - `memory_world` builds a `WorldService` over an in-memory store

use crate::config::{GeneratorConfig, WorldConfig};
use crate::coord::Coordinate;
use crate::generator::{
    BackendError, CompletionBackend, CompletionRequest, GenerationObserver, Generator,
    SilentObserver,
};
use crate::store::{SpatialStore, StoreError};
use crate::world::WorldService;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// A scripted reply from the mock backend.
#[derive(Debug, Clone, PartialEq)]
pub enum MockReply {
    /// Return this text as the raw completion.
    Text(String),
    /// Fail the request with this message.
    Fail(String),
}

impl MockReply {
    pub fn text(text: impl Into<String>) -> Self {
        MockReply::Text(text.into())
    }

    pub fn fail(message: impl Into<String>) -> Self {
        MockReply::Fail(message.into())
    }
}

#[derive(Debug, Default)]
struct MockState {
    replies: VecDeque<MockReply>,
    requests: Vec<CompletionRequest>,
}

/// A backend that returns scripted replies.
///
/// Once the script runs out it answers `Mock location #n`, or fails every
/// request when built with [`MockBackend::failing`].
#[derive(Debug, Default)]
pub struct MockBackend {
    state: Mutex<MockState>,
    always_fail: bool,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_replies(replies: Vec<MockReply>) -> Self {
        let backend = Self::new();
        backend.lock().replies.extend(replies);
        backend
    }

    /// A backend whose every request fails.
    pub fn failing() -> Self {
        Self {
            always_fail: true,
            ..Self::default()
        }
    }

    /// Add a reply to the end of the script.
    pub fn queue(&self, reply: MockReply) {
        self.lock().replies.push_back(reply);
    }

    /// Every request received so far, oldest first.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.lock().requests.clone()
    }

    pub fn request_count(&self) -> usize {
        self.lock().requests.len()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl CompletionBackend for MockBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<String, BackendError> {
        let mut state = self.lock();
        state.requests.push(request);
        let n = state.requests.len();

        match state.replies.pop_front() {
            Some(MockReply::Text(text)) => Ok(text),
            Some(MockReply::Fail(message)) => Err(BackendError::Request(message)),
            None if self.always_fail => Err(BackendError::Request("mock backend offline".into())),
            None => Ok(format!("Mock location #{n}")),
        }
    }

    fn model(&self) -> &str {
        "mock-model"
    }
}

/// A generation event seen by [`RecordingObserver`].
#[derive(Debug, Clone, PartialEq)]
pub enum ObservedEvent {
    AttemptFailed {
        coordinate: Coordinate,
        attempt: u32,
        error: String,
    },
    FellBack {
        coordinate: Coordinate,
        error: String,
    },
    Generated {
        coordinate: Coordinate,
        attempts: u32,
    },
}

/// Observer that keeps every event for later assertions.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ObservedEvent>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<ObservedEvent> {
        self.push_guard().clone()
    }

    fn push_guard(&self) -> MutexGuard<'_, Vec<ObservedEvent>> {
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl GenerationObserver for RecordingObserver {
    fn attempt_failed(&self, coordinate: Coordinate, attempt: u32, error: &BackendError) {
        self.push_guard().push(ObservedEvent::AttemptFailed {
            coordinate,
            attempt,
            error: error.to_string(),
        });
    }

    fn fell_back(&self, coordinate: Coordinate, error: &BackendError) {
        self.push_guard().push(ObservedEvent::FellBack {
            coordinate,
            error: error.to_string(),
        });
    }

    fn generated(&self, coordinate: Coordinate, attempts: u32) {
        self.push_guard()
            .push(ObservedEvent::Generated { coordinate, attempts });
    }
}

/// Generator settings with no rate limit or backoff waits.
pub fn instant_config() -> GeneratorConfig {
    GeneratorConfig::default()
        .with_base_delay(Duration::ZERO)
        .with_min_interval(Duration::ZERO)
}

/// An in-memory world driven by `backend`, with waits disabled and
/// diagnostics silenced.
pub async fn memory_world<B: CompletionBackend>(
    backend: B,
    world: WorldConfig,
) -> Result<WorldService<B>, StoreError> {
    let store = SpatialStore::open_in_memory().await?;
    let generator =
        Generator::new(backend, instant_config()).with_observer(Arc::new(SilentObserver));
    Ok(WorldService::new(store, generator, world))
}
