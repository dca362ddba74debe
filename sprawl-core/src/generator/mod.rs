//! Generation backend facade.
//!
//! [`Generator`] turns a coordinate and its already-explored neighbors into a
//! description. It never fails: rate limiting, retries with exponential
//! backoff and response validation all sit in front of the backend, and
//! any failure that survives them is replaced by a deterministic fallback.

pub mod backend;
pub mod fallback;
pub mod observer;
pub mod prompt;

use crate::config::{GeneratorConfig, MIN_INTERVAL_FLOOR};
use crate::coord::{Coordinate, WorldBounds};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

pub use backend::{BackendError, CompletionBackend, CompletionRequest};
pub use fallback::{fallback_description, FALLBACK_CATALOG};
pub use observer::{GenerationObserver, SilentObserver, TracingObserver};

const CONNECTION_PROBE: &str = "Say 'Connection test successful'";

/// Where a generated description came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextOrigin {
    Backend,
    Fallback,
}

/// Output of [`Generator::generate`].
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedText {
    pub text: String,
    pub origin: TextOrigin,
    /// Backend attempts made, including failed ones.
    pub attempts: u32,
}

impl GeneratedText {
    pub fn is_fallback(&self) -> bool {
        self.origin == TextOrigin::Fallback
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

/// Usage counters, for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageStats {
    /// Backend calls that returned a response.
    pub successful_calls: u64,
    /// When the rate gate last let a request through.
    pub last_call: Option<DateTime<Utc>>,
    pub min_interval: Duration,
    pub model: String,
}

#[derive(Debug)]
struct Gate {
    last_request: Option<Instant>,
    last_call: Option<DateTime<Utc>>,
    min_interval: Duration,
    successful_calls: u64,
}

/// Rate-limited, retrying, never-failing description generator.
pub struct Generator<B> {
    backend: B,
    config: GeneratorConfig,
    bounds: WorldBounds,
    catalog: Vec<String>,
    observer: Arc<dyn GenerationObserver>,
    gate: Mutex<Gate>,
}

impl<B: CompletionBackend> Generator<B> {
    pub fn new(backend: B, config: GeneratorConfig) -> Self {
        let gate = Gate {
            last_request: None,
            last_call: None,
            min_interval: config.min_interval,
            successful_calls: 0,
        };

        Self {
            backend,
            config,
            bounds: WorldBounds::default(),
            catalog: FALLBACK_CATALOG.iter().map(|s| s.to_string()).collect(),
            observer: Arc::new(TracingObserver),
            gate: Mutex::new(gate),
        }
    }

    /// Attach an observer in place of the default tracing one.
    pub fn with_observer(mut self, observer: Arc<dyn GenerationObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Replace the fallback catalog.
    pub fn with_catalog(mut self, catalog: Vec<String>) -> Self {
        self.catalog = catalog;
        self
    }

    /// World size quoted in prompts.
    pub fn with_bounds(mut self, bounds: WorldBounds) -> Self {
        self.bounds = bounds;
        self
    }

    pub(crate) fn set_bounds(&mut self, bounds: WorldBounds) {
        self.bounds = bounds;
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Model name requests run against.
    pub fn model(&self) -> &str {
        self.config
            .model
            .as_deref()
            .unwrap_or_else(|| self.backend.model())
    }

    /// Describe `coordinate`, using `context` as neighborhood hints.
    pub async fn generate(
        &self,
        coordinate: Coordinate,
        context: &[(Coordinate, String)],
    ) -> GeneratedText {
        let prompt = prompt::build_prompt(coordinate, self.bounds, context);
        self.wait_for_gate().await;

        let (outcome, attempts) = match self.request_with_retry(coordinate, &prompt).await {
            Ok((raw, attempts)) => (clean_response(&raw), attempts),
            Err(error) => (Err(error), self.config.max_attempts.max(1)),
        };

        match outcome {
            Ok(text) => {
                self.observer.generated(coordinate, attempts);
                GeneratedText {
                    text,
                    origin: TextOrigin::Backend,
                    attempts,
                }
            }
            Err(error) => {
                self.observer.fell_back(coordinate, &error);
                GeneratedText {
                    text: self.fallback(coordinate),
                    origin: TextOrigin::Fallback,
                    attempts,
                }
            }
        }
    }

    /// The offline description for `coordinate`.
    pub fn fallback(&self, coordinate: Coordinate) -> String {
        fallback_description(coordinate, &self.catalog)
    }

    /// Send a tiny probe outside the rate gate and usage counters.
    pub async fn test_connection(&self) -> bool {
        let request = CompletionRequest {
            model: self.config.model.clone(),
            system: self.config.system_prompt.clone(),
            prompt: CONNECTION_PROBE.to_string(),
            max_tokens: 10,
            temperature: 0.0,
        };
        match self.backend.complete(request).await {
            Ok(text) => text.to_lowercase().contains("successful"),
            Err(error) => {
                tracing::debug!(%error, "connection test failed");
                false
            }
        }
    }

    pub async fn usage(&self) -> UsageStats {
        let gate = self.gate.lock().await;
        UsageStats {
            successful_calls: gate.successful_calls,
            last_call: gate.last_call,
            min_interval: gate.min_interval,
            model: self.model().to_string(),
        }
    }

    /// Change the minimum interval between requests. Values below
    /// [`MIN_INTERVAL_FLOOR`] are raised to it.
    pub async fn set_min_interval(&self, interval: Duration) {
        self.gate.lock().await.min_interval = interval.max(MIN_INTERVAL_FLOOR);
    }

    /// Wait until `min_interval` has passed since the previous request.
    ///
    /// The lock is held across the sleep so concurrent callers queue up.
    async fn wait_for_gate(&self) {
        let mut gate = self.gate.lock().await;
        if let Some(last) = gate.last_request {
            let ready_at = last + gate.min_interval;
            if Instant::now() < ready_at {
                tracing::trace!(wait = ?(ready_at - Instant::now()), "rate limit delay");
                tokio::time::sleep_until(ready_at).await;
            }
        }
        gate.last_request = Some(Instant::now());
        gate.last_call = Some(Utc::now());
    }

    /// Run the request, retrying transport failures with exponential backoff.
    async fn request_with_retry(
        &self,
        coordinate: Coordinate,
        prompt: &str,
    ) -> Result<(String, u32), BackendError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut last_error = BackendError::EmptyResponse;

        for attempt in 1..=max_attempts {
            let delay = self.config.backoff_delay(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let request = CompletionRequest {
                model: self.config.model.clone(),
                system: self.config.system_prompt.clone(),
                prompt: prompt.to_string(),
                max_tokens: self.config.max_tokens,
                temperature: self.config.temperature,
            };

            match self.backend.complete(request).await {
                Ok(raw) => {
                    self.gate.lock().await.successful_calls += 1;
                    return Ok((raw, attempt));
                }
                Err(error) => {
                    self.observer.attempt_failed(coordinate, attempt, &error);
                    last_error = error;
                }
            }
        }

        Err(BackendError::Exhausted {
            attempts: max_attempts,
            last: Box::new(last_error),
        })
    }
}

/// Strip surrounding whitespace and one matching pair of quotes.
///
/// Text that is empty afterwards is rejected.
pub fn clean_response(raw: &str) -> Result<String, BackendError> {
    let trimmed = raw.trim();
    let unquoted = ['"', '\'']
        .into_iter()
        .find_map(|quote| {
            trimmed
                .strip_prefix(quote)
                .and_then(|rest| rest.strip_suffix(quote))
        })
        .unwrap_or(trimmed)
        .trim();

    if unquoted.is_empty() {
        Err(BackendError::EmptyResponse)
    } else {
        Ok(unquoted.to_string())
    }
}
