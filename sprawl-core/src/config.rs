//! Configuration for the world and its generator.
//!
//! Everything is an explicit value passed to constructors. `Config::from_env`
//! layers optional `SPRAWL_*` overrides over the defaults; callers that want
//! `.env` support load it (e.g. with `dotenvy`) before calling it.

use crate::coord::WorldBounds;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default system prompt sent with every generation request.
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a creative cyberpunk world generator. Generate immersive, atmospheric descriptions.";

/// Default database file, relative to the working directory.
pub const DEFAULT_DATABASE_PATH: &str = "game_data.db";

/// Lowest interval accepted by [`crate::Generator::set_min_interval`].
pub const MIN_INTERVAL_FLOOR: Duration = Duration::from_millis(100);

/// Errors from reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Settings for the generation backend facade.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Model override; `None` uses the backend's default.
    pub model: Option<String>,

    pub system_prompt: String,

    /// Maximum output length requested from the backend.
    pub max_tokens: usize,

    pub temperature: f32,

    /// Total attempts per generation, including the first.
    pub max_attempts: u32,

    /// Wait before the second attempt; doubles for each later one.
    pub base_delay: Duration,

    /// Minimum time between consecutive generation requests.
    pub min_interval: Duration,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            model: None,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_tokens: 500,
            temperature: 0.8,
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            min_interval: Duration::from_secs(1),
        }
    }
}

impl GeneratorConfig {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_max_tokens(mut self, tokens: usize) -> Self {
        self.max_tokens = tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature.clamp(0.0, 1.0);
        self
    }

    /// At least one attempt is always made.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    /// Wait before 1-indexed `attempt`: zero for the first, then
    /// `base_delay * 2^(attempt - 2)`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        if attempt < 2 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(attempt - 2).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

/// Shape of the world and how much neighborhood feeds each generation.
#[derive(Debug, Clone)]
pub struct WorldConfig {
    pub bounds: WorldBounds,

    /// Radius of the context window around a newly generated cell.
    pub context_radius: u32,

    /// How many records `statistics()` lists as recent.
    pub recent_limit: usize,

    /// Title line written at the top of exports.
    pub export_title: String,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            bounds: WorldBounds::default(),
            context_radius: 1,
            recent_limit: 10,
            export_title: "Neon Sprawl - World Data Export".to_string(),
        }
    }
}

impl WorldConfig {
    pub fn with_bounds(mut self, bounds: WorldBounds) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn with_context_radius(mut self, radius: u32) -> Self {
        self.context_radius = radius;
        self
    }

    pub fn with_recent_limit(mut self, limit: usize) -> Self {
        self.recent_limit = limit;
        self
    }

    pub fn with_export_title(mut self, title: impl Into<String>) -> Self {
        self.export_title = title.into();
        self
    }
}

/// Complete configuration for a world session.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: PathBuf,
    pub world: WorldConfig,
    pub generator: GeneratorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            world: WorldConfig::default(),
            generator: GeneratorConfig::default(),
        }
    }
}

impl Config {
    /// Defaults overridden by any `SPRAWL_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each key.
    ///
    /// Recognised keys: `SPRAWL_DB_PATH`, `SPRAWL_WORLD_MIN`, `SPRAWL_WORLD_MAX`,
    /// `SPRAWL_CONTEXT_RADIUS`, `SPRAWL_MODEL`, `SPRAWL_MAX_TOKENS`,
    /// `SPRAWL_TEMPERATURE`, `SPRAWL_MAX_ATTEMPTS`, `SPRAWL_RETRY_DELAY_MS`,
    /// `SPRAWL_MIN_INTERVAL_MS`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = lookup("SPRAWL_DB_PATH").filter(|p| !p.trim().is_empty()) {
            config.database_path = PathBuf::from(path);
        }

        let min = parse_var(&lookup, "SPRAWL_WORLD_MIN")?.unwrap_or(config.world.bounds.min);
        let max = parse_var(&lookup, "SPRAWL_WORLD_MAX")?.unwrap_or(config.world.bounds.max);
        if min > max {
            return Err(ConfigError::Invalid {
                key: "SPRAWL_WORLD_MIN",
                value: min.to_string(),
                reason: format!("greater than world max {max}"),
            });
        }
        config.world.bounds = WorldBounds::new(min, max);

        if let Some(radius) = parse_var(&lookup, "SPRAWL_CONTEXT_RADIUS")? {
            config.world.context_radius = radius;
        }

        let mut generator = config.generator;
        if let Some(model) = lookup("SPRAWL_MODEL").filter(|m| !m.trim().is_empty()) {
            generator = generator.with_model(model);
        }
        if let Some(tokens) = parse_var(&lookup, "SPRAWL_MAX_TOKENS")? {
            generator = generator.with_max_tokens(tokens);
        }
        if let Some(temperature) = parse_var(&lookup, "SPRAWL_TEMPERATURE")? {
            generator = generator.with_temperature(temperature);
        }
        if let Some(attempts) = parse_var(&lookup, "SPRAWL_MAX_ATTEMPTS")? {
            generator = generator.with_max_attempts(attempts);
        }
        if let Some(ms) = parse_var(&lookup, "SPRAWL_RETRY_DELAY_MS")? {
            generator = generator.with_base_delay(Duration::from_millis(ms));
        }
        if let Some(ms) = parse_var(&lookup, "SPRAWL_MIN_INTERVAL_MS")? {
            generator = generator.with_min_interval(Duration::from_millis(ms));
        }
        config.generator = generator;

        Ok(config)
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse()
        .map(Some)
        .map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        })
}
