//! Procedurally generated cyberpunk cube world.
//!
//! This crate provides:
//! - A persistent spatial store of location descriptions keyed by coordinate
//! - A rate-limited, retrying generator that never fails (Claude or any
//!   other `CompletionBackend`, with a deterministic offline fallback)
//! - A world service that generates each cell once and reads it back after
//!
//! # Quick Start
//!
//! ```ignore
//! use claude::Claude;
//! use sprawl_core::{Config, Coordinate, Generator, SpatialStore, WorldService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let store = SpatialStore::open(&config.database_path).await?;
//!     let generator = Generator::new(Claude::from_env()?, config.generator);
//!     let world = WorldService::new(store, generator, config.world);
//!
//!     let location = world.describe(Coordinate::new(50, 50, 50)).await?;
//!     println!("{}", location.description());
//!
//!     world.close().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod coord;
pub mod generator;
pub mod store;
pub mod testing;
pub mod world;

// Primary public API
pub use config::{Config, ConfigError, GeneratorConfig, WorldConfig};
pub use coord::{Coordinate, Direction, Region, WorldBounds};
pub use generator::{
    BackendError, CompletionBackend, CompletionRequest, GeneratedText, GenerationObserver,
    Generator, TextOrigin, UsageStats,
};
pub use store::{LocationRecord, SpatialStore, StoreError};
pub use testing::{MockBackend, MockReply};
pub use world::{
    ContextStatus, IntegrityReport, Location, PregenerationReport, Source, WorldError,
    WorldService, WorldStatistics,
};
