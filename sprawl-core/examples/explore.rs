//! Walk a few cells through the sprawl and print what is found.
//!
//! Uses Claude when `ANTHROPIC_API_KEY` is set, otherwise the offline
//! fallback catalog. `SPRAWL_*` variables override the configuration.

use claude::Claude;
use sprawl_core::generator::SilentObserver;
use sprawl_core::testing::MockBackend;
use sprawl_core::{CompletionBackend, Config, Direction, Generator, SpatialStore, WorldService};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let generator = match Claude::from_env() {
        Ok(client) => {
            let backend: Box<dyn CompletionBackend> = Box::new(client);
            Generator::new(backend, config.generator)
        }
        Err(e) => {
            println!("No Claude client ({e}); using offline descriptions.\n");
            // One attempt, no waits, no per-cell warnings.
            let offline = config
                .generator
                .with_max_attempts(1)
                .with_min_interval(Duration::ZERO);
            let backend: Box<dyn CompletionBackend> = Box::new(MockBackend::failing());
            Generator::new(backend, offline).with_observer(Arc::new(SilentObserver))
        }
    };

    let store = SpatialStore::open(&config.database_path).await?;
    let world = WorldService::new(store, generator, config.world);

    let result = walk(&world).await;
    world.close().await;
    result
}

async fn walk(
    world: &WorldService<Box<dyn CompletionBackend>>,
) -> Result<(), Box<dyn std::error::Error>> {
    let bounds = world.bounds();
    let mut position = bounds.center();

    for direction in [None, Some(Direction::Forward), Some(Direction::Up), Some(Direction::Left)] {
        if let Some(direction) = direction {
            match position.step(direction, bounds) {
                Some(next) => position = next,
                None => {
                    println!("Can't go {} from {position}.", direction.name());
                    continue;
                }
            }
        }

        let location = world.describe(position).await?;
        println!("{position} [{:?}]", location.source);
        println!("  {}\n", location.description());
    }

    let status = world.context_window_status(position).await?;
    println!(
        "Around {position}: {} of {} cells explored",
        status.existing, status.total
    );

    let stats = world.statistics().await?;
    println!(
        "World: {} cubes generated ({}% coverage)",
        stats.total_generated, stats.coverage_percentage
    );

    let usage = world.generator().usage().await;
    println!("Backend: {} successful calls to {}", usage.successful_calls, usage.model);
    Ok(())
}
