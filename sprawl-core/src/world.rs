//! The world service: memoized generation over the spatial store.
//!
//! A cell is generated the first time it is described and read back from the
//! store every time after that. Generation sees the already-explored cells
//! around it, so neighboring descriptions stay consistent.

use crate::config::WorldConfig;
use crate::coord::{Coordinate, Region, WorldBounds};
use crate::generator::{CompletionBackend, GeneratedText, Generator};
use crate::store::{LocationRecord, SpatialStore, StoreError};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;

/// Errors from world operations.
#[derive(Debug, Error)]
pub enum WorldError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Coordinate {coordinate} is outside the world bounds [{}, {}]", .bounds.min, .bounds.max)]
    OutOfBounds {
        coordinate: Coordinate,
        bounds: WorldBounds,
    },

    #[error("Failed to export world to {}: {source}", .path.display())]
    Export {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode generation metadata: {0}")]
    Metadata(#[from] serde_json::Error),
}

/// How a described location was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Cached,
    Generated,
}

/// A described location, tagged with where it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Location {
    pub record: LocationRecord,
    pub source: Source,
}

impl Location {
    pub fn coordinate(&self) -> Coordinate {
        self.record.coordinate
    }

    pub fn description(&self) -> &str {
        &self.record.description
    }

    pub fn is_cached(&self) -> bool {
        self.source == Source::Cached
    }
}

/// Provenance attached to every generated record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationMetadata {
    /// Model name, or `"fallback"` when the offline catalog was used.
    pub generated_by: String,
    /// Number of neighboring descriptions fed into the prompt.
    pub context_size: usize,
    pub context_radius: u32,
    pub fallback: bool,
}

/// Existence tally over a context window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextStatus {
    pub center: Coordinate,
    pub radius: u32,
    pub total: usize,
    pub existing: usize,
    pub missing: usize,
    pub bounds: Region,
}

/// Outcome of [`WorldService::pregenerate_area`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PregenerationReport {
    pub center: Coordinate,
    pub radius: u32,
    pub total: usize,
    pub generated: usize,
    pub existing: usize,
    pub errors: usize,
    /// Every scanned cell, in scan order.
    pub coordinates: Vec<Coordinate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorldStatistics {
    pub total_generated: u64,
    pub total_possible: u64,
    /// Percentage of the world volume explored, rounded to two decimals.
    pub coverage_percentage: f64,
    /// Newest records first.
    pub recent: Vec<LocationRecord>,
    pub bounds: WorldBounds,
}

/// Result of [`WorldService::validate_integrity`].
///
/// Errors are structural (a record outside the world) and clear `valid`.
/// Warnings are content problems and do not.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntegrityReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub total_checked: usize,
}

/// Coordinates the spatial store and the generator.
pub struct WorldService<B> {
    store: SpatialStore,
    generator: Generator<B>,
    config: WorldConfig,
    /// Held from the second store lookup until the write, so a cell is
    /// never generated twice.
    generation_lock: Mutex<()>,
}

impl<B: CompletionBackend> WorldService<B> {
    pub fn new(store: SpatialStore, mut generator: Generator<B>, config: WorldConfig) -> Self {
        generator.set_bounds(config.bounds);
        Self {
            store,
            generator,
            config,
            generation_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &SpatialStore {
        &self.store
    }

    pub fn generator(&self) -> &Generator<B> {
        &self.generator
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn bounds(&self) -> WorldBounds {
        self.config.bounds
    }

    /// Describe the cell at `coordinate`, generating and storing it on
    /// first visit.
    pub async fn describe(&self, coordinate: Coordinate) -> Result<Location, WorldError> {
        self.check_bounds(coordinate)?;

        if let Some(record) = self.store.get(coordinate).await? {
            return Ok(Location {
                record,
                source: Source::Cached,
            });
        }

        let _guard = self.generation_lock.lock().await;
        // Another caller may have generated it while we waited.
        if let Some(record) = self.store.get(coordinate).await? {
            return Ok(Location {
                record,
                source: Source::Cached,
            });
        }

        let context = self.context_for(coordinate).await?;
        let generated = self.generator.generate(coordinate, &context).await;
        let metadata = self.provenance(&generated, context.len());
        let record = self
            .store
            .put(coordinate, &generated.text, Some(serde_json::to_value(metadata)?))
            .await?;

        tracing::info!(
            %coordinate,
            context = context.len(),
            fallback = generated.is_fallback(),
            "generated new location"
        );

        Ok(Location {
            record,
            source: Source::Generated,
        })
    }

    /// Every cell within the context radius of `center`, clamped to the
    /// world and including `center` itself.
    pub fn context_window_coordinates(&self, center: Coordinate) -> Vec<Coordinate> {
        self.context_region(center).coordinates().collect()
    }

    pub async fn context_window_status(
        &self,
        center: Coordinate,
    ) -> Result<ContextStatus, WorldError> {
        let region = self.context_region(center);
        let total = region.volume() as usize;
        let existing = self.store.region(region).await?.len();

        Ok(ContextStatus {
            center,
            radius: self.config.context_radius,
            total,
            existing,
            missing: total.saturating_sub(existing),
            bounds: region,
        })
    }

    /// Generate every missing cell within `radius` of `center`.
    ///
    /// Cells are visited x outermost, z innermost. A failing cell is counted
    /// and skipped; the scan always runs to the end.
    pub async fn pregenerate_area(&self, center: Coordinate, radius: u32) -> PregenerationReport {
        let coordinates: Vec<Coordinate> = Region::around(center, radius, self.config.bounds)
            .coordinates()
            .collect();
        let mut report = PregenerationReport {
            center,
            radius,
            total: coordinates.len(),
            ..Default::default()
        };

        for &coordinate in &coordinates {
            match self.store.exists(coordinate).await {
                Ok(true) => {
                    report.existing += 1;
                    continue;
                }
                Ok(false) => {}
                Err(error) => {
                    tracing::warn!(%coordinate, %error, "pregeneration lookup failed");
                    report.errors += 1;
                    continue;
                }
            }

            match self.describe(coordinate).await {
                Ok(location) if location.is_cached() => report.existing += 1,
                Ok(_) => report.generated += 1,
                Err(error) => {
                    tracing::warn!(%coordinate, %error, "pregeneration failed");
                    report.errors += 1;
                }
            }
        }

        report.coordinates = coordinates;
        tracing::info!(
            %center,
            radius,
            total = report.total,
            generated = report.generated,
            errors = report.errors,
            "pregeneration finished"
        );
        report
    }

    pub async fn statistics(&self) -> Result<WorldStatistics, WorldError> {
        let total_generated = self.store.count().await?;
        let total_possible = self.config.bounds.volume();
        let coverage = if total_possible == 0 {
            0.0
        } else {
            total_generated as f64 / total_possible as f64 * 100.0
        };

        Ok(WorldStatistics {
            total_generated,
            total_possible,
            coverage_percentage: (coverage * 100.0).round() / 100.0,
            recent: self.store.recent(self.config.recent_limit).await?,
            bounds: self.config.bounds,
        })
    }

    /// Write every stored record to `path` as `(x, y, z): description`
    /// lines under a commented header. Returns the number of records written.
    pub async fn export_all(&self, path: impl AsRef<Path>) -> Result<usize, WorldError> {
        let path = path.as_ref();
        let records = self.store.all().await?;
        let contents = render_export(&self.config.export_title, &records, Utc::now());

        tokio::fs::write(path, contents)
            .await
            .map_err(|source| WorldError::Export {
                path: path.to_path_buf(),
                source,
            })?;

        tracing::info!(path = %path.display(), records = records.len(), "world exported");
        Ok(records.len())
    }

    /// Check every stored record, including any outside the world.
    pub async fn validate_integrity(&self) -> Result<IntegrityReport, WorldError> {
        let records = self.store.all().await?;
        let bounds = self.config.bounds;
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        for record in &records {
            let c = record.coordinate;
            for (axis, value) in [("X", c.x), ("Y", c.y), ("Z", c.z)] {
                if !bounds.contains_axis(value) {
                    errors.push(format!("Cube {c} has invalid {axis} coordinate"));
                }
            }
            if record.description.trim().is_empty() {
                warnings.push(format!("Cube {c} has empty description"));
            }
        }

        Ok(IntegrityReport {
            valid: errors.is_empty(),
            errors,
            warnings,
            total_checked: records.len(),
        })
    }

    /// Store `description` at `coordinate` without generating,
    /// overwriting any existing record.
    pub async fn store_description(
        &self,
        coordinate: Coordinate,
        description: &str,
    ) -> Result<LocationRecord, WorldError> {
        self.check_bounds(coordinate)?;
        let _guard = self.generation_lock.lock().await;
        Ok(self.store.put(coordinate, description, None).await?)
    }

    /// Remove one cell so it is generated again on the next visit.
    pub async fn forget(&self, coordinate: Coordinate) -> Result<bool, WorldError> {
        let _guard = self.generation_lock.lock().await;
        Ok(self.store.delete(coordinate).await?)
    }

    /// Remove every stored cell. Returns how many were removed.
    pub async fn clear(&self) -> Result<u64, WorldError> {
        let _guard = self.generation_lock.lock().await;
        Ok(self.store.clear().await?)
    }

    /// Release the store. Call this on every exit path.
    pub async fn close(self) {
        self.store.close().await;
    }

    fn check_bounds(&self, coordinate: Coordinate) -> Result<(), WorldError> {
        if self.config.bounds.contains(coordinate) {
            Ok(())
        } else {
            Err(WorldError::OutOfBounds {
                coordinate,
                bounds: self.config.bounds,
            })
        }
    }

    fn context_region(&self, center: Coordinate) -> Region {
        Region::around(center, self.config.context_radius, self.config.bounds)
    }

    /// Stored neighbors of `center`, in region-scan order, excluding `center`.
    async fn context_for(
        &self,
        center: Coordinate,
    ) -> Result<Vec<(Coordinate, String)>, StoreError> {
        let records = self.store.region(self.context_region(center)).await?;
        Ok(records
            .into_iter()
            .filter(|r| r.coordinate != center)
            .map(|r| (r.coordinate, r.description))
            .collect())
    }

    fn provenance(&self, generated: &GeneratedText, context_size: usize) -> GenerationMetadata {
        let generated_by = if generated.is_fallback() {
            "fallback".to_string()
        } else {
            self.generator.model().to_string()
        };
        GenerationMetadata {
            generated_by,
            context_size,
            context_radius: self.config.context_radius,
            fallback: generated.is_fallback(),
        }
    }
}

fn render_export(title: &str, records: &[LocationRecord], at: DateTime<Utc>) -> String {
    let mut out = format!(
        "# {title}\n# Total cubes: {}\n# Export timestamp: {}\n\n",
        records.len(),
        at.to_rfc3339_opts(SecondsFormat::Secs, true)
    );
    for record in records {
        // Writing to a String cannot fail.
        let _ = writeln!(out, "{}: {}", record.coordinate, record.description);
    }
    out
}
