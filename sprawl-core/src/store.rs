//! Persistent spatial store for generated locations.
//!
//! One SQLite table keyed by the composite `(x, y, z)`. Every mutating call
//! is a single autocommitted statement with `synchronous = FULL`, so it is
//! durable once the future resolves.

use crate::coord::{Coordinate, Region};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors from the spatial store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be opened or its schema created.
    #[error("Failed to open world store at {location}: {source}")]
    Open {
        location: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Store operation failed: {0}")]
    Query(#[from] sqlx::Error),

    #[error("Malformed metadata at {coordinate}: {source}")]
    Metadata {
        coordinate: Coordinate,
        #[source]
        source: serde_json::Error,
    },

    #[error("Malformed timestamp at {coordinate}: {value:?}")]
    Timestamp { coordinate: Coordinate, value: String },
}

impl StoreError {
    /// True for failures to initialise or connect, as opposed to a failed operation.
    pub fn is_open_failure(&self) -> bool {
        matches!(self, StoreError::Open { .. })
    }
}

/// A stored location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRecord {
    pub coordinate: Coordinate,
    pub description: String,
    pub created_at: DateTime<Utc>,
    /// Free-form attachment, usually generation provenance.
    pub metadata: Option<Value>,
}

#[derive(Debug, sqlx::FromRow)]
struct LocationRow {
    x: i32,
    y: i32,
    z: i32,
    description: String,
    created_at: String,
    metadata: Option<String>,
}

impl LocationRow {
    fn into_record(self) -> Result<LocationRecord, StoreError> {
        let coordinate = Coordinate::new(self.x, self.y, self.z);
        let created_at = parse_timestamp(&self.created_at).ok_or_else(|| StoreError::Timestamp {
            coordinate,
            value: self.created_at.clone(),
        })?;
        let metadata = self
            .metadata
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|source| StoreError::Metadata { coordinate, source })?;

        Ok(LocationRecord {
            coordinate,
            description: self.description,
            created_at,
            metadata,
        })
    }
}

const SELECT_COLUMNS: &str = "SELECT x, y, z, description, created_at, metadata FROM locations";

/// SQLite-backed store of location records.
///
/// The pool is pinned to a single connection that lives until [`close`](Self::close).
pub struct SpatialStore {
    pool: Pool<Sqlite>,
    location: String,
}

impl SpatialStore {
    /// Open (or create) the store at `path`, creating parent directories.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let location = path.display().to_string();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Open {
                    location: location.clone(),
                    source: sqlx::Error::Io(e),
                })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        Self::connect(options, location).await
    }

    /// Open a private in-memory store. Contents vanish on close.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let location = "sqlite::memory:".to_string();
        let options =
            SqliteConnectOptions::from_str(&location).map_err(|source| StoreError::Open {
                location: location.clone(),
                source,
            })?;
        Self::connect(options, location).await
    }

    async fn connect(options: SqliteConnectOptions, location: String) -> Result<Self, StoreError> {
        let options = options
            .synchronous(SqliteSynchronous::Full)
            .busy_timeout(Duration::from_secs(5));

        // In-memory databases live and die with their connection, so it is never recycled.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|source| StoreError::Open {
                location: location.clone(),
                source,
            })?;

        let store = Self { pool, location };
        store.migrate().await.map_err(|source| StoreError::Open {
            location: store.location.clone(),
            source,
        })?;

        tracing::debug!(location = %store.location, "world store opened");
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS locations (
                x INTEGER NOT NULL,
                y INTEGER NOT NULL,
                z INTEGER NOT NULL,
                description TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%f000Z', 'now')),
                metadata TEXT,
                PRIMARY KEY (x, y, z)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_locations_created_at ON locations (created_at)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Where this store lives, for diagnostics.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Insert or overwrite the record at `coordinate` and return it as stored.
    pub async fn put(
        &self,
        coordinate: Coordinate,
        description: &str,
        metadata: Option<Value>,
    ) -> Result<LocationRecord, StoreError> {
        let created_at = Utc::now().trunc_subsecs(6);
        let metadata_json = metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|source| StoreError::Metadata { coordinate, source })?;

        // REPLACE re-inserts the row, so an overwrite also takes a fresh rowid.
        sqlx::query(
            "INSERT OR REPLACE INTO locations (x, y, z, description, created_at, metadata) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(coordinate.x)
        .bind(coordinate.y)
        .bind(coordinate.z)
        .bind(description)
        .bind(format_timestamp(created_at))
        .bind(metadata_json)
        .execute(&self.pool)
        .await?;

        Ok(LocationRecord {
            coordinate,
            description: description.to_string(),
            created_at,
            metadata,
        })
    }

    /// Exact lookup. A missing cell is `Ok(None)`.
    pub async fn get(&self, coordinate: Coordinate) -> Result<Option<LocationRecord>, StoreError> {
        let row: Option<LocationRow> =
            sqlx::query_as(&format!("{SELECT_COLUMNS} WHERE x = ? AND y = ? AND z = ?"))
                .bind(coordinate.x)
                .bind(coordinate.y)
                .bind(coordinate.z)
                .fetch_optional(&self.pool)
                .await?;

        row.map(LocationRow::into_record).transpose()
    }

    pub async fn exists(&self, coordinate: Coordinate) -> Result<bool, StoreError> {
        let hit: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM locations WHERE x = ? AND y = ? AND z = ? LIMIT 1")
                .bind(coordinate.x)
                .bind(coordinate.y)
                .bind(coordinate.z)
                .fetch_optional(&self.pool)
                .await?;

        Ok(hit.is_some())
    }

    /// Every record inside the inclusive box, sorted by (x, y, z).
    pub async fn region(&self, region: Region) -> Result<Vec<LocationRecord>, StoreError> {
        let rows: Vec<LocationRow> = sqlx::query_as(&format!(
            "{SELECT_COLUMNS} \
             WHERE x >= ? AND x <= ? AND y >= ? AND y <= ? AND z >= ? AND z <= ? \
             ORDER BY x, y, z"
        ))
        .bind(region.min.x)
        .bind(region.max.x)
        .bind(region.min.y)
        .bind(region.max.y)
        .bind(region.min.z)
        .bind(region.max.z)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(LocationRow::into_record).collect()
    }

    /// Every record regardless of bounds, sorted by (x, y, z).
    pub async fn all(&self) -> Result<Vec<LocationRecord>, StoreError> {
        let rows: Vec<LocationRow> = sqlx::query_as(&format!("{SELECT_COLUMNS} ORDER BY x, y, z"))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(LocationRow::into_record).collect()
    }

    pub async fn count(&self) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM locations")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    /// The `limit` newest records, newest first. Equal timestamps fall back
    /// to insertion order.
    pub async fn recent(&self, limit: usize) -> Result<Vec<LocationRecord>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<LocationRow> = sqlx::query_as(&format!(
            "{SELECT_COLUMNS} ORDER BY created_at DESC, rowid DESC LIMIT ?"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(LocationRow::into_record).collect()
    }

    /// Remove one record. Returns whether anything was removed.
    pub async fn delete(&self, coordinate: Coordinate) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM locations WHERE x = ? AND y = ? AND z = ?")
            .bind(coordinate.x)
            .bind(coordinate.y)
            .bind(coordinate.z)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Remove every record. Returns how many were removed.
    pub async fn clear(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM locations")
            .execute(&self.pool)
            .await?;

        tracing::info!(removed = result.rows_affected(), "world store cleared");
        Ok(result.rows_affected())
    }

    /// Close the underlying connection. Pending statements finish first.
    pub async fn close(self) {
        self.pool.close().await;
        tracing::debug!(location = %self.location, "world store closed");
    }
}

/// Fixed-width RFC 3339 so that text order matches time order.
fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    // SQLite's own CURRENT_TIMESTAMP form, for rows written by other tools.
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn c(x: i32, y: i32, z: i32) -> Coordinate {
        Coordinate::new(x, y, z)
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let store = SpatialStore::open_in_memory().await.unwrap();
        let meta = json!({"generated_by": "test", "context_size": 3});

        let written = store
            .put(c(10, 20, 30), "A rain-slick alley.", Some(meta.clone()))
            .await
            .unwrap();
        let read = store.get(c(10, 20, 30)).await.unwrap().unwrap();

        assert_eq!(read, written);
        assert_eq!(read.description, "A rain-slick alley.");
        assert_eq!(read.metadata, Some(meta));
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let store = SpatialStore::open_in_memory().await.unwrap();
        assert!(store.get(c(1, 2, 3)).await.unwrap().is_none());
        assert!(!store.exists(c(1, 2, 3)).await.unwrap());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let store = SpatialStore::open_in_memory().await.unwrap();
        store.put(c(1, 1, 1), "first", Some(json!({"v": 1}))).await.unwrap();
        store.put(c(1, 1, 1), "second", None).await.unwrap();

        let record = store.get(c(1, 1, 1)).await.unwrap().unwrap();
        assert_eq!(record.description, "second");
        assert_eq!(record.metadata, None);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_region_is_sorted_and_inclusive() {
        let store = SpatialStore::open_in_memory().await.unwrap();
        for coord in [c(2, 0, 0), c(0, 1, 1), c(1, 1, 0), c(0, 0, 2), c(3, 0, 0), c(0, 0, 0)] {
            store.put(coord, "cell", None).await.unwrap();
        }

        let found = store
            .region(Region::new(c(0, 0, 0), c(2, 1, 1)))
            .await
            .unwrap();
        let coords: Vec<_> = found.iter().map(|r| r.coordinate).collect();

        // (0, 0, 2) is outside on z and (3, 0, 0) outside on x.
        assert_eq!(coords, vec![c(0, 0, 0), c(0, 1, 1), c(1, 1, 0), c(2, 0, 0)]);
    }

    #[tokio::test]
    async fn test_all_includes_out_of_bounds_rows() {
        let store = SpatialStore::open_in_memory().await.unwrap();
        store.put(c(150, 50, 50), "far away", None).await.unwrap();
        store.put(c(-1, 0, 0), "below", None).await.unwrap();
        store.put(c(5, 5, 5), "inside", None).await.unwrap();

        let coords: Vec<_> = store
            .all()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.coordinate)
            .collect();
        assert_eq!(coords, vec![c(-1, 0, 0), c(5, 5, 5), c(150, 50, 50)]);
    }

    #[tokio::test]
    async fn test_recent_newest_first() {
        let store = SpatialStore::open_in_memory().await.unwrap();
        store.put(c(0, 0, 0), "a", None).await.unwrap();
        store.put(c(0, 0, 1), "b", None).await.unwrap();
        store.put(c(0, 0, 2), "c", None).await.unwrap();

        let recent = store.recent(2).await.unwrap();
        let names: Vec<_> = recent.iter().map(|r| r.description.as_str()).collect();
        assert_eq!(names, vec!["c", "b"]);

        // Overwriting moves a record to the front.
        store.put(c(0, 0, 0), "a2", None).await.unwrap();
        let recent = store.recent(10).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].description, "a2");
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let store = SpatialStore::open_in_memory().await.unwrap();
        store.put(c(1, 0, 0), "one", None).await.unwrap();
        store.put(c(2, 0, 0), "two", None).await.unwrap();
        store.put(c(3, 0, 0), "three", None).await.unwrap();

        assert!(store.delete(c(1, 0, 0)).await.unwrap());
        assert!(!store.delete(c(1, 0, 0)).await.unwrap());
        assert_eq!(store.count().await.unwrap(), 2);

        assert_eq!(store.clear().await.unwrap(), 2);
        assert_eq!(store.count().await.unwrap(), 0);
        assert_eq!(store.clear().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_description_is_storable() {
        let store = SpatialStore::open_in_memory().await.unwrap();
        store.put(c(50, 50, 50), "", None).await.unwrap();
        let record = store.get(c(50, 50, 50)).await.unwrap().unwrap();
        assert_eq!(record.description, "");
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("nested").join("world.db");

        let store = SpatialStore::open(&path).await.unwrap();
        store.put(c(7, 8, 9), "Persistent neon", None).await.unwrap();
        store.close().await;

        let store = SpatialStore::open(&path).await.unwrap();
        let record = store.get(c(7, 8, 9)).await.unwrap().unwrap();
        assert_eq!(record.description, "Persistent neon");
        store.close().await;
    }

    #[tokio::test]
    async fn test_open_failure_is_reported_as_open() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let blocker = temp_dir.path().join("not_a_dir");
        std::fs::write(&blocker, b"file").unwrap();

        let err = match SpatialStore::open(blocker.join("world.db")).await {
            Ok(_) => panic!("opening beneath a regular file should fail"),
            Err(e) => e,
        };
        assert!(err.is_open_failure());
    }

    #[tokio::test]
    async fn test_malformed_metadata_is_an_error() {
        let store = SpatialStore::open_in_memory().await.unwrap();
        sqlx::query(
            "INSERT INTO locations (x, y, z, description, created_at, metadata) \
             VALUES (4, 4, 4, 'broken', '2024-01-01T00:00:00.000000Z', '{not json')",
        )
        .execute(&store.pool)
        .await
        .unwrap();

        let err = store.get(c(4, 4, 4)).await.unwrap_err();
        assert!(matches!(err, StoreError::Metadata { .. }));
        assert!(!err.is_open_failure());
    }

    #[tokio::test]
    async fn test_default_timestamp_is_readable() {
        let store = SpatialStore::open_in_memory().await.unwrap();
        sqlx::query("INSERT INTO locations (x, y, z, description) VALUES (1, 2, 3, 'seeded')")
            .execute(&store.pool)
            .await
            .unwrap();

        let record = store.get(c(1, 2, 3)).await.unwrap().unwrap();
        assert_eq!(record.description, "seeded");
        assert!(record.metadata.is_none());
    }

    #[tokio::test]
    async fn test_default_timestamp_sorts_with_written_ones() {
        let store = SpatialStore::open_in_memory().await.unwrap();
        sqlx::query("INSERT INTO locations (x, y, z, description) VALUES (1, 2, 3, 'seeded')")
            .execute(&store.pool)
            .await
            .unwrap();
        let written = store.put(c(4, 5, 6), "written", None).await.unwrap();

        let raw: Vec<String> = sqlx::query_scalar("SELECT created_at FROM locations ORDER BY rowid")
            .fetch_all(&store.pool)
            .await
            .unwrap();
        assert_eq!(raw[0].len(), format_timestamp(written.created_at).len());
        assert!(raw[0].ends_with("Z"));

        let recent = store.recent(2).await.unwrap();
        assert_eq!(recent[0].description, "written");
        assert_eq!(recent[1].description, "seeded");
    }

    #[test]
    fn test_timestamp_format_is_fixed_width() {
        let a = DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let b = DateTime::parse_from_rfc3339("2024-05-01T10:00:00.5Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(format_timestamp(a).len(), format_timestamp(b).len());
        assert!(format_timestamp(a) < format_timestamp(b));
        assert_eq!(parse_timestamp(&format_timestamp(b)), Some(b));
        assert!(parse_timestamp("2024-05-01 10:00:00").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }
}
