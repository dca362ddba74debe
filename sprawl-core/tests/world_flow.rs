//! End-to-end tests for the world service over an on-disk store.
//!
//! These use `MockBackend`, so they run without network access.

use sprawl_core::testing::{instant_config, MockBackend, MockReply};
use sprawl_core::{
    Coordinate, Generator, Source, SpatialStore, WorldBounds, WorldConfig, WorldError,
    WorldService,
};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

async fn open_world(
    path: &Path,
    backend: Arc<MockBackend>,
    config: WorldConfig,
) -> WorldService<Arc<MockBackend>> {
    let store = SpatialStore::open(path)
        .await
        .expect("Failed to open store");
    let generator = Generator::new(backend, instant_config());
    WorldService::new(store, generator, config)
}

#[tokio::test]
async fn test_exploration_example() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let backend = Arc::new(MockBackend::with_replies(vec![
        MockReply::text("A plaza of cracked holo-tiles."),
        MockReply::text("\"A noodle bar wedged under a billboard.\""),
    ]));
    let world = open_world(
        &dir.path().join("world.db"),
        Arc::clone(&backend),
        WorldConfig::default(),
    )
    .await;

    let first = world.describe(Coordinate::new(50, 50, 50)).await.unwrap();
    assert_eq!(first.source, Source::Generated);
    assert_eq!(first.description(), "A plaza of cracked holo-tiles.");

    let neighbor = world.describe(Coordinate::new(51, 50, 50)).await.unwrap();
    assert_eq!(neighbor.source, Source::Generated);
    assert_eq!(neighbor.description(), "A noodle bar wedged under a billboard.");
    let prompt = &backend.requests()[1].prompt;
    assert!(prompt.contains("- (50, 50, 50): A plaza of cracked holo-tiles."));

    let again = world.describe(Coordinate::new(50, 50, 50)).await.unwrap();
    assert_eq!(again.source, Source::Cached);
    assert_eq!(again.description(), first.description());
    assert_eq!(backend.request_count(), 2);

    let stats = world.statistics().await.unwrap();
    assert_eq!(stats.total_generated, 2);
    assert_eq!(stats.total_possible, 1_000_000);
    assert_eq!(stats.coverage_percentage, 0.0);

    world.close().await;
}

#[tokio::test]
async fn test_generated_cells_survive_reopen() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let path = dir.path().join("nested").join("world.db");
    let c = Coordinate::new(7, 8, 9);

    let backend = Arc::new(MockBackend::new());
    let world = open_world(&path, Arc::clone(&backend), WorldConfig::default()).await;
    let generated = world.describe(c).await.unwrap();
    world.close().await;

    let backend = Arc::new(MockBackend::failing());
    let world = open_world(&path, Arc::clone(&backend), WorldConfig::default()).await;
    let cached = world.describe(c).await.unwrap();

    assert_eq!(cached.source, Source::Cached);
    assert_eq!(cached.record, generated.record);
    assert_eq!(backend.request_count(), 0);
    world.close().await;
}

#[tokio::test]
async fn test_concurrent_describe_generates_once() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let backend = Arc::new(MockBackend::new());
    let world = Arc::new(
        open_world(
            &dir.path().join("world.db"),
            Arc::clone(&backend),
            WorldConfig::default(),
        )
        .await,
    );
    let c = Coordinate::new(20, 30, 40);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let world = Arc::clone(&world);
            tokio::spawn(async move { world.describe(c).await })
        })
        .collect();

    let mut descriptions = Vec::new();
    let mut generated = 0;
    for handle in handles {
        let location = handle.await.unwrap().unwrap();
        if location.source == Source::Generated {
            generated += 1;
        }
        descriptions.push(location.record.description);
    }

    assert_eq!(generated, 1);
    assert_eq!(backend.request_count(), 1);
    assert!(descriptions.iter().all(|d| d == &descriptions[0]));
}

#[tokio::test]
async fn test_export_writes_sorted_records() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let world = open_world(
        &dir.path().join("world.db"),
        Arc::new(MockBackend::new()),
        WorldConfig::default().with_export_title("Test Export"),
    )
    .await;

    world
        .store_description(Coordinate::new(2, 0, 0), "Second.")
        .await
        .unwrap();
    world
        .store_description(Coordinate::new(1, 5, 5), "First.")
        .await
        .unwrap();

    let out = dir.path().join("export.txt");
    let written = world.export_all(&out).await.unwrap();
    assert_eq!(written, 2);

    let content = std::fs::read_to_string(&out).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines[0], "# Test Export");
    assert_eq!(lines[1], "# Total cubes: 2");
    assert!(lines[2].starts_with("# Export timestamp: "));
    assert_eq!(lines[3], "");
    assert_eq!(&lines[4..], ["(1, 5, 5): First.", "(2, 0, 0): Second."]);
}

#[tokio::test]
async fn test_export_to_missing_directory_fails() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let world = open_world(
        &dir.path().join("world.db"),
        Arc::new(MockBackend::new()),
        WorldConfig::default(),
    )
    .await;

    let err = world
        .export_all(dir.path().join("no-such-dir").join("export.txt"))
        .await
        .unwrap_err();
    assert!(matches!(err, WorldError::Export { .. }));
}

#[tokio::test]
async fn test_offline_pregeneration_fills_area_with_fallbacks() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let backend = Arc::new(MockBackend::failing());
    let world = open_world(
        &dir.path().join("world.db"),
        Arc::clone(&backend),
        WorldConfig::default().with_bounds(WorldBounds::new(0, 9)),
    )
    .await;

    let report = world.pregenerate_area(Coordinate::new(0, 0, 9), 2).await;
    assert_eq!(report.total, 3 * 3 * 3);
    assert_eq!(report.generated, 27);
    assert_eq!(report.errors, 0);

    let c = Coordinate::new(1, 1, 8);
    let record = world.store().get(c).await.unwrap().unwrap();
    assert_eq!(record.description, world.generator().fallback(c));

    let validation = world.validate_integrity().await.unwrap();
    assert!(validation.valid);
    assert_eq!(validation.total_checked, 27);
}

#[tokio::test]
async fn test_validation_flags_out_of_bounds_rows() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let world = open_world(
        &dir.path().join("world.db"),
        Arc::new(MockBackend::new()),
        WorldConfig::default(),
    )
    .await;

    world
        .store()
        .put(Coordinate::new(150, 50, 50), "Beyond the wall.", None)
        .await
        .unwrap();
    let report = world.validate_integrity().await.unwrap();
    assert!(!report.valid);
    assert!(report.errors.iter().any(|e| e.contains("invalid X coordinate")));

    world.clear().await.unwrap();
    world
        .store_description(Coordinate::new(50, 50, 50), "")
        .await
        .unwrap();
    let report = world.validate_integrity().await.unwrap();
    assert!(report.valid);
    assert!(report.warnings.iter().any(|w| w.contains("empty description")));
}
