//! Integration tests for the scan scheduler and the Tracer facade.
//!
//! Tests verify:
//! - Server-wide scans: floor skip, batching, excluded regions
//! - Radius validation and manual scans
//! - Automatic ticks: presentation, cooldowns, statistics
//! - Lifecycle transitions and adaptive interval bounds

mod common;

use common::{test_config, FakeSignal, FakeWorld, RecordingPresentation};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tracer::config::TracerConfig;
use tracer::{CellKey, PointOfInterest, RawCounts, ServerScanOutcome, Tracer, TracerError};

struct Harness {
    tracer: Tracer,
    world: Arc<FakeWorld>,
    signal: Arc<FakeSignal>,
    presentation: Arc<RecordingPresentation>,
    _dir: TempDir,
}

fn harness_with(world: FakeWorld, configure: impl FnOnce(&mut TracerConfig)) -> Harness {
    let tmp_dir = tempfile::tempdir().unwrap();
    let mut config = test_config(tmp_dir.path());
    configure(&mut config);

    let world = Arc::new(world);
    let signal = Arc::new(FakeSignal::new(20.0));
    let presentation = Arc::new(RecordingPresentation::default());
    let tracer = Tracer::new(
        config,
        Arc::clone(&world) as Arc<dyn tracer::WorldDataProvider>,
        Arc::clone(&signal) as Arc<dyn tracer::PerformanceSignalProvider>,
        Arc::clone(&presentation) as Arc<dyn tracer::PresentationSink>,
    )
    .unwrap();

    Harness {
        tracer,
        world,
        signal,
        presentation,
        _dir: tmp_dir,
    }
}

fn harness(world: FakeWorld) -> Harness {
    harness_with(world, |_| {})
}

// ============================================================================
// SERVER-WIDE SCANS
// ============================================================================

#[tokio::test]
async fn test_server_wide_skipped_below_floor() {
    let h = harness(FakeWorld::new(&["w"], 3));
    h.signal.set(12.0);

    let outcome = h.tracer.analyze_server_wide().await;
    match outcome {
        ServerScanOutcome::Skipped { signal } => assert_eq!(signal, 12.0),
        other => panic!("expected skip, got {:?}", other),
    }
    assert_eq!(h.world.total_calls(), 0);
    assert!(h.tracer.get_all_cached().is_empty());
}

#[tokio::test]
async fn test_server_wide_covers_every_loaded_cell() {
    let h = harness_with(FakeWorld::new(&["a", "b", "skip"], 3), |config| {
        config.scanning.excluded_regions = vec!["skip".to_string()];
    });
    h.world.set_counts(CellKey::new("a", 0, 0), RawCounts::new(60, 25, 12));

    let outcome = h.tracer.analyze_server_wide().await;
    assert!(!outcome.is_skipped());
    match &outcome {
        ServerScanOutcome::Completed { results, regions } => {
            assert_eq!(*regions, 2);
            // 7x7 cells per region
            assert_eq!(results.len(), 98);
        }
        other => panic!("expected completion, got {:?}", other),
    }
    assert_eq!(outcome.significant_count(), 1);
    assert_eq!(h.world.measurements(), 98);
    assert!(h.tracer.get_score(&CellKey::new("skip", 0, 0)).is_none());

    let averages = h.tracer.region_averages();
    assert!(averages.contains_key("a"));
    assert!(averages.contains_key("b"));
    assert!(!averages.contains_key("skip"));
}

#[tokio::test(start_paused = true)]
async fn test_server_wide_timer_runs_until_stopped() {
    let h = harness_with(FakeWorld::new(&["w"], 1), |config| {
        config.server_wide.enabled = true;
        config.server_wide.interval = Duration::from_secs(60);
        config.analysis.async_analysis = false;
        config.storage.persistence_enabled = false;
    });
    let scheduler = h.tracer.scheduler();

    h.tracer.start();
    assert!(scheduler.is_server_wide_active());
    assert!(!scheduler.is_running());

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(scheduler.last_server_scan().is_none());

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(h.tracer.get_all_cached().len(), 9);
    let last_run = scheduler.last_server_scan();
    assert!(last_run.is_some());

    scheduler.stop_server_wide();
    assert!(!scheduler.is_server_wide_active());
    h.tracer.clear_cache();
    tokio::time::sleep(Duration::from_secs(180)).await;
    assert!(h.tracer.get_all_cached().is_empty());
    assert_eq!(scheduler.last_server_scan(), last_run);
}

#[tokio::test]
async fn test_broken_signal_is_treated_as_nominal() {
    let h = harness(FakeWorld::new(&["w"], 1));
    h.signal.break_it();

    let outcome = h.tracer.analyze_server_wide().await;
    assert_eq!(outcome.results().len(), 9);
    assert!(outcome.results().iter().all(|r| r.performance_signal() == 20.0));
}

// ============================================================================
// ON-DEMAND SCANS
// ============================================================================

#[tokio::test]
async fn test_radius_is_validated_before_any_work() {
    let h = harness(FakeWorld::new(&["w"], 20));
    let origin = CellKey::new("w", 0, 0);

    for radius in [0, 11] {
        let err = h.tracer.analyze_radius(&origin, radius).await.unwrap_err();
        assert!(matches!(err, TracerError::InvalidRadius { max: 10, .. }));
    }
    assert_eq!(h.world.total_calls(), 0);
}

#[tokio::test]
async fn test_radius_scan_only_touches_loaded_cells() {
    let h = harness(FakeWorld::new(&["w"], 2));

    // corner of the world: 3x3 of the 5x5 square is loaded
    let results = h
        .tracer
        .analyze_radius(&CellKey::new("w", 2, 2), 2)
        .await
        .unwrap();
    assert_eq!(results.len(), 9);
    assert_eq!(h.world.measurements(), 9);

    let stats = h.tracer.scan_statistics();
    assert_eq!(stats.total_scans, 1);
    assert_eq!(stats.cells_analyzed, 9);
}

#[tokio::test]
async fn test_radius_scan_at_coordinate_limits() {
    let h = harness(FakeWorld::new(&["w"], 2));

    let results = h
        .tracer
        .analyze_radius(&CellKey::new("w", i32::MAX, 0), 1)
        .await
        .unwrap();
    assert!(results.is_empty());

    let observer = PointOfInterest::new("edge", CellKey::new("w", i32::MIN, i32::MAX));
    let results = h.tracer.manual_scan(&observer, Some(2)).await.unwrap();
    assert!(results.is_empty());
    assert_eq!(h.world.measurements(), 0);
}

#[tokio::test]
async fn test_manual_scan_presents_results() {
    let h = harness(FakeWorld::new(&["w"], 5));
    let observer = PointOfInterest::new("alice", CellKey::new("w", 0, 0));

    let results = h.tracer.manual_scan(&observer, Some(1)).await.unwrap();
    assert_eq!(results.len(), 9);
    assert_eq!(h.presentation.presented(), vec![("alice".to_string(), 9)]);

    // default radius 5 -> 11x11
    let results = h.tracer.manual_scan(&observer, None).await.unwrap();
    assert_eq!(results.len(), 121);
    // the inner 3x3 came from the cache
    assert_eq!(h.world.measurements(), 121);
}

// ============================================================================
// AUTOMATIC TICKS
// ============================================================================

#[tokio::test]
async fn test_tick_scans_observers_and_applies_cooldowns() {
    let h = harness_with(FakeWorld::new(&["w", "quiet"], 6), |config| {
        config.scanning.default_radius = 1;
        config.scanning.excluded_regions = vec!["quiet".to_string()];
    });
    h.world.add_observer("alice", CellKey::new("w", 0, 0));
    h.world.add_observer("bob", CellKey::new("quiet", 0, 0));

    let scheduler = h.tracer.scheduler();
    scheduler.scan_tick().await;

    assert_eq!(h.presentation.presented(), vec![("alice".to_string(), 9)]);
    assert_eq!(h.world.measurements(), 9);
    let stats = scheduler.statistics();
    assert_eq!(stats.total_scans, 1);
    assert_eq!(stats.cells_analyzed, 9);

    // region cooldown suppresses the next tick entirely
    scheduler.scan_tick().await;
    assert_eq!(h.presentation.presented().len(), 1);
    assert_eq!(scheduler.statistics().total_scans, 2);

    // after reset the cooldowns are gone and the cache answers
    scheduler.reset();
    assert_eq!(scheduler.statistics().total_scans, 0);
    scheduler.scan_tick().await;
    assert_eq!(h.presentation.presented().len(), 2);
    assert_eq!(h.world.measurements(), 9);
}

#[tokio::test]
async fn test_cell_cooldown_suppresses_reanalysis() {
    let h = harness_with(FakeWorld::new(&["w"], 6), |config| {
        config.scanning.default_radius = 1;
        config.scanning.region_cooldown = Duration::ZERO;
        config.scanning.cell_cooldown = Duration::from_secs(300);
    });
    h.world.add_observer("alice", CellKey::new("w", 0, 0));
    let scheduler = h.tracer.scheduler();

    scheduler.scan_tick().await;
    assert_eq!(h.presentation.presented(), vec![("alice".to_string(), 9)]);

    // region is eligible again but every cell in range is cooling
    scheduler.scan_tick().await;
    assert_eq!(h.presentation.presented().len(), 1);
    assert_eq!(h.world.measurements(), 9);
    assert_eq!(scheduler.statistics().total_scans, 2);
    assert_eq!(scheduler.statistics().cells_analyzed, 9);

    // a neighbour overlapping six cooling cells only gets the three new ones
    h.world.add_observer("bob", CellKey::new("w", 1, 0));
    scheduler.scan_tick().await;
    assert_eq!(
        h.presentation.presented(),
        vec![("alice".to_string(), 9), ("bob".to_string(), 3)]
    );
    assert_eq!(h.world.measurements(), 12);
}

#[tokio::test]
async fn test_tick_without_observers_is_a_no_op() {
    let h = harness(FakeWorld::new(&["w"], 3));
    h.tracer.scheduler().scan_tick().await;
    assert_eq!(h.tracer.scan_statistics().total_scans, 0);
    assert_eq!(h.world.measurements(), 0);
}

#[tokio::test]
async fn test_tick_timeout_abandons_but_results_land() {
    let h = harness_with(
        FakeWorld::new(&["w"], 3).with_delay(Duration::from_millis(200)),
        |config| {
            config.scanning.default_radius = 1;
            config.scanning.scan_timeout = Duration::from_millis(50);
            config.analysis.max_concurrent_measurements = 16;
        },
    );
    h.world.add_observer("alice", CellKey::new("w", 0, 0));

    h.tracer.scheduler().scan_tick().await;
    assert!(h.presentation.presented().is_empty());
    assert_eq!(h.tracer.scan_statistics().total_scans, 1);
    assert_eq!(h.tracer.scan_statistics().cells_analyzed, 0);

    tokio::time::sleep(Duration::from_millis(800)).await;
    assert_eq!(h.tracer.get_all_cached().len(), 9);
}

// ============================================================================
// LIFECYCLE & ADAPTIVE
// ============================================================================

#[tokio::test]
async fn test_start_stop_restart() {
    let h = harness(FakeWorld::new(&["w"], 3));
    let scheduler = h.tracer.scheduler();

    assert!(!scheduler.is_running());
    scheduler.start();
    assert!(scheduler.is_running());
    scheduler.start();
    assert!(scheduler.is_running());

    scheduler.stop();
    assert!(!scheduler.is_running());

    scheduler.restart();
    assert!(scheduler.is_running());
    assert_eq!(scheduler.current_interval(), Duration::from_secs(30));

    h.tracer.shutdown().await;
    assert!(!scheduler.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_automatic_scanning_runs_on_its_timer() {
    let h = harness_with(FakeWorld::new(&["w"], 3), |config| {
        config.scanning.automatic = true;
        config.scanning.default_radius = 1;
        config.scanning.region_cooldown = Duration::from_secs(1);
        config.scanning.cell_cooldown = Duration::from_secs(1);
        config.analysis.async_analysis = false;
        config.storage.persistence_enabled = false;
    });
    h.world.add_observer("alice", CellKey::new("w", 0, 0));

    h.tracer.start();
    assert!(h.tracer.is_running());

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(h.presentation.presented().len(), 1);

    h.tracer.stop();
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(h.presentation.presented().len(), 1);
}

#[tokio::test]
async fn test_adaptive_interval_stays_in_bounds() {
    let h = harness(FakeWorld::new(&["w"], 3));
    let scheduler = h.tracer.scheduler();
    let adaptive = h.tracer.config().adaptive.clone();
    scheduler.start();

    for signal in [20.0, 0.0, 5.0, 19.9, 12.0, 20.0, -3.0, 25.0] {
        h.signal.set(signal);
        let interval = scheduler.adapt_interval();
        assert!(interval >= adaptive.min_interval);
        assert!(interval <= adaptive.max_interval);
        assert_eq!(scheduler.current_interval(), interval);
    }

    // lagging host: 30s * (2 - 10/20) = 45s
    h.signal.set(10.0);
    assert_eq!(scheduler.adapt_interval(), Duration::from_secs(45));
    assert!(scheduler.is_running());

    // within hysteresis of the current value nothing changes
    h.signal.set(10.02);
    assert_eq!(scheduler.adapt_interval(), Duration::from_secs(45));

    scheduler.stop();
}

#[tokio::test]
async fn test_statistics_text() {
    let h = harness(FakeWorld::new(&["w"], 3));
    h.tracer
        .analyze_radius(&CellKey::new("w", 0, 0), 1)
        .await
        .unwrap();

    let text = h.tracer.get_statistics();
    assert!(text.starts_with("Scans: 1 | Cells: 9 | Avg Time: "));
    assert!(text.ends_with("| Interval: 30s | Cache: 9"));
}
