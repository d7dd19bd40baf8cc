//! # Tracer Daemon Entry Point
//!
//! Runs the scan scheduler against a synthetic world so the engine, adaptive
//! loop and snapshots can be exercised without a host attached.

use clap::Parser;
use log::info;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracer::{
    AnalysisResult, CellKey, PerformanceSignalProvider, PointOfInterest, PresentationSink,
    ProviderError, RegionId, Tracer, TracerConfig, WorldDataProvider,
};

#[derive(Parser)]
#[command(name = "tracer-daemon")]
#[command(about = "Run the lag tracer against a synthetic world", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the snapshot directory
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Number of synthetic regions
    #[arg(long, default_value_t = 2)]
    regions: usize,

    /// Loaded cells extend this far from each region origin
    #[arg(long, default_value_t = 12, value_parser = clap::value_parser!(i32).range(0..=1024))]
    extent: i32,

    /// Synthetic observers per region
    #[arg(long, default_value_t = 3)]
    observers: usize,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(long)]
    run_for: Option<u64>,

    /// Run one server-wide scan at startup
    #[arg(long)]
    server_scan: bool,

    /// Seed for the synthetic world
    #[arg(long, default_value_t = 7)]
    seed: u64,
}

// ================================================================================================
// SYNTHETIC COLLABORATORS
// ================================================================================================

struct SyntheticWorld {
    regions: Vec<RegionId>,
    extent: i32,
    observers: Vec<PointOfInterest>,
    seed: u64,
}

impl SyntheticWorld {
    fn new(regions: usize, extent: i32, observers_per_region: usize, seed: u64) -> Self {
        let extent = extent.max(0);
        let regions: Vec<RegionId> = (0..regions).map(|i| format!("region_{}", i)).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        let mut observers = Vec::new();
        for region in &regions {
            for n in 0..observers_per_region {
                let cell = CellKey::new(
                    region.clone(),
                    rng.gen_range(-extent..=extent),
                    rng.gen_range(-extent..=extent),
                );
                observers.push(PointOfInterest::new(format!("{}-observer-{}", region, n), cell));
            }
        }
        Self {
            regions,
            extent,
            observers,
            seed,
        }
    }

    /// Per-cell generator; hot spots near the origin carry more load.
    fn rng_for(&self, cell: &CellKey, salt: u64) -> StdRng {
        let mut hasher = DefaultHasher::new();
        cell.hash(&mut hasher);
        salt.hash(&mut hasher);
        StdRng::seed_from_u64(hasher.finish() ^ self.seed)
    }

    fn heat(cell: &CellKey) -> u32 {
        let distance = cell.x.unsigned_abs().saturating_add(cell.z.unsigned_abs());
        8u32.saturating_sub(distance)
    }
}

impl WorldDataProvider for SyntheticWorld {
    fn count_entities(&self, cell: &CellKey) -> Result<u32, ProviderError> {
        Ok(self.rng_for(cell, 1).gen_range(0..20) + Self::heat(cell) * 8)
    }

    fn count_structures(&self, cell: &CellKey) -> Result<u32, ProviderError> {
        Ok(self.rng_for(cell, 2).gen_range(0..8) + Self::heat(cell) * 3)
    }

    fn count_mechanisms(&self, cell: &CellKey) -> Result<u32, ProviderError> {
        Ok(self.rng_for(cell, 3).gen_range(0..4) + Self::heat(cell) * 2)
    }

    fn is_cell_loaded(&self, cell: &CellKey) -> bool {
        self.regions.contains(&cell.region)
            && cell.x.unsigned_abs() <= self.extent.unsigned_abs()
            && cell.z.unsigned_abs() <= self.extent.unsigned_abs()
    }

    fn regions(&self) -> Vec<RegionId> {
        self.regions.clone()
    }

    fn loaded_cells_in_region(&self, region: &str) -> Vec<CellKey> {
        if !self.regions.iter().any(|r| r == region) {
            return Vec::new();
        }
        CellKey::new(region, 0, 0).square_around(self.extent.unsigned_abs())
    }

    fn points_of_interest(&self) -> Vec<PointOfInterest> {
        self.observers.clone()
    }
}

/// Signal that drifts between roughly 14 and 20.
struct DriftingSignal {
    current: Mutex<f64>,
}

impl PerformanceSignalProvider for DriftingSignal {
    fn current_signal(&self) -> Result<f64, ProviderError> {
        let mut current = self.current.lock();
        let step: f64 = rand::thread_rng().gen_range(-0.6..0.6);
        *current = (*current + step).clamp(14.0, 20.0);
        Ok(*current)
    }
}

struct LogPresentation;

impl PresentationSink for LogPresentation {
    fn present(&self, observer: &PointOfInterest, results: &[Arc<AnalysisResult>]) {
        let worst = results
            .iter()
            .max_by(|a, b| a.overall_score().total_cmp(&b.overall_score()));
        if let Some(worst) = worst {
            info!(
                "{}: {} cells scanned, worst {}",
                observer.id,
                results.len(),
                worst.summary()
            );
        }
    }
}

// ================================================================================================
// MAIN
// ================================================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => TracerConfig::from_json_file(path)?,
        None => TracerConfig::default(),
    };
    if let Some(dir) = cli.data_dir {
        config.storage.data_dir = dir;
    }

    println!("=================================================");
    println!("  Lag Tracer - Synthetic World                   ");
    println!("=================================================");
    println!();

    let world = Arc::new(SyntheticWorld::new(cli.regions, cli.extent, cli.observers, cli.seed));
    println!(
        "  - {} regions, {} observers, extent {}",
        world.regions.len(),
        world.observers.len(),
        world.extent
    );
    println!("  - Data dir: {}", config.storage.data_dir.display());
    println!();

    let signal = Arc::new(DriftingSignal {
        current: Mutex::new(20.0),
    });
    let tracer = Tracer::new(config, world, signal, Arc::new(LogPresentation))?;
    tracer.start();

    if cli.server_scan {
        let outcome = tracer.analyze_server_wide().await;
        println!(
            "Server-wide scan: {} cells, {} need attention",
            outcome.results().len(),
            outcome.significant_count()
        );
    }

    match cli.run_for {
        Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
        None => tokio::signal::ctrl_c().await?,
    }

    println!();
    println!("{}", tracer.get_statistics());
    println!("{}", tracer.store_stats());
    for result in tracer.worst_cells(5) {
        println!("  {}", result.summary());
    }

    tracer.shutdown().await;

    println!("=================================================");
    println!("  Tracer Shut Down");
    println!("=================================================");

    Ok(())
}
