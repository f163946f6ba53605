use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use panogrid_core::region::gen_seed_grid;
use panogrid_core::report::write_panos;
use panogrid_core::{FrameTransform, GeoError, Geofence, PanoMap, RegionFile};
use panogrid_scanner::crawler::{CrawlEvent, CrawlState, ProgressCallback};
use panogrid_scanner::{
    Adapter, DocumentStore, FetchCache, Fetcher, FsStore, RegionCrawler, SqliteStore, VendorKind,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// File name of the SQLite cache inside the cache directory.
pub const SQLITE_FILE: &str = "panos.db";

/// Where raw provider documents are kept between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Fs,
    Sqlite,
}

impl Backend {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "fs" => Some(Backend::Fs),
            "sqlite" => Some(Backend::Sqlite),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Fs => "fs",
            Backend::Sqlite => "sqlite",
        }
    }
}

/// Open the document store for `backend` under `dir`, creating it if needed.
pub fn open_store(backend: Backend, dir: &Path) -> Result<Box<dyn DocumentStore>> {
    let store: Box<dyn DocumentStore> = match backend {
        Backend::Fs => Box::new(
            FsStore::new(dir).with_context(|| format!("Cannot use cache dir {}", dir.display()))?,
        ),
        Backend::Sqlite => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Cannot create cache dir {}", dir.display()))?;
            let path = dir.join(SQLITE_FILE);
            Box::new(
                SqliteStore::open(&path)
                    .with_context(|| format!("Cannot open cache db {}", path.display()))?,
            )
        }
    };
    Ok(store)
}

/// Options for one crawl run
pub struct CrawlOptions {
    pub regions_path: PathBuf,
    /// Defaults to `<regions stem>_panos.yaml` next to the regions file.
    pub output: Option<PathBuf>,
    pub vendor: VendorKind,
    pub workers: usize,
    pub inset: f64,
    pub show_progress: bool,
}

/// What a finished crawl produced
pub struct CrawlSummary {
    pub panos: PanoMap,
    pub output: PathBuf,
    pub regions: usize,
    pub seeds: usize,
    pub requests: usize,
}

/// `regions/city.yaml` -> `regions/city_panos.yaml`
pub fn default_output_path(regions_path: &Path) -> PathBuf {
    let stem = regions_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "regions".to_string());
    regions_path.with_file_name(format!("{stem}_panos.yaml"))
}

/// Regions inside the country boundary can only be served by the providers
/// that publish obfuscated coordinates, and the other way around.
pub fn check_coverage(
    vendor: VendorKind,
    frame: &FrameTransform,
    fence: &Geofence,
) -> std::result::Result<(), GeoError> {
    let centroid = fence.centroid();
    let inside = frame.in_boundary(centroid);
    if inside == vendor.serves_obfuscated_region() {
        return Ok(());
    }
    let place = if inside { "inside" } else { "outside" };
    Err(GeoError::CoverageMismatch(format!(
        "region centred at {} lies {} the country boundary and cannot be crawled with {}",
        centroid,
        place,
        vendor.as_str()
    )))
}

fn crawl_spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message("Starting crawl...");
    pb
}

fn spinner_callback(pb: ProgressBar, region: usize, regions: usize) -> ProgressCallback {
    Arc::new(move |event: CrawlEvent| {
        let msg = match event {
            CrawlEvent::State(CrawlState::Seeding) => "resolving seeds".to_string(),
            CrawlEvent::State(CrawlState::Expanding) => "expanding".to_string(),
            CrawlEvent::State(CrawlState::Drained) => "drained".to_string(),
            CrawlEvent::Seeded { resolved, seeds } => {
                format!("{resolved} of {seeds} seeds resolved")
            }
            CrawlEvent::Level { depth, frontier } => {
                format!("level {depth}, {frontier} panoramas queued")
            }
            CrawlEvent::Accepted { total, .. } => format!("{total} panoramas kept"),
        };
        pb.set_message(format!("Region {}/{}: {}", region, regions, msg));
    })
}

/// Crawl every region of the regions file and write the merged result.
///
/// All regions are validated (shape and provider coverage) before the first
/// request goes out.
pub async fn execute_crawl<F: Fetcher, S: DocumentStore>(
    options: CrawlOptions,
    adapter: &Adapter,
    cache: &FetchCache<F, S>,
) -> Result<CrawlSummary> {
    let CrawlOptions {
        regions_path,
        output,
        vendor,
        workers,
        inset,
        show_progress,
    } = options;

    let region_file = RegionFile::from_path(&regions_path)
        .with_context(|| format!("Failed to load regions from {}", regions_path.display()))?;
    let fences = region_file.geofences()?;
    for fence in &fences {
        check_coverage(vendor, adapter.frame(), fence)?;
    }
    let output = output.unwrap_or_else(|| default_output_path(&regions_path));

    let progress_bar = show_progress.then(crawl_spinner);
    let mut panos = PanoMap::new();
    let mut seeds_total = 0;
    for (idx, fence) in fences.iter().enumerate() {
        let seeds = gen_seed_grid(fence, region_file.seed_gap, inset);
        seeds_total += seeds.len();
        info!(
            "Region {}/{}: {} seeds every {} m",
            idx + 1,
            fences.len(),
            seeds.len(),
            region_file.seed_gap
        );

        let mut crawler = RegionCrawler::new(adapter, cache).with_workers(workers);
        if let Some(ref pb) = progress_bar {
            crawler = crawler.with_progress_callback(spinner_callback(pb.clone(), idx + 1, fences.len()));
        }
        let found = crawler.grab_region(&seeds, fence).await?;
        panos.extend(found);
    }

    write_panos(&panos, &output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    if let Some(pb) = progress_bar {
        pb.finish_with_message(format!(
            "Crawl complete: {} panoramas in {} regions",
            panos.len(),
            fences.len()
        ));
    }

    Ok(CrawlSummary {
        regions: fences.len(),
        seeds: seeds_total,
        requests: cache.request_count(),
        output,
        panos,
    })
}
