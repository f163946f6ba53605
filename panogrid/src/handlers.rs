use crate::crawl::{Backend, CrawlOptions, execute_crawl, open_store};
use anyhow::{Context, Result, anyhow, bail};
use clap::ArgMatches;
use colored::Colorize;
use panogrid_core::model::named_place;
use panogrid_core::{CountryBoundary, Frame, FrameTransform, LatLng};
use panogrid_scanner::{Adapter, DocumentStore, FetchCache, HttpFetcher, RetryPolicy, VendorKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

type HttpCache = FetchCache<HttpFetcher, Box<dyn DocumentStore>>;

/// Expand `~` and environment variables in a user supplied path
pub fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    match shellexpand::full(&raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(shellexpand::tilde(&raw).as_ref()),
    }
}

/// Parse a coordinate pair, or a place name when the longitude is omitted.
pub fn parse_latlng(lat: &str, lng: Option<&str>) -> Result<LatLng> {
    let Some(lng) = lng else {
        return named_place(lat.trim()).ok_or_else(|| {
            anyhow!("'{}' is neither a known place nor a coordinate pair", lat.trim())
        });
    };
    let lat: f64 = lat
        .trim()
        .parse()
        .with_context(|| format!("Invalid latitude '{}'", lat.trim()))?;
    let lng: f64 = lng
        .trim()
        .parse()
        .with_context(|| format!("Invalid longitude '{}'", lng.trim()))?;
    if !(-90.0..=90.0).contains(&lat) {
        bail!("Latitude {} is out of range", lat);
    }
    if !(-180.0..=180.0).contains(&lng) {
        bail!("Longitude {} is out of range", lng);
    }
    Ok(LatLng::new(lat, lng))
}

/// Frame transform backed by the boundary file, or the built-in boundary.
pub fn load_frame(boundary: Option<&PathBuf>) -> Result<FrameTransform> {
    match boundary {
        Some(path) => {
            let path = expand_path(path);
            let boundary = CountryBoundary::from_path(&path)
                .with_context(|| format!("Failed to load boundary {}", path.display()))?;
            Ok(FrameTransform::new(boundary))
        }
        None => Ok(FrameTransform::default()),
    }
}

/// Retry settings from `--timeout` and `--retries`
pub fn retry_policy(args: &ArgMatches) -> RetryPolicy {
    let defaults = RetryPolicy::default();
    RetryPolicy {
        base_timeout: args
            .get_one::<u64>("timeout")
            .map(|s| Duration::from_secs(*s))
            .unwrap_or(defaults.base_timeout),
        retries: args.get_one::<u32>("retries").copied().unwrap_or(defaults.retries),
    }
}

fn vendor(args: &ArgMatches) -> Result<VendorKind> {
    let name = args
        .get_one::<String>("map-type")
        .map(String::as_str)
        .unwrap_or("qmap");
    VendorKind::from_str(name).ok_or_else(|| anyhow!("Unknown map type '{}'", name))
}

fn backend(args: &ArgMatches) -> Result<Backend> {
    let name = args
        .get_one::<String>("backend")
        .map(String::as_str)
        .unwrap_or("fs");
    Backend::from_str(name).ok_or_else(|| anyhow!("Unknown backend '{}'", name))
}

/// Provider adapter plus a cache over HTTP, both configured from the
/// shared provider flags.
fn open_provider(args: &ArgMatches) -> Result<(VendorKind, Adapter, HttpCache)> {
    let kind = vendor(args)?;
    let frame = load_frame(args.get_one::<PathBuf>("boundary"))?;
    let floor = args.get_one::<i64>("floor").copied().unwrap_or(0);
    let adapter = Adapter::new(kind, Arc::new(frame)).with_floor(floor);

    let cache_dir = expand_path(Path::new(
        args.get_one::<String>("cache-dir")
            .map(String::as_str)
            .unwrap_or("info_cache"),
    ));
    let store = open_store(backend(args)?, &cache_dir)?;
    let fetcher = HttpFetcher::new().context("Failed to build HTTP client")?;
    let cache = FetchCache::new(fetcher, store, retry_policy(args))
        .context("Failed to load the failure list")?;
    Ok((kind, adapter, cache))
}

pub async fn handle_crawl(args: &ArgMatches, quiet: bool) -> Result<()> {
    let regions_path = args
        .get_one::<PathBuf>("REGIONS")
        .map(|p| expand_path(p))
        .ok_or_else(|| anyhow!("A regions file is required"))?;
    let (kind, adapter, cache) = open_provider(args)?;

    let options = CrawlOptions {
        regions_path,
        output: args.get_one::<PathBuf>("out").map(|p| expand_path(p)),
        vendor: kind,
        workers: args.get_one::<usize>("workers").copied().unwrap_or(8),
        inset: args.get_one::<f64>("inset").copied().unwrap_or(0.0),
        show_progress: !quiet,
    };

    if !quiet {
        print_divider();
        println!("{} {}", "Provider:".bright_cyan().bold(), kind.as_str());
        println!("{} {}", "Workers:".bright_cyan().bold(), options.workers);
        print_divider();
    }

    let summary = execute_crawl(options, &adapter, &cache).await?;

    println!(
        "{} {} panoramas from {} regions ({} seeds, {} requests, {} known failures)",
        "✓".green().bold(),
        summary.panos.len(),
        summary.regions,
        summary.seeds,
        summary.requests,
        cache.failure_count()
    );
    println!("{} {}", "Written to".bright_cyan(), summary.output.display());
    Ok(())
}

pub async fn handle_pano(args: &ArgMatches) -> Result<()> {
    let id = args
        .get_one::<String>("ID")
        .ok_or_else(|| anyhow!("A panorama ID is required"))?;
    let (_, adapter, cache) = open_provider(args)?;

    let result = adapter.get_pano(&cache, id, None).await;
    cache.persist_failures()?;
    match result.and_then(|r| r.node) {
        Some(node) => {
            println!("{} {} {}", node.id, node.latlng.lat, node.latlng.lng);
            Ok(())
        }
        None => bail!("No panorama with ID {}", id),
    }
}

pub async fn handle_locate(args: &ArgMatches) -> Result<()> {
    let p = parse_latlng(
        args.get_one::<String>("LAT").map(String::as_str).unwrap_or_default(),
        args.get_one::<String>("LNG").map(String::as_str),
    )?;
    let (_, adapter, cache) = open_provider(args)?;

    match adapter.get_pano_by_latlng(&cache, p).await {
        Some(id) => {
            println!("{}", id);
            Ok(())
        }
        None => bail!("No {} panorama near {}", adapter.name(), p),
    }
}

/// Convert `p` between two named frames.
pub fn convert_point(frame: &FrameTransform, p: LatLng, from: &str, to: &str) -> Result<LatLng> {
    let from = Frame::from_str(from).ok_or_else(|| anyhow!("Unknown frame '{}'", from))?;
    let to = Frame::from_str(to).ok_or_else(|| anyhow!("Unknown frame '{}'", to))?;
    Ok(frame.convert(p, from, to))
}

pub fn handle_convert(args: &ArgMatches) -> Result<()> {
    let p = parse_latlng(
        args.get_one::<String>("LAT").map(String::as_str).unwrap_or_default(),
        args.get_one::<String>("LNG").map(String::as_str),
    )?;
    let frame = load_frame(args.get_one::<PathBuf>("boundary"))?;
    let from = args.get_one::<String>("from").map(String::as_str).unwrap_or("wgs84");
    let to = args.get_one::<String>("to").map(String::as_str).unwrap_or("gcj02");

    let q = convert_point(&frame, p, from, to)?;
    println!("{:.8} {:.8}", q.lat, q.lng);
    Ok(())
}

fn print_divider() {
    println!("{}", "═".repeat(60).bright_blue().bold());
}

pub fn print_banner() {
    print_divider();
    println!(
        "{} {}",
        "panogrid".bright_cyan().bold(),
        env!("CARGO_PKG_VERSION").dimmed()
    );
    println!("{}", "street-level panorama region crawler".dimmed());
    print_divider();
}

pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {}", "✗".red().bold(), err);
    for cause in err.chain().skip(1) {
        eprintln!("  {} {}", "caused by:".dimmed(), cause);
    }
}
