// Tests for the CLI helpers and crawl orchestration
use panogrid::crawl::SQLITE_FILE;
use panogrid::*;
use panogrid_core::report::read_panos;
use panogrid_core::{FrameTransform, GeoError, LatLng, RegionFile};
use panogrid_scanner::vendor::{Gmap, PanoProvider};
use panogrid_scanner::{Adapter, FetchCache, MemoryFetcher, MemoryStore, RetryPolicy, VendorKind};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const BASE: &str = "mem://gmap";

// ============================================================================
// Argument helpers
// ============================================================================

#[test]
fn test_default_output_path() {
    assert_eq!(
        default_output_path(Path::new("regions/seattle.yaml")),
        PathBuf::from("regions/seattle_panos.yaml")
    );
    assert_eq!(
        default_output_path(Path::new("city.yml")),
        PathBuf::from("city_panos.yaml")
    );
}

#[test]
fn test_parse_latlng_pair() {
    let p = parse_latlng("39.9", Some(" 116.4 ")).unwrap();
    assert_eq!(p, LatLng::new(39.9, 116.4));
    let p = parse_latlng("-33.86", Some("151.2")).unwrap();
    assert_eq!(p, LatLng::new(-33.86, 151.2));
}

#[test]
fn test_parse_latlng_named_place() {
    assert_eq!(parse_latlng("Beijing", None).unwrap(), LatLng::new(39.9, 116.3));
    assert_eq!(parse_latlng("washington", None).unwrap(), LatLng::new(47.5, -120.5));
    assert!(parse_latlng("atlantis", None).is_err());
}

#[test]
fn test_parse_latlng_invalid() {
    assert!(parse_latlng("north", Some("116.4")).is_err());
    assert!(parse_latlng("91", Some("0")).is_err());
    assert!(parse_latlng("0", Some("181")).is_err());
}

#[test]
fn test_expand_path_keeps_plain_paths() {
    assert_eq!(expand_path(Path::new("info_cache")), PathBuf::from("info_cache"));
}

#[test]
fn test_convert_point_round_trip() {
    let frame = FrameTransform::default();
    let wgs = LatLng::new(39.907687, 116.397617);
    let gcj = convert_point(&frame, wgs, "wgs84", "gcj02").unwrap();
    assert!(gcj.max_delta(wgs) > 1e-4);
    let back = convert_point(&frame, gcj, "gcj02", "wgs84").unwrap();
    assert!(back.max_delta(wgs) < 1e-8);

    let bd = convert_point(&frame, wgs, "wgs84", "bd09").unwrap();
    let back = convert_point(&frame, bd, "bd09", "wgs84").unwrap();
    assert!(back.max_delta(wgs) < 1e-5);

    assert!(convert_point(&frame, wgs, "wgs84", "utm").is_err());
}

#[test]
fn test_convert_point_outside_boundary_is_identity() {
    let frame = FrameTransform::default();
    let p = LatLng::new(47.5, -120.5);
    assert_eq!(convert_point(&frame, p, "wgs84", "gcj02").unwrap(), p);
}

#[test]
fn test_backend_names() {
    assert_eq!(Backend::from_str("fs"), Some(Backend::Fs));
    assert_eq!(Backend::from_str("SQLite"), Some(Backend::Sqlite));
    assert_eq!(Backend::from_str("redis"), None);
    assert_eq!(Backend::Sqlite.as_str(), "sqlite");
}

#[test]
fn test_open_store_sqlite_creates_database() {
    let dir = TempDir::new().unwrap();
    let cache_dir = dir.path().join("cache");
    open_store(Backend::Sqlite, &cache_dir).unwrap();
    assert!(cache_dir.join(SQLITE_FILE).exists());

    open_store(Backend::Fs, &dir.path().join("fs")).unwrap();
    assert!(dir.path().join("fs").is_dir());
}

// ============================================================================
// Coverage pairing
// ============================================================================

fn fence_at(center: &str) -> panogrid_core::Geofence {
    let yaml = format!("seed_gap: 100\nregions:\n  - type: square\n    center: {center}\n    radius: 300\n");
    RegionFile::from_yaml(&yaml)
        .unwrap()
        .geofences()
        .unwrap()
        .remove(0)
}

#[test]
fn test_check_coverage() {
    let frame = FrameTransform::default();
    let beijing = fence_at("[39.9, 116.4]");
    let washington = fence_at("[47.5, -120.5]");

    assert!(check_coverage(VendorKind::Qmap, &frame, &beijing).is_ok());
    assert!(check_coverage(VendorKind::Amap, &frame, &beijing).is_ok());
    assert!(matches!(
        check_coverage(VendorKind::Gmap, &frame, &beijing),
        Err(GeoError::CoverageMismatch(_))
    ));

    assert!(check_coverage(VendorKind::Gmap, &frame, &washington).is_ok());
    assert!(matches!(
        check_coverage(VendorKind::Qmap, &frame, &washington),
        Err(GeoError::CoverageMismatch(_))
    ));
}

// ============================================================================
// execute_crawl
// ============================================================================

fn pano_doc(id: &str, p: LatLng, links: &[&str]) -> String {
    json!({
        "Data": {"imagery_type": 1, "image_date": "2021-05"},
        "Location": {"panoId": id, "lat": p.lat, "lng": p.lng},
        "Links": links.iter().map(|l| json!({"panoId": l})).collect::<Vec<_>>()
    })
    .to_string()
}

fn gmap_adapter() -> Adapter {
    Adapter::with_provider(
        Box::new(Gmap::with_base(BASE)),
        Arc::new(FrameTransform::default()),
    )
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        base_timeout: Duration::from_millis(1),
        retries: 1,
    }
}

fn write_regions(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("regions.yaml");
    fs::write(&path, body).unwrap();
    path
}

fn options(regions_path: PathBuf, vendor: VendorKind) -> CrawlOptions {
    CrawlOptions {
        regions_path,
        output: None,
        vendor,
        workers: 4,
        inset: 0.0,
        show_progress: false,
    }
}

const TWO_REGIONS: &str = "seed_gap: 500
regions:
  - type: square
    center: [47.5, -120.5]
    radius: 200
  - type: square
    center: [47.52, -120.5]
    radius: 200
";

#[tokio::test]
async fn test_execute_crawl_merges_regions() {
    let dir = TempDir::new().unwrap();
    let regions_path = write_regions(dir.path(), TWO_REGIONS);
    let fences = RegionFile::from_yaml(TWO_REGIONS).unwrap().geofences().unwrap();

    let frame = FrameTransform::default();
    let gmap = Gmap::with_base(BASE);
    let a = LatLng::new(47.5, -120.5);
    let b = LatLng::new(47.5003, -120.5);
    let c = LatLng::new(47.51, -120.5);
    let d = LatLng::new(47.52, -120.5);

    let mut fetcher = MemoryFetcher::new()
        .with_body(gmap.url_by_id(0, "A"), pano_doc("A", a, &["B"]))
        .with_body(gmap.url_by_id(0, "B"), pano_doc("B", b, &["A", "C"]))
        .with_body(gmap.url_by_id(0, "C"), pano_doc("C", c, &["B"]))
        .with_body(gmap.url_by_id(0, "D"), pano_doc("D", d, &[]));
    // one seed per region, at its centre
    for (fence, answer) in fences.iter().zip([("A", a), ("D", d)]) {
        let seeds = panogrid_core::region::gen_seed_grid(fence, 500.0, 0.0);
        assert_eq!(seeds.len(), 1);
        fetcher = fetcher.with_body(
            gmap.url_by_location(0, seeds[0], &frame),
            pano_doc(answer.0, answer.1, &[]),
        );
    }

    let adapter = gmap_adapter();
    let cache = FetchCache::new(fetcher, MemoryStore::new(), fast_policy()).unwrap();
    let summary = execute_crawl(options(regions_path, VendorKind::Gmap), &adapter, &cache)
        .await
        .unwrap();

    let ids: Vec<&String> = summary.panos.keys().collect();
    assert_eq!(ids, vec!["A", "B", "D"]);
    assert_eq!(summary.regions, 2);
    assert_eq!(summary.seeds, 2);
    assert_eq!(summary.output, dir.path().join("regions_panos.yaml"));

    let written = read_panos(&summary.output).unwrap();
    assert_eq!(written.len(), 3);
    assert_eq!(written["B"].date, "2105");
    assert!(written["B"].latlng.max_delta(b) < 1e-9);
}

#[tokio::test]
async fn test_execute_crawl_explicit_json_output() {
    let dir = TempDir::new().unwrap();
    let regions_path = write_regions(dir.path(), TWO_REGIONS);
    let out = dir.path().join("out.json");

    let adapter = gmap_adapter();
    let cache = FetchCache::new(MemoryFetcher::new(), MemoryStore::new(), fast_policy()).unwrap();
    let mut opts = options(regions_path, VendorKind::Gmap);
    opts.output = Some(out.clone());
    let summary = execute_crawl(opts, &adapter, &cache).await.unwrap();

    // no seed resolves: the output is written, but empty
    assert!(summary.panos.is_empty());
    let body: serde_json::Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(body, json!({}));
}

#[tokio::test]
async fn test_execute_crawl_coverage_mismatch_is_fatal_before_fetch() {
    let dir = TempDir::new().unwrap();
    let regions_path = write_regions(
        dir.path(),
        "seed_gap: 100\nregions:\n  - type: square\n    center: [39.9, 116.4]\n    radius: 300\n",
    );

    let adapter = gmap_adapter();
    let cache = FetchCache::new(MemoryFetcher::new(), MemoryStore::new(), fast_policy()).unwrap();
    let err = execute_crawl(options(regions_path, VendorKind::Gmap), &adapter, &cache)
        .await
        .err()
        .unwrap();

    assert!(matches!(
        err.downcast_ref::<GeoError>(),
        Some(GeoError::CoverageMismatch(_))
    ));
    assert!(cache.fetcher().calls().is_empty());
    assert!(!dir.path().join("regions_panos.yaml").exists());
}

#[tokio::test]
async fn test_execute_crawl_unsupported_region_is_fatal() {
    let dir = TempDir::new().unwrap();
    let regions_path = write_regions(
        dir.path(),
        "seed_gap: 100\nregions:\n  - type: square\n    center: [47.5, -120.5]\n    radius: 300\n  - type: circle\n    center: [47.5, -120.5]\n    radius: 300\n",
    );

    let adapter = gmap_adapter();
    let cache = FetchCache::new(MemoryFetcher::new(), MemoryStore::new(), fast_policy()).unwrap();
    let err = execute_crawl(options(regions_path, VendorKind::Gmap), &adapter, &cache)
        .await
        .err()
        .unwrap();

    assert!(matches!(
        err.downcast_ref::<GeoError>(),
        Some(GeoError::UnsupportedRegion(kind)) if kind == "circle"
    ));
    assert!(cache.fetcher().calls().is_empty());
}

#[tokio::test]
async fn test_execute_crawl_missing_regions_file() {
    let dir = TempDir::new().unwrap();
    let adapter = gmap_adapter();
    let cache = FetchCache::new(MemoryFetcher::new(), MemoryStore::new(), fast_policy()).unwrap();
    let result = execute_crawl(
        options(dir.path().join("nope.yaml"), VendorKind::Gmap),
        &adapter,
        &cache,
    )
    .await;
    assert!(result.is_err());
}
