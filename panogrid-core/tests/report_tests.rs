// Tests for crawl output rendering

use panogrid_core::model::{LatLng, Orientation, PanoNode};
use panogrid_core::report::{OutputFormat, PanoMap, read_panos, render_panos, write_panos};
use std::path::Path;
use tempfile::TempDir;

fn sample_panos() -> PanoMap {
    let mut panos = PanoMap::new();
    panos.insert(
        "10011022120419112508100".to_string(),
        PanoNode::new("10011022120419112508100", LatLng::new(39.90556, 116.391314))
            .with_date("191125")
            .with_orientation(Orientation::new(1.5, 0.0, 0.0)),
    );
    panos.insert(
        "abc".to_string(),
        PanoNode::new("abc", LatLng::new(39.9, 116.4)),
    );
    panos
}

// ============================================================================
// Output Format Tests
// ============================================================================

#[test]
fn test_output_format_from_str() {
    assert_eq!(OutputFormat::from_str("yaml"), Some(OutputFormat::Yaml));
    assert_eq!(OutputFormat::from_str("YML"), Some(OutputFormat::Yaml));
    assert_eq!(OutputFormat::from_str("Json"), Some(OutputFormat::Json));
    assert_eq!(OutputFormat::from_str("csv"), None);
}

#[test]
fn test_output_format_for_path() {
    assert_eq!(OutputFormat::for_path(Path::new("a_panos.yaml")), OutputFormat::Yaml);
    assert_eq!(OutputFormat::for_path(Path::new("a_panos.json")), OutputFormat::Json);
    assert_eq!(OutputFormat::for_path(Path::new("a_panos")), OutputFormat::Yaml);
}

// ============================================================================
// Rendering Tests
// ============================================================================

#[test]
fn test_yaml_starts_with_size_header() {
    let rendered = render_panos(&sample_panos(), OutputFormat::Yaml).unwrap();
    assert!(rendered.starts_with("# size 2\n"));
    assert!(rendered.contains("latlng:"));
    assert!(rendered.contains("ori:"));
    assert!(rendered.contains("date: N/A"));
}

#[test]
fn test_empty_map_renders_header_only() {
    let rendered = render_panos(&PanoMap::new(), OutputFormat::Yaml).unwrap();
    assert_eq!(rendered, "# size 0\n");
}

#[test]
fn test_json_rendering() {
    let rendered = render_panos(&sample_panos(), OutputFormat::Json).unwrap();
    let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
    assert_eq!(value["abc"]["latlng"], serde_json::json!([39.9, 116.4]));
    assert_eq!(value["abc"]["ori"], serde_json::json!([0.0, 0.0, 0.0]));
}

// ============================================================================
// File Round Trip Tests
// ============================================================================

#[test]
fn test_write_then_read_yaml() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("region_panos.yaml");
    let panos = sample_panos();

    write_panos(&panos, &path).unwrap();
    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.starts_with("# size 2"));

    let back = read_panos(&path).unwrap();
    assert_eq!(back, panos);
}

#[test]
fn test_read_empty_yaml() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty_panos.yaml");
    write_panos(&PanoMap::new(), &path).unwrap();
    assert!(read_panos(&path).unwrap().is_empty());
}
