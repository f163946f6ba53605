// Crawl output rendering

use crate::error::Result;
use crate::model::PanoNode;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Discovered panoramas keyed by ID, ordered for stable output.
pub type PanoMap = BTreeMap<String, PanoNode>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Yaml,
    Json,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "yaml" | "yml" => Some(OutputFormat::Yaml),
            "json" => Some(OutputFormat::Json),
            _ => None,
        }
    }

    /// Pick a format from a file extension, defaulting to YAML.
    pub fn for_path(path: &Path) -> Self {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_str)
            .unwrap_or(OutputFormat::Yaml)
    }
}

/// Render the mapping with its `# size N` header line.
///
/// JSON has no comment syntax, so the size is only emitted for YAML.
pub fn render_panos(panos: &PanoMap, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Yaml => {
            let mut out = format!("# size {}\n", panos.len());
            if !panos.is_empty() {
                out.push_str(&serde_yaml::to_string(panos)?);
            }
            Ok(out)
        }
        OutputFormat::Json => Ok(serde_json::to_string_pretty(panos)?),
    }
}

pub fn write_panos(panos: &PanoMap, path: &Path) -> Result<()> {
    let rendered = render_panos(panos, OutputFormat::for_path(path))?;
    let mut file = File::create(path)?;
    file.write_all(rendered.as_bytes())?;
    Ok(())
}

/// Read back a file produced by [`write_panos`]. The size header is a YAML
/// comment and needs no special handling.
pub fn read_panos(path: &Path) -> Result<PanoMap> {
    let content = std::fs::read_to_string(path)?;
    match OutputFormat::for_path(path) {
        OutputFormat::Json => Ok(serde_json::from_str(&content)?),
        OutputFormat::Yaml => {
            let blank = content
                .lines()
                .map(str::trim)
                .all(|l| l.is_empty() || l.starts_with('#'));
            if blank {
                return Ok(PanoMap::new());
            }
            Ok(serde_yaml::from_str(&content)?)
        }
    }
}
