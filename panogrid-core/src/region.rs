//! Geofences, region definitions and seed grids.

use crate::error::{GeoError, Result};
use crate::geomath::{geo_dist, grid_axis, unit_ll_meter};
use crate::model::LatLng;
use geo::{BoundingRect, Centroid, Contains, LineString, Point, Polygon};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Latitude/longitude bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub lat0: f64,
    pub lng0: f64,
    pub lat1: f64,
    pub lng1: f64,
}

impl Bounds {
    /// Shrink each side by `fraction` of the box extent along that axis.
    pub fn inset(self, fraction: f64) -> Self {
        let dlat = self.lat1 - self.lat0;
        let dlng = self.lng1 - self.lng0;
        Self {
            lat0: self.lat0 + dlat * fraction,
            lat1: self.lat1 - dlat * fraction,
            lng0: self.lng0 + dlng * fraction,
            lng1: self.lng1 - dlng * fraction,
        }
    }
}

/// Simple polygon over WGS-84 vertices. Immutable once built.
#[derive(Debug, Clone)]
pub struct Geofence {
    polygon: Polygon<f64>,
}

impl Geofence {
    pub fn new(vertices: &[LatLng]) -> Result<Self> {
        if vertices.len() < 3 {
            return Err(GeoError::InvalidRegion(format!(
                "geofence needs at least 3 vertices, got {}",
                vertices.len()
            )));
        }
        let exterior: LineString<f64> = vertices.iter().map(|p| (p.lng, p.lat)).collect();
        Ok(Self {
            polygon: Polygon::new(exterior, vec![]),
        })
    }

    /// Strict interior test; points on the boundary are outside.
    pub fn contains(&self, p: LatLng) -> bool {
        self.polygon.contains(&Point::new(p.lng, p.lat))
    }

    pub fn bounds(&self) -> Bounds {
        // a validated polygon always has a bounding rect
        let rect = self
            .polygon
            .bounding_rect()
            .unwrap_or_else(|| geo::Rect::new((0.0, 0.0), (0.0, 0.0)));
        Bounds {
            lat0: rect.min().y,
            lng0: rect.min().x,
            lat1: rect.max().y,
            lng1: rect.max().x,
        }
    }

    pub fn centroid(&self) -> LatLng {
        match self.polygon.centroid() {
            Some(c) => LatLng::new(c.y(), c.x()),
            None => {
                let b = self.bounds();
                LatLng::new((b.lat0 + b.lat1) / 2.0, (b.lng0 + b.lng1) / 2.0)
            }
        }
    }

    pub fn vertices(&self) -> Vec<LatLng> {
        self.polygon
            .exterior()
            .coords()
            .map(|c| LatLng::new(c.y, c.x))
            .collect()
    }
}

/// One entry of a region file.
///
/// Only `square` is implemented; other `type` values are rejected by
/// [`make_region`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionDef {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub center: Option<LatLng>,
    /// Half side length in meters.
    #[serde(default)]
    pub radius: Option<f64>,
}

impl RegionDef {
    pub fn square(center: LatLng, radius: f64) -> Self {
        Self {
            kind: "square".to_string(),
            center: Some(center),
            radius: Some(radius),
        }
    }
}

/// Crawl input: seed spacing plus the regions to cover.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionFile {
    /// Seed spacing in meters.
    pub seed_gap: f64,
    pub regions: Vec<RegionDef>,
}

impl RegionFile {
    pub fn from_yaml(s: &str) -> Result<Self> {
        let file: RegionFile = serde_yaml::from_str(s)?;
        if file.seed_gap.is_nan() || file.seed_gap <= 0.0 {
            return Err(GeoError::InvalidRegion(format!(
                "seed_gap must be positive, got {}",
                file.seed_gap
            )));
        }
        Ok(file)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Self::from_yaml(&s)
    }

    /// Build every geofence up front so a bad entry fails before any crawl.
    pub fn geofences(&self) -> Result<Vec<Geofence>> {
        self.regions.iter().map(make_region).collect()
    }
}

/// Turn a region definition into a geofence.
pub fn make_region(def: &RegionDef) -> Result<Geofence> {
    match def.kind.as_str() {
        "square" => {
            let center = def
                .center
                .ok_or_else(|| GeoError::InvalidRegion("square region needs a center".into()))?;
            let radius = def
                .radius
                .filter(|r| *r > 0.0)
                .ok_or_else(|| GeoError::InvalidRegion("square region needs a positive radius".into()))?;
            let (dy, dx) = unit_ll_meter(center);
            let ry = radius / dy;
            let rx = radius / dx;
            let (y0, y1) = (center.lat - ry, center.lat + ry);
            let (x0, x1) = (center.lng - rx, center.lng + rx);
            Geofence::new(&[
                LatLng::new(y0, x0),
                LatLng::new(y0, x1),
                LatLng::new(y1, x1),
                LatLng::new(y1, x0),
            ])
        }
        other => Err(GeoError::UnsupportedRegion(other.to_string())),
    }
}

/// Evenly spaced seeds over the (optionally inset) bounding box of `fence`,
/// no farther apart than `margin` meters along either axis, keeping only
/// those strictly inside the fence.
pub fn gen_seed_grid(fence: &Geofence, margin: f64, inset: f64) -> Vec<LatLng> {
    let b = fence.bounds().inset(inset);
    let segments = |extent: f64| (extent / margin).ceil().max(0.0) as usize;

    let lat_extent = geo_dist(LatLng::new(b.lat0, b.lng0), LatLng::new(b.lat1, b.lng0));
    let lng_extent = geo_dist(LatLng::new(b.lat0, b.lng0), LatLng::new(b.lat0, b.lng1));
    let lats = grid_axis(b.lat0, b.lat1, segments(lat_extent));
    let lngs = grid_axis(b.lng0, b.lng1, segments(lng_extent));

    lats.iter()
        .flat_map(|&lat| lngs.iter().map(move |&lng| LatLng::new(lat, lng)))
        .filter(|p| fence.contains(*p))
        .collect()
}
