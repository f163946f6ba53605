use serde::{Deserialize, Serialize};
use std::fmt;

/// A (latitude, longitude) pair in degrees.
///
/// Always WGS-84 unless a function says it takes or returns provider-native
/// coordinates. Serializes as a `[lat, lng]` sequence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Round both components to `digits` decimal places.
    pub fn round_to(self, digits: i32) -> Self {
        let scale = 10f64.powi(digits);
        Self {
            lat: (self.lat * scale).round() / scale,
            lng: (self.lng * scale).round() / scale,
        }
    }

    /// Largest absolute per-axis difference, in degrees.
    pub fn max_delta(self, other: LatLng) -> f64 {
        (self.lat - other.lat).abs().max((self.lng - other.lng).abs())
    }
}

impl From<[f64; 2]> for LatLng {
    fn from([lat, lng]: [f64; 2]) -> Self {
        Self { lat, lng }
    }
}

impl From<LatLng> for [f64; 2] {
    fn from(p: LatLng) -> Self {
        [p.lat, p.lng]
    }
}

impl From<(f64, f64)> for LatLng {
    fn from((lat, lng): (f64, f64)) -> Self {
        Self { lat, lng }
    }
}

impl fmt::Display for LatLng {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.lat, self.lng)
    }
}

/// Panorama orientation (pan, tilt, roll) in radians.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f64; 3]", into = "[f64; 3]")]
pub struct Orientation {
    pub pan: f64,
    pub tilt: f64,
    pub roll: f64,
}

impl Orientation {
    pub const fn new(pan: f64, tilt: f64, roll: f64) -> Self {
        Self { pan, tilt, roll }
    }
}

impl From<[f64; 3]> for Orientation {
    fn from([pan, tilt, roll]: [f64; 3]) -> Self {
        Self { pan, tilt, roll }
    }
}

impl From<Orientation> for [f64; 3] {
    fn from(o: Orientation) -> Self {
        [o.pan, o.tilt, o.roll]
    }
}

/// Placeholder date for providers that do not report capture time.
pub const UNKNOWN_DATE: &str = "N/A";

/// A geolocated panorama as stored in the crawl output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanoNode {
    pub id: String,
    pub latlng: LatLng,
    pub date: String,
    #[serde(rename = "ori")]
    pub orientation: Orientation,
}

impl PanoNode {
    pub fn new(id: impl Into<String>, latlng: LatLng) -> Self {
        Self {
            id: id.into(),
            latlng,
            date: UNKNOWN_DATE.to_string(),
            orientation: Orientation::default(),
        }
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = date.into();
        self
    }

    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }
}

/// Well-known places accepted wherever a coordinate is expected.
pub fn named_place(name: &str) -> Option<LatLng> {
    match name.to_lowercase().as_str() {
        "beijing" => Some(LatLng::new(39.9, 116.3)),
        "shanghai" => Some(LatLng::new(31.2323076784, 121.4691562490)),
        "washington" => Some(LatLng::new(47.5, -120.5)),
        _ => None,
    }
}
