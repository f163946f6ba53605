//! WGS-84 <-> GCJ-02 <-> BD-09 frame conversions.
//!
//! GCJ-02 is a closed-form distortion of WGS-84 applied inside the country
//! boundary only. The forward model and its Jacobian are analytic; the inverse
//! is solved by damped Gauss-Newton seeded at the distorted point itself.
//!
//! Boundary polygons are owned by a [`CountryBoundary`] that parses them at
//! most once, on first use, and lives as long as the [`FrameTransform`] that
//! holds it.

use crate::error::{GeoError, Result};
use crate::model::LatLng;
use geo::{Contains, LineString, Point, Polygon};
use glam::{DMat2, DVec2};
use std::f64::consts::PI;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, error, warn};

/// Semi-major axis of the Krasovsky 1940 ellipsoid used by the GCJ-02 model.
const KRASOVSKY_A: f64 = 6_378_245.0;
const KRASOVSKY_EE: f64 = 0.006_693_421_622_965_943;
const BAIDU_FACTOR: f64 = PI * 3000.0 / 180.0;

const EMBEDDED_BORDERS: &str = include_str!("../data/china_borders.json");

/// Residual (degrees) below which the inverse solver stops iterating.
pub const SOLVE_TOLERANCE: f64 = 1e-11;
/// Residual (degrees) above which a solution is reported as unconverged.
pub const SOLVE_WARN_RESIDUAL: f64 = 1e-6;
/// Iteration budget of [`gcj02_to_wgs84`].
pub const SOLVE_MAX_ITERATIONS: usize = 50;

/// National boundary polygons gating the GCJ-02 distortion.
///
/// Polygons are stored with `x = lng`, `y = lat`. A boundary built from JSON
/// is filled at construction; the embedded one is filled on first query.
pub struct CountryBoundary {
    polygons: OnceLock<Vec<Polygon<f64>>>,
}

impl CountryBoundary {
    /// The boundary shipped with the crate, parsed lazily on first query.
    pub fn embedded() -> Self {
        Self {
            polygons: OnceLock::new(),
        }
    }

    /// Parse a JSON list of polygons, each a list of `[lat, lng]` vertices.
    pub fn from_json(json: &str) -> Result<Self> {
        let polygons = parse_polygons(json)?;
        let cell = OnceLock::new();
        let _ = cell.set(polygons);
        Ok(Self { polygons: cell })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    fn polygons(&self) -> &[Polygon<f64>] {
        self.polygons.get_or_init(|| match parse_polygons(EMBEDDED_BORDERS) {
            Ok(polygons) => {
                debug!("Loaded {} embedded boundary polygons", polygons.len());
                polygons
            }
            Err(e) => {
                error!("Embedded boundary data is unusable: {}", e);
                Vec::new()
            }
        })
    }

    /// Point-in-polygon test over every boundary polygon.
    pub fn contains(&self, p: LatLng) -> bool {
        let point = Point::new(p.lng, p.lat);
        self.polygons().iter().any(|poly| poly.contains(&point))
    }
}

impl Default for CountryBoundary {
    fn default() -> Self {
        Self::embedded()
    }
}

fn parse_polygons(json: &str) -> Result<Vec<Polygon<f64>>> {
    let raw: Vec<Vec<[f64; 2]>> = serde_json::from_str(json)?;
    raw.into_iter()
        .enumerate()
        .map(|(i, ring)| {
            if ring.len() < 3 {
                return Err(GeoError::Boundary(format!(
                    "polygon {} has {} vertices",
                    i,
                    ring.len()
                )));
            }
            let exterior: LineString<f64> =
                ring.into_iter().map(|[lat, lng]| (lng, lat)).collect();
            Ok(Polygon::new(exterior, vec![]))
        })
        .collect()
}

/// Outcome of the GCJ-02 inverse solve.
#[derive(Debug, Clone, Copy)]
pub struct Solution {
    pub point: LatLng,
    /// Max-norm of `F(point) - target` in degrees.
    pub residual: f64,
    pub iterations: usize,
}

impl Solution {
    pub fn converged(&self) -> bool {
        self.residual <= SOLVE_WARN_RESIDUAL
    }
}

fn transform_lat(x: f64, y: f64) -> f64 {
    let mut ret = -100.0 + 2.0 * x + 3.0 * y + 0.2 * y * y + 0.1 * x * y + 0.2 * x.abs().sqrt();
    ret += (20.0 * (6.0 * x * PI).sin() + 20.0 * (2.0 * x * PI).sin()) * 2.0 / 3.0;
    ret += (20.0 * (y * PI).sin() + 40.0 * (y / 3.0 * PI).sin()) * 2.0 / 3.0;
    ret += (160.0 * (y / 12.0 * PI).sin() + 320.0 * (y * PI / 30.0).sin()) * 2.0 / 3.0;
    ret
}

fn transform_lng(x: f64, y: f64) -> f64 {
    let mut ret = 300.0 + x + 2.0 * y + 0.1 * x * x + 0.1 * x * y + 0.1 * x.abs().sqrt();
    ret += (20.0 * (6.0 * x * PI).sin() + 20.0 * (2.0 * x * PI).sin()) * 2.0 / 3.0;
    ret += (20.0 * (x * PI).sin() + 40.0 * (x / 3.0 * PI).sin()) * 2.0 / 3.0;
    ret += (150.0 * (x / 12.0 * PI).sin() + 300.0 * (x / 30.0 * PI).sin()) * 2.0 / 3.0;
    ret
}

/// Shared trigonometric term of both partial derivatives in `x`.
fn d_common_dx(x: f64) -> f64 {
    (120.0 * PI * (6.0 * PI * x).cos() + 40.0 * PI * (2.0 * PI * x).cos()) * 2.0 / 3.0
}

/// `d/dx sqrt(|x|)`; zero at the cusp.
fn d_sqrt_abs(x: f64) -> f64 {
    if x == 0.0 {
        0.0
    } else {
        x.signum() / (2.0 * x.abs().sqrt())
    }
}

/// Ellipsoid scale factors turning the model's meter offsets into degrees.
/// Returns `(k_lat, k_lng, dk_lat/dlat, dk_lng/dlat)`.
fn scale_factors(lat: f64) -> (f64, f64, f64, f64) {
    let rad = lat.to_radians();
    let (s, c) = rad.sin_cos();
    let magic = 1.0 - KRASOVSKY_EE * s * s;
    let sqrt_magic = magic.sqrt();
    let d_magic = -KRASOVSKY_EE * 2.0 * s * c * PI / 180.0;

    let lat_base = 180.0 / (KRASOVSKY_A * (1.0 - KRASOVSKY_EE) * PI);
    let k_lat = lat_base * magic * sqrt_magic;
    let dk_lat = lat_base * 1.5 * sqrt_magic * d_magic;

    let lng_base = 180.0 / (KRASOVSKY_A * PI);
    let k_lng = lng_base * sqrt_magic / c;
    let dk_lng = lng_base * (0.5 / sqrt_magic * d_magic / c + sqrt_magic * s / (c * c) * PI / 180.0);

    (k_lat, k_lng, dk_lat, dk_lng)
}

/// Ungated WGS-84 -> GCJ-02 forward model.
pub fn wgs84_to_gcj02(p: LatLng) -> LatLng {
    let (x, y) = (p.lng - 105.0, p.lat - 35.0);
    let (k_lat, k_lng, _, _) = scale_factors(p.lat);
    LatLng::new(
        p.lat + transform_lat(x, y) * k_lat,
        p.lng + transform_lng(x, y) * k_lng,
    )
}

/// Closed-form Jacobian of [`wgs84_to_gcj02`].
///
/// Column 0 is the derivative by latitude, column 1 by longitude; row 0 is
/// the output latitude, row 1 the output longitude.
pub fn wgs84_to_gcj02_jac(p: LatLng) -> DMat2 {
    let (x, y) = (p.lng - 105.0, p.lat - 35.0);
    let (k_lat, k_lng, dk_lat, dk_lng) = scale_factors(p.lat);
    let common = d_common_dx(x);

    let dtlat_dx = 2.0 + 0.1 * y + 0.2 * d_sqrt_abs(x) + common;
    let dtlat_dy = 3.0
        + 0.4 * y
        + 0.1 * x
        + (20.0 * PI * (PI * y).cos() + 40.0 * PI / 3.0 * (PI * y / 3.0).cos()) * 2.0 / 3.0
        + (160.0 * PI / 12.0 * (PI * y / 12.0).cos() + 320.0 * PI / 30.0 * (PI * y / 30.0).cos())
            * 2.0
            / 3.0;
    let dtlng_dx = 1.0
        + 0.2 * x
        + 0.1 * y
        + 0.1 * d_sqrt_abs(x)
        + common
        + (20.0 * PI * (PI * x).cos() + 40.0 * PI / 3.0 * (PI * x / 3.0).cos()) * 2.0 / 3.0
        + (150.0 * PI / 12.0 * (PI * x / 12.0).cos() + 300.0 * PI / 30.0 * (PI * x / 30.0).cos())
            * 2.0
            / 3.0;
    let dtlng_dy = 2.0 + 0.1 * x;

    let dlat_dlat = 1.0 + dtlat_dy * k_lat + transform_lat(x, y) * dk_lat;
    let dlat_dlng = dtlat_dx * k_lat;
    let dlng_dlat = dtlng_dy * k_lng + transform_lng(x, y) * dk_lng;
    let dlng_dlng = 1.0 + dtlng_dx * k_lng;

    DMat2::from_cols(
        DVec2::new(dlat_dlat, dlng_dlat),
        DVec2::new(dlat_dlng, dlng_dlng),
    )
}

fn residual(p: DVec2, target: DVec2) -> DVec2 {
    let f = wgs84_to_gcj02(LatLng::new(p.x, p.y));
    DVec2::new(f.lat, f.lng) - target
}

/// Ungated GCJ-02 -> WGS-84 by Levenberg-Marquardt on the forward model.
///
/// Never fails: when the iteration budget runs out the best iterate is
/// returned together with its residual.
pub fn gcj02_to_wgs84(target: LatLng) -> Solution {
    gcj02_to_wgs84_with(target, SOLVE_MAX_ITERATIONS)
}

/// [`gcj02_to_wgs84`] with an explicit iteration budget.
pub fn gcj02_to_wgs84_with(target: LatLng, max_iterations: usize) -> Solution {
    let goal = DVec2::new(target.lat, target.lng);
    let mut x = goal;
    let mut r = residual(x, goal);
    let mut cost = r.length_squared();
    let mut lambda = 1e-3;
    let mut iterations = 0;

    while iterations < max_iterations && r.abs().max_element() > SOLVE_TOLERANCE {
        iterations += 1;
        let j = wgs84_to_gcj02_jac(LatLng::new(x.x, x.y));
        let jt = j.transpose();
        let jtj = jt * j;
        let g = jt * r;
        let damped = jtj + DMat2::from_diagonal(DVec2::new(jtj.x_axis.x, jtj.y_axis.y) * lambda);
        if damped.determinant().abs() < f64::EPSILON {
            break;
        }
        let candidate = x - damped.inverse() * g;
        let r_new = residual(candidate, goal);
        let cost_new = r_new.length_squared();
        if cost_new < cost {
            x = candidate;
            r = r_new;
            cost = cost_new;
            lambda = (lambda * 0.1).max(1e-12);
        } else {
            lambda *= 10.0;
            if lambda > 1e12 {
                break;
            }
        }
    }

    Solution {
        point: LatLng::new(x.x, x.y),
        residual: r.abs().max_element(),
        iterations,
    }
}

/// Ungated BD-09 -> GCJ-02.
pub fn bd09_to_gcj02(p: LatLng) -> LatLng {
    let x = p.lng - 0.0065;
    let y = p.lat - 0.006;
    let z = x.hypot(y) - 0.00002 * (y * BAIDU_FACTOR).sin();
    let theta = y.atan2(x) - 0.000003 * (x * BAIDU_FACTOR).cos();
    LatLng::new(z * theta.sin(), z * theta.cos())
}

/// Ungated GCJ-02 -> BD-09.
pub fn gcj02_to_bd09(p: LatLng) -> LatLng {
    let (x, y) = (p.lng, p.lat);
    let z = x.hypot(y) + 0.00002 * (y * BAIDU_FACTOR).sin();
    let theta = y.atan2(x) + 0.000003 * (x * BAIDU_FACTOR).cos();
    LatLng::new(z * theta.sin() + 0.006, z * theta.cos() + 0.0065)
}

/// Coordinate frames understood by [`FrameTransform::convert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    Wgs84,
    Gcj02,
    Bd09,
}

impl Frame {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "wgs84" | "wgs-84" => Some(Frame::Wgs84),
            "gcj02" | "gcj-02" => Some(Frame::Gcj02),
            "bd09" | "bd-09" => Some(Frame::Bd09),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Frame::Wgs84 => "wgs84",
            Frame::Gcj02 => "gcj02",
            Frame::Bd09 => "bd09",
        }
    }
}

/// Boundary-gated frame conversions.
///
/// Outside the boundary both directions are the identity.
#[derive(Default)]
pub struct FrameTransform {
    boundary: CountryBoundary,
}

impl FrameTransform {
    pub fn new(boundary: CountryBoundary) -> Self {
        Self { boundary }
    }

    pub fn in_boundary(&self, p: LatLng) -> bool {
        self.boundary.contains(p)
    }

    /// WGS-84 -> GCJ-02.
    pub fn to_obfuscated(&self, p: LatLng) -> LatLng {
        if self.in_boundary(p) {
            wgs84_to_gcj02(p)
        } else {
            p
        }
    }

    /// GCJ-02 -> WGS-84; logs a warning and returns the best iterate when
    /// the solver stalls.
    pub fn to_standard(&self, p: LatLng) -> LatLng {
        if !self.in_boundary(p) {
            return p;
        }
        let solution = gcj02_to_wgs84(p);
        if !solution.converged() {
            warn!(
                "GCJ-02 inverse for {} stopped after {} iterations with residual {:e} deg",
                p, solution.iterations, solution.residual
            );
        }
        solution.point
    }

    pub fn convert(&self, p: LatLng, from: Frame, to: Frame) -> LatLng {
        let wgs = match from {
            Frame::Wgs84 => p,
            Frame::Gcj02 => self.to_standard(p),
            Frame::Bd09 => self.to_standard(bd09_to_gcj02(p)),
        };
        match to {
            Frame::Wgs84 => wgs,
            Frame::Gcj02 => self.to_obfuscated(wgs),
            Frame::Bd09 => gcj02_to_bd09(self.to_obfuscated(wgs)),
        }
    }
}
