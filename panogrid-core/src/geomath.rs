//! Geodesic distances and local scale factors on the WGS-84 ellipsoid.

use crate::model::LatLng;
use geo::{GeodesicDistance, Point};

pub const EARTH_R_MAJOR: f64 = 6_378_137.0;
pub const EARTH_R_MINOR: f64 = 6_356_752.3142;
pub const EARTH_FLATTENING: f64 = 1.0 / 298.257223563;
pub const EARTH_CIRCUM: f64 = 2.0 * std::f64::consts::PI * EARTH_R_MAJOR;

fn to_point(p: LatLng) -> Point<f64> {
    Point::new(p.lng, p.lat)
}

/// Ellipsoidal (Karney) distance in meters between two WGS-84 points.
pub fn geo_dist(a: LatLng, b: LatLng) -> f64 {
    to_point(a).geodesic_distance(&to_point(b))
}

/// Signed (north, east) offsets in meters of `p` from `origin`.
///
/// Each axis is measured separately along a meridian / parallel through `p`,
/// which is what the seed grid and the region builder expect.
pub fn geo_coord(p: LatLng, origin: LatLng) -> (f64, f64) {
    let north = geo_dist(p, LatLng::new(origin.lat, p.lng));
    let east = geo_dist(p, LatLng::new(p.lat, origin.lng));
    (
        if p.lat > origin.lat { north } else { -north },
        if p.lng > origin.lng { east } else { -east },
    )
}

/// Meters spanned by one degree of latitude (`dy`) and of longitude (`dx`)
/// at the given point.
pub fn unit_ll_meter(at: LatLng) -> (f64, f64) {
    let dy = geo_dist(at, LatLng::new(at.lat + 1.0, at.lng));
    let dx = geo_dist(at, LatLng::new(at.lat, at.lng + 1.0));
    (dy, dx)
}

/// Sample positions along `[x0, x1]` such that consecutive samples are at
/// most `extent / segments` apart.
///
/// One segment or fewer collapses to the midpoint, since both endpoints sit on
/// the region boundary and would be rejected by strict containment.
pub fn grid_axis(x0: f64, x1: f64, segments: usize) -> Vec<f64> {
    if segments <= 1 {
        return vec![(x0 + x1) / 2.0];
    }
    let step = (x1 - x0) / segments as f64;
    (0..=segments)
        .map(|i| if i == segments { x1 } else { x0 + step * i as f64 })
        .collect()
}
