//! Mercator-family projections between geodetic and planar/tile coordinates.
//!
//! All functions return `(y, x)` to keep latitude first, matching [`LatLng`].

use crate::error::{GeoError, Result};
use crate::geomath::EARTH_CIRCUM;
use crate::model::LatLng;
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, TAU};

/// Largest absolute latitude accepted by the Mercator variants.
pub const MAX_MERCATOR_LAT: f64 = 85.0;

pub const EPSG3857_K0: f64 = 0.15915494309189535;
pub const EPSG3857_K1: f64 = 0.5;
pub const EPSG3857_K2: f64 = 262_144.0; // 2^18

pub const QMAP_K0: f64 = 111_319.490_777_777_78;
pub const QMAP_K1: f64 = 0.008726646259971648;
pub const QMAP_K2: f64 = 0.017453292519943295;

fn check_lat(lat: f64) -> Result<()> {
    if lat.abs() < MAX_MERCATOR_LAT {
        Ok(())
    } else {
        Err(GeoError::LatitudeOutOfRange(lat))
    }
}

/// Units for [`ll_to_merc`] / [`merc_to_ll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MercUnit {
    /// Scaled by the equatorial circumference.
    Meters,
    /// Fraction of one world width.
    Unit,
}

/// Spherical Mercator via the Gudermannian relation; north is positive.
pub fn ll_to_merc(p: LatLng, unit: MercUnit) -> Result<(f64, f64)> {
    check_lat(p.lat)?;
    let lat = p.lat.to_radians();
    let mut x = p.lng.to_radians() / TAU;
    let s = lat.sin();
    let mut y = 0.5 * ((1.0 + s) / (1.0 - s)).ln() / TAU;
    if unit == MercUnit::Meters {
        x *= EARTH_CIRCUM;
        y *= EARTH_CIRCUM;
    }
    Ok((y, x))
}

pub fn merc_to_ll(y: f64, x: f64, unit: MercUnit) -> LatLng {
    let (y, x) = match unit {
        MercUnit::Meters => (y / EARTH_CIRCUM, x / EARTH_CIRCUM),
        MercUnit::Unit => (y, x),
    };
    LatLng::new(
        (2.0 * (TAU * y).exp().atan() - FRAC_PI_2).to_degrees(),
        (x * TAU).to_degrees(),
    )
}

/// EPSG:3857 in tile-pixel space at the fixed 2^18 scale; y grows southward.
pub fn ll_to_tile_merc(p: LatLng) -> Result<(f64, f64)> {
    check_lat(p.lat)?;
    let x = p.lng.to_radians();
    let y = (FRAC_PI_4 + p.lat.to_radians() / 2.0).tan().ln();
    Ok((
        EPSG3857_K2 * (-y * EPSG3857_K0 + EPSG3857_K1),
        EPSG3857_K2 * (x * EPSG3857_K0 + EPSG3857_K1),
    ))
}

pub fn tile_merc_to_ll(y: f64, x: f64) -> LatLng {
    let x = (x / EPSG3857_K2 - EPSG3857_K1) / EPSG3857_K0;
    let y = -(y / EPSG3857_K2 - EPSG3857_K1) / EPSG3857_K0;
    LatLng::new(
        (2.0 * y.exp().atan() - FRAC_PI_2).to_degrees(),
        x.to_degrees(),
    )
}

/// qmap planar coordinates of a provider-native (GCJ-02) point.
pub fn qmap_ll_to_yx(p: LatLng) -> (f64, f64) {
    let x = QMAP_K0 * p.lng;
    let y = QMAP_K0 * (QMAP_K1 * (90.0 + p.lat)).tan().ln() / QMAP_K2;
    (y, x)
}

/// Inverse of [`qmap_ll_to_yx`]; the result is provider-native (GCJ-02).
pub fn qmap_yx_to_ll(y: f64, x: f64) -> LatLng {
    LatLng::new(
        (QMAP_K2 * y / QMAP_K0).exp().atan() / QMAP_K1 - 90.0,
        x / QMAP_K0,
    )
}
