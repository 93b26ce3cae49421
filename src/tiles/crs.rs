//! Coordinate transforms between the tile tree's global frame and the
//! map frame of the scene

use crate::core::types::{DMat3, DVec3};

/// WGS84 semi-major axis (metres)
pub const WGS84_A: f64 = 6_378_137.0;
/// WGS84 flattening
pub const WGS84_F: f64 = 1.0 / 298.257_223_563;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransformDirection {
    /// Global (tile tree) frame to map frame
    Forward,
    /// Map frame to global frame
    Reverse,
}

/// Point transform between the global frame and the map frame.
///
/// Shared by every background job, hence `Send + Sync`.
pub trait CoordinateTransform: Send + Sync {
    fn transform(&self, point: DVec3, direction: TransformDirection) -> DVec3;
}

/// Global and map frames coincide
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityTransform;

impl CoordinateTransform for IdentityTransform {
    fn transform(&self, point: DVec3, _direction: TransformDirection) -> DVec3 {
        point
    }
}

/// Geodetic coordinates (radians, metres) to Earth-centred Earth-fixed
pub fn geodetic_to_ecef(lon: f64, lat: f64, height: f64) -> DVec3 {
    let e2 = WGS84_F * (2.0 - WGS84_F);
    let (sin_lat, cos_lat) = lat.sin_cos();
    let (sin_lon, cos_lon) = lon.sin_cos();
    let n = WGS84_A / (1.0 - e2 * sin_lat * sin_lat).sqrt();
    DVec3::new(
        (n + height) * cos_lat * cos_lon,
        (n + height) * cos_lat * sin_lon,
        (n * (1.0 - e2) + height) * sin_lat,
    )
}

/// ECEF to a local east-north-up tangent plane.
///
/// Map coordinates are metres east, north and up of the geodetic origin.
#[derive(Clone, Copy, Debug)]
pub struct EcefToEnu {
    origin: DVec3,
    /// Columns are the east, north and up unit vectors in ECEF
    basis: DMat3,
}

impl EcefToEnu {
    /// Tangent plane at the given longitude/latitude (degrees) and height (metres)
    pub fn new(lon_deg: f64, lat_deg: f64, height: f64) -> Self {
        let lon = lon_deg.to_radians();
        let lat = lat_deg.to_radians();
        let (sin_lat, cos_lat) = lat.sin_cos();
        let (sin_lon, cos_lon) = lon.sin_cos();

        let east = DVec3::new(-sin_lon, cos_lon, 0.0);
        let north = DVec3::new(-sin_lat * cos_lon, -sin_lat * sin_lon, cos_lat);
        let up = DVec3::new(cos_lat * cos_lon, cos_lat * sin_lon, sin_lat);

        Self {
            origin: geodetic_to_ecef(lon, lat, height),
            basis: DMat3::from_cols(east, north, up),
        }
    }

    /// Origin of the tangent plane in ECEF
    pub fn origin(&self) -> DVec3 {
        self.origin
    }
}

impl CoordinateTransform for EcefToEnu {
    fn transform(&self, point: DVec3, direction: TransformDirection) -> DVec3 {
        match direction {
            TransformDirection::Forward => self.basis.transpose() * (point - self.origin),
            TransformDirection::Reverse => self.basis * point + self.origin,
        }
    }
}
