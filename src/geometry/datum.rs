//! Reference ellipsoids and Cartesian ↔ geodetic conversion.
//!
//! Used to report camera centers as longitude, latitude and height above the
//! datum after the cameras have been written.

use crate::error::{AdjustError, AdjustResult};
use nalgebra::Vector3;
use std::fmt;

const GEODETIC_ITERATIONS: usize = 10;

/// A named reference ellipsoid.
#[derive(Debug, Clone, PartialEq)]
pub struct Datum {
    name: String,
    semi_major: f64,
    semi_minor: f64,
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Datum(name: {}, semi-major: {:.3}, semi-minor: {:.3})",
            self.name, self.semi_major, self.semi_minor
        )
    }
}

impl Datum {
    /// Datum with explicit semi-axes in meters.
    pub fn new(name: impl Into<String>, semi_major: f64, semi_minor: f64) -> AdjustResult<Self> {
        if !(semi_major > 0.0 && semi_minor > 0.0 && semi_minor <= semi_major) {
            return Err(AdjustError::InvalidInput(format!(
                "Invalid datum semi-axes: {semi_major} {semi_minor}"
            )));
        }
        Ok(Self {
            name: name.into(),
            semi_major,
            semi_minor,
        })
    }

    pub fn wgs84() -> Self {
        Self {
            name: "WGS_1984".to_string(),
            semi_major: 6_378_137.0,
            semi_minor: 6_356_752.314_245,
        }
    }

    pub fn nad83() -> Self {
        Self {
            name: "North_American_Datum_1983".to_string(),
            semi_major: 6_378_137.0,
            semi_minor: 6_356_752.314_140,
        }
    }

    pub fn moon() -> Self {
        Self {
            name: "D_MOON".to_string(),
            semi_major: 1_737_400.0,
            semi_minor: 1_737_400.0,
        }
    }

    pub fn mars() -> Self {
        Self {
            name: "D_MARS".to_string(),
            semi_major: 3_396_190.0,
            semi_minor: 3_396_190.0,
        }
    }

    /// Look up a datum by one of its common names (case-insensitive).
    pub fn from_name(name: &str) -> AdjustResult<Self> {
        match name.to_ascii_uppercase().as_str() {
            "WGS84" | "WGS_1984" | "WGS 84" => Ok(Self::wgs84()),
            "NAD83" | "NAD_1983" => Ok(Self::nad83()),
            "D_MOON" | "MOON" => Ok(Self::moon()),
            "D_MARS" | "MARS" => Ok(Self::mars()),
            _ => Err(AdjustError::InvalidInput(format!("Unknown datum: {name}."))),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn semi_major(&self) -> f64 {
        self.semi_major
    }

    pub fn semi_minor(&self) -> f64 {
        self.semi_minor
    }

    fn eccentricity_sq(&self) -> f64 {
        1.0 - (self.semi_minor * self.semi_minor) / (self.semi_major * self.semi_major)
    }

    /// Convert an ECEF point to `(longitude°, latitude°, height m)`.
    pub fn cartesian_to_geodetic(&self, xyz: &Vector3<f64>) -> Vector3<f64> {
        let a = self.semi_major;
        let e2 = self.eccentricity_sq();
        let p = (xyz.x * xyz.x + xyz.y * xyz.y).sqrt();
        let lon = xyz.y.atan2(xyz.x).to_degrees();

        if p < 1e-9 {
            let lat = if xyz.z >= 0.0 { 90.0 } else { -90.0 };
            return Vector3::new(lon, lat, xyz.z.abs() - self.semi_minor);
        }

        let mut lat = xyz.z.atan2(p * (1.0 - e2));
        let mut height = 0.0;
        for _ in 0..GEODETIC_ITERATIONS {
            let sin_lat = lat.sin();
            let n = a / (1.0 - e2 * sin_lat * sin_lat).sqrt();
            height = p / lat.cos() - n;
            lat = xyz.z.atan2(p * (1.0 - e2 * n / (n + height)));
        }
        Vector3::new(lon, lat.to_degrees(), height)
    }

    /// Convert `(longitude°, latitude°, height m)` to ECEF.
    pub fn geodetic_to_cartesian(&self, llh: &Vector3<f64>) -> Vector3<f64> {
        let a = self.semi_major;
        let e2 = self.eccentricity_sq();
        let lon = llh.x.to_radians();
        let lat = llh.y.to_radians();
        let n = a / (1.0 - e2 * lat.sin() * lat.sin()).sqrt();
        Vector3::new(
            (n + llh.z) * lat.cos() * lon.cos(),
            (n + llh.z) * lat.cos() * lon.sin(),
            (n * (1.0 - e2) + llh.z) * lat.sin(),
        )
    }
}
