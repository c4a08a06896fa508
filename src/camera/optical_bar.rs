//! Panoramic optical bar camera (scanning film camera).
//!
//! A lens sweeps across the film while the vehicle moves forward. The camera
//! frame has `z` along the mid-scan look direction, `x` across the scan and
//! `y` along the flight direction.
//!
//! ```text
//! p     = Rᵀ·(X - C)
//! α     = atan2(p.x, p.z)                 scan angle of the point
//! t     = ±α / (scan_angle / scan_time)   time relative to mid-scan
//! y     = p.y - speed·t·(1 - mc_factor)   forward motion, partly compensated
//! u     = cu + f·α / pixel_size
//! v     = cv + f·y / hypot(p.x, p.z) / pixel_size
//! ```
//!
//! # Bundle adjustment parameters
//!
//! - Focus: focal length
//! - Optical center: `cu`, `cv` in pixels
//! - Other intrinsics: speed, motion compensation factor, scan time

use crate::camera::tsai::{TsaiFile, TsaiWriter};
use crate::camera::{MIN_DEPTH, SensorModel};
use crate::error::{AdjustError, AdjustResult};
use crate::geometry::SimilarityTransform;
use nalgebra::{Rotation3, Vector2, Vector3};
use std::fmt;
use std::path::Path;

/// Number of "other" intrinsics: speed, motion compensation, scan time.
pub const OPTICAL_BAR_OTHER_PARAMS_N: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct OpticalBarModel {
    image_size: Vector2<f64>,
    optical_center: Vector2<f64>,
    pixel_size: f64,
    focal_length: f64,
    scan_time: f64,
    scan_angle: f64,
    speed: f64,
    motion_compensation: f64,
    scan_left_to_right: bool,
    center: Vector3<f64>,
    /// Camera-to-world rotation at mid-scan
    rotation: Rotation3<f64>,
}

impl fmt::Display for OpticalBarModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "OpticalBar(C: [{:.3}, {:.3}, {:.3}], f: {}, center: [{}, {}], speed: {}, mc: {}, scan time: {})",
            self.center.x,
            self.center.y,
            self.center.z,
            self.focal_length,
            self.optical_center.x,
            self.optical_center.y,
            self.speed,
            self.motion_compensation,
            self.scan_time
        )
    }
}

impl OpticalBarModel {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        image_size: Vector2<f64>,
        optical_center: Vector2<f64>,
        pixel_size: f64,
        focal_length: f64,
        scan_time: f64,
        scan_angle: f64,
        center: Vector3<f64>,
        rotation: Rotation3<f64>,
    ) -> AdjustResult<Self> {
        let camera = Self {
            image_size,
            optical_center,
            pixel_size,
            focal_length,
            scan_time,
            scan_angle,
            speed: 0.0,
            motion_compensation: 1.0,
            scan_left_to_right: true,
            center,
            rotation,
        };
        camera.validate()?;
        Ok(camera)
    }

    /// Vehicle speed and the fraction of forward motion compensated on film.
    pub fn with_motion(mut self, speed: f64, motion_compensation: f64) -> Self {
        self.speed = speed;
        self.motion_compensation = motion_compensation;
        self
    }

    pub fn with_scan_direction(mut self, left_to_right: bool) -> Self {
        self.scan_left_to_right = left_to_right;
        self
    }

    fn validate(&self) -> AdjustResult<()> {
        let positive = [
            ("pixel size", self.pixel_size),
            ("focal length", self.focal_length),
            ("scan time", self.scan_time),
            ("scan angle", self.scan_angle),
        ];
        for (name, value) in positive {
            if !(value > 0.0 && value.is_finite()) {
                return Err(AdjustError::InvalidInput(format!(
                    "Optical bar {name} must be positive, got {value}"
                )));
            }
        }
        Ok(())
    }

    pub fn image_size(&self) -> Vector2<f64> {
        self.image_size
    }

    pub fn camera_center(&self) -> Vector3<f64> {
        self.center
    }

    pub fn camera_pose(&self) -> Rotation3<f64> {
        self.rotation
    }

    pub fn set_camera_center(&mut self, center: Vector3<f64>) {
        self.center = center;
    }

    pub fn set_camera_pose(&mut self, rotation: Rotation3<f64>) {
        self.rotation = rotation;
    }

    pub fn focal_length(&self) -> f64 {
        self.focal_length
    }

    pub fn set_focal_length(&mut self, focal_length: f64) {
        self.focal_length = focal_length;
    }

    pub fn optical_center(&self) -> Vector2<f64> {
        self.optical_center
    }

    pub fn set_optical_center(&mut self, optical_center: Vector2<f64>) {
        self.optical_center = optical_center;
    }

    pub fn pixel_size(&self) -> f64 {
        self.pixel_size
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn motion_compensation(&self) -> f64 {
        self.motion_compensation
    }

    pub fn scan_time(&self) -> f64 {
        self.scan_time
    }

    /// `[speed, motion compensation, scan time]`
    pub fn other_intrinsics(&self) -> [f64; OPTICAL_BAR_OTHER_PARAMS_N] {
        [self.speed, self.motion_compensation, self.scan_time]
    }

    pub fn set_other_intrinsics(&mut self, values: &[f64]) -> AdjustResult<()> {
        if values.len() != OPTICAL_BAR_OTHER_PARAMS_N {
            return Err(AdjustError::InvalidInput(format!(
                "Optical bar expects {OPTICAL_BAR_OTHER_PARAMS_N} other intrinsics, got {}",
                values.len()
            )));
        }
        self.speed = values[0];
        self.motion_compensation = values[1];
        self.scan_time = values[2];
        Ok(())
    }

    pub fn project(&self, point: &Vector3<f64>) -> AdjustResult<Vector2<f64>> {
        let p = self.rotation.inverse() * (point - self.center);
        let range = p.x.hypot(p.z);
        if p.z < MIN_DEPTH || range < MIN_DEPTH {
            return Err(AdjustError::Projection(format!(
                "point [{:.3}, {:.3}, {:.3}] is behind the optical bar camera",
                point.x, point.y, point.z
            )));
        }

        let alpha = p.x.atan2(p.z);
        let direction = if self.scan_left_to_right { 1.0 } else { -1.0 };
        let scan_rate = self.scan_angle / self.scan_time;
        let time = direction * alpha / scan_rate;
        let y = p.y - self.speed * time * (1.0 - self.motion_compensation);

        Ok(Vector2::new(
            self.optical_center.x + self.focal_length * alpha / self.pixel_size,
            self.optical_center.y + self.focal_length * y / range / self.pixel_size,
        ))
    }

    pub fn apply_transform(&mut self, transform: &SimilarityTransform) {
        self.center = transform.transform_point(&self.center);
        self.rotation = transform.rotation() * self.rotation;
    }

    pub fn read_from_file<P: AsRef<Path>>(path: P) -> AdjustResult<Self> {
        let file = TsaiFile::read(path)?;
        Self::from_tsai(&file)
    }

    pub(crate) fn from_tsai(file: &TsaiFile) -> AdjustResult<Self> {
        if !file.has_marker("OPTICAL_BAR") {
            return Err(AdjustError::Parse {
                path: file.path().to_path_buf(),
                line: 0,
                message: "not an optical bar camera file".to_string(),
            });
        }
        let size = file.fixed_values("image_size", 2)?;
        let center = file.fixed_values("image_center", 2)?;
        let scan_dir = file.strings("scan_dir")?;
        let left_to_right = match scan_dir.first().map(String::as_str) {
            Some("right") => true,
            Some("left") => false,
            other => {
                return Err(AdjustError::Parse {
                    path: file.path().to_path_buf(),
                    line: 0,
                    message: format!("invalid scan_dir: {}", other.unwrap_or("")),
                });
            }
        };

        Ok(Self::new(
            Vector2::new(size[0], size[1]),
            Vector2::new(center[0], center[1]),
            file.scalar("pitch")?,
            file.scalar("f")?,
            file.scalar("scan_time")?,
            file.scalar("scan_angle")?,
            file.vector3("iC")?,
            Rotation3::from_matrix(&file.matrix3("iR")?),
        )?
        .with_motion(file.scalar("speed")?, file.scalar("mc_factor")?)
        .with_scan_direction(left_to_right))
    }

    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> AdjustResult<()> {
        let scan_dir = if self.scan_left_to_right { "right" } else { "left" };
        TsaiWriter::new()
            .marker("VERSION_4")
            .marker("OPTICAL_BAR")
            .values("image_size", self.image_size.as_slice())
            .values("image_center", self.optical_center.as_slice())
            .scalar("pitch", self.pixel_size)
            .scalar("f", self.focal_length)
            .scalar("scan_time", self.scan_time)
            .scalar("scan_angle", self.scan_angle)
            .scalar("speed", self.speed)
            .scalar("mc_factor", self.motion_compensation)
            .text("scan_dir", scan_dir)
            .vector3("iC", &self.center)
            .matrix3("iR", self.rotation.matrix())
            .write(path)
    }
}

impl SensorModel for OpticalBarModel {
    fn project(&self, point: &Vector3<f64>) -> AdjustResult<Vector2<f64>> {
        OpticalBarModel::project(self, point)
    }

    fn camera_center(&self) -> Vector3<f64> {
        self.center
    }

    fn model_name(&self) -> &'static str {
        "OpticalBar"
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn camera() -> OpticalBarModel {
        OpticalBarModel::new(
            Vector2::new(40000.0, 3000.0),
            Vector2::new(20000.0, 1500.0),
            7e-6,
            0.61,
            0.5,
            1.2,
            Vector3::new(0.0, 0.0, 0.0),
            Rotation3::identity(),
        )
        .unwrap()
        .with_motion(7700.0, 0.9)
    }

    #[test]
    fn test_mid_scan_point_projects_to_center() {
        let uv = camera().project(&Vector3::new(0.0, 0.0, 150_000.0)).unwrap();
        assert!((uv - Vector2::new(20000.0, 1500.0)).norm() < 1e-6);
    }

    #[test]
    fn test_forward_motion_shifts_v() {
        let point = Vector3::new(10_000.0, 0.0, 150_000.0);
        let compensated = camera().with_motion(7700.0, 1.0).project(&point).unwrap();
        let uncompensated = camera().with_motion(7700.0, 0.0).project(&point).unwrap();
        assert!((compensated.x - uncompensated.x).abs() < 1e-9);
        assert!((compensated.y - 1500.0).abs() < 1e-9);
        assert!((uncompensated.y - compensated.y).abs() > 1.0);
    }

    #[test]
    fn test_point_behind_camera() {
        let result = camera().project(&Vector3::new(0.0, 0.0, -10.0));
        assert!(matches!(result, Err(AdjustError::Projection(_))));
    }

    #[test]
    fn test_invalid_params() {
        let result = OpticalBarModel::new(
            Vector2::new(1.0, 1.0),
            Vector2::zeros(),
            7e-6,
            0.61,
            0.0,
            1.2,
            Vector3::zeros(),
            Rotation3::identity(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_other_intrinsics() {
        let mut camera = camera();
        assert_eq!(camera.other_intrinsics(), [7700.0, 0.9, 0.5]);
        camera.set_other_intrinsics(&[7000.0, 0.8, 0.6]).unwrap();
        assert_eq!(camera.speed(), 7000.0);
        assert_eq!(camera.scan_time(), 0.6);
        assert!(camera.set_other_intrinsics(&[1.0]).is_err());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("kh9.tsai");
        let mut moved = camera().with_scan_direction(false);
        moved.set_camera_center(Vector3::new(1.0e6, 2.0e6, 6.5e6));
        moved.write_to_file(&path).unwrap();

        let loaded = OpticalBarModel::read_from_file(&path).unwrap();
        assert!((loaded.camera_center() - moved.camera_center()).norm() < 1e-6);
        assert!(!loaded.scan_left_to_right);
        assert!((loaded.speed() - 7700.0).abs() < 1e-9);
    }
}
