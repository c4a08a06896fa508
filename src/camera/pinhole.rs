//! Frame (pinhole) camera with optional TSAI lens distortion.
//!
//! # Projection
//!
//! For a world point `X`, camera center `C` and camera-to-world rotation `R`:
//!
//! ```text
//! p  = Rᵀ·(X - C)
//! x' = p.x / p.z,  y' = p.y / p.z
//! (x'', y'') = distort(x', y')
//! u = (fu·x'' + cu) / pitch
//! v = (fv·y'' + cv) / pitch
//! ```
//!
//! `fu`, `fv`, `cu`, `cv` are in the same physical units as `pitch`; a pitch of
//! one means they are given in pixels.
//!
//! # Bundle adjustment parameters
//!
//! - Focus: `fu` (`fv` follows with a fixed aspect ratio)
//! - Optical center: `cu`, `cv`
//! - Other intrinsics: the distortion coefficients

use crate::camera::tsai::{TsaiFile, TsaiWriter};
use crate::camera::{MIN_DEPTH, SensorModel};
use crate::error::{AdjustError, AdjustResult};
use crate::geometry::SimilarityTransform;
use nalgebra::{Rotation3, Vector2, Vector3};
use std::fmt;
use std::path::Path;

/// Lens distortion applied in normalized image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum LensDistortion {
    #[default]
    Null,
    /// Two radial and two tangential coefficients
    Tsai { k1: f64, k2: f64, p1: f64, p2: f64 },
}

impl LensDistortion {
    pub fn name(&self) -> &'static str {
        match self {
            LensDistortion::Null => "NULL",
            LensDistortion::Tsai { .. } => "TSAI",
        }
    }

    pub fn num_params(&self) -> usize {
        match self {
            LensDistortion::Null => 0,
            LensDistortion::Tsai { .. } => 4,
        }
    }

    pub fn params(&self) -> Vec<f64> {
        match *self {
            LensDistortion::Null => Vec::new(),
            LensDistortion::Tsai { k1, k2, p1, p2 } => vec![k1, k2, p1, p2],
        }
    }

    /// Overwrite the coefficients; the model kind does not change.
    pub fn set_params(&mut self, values: &[f64]) -> AdjustResult<()> {
        if values.len() != self.num_params() {
            return Err(AdjustError::InvalidInput(format!(
                "{} distortion expects {} parameters, got {}",
                self.name(),
                self.num_params(),
                values.len()
            )));
        }
        if let LensDistortion::Tsai { k1, k2, p1, p2 } = self {
            *k1 = values[0];
            *k2 = values[1];
            *p1 = values[2];
            *p2 = values[3];
        }
        Ok(())
    }

    pub fn distort(&self, point: &Vector2<f64>) -> Vector2<f64> {
        match *self {
            LensDistortion::Null => *point,
            LensDistortion::Tsai { k1, k2, p1, p2 } => {
                let (x, y) = (point.x, point.y);
                let r2 = x * x + y * y;
                let radial = 1.0 + k1 * r2 + k2 * r2 * r2;
                let xy = x * y;
                Vector2::new(
                    radial * x + 2.0 * p1 * xy + p2 * (r2 + 2.0 * x * x),
                    radial * y + p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * xy,
                )
            }
        }
    }
}

/// Pinhole camera model.
#[derive(Debug, Clone, PartialEq)]
pub struct PinholeModel {
    center: Vector3<f64>,
    /// Camera-to-world rotation
    rotation: Rotation3<f64>,
    focal: Vector2<f64>,
    optical_center: Vector2<f64>,
    pixel_pitch: f64,
    distortion: LensDistortion,
}

impl fmt::Display for PinholeModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pinhole(C: [{:.3}, {:.3}, {:.3}], fu: {}, fv: {}, cu: {}, cv: {}, pitch: {}, distortion: {})",
            self.center.x,
            self.center.y,
            self.center.z,
            self.focal.x,
            self.focal.y,
            self.optical_center.x,
            self.optical_center.y,
            self.pixel_pitch,
            self.distortion.name()
        )
    }
}

impl PinholeModel {
    pub fn new(
        center: Vector3<f64>,
        rotation: Rotation3<f64>,
        focal: Vector2<f64>,
        optical_center: Vector2<f64>,
        pixel_pitch: f64,
    ) -> AdjustResult<Self> {
        let camera = Self {
            center,
            rotation,
            focal,
            optical_center,
            pixel_pitch,
            distortion: LensDistortion::Null,
        };
        camera.validate()?;
        Ok(camera)
    }

    pub fn with_distortion(mut self, distortion: LensDistortion) -> Self {
        self.distortion = distortion;
        self
    }

    fn validate(&self) -> AdjustResult<()> {
        if !(self.focal.x > 0.0 && self.focal.y > 0.0) {
            return Err(AdjustError::InvalidInput(format!(
                "Focal length must be positive, got {} {}",
                self.focal.x, self.focal.y
            )));
        }
        if !(self.pixel_pitch > 0.0 && self.pixel_pitch.is_finite()) {
            return Err(AdjustError::InvalidInput(format!(
                "Pixel pitch must be positive, got {}",
                self.pixel_pitch
            )));
        }
        if !(self.optical_center.x.is_finite() && self.optical_center.y.is_finite()) {
            return Err(AdjustError::InvalidInput(
                "Optical center must be finite".to_string(),
            ));
        }
        Ok(())
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

    /// Focal length along u and v.
    pub fn focal_length(&self) -> Vector2<f64> {
        self.focal
    }

    /// Set `fu`; `fv` keeps its ratio to `fu`.
    pub fn set_focal_length(&mut self, fu: f64) {
        let aspect = self.focal.y / self.focal.x;
        self.focal = Vector2::new(fu, fu * aspect);
    }

    pub fn optical_center(&self) -> Vector2<f64> {
        self.optical_center
    }

    pub fn set_optical_center(&mut self, optical_center: Vector2<f64>) {
        self.optical_center = optical_center;
    }

    pub fn pixel_pitch(&self) -> f64 {
        self.pixel_pitch
    }

    pub fn distortion(&self) -> &LensDistortion {
        &self.distortion
    }

    pub fn distortion_params(&self) -> Vec<f64> {
        self.distortion.params()
    }

    pub fn set_distortion_params(&mut self, values: &[f64]) -> AdjustResult<()> {
        self.distortion.set_params(values)
    }

    pub fn project(&self, point: &Vector3<f64>) -> AdjustResult<Vector2<f64>> {
        let p_cam = self.rotation.inverse() * (point - self.center);
        if p_cam.z < MIN_DEPTH {
            return Err(AdjustError::Projection(format!(
                "point [{:.3}, {:.3}, {:.3}] is behind the pinhole camera",
                point.x, point.y, point.z
            )));
        }
        let normalized = Vector2::new(p_cam.x / p_cam.z, p_cam.y / p_cam.z);
        let distorted = self.distortion.distort(&normalized);
        Ok(Vector2::new(
            (self.focal.x * distorted.x + self.optical_center.x) / self.pixel_pitch,
            (self.focal.y * distorted.y + self.optical_center.y) / self.pixel_pitch,
        ))
    }

    /// Move the camera with a similarity transform.
    ///
    /// The center maps through the full transform, the orientation through its
    /// rotation; intrinsics are unchanged.
    pub fn apply_transform(&mut self, transform: &SimilarityTransform) {
        self.center = transform.transform_point(&self.center);
        self.rotation = transform.rotation() * self.rotation;
    }

    pub fn read_from_file<P: AsRef<Path>>(path: P) -> AdjustResult<Self> {
        let file = TsaiFile::read(path)?;
        Self::from_tsai(&file)
    }

    pub(crate) fn from_tsai(file: &TsaiFile) -> AdjustResult<Self> {
        if !file.has_marker("PINHOLE") {
            return Err(AdjustError::Parse {
                path: file.path().to_path_buf(),
                line: 0,
                message: "not a pinhole camera file".to_string(),
            });
        }
        let focal = Vector2::new(file.scalar("fu")?, file.scalar("fv")?);
        let optical_center = Vector2::new(file.scalar("cu")?, file.scalar("cv")?);
        let center = file.vector3("C")?;
        let rotation = Rotation3::from_matrix(&file.matrix3("R")?);
        let pixel_pitch = file.scalar_or("pitch", 1.0)?;

        let distortion = if file.has_marker("TSAI") {
            LensDistortion::Tsai {
                k1: file.scalar("k1")?,
                k2: file.scalar("k2")?,
                p1: file.scalar("p1")?,
                p2: file.scalar("p2")?,
            }
        } else {
            LensDistortion::Null
        };

        Ok(Self::new(center, rotation, focal, optical_center, pixel_pitch)?
            .with_distortion(distortion))
    }

    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> AdjustResult<()> {
        let mut writer = TsaiWriter::new();
        writer
            .marker("VERSION_4")
            .marker("PINHOLE")
            .scalar("fu", self.focal.x)
            .scalar("fv", self.focal.y)
            .scalar("cu", self.optical_center.x)
            .scalar("cv", self.optical_center.y)
            .values("u_direction", &[1.0, 0.0, 0.0])
            .values("v_direction", &[0.0, 1.0, 0.0])
            .values("w_direction", &[0.0, 0.0, 1.0])
            .vector3("C", &self.center)
            .matrix3("R", self.rotation.matrix())
            .scalar("pitch", self.pixel_pitch)
            .marker(self.distortion.name());
        if let LensDistortion::Tsai { k1, k2, p1, p2 } = self.distortion {
            writer
                .scalar("k1", k1)
                .scalar("k2", k2)
                .scalar("p1", p1)
                .scalar("p2", p2);
        }
        writer.write(path)
    }
}

impl SensorModel for PinholeModel {
    fn project(&self, point: &Vector3<f64>) -> AdjustResult<Vector2<f64>> {
        PinholeModel::project(self, point)
    }

    fn camera_center(&self) -> Vector3<f64> {
        self.center
    }

    fn model_name(&self) -> &'static str {
        "Pinhole"
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn nadir_camera() -> PinholeModel {
        // Looking down the -z world axis from 1000 m.
        let rotation = Rotation3::from_euler_angles(std::f64::consts::PI, 0.0, 0.0);
        PinholeModel::new(
            Vector3::new(0.0, 0.0, 1000.0),
            rotation,
            Vector2::new(500.0, 500.0),
            Vector2::new(320.0, 240.0),
            1.0,
        )
        .unwrap()
    }

    #[test]
    fn test_project_on_axis() {
        let camera = nadir_camera();
        let uv = camera.project(&Vector3::new(0.0, 0.0, 0.0)).unwrap();
        assert!((uv - Vector2::new(320.0, 240.0)).norm() < 1e-9);
    }

    #[test]
    fn test_project_off_axis() {
        let camera = nadir_camera();
        let uv = camera.project(&Vector3::new(100.0, 0.0, 0.0)).unwrap();
        assert!((uv.x - (320.0 + 50.0)).abs() < 1e-9);
        assert!((uv.y - 240.0).abs() < 1e-9);
    }

    #[test]
    fn test_point_behind_camera() {
        let camera = nadir_camera();
        let result = camera.project(&Vector3::new(0.0, 0.0, 2000.0));
        assert!(matches!(result, Err(AdjustError::Projection(_))));
    }

    #[test]
    fn test_invalid_params() {
        let result = PinholeModel::new(
            Vector3::zeros(),
            Rotation3::identity(),
            Vector2::new(0.0, 1.0),
            Vector2::zeros(),
            1.0,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_set_focal_length_keeps_aspect() {
        let mut camera = PinholeModel::new(
            Vector3::zeros(),
            Rotation3::identity(),
            Vector2::new(100.0, 200.0),
            Vector2::zeros(),
            1.0,
        )
        .unwrap();
        camera.set_focal_length(150.0);
        assert_eq!(camera.focal_length(), Vector2::new(150.0, 300.0));
    }

    #[test]
    fn test_distortion_params() {
        let mut distortion = LensDistortion::Tsai {
            k1: 0.0,
            k2: 0.0,
            p1: 0.0,
            p2: 0.0,
        };
        distortion.set_params(&[0.1, 0.01, 0.001, 0.002]).unwrap();
        assert_eq!(distortion.params(), vec![0.1, 0.01, 0.001, 0.002]);
        assert!(distortion.set_params(&[1.0]).is_err());
        assert!(LensDistortion::Null.set_params(&[]).is_ok());

        let p = Vector2::new(0.0, 0.0);
        assert_eq!(distortion.distort(&p), p);
    }

    #[test]
    fn test_apply_transform_moves_center_and_keeps_projection() {
        let mut camera = nadir_camera();
        let point = Vector3::new(30.0, -20.0, 5.0);
        let before = camera.project(&point).unwrap();

        let transform = SimilarityTransform::from_parts(
            &Rotation3::from_euler_angles(0.0, 0.0, 0.3),
            &Vector3::new(10.0, 20.0, 30.0),
            1.0,
        );
        camera.apply_transform(&transform);
        let after = camera.project(&transform.transform_point(&point)).unwrap();
        assert!((before - after).norm() < 1e-9);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cam.tsai");
        let camera = nadir_camera().with_distortion(LensDistortion::Tsai {
            k1: -0.1,
            k2: 0.02,
            p1: 1e-4,
            p2: -2e-4,
        });
        camera.write_to_file(&path).unwrap();

        let loaded = PinholeModel::read_from_file(&path).unwrap();
        assert_eq!(loaded.distortion().name(), "TSAI");
        assert!((loaded.camera_center() - camera.camera_center()).norm() < 1e-9);
        assert!((loaded.camera_pose().matrix() - camera.camera_pose().matrix()).norm() < 1e-12);
        let point = Vector3::new(12.0, 34.0, 0.0);
        let diff = loaded.project(&point).unwrap() - camera.project(&point).unwrap();
        assert!(diff.norm() < 1e-9);
    }
}
