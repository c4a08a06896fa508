//! Camera models handled by the bundle adjustment setup.
//!
//! # Key Components
//!
//! - **`SensorModel` trait**: projection interface of any loaded sensor model
//! - **`CameraModel` enum**: the three families the setup distinguishes
//!   - `Generic`: an opaque sensor model plus a pose adjustment
//!   - `Pinhole`: a frame camera whose parameters are edited directly
//!   - `OpticalBar`: a panoramic scanning camera, edited directly
//! - **`CameraAdjustment`**: rotation + translation correction and `.adjust` files

pub mod adjustment;
pub mod generic;
pub mod optical_bar;
pub mod pinhole;
pub mod tsai;

pub use adjustment::{CameraAdjustment, bundle_adjust_base_name, bundle_adjust_file_name};
pub use generic::AdjustedCamera;
pub use optical_bar::OpticalBarModel;
pub use pinhole::{LensDistortion, PinholeModel};

use crate::error::{AdjustError, AdjustResult};
use crate::geometry::SimilarityTransform;
use nalgebra::{Vector2, Vector3};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tsai::TsaiFile;

/// Minimum depth for valid 3D points (meters).
///
/// Points closer than this to the image plane are not projected.
pub const MIN_DEPTH: f64 = 1e-6;

/// Interface shared by every sensor model.
pub trait SensorModel: Send + Sync {
    /// Project a world point to pixel coordinates.
    fn project(&self, point: &Vector3<f64>) -> AdjustResult<Vector2<f64>>;

    /// Camera center in world coordinates.
    fn camera_center(&self) -> Vector3<f64>;

    fn model_name(&self) -> &'static str;
}

/// Camera family, which decides how parameters are packed and written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CameraFamily {
    Generic,
    Pinhole,
    OpticalBar,
}

impl CameraFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            CameraFamily::Generic => "generic",
            CameraFamily::Pinhole => "pinhole",
            CameraFamily::OpticalBar => "optical bar",
        }
    }

    /// Extension of the file written for a camera of this family.
    pub fn output_extension(&self) -> &'static str {
        match self {
            CameraFamily::Generic => "adjust",
            CameraFamily::Pinhole | CameraFamily::OpticalBar => "tsai",
        }
    }
}

impl fmt::Display for CameraFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A camera of one of the supported families.
#[derive(Debug, Clone)]
pub enum CameraModel {
    Generic(AdjustedCamera),
    Pinhole(PinholeModel),
    OpticalBar(OpticalBarModel),
}

impl CameraModel {
    /// Wrap an arbitrary sensor model with an identity adjustment.
    pub fn generic(sensor: Arc<dyn SensorModel>) -> Self {
        CameraModel::Generic(AdjustedCamera::unadjusted(sensor))
    }

    pub fn family(&self) -> CameraFamily {
        match self {
            CameraModel::Generic(_) => CameraFamily::Generic,
            CameraModel::Pinhole(_) => CameraFamily::Pinhole,
            CameraModel::OpticalBar(_) => CameraFamily::OpticalBar,
        }
    }

    pub fn project(&self, point: &Vector3<f64>) -> AdjustResult<Vector2<f64>> {
        match self {
            CameraModel::Generic(camera) => camera.project(point),
            CameraModel::Pinhole(camera) => camera.project(point),
            CameraModel::OpticalBar(camera) => camera.project(point),
        }
    }

    pub fn camera_center(&self) -> Vector3<f64> {
        match self {
            CameraModel::Generic(camera) => camera.camera_center(),
            CameraModel::Pinhole(camera) => camera.camera_center(),
            CameraModel::OpticalBar(camera) => camera.camera_center(),
        }
    }

    /// Move the camera with a similarity transform.
    ///
    /// Callers are responsible for rejecting scaled transforms where the
    /// sensor cannot absorb them.
    pub fn apply_transform(&mut self, transform: &SimilarityTransform) {
        match self {
            CameraModel::Generic(camera) => camera.apply_transform(transform),
            CameraModel::Pinhole(camera) => camera.apply_transform(transform),
            CameraModel::OpticalBar(camera) => camera.apply_transform(transform),
        }
    }

    /// Write the camera: the adjustment for generic cameras, the full model
    /// otherwise.
    pub fn write<P: AsRef<Path>>(&self, path: P) -> AdjustResult<()> {
        match self {
            CameraModel::Generic(camera) => camera.adjustment().write_to_adjust_file(path),
            CameraModel::Pinhole(camera) => camera.write_to_file(path),
            CameraModel::OpticalBar(camera) => camera.write_to_file(path),
        }
    }

    pub fn as_pinhole(&self) -> Option<&PinholeModel> {
        match self {
            CameraModel::Pinhole(camera) => Some(camera),
            _ => None,
        }
    }

    pub fn as_optical_bar(&self) -> Option<&OpticalBarModel> {
        match self {
            CameraModel::OpticalBar(camera) => Some(camera),
            _ => None,
        }
    }

    pub fn as_generic(&self) -> Option<&AdjustedCamera> {
        match self {
            CameraModel::Generic(camera) => Some(camera),
            _ => None,
        }
    }
}

/// Load a pinhole or optical bar camera from a `.tsai`-style file.
pub fn load_camera_model<P: AsRef<Path>>(path: P) -> AdjustResult<CameraModel> {
    let file = TsaiFile::read(path)?;
    if file.has_marker("PINHOLE") {
        Ok(CameraModel::Pinhole(PinholeModel::from_tsai(&file)?))
    } else if file.has_marker("OPTICAL_BAR") {
        Ok(CameraModel::OpticalBar(OpticalBarModel::from_tsai(&file)?))
    } else {
        Err(AdjustError::Parse {
            path: file.path().to_path_buf(),
            line: 0,
            message: "unknown camera model type".to_string(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use nalgebra::Rotation3;
    use tempfile::TempDir;

    fn pinhole() -> PinholeModel {
        PinholeModel::new(
            Vector3::new(1.0, 2.0, 3.0),
            Rotation3::identity(),
            Vector2::new(800.0, 800.0),
            Vector2::new(400.0, 300.0),
            1.0,
        )
        .unwrap()
    }

    #[test]
    fn test_family_and_extension() {
        let camera = CameraModel::Pinhole(pinhole());
        assert_eq!(camera.family(), CameraFamily::Pinhole);
        assert_eq!(camera.family().output_extension(), "tsai");

        let generic = CameraModel::generic(Arc::new(pinhole()));
        assert_eq!(generic.family(), CameraFamily::Generic);
        assert_eq!(generic.family().output_extension(), "adjust");
        assert_eq!(generic.camera_center(), Vector3::new(1.0, 2.0, 3.0));
        assert!(generic.as_pinhole().is_none());
    }

    #[test]
    fn test_load_camera_model_dispatch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cam.tsai");
        pinhole().write_to_file(&path).unwrap();
        let camera = load_camera_model(&path).unwrap();
        assert_eq!(camera.family(), CameraFamily::Pinhole);

        let bogus = dir.path().join("bogus.tsai");
        std::fs::write(&bogus, "VERSION_4\nLINESCAN\n").unwrap();
        assert!(matches!(
            load_camera_model(&bogus),
            Err(AdjustError::Parse { .. })
        ));
    }

    #[test]
    fn test_write_generic_writes_adjustment() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run-img.adjust");
        let camera = CameraModel::generic(Arc::new(pinhole()));
        camera.write(&path).unwrap();
        let adjustment = CameraAdjustment::read_from_adjust_file(&path).unwrap();
        assert!(adjustment.is_identity(1e-15));
    }
}
