//! Pose corrections applied on top of an original camera model.
//!
//! An adjustment is a rigid motion `X ↦ R·X + t` of the world as seen by the
//! original camera: the adjusted camera sees point `X` where the original saw
//! `Rᵀ·(X - t)`. It packs into six values `[tx, ty, tz, rx, ry, rz]`
//! (translation, then axis-angle rotation), which is the extrinsic block layout
//! of the parameter store.
//!
//! # File format
//!
//! `.adjust` files hold two lines:
//!
//! ```text
//! tx ty tz
//! qw qx qy qz
//! ```

use crate::core::params::CAMERA_PARAMS_N;
use crate::error::{AdjustError, AdjustResult};
use crate::geometry::SimilarityTransform;
use nalgebra::{Quaternion, Rotation3, UnitQuaternion, Vector3};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Rotation + translation correction of a camera pose.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraAdjustment {
    rotation: UnitQuaternion<f64>,
    translation: Vector3<f64>,
}

impl fmt::Display for CameraAdjustment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = self.translation;
        let q = self.rotation;
        write!(
            f,
            "Adjustment(translation: [{:.6}, {:.6}, {:.6}], rotation: [w: {:.8}, x: {:.8}, y: {:.8}, z: {:.8}])",
            t.x, t.y, t.z, q.w, q.i, q.j, q.k
        )
    }
}

impl Default for CameraAdjustment {
    fn default() -> Self {
        Self::identity()
    }
}

impl CameraAdjustment {
    pub fn identity() -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation: Vector3::zeros(),
        }
    }

    pub fn new(translation: Vector3<f64>, rotation: UnitQuaternion<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Read from an extrinsic block `[tx, ty, tz, rx, ry, rz]`.
    ///
    /// # Panics
    /// If `values` holds fewer than six entries.
    pub fn from_array(values: &[f64]) -> Self {
        assert!(
            values.len() >= CAMERA_PARAMS_N,
            "adjustment block needs {CAMERA_PARAMS_N} values, got {}",
            values.len()
        );
        let translation = Vector3::new(values[0], values[1], values[2]);
        let axis_angle = Vector3::new(values[3], values[4], values[5]);
        Self {
            rotation: UnitQuaternion::from_scaled_axis(axis_angle),
            translation,
        }
    }

    /// Write into an extrinsic block.
    ///
    /// # Panics
    /// If `values` holds fewer than six entries.
    pub fn pack_to_array(&self, values: &mut [f64]) {
        assert!(
            values.len() >= CAMERA_PARAMS_N,
            "adjustment block needs {CAMERA_PARAMS_N} values, got {}",
            values.len()
        );
        let axis_angle = self.rotation.scaled_axis();
        values[..3].copy_from_slice(self.translation.as_slice());
        values[3..6].copy_from_slice(axis_angle.as_slice());
    }

    pub fn rotation(&self) -> UnitQuaternion<f64> {
        self.rotation
    }

    pub fn translation(&self) -> Vector3<f64> {
        self.translation
    }

    pub fn is_identity(&self, tolerance: f64) -> bool {
        self.translation.norm() <= tolerance && self.rotation.angle() <= tolerance
    }

    /// Map a point from the original frame to the adjusted frame: `R·X + t`.
    pub fn apply(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * point + self.translation
    }

    /// Map a point from the adjusted frame back to the original frame.
    pub fn apply_inverse(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.rotation.inverse() * (point - self.translation)
    }

    /// The adjustment as a rigid 4x4 transform in the Earth-centered frame.
    ///
    /// Applying this transform to a physically modeled camera moves it exactly
    /// like the adjustment moves an adjusted camera.
    pub fn ecef_transform(&self) -> SimilarityTransform {
        SimilarityTransform::from_parts(&self.rotation.to_rotation_matrix(), &self.translation, 1.0)
    }

    /// Adjustment that takes a camera with center `original_center` and
    /// camera-to-world rotation `original_rotation` to the given new pose.
    pub fn between_poses(
        original_center: &Vector3<f64>,
        original_rotation: &Rotation3<f64>,
        new_center: &Vector3<f64>,
        new_rotation: &Rotation3<f64>,
    ) -> Self {
        let delta = new_rotation * original_rotation.inverse();
        let rotation = UnitQuaternion::from_rotation_matrix(&delta);
        let translation = new_center - rotation * original_center;
        Self::new(translation, rotation)
    }

    /// Fold a similarity transform into the adjustment.
    ///
    /// The rotation composes as `R_s·R`. The translation is chosen so that the
    /// adjusted camera center `R·c + t` lands on its transformed position
    /// `s·R_s·(R·c + t) + t_s`. For a rigid transform this equals applying the
    /// transform on top of the adjustment.
    pub fn compose_transform(
        &self,
        transform: &SimilarityTransform,
        original_center: &Vector3<f64>,
    ) -> Self {
        let rotation =
            UnitQuaternion::from_rotation_matrix(&transform.rotation()) * self.rotation;
        let new_center = transform.transform_point(&self.apply(original_center));
        let translation = new_center - rotation * original_center;
        Self::new(translation, rotation)
    }

    /// Read an `.adjust` file.
    pub fn read_from_adjust_file<P: AsRef<Path>>(path: P) -> AdjustResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| AdjustError::io(path, e))?;
        let mut lines = content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty());

        let translation_values = match lines.next() {
            Some((line_num, line)) => parse_numbers(path, line_num + 1, line, 3)?,
            None => return Err(missing_line(path, 1, "translation")),
        };
        let quaternion_values = match lines.next() {
            Some((line_num, line)) => parse_numbers(path, line_num + 1, line, 4)?,
            None => return Err(missing_line(path, 2, "rotation")),
        };

        let translation = Vector3::new(
            translation_values[0],
            translation_values[1],
            translation_values[2],
        );
        let quaternion = Quaternion::new(
            quaternion_values[0],
            quaternion_values[1],
            quaternion_values[2],
            quaternion_values[3],
        );
        if quaternion.norm() < 1e-12 {
            return Err(AdjustError::Parse {
                path: path.to_path_buf(),
                line: 2,
                message: "rotation quaternion has zero norm".to_string(),
            });
        }
        Ok(Self::new(translation, UnitQuaternion::from_quaternion(quaternion)))
    }

    /// Write an `.adjust` file.
    pub fn write_to_adjust_file<P: AsRef<Path>>(&self, path: P) -> AdjustResult<()> {
        let path = path.as_ref();
        let t = self.translation;
        let q = self.rotation;
        let text = format!(
            "{:.17} {:.17} {:.17}\n{:.17} {:.17} {:.17} {:.17}\n",
            t.x, t.y, t.z, q.w, q.i, q.j, q.k
        );
        fs::write(path, text).map_err(|e| AdjustError::io(path, e))
    }
}

fn missing_line(path: &Path, line: usize, what: &str) -> AdjustError {
    AdjustError::Parse {
        path: path.to_path_buf(),
        line,
        message: format!("missing {what} line"),
    }
}

fn parse_numbers(path: &Path, line_num: usize, line: &str, count: usize) -> AdjustResult<Vec<f64>> {
    let values = line
        .split_whitespace()
        .map(|token| {
            token.parse::<f64>().map_err(|_| AdjustError::Parse {
                path: path.to_path_buf(),
                line: line_num,
                message: format!("invalid number: {token}"),
            })
        })
        .collect::<AdjustResult<Vec<f64>>>()?;
    if values.len() < count {
        return Err(AdjustError::Parse {
            path: path.to_path_buf(),
            line: line_num,
            message: format!("expecting {count} values, found {}", values.len()),
        });
    }
    Ok(values)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Base name `<prefix>-<image>-<camera>` shared by adjustment and output files.
///
/// The camera part is dropped when there is no separate camera file or when it
/// has the same stem as the image (cameras embedded in the image).
pub fn bundle_adjust_base_name(prefix: &Path, image_file: &Path, camera_file: &Path) -> PathBuf {
    let image_stem = file_stem(image_file);
    let camera_stem = file_stem(camera_file);
    let mut name = format!("{}-{}", prefix.display(), image_stem);
    if !camera_stem.is_empty() && camera_stem != image_stem {
        name.push('-');
        name.push_str(&camera_stem);
    }
    PathBuf::from(name)
}

/// Path of the adjustment file for an image/camera pair.
pub fn bundle_adjust_file_name(prefix: &Path, image_file: &Path, camera_file: &Path) -> PathBuf {
    with_extension(bundle_adjust_base_name(prefix, image_file, camera_file), "adjust")
}

/// Append an extension without replacing dots already in the name.
pub(crate) fn with_extension(base: PathBuf, extension: &str) -> PathBuf {
    let mut name = base.into_os_string();
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Frobenius distance between the two rotation matrices.
    fn rotation_gap(a: &CameraAdjustment, b: &CameraAdjustment) -> f64 {
        (a.rotation().to_rotation_matrix().matrix() - b.rotation().to_rotation_matrix().matrix())
            .norm()
    }

    fn sample() -> CameraAdjustment {
        CameraAdjustment::new(
            Vector3::new(1.5, -2.0, 0.25),
            UnitQuaternion::from_euler_angles(0.01, 0.02, -0.03),
        )
    }

    #[test]
    fn test_identity_packs_to_zeros() {
        let mut block = [1.0; 6];
        CameraAdjustment::identity().pack_to_array(&mut block);
        assert_eq!(block, [0.0; 6]);
        assert!(CameraAdjustment::from_array(&block).is_identity(1e-15));
    }

    #[test]
    fn test_array_round_trip() {
        let adjustment = sample();
        let mut block = [0.0; 6];
        adjustment.pack_to_array(&mut block);
        let restored = CameraAdjustment::from_array(&block);
        assert!((restored.translation() - adjustment.translation()).norm() < 1e-12);
        assert!(rotation_gap(&restored, &adjustment) < 1e-12);
    }

    #[test]
    fn test_apply_inverse() {
        let adjustment = sample();
        let point = Vector3::new(100.0, 200.0, 300.0);
        let back = adjustment.apply_inverse(&adjustment.apply(&point));
        assert!((back - point).norm() < 1e-9);
    }

    #[test]
    fn test_ecef_transform_matches_apply() {
        let adjustment = sample();
        let point = Vector3::new(-4.0, 5.0, 6.0);
        let via_transform = adjustment.ecef_transform().transform_point(&point);
        assert!((via_transform - adjustment.apply(&point)).norm() < 1e-12);
    }

    #[test]
    fn test_compose_rigid_transform() {
        let adjustment = sample();
        let transform = SimilarityTransform::from_parts(
            &Rotation3::from_euler_angles(0.2, 0.0, 0.1),
            &Vector3::new(3.0, 2.0, 1.0),
            1.0,
        );
        let composed = adjustment.compose_transform(&transform, &Vector3::new(7.0, 8.0, 9.0));
        let point = Vector3::new(1.0, -1.0, 2.0);
        let expected = transform.transform_point(&adjustment.apply(&point));
        assert!((composed.apply(&point) - expected).norm() < 1e-9);
    }

    #[test]
    fn test_compose_scaled_transform_moves_center() {
        let adjustment = sample();
        let center = Vector3::new(7.0, 8.0, 9.0);
        let transform = SimilarityTransform::from_parts(
            &Rotation3::identity(),
            &Vector3::new(0.0, 0.0, 10.0),
            2.0,
        );
        let composed = adjustment.compose_transform(&transform, &center);
        let expected = transform.transform_point(&adjustment.apply(&center));
        assert!((composed.apply(&center) - expected).norm() < 1e-9);
    }

    #[test]
    fn test_adjust_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run-left.adjust");
        let adjustment = sample();
        adjustment.write_to_adjust_file(&path).unwrap();

        let loaded = CameraAdjustment::read_from_adjust_file(&path).unwrap();
        assert!((loaded.translation() - adjustment.translation()).norm() < 1e-12);
        assert!(rotation_gap(&loaded, &adjustment) < 1e-12);
    }

    #[test]
    fn test_adjust_file_errors() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.adjust");
        assert!(matches!(
            CameraAdjustment::read_from_adjust_file(&missing),
            Err(AdjustError::Io { .. })
        ));

        let short = dir.path().join("short.adjust");
        fs::write(&short, "1 2 3\n").unwrap();
        assert!(matches!(
            CameraAdjustment::read_from_adjust_file(&short),
            Err(AdjustError::Parse { line: 2, .. })
        ));

        let garbage = dir.path().join("garbage.adjust");
        fs::write(&garbage, "1 2 x\n1 0 0 0\n").unwrap();
        let err = CameraAdjustment::read_from_adjust_file(&garbage).unwrap_err();
        assert!(err.to_string().contains("invalid number: x"));
    }

    #[test]
    fn test_file_names() {
        let prefix = Path::new("ba/run");
        assert_eq!(
            bundle_adjust_file_name(prefix, Path::new("data/left.tif"), Path::new("data/left.xml")),
            PathBuf::from("ba/run-left.adjust")
        );
        assert_eq!(
            bundle_adjust_file_name(prefix, Path::new("left.tif"), Path::new("cams/L1.tsai")),
            PathBuf::from("ba/run-left-L1.adjust")
        );
        assert_eq!(
            bundle_adjust_file_name(prefix, Path::new("img.v2.cub"), Path::new("")),
            PathBuf::from("ba/run-img.v2.adjust")
        );
    }
}
