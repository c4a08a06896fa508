//! Similarity transforms in 3D (rotation, uniform scale, translation).
//!
//! A similarity is stored as its 4x4 homogeneous matrix:
//!
//! ```text
//! [ s·R  t ]
//! [ 0    1 ]
//! ```
//!
//! The scale is recovered as `s = det(s·R)^(1/3)`, the rotation as the closest
//! rotation to `s·R / s`. Initial transforms (for example the output of a point
//! cloud alignment) are read from text files holding the 16 matrix entries in
//! row-major order.

use crate::error::{AdjustError, AdjustResult};
use nalgebra::{Matrix3, Matrix4, Rotation3, Vector3, Vector4};
use std::fmt;
use std::fs;
use std::path::Path;

/// Tolerance used to decide whether a transform carries a scale.
pub const SCALE_TOLERANCE: f64 = 1e-6;

/// Similarity transform `x ↦ s·R·x + t`.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityTransform {
    matrix: Matrix4<f64>,
}

impl fmt::Display for SimilarityTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = self.translation();
        let (axis_angle, s) = (self.rotation().scaled_axis(), self.scale());
        write!(
            f,
            "Similarity(translation: [{:.4}, {:.4}, {:.4}], rotation: [{:.6}, {:.6}, {:.6}], scale: {:.8})",
            t.x, t.y, t.z, axis_angle.x, axis_angle.y, axis_angle.z, s
        )
    }
}

impl SimilarityTransform {
    pub fn identity() -> Self {
        Self {
            matrix: Matrix4::identity(),
        }
    }

    /// Build from a homogeneous matrix.
    ///
    /// The last row must be `[0, 0, 0, 1]` and the linear part must have a
    /// positive determinant.
    pub fn from_matrix(matrix: Matrix4<f64>) -> AdjustResult<Self> {
        let last_row = matrix.row(3);
        let expected = Vector4::new(0.0, 0.0, 0.0, 1.0).transpose();
        if (last_row - expected).norm() > SCALE_TOLERANCE {
            return Err(AdjustError::InvalidInput(format!(
                "Expecting the last row of a transform to be [0 0 0 1], got {last_row}"
            )));
        }
        let linear: Matrix3<f64> = matrix.fixed_view::<3, 3>(0, 0).into_owned();
        let det = linear.determinant();
        if det.is_nan() || det <= 0.0 {
            return Err(AdjustError::InvalidInput(format!(
                "Transform must have a positive determinant, got {det}"
            )));
        }
        Ok(Self { matrix })
    }

    /// Build from rotation, translation and scale.
    pub fn from_parts(rotation: &Rotation3<f64>, translation: &Vector3<f64>, scale: f64) -> Self {
        let mut matrix = Matrix4::identity();
        matrix
            .fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&(rotation.matrix() * scale));
        matrix.fixed_view_mut::<3, 1>(0, 3).copy_from(translation);
        Self { matrix }
    }

    /// Read a 4x4 matrix from a text file (16 numbers, row-major).
    ///
    /// Blank lines and lines starting with `#` are skipped.
    pub fn read_from_file<P: AsRef<Path>>(path: P) -> AdjustResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| AdjustError::io(path, e))?;

        let mut values = Vec::with_capacity(16);
        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            for token in line.split_whitespace() {
                let value = token.parse::<f64>().map_err(|_| AdjustError::Parse {
                    path: path.to_path_buf(),
                    line: line_num + 1,
                    message: format!("invalid number: {token}"),
                })?;
                values.push(value);
            }
        }

        if values.len() != 16 {
            return Err(AdjustError::Parse {
                path: path.to_path_buf(),
                line: 0,
                message: format!("expecting 16 matrix entries, found {}", values.len()),
            });
        }
        Self::from_matrix(Matrix4::from_row_slice(&values))
    }

    /// Write the matrix as four rows of four numbers.
    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> AdjustResult<()> {
        let path = path.as_ref();
        let mut text = String::new();
        for row in self.matrix.row_iter() {
            let cols: Vec<String> = row.iter().map(|v| format!("{v:.17}")).collect();
            text.push_str(&cols.join(" "));
            text.push('\n');
        }
        fs::write(path, text).map_err(|e| AdjustError::io(path, e))
    }

    pub fn matrix(&self) -> &Matrix4<f64> {
        &self.matrix
    }

    fn linear(&self) -> Matrix3<f64> {
        self.matrix.fixed_view::<3, 3>(0, 0).into_owned()
    }

    /// Uniform scale, `det(linear)^(1/3)`.
    pub fn scale(&self) -> f64 {
        self.linear().determinant().cbrt()
    }

    /// Rotation part with the scale divided out.
    pub fn rotation(&self) -> Rotation3<f64> {
        Rotation3::from_matrix(&(self.linear() / self.scale()))
    }

    pub fn translation(&self) -> Vector3<f64> {
        self.matrix.fixed_view::<3, 1>(0, 3).into_owned()
    }

    /// Whether the scale equals one within [`SCALE_TOLERANCE`].
    pub fn is_rigid(&self) -> bool {
        (self.scale() - 1.0).abs() <= SCALE_TOLERANCE
    }

    /// Apply to a point: `s·R·p + t`.
    pub fn transform_point(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.linear() * point + self.translation()
    }
}

impl Default for SimilarityTransform {
    fn default() -> Self {
        Self::identity()
    }
}
