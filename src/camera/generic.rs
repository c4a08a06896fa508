//! A sensor model of any kind, seen through a pose adjustment.

use crate::camera::SensorModel;
use crate::camera::adjustment::CameraAdjustment;
use crate::error::AdjustResult;
use crate::geometry::SimilarityTransform;
use nalgebra::{Vector2, Vector3};
use std::fmt;
use std::sync::Arc;

/// Original sensor model plus the adjustment applied on top of it.
///
/// The original is shared and never modified. Cloning an adjusted camera
/// copies only the adjustment.
#[derive(Clone)]
pub struct AdjustedCamera {
    original: Arc<dyn SensorModel>,
    adjustment: CameraAdjustment,
}

impl fmt::Debug for AdjustedCamera {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdjustedCamera")
            .field("original", &self.original.model_name())
            .field("adjustment", &self.adjustment)
            .finish()
    }
}

impl AdjustedCamera {
    pub fn new(original: Arc<dyn SensorModel>, adjustment: CameraAdjustment) -> Self {
        Self {
            original,
            adjustment,
        }
    }

    pub fn unadjusted(original: Arc<dyn SensorModel>) -> Self {
        Self::new(original, CameraAdjustment::identity())
    }

    pub fn original(&self) -> &Arc<dyn SensorModel> {
        &self.original
    }

    pub fn adjustment(&self) -> &CameraAdjustment {
        &self.adjustment
    }

    pub fn project(&self, point: &Vector3<f64>) -> AdjustResult<Vector2<f64>> {
        self.original.project(&self.adjustment.apply_inverse(point))
    }

    pub fn camera_center(&self) -> Vector3<f64> {
        self.adjustment.apply(&self.original.camera_center())
    }

    pub fn apply_transform(&mut self, transform: &SimilarityTransform) {
        self.adjustment = self
            .adjustment
            .compose_transform(transform, &self.original.camera_center());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::camera::pinhole::PinholeModel;
    use nalgebra::{Rotation3, UnitQuaternion};

    fn original() -> Arc<dyn SensorModel> {
        Arc::new(
            PinholeModel::new(
                Vector3::new(0.0, 0.0, -500.0),
                Rotation3::identity(),
                Vector2::new(1000.0, 1000.0),
                Vector2::new(500.0, 500.0),
                1.0,
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_identity_matches_original() {
        let camera = AdjustedCamera::unadjusted(original());
        let point = Vector3::new(10.0, -20.0, 30.0);
        let expected = camera.original().project(&point).unwrap();
        assert_eq!(camera.project(&point).unwrap(), expected);
        assert_eq!(camera.camera_center(), Vector3::new(0.0, 0.0, -500.0));
    }

    #[test]
    fn test_adjustment_moves_center() {
        let adjustment = CameraAdjustment::new(
            Vector3::new(1.0, 2.0, 3.0),
            UnitQuaternion::from_euler_angles(0.0, 0.0, 0.5),
        );
        let camera = AdjustedCamera::new(original(), adjustment.clone());
        let expected = adjustment.apply(&Vector3::new(0.0, 0.0, -500.0));
        assert!((camera.camera_center() - expected).norm() < 1e-9);

        let point = Vector3::new(10.0, -20.0, 30.0);
        let uv = camera.project(&adjustment.apply(&point)).unwrap();
        let uv_original = camera.original().project(&point).unwrap();
        assert!((uv - uv_original).norm() < 1e-9);
    }

    #[test]
    fn test_clone_shares_original() {
        let camera = AdjustedCamera::unadjusted(original());
        let mut copy = camera.clone();
        copy.apply_transform(&SimilarityTransform::from_parts(
            &Rotation3::identity(),
            &Vector3::new(5.0, 0.0, 0.0),
            1.0,
        ));
        assert!(Arc::ptr_eq(camera.original(), copy.original()));
        assert!(camera.adjustment().is_identity(0.0));
        assert!((copy.camera_center().x - 5.0).abs() < 1e-12);
    }
}
