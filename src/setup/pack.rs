//! Conversion between concrete camera models and parameter store values.
//!
//! Extrinsic blocks hold the pose of the working camera as a delta from the
//! original model (see [`CameraAdjustment::between_poses`]), so an all-zero
//! block always means "the original pose". Intrinsic blocks hold absolute
//! values.

use crate::camera::{CameraAdjustment, CameraFamily, CameraModel, OpticalBarModel, PinholeModel};
use crate::core::intrinsics::IntrinsicCategory;
use crate::core::params::ParameterStore;
use crate::error::{AdjustError, AdjustResult};
use nalgebra::Vector2;

fn mismatch(icam: usize, expected: CameraFamily, found: &CameraModel) -> AdjustError {
    AdjustError::CameraTypeMismatch {
        index: icam,
        expected: expected.as_str(),
        found: found.family().as_str(),
    }
}

/// The pinhole model inside `camera`, or a type-mismatch error.
pub fn expect_pinhole(icam: usize, camera: &CameraModel) -> AdjustResult<&PinholeModel> {
    camera
        .as_pinhole()
        .ok_or_else(|| mismatch(icam, CameraFamily::Pinhole, camera))
}

/// The optical bar model inside `camera`, or a type-mismatch error.
pub fn expect_optical_bar(icam: usize, camera: &CameraModel) -> AdjustResult<&OpticalBarModel> {
    camera
        .as_optical_bar()
        .ok_or_else(|| mismatch(icam, CameraFamily::OpticalBar, camera))
}

fn init_intrinsics(
    store: &mut ParameterStore,
    icam: usize,
    focus: f64,
    center: Vector2<f64>,
    other: &[f64],
) -> AdjustResult<()> {
    store.init_intrinsic(icam, IntrinsicCategory::FocalLength, &[focus])?;
    store.init_intrinsic(icam, IntrinsicCategory::OpticalCenter, center.as_slice())?;
    store.init_intrinsic(icam, IntrinsicCategory::OtherIntrinsics, other)?;
    Ok(())
}

/// Pack a working pinhole camera into the store.
///
/// `original` is the model the extrinsic delta is measured from.
pub fn pack_pinhole_to_arrays(
    camera: &PinholeModel,
    original: &CameraModel,
    icam: usize,
    store: &mut ParameterStore,
) -> AdjustResult<()> {
    let original = expect_pinhole(icam, original)?;
    let delta = CameraAdjustment::between_poses(
        &original.camera_center(),
        &original.camera_pose(),
        &camera.camera_center(),
        &camera.camera_pose(),
    );
    delta.pack_to_array(store.camera_mut(icam));

    if store.has_intrinsics() {
        init_intrinsics(
            store,
            icam,
            camera.focal_length().x,
            camera.optical_center(),
            &camera.distortion_params(),
        )?;
    }
    Ok(())
}

/// Copy of the original pinhole camera carrying the store's current values.
pub fn transformed_pinhole_camera(
    icam: usize,
    store: &ParameterStore,
    original: &CameraModel,
) -> AdjustResult<PinholeModel> {
    let original = expect_pinhole(icam, original)?;
    let delta = CameraAdjustment::from_array(store.camera(icam));

    let mut camera = original.clone();
    camera.set_camera_center(delta.apply(&original.camera_center()));
    camera.set_camera_pose(delta.rotation().to_rotation_matrix() * original.camera_pose());

    if store.has_intrinsics() {
        let [cu, cv] = store.center(icam);
        camera.set_focal_length(store.focus(icam));
        camera.set_optical_center(Vector2::new(cu, cv));
        camera.set_distortion_params(store.other_intrinsics(icam))?;
    }
    Ok(camera)
}

/// Pack a working optical bar camera into the store.
pub fn pack_optical_bar_to_arrays(
    camera: &OpticalBarModel,
    original: &CameraModel,
    icam: usize,
    store: &mut ParameterStore,
) -> AdjustResult<()> {
    let original = expect_optical_bar(icam, original)?;
    let delta = CameraAdjustment::between_poses(
        &original.camera_center(),
        &original.camera_pose(),
        &camera.camera_center(),
        &camera.camera_pose(),
    );
    delta.pack_to_array(store.camera_mut(icam));

    if store.has_intrinsics() {
        init_intrinsics(
            store,
            icam,
            camera.focal_length(),
            camera.optical_center(),
            &camera.other_intrinsics(),
        )?;
    }
    Ok(())
}

/// Copy of the original optical bar camera carrying the store's current values.
pub fn transformed_optical_bar_camera(
    icam: usize,
    store: &ParameterStore,
    original: &CameraModel,
) -> AdjustResult<OpticalBarModel> {
    let original = expect_optical_bar(icam, original)?;
    let delta = CameraAdjustment::from_array(store.camera(icam));

    let mut camera = original.clone();
    camera.set_camera_center(delta.apply(&original.camera_center()));
    camera.set_camera_pose(delta.rotation().to_rotation_matrix() * original.camera_pose());

    if store.has_intrinsics() {
        let [cu, cv] = store.center(icam);
        camera.set_focal_length(store.focus(icam));
        camera.set_optical_center(Vector2::new(cu, cv));
        camera.set_other_intrinsics(store.other_intrinsics(icam))?;
    }
    Ok(camera)
}
