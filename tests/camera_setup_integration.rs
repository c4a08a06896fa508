//! Integration tests for camera setup: prior adjustments, initial transforms,
//! packing into the parameter store, materializing and writing cameras.

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use apex_adjust::camera::{CameraAdjustment, CameraModel, bundle_adjust_file_name, load_camera_model};
use apex_adjust::config::{AdjustOptions, StereoSession};
use apex_adjust::core::intrinsics::IntrinsicCategory;
use apex_adjust::setup::{BundleSetup, InputCamera, apply_transform_to_cameras};
use apex_adjust::{AdjustError, Datum};
use nalgebra::{UnitQuaternion, Vector3};
use std::path::PathBuf;
use tempfile::TempDir;

use setup_test_utils::*;

#[test]
fn test_pinhole_transform_then_clear_round_trips() {
    let transform = similarity(1.2);
    let options = AdjustOptions::default()
        .with_stereo_session(StereoSession::Pinhole)
        .with_solve_intrinsics(true)
        .with_intrinsics("", "", true)
        .unwrap()
        .with_initial_transform(transform.clone());
    let setup = BundleSetup::new(pinhole_inputs(3), options).unwrap();
    let mut store = setup.build_parameter_store().unwrap();

    let outcome = setup.init_cams(&mut store).unwrap();
    assert!(outcome.cameras_changed);

    for (icam, camera) in outcome.cameras.iter().enumerate() {
        let original = &setup.inputs()[icam].model;
        assert_vec3_near(
            &camera.camera_center(),
            &transform.transform_point(&original.camera_center()),
            1e-6,
        );
        for point in ground_points() {
            let before = original.project(&point).unwrap();
            let after = camera.project(&transform.transform_point(&point)).unwrap();
            assert!((before - after).norm() < 1e-6);
        }
    }

    store.clear_cameras();
    let restored = setup.materialize(&store).unwrap();
    for (icam, camera) in restored.iter().enumerate() {
        let original = &setup.inputs()[icam].model;
        assert_vec3_near(&camera.camera_center(), &original.camera_center(), 1e-9);
        assert_same_projections(camera, original, 1e-9);
    }
}

#[test]
fn test_generic_input_adjustments_and_transform() {
    let dir = TempDir::new().unwrap();
    let prefix = dir.path().join("in");
    let inputs = generic_inputs(2);

    let adjustments: Vec<CameraAdjustment> = (0..2)
        .map(|i| {
            CameraAdjustment::new(
                Vector3::new(i as f64, 2.0, -3.0),
                UnitQuaternion::from_euler_angles(0.001, 0.0, -0.002),
            )
        })
        .collect();
    for (input, adjustment) in inputs.iter().zip(&adjustments) {
        let path = bundle_adjust_file_name(&prefix, &input.image_file, &input.camera_file);
        adjustment.write_to_adjust_file(&path).unwrap();
    }

    let transform = similarity(1.2);
    let options = AdjustOptions::default()
        .with_stereo_session(StereoSession::Dg)
        .with_input_prefix(&prefix)
        .with_initial_transform(transform.clone());
    let setup = BundleSetup::new(inputs, options).unwrap();
    let mut store = setup.build_parameter_store().unwrap();
    let outcome = setup.init_cams(&mut store).unwrap();
    assert!(outcome.cameras_changed);

    for (icam, camera) in outcome.cameras.iter().enumerate() {
        let original_center = setup.inputs()[icam].model.camera_center();
        let expected = transform.transform_point(&adjustments[icam].apply(&original_center));
        assert_vec3_near(&camera.camera_center(), &expected, 1e-6);
    }

    store.clear_cameras();
    let restored = setup.materialize(&store).unwrap();
    for (icam, camera) in restored.iter().enumerate() {
        let original = &setup.inputs()[icam].model;
        assert_vec3_near(&camera.camera_center(), &original.camera_center(), 1e-12);
        assert_same_projections(camera, original, 1e-9);
    }
}

#[test]
fn test_csm_rejects_scaled_transform_before_mutation() {
    let options = AdjustOptions::default()
        .with_stereo_session(StereoSession::Csm)
        .with_initial_transform(similarity(1.2));
    let setup = BundleSetup::new(generic_inputs(2), options).unwrap();
    let mut store = setup.build_parameter_store().unwrap();
    store.camera_mut(0)[0] = 7.0;

    let err = setup.init_cams(&mut store).unwrap_err();
    assert!(matches!(err, AdjustError::InvalidInput(_)));
    assert!(err.to_string().contains("scale"));
    assert_eq!(store.camera(0)[0], 7.0);

    let rigid = AdjustOptions::default()
        .with_stereo_session(StereoSession::Csm)
        .with_initial_transform(similarity(1.0));
    let setup = BundleSetup::new(generic_inputs(2), rigid).unwrap();
    let mut store = setup.build_parameter_store().unwrap();
    assert!(setup.init_cams(&mut store).unwrap().cameras_changed);
}

#[test]
fn test_pinhole_session_accepts_scaled_transform() {
    let options = AdjustOptions::default()
        .with_stereo_session(StereoSession::Pinhole)
        .with_initial_transform(similarity(1.2));
    let setup = BundleSetup::new(pinhole_inputs(2), options).unwrap();
    let mut store = setup.build_parameter_store().unwrap();
    assert!(setup.init_cams(&mut store).is_ok());
}

#[test]
fn test_apply_transform_to_cameras_is_all_or_nothing() {
    let mut cameras: Vec<CameraModel> = generic_inputs(3)
        .iter()
        .map(|input| (*input.model).clone())
        .collect();
    let centers: Vec<Vector3<f64>> = cameras.iter().map(|c| c.camera_center()).collect();

    let result = apply_transform_to_cameras(&mut cameras, &similarity(1.2), StereoSession::Csm);
    assert!(result.is_err());
    for (camera, center) in cameras.iter().zip(&centers) {
        assert_eq!(camera.camera_center(), *center);
    }

    apply_transform_to_cameras(&mut cameras, &similarity(1.2), StereoSession::Pinhole).unwrap();
    let transform = similarity(1.2);
    for (camera, center) in cameras.iter().zip(&centers) {
        assert_vec3_near(&camera.camera_center(), &transform.transform_point(center), 1e-9);
    }
}

#[test]
fn test_optical_bar_rejects_input_adjustments() {
    let dir = TempDir::new().unwrap();
    let options = AdjustOptions::default()
        .with_stereo_session(StereoSession::OpticalBar)
        .with_input_prefix(dir.path().join("in"));
    let setup = BundleSetup::new(optical_bar_inputs(2), options).unwrap();
    let mut store = setup.build_parameter_store().unwrap();
    store.camera_mut(1)[3] = 0.5;
    let snapshot = store.as_slice().to_vec();

    let err = setup.init_cams(&mut store).unwrap_err();
    assert!(matches!(err, AdjustError::InvalidInput(_)));
    assert_eq!(store.as_slice(), snapshot.as_slice());
}

#[test]
fn test_optical_bar_rigid_transform() {
    let transform = similarity(1.0);
    let options = AdjustOptions::default()
        .with_stereo_session(StereoSession::OpticalBar)
        .with_initial_transform(transform.clone());
    let setup = BundleSetup::new(optical_bar_inputs(2), options).unwrap();
    let mut store = setup.build_parameter_store().unwrap();
    let outcome = setup.init_cams(&mut store).unwrap();
    assert!(outcome.cameras_changed);

    for (icam, camera) in outcome.cameras.iter().enumerate() {
        let original = &setup.inputs()[icam].model;
        for point in ground_points() {
            let before = original.project(&point).unwrap();
            let after = camera.project(&transform.transform_point(&point)).unwrap();
            assert!((before - after).norm() < 1e-4);
        }
    }
    assert_eq!(
        store.other_intrinsics(0),
        &[7700.0, 0.95, 0.5],
        "other intrinsics are speed, motion compensation and scan time"
    );
}

#[test]
fn test_missing_input_adjustment_leaves_store_untouched() {
    let dir = TempDir::new().unwrap();
    let options = AdjustOptions::default()
        .with_stereo_session(StereoSession::Pinhole)
        .with_input_prefix(dir.path().join("missing"));
    let setup = BundleSetup::new(pinhole_inputs(2), options).unwrap();
    let mut store = setup.build_parameter_store().unwrap();
    let snapshot = store.as_slice().to_vec();

    let err = setup.init_cams(&mut store).unwrap_err();
    assert!(matches!(err, AdjustError::Io { .. }));
    assert_eq!(store.as_slice(), snapshot.as_slice());
}

#[test]
fn test_write_all_outputs_pinhole() {
    let dir = TempDir::new().unwrap();
    let options = AdjustOptions::default()
        .with_stereo_session(StereoSession::Pinhole)
        .with_out_prefix(dir.path().join("run"))
        .with_datum(Datum::wgs84())
        .with_initial_transform(similarity(1.0));
    let setup = BundleSetup::new(pinhole_inputs(2), options).unwrap();
    let mut store = setup.build_parameter_store().unwrap();
    let outcome = setup.init_cams(&mut store).unwrap();

    let paths = setup.write_all_outputs(&store).unwrap();
    assert_eq!(paths.len(), 2);
    assert_eq!(paths[0], dir.path().join("run-img0.tsai"));

    for (path, camera) in paths.iter().zip(&outcome.cameras) {
        let loaded = load_camera_model(path).unwrap();
        assert_vec3_near(&loaded.camera_center(), &camera.camera_center(), 1e-6);
        assert_same_projections(&loaded, camera, 1e-6);
    }
}

#[test]
fn test_write_all_outputs_generic() {
    let dir = TempDir::new().unwrap();
    let options = AdjustOptions::default()
        .with_stereo_session(StereoSession::Rpc)
        .with_out_prefix(dir.path().join("run"));
    let setup = BundleSetup::new(generic_inputs(2), options).unwrap();
    let mut store = setup.build_parameter_store().unwrap();
    setup.init_cams(&mut store).unwrap();
    store.camera_mut(1).copy_from_slice(&[1.0, -2.0, 0.5, 0.0, 0.0, 0.01]);

    let paths = setup.write_all_outputs(&store).unwrap();
    assert_eq!(paths[1], dir.path().join("run-img1.adjust"));

    let written = CameraAdjustment::read_from_adjust_file(&paths[1]).unwrap();
    let expected = CameraAdjustment::from_array(store.camera(1));
    assert_vec3_near(&written.translation(), &expected.translation(), 1e-12);
    assert!(
        (written.rotation().to_rotation_matrix().matrix()
            - expected.rotation().to_rotation_matrix().matrix())
        .norm()
            < 1e-12
    );
}

#[test]
fn test_shared_intrinsics_initialized_by_first_camera() {
    let inputs = vec![
        InputCamera::new("a.tif", "a.tsai", CameraModel::Pinhole(nadir_pinhole(0.0, 1000.0))),
        InputCamera::new("b.tif", "b.tsai", CameraModel::Pinhole(nadir_pinhole(50.0, 1200.0))),
    ];

    let shared = AdjustOptions::default().with_solve_intrinsics(true);
    let setup = BundleSetup::new(inputs.clone(), shared).unwrap();
    let mut store = setup.build_parameter_store().unwrap();
    let outcome = setup.init_cams(&mut store).unwrap();
    assert_eq!(store.num_intrinsic_groups(IntrinsicCategory::FocalLength), 1);
    let focal = |camera: &CameraModel| camera.as_pinhole().unwrap().focal_length().x;
    assert_eq!(focal(&outcome.cameras[1]), 1000.0);

    let independent = AdjustOptions::default()
        .with_solve_intrinsics(true)
        .with_intrinsics("", "", true)
        .unwrap();
    let setup = BundleSetup::new(inputs, independent).unwrap();
    let mut store = setup.build_parameter_store().unwrap();
    let outcome = setup.init_cams(&mut store).unwrap();
    assert_eq!(store.num_intrinsic_groups(IntrinsicCategory::FocalLength), 2);
    assert_eq!(focal(&outcome.cameras[1]), 1200.0);
}

#[test]
fn test_solve_intrinsics_without_lists_floats_everything() {
    let options = AdjustOptions::default().with_solve_intrinsics(true);
    let setup = BundleSetup::new(pinhole_inputs(2), options).unwrap();
    let mut store = setup.build_parameter_store().unwrap();
    setup.init_cams(&mut store).unwrap();

    let constant = store.constant_offsets();
    for category in IntrinsicCategory::ALL {
        assert!(!store.is_intrinsic_constant(category), "{category} is constant");
        let (start, _) = store.intrinsic_range(0, category);
        assert!(!constant.contains(&start), "{category} offset is constant");
    }
}

#[test]
fn test_second_init_reloads_shared_intrinsics() {
    let options = AdjustOptions::default().with_solve_intrinsics(true);
    let setup = BundleSetup::new(pinhole_inputs(2), options).unwrap();
    let mut store = setup.build_parameter_store().unwrap();
    setup.init_cams(&mut store).unwrap();
    assert_eq!(store.focus(0), 1000.0);

    store.intrinsic_mut(0, IntrinsicCategory::FocalLength)[0] = 1234.0;
    store.camera_mut(1)[0] = 5.0;
    let outcome = setup.init_cams(&mut store).unwrap();

    assert_eq!(store.focus(0), 1000.0);
    assert!(store.camera(1)[0].abs() < 1e-9);
    assert_same_projections(&outcome.cameras[1], &setup.inputs()[1].model, 1e-9);
}

#[test]
fn test_fixed_cameras_and_limits() {
    let options = AdjustOptions::default()
        .with_solve_intrinsics(true)
        .with_intrinsics_limits("0.9 1.1")
        .unwrap()
        .with_fixed_camera_indices("0")
        .unwrap();
    let setup = BundleSetup::new(pinhole_inputs(2), options).unwrap();
    let mut store = setup.build_parameter_store().unwrap();
    setup.init_cams(&mut store).unwrap();

    let constant = store.constant_offsets();
    assert!(constant.contains(&store.camera_offset(0)));
    assert!(!constant.contains(&store.camera_offset(1)));

    let (focus_start, _) = store.intrinsic_range(0, IntrinsicCategory::FocalLength);
    let (lower, upper) = store.intrinsic_bounds()[&focus_start];
    assert!((lower - 900.0).abs() < 1e-9);
    assert!((upper - 1100.0).abs() < 1e-9);
}

#[test]
fn test_initial_transform_from_file() {
    let dir = TempDir::new().unwrap();
    let path: PathBuf = dir.path().join("transform.txt");
    similarity(1.2).write_to_file(&path).unwrap();

    let options = AdjustOptions::default()
        .with_stereo_session(StereoSession::Csm)
        .with_initial_transform_file(&path)
        .unwrap();
    let setup = BundleSetup::new(generic_inputs(1), options).unwrap();
    let mut store = setup.build_parameter_store().unwrap();
    assert!(setup.init_cams(&mut store).is_err());
}
