//! Camera setup for bundle adjustment.
//!
//! [`BundleSetup`] takes the loaded cameras of one run and
//!
//! 1. detects their family (mixing families is an error),
//! 2. builds the [`ParameterStore`] with the right layout,
//! 3. applies prior adjustments and the initial transform (`init_cams`),
//! 4. turns store values back into concrete cameras (`materialize`),
//! 5. writes the adjusted cameras (`write_all_outputs`).
//!
//! Original models are shared behind `Arc` and never modified; every
//! transformation happens on deep copies or on the store.

pub mod pack;

pub use pack::{
    pack_optical_bar_to_arrays, pack_pinhole_to_arrays, transformed_optical_bar_camera,
    transformed_pinhole_camera,
};

use crate::camera::adjustment::with_extension;
use crate::camera::{
    AdjustedCamera, CameraAdjustment, CameraFamily, CameraModel, SensorModel,
    bundle_adjust_base_name, bundle_adjust_file_name,
};
use crate::config::{AdjustOptions, StereoSession};
use crate::core::params::ParameterStore;
use crate::error::{AdjustError, AdjustResult};
use crate::geometry::SimilarityTransform;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One input image and the camera that sees it.
#[derive(Debug, Clone)]
pub struct InputCamera {
    pub image_file: PathBuf,
    pub camera_file: PathBuf,
    pub model: Arc<CameraModel>,
}

impl InputCamera {
    pub fn new(
        image_file: impl Into<PathBuf>,
        camera_file: impl Into<PathBuf>,
        model: CameraModel,
    ) -> Self {
        Self {
            image_file: image_file.into(),
            camera_file: camera_file.into(),
            model: Arc::new(model),
        }
    }
}

/// Result of initializing the cameras.
#[derive(Debug, Clone)]
pub struct InitOutcome {
    /// True when a prior adjustment or an initial transform was applied
    pub cameras_changed: bool,
    /// Working cameras with the store's values
    pub cameras: Vec<CameraModel>,
}

/// Family shared by all cameras. Mixing families is an error.
pub fn detect_camera_family(inputs: &[InputCamera]) -> AdjustResult<CameraFamily> {
    let Some(first) = inputs.first() else {
        return Err(AdjustError::InvalidInput(
            "No input cameras were provided.".to_string(),
        ));
    };
    let family = first.model.family();
    if let Some(other) = inputs.iter().find(|input| input.model.family() != family) {
        return Err(AdjustError::InvalidInput(format!(
            "Cannot mix {family} and {} cameras in one run ({} and {}).",
            other.model.family(),
            first.camera_file.display(),
            other.camera_file.display()
        )));
    }
    Ok(family)
}

/// Reject scaled transforms for sessions whose cameras cannot absorb a scale.
pub fn validate_transform_scale(
    transform: &SimilarityTransform,
    session: StereoSession,
) -> AdjustResult<()> {
    if !session.supports_scaled_transform() && !transform.is_rigid() {
        return Err(AdjustError::InvalidInput(format!(
            "Cannot apply a transform with scale {:.8} to {session} cameras. \
             Only rigid transforms are supported for this session.",
            transform.scale()
        )));
    }
    Ok(())
}

/// Apply `transform` to every camera, after checking the scale for all of them.
///
/// On error no camera has been modified.
pub fn apply_transform_to_cameras(
    cameras: &mut [CameraModel],
    transform: &SimilarityTransform,
    session: StereoSession,
) -> AdjustResult<()> {
    validate_transform_scale(transform, session)?;
    for camera in cameras.iter_mut() {
        camera.apply_transform(transform);
    }
    Ok(())
}

/// Cameras, options and derived layout of one bundle adjustment run.
#[derive(Debug, Clone)]
pub struct BundleSetup {
    inputs: Vec<InputCamera>,
    options: AdjustOptions,
    family: CameraFamily,
}

impl BundleSetup {
    pub fn new(inputs: Vec<InputCamera>, options: AdjustOptions) -> AdjustResult<Self> {
        let family = detect_camera_family(&inputs)?;
        if let Some(&index) = options
            .fixed_camera_indices
            .iter()
            .find(|&&index| index >= inputs.len())
        {
            return Err(AdjustError::InvalidInput(format!(
                "Fixed camera index {index} is out of range, there are {} cameras.",
                inputs.len()
            )));
        }
        if family == CameraFamily::Generic && options.solve_intrinsics {
            return Err(AdjustError::InvalidInput(
                "Solving for intrinsics is only supported with pinhole and optical bar cameras."
                    .to_string(),
            ));
        }
        info!("Bundle adjustment setup: {} {} cameras", inputs.len(), family);
        Ok(Self {
            inputs,
            options,
            family,
        })
    }

    pub fn family(&self) -> CameraFamily {
        self.family
    }

    pub fn inputs(&self) -> &[InputCamera] {
        &self.inputs
    }

    pub fn options(&self) -> &AdjustOptions {
        &self.options
    }

    pub fn num_cameras(&self) -> usize {
        self.inputs.len()
    }

    fn other_intrinsics_size(camera: &CameraModel) -> usize {
        match camera {
            CameraModel::Generic(_) => 0,
            CameraModel::Pinhole(pinhole) => pinhole.distortion().num_params(),
            CameraModel::OpticalBar(bar) => bar.other_intrinsics().len(),
        }
    }

    /// Store laid out for this run's cameras, with fixed cameras and
    /// intrinsics limits installed.
    pub fn build_parameter_store(&self) -> AdjustResult<ParameterStore> {
        let mut store = match self.family {
            CameraFamily::Generic => ParameterStore::new(self.num_cameras()),
            CameraFamily::Pinhole | CameraFamily::OpticalBar => {
                let other_sizes: Vec<usize> = self
                    .inputs
                    .iter()
                    .map(|input| Self::other_intrinsics_size(&input.model))
                    .collect();
                ParameterStore::with_intrinsics(
                    self.options.solve_intrinsics,
                    self.options.intrinsics_options,
                    &other_sizes,
                )?
            }
        };
        for &index in &self.options.fixed_camera_indices {
            warn!(
                "Camera {} ({}) will be held fixed",
                index,
                self.inputs[index].image_file.display()
            );
            store.fix_camera(index);
        }
        store.set_intrinsics_limits(self.options.intrinsics_limits.clone());
        Ok(store)
    }

    fn check_store(&self, store: &ParameterStore) -> AdjustResult<()> {
        if store.num_cameras() != self.num_cameras() {
            return Err(AdjustError::InvalidInput(format!(
                "Parameter store holds {} cameras, expecting {}.",
                store.num_cameras(),
                self.num_cameras()
            )));
        }
        Ok(())
    }

    fn validate_initial_transform(&self) -> AdjustResult<Option<&SimilarityTransform>> {
        match &self.options.initial_transform {
            Some(transform) => {
                validate_transform_scale(transform, self.options.stereo_session)?;
                Ok(Some(transform))
            }
            None => Ok(None),
        }
    }

    /// Prior adjustments for every camera, read before anything is modified.
    fn read_input_adjustments(&self, prefix: &Path) -> AdjustResult<Vec<CameraAdjustment>> {
        self.inputs
            .iter()
            .map(|input| {
                let path = bundle_adjust_file_name(prefix, &input.image_file, &input.camera_file);
                info!("Reading input adjustment: {}", path.display());
                CameraAdjustment::read_from_adjust_file(&path)
            })
            .collect()
    }

    /// Apply prior adjustments and the initial transform, then pack the
    /// cameras into `store`.
    ///
    /// All checks (family, transform scale, adjustment files) happen before
    /// the store is touched.
    pub fn init_cams(&self, store: &mut ParameterStore) -> AdjustResult<InitOutcome> {
        match self.family {
            CameraFamily::Generic => self.init_cams_generic(store),
            CameraFamily::Pinhole => self.init_cams_pinhole(store),
            CameraFamily::OpticalBar => self.init_cams_optical_bar(store),
        }
    }

    fn generic_sensor(&self, icam: usize) -> AdjustResult<Arc<dyn SensorModel>> {
        let model = &self.inputs[icam].model;
        model
            .as_generic()
            .map(|camera| Arc::clone(camera.original()))
            .ok_or_else(|| AdjustError::CameraTypeMismatch {
                index: icam,
                expected: CameraFamily::Generic.as_str(),
                found: model.family().as_str(),
            })
    }

    /// Generic cameras: the store holds each camera's pose adjustment.
    pub fn init_cams_generic(&self, store: &mut ParameterStore) -> AdjustResult<InitOutcome> {
        self.check_store(store)?;
        let transform = self.validate_initial_transform()?;
        let sensors = (0..self.num_cameras())
            .map(|icam| self.generic_sensor(icam))
            .collect::<AdjustResult<Vec<_>>>()?;
        let input_adjustments = match &self.options.input_prefix {
            Some(prefix) => Some(self.read_input_adjustments(prefix)?),
            None => None,
        };

        store.clear_cameras();
        let mut cameras_changed = false;

        if let Some(adjustments) = input_adjustments {
            for (icam, adjustment) in adjustments.iter().enumerate() {
                adjustment.pack_to_array(store.camera_mut(icam));
            }
            cameras_changed = true;
        }

        if let Some(transform) = transform {
            info!("Applying initial transform: {}", transform);
            for (icam, sensor) in sensors.iter().enumerate() {
                let current = CameraAdjustment::from_array(store.camera(icam));
                let mut camera = AdjustedCamera::new(Arc::clone(sensor), current);
                camera.apply_transform(transform);
                camera.adjustment().pack_to_array(store.camera_mut(icam));
            }
            cameras_changed = true;
        }

        Ok(InitOutcome {
            cameras_changed,
            cameras: self.materialize(store)?,
        })
    }

    /// Pinhole cameras: deep copies get the prior adjustment and the initial
    /// transform, then are packed.
    pub fn init_cams_pinhole(&self, store: &mut ParameterStore) -> AdjustResult<InitOutcome> {
        self.check_store(store)?;
        let transform = self.validate_initial_transform()?;
        let originals = self
            .inputs
            .iter()
            .enumerate()
            .map(|(icam, input)| pack::expect_pinhole(icam, &input.model))
            .collect::<AdjustResult<Vec<_>>>()?;
        let input_adjustments = match &self.options.input_prefix {
            Some(prefix) => Some(self.read_input_adjustments(prefix)?),
            None => None,
        };

        let mut working: Vec<_> = originals.iter().map(|&camera| camera.clone()).collect();
        let mut cameras_changed = false;

        if let Some(adjustments) = &input_adjustments {
            for (camera, adjustment) in working.iter_mut().zip(adjustments) {
                camera.apply_transform(&adjustment.ecef_transform());
            }
            cameras_changed = true;
        }
        if let Some(transform) = transform {
            info!("Applying initial transform: {}", transform);
            for camera in working.iter_mut() {
                camera.apply_transform(transform);
            }
            cameras_changed = true;
        }

        store.reset_intrinsic_groups();
        for (icam, camera) in working.iter().enumerate() {
            debug!("Packing camera {icam}: {camera}");
            pack_pinhole_to_arrays(camera, &self.inputs[icam].model, icam, store)?;
        }

        Ok(InitOutcome {
            cameras_changed,
            cameras: self.materialize(store)?,
        })
    }

    /// Optical bar cameras: like pinhole, but prior adjustments are rejected.
    pub fn init_cams_optical_bar(&self, store: &mut ParameterStore) -> AdjustResult<InitOutcome> {
        if self.options.input_prefix.is_some() {
            return Err(AdjustError::InvalidInput(
                "Input adjustments are not supported with optical bar cameras. \
                 Apply them to the camera files first."
                    .to_string(),
            ));
        }
        self.check_store(store)?;
        let transform = self.validate_initial_transform()?;
        let originals = self
            .inputs
            .iter()
            .enumerate()
            .map(|(icam, input)| pack::expect_optical_bar(icam, &input.model))
            .collect::<AdjustResult<Vec<_>>>()?;

        let mut working: Vec<_> = originals.iter().map(|&camera| camera.clone()).collect();
        let mut cameras_changed = false;

        if let Some(transform) = transform {
            info!("Applying initial transform: {}", transform);
            for camera in working.iter_mut() {
                camera.apply_transform(transform);
            }
            cameras_changed = true;
        }

        store.reset_intrinsic_groups();
        for (icam, camera) in working.iter().enumerate() {
            debug!("Packing camera {icam}: {camera}");
            pack_optical_bar_to_arrays(camera, &self.inputs[icam].model, icam, store)?;
        }

        Ok(InitOutcome {
            cameras_changed,
            cameras: self.materialize(store)?,
        })
    }

    /// Camera `icam` with the store's current values. The original is unchanged.
    pub fn materialize_camera(
        &self,
        icam: usize,
        store: &ParameterStore,
    ) -> AdjustResult<CameraModel> {
        let original = &self.inputs[icam].model;
        match self.family {
            CameraFamily::Generic => Ok(CameraModel::Generic(AdjustedCamera::new(
                self.generic_sensor(icam)?,
                CameraAdjustment::from_array(store.camera(icam)),
            ))),
            CameraFamily::Pinhole => Ok(CameraModel::Pinhole(transformed_pinhole_camera(
                icam, store, original,
            )?)),
            CameraFamily::OpticalBar => Ok(CameraModel::OpticalBar(
                transformed_optical_bar_camera(icam, store, original)?,
            )),
        }
    }

    /// All cameras with the store's current values.
    pub fn materialize(&self, store: &ParameterStore) -> AdjustResult<Vec<CameraModel>> {
        self.check_store(store)?;
        (0..self.num_cameras())
            .map(|icam| self.materialize_camera(icam, store))
            .collect()
    }

    /// `<out-prefix>-<image>-<camera>.{adjust,tsai}`
    pub fn output_file_name(&self, icam: usize) -> PathBuf {
        let input = &self.inputs[icam];
        let base =
            bundle_adjust_base_name(&self.options.out_prefix, &input.image_file, &input.camera_file);
        with_extension(base, self.family.output_extension())
    }

    /// Write camera `icam` and return the path written.
    pub fn write_output_file(&self, icam: usize, store: &ParameterStore) -> AdjustResult<PathBuf> {
        let camera = self.materialize_camera(icam, store)?;
        let path = self.output_file_name(icam);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| AdjustError::io(parent, e))?;
        }
        info!("Writing: {}", path.display());
        camera.write(&path)?;

        if let Some(datum) = &self.options.datum {
            let llh = datum.cartesian_to_geodetic(&camera.camera_center());
            info!(
                "Camera center for {}: {:.8} {:.8} {:.3} (longitude, latitude, height above {})",
                self.inputs[icam].image_file.display(),
                llh.x,
                llh.y,
                llh.z,
                datum.name()
            );
        }
        Ok(path)
    }

    pub fn write_all_outputs(&self, store: &ParameterStore) -> AdjustResult<Vec<PathBuf>> {
        self.check_store(store)?;
        (0..self.num_cameras())
            .map(|icam| self.write_output_file(icam, store))
            .collect()
    }
}
