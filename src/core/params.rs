//! Flat parameter storage handed to the external optimizer.
//!
//! All values live in one boxed slice that is allocated once in the
//! constructor and never resized, so offsets handed to the optimizer stay
//! valid for the whole run. The layout is:
//!
//! ```text
//! [ cam 0 extrinsics (6) | cam 1 extrinsics (6) | ... |
//!   focus groups (1 each) | center groups (2 each) | other-intrinsics groups (n each) ]
//! ```
//!
//! Extrinsic blocks are `[tx, ty, tz, rx, ry, rz]`: a translation followed by an
//! axis-angle rotation: the pose delta of the working camera on top of its
//! original model, so all zeros means "original pose" for every camera family.
//!
//! Intrinsic groups follow the sharing policy: a shared category has one group
//! used by every camera, an independent one has a group per camera.

use crate::core::intrinsics::{IntrinsicCategory, IntrinsicsOptions};
use crate::error::{AdjustError, AdjustResult};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Number of values in one extrinsic block.
pub const CAMERA_PARAMS_N: usize = 6;

/// Number of values in a focal-length block.
pub const FOCUS_PARAMS_N: usize = 1;

/// Number of values in an optical-center block.
pub const CENTER_PARAMS_N: usize = 2;

#[derive(Debug, Clone)]
struct CategoryLayout {
    /// Start offset of every group
    offsets: Vec<usize>,
    /// Block length of every group
    lens: Vec<usize>,
    /// Whether the group has received its loaded values
    initialized: Vec<bool>,
    shared: bool,
}

impl CategoryLayout {
    fn group_of(&self, camera: usize) -> usize {
        if self.shared { 0 } else { camera }
    }
}

/// Parameter store for all cameras of one bundle adjustment run.
#[derive(Debug, Clone)]
pub struct ParameterStore {
    num_cameras: usize,
    solve_intrinsics: bool,
    options: IntrinsicsOptions,
    data: Box<[f64]>,
    /// Values loaded from the input models, used by `clear_cameras`
    loaded: Box<[f64]>,
    focus: Option<CategoryLayout>,
    center: Option<CategoryLayout>,
    other: Option<CategoryLayout>,
    fixed_cameras: BTreeSet<usize>,
    intrinsics_limits: Vec<(f64, f64)>,
}

impl ParameterStore {
    /// Store holding only extrinsic adjustments, as used for Generic cameras.
    pub fn new(num_cameras: usize) -> Self {
        let len = num_cameras * CAMERA_PARAMS_N;
        Self {
            num_cameras,
            solve_intrinsics: false,
            options: IntrinsicsOptions::default(),
            data: vec![0.0; len].into_boxed_slice(),
            loaded: vec![0.0; len].into_boxed_slice(),
            focus: None,
            center: None,
            other: None,
            fixed_cameras: BTreeSet::new(),
            intrinsics_limits: Vec::new(),
        }
    }

    /// Store holding extrinsics and intrinsic groups, as used for Pinhole and
    /// OpticalBar cameras.
    ///
    /// `other_sizes[i]` is the number of "other intrinsics" values of camera `i`
    /// (distortion coefficients, or the optical bar scan parameters).
    ///
    /// Sharing only collapses groups while intrinsics are being solved for;
    /// otherwise every camera keeps its own constant block. A shared
    /// other-intrinsics category requires every camera to have the same count.
    pub fn with_intrinsics(
        solve_intrinsics: bool,
        options: IntrinsicsOptions,
        other_sizes: &[usize],
    ) -> AdjustResult<Self> {
        let num_cameras = other_sizes.len();
        let shared = |category| solve_intrinsics && options.is_shared(category);

        if shared(IntrinsicCategory::OtherIntrinsics)
            && other_sizes.windows(2).any(|w| w[0] != w[1])
        {
            return Err(AdjustError::InvalidInput(
                "Cannot share other_intrinsics between cameras with different \
                 distortion models."
                    .to_string(),
            ));
        }

        let mut next = num_cameras * CAMERA_PARAMS_N;
        let mut build = |is_shared: bool, len_of: &dyn Fn(usize) -> usize| {
            let groups = if is_shared { 1.min(num_cameras) } else { num_cameras };
            let mut offsets = Vec::with_capacity(groups);
            let mut lens = Vec::with_capacity(groups);
            for group in 0..groups {
                let len = len_of(group);
                offsets.push(next);
                lens.push(len);
                next += len;
            }
            CategoryLayout {
                offsets,
                lens,
                initialized: vec![false; groups],
                shared: is_shared,
            }
        };

        let focus = build(shared(IntrinsicCategory::FocalLength), &|_| FOCUS_PARAMS_N);
        let center = build(shared(IntrinsicCategory::OpticalCenter), &|_| {
            CENTER_PARAMS_N
        });
        let other = build(shared(IntrinsicCategory::OtherIntrinsics), &|group| {
            other_sizes[group]
        });

        debug!(
            "Parameter store: {} cameras, {} focus groups, {} center groups, {} other groups, {} values",
            num_cameras,
            focus.offsets.len(),
            center.offsets.len(),
            other.offsets.len(),
            next
        );

        Ok(Self {
            num_cameras,
            solve_intrinsics,
            options,
            data: vec![0.0; next].into_boxed_slice(),
            loaded: vec![0.0; next].into_boxed_slice(),
            focus: Some(focus),
            center: Some(center),
            other: Some(other),
            fixed_cameras: BTreeSet::new(),
            intrinsics_limits: Vec::new(),
        })
    }

    /// Number of cameras tracked by this store.
    pub fn num_cameras(&self) -> usize {
        self.num_cameras
    }

    pub fn solve_intrinsics(&self) -> bool {
        self.solve_intrinsics
    }

    pub fn intrinsics_options(&self) -> &IntrinsicsOptions {
        &self.options
    }

    pub fn has_intrinsics(&self) -> bool {
        self.focus.is_some()
    }

    fn check_camera(&self, camera: usize) {
        assert!(
            camera < self.num_cameras,
            "camera index {camera} out of range ({} cameras)",
            self.num_cameras
        );
    }

    /// Offset of camera `camera`'s extrinsic block in the flat buffer.
    pub fn camera_offset(&self, camera: usize) -> usize {
        self.check_camera(camera);
        camera * CAMERA_PARAMS_N
    }

    /// Extrinsic block of a camera.
    ///
    /// # Panics
    /// If `camera >= num_cameras()`.
    pub fn camera(&self, camera: usize) -> &[f64] {
        let start = self.camera_offset(camera);
        &self.data[start..start + CAMERA_PARAMS_N]
    }

    /// Mutable extrinsic block of a camera.
    ///
    /// # Panics
    /// If `camera >= num_cameras()`.
    pub fn camera_mut(&mut self, camera: usize) -> &mut [f64] {
        let start = self.camera_offset(camera);
        &mut self.data[start..start + CAMERA_PARAMS_N]
    }

    fn layout(&self, category: IntrinsicCategory) -> Option<&CategoryLayout> {
        match category {
            IntrinsicCategory::FocalLength => self.focus.as_ref(),
            IntrinsicCategory::OpticalCenter => self.center.as_ref(),
            IntrinsicCategory::OtherIntrinsics => self.other.as_ref(),
        }
    }

    fn layout_mut(&mut self, category: IntrinsicCategory) -> Option<&mut CategoryLayout> {
        match category {
            IntrinsicCategory::FocalLength => self.focus.as_mut(),
            IntrinsicCategory::OpticalCenter => self.center.as_mut(),
            IntrinsicCategory::OtherIntrinsics => self.other.as_mut(),
        }
    }

    fn expect_layout(&self, category: IntrinsicCategory) -> &CategoryLayout {
        match self.layout(category) {
            Some(layout) => layout,
            None => panic!("parameter store was built without intrinsics ({category})"),
        }
    }

    /// Number of parameter groups for a category: 1 when shared, one per camera
    /// otherwise, 0 when the store carries no intrinsics.
    pub fn num_intrinsic_groups(&self, category: IntrinsicCategory) -> usize {
        self.layout(category).map_or(0, |layout| layout.offsets.len())
    }

    /// Group used by `camera` for `category`.
    pub fn intrinsic_group(&self, camera: usize, category: IntrinsicCategory) -> usize {
        self.check_camera(camera);
        self.expect_layout(category).group_of(camera)
    }

    /// Offset and length of the block `camera` uses for `category`.
    pub fn intrinsic_range(&self, camera: usize, category: IntrinsicCategory) -> (usize, usize) {
        let group = self.intrinsic_group(camera, category);
        let layout = self.expect_layout(category);
        (layout.offsets[group], layout.lens[group])
    }

    pub fn intrinsic(&self, camera: usize, category: IntrinsicCategory) -> &[f64] {
        let (start, len) = self.intrinsic_range(camera, category);
        &self.data[start..start + len]
    }

    pub fn intrinsic_mut(&mut self, camera: usize, category: IntrinsicCategory) -> &mut [f64] {
        let (start, len) = self.intrinsic_range(camera, category);
        &mut self.data[start..start + len]
    }

    pub fn focus(&self, camera: usize) -> f64 {
        self.intrinsic(camera, IntrinsicCategory::FocalLength)[0]
    }

    pub fn center(&self, camera: usize) -> [f64; 2] {
        let values = self.intrinsic(camera, IntrinsicCategory::OpticalCenter);
        [values[0], values[1]]
    }

    pub fn other_intrinsics(&self, camera: usize) -> &[f64] {
        self.intrinsic(camera, IntrinsicCategory::OtherIntrinsics)
    }

    /// Write the loaded intrinsic values of `camera` into its block.
    ///
    /// A shared group is initialized by the first camera that reaches it;
    /// later cameras skip it and `false` is returned.
    pub fn init_intrinsic(
        &mut self,
        camera: usize,
        category: IntrinsicCategory,
        values: &[f64],
    ) -> AdjustResult<bool> {
        let (start, len) = self.intrinsic_range(camera, category);
        if values.len() != len {
            return Err(AdjustError::InvalidInput(format!(
                "Camera {camera}: expected {len} {category} values, got {}",
                values.len()
            )));
        }

        let group = self.intrinsic_group(camera, category);
        let layout = match self.layout_mut(category) {
            Some(layout) => layout,
            None => unreachable!("intrinsic_range checked the layout"),
        };
        if layout.initialized[group] {
            debug!("Camera {camera}: {category} group {group} already initialized, skipping");
            return Ok(false);
        }
        layout.initialized[group] = true;

        self.data[start..start + len].copy_from_slice(values);
        self.loaded[start..start + len].copy_from_slice(values);
        Ok(true)
    }

    /// Forget which intrinsic groups have been initialized, so the next
    /// round of `init_intrinsic` calls reloads every group.
    pub fn reset_intrinsic_groups(&mut self) {
        for layout in [&mut self.focus, &mut self.center, &mut self.other]
            .into_iter()
            .flatten()
        {
            layout.initialized.fill(false);
        }
    }

    /// Reset every camera to the identity adjustment.
    ///
    /// When intrinsics are being solved for, intrinsic blocks go back to the
    /// values loaded from the input models; otherwise they are left alone.
    pub fn clear_cameras(&mut self) {
        let extrinsics_len = self.num_cameras * CAMERA_PARAMS_N;
        self.data[..extrinsics_len].fill(0.0);
        if self.solve_intrinsics {
            self.data[extrinsics_len..].copy_from_slice(&self.loaded[extrinsics_len..]);
        }
    }

    /// Whether a category is held constant by the optimizer.
    pub fn is_intrinsic_constant(&self, category: IntrinsicCategory) -> bool {
        !self.solve_intrinsics || self.options.is_constant(category)
    }

    /// Mark a camera's extrinsics as held constant.
    pub fn fix_camera(&mut self, camera: usize) {
        self.check_camera(camera);
        self.fixed_cameras.insert(camera);
    }

    pub fn is_camera_fixed(&self, camera: usize) -> bool {
        self.fixed_cameras.contains(&camera)
    }

    pub fn fixed_cameras(&self) -> &BTreeSet<usize> {
        &self.fixed_cameras
    }

    /// Offsets the optimizer must hold constant: fixed cameras' extrinsics plus
    /// every block of a constant intrinsic category.
    pub fn constant_offsets(&self) -> BTreeSet<usize> {
        let mut offsets: BTreeSet<usize> = self
            .fixed_cameras
            .iter()
            .flat_map(|&camera| {
                let start = camera * CAMERA_PARAMS_N;
                start..start + CAMERA_PARAMS_N
            })
            .collect();
        for category in IntrinsicCategory::ALL {
            if !self.is_intrinsic_constant(category) {
                continue;
            }
            if let Some(layout) = self.layout(category) {
                for (&start, &len) in layout.offsets.iter().zip(&layout.lens) {
                    offsets.extend(start..start + len);
                }
            }
        }
        offsets
    }

    /// Install min/max ratio pairs for the intrinsics.
    ///
    /// Pair `k` applies to the `k`-th intrinsic value of every camera, in the
    /// order focal length, optical center x, optical center y, then the other
    /// intrinsics. Extra pairs are ignored.
    pub fn set_intrinsics_limits(&mut self, limits: Vec<(f64, f64)>) {
        self.intrinsics_limits = limits;
    }

    pub fn intrinsics_limits(&self) -> &[(f64, f64)] {
        &self.intrinsics_limits
    }

    /// Absolute bounds per buffer offset, derived from the ratio limits and
    /// the loaded intrinsic values.
    pub fn intrinsic_bounds(&self) -> BTreeMap<usize, (f64, f64)> {
        let mut bounds = BTreeMap::new();
        if self.intrinsics_limits.is_empty() {
            return bounds;
        }
        let base_index = |category| match category {
            IntrinsicCategory::FocalLength => 0,
            IntrinsicCategory::OpticalCenter => FOCUS_PARAMS_N,
            IntrinsicCategory::OtherIntrinsics => FOCUS_PARAMS_N + CENTER_PARAMS_N,
        };
        for category in IntrinsicCategory::ALL {
            let Some(layout) = self.layout(category) else {
                continue;
            };
            for (&start, &len) in layout.offsets.iter().zip(&layout.lens) {
                for k in 0..len {
                    let Some(&(min_ratio, max_ratio)) =
                        self.intrinsics_limits.get(base_index(category) + k)
                    else {
                        break;
                    };
                    let loaded = self.loaded[start + k];
                    let (a, b) = (loaded * min_ratio, loaded * max_ratio);
                    bounds.insert(start + k, (a.min(b), a.max(b)));
                }
            }
        }
        bounds
    }

    /// Clamp the intrinsic values into their bounds.
    pub fn clamp_intrinsics(&mut self) {
        for (offset, (lower, upper)) in self.intrinsic_bounds() {
            self.data[offset] = self.data[offset].max(lower).min(upper);
        }
    }

    /// Whole parameter buffer.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Whole parameter buffer for the optimizer. The length never changes.
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
