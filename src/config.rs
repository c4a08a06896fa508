//! Run configuration for the bundle adjustment setup.
//!
//! [`AdjustOptions`] is an explicit value passed to the setup and overlap
//! code. It is built with `Default` plus `with_*` methods:
//!
//! ```
//! use apex_adjust::config::{AdjustOptions, StereoSession};
//!
//! let options = AdjustOptions::default()
//!     .with_stereo_session(StereoSession::Pinhole)
//!     .with_solve_intrinsics(true)
//!     .with_intrinsics("focal_length optical_center", "", false)
//!     .unwrap()
//!     .with_out_prefix("ba/run");
//! assert!(options.solve_intrinsics);
//! ```

use crate::core::intrinsics::IntrinsicsOptions;
use crate::core::loss_functions::{CostFunction, Loss, select_loss};
use crate::error::{AdjustError, AdjustResult};
use crate::geometry::{Datum, SimilarityTransform};
use crate::invalid_input;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Session type under which the cameras were loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StereoSession {
    #[default]
    Pinhole,
    NadirPinhole,
    OpticalBar,
    Csm,
    Dg,
    Rpc,
    Isis,
    Spot5,
    PeruSat,
    Pleiades,
    Aster,
}

impl StereoSession {
    pub fn as_str(&self) -> &'static str {
        match self {
            StereoSession::Pinhole => "pinhole",
            StereoSession::NadirPinhole => "nadirpinhole",
            StereoSession::OpticalBar => "opticalbar",
            StereoSession::Csm => "csm",
            StereoSession::Dg => "dg",
            StereoSession::Rpc => "rpc",
            StereoSession::Isis => "isis",
            StereoSession::Spot5 => "spot5",
            StereoSession::PeruSat => "perusat",
            StereoSession::Pleiades => "pleiades",
            StereoSession::Aster => "aster",
        }
    }

    /// Whether cameras of this session can absorb a scaled transform.
    ///
    /// CSM models only accept rigid transforms.
    pub fn supports_scaled_transform(&self) -> bool {
        !matches!(self, StereoSession::Csm)
    }
}

impl FromStr for StereoSession {
    type Err = AdjustError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pinhole" => Ok(StereoSession::Pinhole),
            "nadirpinhole" => Ok(StereoSession::NadirPinhole),
            "opticalbar" => Ok(StereoSession::OpticalBar),
            "csm" => Ok(StereoSession::Csm),
            "dg" => Ok(StereoSession::Dg),
            "rpc" => Ok(StereoSession::Rpc),
            "isis" => Ok(StereoSession::Isis),
            "spot5" => Ok(StereoSession::Spot5),
            "perusat" => Ok(StereoSession::PeruSat),
            "pleiades" => Ok(StereoSession::Pleiades),
            "aster" => Ok(StereoSession::Aster),
            other => Err(invalid_input!("Unknown stereo session: {}.", other)),
        }
    }
}

impl fmt::Display for StereoSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options for one bundle adjustment run.
#[derive(Debug, Clone)]
pub struct AdjustOptions {
    pub cost_function: CostFunction,
    /// Threshold used when a loss is requested with a zero threshold
    pub robust_threshold: f64,
    pub solve_intrinsics: bool,
    pub intrinsics_options: IntrinsicsOptions,
    /// Min/max ratio pairs, see [`parse_intrinsics_limits`]
    pub intrinsics_limits: Vec<(f64, f64)>,
    /// Degrees added around the first footprint of each overlap test
    pub overlap_buffer: f64,
    pub stereo_session: StereoSession,
    /// Prefix of prior `.adjust` files, if any
    pub input_prefix: Option<PathBuf>,
    pub out_prefix: PathBuf,
    pub datum: Option<Datum>,
    pub initial_transform: Option<SimilarityTransform>,
    pub fixed_camera_indices: BTreeSet<usize>,
}

impl Default for AdjustOptions {
    fn default() -> Self {
        Self {
            cost_function: CostFunction::default(),
            robust_threshold: 0.5,
            solve_intrinsics: false,
            intrinsics_options: IntrinsicsOptions::default(),
            intrinsics_limits: Vec::new(),
            overlap_buffer: 0.0,
            stereo_session: StereoSession::default(),
            input_prefix: None,
            out_prefix: PathBuf::from("run"),
            datum: None,
            initial_transform: None,
            fixed_camera_indices: BTreeSet::new(),
        }
    }
}

impl AdjustOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cost_function(mut self, cost_function: CostFunction) -> Self {
        self.cost_function = cost_function;
        self
    }

    pub fn with_robust_threshold(mut self, robust_threshold: f64) -> Self {
        self.robust_threshold = robust_threshold;
        self
    }

    /// Turn intrinsics solving on or off. Call before [`Self::with_intrinsics`].
    ///
    /// Resets the policy to the one an empty float list gives: every category
    /// floats when solving, and every category is shared.
    pub fn with_solve_intrinsics(mut self, solve_intrinsics: bool) -> Self {
        self.solve_intrinsics = solve_intrinsics;
        self.intrinsics_options = IntrinsicsOptions::new(solve_intrinsics);
        self
    }

    /// Set which intrinsic categories float and which are shared.
    pub fn with_intrinsics(
        mut self,
        float_list: &str,
        share_list: &str,
        share_is_specified: bool,
    ) -> AdjustResult<Self> {
        self.intrinsics_options = IntrinsicsOptions::configure(
            self.solve_intrinsics,
            float_list,
            share_list,
            share_is_specified,
        )?;
        Ok(self)
    }

    pub fn with_intrinsics_limits(mut self, limits: &str) -> AdjustResult<Self> {
        self.intrinsics_limits = parse_intrinsics_limits(limits)?;
        Ok(self)
    }

    pub fn with_overlap_buffer(mut self, overlap_buffer: f64) -> Self {
        self.overlap_buffer = overlap_buffer;
        self
    }

    pub fn with_stereo_session(mut self, stereo_session: StereoSession) -> Self {
        self.stereo_session = stereo_session;
        self
    }

    pub fn with_input_prefix(mut self, input_prefix: impl Into<PathBuf>) -> Self {
        self.input_prefix = Some(input_prefix.into());
        self
    }

    pub fn with_out_prefix(mut self, out_prefix: impl Into<PathBuf>) -> Self {
        self.out_prefix = out_prefix.into();
        self
    }

    pub fn with_datum(mut self, datum: Datum) -> Self {
        self.datum = Some(datum);
        self
    }

    pub fn with_initial_transform(mut self, transform: SimilarityTransform) -> Self {
        self.initial_transform = Some(transform);
        self
    }

    /// Read the initial transform from a 4x4 matrix file.
    pub fn with_initial_transform_file<P: AsRef<Path>>(self, path: P) -> AdjustResult<Self> {
        let transform = SimilarityTransform::read_from_file(path)?;
        Ok(self.with_initial_transform(transform))
    }

    pub fn with_fixed_camera_indices(mut self, indices: &str) -> AdjustResult<Self> {
        self.fixed_camera_indices = parse_fixed_camera_indices(indices)?;
        Ok(self)
    }

    /// Loss for one residual family; a zero threshold uses the robust threshold.
    pub fn loss(&self, threshold: f64) -> AdjustResult<Option<Box<dyn Loss + Send>>> {
        select_loss(self.cost_function.as_str(), threshold, self.robust_threshold)
    }
}

fn split_tokens(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|token| !token.is_empty())
}

/// Parse `"min1 max1 min2 max2 ..."` into min/max pairs.
///
/// Commas may separate the values. An odd count of values, a value that is
/// not a number, or a pair with `min > max` is an error.
pub fn parse_intrinsics_limits(text: &str) -> AdjustResult<Vec<(f64, f64)>> {
    let values = split_tokens(text)
        .map(|token| {
            token.parse::<f64>().map_err(|_| {
                AdjustError::InvalidInput(format!("Invalid value in intrinsics limits: {token}."))
            })
        })
        .collect::<AdjustResult<Vec<f64>>>()?;

    if values.len() % 2 != 0 {
        return Err(AdjustError::InvalidInput(
            "Intrinsics limits must be provided in min/max pairs.".to_string(),
        ));
    }

    values
        .chunks_exact(2)
        .map(|pair| {
            let (min, max) = (pair[0], pair[1]);
            if min > max {
                Err(AdjustError::InvalidInput(format!(
                    "Intrinsics limit minimum {min} is greater than maximum {max}."
                )))
            } else {
                Ok((min, max))
            }
        })
        .collect()
}

/// Parse a list of non-negative camera indices.
pub fn parse_fixed_camera_indices(text: &str) -> AdjustResult<BTreeSet<usize>> {
    split_tokens(text)
        .map(|token| {
            token
                .parse::<usize>()
                .map_err(|_| invalid_input!("Invalid camera index: {}.", token))
        })
        .collect()
}
