//! Bundle adjustment parameter management and camera model transformation.
//!
//! - [`crate::core`]: parameter store, intrinsics policy, robust losses
//! - [`camera`]: generic, pinhole and optical bar camera models
//! - [`setup`]: packing cameras into the store and writing them back out
//! - [`overlap`]: candidate image pairs from footprint metadata
//! - [`config`], [`geometry`], [`error`], [`logger`]: supporting pieces

pub mod camera;
pub mod config;
pub mod core;
pub mod error;
pub mod geometry;
pub mod logger;
pub mod overlap;
pub mod setup;

pub use camera::{CameraAdjustment, CameraFamily, CameraModel, SensorModel};
pub use config::{AdjustOptions, StereoSession};
pub use crate::core::params::ParameterStore;
pub use error::{AdjustError, AdjustResult};
pub use geometry::{Datum, SimilarityTransform};
pub use logger::{init_logger, init_logger_with_level};
pub use overlap::{OverlapList, auto_build_overlap_list};
pub use setup::{BundleSetup, InputCamera};
