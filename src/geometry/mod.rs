//! Geometric helpers: similarity transforms and geodetic datums.

pub mod datum;
pub mod similarity;

pub use datum::Datum;
pub use similarity::{SCALE_TOLERANCE, SimilarityTransform};
