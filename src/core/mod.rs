//! Optimization-facing building blocks
//!
//! - Intrinsics policy (which categories float, which are shared)
//! - The flat parameter store handed to the optimizer
//! - Robust loss functions selected by name

pub mod intrinsics;
pub mod loss_functions;
pub mod params;
