//! Robust loss functions handed to the external optimizer.
//!
//! Loss functions (also called robust cost functions or M-estimators) reduce the influence of
//! outlier measurements on the optimization result. In standard least squares, the cost is
//! the squared norm of residuals: `cost = Σ ||r_i||²`. With a robust loss function ρ(s), the
//! cost becomes: `cost = Σ ρ(||r_i||²)`.
//!
//! Each loss function implements the [`Loss`] trait, which evaluates:
//! - **ρ(s)**: The robust cost value
//! - **ρ'(s)**: First derivative (weight function)
//! - **ρ''(s)**: Second derivative (for the corrector)
//!
//! The input `s = ||r||²` is the squared norm of the residual vector.
//!
//! # Available Loss Functions
//!
//! - [`TrivialLoss`]: Unit weighting, ρ(s) = s
//! - [`HuberLoss`]: Quadratic for inliers, linear for outliers
//! - [`CauchyLoss`]: Heavier suppression of large residuals
//! - [`SoftLOneLoss`]: Smooth approximation of the absolute value
//!
//! The configured cost-function name is turned into one of these by [`select_loss`].
//! The name `l2` maps to no loss at all (`None`), meaning the optimizer uses plain
//! squared error.
//!
//! # Example
//!
//! ```
//! use apex_adjust::core::loss_functions::{select_loss, Loss};
//!
//! let huber = select_loss("huber", 2.0, 0.5)?.expect("huber is a robust loss");
//! assert_eq!(huber.threshold(), 2.0);
//!
//! assert!(select_loss("l2", 5.0, 0.5)?.is_none());
//! # Ok::<(), apex_adjust::AdjustError>(())
//! ```

use crate::error::{AdjustError, AdjustResult};
use std::fmt;
use std::str::FromStr;

/// Trait for robust loss functions used in nonlinear least squares optimization.
///
/// The `evaluate` method returns a 3-element array: `[ρ(s), ρ'(s), ρ''(s)]`
/// - `ρ(s)`: Robust cost value
/// - `ρ'(s)`: First derivative (weight function)
/// - `ρ''(s)`: Second derivative
///
/// Typically ρ(0) = 0, ρ'(0) = 1, ρ''(0) = 0, so every loss behaves like
/// standard least squares near zero.
pub trait Loss: Send + Sync + fmt::Debug {
    /// Evaluate the loss function and its first two derivatives at squared residual `s`.
    fn evaluate(&self, s: f64) -> [f64; 3];

    /// Scale parameter the loss was built with (1.0 for [`TrivialLoss`]).
    fn threshold(&self) -> f64;

    /// Name used in configuration files and on the command line.
    fn name(&self) -> &'static str;
}

fn check_scale(scale: f64) -> AdjustResult<()> {
    if scale <= 0.0 || !scale.is_finite() {
        return Err(AdjustError::InvalidInput(format!(
            "robust threshold needs to be larger than zero, got {scale}"
        )));
    }
    Ok(())
}

/// Unit weighting: ρ(s) = s.
///
/// Unlike selecting `l2` (which installs no loss at all), this installs an
/// explicit loss object whose weight is always one.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrivialLoss;

impl Loss for TrivialLoss {
    fn evaluate(&self, s: f64) -> [f64; 3] {
        [s, 1.0, 0.0]
    }

    fn threshold(&self) -> f64 {
        1.0
    }

    fn name(&self) -> &'static str {
        "trivial"
    }
}

/// Huber loss function for moderate outlier rejection.
///
/// # Mathematical Definition
///
/// ```text
/// ρ(s) = {  s                           if s ≤ δ²
///        {  2δ√s - δ²                  if s > δ²
///
/// ρ'(s) = {  1                          if s ≤ δ²
///         {  δ / √s                    if s > δ²
///
/// ρ''(s) = {  0                         if s ≤ δ²
///          {  -δ / (2s^(3/2))          if s > δ²
/// ```
///
/// where `δ` is the scale parameter (threshold), and `s = ||r||²` is the squared residual norm.
///
/// # Example
///
/// ```
/// use apex_adjust::core::loss_functions::{HuberLoss, Loss};
///
/// let huber = HuberLoss::new(1.345)?;
/// let [rho, rho_prime, rho_double_prime] = huber.evaluate(0.5);
/// assert_eq!(rho, 0.5);
/// assert_eq!(rho_prime, 1.0);
/// assert_eq!(rho_double_prime, 0.0);
/// # Ok::<(), apex_adjust::AdjustError>(())
/// ```
#[derive(Debug, Clone)]
pub struct HuberLoss {
    /// Scale parameter δ
    scale: f64,
    /// Cached value δ²
    scale2: f64,
}

impl HuberLoss {
    /// Create a new Huber loss function with the given scale parameter (must be positive).
    pub fn new(scale: f64) -> AdjustResult<Self> {
        check_scale(scale)?;
        Ok(HuberLoss {
            scale,
            scale2: scale * scale,
        })
    }
}

impl Loss for HuberLoss {
    fn evaluate(&self, s: f64) -> [f64; 3] {
        if s > self.scale2 {
            // Outlier region: linear cost
            let r = s.sqrt();
            let rho1 = (self.scale / r).max(f64::MIN_POSITIVE);
            [2.0 * self.scale * r - self.scale2, rho1, -rho1 / (2.0 * s)]
        } else {
            // Inlier region: quadratic cost
            [s, 1.0, 0.0]
        }
    }

    fn threshold(&self) -> f64 {
        self.scale
    }

    fn name(&self) -> &'static str {
        "huber"
    }
}

/// Cauchy loss function for aggressive outlier rejection.
///
/// # Mathematical Definition
///
/// ```text
/// ρ(s) = δ² · ln(1 + s/δ²)
///
/// ρ'(s) = 1 / (1 + s/δ²)
///
/// ρ''(s) = -1 / (δ² · (1 + s/δ²)²)
/// ```
#[derive(Debug, Clone)]
pub struct CauchyLoss {
    /// Scale parameter δ
    scale: f64,
    /// Cached value δ²
    scale2: f64,
    /// Cached value 1/δ²
    c: f64,
}

impl CauchyLoss {
    /// Create a new Cauchy loss function with the given scale parameter (must be positive).
    pub fn new(scale: f64) -> AdjustResult<Self> {
        check_scale(scale)?;
        let scale2 = scale * scale;
        Ok(CauchyLoss {
            scale,
            scale2,
            c: 1.0 / scale2,
        })
    }
}

impl Loss for CauchyLoss {
    fn evaluate(&self, s: f64) -> [f64; 3] {
        let sum = 1.0 + s * self.c;
        let inv = 1.0 / sum;
        [
            self.scale2 * sum.ln(),
            inv.max(f64::MIN_POSITIVE),
            -self.c * (inv * inv),
        ]
    }

    fn threshold(&self) -> f64 {
        self.scale
    }

    fn name(&self) -> &'static str {
        "cauchy"
    }
}

/// Soft L1 loss, a smooth approximation of the absolute value.
///
/// # Mathematical Definition
///
/// ```text
/// ρ(s) = 2δ² · (√(1 + s/δ²) - 1)
///
/// ρ'(s) = 1 / √(1 + s/δ²)
///
/// ρ''(s) = -ρ'(s) / (2δ² · (1 + s/δ²))
/// ```
///
/// For large residuals the cost grows like `2δ·|r|`, i.e. an L1 penalty.
#[derive(Debug, Clone)]
pub struct SoftLOneLoss {
    scale: f64,
    scale2: f64,
    c: f64,
}

impl SoftLOneLoss {
    /// Create a new soft-L1 loss with the given scale parameter (must be positive).
    pub fn new(scale: f64) -> AdjustResult<Self> {
        check_scale(scale)?;
        let scale2 = scale * scale;
        Ok(SoftLOneLoss {
            scale,
            scale2,
            c: 1.0 / scale2,
        })
    }
}

impl Loss for SoftLOneLoss {
    fn evaluate(&self, s: f64) -> [f64; 3] {
        let sum = 1.0 + s * self.c;
        let tmp = sum.sqrt();
        let rho1 = (1.0 / tmp).max(f64::MIN_POSITIVE);
        [
            2.0 * self.scale2 * (tmp - 1.0),
            rho1,
            -(self.c * rho1) / (2.0 * sum),
        ]
    }

    fn threshold(&self) -> f64 {
        self.scale
    }

    fn name(&self) -> &'static str {
        "l1"
    }
}

/// The cost functions that can be named in the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CostFunction {
    /// Plain squared error, no loss object
    L2,
    Trivial,
    Huber,
    #[default]
    Cauchy,
    /// Soft L1
    L1,
}

impl CostFunction {
    pub fn as_str(&self) -> &'static str {
        match self {
            CostFunction::L2 => "l2",
            CostFunction::Trivial => "trivial",
            CostFunction::Huber => "huber",
            CostFunction::Cauchy => "cauchy",
            CostFunction::L1 => "l1",
        }
    }

    /// Build the loss for this cost function. `L2` yields `None`.
    pub fn build(&self, threshold: f64) -> AdjustResult<Option<Box<dyn Loss + Send>>> {
        let loss: Box<dyn Loss + Send> = match self {
            CostFunction::L2 => return Ok(None),
            CostFunction::Trivial => Box::new(TrivialLoss),
            CostFunction::Huber => Box::new(HuberLoss::new(threshold)?),
            CostFunction::Cauchy => Box::new(CauchyLoss::new(threshold)?),
            CostFunction::L1 => Box::new(SoftLOneLoss::new(threshold)?),
        };
        Ok(Some(loss))
    }
}

impl FromStr for CostFunction {
    type Err = AdjustError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "l2" => Ok(CostFunction::L2),
            "trivial" => Ok(CostFunction::Trivial),
            "huber" => Ok(CostFunction::Huber),
            "cauchy" => Ok(CostFunction::Cauchy),
            "l1" => Ok(CostFunction::L1),
            other => Err(AdjustError::InvalidInput(format!(
                "Unknown cost function: {other}."
            ))),
        }
    }
}

impl fmt::Display for CostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Select the robust loss named `name`.
///
/// A `threshold` of zero means "use `default_threshold`" (the configured
/// robust threshold). `l2` returns `Ok(None)`; an unknown name fails with an
/// error that contains the name.
pub fn select_loss(
    name: &str,
    threshold: f64,
    default_threshold: f64,
) -> AdjustResult<Option<Box<dyn Loss + Send>>> {
    let threshold = if threshold == 0.0 {
        default_threshold
    } else {
        threshold
    };
    name.parse::<CostFunction>()?.build(threshold)
}
