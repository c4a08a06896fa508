//! Intrinsics policy: which intrinsic parameters float and which are shared.
//!
//! Intrinsics are grouped in three categories. For each category the policy
//! records whether it is held constant during optimization and whether a single
//! parameter block is shared by every camera or each camera gets its own.

use crate::error::{AdjustError, AdjustResult};
use std::fmt;
use std::str::FromStr;

/// The three intrinsic categories the optimizer knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IntrinsicCategory {
    FocalLength,
    OpticalCenter,
    /// Lens distortion, or the scan parameters of an optical bar camera
    OtherIntrinsics,
}

impl IntrinsicCategory {
    pub const ALL: [IntrinsicCategory; 3] = [
        IntrinsicCategory::FocalLength,
        IntrinsicCategory::OpticalCenter,
        IntrinsicCategory::OtherIntrinsics,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IntrinsicCategory::FocalLength => "focal_length",
            IntrinsicCategory::OpticalCenter => "optical_center",
            IntrinsicCategory::OtherIntrinsics => "other_intrinsics",
        }
    }
}

impl FromStr for IntrinsicCategory {
    type Err = AdjustError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "focal_length" => Ok(IntrinsicCategory::FocalLength),
            "optical_center" => Ok(IntrinsicCategory::OpticalCenter),
            "other_intrinsics" => Ok(IntrinsicCategory::OtherIntrinsics),
            other => Err(AdjustError::InvalidInput(format!(
                "Found unknown intrinsic: {other}."
            ))),
        }
    }
}

impl fmt::Display for IntrinsicCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse a whitespace-separated list of intrinsic category tokens.
///
/// Both `--intrinsics-to-float` and `--intrinsics-to-share` go through here.
/// Commas are accepted as separators too. Duplicates are collapsed.
pub fn parse_intrinsic_categories(list: &str) -> AdjustResult<Vec<IntrinsicCategory>> {
    let mut categories = Vec::new();
    for token in list
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
    {
        let category = token.parse::<IntrinsicCategory>()?;
        if !categories.contains(&category) {
            categories.push(category);
        }
    }
    Ok(categories)
}

/// Constant/shared flags for one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryPolicy {
    pub constant: bool,
    pub shared: bool,
}

/// Per-category intrinsics policy.
///
/// The default holds every category constant and shared, which is what
/// bundle adjustment does when intrinsics are not being solved for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntrinsicsOptions {
    pub focus: CategoryPolicy,
    pub center: CategoryPolicy,
    pub distortion: CategoryPolicy,
}

impl Default for IntrinsicsOptions {
    fn default() -> Self {
        Self::new(false)
    }
}

impl IntrinsicsOptions {
    /// Policy with no float or share list given: every category floats when
    /// intrinsics are solved for, and every category is shared.
    pub fn new(solve_intrinsics: bool) -> Self {
        let policy = CategoryPolicy {
            constant: !solve_intrinsics,
            shared: true,
        };
        Self {
            focus: policy,
            center: policy,
            distortion: policy,
        }
    }

    /// Build the policy from the float/share option strings.
    ///
    /// - Intrinsics not solved: everything constant, and either list being
    ///   non-empty is an error.
    /// - Empty float list: every category floats. Otherwise only the listed ones.
    /// - Sharing defaults to "all shared". When `share_is_specified` is set,
    ///   sharing starts from "none shared" and only the listed categories are
    ///   shared, so an explicit empty list shares nothing.
    pub fn configure(
        solve_intrinsics: bool,
        float_list: &str,
        share_list: &str,
        share_is_specified: bool,
    ) -> AdjustResult<Self> {
        let to_float = parse_intrinsic_categories(float_list)?;
        let to_share = parse_intrinsic_categories(share_list)?;

        if (!to_float.is_empty() || !to_share.is_empty()) && !solve_intrinsics {
            return Err(AdjustError::InvalidInput(
                "To be able to specify only certain intrinsics, the option \
                 --solve-intrinsics must be on."
                    .to_string(),
            ));
        }

        let mut options = Self::new(solve_intrinsics);
        if !solve_intrinsics {
            return Ok(options);
        }

        let float_all = to_float.is_empty();
        for category in IntrinsicCategory::ALL {
            let policy = options.policy_mut(category);
            policy.constant = !(float_all || to_float.contains(&category));
            if share_is_specified {
                policy.shared = to_share.contains(&category);
            }
        }

        Ok(options)
    }

    pub fn policy(&self, category: IntrinsicCategory) -> CategoryPolicy {
        match category {
            IntrinsicCategory::FocalLength => self.focus,
            IntrinsicCategory::OpticalCenter => self.center,
            IntrinsicCategory::OtherIntrinsics => self.distortion,
        }
    }

    fn policy_mut(&mut self, category: IntrinsicCategory) -> &mut CategoryPolicy {
        match category {
            IntrinsicCategory::FocalLength => &mut self.focus,
            IntrinsicCategory::OpticalCenter => &mut self.center,
            IntrinsicCategory::OtherIntrinsics => &mut self.distortion,
        }
    }

    pub fn is_constant(&self, category: IntrinsicCategory) -> bool {
        self.policy(category).constant
    }

    pub fn is_shared(&self, category: IntrinsicCategory) -> bool {
        self.policy(category).shared
    }

    /// True when at least one category is being optimized.
    pub fn any_floating(&self) -> bool {
        IntrinsicCategory::ALL
            .iter()
            .any(|&category| !self.is_constant(category))
    }
}
