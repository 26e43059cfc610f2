//! Structural validation of canonical products
//!
//! Validation checks shape, never nutritional completeness: a product that
//! reports no nutrients at all is accepted as a nutrient-free stub because
//! upstream sources routinely omit them.

use crate::product::{CanonicalProduct, Ean, Nutrient};
use std::fmt;

/// One violated rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    EanInvalid,
    BrandEmpty,
    NameEmpty,
    OutOfRange(Nutrient),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EanInvalid => f.write_str("ean-invalid"),
            Self::BrandEmpty => f.write_str("brand-empty"),
            Self::NameEmpty => f.write_str("name-empty"),
            Self::OutOfRange(nutrient) => write!(f, "{}-out-of-range", nutrient.key()),
        }
    }
}

/// Accept/reject verdict with every violated rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub reasons: Vec<RejectReason>,
}

impl ValidationResult {
    fn from_reasons(reasons: Vec<RejectReason>) -> Self {
        Self {
            is_valid: reasons.is_empty(),
            reasons,
        }
    }

    /// Comma-separated reason codes, for logs
    pub fn reason_codes(&self) -> String {
        self.reasons
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Validates a canonical product, accumulating all violations
pub fn validate(product: &CanonicalProduct) -> ValidationResult {
    let mut reasons = Vec::new();

    if !Ean::is_well_formed(product.ean.as_str()) {
        reasons.push(RejectReason::EanInvalid);
    }
    if product.brand.trim().is_empty() {
        reasons.push(RejectReason::BrandEmpty);
    }
    if product.name.trim().is_empty() {
        reasons.push(RejectReason::NameEmpty);
    }
    for nutrient in Nutrient::ALL {
        if let Some(value) = product.nutrients.get(nutrient) {
            if !(0.0..=100.0).contains(&value) {
                reasons.push(RejectReason::OutOfRange(nutrient));
            }
        }
    }

    ValidationResult::from_reasons(reasons)
}
