//! Product records flowing through the pipeline
//!
//! Fetchers emit loosely-typed [`RawProduct`]s; the normalizer turns them into
//! [`CanonicalProduct`]s, which are what validation, deduplication and the
//! moderation sink consume.

mod normalize;
mod validation;

pub use normalize::{normalize, parse_percentage, DropReason};
pub use validation::{validate, RejectReason, ValidationResult};

use crate::state::SourceId;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// A well-formed EAN: 8 to 14 ASCII digits
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Ean(String);

impl Ean {
    pub const MIN_DIGITS: usize = 8;
    pub const MAX_DIGITS: usize = 14;

    /// Parses an EAN, tolerating the spaces and hyphens printed on labels
    pub fn parse(raw: &str) -> Option<Self> {
        let digits: String = raw
            .trim()
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .collect();
        Self::is_well_formed(&digits).then_some(Self(digits))
    }

    /// Returns true if `s` is exactly 8 to 14 ASCII digits
    pub fn is_well_formed(s: &str) -> bool {
        (Self::MIN_DIGITS..=Self::MAX_DIGITS).contains(&s.len())
            && s.bytes().all(|b| b.is_ascii_digit())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ean {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Analytical constituents tracked per product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Nutrient {
    Protein,
    Fat,
    CrudeFiber,
    RawAsh,
    Moisture,
}

impl Nutrient {
    pub const ALL: [Nutrient; 5] = [
        Nutrient::Protein,
        Nutrient::Fat,
        Nutrient::CrudeFiber,
        Nutrient::RawAsh,
        Nutrient::Moisture,
    ];

    /// Stable kebab-case key, used in rejection reasons
    pub fn key(&self) -> &'static str {
        match self {
            Self::Protein => "protein",
            Self::Fat => "fat",
            Self::CrudeFiber => "crude-fiber",
            Self::RawAsh => "raw-ash",
            Self::Moisture => "moisture",
        }
    }
}

/// Nutrient percentages; `None` means the source did not report the value
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Nutrients {
    pub protein: Option<f64>,
    pub fat: Option<f64>,
    pub crude_fiber: Option<f64>,
    pub raw_ash: Option<f64>,
    pub moisture: Option<f64>,
}

impl Nutrients {
    pub fn get(&self, nutrient: Nutrient) -> Option<f64> {
        match nutrient {
            Nutrient::Protein => self.protein,
            Nutrient::Fat => self.fat,
            Nutrient::CrudeFiber => self.crude_fiber,
            Nutrient::RawAsh => self.raw_ash,
            Nutrient::Moisture => self.moisture,
        }
    }

    pub fn set(&mut self, nutrient: Nutrient, value: Option<f64>) {
        let slot = match nutrient {
            Nutrient::Protein => &mut self.protein,
            Nutrient::Fat => &mut self.fat,
            Nutrient::CrudeFiber => &mut self.crude_fiber,
            Nutrient::RawAsh => &mut self.raw_ash,
            Nutrient::Moisture => &mut self.moisture,
        };
        *slot = value;
    }

    /// Returns true when no nutrient was reported at all
    pub fn is_empty(&self) -> bool {
        Nutrient::ALL.iter().all(|n| self.get(*n).is_none())
    }
}

/// The normalized, source-independent product representation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalProduct {
    pub ean: Ean,
    pub brand: String,
    pub name: String,
    pub nutrients: Nutrients,
    pub additives: BTreeMap<String, String>,
    pub image_url: Option<String>,
    pub source_id: SourceId,
}

/// A candidate record as a fetcher found it, before normalization
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawProduct {
    /// Identifier token exactly as found upstream
    pub ean: Option<String>,
    pub brand: Option<String>,
    pub name: Option<String>,
    /// Nutrient values as printed upstream ("24 %", "24,5", "24.5")
    pub nutrients: BTreeMap<Nutrient, String>,
    pub additives: BTreeMap<String, String>,
    pub image_url: Option<String>,
    /// Where the record came from (detail URL or API page), for logging
    pub origin: String,
}
