//! Source identifiers and the fixed rotation ring
//!
//! The three upstream sources are visited in a fixed cyclic order; the last
//! member hands over to the first.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque per-source progress pointer (page index or offset, interpreted by the fetcher)
pub type Cursor = u64;

/// Value a cursor takes before a source has made any progress, and after a reset
pub const INITIAL_CURSOR: Cursor = 0;

/// Identifies one upstream source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceId {
    /// Paginated JSON product API
    Api,
    /// First HTML catalog site
    CatalogA,
    /// Second HTML catalog site
    CatalogB,
}

impl SourceId {
    /// Ring order used for rotation
    pub const RING: [SourceId; 3] = [SourceId::Api, SourceId::CatalogA, SourceId::CatalogB];

    /// Returns the ring member that follows this one
    pub fn next(self) -> Self {
        match self {
            Self::Api => Self::CatalogA,
            Self::CatalogA => Self::CatalogB,
            Self::CatalogB => Self::Api,
        }
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::CatalogA => "catalog_a",
            Self::CatalogB => "catalog_b",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "api" => Some(Self::Api),
            "catalog_a" => Some(Self::CatalogA),
            "catalog_b" => Some(Self::CatalogB),
            _ => None,
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}
