//! Record normalizer: raw upstream shape to canonical product

use crate::product::{CanonicalProduct, Ean, Nutrient, Nutrients, RawProduct};
use crate::state::SourceId;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use url::Url;

/// Why a raw record was dropped before it became a canonical product
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// The source did not provide any identifier
    MissingEan,
    /// The identifier is not 8 to 14 digits
    MalformedEan(String),
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingEan => f.write_str("ean-missing"),
            Self::MalformedEan(raw) => write!(f, "ean-malformed ({})", raw),
        }
    }
}

static NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-?\d+(?:[.,]\d+)?").expect("Number regex is hardcoded and valid"));

/// Maps a raw record into the canonical shape
///
/// A record without a well-formed EAN is dropped here and never reaches
/// deduplication or the sink. Nutrient values that cannot be read as a number
/// are treated as absent; values that parse but lie outside 0..=100 are kept so
/// the validator can report them.
pub fn normalize(raw: RawProduct, source: SourceId) -> Result<CanonicalProduct, DropReason> {
    let ean = match raw.ean.as_deref().map(str::trim) {
        None | Some("") => return Err(DropReason::MissingEan),
        Some(token) => Ean::parse(token).ok_or_else(|| DropReason::MalformedEan(token.to_string()))?,
    };

    let mut nutrients = Nutrients::default();
    for nutrient in Nutrient::ALL {
        if let Some(printed) = raw.nutrients.get(&nutrient) {
            let value = parse_percentage(printed);
            if value.is_none() {
                tracing::debug!(%ean, nutrient = nutrient.key(), printed = %printed, "unreadable nutrient value");
            }
            nutrients.set(nutrient, value);
        }
    }

    let additives = raw
        .additives
        .into_iter()
        .map(|(k, v)| (collapse_whitespace(&k), collapse_whitespace(&v)))
        .filter(|(k, v)| !k.is_empty() && !v.is_empty())
        .collect();

    Ok(CanonicalProduct {
        ean,
        brand: raw.brand.as_deref().map(collapse_whitespace).unwrap_or_default(),
        name: raw.name.as_deref().map(collapse_whitespace).unwrap_or_default(),
        nutrients,
        additives,
        image_url: raw.image_url.as_deref().and_then(normalize_image_url),
        source_id: source,
    })
}

/// Reads a percentage as printed on a label or shop page
///
/// Accepts decimal commas and trailing units ("24,5 %", "ca. 8%", "10.2").
pub fn parse_percentage(printed: &str) -> Option<f64> {
    let token = NUMBER.find(printed)?.as_str().replace(',', ".");
    token.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn normalize_image_url(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    matches!(url.scheme(), "http" | "https").then(|| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(ean: Option<&str>) -> RawProduct {
        RawProduct {
            ean: ean.map(str::to_string),
            brand: Some("  Happy   Paws ".to_string()),
            name: Some("Adult\nLamb & Rice".to_string()),
            origin: "test".to_string(),
            ..RawProduct::default()
        }
    }

    #[test]
    fn test_missing_ean_is_dropped() {
        assert_eq!(
            normalize(raw(None), SourceId::Api),
            Err(DropReason::MissingEan)
        );
        assert_eq!(
            normalize(raw(Some("  ")), SourceId::Api),
            Err(DropReason::MissingEan)
        );
    }

    #[test]
    fn test_malformed_ean_is_dropped() {
        assert!(matches!(
            normalize(raw(Some("12-34")), SourceId::CatalogA),
            Err(DropReason::MalformedEan(_))
        ));
    }

    #[test]
    fn test_text_fields_are_trimmed_and_collapsed() {
        let product = normalize(raw(Some("4001234567890")), SourceId::CatalogB).unwrap();
        assert_eq!(product.ean.as_str(), "4001234567890");
        assert_eq!(product.brand, "Happy Paws");
        assert_eq!(product.name, "Adult Lamb & Rice");
        assert_eq!(product.source_id, SourceId::CatalogB);
        assert!(product.nutrients.is_empty());
    }

    #[test]
    fn test_nutrients_are_parsed_and_out_of_range_kept() {
        let mut record = raw(Some("4001234567890"));
        record.nutrients.insert(Nutrient::Protein, "24,5 %".to_string());
        record.nutrients.insert(Nutrient::Fat, "150".to_string());
        record.nutrients.insert(Nutrient::Moisture, "n/a".to_string());

        let product = normalize(record, SourceId::Api).unwrap();
        assert_eq!(product.nutrients.protein, Some(24.5));
        assert_eq!(product.nutrients.fat, Some(150.0));
        assert_eq!(product.nutrients.moisture, None);
    }

    #[test]
    fn test_parse_percentage_variants() {
        assert_eq!(parse_percentage("24 %"), Some(24.0));
        assert_eq!(parse_percentage("ca. 8,25%"), Some(8.25));
        assert_eq!(parse_percentage("10.2"), Some(10.2));
        assert_eq!(parse_percentage("-3"), Some(-3.0));
        assert_eq!(parse_percentage("unknown"), None);
    }

    #[test]
    fn test_image_url_must_be_http() {
        let mut record = raw(Some("4001234567890"));
        record.image_url = Some("javascript:alert(1)".to_string());
        assert_eq!(normalize(record, SourceId::Api).unwrap().image_url, None);

        let mut record = raw(Some("4001234567890"));
        record.image_url = Some(" https://cdn.example/p/1.jpg ".to_string());
        assert_eq!(
            normalize(record, SourceId::Api).unwrap().image_url.as_deref(),
            Some("https://cdn.example/p/1.jpg")
        );
    }
}
