//! HTML parser for catalog listing and detail pages
//!
//! Listing pages yield candidate detail URLs; detail pages are scanned for an
//! EAN-like token, brand, name, a nutrient table, an optional additives table
//! and a product image.

use crate::config::CatalogSourceConfig;
use crate::product::{Nutrient, RawProduct};
use crate::url::canonical_detail_url;
use crate::ConfigError;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::{BTreeMap, HashSet};
use url::Url;

/// Compiled selectors for one catalog site
#[derive(Debug, Clone)]
pub struct CatalogSelectors {
    product_link: Selector,
    brand: Selector,
    name: Selector,
    ean: Selector,
    nutrient_table: Selector,
    additives_table: Option<Selector>,
    image: Selector,
}

impl CatalogSelectors {
    /// Compiles the selectors configured for a catalog source
    pub fn compile(config: &CatalogSourceConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            product_link: compile_selector(&config.product_link_selector)?,
            brand: compile_selector(&config.brand_selector)?,
            name: compile_selector(&config.name_selector)?,
            ean: compile_selector(&config.ean_selector)?,
            nutrient_table: compile_selector(&config.nutrient_table_selector)?,
            additives_table: config
                .additives_table_selector
                .as_deref()
                .map(compile_selector)
                .transpose()?,
            image: compile_selector(&config.image_selector)?,
        })
    }
}

fn compile_selector(selector: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector)
        .map_err(|e| ConfigError::InvalidSelector(format!("'{}': {}", selector, e)))
}

static ROW: Lazy<Selector> =
    Lazy::new(|| Selector::parse("tr").expect("Row selector is hardcoded and valid"));

static CELL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("th, td").expect("Cell selector is hardcoded and valid"));

static TITLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("title").expect("Title selector is hardcoded and valid"));

/// 8 to 14 digits, optionally separated by single spaces or hyphens
static EAN_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d(?:[ \-]?\d){7,13}").expect("EAN regex is hardcoded and valid")
});

static LABELLED_EAN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:ean|gtin)(?:[- ]?(?:8|13|14))?(?:[- ]?(?:code|nummer|number|nr\.?))?\s*[:#]?\s*(\d(?:[ \-]?\d){7,13})",
    )
    .expect("Labelled EAN regex is hardcoded and valid")
});

static INLINE_NUTRIENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(rohprotein|proteine?|rohfett|fettgehalt|fett|fat|rohfaser|faser|fib(?:er|re)|rohasche|asche|ash|feuchtigkeit|feuchte|moisture)\b[^0-9%]{0,20}?(\d+(?:[.,]\d+)?)\s*%",
    )
    .expect("Nutrient regex is hardcoded and valid")
});

/// Extracts candidate detail-page URLs from a listing page
///
/// # Link Extraction Rules
///
/// - Only anchors matching the site's product-link selector are considered
/// - `javascript:`, `mailto:`, `tel:`, `data:` and fragment-only links are skipped
/// - Links with a `download` attribute are skipped
/// - Every link is canonicalized (see [`canonical_detail_url`]) and
///   deduplicated, keeping listing order
///
/// # Arguments
///
/// * `html` - The listing page HTML
/// * `base_url` - The listing page URL, for resolving relative links
/// * `selectors` - The site's compiled selectors
pub fn parse_listing(html: &str, base_url: &Url, selectors: &CatalogSelectors) -> Vec<Url> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for element in document.select(&selectors.product_link) {
        if element.value().attr("download").is_some() {
            continue;
        }
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        if !is_followable(href) {
            continue;
        }
        match canonical_detail_url(href, base_url) {
            Ok(url) => {
                if seen.insert(url.as_str().to_string()) {
                    links.push(url);
                }
            }
            Err(e) => tracing::trace!(href, error = %e, "skipping listing link"),
        }
    }

    links
}

/// Returns false for hrefs that can never lead to a product page
fn is_followable(href: &str) -> bool {
    let href = href.trim();
    !(href.is_empty()
        || href.starts_with('#')
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:"))
}

/// Extracts a raw product record from a detail page
///
/// # Extraction Rules
///
/// - EAN: the EAN selector (`content` attribute, else text), else an
///   `EAN`/`GTIN`-labelled number anywhere in the page text
/// - Brand and name: their selectors; the name falls back to `<title>`
/// - Nutrients: rows of the nutrient table(s) whose label names a tracked
///   nutrient (English or German), else `Label ... 12,5 %` inline text
/// - Additives: label/value rows of the additives table, when configured
/// - Image: the image selector (`content`, else `src`), made absolute
///
/// A page without an EAN-like token yields a record with `ean: None`, which
/// the normalizer drops.
pub fn parse_detail(html: &str, page_url: &Url, selectors: &CatalogSelectors) -> RawProduct {
    let document = Html::parse_document(html);
    let page_text = collapse(document.root_element().text());

    let ean = document
        .select(&selectors.ean)
        .filter_map(|el| element_value(&el))
        .find_map(|value| find_ean_token(&value))
        .or_else(|| find_labelled_ean(&page_text));

    let brand = document
        .select(&selectors.brand)
        .find_map(|el| element_value(&el));

    let name = document
        .select(&selectors.name)
        .find_map(|el| element_value(&el))
        .or_else(|| {
            document
                .select(&TITLE)
                .find_map(|el| element_value(&el))
        });

    let mut product = RawProduct {
        ean,
        brand,
        name,
        origin: page_url.to_string(),
        ..RawProduct::default()
    };

    for table in document.select(&selectors.nutrient_table) {
        for (label, value) in table_rows(&table) {
            if let Some(nutrient) = match_nutrient(&label) {
                product.nutrients.entry(nutrient).or_insert(value);
            }
        }
    }
    if product.nutrients.is_empty() {
        product.nutrients = find_inline_nutrients(&page_text);
    }

    if let Some(additives_selector) = &selectors.additives_table {
        for table in document.select(additives_selector) {
            product.additives.extend(table_rows(&table));
        }
    }

    product.image_url = document
        .select(&selectors.image)
        .find_map(|el| {
            el.value()
                .attr("content")
                .or_else(|| el.value().attr("src"))
                .map(str::trim)
                .filter(|src| !src.is_empty())
                .and_then(|src| page_url.join(src).ok())
        })
        .map(|url| url.to_string());

    product
}

fn collapse<'a>(text: impl Iterator<Item = &'a str>) -> String {
    text.flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// `content` attribute for meta-like elements, else the element's text
fn element_value(element: &ElementRef<'_>) -> Option<String> {
    element
        .value()
        .attr("content")
        .map(|c| collapse(std::iter::once(c)))
        .or_else(|| Some(collapse(element.text())))
        .filter(|v| !v.is_empty())
}

/// Label/value pairs from the first two cells of each table row
fn table_rows(table: &ElementRef<'_>) -> Vec<(String, String)> {
    table
        .select(&ROW)
        .filter_map(|row| {
            let mut cells = row.select(&CELL).map(|c| collapse(c.text()));
            let label = cells.next()?;
            let value = cells.next()?;
            let label = label.trim_end_matches(':').trim().to_string();
            (!label.is_empty() && !value.is_empty()).then_some((label, value))
        })
        .collect()
}

/// Finds an 8 to 14 digit token, tolerating spaces and hyphens between digits
fn find_ean_token(text: &str) -> Option<String> {
    EAN_TOKEN
        .find_iter(text)
        .map(|m| m.as_str())
        .find(|candidate| {
            let digits = candidate.bytes().filter(u8::is_ascii_digit).count();
            (8..=14).contains(&digits)
        })
        .map(str::to_string)
}

/// Finds a number labelled `EAN` or `GTIN` in free text
fn find_labelled_ean(text: &str) -> Option<String> {
    LABELLED_EAN
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .find_map(|m| find_ean_token(m.as_str()))
}

/// Maps a nutrient-table label to the nutrient it names
///
/// Matches whole words so that e.g. "Fatty acids" is not read as fat.
fn match_nutrient(label: &str) -> Option<Nutrient> {
    let label = label.to_lowercase();
    label
        .split(|c: char| !c.is_alphanumeric())
        .find_map(|word| match word {
            "protein" | "proteine" | "rohprotein" => Some(Nutrient::Protein),
            "fat" | "fett" | "rohfett" | "fettgehalt" => Some(Nutrient::Fat),
            "fiber" | "fibre" | "faser" | "rohfaser" => Some(Nutrient::CrudeFiber),
            "ash" | "asche" | "rohasche" => Some(Nutrient::RawAsh),
            "moisture" | "feuchtigkeit" | "feuchte" | "wassergehalt" => Some(Nutrient::Moisture),
            _ => None,
        })
}

/// Reads `Label 12,5 %` style constituents from free text
fn find_inline_nutrients(text: &str) -> BTreeMap<Nutrient, String> {
    let mut found = BTreeMap::new();
    for caps in INLINE_NUTRIENT.captures_iter(text) {
        if let Some(nutrient) = match_nutrient(&caps[1]) {
            found
                .entry(nutrient)
                .or_insert_with(|| format!("{} %", &caps[2]));
        }
    }
    found
}
