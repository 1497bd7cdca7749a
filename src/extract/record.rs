//! Product detail page extraction.
//!
//! Turns a detail page body into a [`CandidateRecord`] or a
//! [`ValidationFailure`] explaining why the page is unusable. Validation
//! failures are expected in bulk crawling and are counted, never treated as
//! run errors.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use url::Url;

use crate::extract::price::{parse_price, CurrencyMarker};

/// Product names longer than this are truncated; storefronts stuff keyword
/// spam into titles.
const MAX_NAME_LEN: usize = 150;

/// Minimum plausible name length; anything shorter is theme boilerplate.
const MIN_NAME_LEN: usize = 4;

// Selector strings are compile-time constants; a parse failure is a
// programmer error.
macro_rules! selector_list {
    ($($s:literal),+ $(,)?) => {
        LazyLock::new(|| {
            [$($s),+]
                .iter()
                .map(|s| Selector::parse(s).expect("valid selector"))
                .collect()
        })
    };
}

#[allow(clippy::expect_used)]
static NAME_SELECTORS: LazyLock<Vec<Selector>> = selector_list![
    "h1.product_title",
    "h1.entry-title",
    "h1.product-title",
    ".product-title",
    ".product-name",
    "h1",
];

#[allow(clippy::expect_used)]
static PRICE_SELECTORS: LazyLock<Vec<Selector>> = selector_list![
    ".woocommerce-Price-amount bdi",
    ".woocommerce-Price-amount",
    ".price .amount",
    ".price",
    ".product-price",
    ".amount",
];

#[allow(clippy::expect_used)]
static IMAGE_SELECTORS: LazyLock<Vec<Selector>> = selector_list![
    ".woocommerce-product-gallery__image img",
    ".product-gallery img",
    "img.wp-post-image",
    ".product-image img",
];

#[allow(clippy::expect_used)]
static SKU_SELECTORS: LazyLock<Vec<Selector>> = selector_list![".sku", ".product_meta .sku"];
#[allow(clippy::expect_used)]
static BRAND_SELECTORS: LazyLock<Vec<Selector>> = selector_list![".brand", ".product-brand"];
#[allow(clippy::expect_used)]
static CATEGORY_SELECTORS: LazyLock<Vec<Selector>> =
    selector_list![".posted_in a", ".product_meta .posted_in a", ".breadcrumb a"];
#[allow(clippy::expect_used)]
static STOCK_SELECTORS: LazyLock<Vec<Selector>> = selector_list![".stock", ".availability"];

/// Why a detail page did not yield a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationFailure {
    /// No usable product name anywhere on the page.
    MissingName,
    /// No price-bearing element at all.
    MissingPrice,
    /// A price element was present but its text had no parseable amount.
    UnparseablePrice,
}

impl std::fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::MissingName => "missing name",
            Self::MissingPrice => "missing price",
            Self::UnparseablePrice => "unparseable price",
        };
        f.write_str(label)
    }
}

/// An extracted product, immutable once built.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateRecord {
    /// Detail page the record came from; also the identity for dedup.
    pub source_url: Url,
    pub name: String,
    /// The price element's text exactly as it appeared, whitespace
    /// collapsed.
    pub raw_price_text: String,
    /// Resolved currency code (marker match or configured default).
    pub currency_hint: String,
    pub price: f64,
    pub image_url: Option<Url>,
    /// Optional fields found on the page: sku, brand, category, stock.
    pub extra_fields: BTreeMap<String, String>,
}

/// Extracts a product record from a detail page body.
///
/// Name and a parseable price are mandatory; image and extra fields are
/// best-effort.
pub fn extract_record(
    body: &str,
    url: &Url,
    markers: &[CurrencyMarker],
    default_currency: &str,
) -> Result<CandidateRecord, ValidationFailure> {
    let document = Html::parse_document(body);

    let name = first_text(&document, &NAME_SELECTORS, MIN_NAME_LEN)
        .ok_or(ValidationFailure::MissingName)?;
    let name = truncate(&name, MAX_NAME_LEN);

    let price_texts: Vec<String> = PRICE_SELECTORS
        .iter()
        .flat_map(|sel| document.select(sel))
        .filter_map(|el| non_empty_text(&el))
        .collect();
    if price_texts.is_empty() {
        return Err(ValidationFailure::MissingPrice);
    }
    let (raw_price_text, parsed) = price_texts
        .iter()
        .find_map(|text| parse_price(text, markers, default_currency).map(|p| (text.clone(), p)))
        .ok_or(ValidationFailure::UnparseablePrice)?;

    let image_url = IMAGE_SELECTORS
        .iter()
        .flat_map(|sel| document.select(sel))
        .find_map(|el| {
            let src = el.value().attr("src").or_else(|| el.value().attr("data-src"))?;
            url.join(src.trim()).ok()
        });

    let mut extra_fields = BTreeMap::new();
    for (key, selectors) in [
        ("sku", &*SKU_SELECTORS),
        ("brand", &*BRAND_SELECTORS),
        ("category", &*CATEGORY_SELECTORS),
        ("stock", &*STOCK_SELECTORS),
    ] {
        if let Some(value) = first_text(&document, selectors, 1) {
            extra_fields.insert(key.to_owned(), value);
        }
    }

    Ok(CandidateRecord {
        source_url: url.clone(),
        name,
        raw_price_text,
        currency_hint: parsed.currency,
        price: parsed.amount,
        image_url,
        extra_fields,
    })
}

/// First selector hit whose collapsed text reaches `min_len`.
fn first_text(document: &Html, selectors: &[Selector], min_len: usize) -> Option<String> {
    selectors
        .iter()
        .flat_map(|sel| document.select(sel))
        .filter_map(|el| non_empty_text(&el))
        .find(|text| text.chars().count() >= min_len)
}

/// Element text with whitespace runs collapsed to single spaces.
fn non_empty_text(element: &ElementRef<'_>) -> Option<String> {
    let text = element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_owned()
    } else {
        text.chars().take(max_chars).collect()
    }
}
