//! Price token parsing.
//!
//! Catalog markup renders prices in wildly inconsistent shapes: currency
//! symbols or codes, thousands separators, sale prices next to struck-out
//! originals. The parser recognizes an ordered table of currency markers and
//! pulls the numeric amount out of whatever surrounds it.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Matches a money-like number: comma-grouped or plain, with an optional
/// decimal part. The decimal part is unbounded so an over-precise amount
/// like `1200.555` is consumed whole rather than split into two matches.
#[allow(clippy::expect_used)] // pattern is a compile-time constant
static AMOUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+(?:\.\d+)?")
        .expect("valid amount pattern")
});

/// One entry in the ordered currency recognition table.
///
/// `marker` is the literal text looked for ("KSh", "$", "EUR"); `code` is
/// the ISO-style code reported for it. Symbols match case-sensitively,
/// alphabetic codes case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyMarker {
    pub marker: String,
    pub code: String,
}

impl CurrencyMarker {
    /// Convenience constructor.
    #[must_use]
    pub fn new(marker: &str, code: &str) -> Self {
        Self {
            marker: marker.to_owned(),
            code: code.to_owned(),
        }
    }

    fn matches(&self, text: &str) -> bool {
        if self.marker.chars().all(|c| c.is_ascii_alphabetic()) {
            // Code-style marker: word match, case-insensitive.
            let upper = text.to_uppercase();
            let marker = self.marker.to_uppercase();
            upper
                .match_indices(&marker)
                .any(|(at, _)| word_boundary(&upper, at, marker.len()))
        } else {
            text.contains(&self.marker)
        }
    }
}

fn word_boundary(text: &str, at: usize, len: usize) -> bool {
    let before = text[..at].chars().next_back();
    let after = text[at + len..].chars().next();
    !before.is_some_and(|c| c.is_ascii_alphanumeric())
        && !after.is_some_and(|c| c.is_ascii_alphabetic())
}

/// The default marker table: Kenyan shilling spellings first (the original
/// deployment target), then the common internationals.
#[must_use]
pub fn default_currency_markers() -> Vec<CurrencyMarker> {
    vec![
        CurrencyMarker::new("KSh", "KES"),
        CurrencyMarker::new("Ksh", "KES"),
        CurrencyMarker::new("KES", "KES"),
        CurrencyMarker::new("USD", "USD"),
        CurrencyMarker::new("$", "USD"),
        CurrencyMarker::new("JPY", "JPY"),
        CurrencyMarker::new("¥", "JPY"),
        CurrencyMarker::new("￥", "JPY"),
        CurrencyMarker::new("EUR", "EUR"),
        CurrencyMarker::new("€", "EUR"),
        CurrencyMarker::new("GBP", "GBP"),
        CurrencyMarker::new("£", "GBP"),
    ]
}

/// A successfully parsed price.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPrice {
    pub amount: f64,
    /// Resolved currency code: the first matching marker's code, or the
    /// caller's default when no marker matched.
    pub currency: String,
}

/// Parses a price out of free-form markup text.
///
/// The largest number in the text wins. Sale listings usually render the
/// discounted price next to a struck-out original, and the struck-out
/// original is the one catalogs inflate; picking the largest matches what
/// the storefronts themselves report as the list price.
///
/// Returns `None` when no parseable number is present.
#[must_use]
pub fn parse_price(
    text: &str,
    markers: &[CurrencyMarker],
    default_currency: &str,
) -> Option<ParsedPrice> {
    let amount = AMOUNT_RE
        .find_iter(text)
        .filter_map(|m| m.as_str().replace(',', "").parse::<f64>().ok())
        .fold(None, |best: Option<f64>, n| {
            Some(best.map_or(n, |b| b.max(n)))
        })?;
    if amount <= 0.0 {
        return None;
    }

    let currency = markers
        .iter()
        .find(|m| m.matches(text))
        .map_or_else(|| default_currency.to_owned(), |m| m.code.clone());

    Some(ParsedPrice { amount, currency })
}
