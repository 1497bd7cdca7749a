//! Catalog page link extraction.
//!
//! Pulls product detail links out of a catalog listing page. Storefront
//! themes disagree on markup, so a list of selectors is tried and the
//! results are filtered through a product-URL predicate that drops cart,
//! filter, pagination, and asset links.

use std::collections::HashSet;
use std::sync::LazyLock;

use scraper::{Html, Selector};
use tracing::trace;
use url::Url;

/// Selectors that cover the product-anchor markup of the common storefront
/// themes (WooCommerce first, then generic grids).
#[allow(clippy::expect_used)] // selectors are compile-time constants
static LINK_SELECTORS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    [
        "a.woocommerce-loop-product__link",
        "a[href*=\"/product/\"]",
        ".product a[href]",
        ".product-item a[href]",
        "h2 a[href]",
    ]
    .iter()
    .map(|s| Selector::parse(s).expect("valid link selector"))
    .collect()
});

/// URL substrings that mark a link as navigation, commerce action, or asset
/// rather than a product page.
const EXCLUDED_FRAGMENTS: &[&str] = &[
    "add-to-cart",
    "?orderby",
    "page=",
    "/page/",
    "filter",
    "/cart",
    "/checkout",
    "/my-account",
    "/product-category/",
    "/category/",
    "/tag/",
    "/wp-admin",
    "/wp-login",
    ".jpg",
    ".jpeg",
    ".png",
    ".webp",
    ".pdf",
];

/// Extracts product detail URLs from a catalog page body.
///
/// Relative hrefs are resolved against `base`; links to other hosts and
/// non-http(s) schemes are dropped. Order follows document order with
/// duplicates removed.
#[must_use]
pub fn extract_catalog_links(body: &str, base: &Url) -> Vec<Url> {
    let document = Html::parse_document(body);
    let mut seen: HashSet<String> = HashSet::new();
    let mut links = Vec::new();

    for selector in LINK_SELECTORS.iter() {
        for element in document.select(selector) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            let Some(resolved) = resolve_link(href, base) else {
                continue;
            };
            if !is_product_url(&resolved, base) {
                continue;
            }
            if seen.insert(resolved.to_string()) {
                links.push(resolved);
            }
        }
    }

    trace!(base = %base, count = links.len(), "extracted catalog links");
    links
}

/// Resolves a raw href against the page URL, dropping non-navigable
/// schemes.
fn resolve_link(href: &str, base: &Url) -> Option<Url> {
    let href = href.trim();
    if href.is_empty()
        || href.starts_with('#')
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }
    let resolved = base.join(href).ok()?;
    match resolved.scheme() {
        "http" | "https" => Some(resolved),
        _ => None,
    }
}

/// Returns `true` if the URL plausibly points at a product detail page on
/// the same host as the catalog.
fn is_product_url(url: &Url, base: &Url) -> bool {
    if url.host_str() != base.host_str() {
        return false;
    }
    let text = url.as_str().to_lowercase();
    !EXCLUDED_FRAGMENTS.iter().any(|frag| text.contains(frag))
}
