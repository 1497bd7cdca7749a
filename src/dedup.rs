//! Fingerprint derivation and the run-scoped deduplication store.
//!
//! A fingerprint is a canonical key derived from a record's identifying URL.
//! Canonicalization collapses superficial variation (case, trailing slashes,
//! tracking query parameters) so that equivalent URLs map to one key, and the
//! [`FingerprintStore`] guarantees that each key is accepted exactly once per
//! run, no matter how many extraction tasks race on it.

use dashmap::DashMap;
use url::Url;

/// Query parameters that carry tracking state rather than identity.
///
/// Parameters with these exact names, plus anything prefixed `utm_`, are
/// stripped during canonicalization.
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_cid", "mc_eid", "ref", "srsltid"];

/// Derives the canonical fingerprint for a URL.
///
/// Normalization applied:
/// - scheme and host are lowercased (the `url` crate already does this)
/// - the fragment and any default port are dropped
/// - tracking query parameters are removed (see [`TRACKING_PARAMS`])
/// - remaining query parameters are sorted by name
/// - a trailing slash on a non-root path is trimmed
///
/// The derivation is pure: the same URL always yields the same key.
#[must_use]
pub fn fingerprint(url: &Url) -> String {
    let mut canonical = url.clone();
    canonical.set_fragment(None);

    let kept: Vec<(String, String)> = {
        let mut params: Vec<(String, String)> = canonical
            .query_pairs()
            .filter(|(name, _)| !is_tracking_param(name))
            .map(|(name, value)| (name.into_owned(), value.into_owned()))
            .collect();
        params.sort();
        params
    };

    if kept.is_empty() {
        canonical.set_query(None);
    } else {
        canonical
            .query_pairs_mut()
            .clear()
            .extend_pairs(kept.iter().map(|(n, v)| (n.as_str(), v.as_str())));
    }

    let mut out = canonical.to_string();
    // Url keeps the path case-sensitive; hosts are already lowercased.
    // Trim a trailing slash unless the path is just "/".
    if out.ends_with('/') && canonical.path() != "/" {
        out.pop();
    }
    out
}

fn is_tracking_param(name: &str) -> bool {
    name.starts_with("utm_") || TRACKING_PARAMS.contains(&name)
}

/// Concurrent set of fingerprints seen during one run.
///
/// The check-and-insert in [`register`](Self::register) is atomic per key:
/// for any fingerprint, exactly one caller observes `true` across any
/// interleaving of concurrent calls. Entries are never evicted; the store is
/// dropped with the run.
#[derive(Debug, Default)]
pub struct FingerprintStore {
    seen: DashMap<String, ()>,
}

impl FingerprintStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a fingerprint, returning `true` if it was not present.
    ///
    /// Returns `false` for every subsequent call with the same key.
    pub fn register(&self, fingerprint: &str) -> bool {
        self.seen.insert(fingerprint.to_owned(), ()).is_none()
    }

    /// Returns the number of distinct fingerprints registered so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Returns `true` if no fingerprint has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    // ==================== Fingerprint Canonicalization ====================

    #[test]
    fn test_fingerprint_is_pure() {
        let u = url("https://example.com/product/brake-pad");
        assert_eq!(fingerprint(&u), fingerprint(&u));
    }

    #[test]
    fn test_fingerprint_lowercases_host() {
        let a = url("https://Example.COM/product/brake-pad");
        let b = url("https://example.com/product/brake-pad");
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_fingerprint_trims_trailing_slash() {
        let a = url("https://example.com/product/brake-pad/");
        let b = url("https://example.com/product/brake-pad");
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_fingerprint_keeps_root_slash() {
        let root = url("https://example.com/");
        assert_eq!(fingerprint(&root), "https://example.com/");
    }

    #[test]
    fn test_fingerprint_strips_utm_params() {
        let a = url("https://example.com/product/x?utm_source=promo&utm_medium=email");
        let b = url("https://example.com/product/x");
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_fingerprint_strips_known_tracking_params() {
        let a = url("https://example.com/product/x?fbclid=abc&gclid=def");
        let b = url("https://example.com/product/x");
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_fingerprint_preserves_identifying_params() {
        let a = url("https://example.com/product?id=42");
        let b = url("https://example.com/product?id=43");
        assert_ne!(fingerprint(&a), fingerprint(&b));
        assert!(fingerprint(&a).contains("id=42"));
    }

    #[test]
    fn test_fingerprint_sorts_query_params() {
        let a = url("https://example.com/product?b=2&a=1");
        let b = url("https://example.com/product?a=1&b=2");
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_fingerprint_drops_fragment() {
        let a = url("https://example.com/product/x#reviews");
        let b = url("https://example.com/product/x");
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    // ==================== FingerprintStore ====================

    #[test]
    fn test_register_first_insert_returns_true() {
        let store = FingerprintStore::new();
        assert!(store.register("https://example.com/product/x"));
    }

    #[test]
    fn test_register_duplicate_returns_false() {
        let store = FingerprintStore::new();
        assert!(store.register("key"));
        assert!(!store.register("key"));
        assert!(!store.register("key"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_register_distinct_keys_independent() {
        let store = FingerprintStore::new();
        assert!(store.register("a"));
        assert!(store.register("b"));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_register_concurrent_exactly_one_winner() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::thread;

        let store = Arc::new(FingerprintStore::new());
        let wins = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();

        for _ in 0..16 {
            let store = Arc::clone(&store);
            let wins = Arc::clone(&wins);
            handles.push(thread::spawn(move || {
                for i in 0..100 {
                    if store.register(&format!("key-{i}")) {
                        wins.fetch_add(1, Ordering::SeqCst);
                    }
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        // 100 distinct keys, each won exactly once across 16 threads.
        assert_eq!(wins.load(Ordering::SeqCst), 100);
        assert_eq!(store.len(), 100);
    }
}
