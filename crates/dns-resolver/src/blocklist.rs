//! Domain blocklist membership test ("adblock"), per §4.3.
//!
//! Membership uses dot-aligned suffix semantics, not substring
//! matching: blocking `ads.example.com` blocks `x.ads.example.com`
//! but not `fooads.example.com`. Lookup walks from the full name up
//! through its parent domains, checking each against a hash set --
//! O(labels), same complexity as a reverse-label trie but far simpler
//! to build from a flat list.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::ResolveError;
use crate::normalize::name_key;

#[derive(Debug, Clone, Default)]
pub struct Blocklist {
    entries: Arc<HashSet<String>>,
}

impl Blocklist {
    pub fn new(domains: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        Blocklist {
            entries: Arc::new(domains.into_iter().map(|d| name_key(d.as_ref())).collect()),
        }
    }

    pub fn empty() -> Self {
        Blocklist::new(Vec::<String>::new())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Is `name` blocked, either directly or via a dot-aligned
    /// suffix?
    pub fn is_blocked(&self, name: &str) -> bool {
        let key = name_key(name);
        if self.entries.contains(&key) {
            return true;
        }
        let mut rest = key.as_str();
        while let Some(idx) = rest.find('.') {
            rest = &rest[idx + 1..];
            if self.entries.contains(rest) {
                return true;
            }
        }
        false
    }

    /// Replace the whole blocklist from a freshly-loaded domain list.
    /// A loader error should be reported as `BlocklistLoadFailure`
    /// without calling this, so the previous blocklist is kept.
    pub fn reload(domains: Vec<String>) -> Result<Self, ResolveError> {
        if domains.iter().any(|d| name_key(d).is_empty()) {
            return Err(ResolveError::BlocklistLoadFailure(
                "blocklist contains an empty entry".into(),
            ));
        }
        Ok(Blocklist::new(domains))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_exact_match() {
        let bl = Blocklist::new(["ads.example.com"]);
        assert!(bl.is_blocked("ads.example.com"));
    }

    #[test]
    fn blocks_subdomain() {
        let bl = Blocklist::new(["ads.example.com"]);
        assert!(bl.is_blocked("x.ads.example.com"));
        assert!(bl.is_blocked("y.x.ads.example.com"));
    }

    #[test]
    fn does_not_block_sibling_with_shared_suffix() {
        let bl = Blocklist::new(["ads.example.com"]);
        assert!(!bl.is_blocked("fooads.example.com"));
    }

    #[test]
    fn does_not_block_unrelated_domain() {
        let bl = Blocklist::new(["ads.example.com"]);
        assert!(!bl.is_blocked("example.org"));
    }

    #[test]
    fn is_case_and_dot_insensitive() {
        let bl = Blocklist::new(["Ads.Example.com."]);
        assert!(bl.is_blocked("ADS.EXAMPLE.COM"));
    }

    #[test]
    fn reload_rejects_empty_entries() {
        assert!(Blocklist::reload(vec!["".to_string()]).is_err());
    }
}
