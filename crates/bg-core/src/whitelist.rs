//! Per-site, per-feature whitelist
//!
//! A whitelist maps a site (exact host, or the wildcard `"*"`) to the
//! activation state of each feature. Site entries override the wildcard
//! entry; a feature absent from both is not whitelisted.
//!
//! The store is swapped as a whole so a concurrent reader sees either the old
//! or the new whitelist, never a mix of both.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::Deserialize;

use crate::types::FeatureKey;

/// Site key of the entry that applies to every site.
pub const WILDCARD_SITE: &str = "*";

/// Activation of one feature at one site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(from = "i64")]
pub enum ActivationState {
    Active,
    Inactive,
}

impl From<i64> for ActivationState {
    /// `1` is active; every other value is inactive.
    fn from(raw: i64) -> Self {
        if raw == 1 {
            Self::Active
        } else {
            Self::Inactive
        }
    }
}

pub type ActivationMap = HashMap<FeatureKey, ActivationState>;

/// Site → feature → activation. Site keys are stored lowercased without a trailing dot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "HashMap<String, ActivationMap>")]
pub struct Whitelist {
    sites: HashMap<String, ActivationMap>,
}

impl From<HashMap<String, ActivationMap>> for Whitelist {
    fn from(sites: HashMap<String, ActivationMap>) -> Self {
        sites.into_iter().collect()
    }
}

impl FromIterator<(String, ActivationMap)> for Whitelist {
    fn from_iter<I: IntoIterator<Item = (String, ActivationMap)>>(iter: I) -> Self {
        let mut whitelist = Self::default();
        for (site, features) in iter {
            whitelist.sites.entry(site_key(&site)).or_default().extend(features);
        }
        whitelist
    }
}

impl Whitelist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the activation of `feature` at `site`.
    pub fn set(&mut self, site: &str, feature: impl Into<FeatureKey>, state: ActivationState) -> &mut Self {
        self.sites
            .entry(site_key(site))
            .or_default()
            .insert(feature.into(), state);
        self
    }

    /// Activation map for an exact host. A trailing dot is ignored.
    pub fn site(&self, host: &str) -> Option<&ActivationMap> {
        let host = host.trim_end_matches('.');
        if host.bytes().any(|b| b.is_ascii_uppercase()) {
            self.sites.get(&host.to_ascii_lowercase())
        } else {
            self.sites.get(host)
        }
    }

    /// Activation map of the wildcard site.
    pub fn generic(&self) -> Option<&ActivationMap> {
        self.sites.get(WILDCARD_SITE)
    }

    /// Whether `feature` is whitelisted on `host`.
    pub fn is_whitelisted(&self, feature: &str, host: &str) -> bool {
        is_whitelisted(feature, self.site(host), self.generic())
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}

fn site_key(site: &str) -> String {
    site.trim_end_matches('.').to_ascii_lowercase()
}

/// Resolve whitelisting of `feature`: the site map decides if it has an
/// entry, otherwise the generic map, otherwise not whitelisted.
pub fn is_whitelisted(feature: &str, site: Option<&ActivationMap>, generic: Option<&ActivationMap>) -> bool {
    if let Some(state) = site.and_then(|map| map.get(feature)) {
        return *state == ActivationState::Active;
    }
    if let Some(state) = generic.and_then(|map| map.get(feature)) {
        return *state == ActivationState::Active;
    }
    false
}

// =============================================================================
// Store
// =============================================================================

/// Atomically replaceable whitelist snapshot.
#[derive(Debug, Default)]
pub struct WhitelistStore {
    current: ArcSwap<Whitelist>,
}

impl WhitelistStore {
    pub fn new(whitelist: Whitelist) -> Self {
        Self {
            current: ArcSwap::from_pointee(whitelist),
        }
    }

    /// Replace the whole whitelist. `None` leaves the current one in place.
    /// Returns whether a replacement happened.
    pub fn replace(&self, whitelist: Option<Whitelist>) -> bool {
        match whitelist {
            Some(whitelist) => {
                self.current.store(Arc::new(whitelist));
                true
            }
            None => false,
        }
    }

    /// The current snapshot. Hold on to it for the duration of one decision.
    pub fn load(&self) -> Arc<Whitelist> {
        self.current.load_full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, ActivationState)]) -> ActivationMap {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_site_entry_is_final() {
        let site = map(&[("ads", ActivationState::Inactive)]);
        let generic = map(&[("ads", ActivationState::Active)]);
        assert!(!is_whitelisted("ads", Some(&site), Some(&generic)));

        let site = map(&[("ads", ActivationState::Active)]);
        let generic = map(&[("ads", ActivationState::Inactive)]);
        assert!(is_whitelisted("ads", Some(&site), Some(&generic)));
    }

    #[test]
    fn test_generic_entry_applies_without_site_entry() {
        let site = map(&[("other", ActivationState::Inactive)]);
        let generic = map(&[("ads", ActivationState::Active)]);
        assert!(is_whitelisted("ads", Some(&site), Some(&generic)));
        assert!(is_whitelisted("ads", None, Some(&generic)));
    }

    #[test]
    fn test_absent_everywhere_is_not_whitelisted() {
        assert!(!is_whitelisted("ads", None, None));
        let generic = map(&[("trackers", ActivationState::Active)]);
        assert!(!is_whitelisted("ads", None, Some(&generic)));
    }

    #[test]
    fn test_activation_from_integer() {
        assert_eq!(ActivationState::from(1), ActivationState::Active);
        assert_eq!(ActivationState::from(0), ActivationState::Inactive);
        assert_eq!(ActivationState::from(7), ActivationState::Inactive);
    }

    #[test]
    fn test_deserialize_whitelist() {
        let whitelist: Whitelist =
            serde_json::from_str(r#"{"Shop.Example.com": {"ads": 1}, "*": {"ads": 0, "trackers": 1}}"#).unwrap();
        assert_eq!(whitelist.len(), 2);
        assert!(whitelist.is_whitelisted("ads", "shop.example.com"));
        assert!(whitelist.is_whitelisted("ads", "SHOP.example.com"));
        assert!(!whitelist.is_whitelisted("ads", "other.com"));
        assert!(whitelist.is_whitelisted("trackers", "other.com"));
    }

    #[test]
    fn test_site_lookup_ignores_trailing_dot() {
        let mut whitelist = Whitelist::new();
        whitelist.set("shop.example.com", "ads", ActivationState::Active);
        whitelist.set("news.example.org.", "ads", ActivationState::Active);
        assert!(whitelist.site("shop.example.com.").is_some());
        assert!(whitelist.is_whitelisted("ads", "news.example.org"));
        assert!(whitelist.is_whitelisted("ads", "Shop.Example.com."));
        assert!(!whitelist.is_whitelisted("ads", "other.com."));
    }

    #[test]
    fn test_store_replace() {
        let store = WhitelistStore::new(Whitelist::new());
        let before = store.load();

        let mut next = Whitelist::new();
        next.set(WILDCARD_SITE, "ads", ActivationState::Active);
        assert!(store.replace(Some(next)));
        assert!(store.load().is_whitelisted("ads", "any.com"));

        // Earlier snapshots are unaffected
        assert!(!before.is_whitelisted("ads", "any.com"));

        assert!(!store.replace(None));
        assert!(store.load().is_whitelisted("ads", "any.com"));
    }
}
