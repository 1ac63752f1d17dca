use std::collections::HashSet;

use crate::types::{BlockDecision, BlockRequest};

/// Blocks requests whose host is exactly one of a fixed set of hostnames.
///
/// A request URL without a parsable host is allowed.
#[derive(Debug, Clone, Default)]
pub struct HostSetEngine {
    hosts: HashSet<String>,
}

impl HostSetEngine {
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let hosts = hosts
            .into_iter()
            .map(|host| host.as_ref().trim().trim_end_matches('.').to_ascii_lowercase())
            .filter(|host| !host.is_empty())
            .collect();
        Self { hosts }
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn contains(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.');
        if host.bytes().any(|b| b.is_ascii_uppercase()) {
            self.hosts.contains(&host.to_ascii_lowercase())
        } else {
            self.hosts.contains(host)
        }
    }

    pub fn decide(&self, req: &BlockRequest<'_>) -> BlockDecision {
        let host = req.request_host();
        if !host.is_empty() && self.contains(host) {
            BlockDecision::Block
        } else {
            BlockDecision::Allow
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ContentType;

    fn req(url: &str) -> BlockRequest<'_> {
        BlockRequest::new(Some("https://shop.example.com/"), url, ContentType::SCRIPT)
    }

    #[test]
    fn test_exact_membership() {
        let engine = HostSetEngine::new(["ads.example.com"]);
        assert_eq!(engine.decide(&req("http://ads.example.com/banner.js")), BlockDecision::Block);
        assert_eq!(engine.decide(&req("http://cdn.ads.example.com/banner.js")), BlockDecision::Allow);
        assert_eq!(engine.decide(&req("http://example.com/banner.js")), BlockDecision::Allow);
    }

    #[test]
    fn test_case_insensitive() {
        let engine = HostSetEngine::new(["Ads.Example.com."]);
        assert_eq!(engine.len(), 1);
        assert_eq!(engine.decide(&req("http://ADS.example.com/")), BlockDecision::Block);
    }

    #[test]
    fn test_trailing_dot_in_request_host() {
        let engine = HostSetEngine::new(["ads.example.com"]);
        assert!(engine.contains("ads.example.com."));
        assert_eq!(engine.decide(&req("http://ads.example.com./banner.js")), BlockDecision::Block);
        assert_eq!(engine.decide(&req("http://./banner.js")), BlockDecision::Allow);
    }

    #[test]
    fn test_malformed_url_is_allowed() {
        let engine = HostSetEngine::new(["ads.example.com", ""]);
        assert_eq!(engine.len(), 1);
        assert_eq!(engine.decide(&req("ads.example.com/banner.js")), BlockDecision::Allow);
        assert_eq!(engine.decide(&req("")), BlockDecision::Allow);
    }
}
