//! Request matching against a loaded rule set
//!
//! Exception rules always win over block rules. Host rules are looked up for
//! the request host and every parent domain; pattern rules are scanned.

use std::borrow::Cow;

use crate::hash::hash_host;
use crate::types::{BlockRequest, ContentType};
use crate::url::{get_host_position, host_suffixes, is_third_party};

use super::format::{AnchorFlags, PartyMask, RuleAction};
use super::loader::RuleSet;

/// Outcome of matching a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchResult {
    /// A block rule matched and no exception overrode it
    pub matched: bool,
    /// An exception rule matched
    pub exception: bool,
}

/// Matches requests against an owned [`RuleSet`].
#[derive(Debug)]
pub struct RuleMatcher {
    rules: RuleSet,
}

impl RuleMatcher {
    pub fn new(rules: RuleSet) -> Self {
        Self { rules }
    }

    pub fn rule_set(&self) -> &RuleSet {
        &self.rules
    }

    /// Match a request and return the outcome.
    pub fn check(&self, req: &BlockRequest<'_>) -> MatchResult {
        let req_host = req.request_host();
        let party = if is_third_party(req_host, req.site_host()) {
            PartyMask::THIRD_PARTY
        } else {
            PartyMask::FIRST_PARTY
        };
        let applies = |rule_party: PartyMask, rule_types: ContentType| {
            rule_party.intersects(party) && rule_types.intersects(req.content_type)
        };

        let mut blocked = false;

        for suffix in host_suffixes(req_host) {
            for rule in self.rules.host_rules_for(hash_host(suffix)) {
                if !applies(rule.party, rule.types) {
                    continue;
                }
                match rule.action {
                    RuleAction::Allow => return MatchResult { matched: false, exception: true },
                    RuleAction::Block => blocked = true,
                }
            }
        }

        let url = lowercase(req.request_url);
        let url = url.as_bytes();
        let host_range = get_host_position(req.request_url);

        for rule in self.rules.pattern_rules() {
            if !applies(rule.party, rule.types) {
                continue;
            }
            // Once blocked, only an exception can change the outcome.
            if blocked && rule.action == RuleAction::Block {
                continue;
            }
            if !pattern_matches(rule.pattern, rule.anchors, url, host_range) {
                continue;
            }
            match rule.action {
                RuleAction::Allow => return MatchResult { matched: false, exception: true },
                RuleAction::Block => blocked = true,
            }
        }

        MatchResult {
            matched: blocked,
            exception: false,
        }
    }
}

fn lowercase(s: &str) -> Cow<'_, str> {
    if s.bytes().any(|b| b.is_ascii_uppercase()) {
        Cow::Owned(s.to_ascii_lowercase())
    } else {
        Cow::Borrowed(s)
    }
}

// =============================================================================
// Pattern Matching
// =============================================================================

/// ABP separator: anything but a letter, a digit, or one of `_ - . %`.
#[inline]
fn is_separator(b: u8) -> bool {
    !(b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.' | b'%'))
}

/// Match `segment` at `pos`, returning the end position.
/// `^` consumes one separator, or nothing at the end of the URL.
fn match_at(url: &[u8], pos: usize, segment: &[u8]) -> Option<usize> {
    let mut i = pos;
    for &c in segment {
        if c == b'^' {
            if i == url.len() {
                continue;
            }
            if !is_separator(url[i]) {
                return None;
            }
        } else if i >= url.len() || url[i] != c {
            return None;
        }
        i += 1;
    }
    Some(i)
}

/// Whether a lowercased pattern matches a lowercased URL.
pub fn pattern_matches(pattern: &[u8], anchors: AnchorFlags, url: &[u8], host_range: Option<(usize, usize)>) -> bool {
    if pattern.is_empty() {
        return false;
    }

    let segments: Vec<&[u8]> = pattern.split(|&b| b == b'*').collect();
    let last = segments.len() - 1;
    let mut cursor = 0usize;

    for (idx, segment) in segments.iter().enumerate() {
        let must_end = idx == last && anchors.contains(AnchorFlags::RIGHT);

        let starts: Box<dyn Iterator<Item = usize> + '_> = if idx == 0 && anchors.contains(AnchorFlags::LEFT) {
            Box::new(std::iter::once(0))
        } else if idx == 0 && anchors.contains(AnchorFlags::HOST) {
            let Some((host_start, host_end)) = host_range else {
                return false;
            };
            Box::new(
                std::iter::once(host_start)
                    .chain((host_start..host_end).filter(move |&i| url[i] == b'.').map(|i| i + 1)),
            )
        } else {
            Box::new(cursor..=url.len())
        };

        let mut found = None;
        for start in starts {
            if let Some(end) = match_at(url, start, segment) {
                if !must_end || end == url.len() {
                    found = Some(end);
                    break;
                }
            }
        }

        match found {
            Some(end) => cursor = end,
            None => return false,
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ruleset::{HostRule, PatternRule, RuleSetBuilder};

    fn matches(pattern: &str, anchors: AnchorFlags, url: &str) -> bool {
        pattern_matches(pattern.as_bytes(), anchors, url.as_bytes(), get_host_position(url))
    }

    #[test]
    fn test_pattern_substring_and_wildcard() {
        assert!(matches("/ads/", AnchorFlags::empty(), "https://example.com/ads/banner.js"));
        assert!(matches("/ads/*.js", AnchorFlags::empty(), "https://example.com/ads/x/banner.js"));
        assert!(!matches("/ads/*.png", AnchorFlags::empty(), "https://example.com/ads/banner.js"));
    }

    #[test]
    fn test_pattern_separator() {
        assert!(matches("track^", AnchorFlags::empty(), "https://example.com/track?id=1"));
        assert!(matches("track^", AnchorFlags::empty(), "https://example.com/track"));
        assert!(!matches("track^", AnchorFlags::empty(), "https://example.com/tracking"));
    }

    #[test]
    fn test_pattern_anchors() {
        assert!(matches("https://ads.", AnchorFlags::LEFT, "https://ads.example.com/"));
        assert!(!matches("ads.", AnchorFlags::LEFT, "https://ads.example.com/"));
        assert!(matches(".js", AnchorFlags::RIGHT, "https://example.com/a.js"));
        assert!(!matches(".js", AnchorFlags::RIGHT, "https://example.com/a.js?v=1"));
        assert!(matches("example.com/ads", AnchorFlags::HOST, "https://cdn.example.com/ads/1.gif"));
        assert!(!matches("example.com/ads", AnchorFlags::HOST, "https://badexample.com/ads/1.gif"));
    }

    fn matcher() -> RuleMatcher {
        let mut builder = RuleSetBuilder::new();
        builder.block_host("ads.example.com");
        builder.add_host_rule(HostRule {
            host: "tracker.net".to_string(),
            action: RuleAction::Block,
            party: PartyMask::THIRD_PARTY,
            types: ContentType::SCRIPT,
        });
        builder.add_pattern_rule(PatternRule {
            pattern: "/pixel.gif".to_string(),
            action: RuleAction::Block,
            anchors: AnchorFlags::empty(),
            party: PartyMask::ALL,
            types: ContentType::ALL,
        });
        builder.add_pattern_rule(PatternRule {
            pattern: "ads.example.com/allowed/".to_string(),
            action: RuleAction::Allow,
            anchors: AnchorFlags::HOST,
            party: PartyMask::ALL,
            types: ContentType::ALL,
        });
        RuleMatcher::new(RuleSet::load(builder.build()).expect("rule set should load"))
    }

    #[test]
    fn test_host_rule_covers_subdomains() {
        let matcher = matcher();
        let req = BlockRequest::new(Some("https://shop.com/"), "https://cdn.ads.example.com/a.js", ContentType::SCRIPT);
        assert!(matcher.check(&req).matched);

        let req = BlockRequest::new(Some("https://shop.com/"), "https://example.com/a.js", ContentType::SCRIPT);
        assert!(!matcher.check(&req).matched);
    }

    #[test]
    fn test_party_and_type_options() {
        let matcher = matcher();
        let third = BlockRequest::new(Some("https://shop.com/"), "https://tracker.net/t.js", ContentType::SCRIPT);
        assert!(matcher.check(&third).matched);

        let first = BlockRequest::new(Some("https://www.tracker.net/"), "https://tracker.net/t.js", ContentType::SCRIPT);
        assert!(!matcher.check(&first).matched);

        let image = BlockRequest::new(Some("https://shop.com/"), "https://tracker.net/t.png", ContentType::IMAGE);
        assert!(!matcher.check(&image).matched);
    }

    #[test]
    fn test_exception_wins() {
        let matcher = matcher();
        let req = BlockRequest::new(Some("https://shop.com/"), "https://ads.example.com/allowed/x.js", ContentType::SCRIPT);
        let result = matcher.check(&req);
        assert!(!result.matched);
        assert!(result.exception);
    }

    #[test]
    fn test_pattern_rule_case_insensitive() {
        let matcher = matcher();
        let req = BlockRequest::new(None, "https://Example.com/PIXEL.GIF", ContentType::IMAGE);
        assert!(matcher.check(&req).matched);
    }
}
