use std::net::IpAddr;

use bg_core::ruleset::{AnchorFlags, PartyMask, RuleAction};
use bg_core::types::ContentType;

/// What a rule matches on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RulePattern {
    /// Request host or any of its subdomains
    Host(String),
    /// URL pattern with `*` and `^`, anchors stripped into flags
    Url { pattern: String, anchors: AnchorFlags },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompiledRule {
    pub action: RuleAction,
    pub pattern: RulePattern,
    pub list_id: u16,
    pub types: ContentType,
    pub party: PartyMask,
}

#[derive(Debug, Clone, Copy)]
struct ParsedOptions {
    types: ContentType,
    party: PartyMask,
}

impl Default for ParsedOptions {
    fn default() -> Self {
        Self {
            types: ContentType::ALL,
            party: PartyMask::ALL,
        }
    }
}

pub fn parse_filter_list(text: &str) -> Vec<CompiledRule> {
    let mut rules = Vec::new();
    let mut skipped = 0usize;

    for raw_line in text.lines() {
        let mut line = raw_line.trim();
        if line.is_empty() || is_comment_line(line) {
            continue;
        }

        // Cosmetic rules have no effect on network requests
        if line.contains("##") || line.contains("#@#") || line.contains("#?#") {
            continue;
        }

        match parse_line(&mut line) {
            Some(rule) => rules.push(rule),
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        log::debug!("Skipped {} unsupported filter lines", skipped);
    }

    rules
}

fn parse_line(line: &mut &str) -> Option<CompiledRule> {
    let mut action = RuleAction::Block;
    if let Some(rest) = line.strip_prefix("@@") {
        action = RuleAction::Allow;
        *line = rest.trim_start();
    }

    let (pattern_part, options_text) = split_rule_options(line);
    let options = match options_text {
        Some(options_text) => parse_options(options_text)?,
        None => ParsedOptions::default(),
    };

    let pattern_str = pattern_part.trim();

    let pattern = if let Some(domain) = parse_host_anchor_rule(pattern_str) {
        RulePattern::Host(domain)
    } else if let Some(domain) = parse_hosts_file_domain(pattern_str) {
        RulePattern::Host(domain)
    } else {
        parse_url_pattern(pattern_str)?
    };

    Some(CompiledRule {
        action,
        pattern,
        list_id: 0,
        types: options.types,
        party: options.party,
    })
}

fn split_rule_options(line: &str) -> (&str, Option<&str>) {
    match line.find('$') {
        Some(pos) => (&line[..pos], Some(&line[pos + 1..])),
        None => (line, None),
    }
}

fn parse_options(text: &str) -> Option<ParsedOptions> {
    let mut type_include = ContentType::empty();
    let mut type_exclude = ContentType::empty();
    let mut party = PartyMask::ALL;

    for raw in text.trim().split(',') {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }

        let (negated, name) = match raw.strip_prefix('~') {
            Some(name) => (true, name),
            None => (false, raw),
        };

        match (negated, name) {
            (false, "third-party" | "3p") | (true, "first-party" | "1p") => party = PartyMask::THIRD_PARTY,
            (true, "third-party" | "3p") | (false, "first-party" | "1p") => party = PartyMask::FIRST_PARTY,
            _ => {
                let ty = parse_type_option(name)?;
                if negated {
                    type_exclude |= ty;
                } else {
                    type_include |= ty;
                }
            }
        }
    }

    let mut types = if type_include.is_empty() {
        ContentType::ALL
    } else {
        type_include
    };
    types.remove(type_exclude);
    if types.is_empty() {
        return None;
    }

    Some(ParsedOptions { types, party })
}

fn parse_type_option(name: &str) -> Option<ContentType> {
    let ty = match name {
        "script" => ContentType::SCRIPT,
        "image" => ContentType::IMAGE,
        "stylesheet" | "css" => ContentType::STYLESHEET,
        "object" => ContentType::OBJECT,
        "subdocument" | "frame" => ContentType::SUBDOCUMENT,
        "document" | "doc" => ContentType::DOCUMENT,
        "xmlhttprequest" | "xhr" => ContentType::XMLHTTPREQUEST,
        "websocket" => ContentType::WEBSOCKET,
        "font" => ContentType::FONT,
        "media" => ContentType::MEDIA,
        "ping" => ContentType::PING,
        "other" => ContentType::OTHER,
        _ => return None,
    };
    Some(ty)
}

fn is_comment_line(line: &str) -> bool {
    line.starts_with('!') || line.starts_with('[') || line.starts_with('#')
}

fn parse_host_anchor_rule(line: &str) -> Option<String> {
    let rest = line.strip_prefix("||")?;
    let rest = rest.strip_prefix('.').unwrap_or(rest);

    let mut end = rest.len();
    for (i, ch) in rest.char_indices() {
        if ch == '^' || ch == '|' {
            end = i;
            break;
        }
        if ch == '/' || ch == '?' || ch == '#' || ch == ':' || ch == '*' {
            return None;
        }
    }

    // Only a trailing separator or anchor may follow the host
    if !matches!(&rest[end..], "" | "^" | "|" | "^|") {
        return None;
    }

    normalize_domain(&rest[..end])
}

fn parse_hosts_file_domain(line: &str) -> Option<String> {
    let mut parts = line.split_whitespace();
    let first = parts.next()?;
    let second = parts.next()?;

    if first.parse::<IpAddr>().is_ok() && !matches!(second, "localhost" | "localhost.localdomain" | "broadcasthost") {
        return normalize_domain(second);
    }

    None
}

fn parse_url_pattern(line: &str) -> Option<RulePattern> {
    // Regex rules are not supported
    if line.len() > 1 && line.starts_with('/') && line.ends_with('/') {
        return None;
    }
    if line.contains(char::is_whitespace) {
        return None;
    }

    let mut anchors = AnchorFlags::empty();
    let mut pattern = line;

    if let Some(rest) = pattern.strip_prefix("||") {
        anchors |= AnchorFlags::HOST;
        pattern = rest;
    } else if let Some(rest) = pattern.strip_prefix('|') {
        anchors |= AnchorFlags::LEFT;
        pattern = rest;
    }

    if let Some(rest) = pattern.strip_suffix('|') {
        anchors |= AnchorFlags::RIGHT;
        pattern = rest;
    }

    if pattern.trim_matches('*').is_empty() {
        return None;
    }

    Some(RulePattern::Url {
        pattern: pattern.to_ascii_lowercase(),
        anchors,
    })
}

fn normalize_domain(host: &str) -> Option<String> {
    let trimmed = host.trim().trim_matches('.');
    if trimmed.is_empty() {
        return None;
    }

    if !trimmed
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-' || b == b'_')
    {
        return None;
    }

    Some(trimmed.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(rule: &CompiledRule) -> Option<&str> {
        match &rule.pattern {
            RulePattern::Host(host) => Some(host),
            RulePattern::Url { .. } => None,
        }
    }

    #[test]
    fn parses_host_anchor_rules() {
        let rules = parse_filter_list("||Ads.Example.com^\n||.tracker.net");
        assert_eq!(rules.len(), 2);
        assert_eq!(host(&rules[0]), Some("ads.example.com"));
        assert_eq!(host(&rules[1]), Some("tracker.net"));
        assert_eq!(rules[0].action, RuleAction::Block);
        assert_eq!(rules[0].types, ContentType::ALL);
    }

    #[test]
    fn parses_hosts_file_lines() {
        let rules = parse_filter_list("127.0.0.1 localhost\n0.0.0.0 ads.example.com\n::1 pixel.example.net # comment");
        let hosts: Vec<_> = rules.iter().filter_map(host).collect();
        assert_eq!(hosts, vec!["ads.example.com", "pixel.example.net"]);
    }

    #[test]
    fn skips_comments_and_cosmetics() {
        let rules = parse_filter_list("! title\n[Adblock Plus 2.0]\n# hosts comment\nexample.com##.ad\n\n");
        assert!(rules.is_empty());
    }

    #[test]
    fn parses_exceptions_and_options() {
        let rules = parse_filter_list("@@||cdn.example.com^$script,~third-party");
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].action, RuleAction::Allow);
        assert_eq!(rules[0].types, ContentType::SCRIPT);
        assert_eq!(rules[0].party, PartyMask::FIRST_PARTY);
    }

    #[test]
    fn negated_types_are_removed() {
        let rules = parse_filter_list("/banner.$~image,third-party");
        assert_eq!(rules.len(), 1);
        assert!(!rules[0].types.contains(ContentType::IMAGE));
        assert!(rules[0].types.contains(ContentType::SCRIPT));
        assert_eq!(rules[0].party, PartyMask::THIRD_PARTY);
    }

    #[test]
    fn unknown_options_drop_the_rule() {
        assert!(parse_filter_list("||ads.example.com^$redirect=noop.js").is_empty());
    }

    #[test]
    fn parses_url_patterns() {
        let rules = parse_filter_list("||example.com/ads/*.gif|\n|https://pixel.\n/track^");
        assert_eq!(
            rules[0].pattern,
            RulePattern::Url {
                pattern: "example.com/ads/*.gif".to_string(),
                anchors: AnchorFlags::HOST | AnchorFlags::RIGHT,
            }
        );
        assert_eq!(
            rules[1].pattern,
            RulePattern::Url {
                pattern: "https://pixel.".to_string(),
                anchors: AnchorFlags::LEFT,
            }
        );
        assert_eq!(
            rules[2].pattern,
            RulePattern::Url {
                pattern: "/track^".to_string(),
                anchors: AnchorFlags::empty(),
            }
        );
    }

    #[test]
    fn rejects_regex_and_empty_patterns() {
        assert!(parse_filter_list("/ads[0-9]+/\n*\n||").is_empty());
    }
}
