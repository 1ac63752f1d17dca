use bg_core::ruleset::{HostRule, PatternRule, RuleSetBuilder};

use crate::parser::{CompiledRule, RulePattern};

/// Serialize parsed rules into a CRS rule file.
pub fn build_rule_set(rules: &[CompiledRule]) -> Vec<u8> {
    rule_set_builder(rules).build()
}

pub fn rule_set_builder(rules: &[CompiledRule]) -> RuleSetBuilder {
    let mut builder = RuleSetBuilder::new();
    for rule in rules {
        match &rule.pattern {
            RulePattern::Host(host) => {
                builder.add_host_rule(HostRule {
                    host: host.clone(),
                    action: rule.action,
                    party: rule.party,
                    types: rule.types,
                });
            }
            RulePattern::Url { pattern, anchors } => {
                builder.add_pattern_rule(PatternRule {
                    pattern: pattern.clone(),
                    action: rule.action,
                    anchors: *anchors,
                    party: rule.party,
                    types: rule.types,
                });
            }
        }
    }
    builder
}
