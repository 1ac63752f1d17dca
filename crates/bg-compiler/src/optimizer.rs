use std::collections::HashSet;

use crate::parser::CompiledRule;

pub struct OptimizeStats {
    pub before: usize,
    pub after: usize,
    pub deduped: usize,
}

/// Drop duplicate rules, keeping the first occurrence. The list a rule came
/// from does not make it distinct.
pub fn optimize_rules(rules: &mut Vec<CompiledRule>) -> OptimizeStats {
    let before = rules.len();

    let mut seen: HashSet<CompiledRule> = HashSet::new();
    rules.retain(|rule| {
        let key = CompiledRule {
            list_id: 0,
            ..rule.clone()
        };
        seen.insert(key)
    });

    let after = rules.len();

    OptimizeStats {
        before,
        after,
        deduped: before - after,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_filter_list;

    #[test]
    fn removes_duplicates_across_lists() {
        let mut rules = parse_filter_list("||ads.example.com^\n0.0.0.0 ads.example.com\n||other.com^");
        let mut second = parse_filter_list("||ads.example.com^");
        for rule in &mut second {
            rule.list_id = 1;
        }
        rules.extend(second);

        let stats = optimize_rules(&mut rules);
        assert_eq!(stats.before, 4);
        assert_eq!(stats.after, 2);
        assert_eq!(stats.deduped, 2);
        assert_eq!(rules[0].list_id, 0);
    }

    #[test]
    fn keeps_rules_that_differ_in_action() {
        let mut rules = parse_filter_list("||ads.example.com^\n@@||ads.example.com^");
        let stats = optimize_rules(&mut rules);
        assert_eq!(stats.deduped, 0);
        assert_eq!(rules.len(), 2);
    }
}
