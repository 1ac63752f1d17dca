//! CRS rule file writer

use std::collections::HashMap;

use crate::hash::{crc32, hash_host};
use crate::types::ContentType;

use super::format::*;

/// A rule keyed on the request host (and its subdomains).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostRule {
    pub host: String,
    pub action: RuleAction,
    pub party: PartyMask,
    pub types: ContentType,
}

/// A rule matched against the full request URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PatternRule {
    /// Pattern text with `*` wildcards and `^` separators, anchors stripped
    pub pattern: String,
    pub action: RuleAction,
    pub anchors: AnchorFlags,
    pub party: PartyMask,
    pub types: ContentType,
}

/// Accumulates rules and serializes them into a CRS1 file.
#[derive(Debug, Default)]
pub struct RuleSetBuilder {
    build_id: u32,
    host_rules: Vec<HostRule>,
    pattern_rules: Vec<PatternRule>,
}

impl RuleSetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_build_id(mut self, build_id: u32) -> Self {
        self.build_id = build_id;
        self
    }

    pub fn add_host_rule(&mut self, rule: HostRule) -> &mut Self {
        self.host_rules.push(rule);
        self
    }

    pub fn add_pattern_rule(&mut self, rule: PatternRule) -> &mut Self {
        self.pattern_rules.push(rule);
        self
    }

    /// Shorthand for a block rule on `host` covering every content type and party.
    #[cfg(test)]
    pub(crate) fn block_host(&mut self, host: &str) -> &mut Self {
        self.add_host_rule(HostRule {
            host: host.to_string(),
            action: RuleAction::Block,
            party: PartyMask::ALL,
            types: ContentType::ALL,
        })
    }

    pub fn rule_count(&self) -> usize {
        self.host_rules.len() + self.pattern_rules.len()
    }

    pub fn build(&self) -> Vec<u8> {
        let mut str_pool = StringPool::new();
        let host_rules = build_host_rules_section(&self.host_rules);
        let pattern_rules = build_pattern_rules_section(&self.pattern_rules, &mut str_pool);

        let mut sections = vec![
            SectionData::new(SectionId::StrPool, str_pool.build()),
            SectionData::new(SectionId::HostRules, host_rules),
            SectionData::new(SectionId::PatternRules, pattern_rules),
        ];

        let section_count = sections.len();
        let section_dir_offset = HEADER_SIZE;
        let mut data_offset = align_offset(section_dir_offset + section_count * SECTION_ENTRY_SIZE, 8);

        for section in &mut sections {
            section.offset = data_offset;
            data_offset = align_offset(data_offset + section.data.len(), 8);
        }

        let mut buffer = vec![0u8; data_offset];

        buffer[header::MAGIC..header::MAGIC + 4].copy_from_slice(&CRS_MAGIC);
        write_u16_le(&mut buffer, header::VERSION, CRS_VERSION);
        write_u16_le(&mut buffer, header::FLAGS, header_flags::HAS_CRC32);
        write_u32_le(&mut buffer, header::SECTION_COUNT, section_count as u32);
        write_u32_le(&mut buffer, header::SECTION_DIR_OFFSET, section_dir_offset as u32);
        write_u32_le(&mut buffer, header::BUILD_ID, self.build_id);

        for (index, section) in sections.iter().enumerate() {
            let entry_offset = section_dir_offset + index * SECTION_ENTRY_SIZE;
            write_u16_le(&mut buffer, entry_offset + section_entry::ID, section.id as u16);
            write_u16_le(&mut buffer, entry_offset + section_entry::FLAGS, 0);
            write_u32_le(&mut buffer, entry_offset + section_entry::OFFSET, section.offset as u32);
            write_u32_le(&mut buffer, entry_offset + section_entry::LENGTH, section.data.len() as u32);

            let end = section.offset + section.data.len();
            buffer[section.offset..end].copy_from_slice(&section.data);
        }

        // The CRC field is still zero here, which is what the loader hashes in its place.
        let checksum = crc32(&buffer);
        write_u32_le(&mut buffer, header::CRC32, checksum);

        buffer
    }
}

struct SectionData {
    id: SectionId,
    data: Vec<u8>,
    offset: usize,
}

impl SectionData {
    fn new(id: SectionId, data: Vec<u8>) -> Self {
        Self { id, data, offset: 0 }
    }
}

struct StringPool {
    data: Vec<u8>,
    index: HashMap<String, u32>,
}

impl StringPool {
    fn new() -> Self {
        Self {
            data: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn intern(&mut self, s: &str) -> (u32, u16) {
        if let Some(&offset) = self.index.get(s) {
            return (offset, s.len() as u16);
        }
        let offset = self.data.len() as u32;
        self.data.extend_from_slice(s.as_bytes());
        self.index.insert(s.to_string(), offset);
        (offset, s.len() as u16)
    }

    fn build(self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + self.data.len());
        buf.extend_from_slice(&(self.data.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.data);
        buf
    }
}

fn build_host_rules_section(rules: &[HostRule]) -> Vec<u8> {
    let mut hashed: Vec<(u64, &HostRule)> = rules.iter().map(|rule| (hash_host(&rule.host), rule)).collect();
    hashed.sort_by_key(|(hash, _)| *hash);

    let mut buf = vec![0u8; 4 + hashed.len() * HOST_RULE_SIZE];
    write_u32_le(&mut buf, 0, hashed.len() as u32);
    for (i, (hash, rule)) in hashed.iter().enumerate() {
        let base = 4 + i * HOST_RULE_SIZE;
        write_u64_le(&mut buf, base + host_rule::HASH, *hash);
        buf[base + host_rule::ACTION] = rule.action as u8;
        buf[base + host_rule::PARTY] = rule.party.bits();
        write_u32_le(&mut buf, base + host_rule::TYPE_MASK, rule.types.bits());
    }
    buf
}

fn build_pattern_rules_section(rules: &[PatternRule], str_pool: &mut StringPool) -> Vec<u8> {
    // Patterns longer than u16::MAX bytes cannot be addressed and are dropped.
    let rules: Vec<&PatternRule> = rules.iter().filter(|rule| rule.pattern.len() <= u16::MAX as usize).collect();

    let mut buf = vec![0u8; 4 + rules.len() * PATTERN_RULE_SIZE];
    write_u32_le(&mut buf, 0, rules.len() as u32);
    for (i, rule) in rules.iter().enumerate() {
        let base = 4 + i * PATTERN_RULE_SIZE;
        let (str_offset, str_len) = str_pool.intern(&rule.pattern.to_ascii_lowercase());
        write_u32_le(&mut buf, base + pattern_rule::STR_OFFSET, str_offset);
        write_u16_le(&mut buf, base + pattern_rule::STR_LEN, str_len);
        buf[base + pattern_rule::ACTION] = rule.action as u8;
        buf[base + pattern_rule::ANCHORS] = rule.anchors.bits();
        write_u32_le(&mut buf, base + pattern_rule::TYPE_MASK, rule.types.bits());
        buf[base + pattern_rule::PARTY] = rule.party.bits();
    }
    buf
}
