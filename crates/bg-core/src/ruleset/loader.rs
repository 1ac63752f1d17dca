//! CRS rule file loader
//!
//! The loader validates the whole file up front so that the matcher can index
//! into sections without further bounds checks failing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::hash::crc32;
use crate::types::ContentType;

use super::format::*;

/// Error type for rule file loading.
#[derive(Debug, thiserror::Error)]
pub enum RuleSetError {
    #[error("Invalid magic bytes")]
    InvalidMagic,
    #[error("Unsupported version: {0}")]
    UnsupportedVersion(u16),
    #[error("CRC32 mismatch: stored={stored}, computed={computed}")]
    Crc32Mismatch { stored: u32, computed: u32 },
    #[error("Invalid section: {0}")]
    InvalidSection(String),
    #[error("Data too short")]
    DataTooShort,
    #[error("Failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Section metadata.
#[derive(Debug, Clone)]
pub struct SectionInfo {
    pub id: SectionId,
    pub flags: u16,
    pub offset: usize,
    pub length: usize,
}

/// A loaded, validated rule file. Owns its bytes so it can move across threads.
#[derive(Debug)]
pub struct RuleSet {
    data: Vec<u8>,
    pub version: u16,
    pub flags: u16,
    pub build_id: u32,
    sections: HashMap<SectionId, SectionInfo>,
}

/// Borrowed view of one pattern rule.
#[derive(Debug, Clone, Copy)]
pub struct PatternRuleRef<'a> {
    pub pattern: &'a [u8],
    pub action: RuleAction,
    pub anchors: AnchorFlags,
    pub party: PartyMask,
    pub types: ContentType,
}

/// Borrowed view of one host rule.
#[derive(Debug, Clone, Copy)]
pub struct HostRuleRef {
    pub hash: u64,
    pub action: RuleAction,
    pub party: PartyMask,
    pub types: ContentType,
}

impl RuleSet {
    /// Read and load a rule file from disk.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RuleSetError> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|source| RuleSetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::load(data)
    }

    /// Load a rule file from bytes.
    pub fn load(data: Vec<u8>) -> Result<Self, RuleSetError> {
        if data.len() < HEADER_SIZE {
            return Err(RuleSetError::DataTooShort);
        }

        if !validate_magic(&data) {
            return Err(RuleSetError::InvalidMagic);
        }

        let version = read_u16_le(&data, header::VERSION);
        if version != CRS_VERSION {
            return Err(RuleSetError::UnsupportedVersion(version));
        }

        let flags = read_u16_le(&data, header::FLAGS);
        let section_count = read_u32_le(&data, header::SECTION_COUNT) as usize;
        let section_dir_offset = read_u32_le(&data, header::SECTION_DIR_OFFSET) as usize;
        let build_id = read_u32_le(&data, header::BUILD_ID);

        if flags & header_flags::HAS_CRC32 != 0 {
            let stored = read_u32_le(&data, header::CRC32);

            // Compute CRC with the CRC field zeroed
            let mut crc_data = data.clone();
            write_u32_le(&mut crc_data, header::CRC32, 0);
            let computed = crc32(&crc_data);

            if stored != computed {
                return Err(RuleSetError::Crc32Mismatch { stored, computed });
            }
        }

        let dir_end = section_count
            .checked_mul(SECTION_ENTRY_SIZE)
            .and_then(|bytes| bytes.checked_add(section_dir_offset))
            .ok_or(RuleSetError::DataTooShort)?;
        if dir_end > data.len() {
            return Err(RuleSetError::DataTooShort);
        }

        let mut sections = HashMap::new();
        for i in 0..section_count {
            let entry_offset = section_dir_offset + i * SECTION_ENTRY_SIZE;

            let id_raw = read_u16_le(&data, entry_offset + section_entry::ID);
            let id = match SectionId::try_from(id_raw) {
                Ok(id) => id,
                Err(_) => continue, // Skip unknown sections
            };

            let info = SectionInfo {
                id,
                flags: read_u16_le(&data, entry_offset + section_entry::FLAGS),
                offset: read_u32_le(&data, entry_offset + section_entry::OFFSET) as usize,
                length: read_u32_le(&data, entry_offset + section_entry::LENGTH) as usize,
            };

            if info.offset.checked_add(info.length).map_or(true, |end| end > data.len()) {
                return Err(RuleSetError::InvalidSection(format!("{:?} exceeds file bounds", id)));
            }

            sections.insert(id, info);
        }

        let rule_set = Self {
            data,
            version,
            flags,
            build_id,
            sections,
        };
        rule_set.validate_sections()?;

        Ok(rule_set)
    }

    fn validate_sections(&self) -> Result<(), RuleSetError> {
        let pool = self.string_pool();

        let host = self.get_section(SectionId::HostRules).unwrap_or(&[]);
        if !host.is_empty() {
            let count = checked_count(host, HOST_RULE_SIZE, SectionId::HostRules)?;
            for i in 0..count {
                let action = host[4 + i * HOST_RULE_SIZE + host_rule::ACTION];
                if RuleAction::try_from(action).is_err() {
                    return Err(RuleSetError::InvalidSection(format!("host rule {} has action {}", i, action)));
                }
            }
        }

        let patterns = self.get_section(SectionId::PatternRules).unwrap_or(&[]);
        if !patterns.is_empty() {
            let count = checked_count(patterns, PATTERN_RULE_SIZE, SectionId::PatternRules)?;
            for i in 0..count {
                let base = 4 + i * PATTERN_RULE_SIZE;
                let action = patterns[base + pattern_rule::ACTION];
                if RuleAction::try_from(action).is_err() {
                    return Err(RuleSetError::InvalidSection(format!("pattern rule {} has action {}", i, action)));
                }
                let offset = read_u32_le(patterns, base + pattern_rule::STR_OFFSET) as usize;
                let len = read_u16_le(patterns, base + pattern_rule::STR_LEN) as usize;
                if offset + len > pool.len() {
                    return Err(RuleSetError::InvalidSection(format!("pattern rule {} points outside string pool", i)));
                }
            }
        }

        Ok(())
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn get_section(&self, id: SectionId) -> Option<&[u8]> {
        let info = self.sections.get(&id)?;
        Some(&self.data[info.offset..info.offset + info.length])
    }

    pub fn get_section_info(&self, id: SectionId) -> Option<&SectionInfo> {
        self.sections.get(&id)
    }

    fn string_pool(&self) -> &[u8] {
        match self.get_section(SectionId::StrPool) {
            Some(section) if section.len() >= 4 => {
                let len = (read_u32_le(section, 0) as usize).min(section.len() - 4);
                &section[4..4 + len]
            }
            _ => &[],
        }
    }

    pub fn host_rule_count(&self) -> usize {
        self.get_section(SectionId::HostRules)
            .filter(|s| s.len() >= 4)
            .map_or(0, |s| read_u32_le(s, 0) as usize)
    }

    pub fn pattern_rule_count(&self) -> usize {
        self.get_section(SectionId::PatternRules)
            .filter(|s| s.len() >= 4)
            .map_or(0, |s| read_u32_le(s, 0) as usize)
    }

    /// All host rules whose hash equals `hash`.
    pub fn host_rules_for(&self, hash: u64) -> impl Iterator<Item = HostRuleRef> + '_ {
        let section = self.get_section(SectionId::HostRules).unwrap_or(&[]);
        let count = self.host_rule_count();
        let hash_at = move |i: usize| read_u64_le(section, 4 + i * HOST_RULE_SIZE + host_rule::HASH);

        // Entries are sorted by hash
        let (mut lo, mut hi) = (0usize, count);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if hash_at(mid) < hash {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }

        (lo..count).take_while(move |&i| hash_at(i) == hash).map(move |i| {
            let base = 4 + i * HOST_RULE_SIZE;
            HostRuleRef {
                hash,
                action: decode_action(section[base + host_rule::ACTION]),
                party: PartyMask::from_bits_truncate(section[base + host_rule::PARTY]),
                types: ContentType::from_bits_truncate(read_u32_le(section, base + host_rule::TYPE_MASK)),
            }
        })
    }

    pub fn pattern_rules(&self) -> impl Iterator<Item = PatternRuleRef<'_>> + '_ {
        let section = self.get_section(SectionId::PatternRules).unwrap_or(&[]);
        let pool = self.string_pool();
        (0..self.pattern_rule_count()).map(move |i| {
            let base = 4 + i * PATTERN_RULE_SIZE;
            let offset = read_u32_le(section, base + pattern_rule::STR_OFFSET) as usize;
            let len = read_u16_le(section, base + pattern_rule::STR_LEN) as usize;
            PatternRuleRef {
                pattern: &pool[offset..offset + len],
                action: decode_action(section[base + pattern_rule::ACTION]),
                anchors: AnchorFlags::from_bits_truncate(section[base + pattern_rule::ANCHORS]),
                party: PartyMask::from_bits_truncate(section[base + pattern_rule::PARTY]),
                types: ContentType::from_bits_truncate(read_u32_le(section, base + pattern_rule::TYPE_MASK)),
            }
        })
    }
}

fn checked_count(section: &[u8], entry_size: usize, id: SectionId) -> Result<usize, RuleSetError> {
    if section.len() < 4 {
        return Err(RuleSetError::InvalidSection(format!("{:?} is missing its count", id)));
    }
    let count = read_u32_le(section, 0) as usize;
    if count.checked_mul(entry_size).map_or(true, |bytes| 4 + bytes > section.len()) {
        return Err(RuleSetError::InvalidSection(format!("{:?} declares {} entries", id, count)));
    }
    Ok(count)
}

// Actions are validated at load time.
fn decode_action(raw: u8) -> RuleAction {
    RuleAction::try_from(raw).unwrap_or(RuleAction::Block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ruleset::{PatternRule, RuleSetBuilder};

    fn sample_bytes() -> Vec<u8> {
        let mut builder = RuleSetBuilder::new().with_build_id(7);
        builder.block_host("ads.example.com");
        builder.add_pattern_rule(PatternRule {
            pattern: "/banner/".to_string(),
            action: RuleAction::Block,
            anchors: AnchorFlags::empty(),
            party: PartyMask::ALL,
            types: ContentType::ALL,
        });
        builder.build()
    }

    #[test]
    fn test_load_valid_rule_set() {
        let rule_set = RuleSet::load(sample_bytes()).expect("rule set should load");
        assert_eq!(rule_set.version, CRS_VERSION);
        assert_eq!(rule_set.build_id, 7);
        assert_eq!(rule_set.section_count(), 3);
        let hosts = rule_set.get_section_info(SectionId::HostRules).expect("host rules section");
        assert_eq!(hosts.id, SectionId::HostRules);
        assert_eq!(hosts.offset % 8, 0);
        assert_eq!(hosts.length, 4 + HOST_RULE_SIZE);
        assert_eq!(rule_set.host_rule_count(), 1);
        assert_eq!(rule_set.pattern_rule_count(), 1);

        let hash = crate::hash::hash_host("ads.example.com");
        let hits: Vec<_> = rule_set.host_rules_for(hash).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].action, RuleAction::Block);

        let patterns: Vec<_> = rule_set.pattern_rules().collect();
        assert_eq!(patterns[0].pattern, b"/banner/");
    }

    #[test]
    fn test_rejects_short_data() {
        assert!(matches!(RuleSet::load(vec![0u8; 8]), Err(RuleSetError::DataTooShort)));
    }

    #[test]
    fn test_rejects_bad_magic() {
        let mut bytes = sample_bytes();
        bytes[0] = b'X';
        assert!(matches!(RuleSet::load(bytes), Err(RuleSetError::InvalidMagic)));
    }

    #[test]
    fn test_rejects_unknown_version() {
        let mut bytes = sample_bytes();
        write_u16_le(&mut bytes, header::VERSION, 9);
        assert!(matches!(RuleSet::load(bytes), Err(RuleSetError::UnsupportedVersion(9))));
    }

    #[test]
    fn test_detects_corruption() {
        let mut bytes = sample_bytes();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(matches!(RuleSet::load(bytes), Err(RuleSetError::Crc32Mismatch { .. })));
    }

    #[test]
    fn test_open_missing_file() {
        let err = RuleSet::open("/definitely/not/here.dat").unwrap_err();
        assert!(matches!(err, RuleSetError::Io { .. }));
        assert!(err.to_string().contains("/definitely/not/here.dat"));
    }
}
