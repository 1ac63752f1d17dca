//! CRS Format v1 Constants
//!
//! All values are little-endian.

/// Magic bytes: "CRS1"
pub const CRS_MAGIC: [u8; 4] = [0x43, 0x52, 0x53, 0x31];

/// Current format version
pub const CRS_VERSION: u16 = 1;

/// Header size in bytes
pub const HEADER_SIZE: usize = 32;

/// Section directory entry size
pub const SECTION_ENTRY_SIZE: usize = 12;

/// Host rule entry size
pub const HOST_RULE_SIZE: usize = 16;

/// Pattern rule entry size
pub const PATTERN_RULE_SIZE: usize = 16;

// =============================================================================
// Header Field Offsets
// =============================================================================

/// Header field byte offsets.
pub mod header {
    /// u8[4] magic = "CRS1"
    pub const MAGIC: usize = 0;
    /// u16 version
    pub const VERSION: usize = 4;
    /// u16 flags
    pub const FLAGS: usize = 6;
    /// u32 sectionCount
    pub const SECTION_COUNT: usize = 8;
    /// u32 sectionDirOffset
    pub const SECTION_DIR_OFFSET: usize = 12;
    /// u32 buildId
    pub const BUILD_ID: usize = 16;
    /// u32 crc32 over the file with this field skipped
    pub const CRC32: usize = 20;
}

/// Header flags.
pub mod header_flags {
    /// File includes a CRC32 checksum
    pub const HAS_CRC32: u16 = 1 << 0;
}

pub mod section_entry {
    /// u16 section id
    pub const ID: usize = 0;
    /// u16 flags
    pub const FLAGS: usize = 2;
    /// u32 file offset
    pub const OFFSET: usize = 4;
    /// u32 byte length
    pub const LENGTH: usize = 8;
}

/// Host rule entry: u64 hash, u8 action, u8 party, u16 reserved, u32 type mask.
pub mod host_rule {
    pub const HASH: usize = 0;
    pub const ACTION: usize = 8;
    pub const PARTY: usize = 9;
    pub const TYPE_MASK: usize = 12;
}

/// Pattern rule entry: u32 str offset, u16 str len, u8 action, u8 anchors,
/// u32 type mask, u8 party, 3 bytes padding.
pub mod pattern_rule {
    pub const STR_OFFSET: usize = 0;
    pub const STR_LEN: usize = 4;
    pub const ACTION: usize = 6;
    pub const ANCHORS: usize = 7;
    pub const TYPE_MASK: usize = 8;
    pub const PARTY: usize = 12;
}

// =============================================================================
// Section IDs
// =============================================================================

/// Section type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum SectionId {
    /// String pool for pattern text
    StrPool = 0x0001,
    /// Host rules sorted by host hash
    HostRules = 0x0002,
    /// URL pattern rules
    PatternRules = 0x0003,
}

impl TryFrom<u16> for SectionId {
    type Error = ();

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0x0001 => Ok(Self::StrPool),
            0x0002 => Ok(Self::HostRules),
            0x0003 => Ok(Self::PatternRules),
            _ => Err(()),
        }
    }
}

// =============================================================================
// Rule Attributes
// =============================================================================

/// Action to take for a matched rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RuleAction {
    /// Exception rule (@@...) - allows the request
    Allow = 0,
    /// Block rule - cancels the request
    Block = 1,
}

impl TryFrom<u8> for RuleAction {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Allow),
            1 => Ok(Self::Block),
            _ => Err(()),
        }
    }
}

bitflags::bitflags! {
    /// Party (first-party / third-party) mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PartyMask: u8 {
        /// Matches first-party requests
        const FIRST_PARTY = 1 << 0;
        /// Matches third-party requests
        const THIRD_PARTY = 1 << 1;
        /// Matches both
        const ALL = Self::FIRST_PARTY.bits() | Self::THIRD_PARTY.bits();
    }
}

bitflags::bitflags! {
    /// Anchors of a URL pattern rule.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AnchorFlags: u8 {
        /// `|pattern` - must match at the start of the URL
        const LEFT = 1 << 0;
        /// `pattern|` - must match at the end of the URL
        const RIGHT = 1 << 1;
        /// `||pattern` - must match at the start of the host or a parent domain
        const HOST = 1 << 2;
    }
}

// =============================================================================
// Byte Helpers
// =============================================================================

/// Validate magic bytes.
#[inline]
pub fn validate_magic(data: &[u8]) -> bool {
    data.len() >= 4 && data[..4] == CRS_MAGIC
}

/// Read u16 little-endian.
#[inline]
pub fn read_u16_le(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

/// Read u32 little-endian.
#[inline]
pub fn read_u32_le(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
}

/// Read u64 little-endian.
#[inline]
pub fn read_u64_le(data: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

pub fn write_u16_le(data: &mut [u8], offset: usize, value: u16) {
    data[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

pub fn write_u32_le(data: &mut [u8], offset: usize, value: u32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

pub fn write_u64_le(data: &mut [u8], offset: usize, value: u64) {
    data[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

/// Round `offset` up to a multiple of `align`.
#[inline]
pub fn align_offset(offset: usize, align: usize) -> usize {
    (offset + align - 1) & !(align - 1)
}
