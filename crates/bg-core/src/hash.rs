//! Hash functions for blockgate
//!
//! Host rules in the compiled rule file are keyed by a 64-bit xxHash of the
//! lowercased host. Zero is reserved, so hashes are OR-ed with 1.

use std::hash::Hasher;

use twox_hash::XxHash64;

const HOST_SEED: u64 = 0x9e37_79b9_7f4a_7c15;

/// Hash a host for host-rule lookup. Case-insensitive.
#[inline]
pub fn hash_host(host: &str) -> u64 {
    let mut hasher = XxHash64::with_seed(HOST_SEED);
    for b in host.trim_end_matches('.').bytes() {
        hasher.write_u8(b.to_ascii_lowercase());
    }
    hasher.finish() | 1
}

/// CRC32 (IEEE 802.3, reflected) used for rule file integrity checks.
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (0xEDB8_8320 & mask);
        }
    }
    !crc
}
