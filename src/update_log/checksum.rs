//! CRC32 (IEEE) checksums over update log records.
//!
//! The checksum covers the length prefix, kind, sequence and body; any
//! mismatch is corruption.

use crc32fast::Hasher;

pub fn compute_checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

pub fn verify_checksum(data: &[u8], expected: u32) -> bool {
    compute_checksum(data) == expected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_detects_single_bit_flip() {
        let mut data = vec![0x00, 0x01, 0x02, 0x03, 0x04];
        let original = compute_checksum(&data);
        data[2] ^= 0x01;
        assert_ne!(original, compute_checksum(&data));
    }

    #[test]
    fn test_verify_checksum() {
        let data = b"payload to verify";
        let checksum = compute_checksum(data);
        assert!(verify_checksum(data, checksum));
        assert!(!verify_checksum(data, checksum ^ 0x1));
    }
}
