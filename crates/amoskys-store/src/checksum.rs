//! Blake2b-256 content checksums for WAL rows (§4.6).

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};

type Blake2b256 = Blake2b<U32>;

pub fn checksum_hex(bytes: &[u8]) -> String {
    let mut hasher = Blake2b256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_is_deterministic() {
        assert_eq!(checksum_hex(b"hello"), checksum_hex(b"hello"));
    }

    #[test]
    fn checksum_differs_for_different_input() {
        assert_ne!(checksum_hex(b"hello"), checksum_hex(b"world"));
    }
}
