//! Shannon entropy over byte strings (§4.5), the base signal for
//! encoded/packed/obfuscated command-line and file-content detection.

/// Shannon entropy in bits-per-byte, in `[0.0, 8.0]`. Empty input has
/// zero entropy by convention (there's nothing to be uncertain about).
pub fn shannon_entropy(bytes: &[u8]) -> f64 {
    if bytes.is_empty() {
        return 0.0;
    }
    let mut counts = [0u64; 256];
    for &b in bytes {
        counts[b as usize] += 1;
    }
    let len = bytes.len() as f64;
    counts
        .iter()
        .filter(|&&count| count > 0)
        .map(|&count| {
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// A commonly used trigger point: base64/packed payloads and most
/// compiled or encrypted blobs sit north of 6 bits/byte, while natural
/// language and typical shell commands sit well below it.
pub const HIGH_ENTROPY_THRESHOLD: f64 = 6.0;

pub fn is_high_entropy(bytes: &[u8]) -> bool {
    shannon_entropy(bytes) >= HIGH_ENTROPY_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_has_zero_entropy() {
        assert_eq!(shannon_entropy(&[]), 0.0);
    }

    #[test]
    fn single_repeated_byte_has_zero_entropy() {
        assert_eq!(shannon_entropy(&[b'a'; 64]), 0.0);
    }

    #[test]
    fn uniform_byte_distribution_approaches_max_entropy() {
        let bytes: Vec<u8> = (0u8..=255).collect();
        let entropy = shannon_entropy(&bytes);
        assert!((entropy - 8.0).abs() < 1e-9, "entropy was {entropy}");
    }

    #[test]
    fn natural_language_is_below_the_high_entropy_threshold() {
        let text = b"the quick brown fox jumps over the lazy dog repeatedly";
        assert!(!is_high_entropy(text));
    }

    #[test]
    fn uniform_bytes_are_high_entropy() {
        let bytes: Vec<u8> = (0u8..=255).collect();
        assert!(is_high_entropy(&bytes));
    }
}
