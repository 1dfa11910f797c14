//! FNV-1a feature-hashing encoder.
//!
//! Stands in for a pre-trained sentence encoder when none is available. Each
//! lowercase alphanumeric token is hashed with FNV-1a (64-bit); the hash
//! picks a column (`hash % dimension`) and a sign (bit 63), and the signed
//! counts form the row.
//!
//! - **Deterministic**: same text, same row
//! - **Not semantic**: "happy" and "joyful" land in unrelated columns
//! - **Unnormalized by default**: aggregation asks for raw rows

use crate::encoder::{Encoder, EncoderResult, l2_normalize};

/// FNV-1a 64-bit offset basis.
const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;

/// FNV-1a 64-bit prime.
const FNV_PRIME: u64 = 0x0100_0000_01b3;

/// Default row width, matching the combined skip-thoughts vector.
pub const DEFAULT_DIMENSION: usize = 2400;

/// Minimum token length to include (filter single-char tokens).
const MIN_TOKEN_LEN: usize = 2;

/// FNV-1a hash-based encoder.
#[derive(Debug, Clone)]
pub struct HashEncoder {
    dimension: usize,
    id: String,
}

impl HashEncoder {
    /// Create a new hash encoder with the specified dimension.
    ///
    /// # Panics
    ///
    /// Panics if dimension is 0.
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        assert!(dimension > 0, "dimension must be positive");
        Self {
            dimension,
            id: format!("fnv1a-{dimension}"),
        }
    }

    #[inline]
    fn fnv1a_hash(bytes: &[u8]) -> u64 {
        let mut hash = FNV_OFFSET_BASIS;
        for byte in bytes {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(FNV_PRIME);
        }
        hash
    }

    fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|s| s.chars().count() >= MIN_TOKEN_LEN)
            .map(str::to_lowercase)
    }

    /// Encode one text. Texts without usable tokens give the zero row.
    fn encode_one(&self, text: &str, use_norm: bool) -> Vec<f32> {
        let mut row = vec![0.0f32; self.dimension];
        let dim = u64::try_from(self.dimension).unwrap_or(u64::MAX);

        for token in Self::tokenize(text) {
            let hash = Self::fnv1a_hash(token.as_bytes());
            let idx = usize::try_from(hash % dim).unwrap_or(0);
            let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
            row[idx] += sign;
        }

        if use_norm {
            l2_normalize(&mut row);
        }
        row
    }
}

impl Default for HashEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

impl Encoder for HashEncoder {
    fn encode(&self, texts: &[&str], use_norm: bool) -> EncoderResult<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| self.encode_one(text, use_norm))
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(row: &[f32]) -> f32 {
        row.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    #[test]
    fn test_new() {
        let encoder = HashEncoder::new(256);
        assert_eq!(encoder.dimension(), 256);
        assert_eq!(encoder.id(), "fnv1a-256");
    }

    #[test]
    fn test_default_dimension() {
        assert_eq!(HashEncoder::default().dimension(), 2400);
    }

    #[test]
    #[should_panic(expected = "dimension must be positive")]
    fn test_zero_dimension_panics() {
        let _ = HashEncoder::new(0);
    }

    #[test]
    fn test_fnv1a_hash() {
        assert_eq!(HashEncoder::fnv1a_hash(b""), FNV_OFFSET_BASIS);
        assert_ne!(HashEncoder::fnv1a_hash(b"a"), FNV_OFFSET_BASIS);
    }

    #[test]
    fn test_tokenize_filters_short_tokens() {
        let tokens: Vec<String> = HashEncoder::tokenize("Howdy, y'all! Go Texas").collect();
        assert_eq!(tokens, vec!["howdy", "all", "go", "texas"]);
    }

    #[test]
    fn test_encode_preserves_order_and_width() {
        let encoder = HashEncoder::new(64);
        let rows = encoder
            .encode(&["snow in buffalo", "sunny in miami"], false)
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.len() == 64));
        assert_eq!(rows[0], encoder.encode(&["snow in buffalo"], false).unwrap()[0]);
        assert_eq!(rows[1], encoder.encode(&["sunny in miami"], false).unwrap()[0]);
    }

    #[test]
    fn test_raw_rows_are_token_counts() {
        let encoder = HashEncoder::new(128);
        let row = &encoder.encode(&["rain rain rain"], false).unwrap()[0];
        let total: f32 = row.iter().map(|x| x.abs()).sum();
        assert!((total - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_use_norm_normalizes() {
        let encoder = HashEncoder::new(128);
        let row = &encoder.encode(&["go blue go"], true).unwrap()[0];
        assert!((norm(row) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_empty_text_is_zero_row() {
        let encoder = HashEncoder::new(32);
        let rows = encoder.encode(&["", "a ! b"], true).unwrap();
        assert!(rows.iter().all(|r| r.iter().all(|x| *x == 0.0)));
    }

    #[test]
    fn test_empty_batch() {
        let encoder = HashEncoder::new(32);
        assert!(encoder.encode(&[], false).unwrap().is_empty());
    }

    #[test]
    fn test_case_insensitive() {
        let encoder = HashEncoder::new(64);
        let rows = encoder.encode(&["Go Bucks", "go bucks", "GO BUCKS"], false).unwrap();
        assert_eq!(rows[0], rows[1]);
        assert_eq!(rows[1], rows[2]);
    }

    #[test]
    fn test_info() {
        let info = HashEncoder::new(300).info();
        assert_eq!(info.id, "fnv1a-300");
        assert_eq!(info.dimension, 300);
    }
}
