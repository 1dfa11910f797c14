//! Encoder trait and vector helpers for thought vectors.
//!
//! An encoder maps a batch of texts to fixed-width dense vectors, one row
//! per text, in input order. How the vectors are computed is the encoder's
//! business; the aggregation layer only relies on the width being constant.

use serde::Serialize;
use thiserror::Error;

/// Errors that can occur during encoding.
#[derive(Debug, Error)]
pub enum EncoderError {
    /// The encoder is not available (e.g., model files missing).
    #[error("encoder unavailable: {0}")]
    Unavailable(String),

    /// Failed to produce vectors.
    #[error("encoding failed: {0}")]
    EncodingFailed(String),

    /// Invalid input provided to the encoder.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for encoder operations.
pub type EncoderResult<T> = Result<T, EncoderError>;

/// Information about an encoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncoderInfo {
    /// Unique identifier (e.g., "fnv1a-2400").
    pub id: String,
    /// Output width of every row.
    pub dimension: usize,
}

/// Trait for sentence encoders.
///
/// # Implementations
///
/// - [`HashEncoder`](crate::hash_encoder::HashEncoder): deterministic
///   feature hashing, always available.
pub trait Encoder {
    /// Encode `texts` into one row of [`dimension`](Encoder::dimension)
    /// floats per text, preserving order.
    ///
    /// When `use_norm` is true each row is L2-normalized.
    ///
    /// # Errors
    ///
    /// Returns an error if the encoder cannot process the batch.
    fn encode(&self, texts: &[&str], use_norm: bool) -> EncoderResult<Vec<Vec<f32>>>;

    /// Width of every encoded row.
    fn dimension(&self) -> usize;

    /// Unique identifier for this encoder.
    fn id(&self) -> &str;

    /// Get information about this encoder.
    fn info(&self) -> EncoderInfo {
        EncoderInfo {
            id: self.id().to_string(),
            dimension: self.dimension(),
        }
    }
}

impl<E: Encoder + ?Sized> Encoder for &E {
    fn encode(&self, texts: &[&str], use_norm: bool) -> EncoderResult<Vec<Vec<f32>>> {
        (**self).encode(texts, use_norm)
    }

    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn id(&self) -> &str {
        (**self).id()
    }
}

/// L2-normalize a vector in place.
#[inline]
pub fn l2_normalize(vec: &mut [f32]) {
    let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in vec.iter_mut() {
            *x /= norm;
        }
    }
}

/// Add `src` into `acc` element-wise, 8 lanes at a time.
///
/// # Panics
///
/// Panics if the internal SIMD chunk conversion fails (unreachable because
/// `chunks_exact(8)` always yields length 8).
#[inline]
pub fn add_assign_simd(acc: &mut [f32], src: &[f32]) {
    use wide::f32x8;

    debug_assert_eq!(acc.len(), src.len(), "vectors must have same dimension");

    let mut acc_chunks = acc.chunks_exact_mut(8);
    let mut src_chunks = src.chunks_exact(8);
    for (ca, cs) in (&mut acc_chunks).zip(&mut src_chunks) {
        let arr_a: [f32; 8] = (&*ca).try_into().unwrap();
        let arr_s: [f32; 8] = cs.try_into().unwrap();
        let sum = f32x8::from(arr_a) + f32x8::from(arr_s);
        ca.copy_from_slice(&sum.to_array());
    }

    for (a, s) in acc_chunks
        .into_remainder()
        .iter_mut()
        .zip(src_chunks.remainder())
    {
        *a += s;
    }
}

/// Column-wise arithmetic mean of `rows`.
///
/// Returns `None` for an empty batch, where the mean is undefined.
///
/// # Panics
///
/// Debug builds assert that every row has the width of the first.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn column_mean(rows: &[Vec<f32>]) -> Option<Vec<f32>> {
    let first = rows.first()?;
    let mut acc = vec![0.0f32; first.len()];
    for row in rows {
        add_assign_simd(&mut acc, row);
    }

    let count = rows.len() as f32;
    for x in &mut acc {
        *x /= count;
    }
    Some(acc)
}
