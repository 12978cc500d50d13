use crate::error::{Error, Result};

/// Set to `1` or `true` to replace the neural model with [`HashingEmbedder`].
pub const FAKE_EMBEDDINGS_ENV_VAR: &str = "TXTINDEX_FAKE_EMBEDDINGS";

/// Dimension of vectors produced by [`HashingEmbedder::default`].
pub const HASHING_DIMENSION: usize = 256;

/// Turns a batch of texts into fixed-length, L2-normalized vectors.
pub trait Embedder {
    /// Output dimension, once known.
    fn dimension(&self) -> Option<usize>;

    /// Embed `texts`, returning exactly one vector per input, in order.
    fn embed(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

impl<E: Embedder + ?Sized> Embedder for Box<E> {
    fn dimension(&self) -> Option<usize> {
        (**self).dimension()
    }

    fn embed(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        (**self).embed(texts)
    }
}

/// Whether [`FAKE_EMBEDDINGS_ENV_VAR`] asks for the hashing embedder.
pub fn use_fake_embeddings() -> bool {
    std::env::var(FAKE_EMBEDDINGS_ENV_VAR)
        .is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

/// Check that an embedder returned one vector per input.
pub fn check_batch(texts: &[String], vectors: &[Vec<f32>]) -> Result<()> {
    if texts.len() != vectors.len() {
        return Err(Error::Embedding(format!(
            "embedder returned {} vectors for {} texts",
            vectors.len(),
            texts.len()
        )));
    }
    Ok(())
}

/// Scale `vector` to unit length. Zero vectors are left unchanged.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// Deterministic bag-of-words embedder.
///
/// Each lowercased alphanumeric token is hashed into one signed bucket. Texts
/// sharing words land close together under cosine distance. No model files
/// or network access are needed.
///
/// # Examples
///
/// ```
/// use txtindex::embedding::{Embedder, HashingEmbedder};
///
/// let mut embedder = HashingEmbedder::new(32);
/// let vectors = embedder
///     .embed(&["hello world".to_string(), "Hello, world!".to_string()])
///     .unwrap();
/// assert_eq!(vectors[0], vectors[1]);
/// ```
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let hash = blake3::hash(token.to_lowercase().as_bytes());
            let bytes = hash.as_bytes();
            let bucket = u64::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5],
                bytes[6], bytes[7],
            ]);
            let index = (bucket % self.dimension as u64) as usize;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[index] += sign;
        }
        l2_normalize(&mut vector);
        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(HASHING_DIMENSION)
    }
}

impl Embedder for HashingEmbedder {
    fn dimension(&self) -> Option<usize> {
        Some(self.dimension)
    }

    fn embed(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}
