//! # Biometric Values
//!
//! [`FaceSample`] is what a shop captures; [`FaceEmbedding`] is the
//! reference representation kept in the registry; [`Confidence`] is the
//! comparator's similarity score. The core never interprets the first two.
//! It only validates their shape and hands them to the comparator port.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Opaque reference representation of a face.
///
/// A non-empty vector of finite components. Two embeddings are only
/// meaningful to the comparator that produced them.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct FaceEmbedding(Vec<f32>);

impl FaceEmbedding {
    /// Upper bound on components; the largest common face models emit 512.
    pub const MAX_DIMENSIONS: usize = 4096;

    /// Validate and wrap a component vector.
    ///
    /// # Errors
    ///
    /// Rejects empty vectors, vectors above [`Self::MAX_DIMENSIONS`], and any
    /// NaN or infinite component.
    pub fn new(components: Vec<f32>) -> Result<Self, ValidationError> {
        if components.is_empty() {
            return Err(ValidationError::EmptyEmbedding);
        }
        if components.len() > Self::MAX_DIMENSIONS {
            return Err(ValidationError::EmbeddingTooLarge {
                dimensions: components.len(),
                max: Self::MAX_DIMENSIONS,
            });
        }
        if let Some(index) = components.iter().position(|c| !c.is_finite()) {
            return Err(ValidationError::NonFiniteEmbedding { index });
        }
        Ok(Self(components))
    }

    /// Component view for comparator adapters.
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Number of components.
    pub fn dimensions(&self) -> usize {
        self.0.len()
    }
}

impl TryFrom<Vec<f32>> for FaceEmbedding {
    type Error = ValidationError;

    fn try_from(value: Vec<f32>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<FaceEmbedding> for Vec<f32> {
    fn from(value: FaceEmbedding) -> Self {
        value.0
    }
}

impl std::fmt::Debug for FaceEmbedding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FaceEmbedding({} dims)", self.0.len())
    }
}

/// Raw face capture as submitted by a shop or registrar.
#[derive(Clone, PartialEq, Eq)]
pub struct FaceSample(Vec<u8>);

impl FaceSample {
    /// Largest accepted decoded sample.
    pub const MAX_BYTES: usize = 6 * 1024 * 1024;

    /// Wrap raw bytes.
    ///
    /// # Errors
    ///
    /// Rejects empty samples and samples above [`Self::MAX_BYTES`].
    pub fn new(bytes: Vec<u8>) -> Result<Self, ValidationError> {
        if bytes.is_empty() {
            return Err(ValidationError::EmptyFaceSample);
        }
        if bytes.len() > Self::MAX_BYTES {
            return Err(ValidationError::FaceSampleTooLarge {
                bytes: bytes.len(),
                max: Self::MAX_BYTES,
            });
        }
        Ok(Self(bytes))
    }

    /// Decode standard base64, ignoring a leading `data:<mime>;base64,` prefix.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidFaceSampleEncoding`] for bad base64,
    /// then the same checks as [`Self::new`].
    pub fn from_base64(encoded: &str) -> Result<Self, ValidationError> {
        let payload = match encoded.split_once(',') {
            Some((prefix, rest)) if prefix.starts_with("data:") => rest,
            _ => encoded,
        };
        let bytes = STANDARD
            .decode(payload.trim())
            .map_err(|e| ValidationError::InvalidFaceSampleEncoding(e.to_string()))?;
        Self::new(bytes)
    }

    /// Encode as standard base64 (no data URL prefix).
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Decoded size in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false: empty samples are rejected at construction.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for FaceSample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FaceSample({} bytes)", self.0.len())
    }
}

/// Face similarity score in `[0, 100]`; higher means more likely the same person.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Confidence(f64);

impl Confidence {
    /// Validate a score.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::ConfidenceOutOfRange`] for values outside
    /// `[0, 100]` or non-finite values.
    pub fn new(value: f64) -> Result<Self, ValidationError> {
        if !value.is_finite() || !(0.0..=100.0).contains(&value) {
            return Err(ValidationError::ConfidenceOutOfRange(value));
        }
        Ok(Self(value))
    }

    /// Map a cosine similarity in `[-1, 1]` to a score, clamped to `[0, 100]`
    /// and rounded to two decimals. NaN maps to zero.
    pub fn from_cosine_similarity(similarity: f64) -> Self {
        if similarity.is_nan() {
            return Self(0.0);
        }
        let scaled = (similarity * 100.0).clamp(0.0, 100.0);
        Self((scaled * 100.0).round() / 100.0)
    }

    /// The score.
    pub fn value(&self) -> f64 {
        self.0
    }

    /// Whether the score reaches `threshold` (inclusive).
    pub fn meets(&self, threshold: f64) -> bool {
        self.0 >= threshold
    }
}

impl TryFrom<f64> for Confidence {
    type Error = ValidationError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Confidence> for f64 {
    fn from(value: Confidence) -> Self {
        value.0
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}
