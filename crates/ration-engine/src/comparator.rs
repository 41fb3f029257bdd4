//! # Face Comparator Port
//!
//! Turns a captured face sample into an embedding and scores two
//! embeddings as a [`Confidence`] in `[0, 100]`.
//!
//! Every call may fail, and a failure is never a low score: the
//! orchestrator records a failed attempt with reason
//! `face_service_unavailable` instead of raising `different_person`.

use thiserror::Error;

use ration_core::{Confidence, FaceEmbedding, FaceSample};

use crate::BoxFuture;

/// Comparator failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComparatorError {
    /// The sample did not contain a usable face.
    #[error("no face detected in sample")]
    NoFaceDetected,

    /// The comparison backend could not be reached or returned a server error.
    #[error("face comparison service unavailable: {reason}")]
    Unavailable {
        /// Transport or status detail.
        reason: String,
    },

    /// The backend did not answer in time.
    #[error("face comparison timed out after {elapsed_ms}ms")]
    Timeout {
        /// Configured timeout.
        elapsed_ms: u64,
    },

    /// The backend answered with something unusable.
    #[error("face comparison service returned an invalid response: {reason}")]
    InvalidResponse {
        /// What was wrong.
        reason: String,
    },

    /// The two embeddings come from different models.
    #[error("embedding dimensions differ: reference {reference}, candidate {candidate}")]
    IncompatibleEmbeddings {
        /// Reference dimensions.
        reference: usize,
        /// Candidate dimensions.
        candidate: usize,
    },
}

/// Similarity scoring between face representations.
pub trait FaceComparator: Send + Sync {
    /// Extract an embedding from a captured sample.
    fn embed<'a>(
        &'a self,
        sample: &'a FaceSample,
    ) -> BoxFuture<'a, Result<FaceEmbedding, ComparatorError>>;

    /// Score `candidate` against `reference`.
    fn compare<'a>(
        &'a self,
        reference: &'a FaceEmbedding,
        candidate: &'a FaceEmbedding,
    ) -> BoxFuture<'a, Result<Confidence, ComparatorError>>;

    /// Backend name for logs.
    fn name(&self) -> &str;
}

/// Cosine similarity scaled to a confidence.
///
/// A zero-norm vector scores 0; negative similarity clamps to 0.
pub fn cosine_confidence(
    reference: &FaceEmbedding,
    candidate: &FaceEmbedding,
) -> Result<Confidence, ComparatorError> {
    let (a, b) = (reference.as_slice(), candidate.as_slice());
    if a.len() != b.len() {
        return Err(ComparatorError::IncompatibleEmbeddings {
            reference: a.len(),
            candidate: b.len(),
        });
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(Confidence::from_cosine_similarity(0.0));
    }
    Ok(Confidence::from_cosine_similarity(
        dot / (norm_a.sqrt() * norm_b.sqrt()),
    ))
}

/// Local comparator for deployments without an external face service.
///
/// The sample bytes must already be an embedding encoded as a JSON array of
/// numbers (as produced by an on-device extractor). Anything else, or an
/// all-zero vector, is treated as "no face detected".
#[derive(Debug, Clone, Copy, Default)]
pub struct VectorComparator;

impl VectorComparator {
    fn parse(sample: &FaceSample) -> Result<FaceEmbedding, ComparatorError> {
        let components: Vec<f32> = serde_json::from_slice(sample.as_bytes())
            .map_err(|_| ComparatorError::NoFaceDetected)?;
        if components.iter().all(|c| *c == 0.0) {
            return Err(ComparatorError::NoFaceDetected);
        }
        FaceEmbedding::new(components).map_err(|_| ComparatorError::NoFaceDetected)
    }
}

impl FaceComparator for VectorComparator {
    fn embed<'a>(
        &'a self,
        sample: &'a FaceSample,
    ) -> BoxFuture<'a, Result<FaceEmbedding, ComparatorError>> {
        Box::pin(std::future::ready(Self::parse(sample)))
    }

    fn compare<'a>(
        &'a self,
        reference: &'a FaceEmbedding,
        candidate: &'a FaceEmbedding,
    ) -> BoxFuture<'a, Result<Confidence, ComparatorError>> {
        Box::pin(std::future::ready(cosine_confidence(reference, candidate)))
    }

    fn name(&self) -> &str {
        "vector"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(v: &[f32]) -> FaceEmbedding {
        FaceEmbedding::new(v.to_vec()).unwrap()
    }

    #[test]
    fn identical_vectors_score_100() {
        let c = cosine_confidence(&emb(&[0.3, 0.4, 0.5]), &emb(&[0.3, 0.4, 0.5])).unwrap();
        assert_eq!(c.value(), 100.0);
    }

    #[test]
    fn orthogonal_vectors_score_0() {
        let c = cosine_confidence(&emb(&[1.0, 0.0]), &emb(&[0.0, 1.0])).unwrap();
        assert_eq!(c.value(), 0.0);
    }

    #[test]
    fn zero_norm_scores_0() {
        let c = cosine_confidence(&emb(&[0.0, 0.0]), &emb(&[1.0, 1.0])).unwrap();
        assert_eq!(c.value(), 0.0);
    }

    #[test]
    fn rounds_to_two_decimals() {
        // cos = 0.6 / 1.0
        let c = cosine_confidence(&emb(&[1.0, 0.0]), &emb(&[0.6, 0.8])).unwrap();
        assert_eq!(c.value(), 60.0);
    }

    #[test]
    fn dimension_mismatch_is_an_error_not_a_score() {
        let err = cosine_confidence(&emb(&[1.0]), &emb(&[1.0, 0.0])).unwrap_err();
        assert_eq!(
            err,
            ComparatorError::IncompatibleEmbeddings {
                reference: 1,
                candidate: 2
            }
        );
    }

    #[tokio::test]
    async fn vector_comparator_parses_json_samples() {
        let sample = FaceSample::new(b"[0.1, 0.2, 0.3]".to_vec()).unwrap();
        let e = VectorComparator.embed(&sample).await.unwrap();
        assert_eq!(e.dimensions(), 3);
    }

    #[tokio::test]
    async fn vector_comparator_reports_no_face_for_garbage() {
        let jpeg = FaceSample::new(vec![0xFF, 0xD8, 0xFF, 0xE0]).unwrap();
        assert_eq!(
            VectorComparator.embed(&jpeg).await.unwrap_err(),
            ComparatorError::NoFaceDetected
        );
        let blank = FaceSample::new(b"[0, 0, 0]".to_vec()).unwrap();
        assert_eq!(
            VectorComparator.embed(&blank).await.unwrap_err(),
            ComparatorError::NoFaceDetected
        );
    }
}
