//! crates/verifly_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like vision models or
//! document renderers.

use crate::domain::{Certificate, EmotionReading, ExtractedIdentity, FaceComparison, ImageData};
use async_trait::async_trait;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., model APIs).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Operation timed out: {0}")]
    Timeout(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DocumentExtractionService: Send + Sync {
    /// Reads structured identity fields off an ID document image.
    ///
    /// Implementations must tolerate malformed upstream output by returning an
    /// error the caller can catch, never by panicking.
    async fn extract_identity(&self, document: &ImageData) -> PortResult<ExtractedIdentity>;
}

#[async_trait]
pub trait LivenessDetectionService: Send + Sync {
    /// Reports the dominant facial emotion visible in a selfie, given the
    /// challenge the user was asked to perform.
    async fn detect_emotion(
        &self,
        challenge: crate::domain::ChallengeKind,
        selfie: &ImageData,
    ) -> PortResult<EmotionReading>;
}

#[async_trait]
pub trait FaceMatchService: Send + Sync {
    /// Compares the photo on the ID document against the live selfie and
    /// produces a distance score (lower is more similar).
    async fn compare_faces(
        &self,
        document: &ImageData,
        selfie: &ImageData,
    ) -> PortResult<FaceComparison>;
}

#[async_trait]
pub trait CertificateService: Send + Sync {
    /// Renders a certificate artifact attesting a successful verification.
    async fn issue(
        &self,
        name: &str,
        verification_id: &str,
        photo: &ImageData,
    ) -> PortResult<Certificate>;
}

#[async_trait]
pub trait SpeechService: Send + Sync {
    /// Generates audio data from a string of text (the spoken challenge guide).
    async fn synthesize(&self, text: &str) -> PortResult<Vec<u8>>;
}
