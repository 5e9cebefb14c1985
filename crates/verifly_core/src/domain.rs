//! crates/verifly_core/src/domain.rs
//!
//! Defines the pure, core data structures for the verification flow.
//! These structs are independent of any web framework or serialization format.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use rand::Rng;
use uuid::Uuid;

/// The stage a verification session is currently in.
///
/// A session starts at `AwaitingDocument` and only ever moves forward,
/// except for a full reset which returns it to `AwaitingDocument`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationStep {
    AwaitingDocument,
    AwaitingLiveness,
    AwaitingFinalMatch,
    Completed,
}

/// The facial expression the user is asked to produce for the liveness check.
///
/// Chosen uniformly at random when a session is created (and again on reset),
/// and fixed for the session's lifetime. Failed attempts do not re-roll it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeKind {
    Smile,
    Surprise,
    Neutral,
}

impl ChallengeKind {
    /// Samples a challenge uniformly. Repeats across resets are allowed.
    pub fn sample() -> Self {
        match rand::rng().random_range(0..3) {
            0 => ChallengeKind::Smile,
            1 => ChallengeKind::Surprise,
            _ => ChallengeKind::Neutral,
        }
    }

    /// The emotion label the detector is expected to report for this challenge.
    pub fn expected_emotion(&self) -> &'static str {
        match self {
            ChallengeKind::Smile => "happy",
            ChallengeKind::Surprise => "surprise",
            ChallengeKind::Neutral => "neutral",
        }
    }
}

/// An opaque handle to an uploaded raster image (document scan or selfie).
#[derive(Clone)]
pub struct ImageData {
    pub bytes: Bytes,
    pub content_type: String,
}

impl std::fmt::Debug for ImageData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageData")
            .field("len", &self.bytes.len())
            .field("content_type", &self.content_type)
            .finish()
    }
}

/// Structured identity fields read off an ID document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedIdentity {
    pub name: String,
    pub date_of_birth: String,
    pub id_type: String,
    pub address: String,
    pub readability: String,
}

/// The emotion the liveness detector reported for a selfie.
#[derive(Debug, Clone)]
pub struct EmotionReading {
    pub label: String,
    pub confidence: f32,
}

/// The distance the face matcher computed between document photo and selfie.
#[derive(Debug, Clone, Copy)]
pub struct FaceComparison {
    pub distance: f32,
}

/// Outcome of one liveness attempt.
#[derive(Debug, Clone)]
pub struct LivenessResult {
    pub challenge: ChallengeKind,
    pub detected_emotion: String,
    pub passed: bool,
}

/// Outcome of the final document-vs-selfie match.
#[derive(Debug, Clone, Copy)]
pub struct MatchResult {
    pub distance: f32,
    pub verified: bool,
}

/// A generated certificate artifact, ready to be handed to the user.
#[derive(Clone)]
pub struct Certificate {
    pub bytes: Vec<u8>,
    pub file_name: String,
}

impl std::fmt::Debug for Certificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Certificate")
            .field("len", &self.bytes.len())
            .field("file_name", &self.file_name)
            .finish()
    }
}

/// The single mutable record tracking one user's verification attempt.
///
/// Lives in memory only; destroyed by reset or process termination.
#[derive(Debug, Clone)]
pub struct VerificationSession {
    pub id: Uuid,
    pub step: VerificationStep,
    pub challenge: ChallengeKind,
    pub extracted_identity: Option<ExtractedIdentity>,
    pub document_image: Option<ImageData>,
    pub selfie_image: Option<ImageData>,
    pub detected_emotion: Option<String>,
    /// Name snapshot taken when the document was confirmed. The certificate
    /// is issued from this snapshot, not re-read from `extracted_identity`.
    pub verified_name: Option<String>,
    /// Assigned once the final match verifies.
    pub verification_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl VerificationSession {
    /// Creates a fresh session in `AwaitingDocument` with a random challenge.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            step: VerificationStep::AwaitingDocument,
            challenge: ChallengeKind::sample(),
            extracted_identity: None,
            document_image: None,
            selfie_image: None,
            detected_emotion: None,
            verified_name: None,
            verification_id: None,
            created_at: Utc::now(),
        }
    }

    /// Clears all derived fields, re-rolls the challenge and returns the
    /// session to `AwaitingDocument`. The session id is kept.
    pub fn reset(&mut self) {
        self.step = VerificationStep::AwaitingDocument;
        self.challenge = ChallengeKind::sample();
        self.extracted_identity = None;
        self.document_image = None;
        self.selfie_image = None;
        self.detected_emotion = None;
        self.verified_name = None;
        self.verification_id = None;
    }
}

impl Default for VerificationSession {
    fn default() -> Self {
        Self::new()
    }
}
