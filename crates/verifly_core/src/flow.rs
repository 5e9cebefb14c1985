//! crates/verifly_core/src/flow.rs
//!
//! The verification flow controller: the step state machine that sequences
//! document extraction, the liveness challenge and the final face match, and
//! enforces the ordering and data-availability invariants between them.
//!
//! The controller depends only on the ports in `crate::ports`; the concrete
//! vision/biometric collaborators are wired in by the hosting service.

use crate::domain::{
    Certificate, ChallengeKind, EmotionReading, ExtractedIdentity, ImageData, LivenessResult,
    MatchResult, VerificationSession, VerificationStep,
};
use crate::ports::{
    CertificateService, DocumentExtractionService, FaceMatchService, LivenessDetectionService,
    PortError, PortResult,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

//=========================================================================================
// Flow Errors
//=========================================================================================

/// The error type surfaced by flow controller operations.
///
/// Collaborator failures are caught at this boundary and converted into one of
/// these kinds; they never leave the controller as raw port errors. Liveness
/// detector failure has no variant of its own because it is always absorbed by
/// the configured [`DetectorFallback`].
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    /// The document was unreadable or the extractor was unavailable.
    /// Recoverable: the session stays in `AwaitingDocument`.
    #[error("Document extraction failed: {0}")]
    Extraction(String),

    /// An operation was invoked before the data it requires exists, or in the
    /// wrong step. A correct caller never surfaces this to an end user.
    #[error("Precondition not met: {0}")]
    Precondition(String),

    /// The final match scored below the threshold or the matcher was
    /// unavailable. Recoverable: the session stays in `AwaitingFinalMatch`.
    #[error("Final match failed: {0}")]
    Match(String),

    /// Certificate rendering failed. The verification itself stands; the
    /// artifact can be re-requested.
    #[error("Certificate issuance failed: {0}")]
    Certificate(String),
}

/// A convenience type alias for `Result<T, FlowError>`.
pub type FlowResult<T> = Result<T, FlowError>;

//=========================================================================================
// Policies and Options
//=========================================================================================

/// The rule deciding whether a detected emotion passes the liveness challenge.
///
/// The reference behavior is `AlwaysPass` (demo mode); real deployments select
/// a matching rule here instead of changing code.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LivenessPolicy {
    /// Every attempt passes regardless of the detected emotion (demo mode).
    AlwaysPass,
    /// The detected label must equal the challenge's expected emotion.
    ExactMatch,
    /// The label must match and the detector's confidence must clear the bar.
    ConfidenceThreshold { min_confidence: f32 },
}

impl LivenessPolicy {
    /// Decides pass/fail for one reading against the session's challenge.
    pub fn evaluate(&self, challenge: ChallengeKind, reading: &EmotionReading) -> bool {
        match self {
            LivenessPolicy::AlwaysPass => true,
            LivenessPolicy::ExactMatch => {
                reading.label.eq_ignore_ascii_case(challenge.expected_emotion())
            }
            LivenessPolicy::ConfidenceThreshold { min_confidence } => {
                reading.label.eq_ignore_ascii_case(challenge.expected_emotion())
                    && reading.confidence >= *min_confidence
            }
        }
    }
}

/// What to do when the liveness detector itself fails (model down, timeout).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorFallback {
    /// Substitute a reading that matches the challenge (reference behavior).
    AssumeChallengeMet,
    /// Record the failure and treat the attempt as not passed.
    FailClosed,
}

/// Tuning knobs for one flow controller, fixed at construction.
#[derive(Debug, Clone, Copy)]
pub struct FlowOptions {
    pub liveness_policy: LivenessPolicy,
    pub detector_fallback: DetectorFallback,
    /// A match distance at or below this verifies the identity.
    pub match_threshold: f32,
    /// Upper bound on every external collaborator call.
    pub call_timeout: Duration,
}

impl Default for FlowOptions {
    fn default() -> Self {
        Self {
            liveness_policy: LivenessPolicy::AlwaysPass,
            detector_fallback: DetectorFallback::AssumeChallengeMet,
            match_threshold: 0.4,
            call_timeout: Duration::from_secs(30),
        }
    }
}

/// The external collaborators a flow controller drives.
#[derive(Clone)]
pub struct Collaborators {
    pub extractor: Arc<dyn DocumentExtractionService>,
    pub liveness: Arc<dyn LivenessDetectionService>,
    pub matcher: Arc<dyn FaceMatchService>,
    pub issuer: Arc<dyn CertificateService>,
}

/// Everything `run_final_match` produces on success.
#[derive(Debug)]
pub struct VerificationOutcome {
    pub result: MatchResult,
    pub verification_id: String,
    pub certificate: Certificate,
}

//=========================================================================================
// VerificationFlowController
//=========================================================================================

/// Owns one [`VerificationSession`] and enforces that the verification stages
/// occur in order, each stage's output is attached to the session before the
/// next stage becomes reachable, and no stage is re-entered with stale data
/// after the step has advanced -- except via a full reset.
///
/// Operations are `&mut self` and must not be invoked concurrently on the same
/// session; the hosting service serializes access per session.
pub struct VerificationFlowController {
    collaborators: Collaborators,
    options: FlowOptions,
    session: VerificationSession,
}

impl VerificationFlowController {
    /// Creates a controller with a fresh session in `AwaitingDocument`.
    pub fn new(collaborators: Collaborators, options: FlowOptions) -> Self {
        Self {
            collaborators,
            options,
            session: VerificationSession::new(),
        }
    }

    /// Read access to the session record (step, challenge, extracted fields).
    pub fn session(&self) -> &VerificationSession {
        &self.session
    }

    /// Runs the document extractor and attaches the result to the session.
    ///
    /// Extraction runs at most once per entry into `AwaitingDocument`: if an
    /// identity is already cached, it is returned as-is and the extractor is
    /// not re-invoked. Starting over with a different document requires
    /// [`reset`](Self::reset).
    pub async fn submit_document(&mut self, image: ImageData) -> FlowResult<ExtractedIdentity> {
        self.require_step(VerificationStep::AwaitingDocument, "submit_document")?;

        if let Some(identity) = &self.session.extracted_identity {
            return Ok(identity.clone());
        }

        let identity = bounded(
            self.options.call_timeout,
            self.collaborators.extractor.extract_identity(&image),
        )
        .await
        .map_err(|e| FlowError::Extraction(e.to_string()))?;

        self.session.extracted_identity = Some(identity.clone());
        self.session.document_image = Some(image);
        Ok(identity)
    }

    /// Confirms the extracted identity and advances to the liveness step.
    ///
    /// The verified name is snapshotted here; the certificate is later issued
    /// from this snapshot rather than re-read from the session.
    pub fn confirm_document(&mut self) -> FlowResult<()> {
        self.require_step(VerificationStep::AwaitingDocument, "confirm_document")?;
        let identity = self.session.extracted_identity.as_ref().ok_or_else(|| {
            FlowError::Precondition(
                "confirm_document requires a completed document extraction".to_string(),
            )
        })?;
        self.session.verified_name = Some(identity.name.clone());
        self.session.step = VerificationStep::AwaitingLiveness;
        Ok(())
    }

    /// Runs one liveness attempt against the session's fixed challenge.
    ///
    /// Detector failure is never propagated raw: the configured
    /// [`DetectorFallback`] decides whether the attempt is assumed to match
    /// the challenge or fails closed. On pass the selfie is attached to the
    /// session; on fail the session stays in `AwaitingLiveness` and the
    /// challenge does not change.
    pub async fn submit_liveness(&mut self, image: ImageData) -> FlowResult<LivenessResult> {
        self.require_step(VerificationStep::AwaitingLiveness, "submit_liveness")?;
        let challenge = self.session.challenge;

        let (reading, detector_failed) = match bounded(
            self.options.call_timeout,
            self.collaborators.liveness.detect_emotion(challenge, &image),
        )
        .await
        {
            Ok(reading) => (reading, false),
            Err(_) => match self.options.detector_fallback {
                DetectorFallback::AssumeChallengeMet => (
                    EmotionReading {
                        label: challenge.expected_emotion().to_string(),
                        confidence: 1.0,
                    },
                    false,
                ),
                DetectorFallback::FailClosed => (
                    EmotionReading {
                        label: "unknown".to_string(),
                        confidence: 0.0,
                    },
                    true,
                ),
            },
        };

        self.session.detected_emotion = Some(reading.label.clone());

        let passed =
            !detector_failed && self.options.liveness_policy.evaluate(challenge, &reading);
        if passed {
            self.session.selfie_image = Some(image);
        }

        Ok(LivenessResult {
            challenge,
            detected_emotion: reading.label,
            passed,
        })
    }

    /// Advances to the final match once a liveness selfie is attached.
    pub fn advance_to_final_match(&mut self) -> FlowResult<()> {
        self.require_step(VerificationStep::AwaitingLiveness, "advance_to_final_match")?;
        if self.session.selfie_image.is_none() {
            return Err(FlowError::Precondition(
                "advance_to_final_match requires a passed liveness selfie".to_string(),
            ));
        }
        self.session.step = VerificationStep::AwaitingFinalMatch;
        Ok(())
    }

    /// Compares the document photo against the selfie and, on a verified
    /// match, issues the certificate and completes the session.
    ///
    /// A distance above the threshold (or an unavailable matcher) leaves the
    /// session in `AwaitingFinalMatch` so the caller can retry. Certificate
    /// issuance failure does not undo the verification: the session is
    /// `Completed` and the artifact can be re-requested via
    /// [`issue_certificate`](Self::issue_certificate).
    pub async fn run_final_match(&mut self) -> FlowResult<VerificationOutcome> {
        self.require_step(VerificationStep::AwaitingFinalMatch, "run_final_match")?;
        let document = self.session.document_image.clone().ok_or_else(|| {
            FlowError::Precondition("run_final_match requires a document image".to_string())
        })?;
        let selfie = self.session.selfie_image.clone().ok_or_else(|| {
            FlowError::Precondition("run_final_match requires a selfie image".to_string())
        })?;

        let comparison = bounded(
            self.options.call_timeout,
            self.collaborators.matcher.compare_faces(&document, &selfie),
        )
        .await
        .map_err(|e| FlowError::Match(e.to_string()))?;

        if comparison.distance > self.options.match_threshold {
            return Err(FlowError::Match(format!(
                "match distance {:.2} exceeds threshold {:.2}",
                comparison.distance, self.options.match_threshold
            )));
        }

        let verification_id = new_verification_id();
        self.session.verification_id = Some(verification_id.clone());
        self.session.step = VerificationStep::Completed;

        let name = self
            .session
            .verified_name
            .clone()
            .unwrap_or_else(|| "Demo User".to_string());

        let certificate = bounded(
            self.options.call_timeout,
            self.collaborators.issuer.issue(&name, &verification_id, &selfie),
        )
        .await
        .map_err(|e| FlowError::Certificate(e.to_string()))?;

        Ok(VerificationOutcome {
            result: MatchResult {
                distance: comparison.distance,
                verified: true,
            },
            verification_id,
            certificate,
        })
    }

    /// Re-issues the certificate for a completed session (download endpoint).
    pub async fn issue_certificate(&self) -> FlowResult<Certificate> {
        self.require_step(VerificationStep::Completed, "issue_certificate")?;
        let name = self.session.verified_name.as_deref().ok_or_else(|| {
            FlowError::Precondition("completed session is missing its name snapshot".to_string())
        })?;
        let verification_id = self.session.verification_id.as_deref().ok_or_else(|| {
            FlowError::Precondition("completed session is missing its verification id".to_string())
        })?;
        let selfie = self.session.selfie_image.as_ref().ok_or_else(|| {
            FlowError::Precondition("completed session is missing its selfie".to_string())
        })?;

        bounded(
            self.options.call_timeout,
            self.collaborators.issuer.issue(name, verification_id, selfie),
        )
        .await
        .map_err(|e| FlowError::Certificate(e.to_string()))
    }

    /// Full reset, callable from any step: clears all derived fields,
    /// re-rolls the challenge and returns to `AwaitingDocument`.
    pub fn reset(&mut self) {
        self.session.reset();
    }

    fn require_step(&self, expected: VerificationStep, operation: &str) -> FlowResult<()> {
        if self.session.step != expected {
            return Err(FlowError::Precondition(format!(
                "{} requires step {:?}, but the session is in {:?}",
                operation, expected, self.session.step
            )));
        }
        Ok(())
    }
}

/// Bounds an external collaborator call so a hung service surfaces as a
/// recoverable error instead of stalling the session.
async fn bounded<T>(
    limit: Duration,
    fut: impl Future<Output = PortResult<T>>,
) -> PortResult<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(PortError::Timeout(format!(
            "external call exceeded {}s",
            limit.as_secs()
        ))),
    }
}

fn new_verification_id() -> String {
    let uid = Uuid::new_v4().simple().to_string();
    format!("VRF-{}", uid[..12].to_uppercase())
}

//=========================================================================================
// Tests
//=========================================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FaceComparison;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn image(tag: &'static str) -> ImageData {
        ImageData {
            bytes: Bytes::from_static(tag.as_bytes()),
            content_type: "image/jpeg".to_string(),
        }
    }

    fn sample_identity() -> ExtractedIdentity {
        ExtractedIdentity {
            name: "Roobika T".to_string(),
            date_of_birth: "01-01-2000".to_string(),
            id_type: "Aadhaar Card".to_string(),
            address: "Peelamedu, Coimbatore-641004".to_string(),
            readability: "Clear / Readable".to_string(),
        }
    }

    #[derive(Default)]
    struct StubExtractor {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl DocumentExtractionService for StubExtractor {
        async fn extract_identity(&self, _document: &ImageData) -> PortResult<ExtractedIdentity> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(PortError::Unexpected("document unreadable".to_string()));
            }
            Ok(sample_identity())
        }
    }

    struct StubDetector {
        label: &'static str,
        confidence: f32,
        fail: bool,
    }

    #[async_trait]
    impl LivenessDetectionService for StubDetector {
        async fn detect_emotion(
            &self,
            _challenge: ChallengeKind,
            _selfie: &ImageData,
        ) -> PortResult<EmotionReading> {
            if self.fail {
                return Err(PortError::Unexpected("detector offline".to_string()));
            }
            Ok(EmotionReading {
                label: self.label.to_string(),
                confidence: self.confidence,
            })
        }
    }

    struct StubMatcher {
        distance: f32,
    }

    #[async_trait]
    impl FaceMatchService for StubMatcher {
        async fn compare_faces(
            &self,
            _document: &ImageData,
            _selfie: &ImageData,
        ) -> PortResult<FaceComparison> {
            Ok(FaceComparison {
                distance: self.distance,
            })
        }
    }

    /// Embeds name and id into the artifact so tests can check what was issued.
    #[derive(Default)]
    struct StubIssuer {
        fail_first: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CertificateService for StubIssuer {
        async fn issue(
            &self,
            name: &str,
            verification_id: &str,
            _photo: &ImageData,
        ) -> PortResult<Certificate> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_first && call == 0 {
                return Err(PortError::Unexpected("renderer crashed".to_string()));
            }
            Ok(Certificate {
                bytes: format!("CERT|{}|{}", name, verification_id).into_bytes(),
                file_name: "KYC_Certificate.pdf".to_string(),
            })
        }
    }

    struct Fixture {
        extractor: Arc<StubExtractor>,
        issuer: Arc<StubIssuer>,
        controller: VerificationFlowController,
    }

    fn fixture_with(detector: StubDetector, matcher: StubMatcher, options: FlowOptions) -> Fixture {
        let extractor = Arc::new(StubExtractor::default());
        let issuer = Arc::new(StubIssuer::default());
        let collaborators = Collaborators {
            extractor: extractor.clone(),
            liveness: Arc::new(detector),
            matcher: Arc::new(matcher),
            issuer: issuer.clone(),
        };
        Fixture {
            extractor,
            issuer,
            controller: VerificationFlowController::new(collaborators, options),
        }
    }

    fn fixture() -> Fixture {
        fixture_with(
            StubDetector {
                label: "happy",
                confidence: 0.9,
                fail: false,
            },
            StubMatcher { distance: 0.23 },
            FlowOptions::default(),
        )
    }

    #[tokio::test]
    async fn extraction_runs_once_and_repeat_submissions_return_the_cache() {
        let mut fx = fixture();
        let first = fx.controller.submit_document(image("id-a")).await.unwrap();
        let second = fx.controller.submit_document(image("id-b")).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(fx.extractor.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            fx.controller.session().step,
            VerificationStep::AwaitingDocument
        );
    }

    #[tokio::test]
    async fn confirm_without_extraction_is_a_precondition_error() {
        let mut fx = fixture();
        let err = fx.controller.confirm_document().unwrap_err();
        assert!(matches!(err, FlowError::Precondition(_)));
        assert_eq!(
            fx.controller.session().step,
            VerificationStep::AwaitingDocument
        );
    }

    #[tokio::test]
    async fn extractor_failure_keeps_the_session_retryable() {
        let extractor = Arc::new(StubExtractor {
            fail: true,
            ..Default::default()
        });
        let collaborators = Collaborators {
            extractor: extractor.clone(),
            liveness: Arc::new(StubDetector {
                label: "happy",
                confidence: 0.9,
                fail: false,
            }),
            matcher: Arc::new(StubMatcher { distance: 0.23 }),
            issuer: Arc::new(StubIssuer::default()),
        };
        let mut controller =
            VerificationFlowController::new(collaborators, FlowOptions::default());

        let err = controller.submit_document(image("id")).await.unwrap_err();
        assert!(matches!(err, FlowError::Extraction(_)));
        assert_eq!(controller.session().step, VerificationStep::AwaitingDocument);
        assert!(controller.session().extracted_identity.is_none());

        // A retry reaches the extractor again since nothing was cached.
        let _ = controller.submit_document(image("id")).await;
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn operations_out_of_order_never_skip_a_step() {
        let mut fx = fixture();

        assert!(matches!(
            fx.controller.submit_liveness(image("s")).await.unwrap_err(),
            FlowError::Precondition(_)
        ));
        assert!(matches!(
            fx.controller.run_final_match().await.unwrap_err(),
            FlowError::Precondition(_)
        ));
        assert!(matches!(
            fx.controller.advance_to_final_match().unwrap_err(),
            FlowError::Precondition(_)
        ));
        assert_eq!(
            fx.controller.session().step,
            VerificationStep::AwaitingDocument
        );
    }

    #[tokio::test]
    async fn advance_without_selfie_is_a_precondition_error() {
        let mut fx = fixture_with(
            StubDetector {
                label: "sad",
                confidence: 0.9,
                fail: false,
            },
            StubMatcher { distance: 0.23 },
            FlowOptions {
                liveness_policy: LivenessPolicy::ExactMatch,
                ..FlowOptions::default()
            },
        );
        fx.controller.submit_document(image("id")).await.unwrap();
        fx.controller.confirm_document().unwrap();

        // The mismatched emotion fails the strict policy, so no selfie is stored.
        let result = fx.controller.submit_liveness(image("selfie")).await.unwrap();
        assert!(!result.passed);
        assert!(fx.controller.session().selfie_image.is_none());

        let err = fx.controller.advance_to_final_match().unwrap_err();
        assert!(matches!(err, FlowError::Precondition(_)));
        assert_eq!(
            fx.controller.session().step,
            VerificationStep::AwaitingLiveness
        );
    }

    #[tokio::test]
    async fn strict_policy_gates_on_the_challenge_and_relaxed_mode_does_not() {
        // Strict: detector reports "sad" against a Smile/Surprise/Neutral
        // challenge, so ExactMatch must fail while the emotion is recorded.
        let mut strict = fixture_with(
            StubDetector {
                label: "sad",
                confidence: 0.95,
                fail: false,
            },
            StubMatcher { distance: 0.23 },
            FlowOptions {
                liveness_policy: LivenessPolicy::ExactMatch,
                ..FlowOptions::default()
            },
        );
        strict.controller.submit_document(image("id")).await.unwrap();
        strict.controller.confirm_document().unwrap();
        let attempt = strict
            .controller
            .submit_liveness(image("selfie"))
            .await
            .unwrap();
        assert!(!attempt.passed);
        assert_eq!(attempt.detected_emotion, "sad");
        assert_eq!(
            strict.controller.session().detected_emotion.as_deref(),
            Some("sad")
        );

        // Relaxed demo mode passes the very same reading.
        let mut relaxed = fixture_with(
            StubDetector {
                label: "sad",
                confidence: 0.95,
                fail: false,
            },
            StubMatcher { distance: 0.23 },
            FlowOptions::default(),
        );
        relaxed
            .controller
            .submit_document(image("id"))
            .await
            .unwrap();
        relaxed.controller.confirm_document().unwrap();
        let attempt = relaxed
            .controller
            .submit_liveness(image("selfie"))
            .await
            .unwrap();
        assert!(attempt.passed);
        assert!(relaxed.controller.session().selfie_image.is_some());
    }

    #[tokio::test]
    async fn confidence_policy_requires_both_label_and_confidence() {
        let mut fx = fixture_with(
            StubDetector {
                label: "happy",
                confidence: 0.4,
                fail: false,
            },
            StubMatcher { distance: 0.23 },
            FlowOptions {
                liveness_policy: LivenessPolicy::ConfidenceThreshold { min_confidence: 0.7 },
                ..FlowOptions::default()
            },
        );
        fx.controller.submit_document(image("id")).await.unwrap();
        fx.controller.confirm_document().unwrap();

        // Whatever the sampled challenge is, this attempt cannot pass: for a
        // Smile challenge the label matches but the confidence is too low, and
        // for any other challenge the label itself mismatches.
        let attempt = fx.controller.submit_liveness(image("selfie")).await.unwrap();
        assert!(!attempt.passed);

        // A confident matching reading passes the same policy.
        let policy = LivenessPolicy::ConfidenceThreshold { min_confidence: 0.7 };
        let confident = EmotionReading {
            label: "surprise".to_string(),
            confidence: 0.85,
        };
        assert!(policy.evaluate(ChallengeKind::Surprise, &confident));
    }

    #[tokio::test]
    async fn detector_failure_is_absorbed_by_the_configured_fallback() {
        // Reference behavior: assume the challenge was met.
        let mut assume = fixture_with(
            StubDetector {
                label: "unused",
                confidence: 0.0,
                fail: true,
            },
            StubMatcher { distance: 0.23 },
            FlowOptions {
                liveness_policy: LivenessPolicy::ExactMatch,
                detector_fallback: DetectorFallback::AssumeChallengeMet,
                ..FlowOptions::default()
            },
        );
        assume.controller.submit_document(image("id")).await.unwrap();
        assume.controller.confirm_document().unwrap();
        let challenge = assume.controller.session().challenge;
        let attempt = assume
            .controller
            .submit_liveness(image("selfie"))
            .await
            .unwrap();
        assert!(attempt.passed);
        assert_eq!(attempt.detected_emotion, challenge.expected_emotion());

        // Fail-closed: the attempt does not pass even under AlwaysPass.
        let mut closed = fixture_with(
            StubDetector {
                label: "unused",
                confidence: 0.0,
                fail: true,
            },
            StubMatcher { distance: 0.23 },
            FlowOptions {
                detector_fallback: DetectorFallback::FailClosed,
                ..FlowOptions::default()
            },
        );
        closed.controller.submit_document(image("id")).await.unwrap();
        closed.controller.confirm_document().unwrap();
        let attempt = closed
            .controller
            .submit_liveness(image("selfie"))
            .await
            .unwrap();
        assert!(!attempt.passed);
        assert_eq!(
            closed.controller.session().step,
            VerificationStep::AwaitingLiveness
        );
    }

    #[tokio::test]
    async fn end_to_end_flow_completes_and_certifies_the_confirmed_name() {
        let mut fx = fixture();

        let identity = fx.controller.submit_document(image("id")).await.unwrap();
        assert_eq!(identity, sample_identity());
        fx.controller.confirm_document().unwrap();
        assert_eq!(
            fx.controller.session().step,
            VerificationStep::AwaitingLiveness
        );

        let liveness = fx.controller.submit_liveness(image("selfie")).await.unwrap();
        assert!(liveness.passed);
        fx.controller.advance_to_final_match().unwrap();
        assert_eq!(
            fx.controller.session().step,
            VerificationStep::AwaitingFinalMatch
        );

        let outcome = fx.controller.run_final_match().await.unwrap();
        assert!(outcome.result.verified);
        assert!((outcome.result.distance - 0.23).abs() < f32::EPSILON);
        assert!(outcome.verification_id.starts_with("VRF-"));
        assert_eq!(fx.controller.session().step, VerificationStep::Completed);

        let body = String::from_utf8(outcome.certificate.bytes).unwrap();
        assert!(body.contains("Roobika T"));
        assert!(body.contains(&outcome.verification_id));
    }

    #[tokio::test]
    async fn certificate_name_is_the_snapshot_taken_at_confirmation() {
        let mut fx = fixture();
        fx.controller.submit_document(image("id")).await.unwrap();
        fx.controller.confirm_document().unwrap();

        // Even if the extracted record were mutated afterwards, the issued
        // certificate must carry the name as of confirmation time.
        fx.controller
            .session
            .extracted_identity
            .as_mut()
            .unwrap()
            .name = "Someone Else".to_string();

        fx.controller.submit_liveness(image("selfie")).await.unwrap();
        fx.controller.advance_to_final_match().unwrap();
        let outcome = fx.controller.run_final_match().await.unwrap();

        let body = String::from_utf8(outcome.certificate.bytes).unwrap();
        assert!(body.contains("Roobika T"));
        assert!(!body.contains("Someone Else"));
    }

    #[tokio::test]
    async fn over_threshold_match_keeps_the_session_retryable() {
        let mut fx = fixture_with(
            StubDetector {
                label: "happy",
                confidence: 0.9,
                fail: false,
            },
            StubMatcher { distance: 0.91 },
            FlowOptions::default(),
        );
        fx.controller.submit_document(image("id")).await.unwrap();
        fx.controller.confirm_document().unwrap();
        fx.controller.submit_liveness(image("selfie")).await.unwrap();
        fx.controller.advance_to_final_match().unwrap();

        let err = fx.controller.run_final_match().await.unwrap_err();
        assert!(matches!(err, FlowError::Match(_)));
        assert_eq!(
            fx.controller.session().step,
            VerificationStep::AwaitingFinalMatch
        );
        assert!(fx.controller.session().verification_id.is_none());
        assert_eq!(fx.issuer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn issuance_failure_leaves_the_verification_standing() {
        let extractor = Arc::new(StubExtractor::default());
        let issuer = Arc::new(StubIssuer {
            fail_first: true,
            ..Default::default()
        });
        let collaborators = Collaborators {
            extractor,
            liveness: Arc::new(StubDetector {
                label: "happy",
                confidence: 0.9,
                fail: false,
            }),
            matcher: Arc::new(StubMatcher { distance: 0.23 }),
            issuer: issuer.clone(),
        };
        let mut controller =
            VerificationFlowController::new(collaborators, FlowOptions::default());

        controller.submit_document(image("id")).await.unwrap();
        controller.confirm_document().unwrap();
        controller.submit_liveness(image("selfie")).await.unwrap();
        controller.advance_to_final_match().unwrap();

        let err = controller.run_final_match().await.unwrap_err();
        assert!(matches!(err, FlowError::Certificate(_)));
        assert_eq!(controller.session().step, VerificationStep::Completed);

        // The artifact can be re-requested from the stored snapshot.
        let certificate = controller.issue_certificate().await.unwrap();
        let body = String::from_utf8(certificate.bytes).unwrap();
        assert!(body.contains("Roobika T"));
    }

    #[tokio::test]
    async fn reset_clears_everything_and_returns_to_the_first_step() {
        let mut fx = fixture();
        fx.controller.submit_document(image("id")).await.unwrap();
        fx.controller.confirm_document().unwrap();
        fx.controller.submit_liveness(image("selfie")).await.unwrap();
        fx.controller.advance_to_final_match().unwrap();
        fx.controller.run_final_match().await.unwrap();

        fx.controller.reset();
        let session = fx.controller.session();
        assert_eq!(session.step, VerificationStep::AwaitingDocument);
        assert!(session.extracted_identity.is_none());
        assert!(session.document_image.is_none());
        assert!(session.selfie_image.is_none());
        assert!(session.detected_emotion.is_none());
        assert!(session.verified_name.is_none());
        assert!(session.verification_id.is_none());

        // The flow is fully restartable and extraction runs again.
        fx.controller.submit_document(image("id-2")).await.unwrap();
        assert_eq!(fx.extractor.calls.load(Ordering::SeqCst), 2);
    }
}
