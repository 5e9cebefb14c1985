pub mod domain;
pub mod flow;
pub mod ports;

pub use domain::{
    Certificate, ChallengeKind, EmotionReading, ExtractedIdentity, FaceComparison, ImageData,
    LivenessResult, MatchResult, VerificationSession, VerificationStep,
};
pub use flow::{
    Collaborators, DetectorFallback, FlowError, FlowOptions, FlowResult, LivenessPolicy,
    VerificationFlowController, VerificationOutcome,
};
pub use ports::{
    CertificateService, DocumentExtractionService, FaceMatchService, LivenessDetectionService,
    PortError, PortResult, SpeechService,
};
