pub mod certificate;
pub mod extractor;
pub mod face_match;
pub mod liveness;
pub mod tts;

pub use certificate::PdfCertificateAdapter;
pub use extractor::{OpenAiVisionExtractor, SimulatedExtractor};
pub use face_match::SimulatedFaceMatcher;
pub use liveness::{OpenAiEmotionAdapter, SimulatedEmotionDetector};
pub use tts::{OpenAiTtsAdapter, SilentSpeechAdapter};
