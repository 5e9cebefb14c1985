//! services/api/src/adapters/liveness.rs
//!
//! This module contains the adapters for the liveness emotion detector.
//! Both implement the `LivenessDetectionService` port from the `core` crate.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestMessageContentPartImageArgs,
        ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs, ImageUrlArgs,
    },
    Client,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use std::time::Duration;
use verifly_core::domain::{ChallengeKind, EmotionReading, ImageData};
use verifly_core::ports::{LivenessDetectionService, PortError, PortResult};

const SYSTEM_INSTRUCTIONS: &str = "You are a facial-expression classifier for a liveness check. \
You are shown one selfie. Respond with STRICT JSON only, no prose and no markdown fences: \
{\"emotion\": string, \"confidence\": number}. The emotion must be exactly one of \
happy, sad, angry, surprise, fear, disgust, neutral. The confidence is between 0 and 1.";

//=========================================================================================
// Simulated Adapter
//=========================================================================================

/// A detector stand-in that always reports the emotion the challenge asked
/// for, after a fixed delay. Used when no model backend is configured.
#[derive(Clone)]
pub struct SimulatedEmotionDetector {
    delay: Duration,
}

impl SimulatedEmotionDetector {
    /// Creates a new `SimulatedEmotionDetector` with the given artificial latency.
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl LivenessDetectionService for SimulatedEmotionDetector {
    async fn detect_emotion(
        &self,
        challenge: ChallengeKind,
        _selfie: &ImageData,
    ) -> PortResult<EmotionReading> {
        tokio::time::sleep(self.delay).await;
        Ok(EmotionReading {
            label: challenge.expected_emotion().to_string(),
            confidence: 1.0,
        })
    }
}

//=========================================================================================
// OpenAI Vision Adapter
//=========================================================================================

/// The JSON shape at the detector boundary; converted into the domain type.
#[derive(Deserialize)]
struct EmotionRecord {
    emotion: String,
    confidence: f32,
}

/// An adapter that implements `LivenessDetectionService` using an
/// OpenAI-compatible vision model.
#[derive(Clone)]
pub struct OpenAiEmotionAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiEmotionAdapter {
    /// Creates a new `OpenAiEmotionAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }
}

#[async_trait]
impl LivenessDetectionService for OpenAiEmotionAdapter {
    async fn detect_emotion(
        &self,
        _challenge: ChallengeKind,
        selfie: &ImageData,
    ) -> PortResult<EmotionReading> {
        let data_url = format!(
            "data:{};base64,{}",
            selfie.content_type,
            STANDARD.encode(&selfie.bytes)
        );

        let image_part = ChatCompletionRequestMessageContentPartImageArgs::default()
            .image_url(
                ImageUrlArgs::default()
                    .url(data_url)
                    .build()
                    .map_err(|e| PortError::Unexpected(e.to_string()))?,
            )
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        let text_part = ChatCompletionRequestMessageContentPartTextArgs::default()
            .text("Classify the dominant facial emotion in this selfie.")
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(SYSTEM_INSTRUCTIONS)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(vec![text_part.into(), image_part.into()])
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        // Call the API and manually map the error, which respects the orphan rule.
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| PortError::Unexpected("empty emotion response".to_string()))?;

        let record: EmotionRecord = serde_json::from_str(content.trim())
            .map_err(|e| PortError::Unexpected(format!("malformed emotion response: {}", e)))?;

        Ok(EmotionReading {
            label: record.emotion.to_ascii_lowercase(),
            confidence: record.confidence.clamp(0.0, 1.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[tokio::test]
    async fn simulated_detector_echoes_the_challenge() {
        let detector = SimulatedEmotionDetector::new(Duration::ZERO);
        let selfie = ImageData {
            bytes: Bytes::from_static(b"selfie"),
            content_type: "image/jpeg".to_string(),
        };

        let reading = detector
            .detect_emotion(ChallengeKind::Surprise, &selfie)
            .await
            .unwrap();
        assert_eq!(reading.label, "surprise");
        assert!((reading.confidence - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn emotion_records_parse_and_clamp() {
        let record: EmotionRecord =
            serde_json::from_str(r#"{"emotion": "HAPPY", "confidence": 1.4}"#).unwrap();
        assert_eq!(record.emotion.to_ascii_lowercase(), "happy");
        assert!((record.confidence.clamp(0.0, 1.0) - 1.0).abs() < f32::EPSILON);
    }
}
