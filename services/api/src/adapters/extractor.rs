//! services/api/src/adapters/extractor.rs
//!
//! This module contains the adapters for the document-intelligence capability.
//! Both implement the `DocumentExtractionService` port from the `core` crate:
//! a deterministic simulated extractor for demos and tests, and one backed by
//! an OpenAI vision model.

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
use verifly_core::domain::{ExtractedIdentity, ImageData};
use verifly_core::ports::{DocumentExtractionService, PortError, PortResult};

const SYSTEM_INSTRUCTIONS: &str = "You are a KYC document reader. You are shown a photo of an \
identity document (Aadhaar, PAN, driving license or similar). Respond with STRICT JSON only, no \
prose and no markdown fences, using exactly these keys: \
{\"Name\": string, \"DOB\": string, \"ID_Type\": string, \"Address\": string, \"Status\": string}. \
Set Status to \"Clear / Readable\" when every field could be read, otherwise \"Unreadable\".";

//=========================================================================================
// "Impure" Wire Record
//=========================================================================================

/// The JSON shape at the extractor boundary; converted into the domain type.
#[derive(Deserialize)]
struct ExtractionRecord {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "DOB")]
    dob: String,
    #[serde(rename = "ID_Type")]
    id_type: String,
    #[serde(rename = "Address")]
    address: String,
    #[serde(rename = "Status")]
    status: String,
}

impl ExtractionRecord {
    fn to_domain(self) -> ExtractedIdentity {
        ExtractedIdentity {
            name: self.name,
            date_of_birth: self.dob,
            id_type: self.id_type,
            address: self.address,
            readability: self.status,
        }
    }
}

//=========================================================================================
// Simulated Adapter
//=========================================================================================

/// A deterministic extractor that returns a fixed record after a fixed delay,
/// standing in for a real document-intelligence call.
#[derive(Clone)]
pub struct SimulatedExtractor {
    delay: Duration,
}

impl SimulatedExtractor {
    /// Creates a new `SimulatedExtractor` with the given artificial latency.
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl DocumentExtractionService for SimulatedExtractor {
    async fn extract_identity(&self, _document: &ImageData) -> PortResult<ExtractedIdentity> {
        tokio::time::sleep(self.delay).await;
        Ok(ExtractedIdentity {
            name: "Roobika T".to_string(),
            date_of_birth: "01-01-2000".to_string(),
            id_type: "Aadhaar Card".to_string(),
            address: "Peelamedu, Coimbatore-641004".to_string(),
            readability: "Clear / Readable".to_string(),
        })
    }
}

//=========================================================================================
// OpenAI Vision Adapter
//=========================================================================================

/// An adapter that implements `DocumentExtractionService` using an
/// OpenAI-compatible vision model.
#[derive(Clone)]
pub struct OpenAiVisionExtractor {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiVisionExtractor {
    /// Creates a new `OpenAiVisionExtractor`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }
}

#[async_trait]
impl DocumentExtractionService for OpenAiVisionExtractor {
    /// Sends the document image to the vision model and parses the returned
    /// JSON record. A malformed response surfaces as a catchable error.
    async fn extract_identity(&self, document: &ImageData) -> PortResult<ExtractedIdentity> {
        let data_url = format!(
            "data:{};base64,{}",
            document.content_type,
            STANDARD.encode(&document.bytes)
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
            .text("Read this identity document and return the JSON record.")
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
            .ok_or_else(|| PortError::Unexpected("empty extraction response".to_string()))?;

        let record: ExtractionRecord = serde_json::from_str(strip_fences(&content))
            .map_err(|e| PortError::Unexpected(format!("malformed extraction response: {}", e)))?;
        Ok(record.to_domain())
    }
}

/// Models occasionally wrap JSON in markdown fences despite the instructions.
fn strip_fences(content: &str) -> &str {
    content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}
