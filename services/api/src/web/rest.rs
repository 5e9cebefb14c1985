//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::i18n::{challenge_prompt, Language};
use crate::web::state::AppState;
use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};
use utoipa::{IntoParams, OpenApi, ToSchema};
use uuid::Uuid;
use verifly_core::domain::{ChallengeKind, ExtractedIdentity, ImageData, VerificationStep};
use verifly_core::flow::{FlowError, VerificationFlowController};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        create_session_handler,
        get_session_handler,
        submit_document_handler,
        confirm_document_handler,
        challenge_audio_handler,
        submit_selfie_handler,
        advance_handler,
        verify_handler,
        certificate_handler,
        reset_handler,
    ),
    components(
        schemas(
            SessionResponse,
            SessionStatusResponse,
            IdentityResponse,
            ExtractionResponse,
            LivenessResponse,
            MatchResponse
        )
    ),
    tags(
        (name = "Veri-fly KYC API", description = "API endpoints for the three-step identity verification flow.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// The response payload sent after creating or resetting a session.
#[derive(Serialize, ToSchema)]
pub struct SessionResponse {
    session_id: Uuid,
    step: String,
    challenge: String,
    created_at: DateTime<Utc>,
}

/// A full snapshot of a session's progress.
#[derive(Serialize, ToSchema)]
pub struct SessionStatusResponse {
    session_id: Uuid,
    step: String,
    challenge: String,
    extracted_identity: Option<IdentityResponse>,
    detected_emotion: Option<String>,
    has_document_image: bool,
    has_selfie_image: bool,
    verification_id: Option<String>,
    created_at: DateTime<Utc>,
}

/// The identity fields read off the uploaded document.
#[derive(Serialize, ToSchema)]
pub struct IdentityResponse {
    name: String,
    date_of_birth: String,
    id_type: String,
    address: String,
    readability: String,
}

impl From<ExtractedIdentity> for IdentityResponse {
    fn from(identity: ExtractedIdentity) -> Self {
        Self {
            name: identity.name,
            date_of_birth: identity.date_of_birth,
            id_type: identity.id_type,
            address: identity.address,
            readability: identity.readability,
        }
    }
}

/// The response payload for a document submission.
#[derive(Serialize, ToSchema)]
pub struct ExtractionResponse {
    session_id: Uuid,
    identity: IdentityResponse,
    step: String,
}

/// The response payload for a liveness attempt.
#[derive(Serialize, ToSchema)]
pub struct LivenessResponse {
    session_id: Uuid,
    challenge: String,
    detected_emotion: String,
    passed: bool,
    step: String,
}

/// The response payload for the final match.
#[derive(Serialize, ToSchema)]
pub struct MatchResponse {
    session_id: Uuid,
    distance: f32,
    verified: bool,
    verification_id: String,
    certificate_file: String,
    step: String,
}

/// Query parameters for the challenge audio cue.
#[derive(Deserialize, IntoParams)]
pub struct ChallengeAudioQuery {
    /// Language code for the spoken guide: en, hi or ta. Defaults to en.
    lang: Option<String>,
}

//=========================================================================================
// Shared Helpers
//=========================================================================================

fn step_name(step: VerificationStep) -> String {
    match step {
        VerificationStep::AwaitingDocument => "awaiting_document",
        VerificationStep::AwaitingLiveness => "awaiting_liveness",
        VerificationStep::AwaitingFinalMatch => "awaiting_final_match",
        VerificationStep::Completed => "completed",
    }
    .to_string()
}

fn challenge_name(challenge: ChallengeKind) -> String {
    match challenge {
        ChallengeKind::Smile => "smile",
        ChallengeKind::Surprise => "surprise",
        ChallengeKind::Neutral => "neutral",
    }
    .to_string()
}

/// Maps flow errors onto HTTP statuses: precondition violations are caller
/// bugs (409), recoverable stage failures invite a retry with fresh input
/// (422), and a failed certificate render is an upstream fault (502).
fn flow_error_response(err: FlowError) -> (StatusCode, String) {
    let status = match &err {
        FlowError::Precondition(_) => StatusCode::CONFLICT,
        FlowError::Extraction(_) | FlowError::Match(_) => StatusCode::UNPROCESSABLE_ENTITY,
        FlowError::Certificate(_) => StatusCode::BAD_GATEWAY,
    };
    (status, err.to_string())
}

async fn lookup_session(
    app_state: &AppState,
    session_id: Uuid,
) -> Result<Arc<Mutex<VerificationFlowController>>, (StatusCode, String)> {
    app_state.sessions.get(session_id).await.ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            format!("Session {} not found", session_id),
        )
    })
}

/// Reads the single image part of a multipart upload.
async fn read_image_part(mut multipart: Multipart) -> Result<ImageData, (StatusCode, String)> {
    if let Some(field) = multipart.next_field().await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to read multipart data: {}", e),
        )
    })? {
        let content_type = field.content_type().unwrap_or("image/jpeg").to_string();
        let data = field.bytes().await.map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to read file bytes: {}", e),
            )
        })?;
        if data.is_empty() {
            return Err((
                StatusCode::BAD_REQUEST,
                "Uploaded image is empty".to_string(),
            ));
        }
        Ok(ImageData {
            bytes: data,
            content_type,
        })
    } else {
        Err((
            StatusCode::BAD_REQUEST,
            "Multipart form must include an image file".to_string(),
        ))
    }
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Create a new verification session.
///
/// The liveness challenge is sampled at creation and stays fixed until reset.
#[utoipa::path(
    post,
    path = "/sessions",
    responses(
        (status = 201, description = "Session created successfully", body = SessionResponse)
    )
)]
pub async fn create_session_handler(
    State(app_state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let (session_id, handle) = app_state
        .sessions
        .create(app_state.collaborators.clone(), app_state.flow_options)
        .await;
    let controller = handle.lock().await;
    let session = controller.session();
    info!(
        "Created session {} with challenge {:?}",
        session_id, session.challenge
    );

    (
        StatusCode::CREATED,
        Json(SessionResponse {
            session_id,
            step: step_name(session.step),
            challenge: challenge_name(session.challenge),
            created_at: session.created_at,
        }),
    )
}

/// Get a snapshot of a session's progress.
#[utoipa::path(
    get,
    path = "/sessions/{session_id}",
    responses(
        (status = 200, description = "Session snapshot", body = SessionStatusResponse),
        (status = 404, description = "Session not found")
    ),
    params(
        ("session_id" = Uuid, Path, description = "The verification session ID.")
    )
)]
pub async fn get_session_handler(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let handle = lookup_session(&app_state, session_id).await?;
    let controller = handle.lock().await;
    let session = controller.session();

    Ok(Json(SessionStatusResponse {
        session_id,
        step: step_name(session.step),
        challenge: challenge_name(session.challenge),
        extracted_identity: session.extracted_identity.clone().map(Into::into),
        detected_emotion: session.detected_emotion.clone(),
        has_document_image: session.document_image.is_some(),
        has_selfie_image: session.selfie_image.is_some(),
        verification_id: session.verification_id.clone(),
        created_at: session.created_at,
    }))
}

/// Upload an ID document and run field extraction.
///
/// Accepts a multipart/form-data request with a single image part. Repeated
/// submissions while an extraction is already cached return the cached fields
/// without re-running the extractor.
#[utoipa::path(
    post,
    path = "/sessions/{session_id}/document",
    request_body(content_type = "multipart/form-data", description = "The ID document image."),
    responses(
        (status = 200, description = "Identity fields extracted", body = ExtractionResponse),
        (status = 404, description = "Session not found"),
        (status = 409, description = "Session is past the document step"),
        (status = 422, description = "Document unreadable or extractor unavailable")
    ),
    params(
        ("session_id" = Uuid, Path, description = "The verification session ID.")
    )
)]
pub async fn submit_document_handler(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
    multipart: Multipart,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let image = read_image_part(multipart).await?;
    let handle = lookup_session(&app_state, session_id).await?;
    let mut controller = handle.lock().await;

    let identity = controller.submit_document(image).await.map_err(|e| {
        error!("Document extraction failed for session {}: {}", session_id, e);
        flow_error_response(e)
    })?;
    info!("Extraction complete for session {}", session_id);

    Ok(Json(ExtractionResponse {
        session_id,
        identity: identity.into(),
        step: step_name(controller.session().step),
    }))
}

/// Confirm the extracted identity and move on to the liveness challenge.
#[utoipa::path(
    post,
    path = "/sessions/{session_id}/document/confirm",
    responses(
        (status = 200, description = "Document confirmed", body = SessionResponse),
        (status = 404, description = "Session not found"),
        (status = 409, description = "No completed extraction to confirm")
    ),
    params(
        ("session_id" = Uuid, Path, description = "The verification session ID.")
    )
)]
pub async fn confirm_document_handler(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let handle = lookup_session(&app_state, session_id).await?;
    let mut controller = handle.lock().await;

    controller.confirm_document().map_err(flow_error_response)?;
    let session = controller.session();
    info!("Session {} confirmed its document", session_id);

    Ok(Json(SessionResponse {
        session_id,
        step: step_name(session.step),
        challenge: challenge_name(session.challenge),
        created_at: session.created_at,
    }))
}

/// Hear the liveness challenge as a spoken audio cue.
#[utoipa::path(
    get,
    path = "/sessions/{session_id}/challenge-audio",
    responses(
        (status = 200, description = "Spoken challenge instruction", body = Vec<u8>, content_type = "audio/mpeg"),
        (status = 400, description = "Unsupported language code"),
        (status = 404, description = "Session not found"),
        (status = 502, description = "Speech backend unavailable")
    ),
    params(
        ("session_id" = Uuid, Path, description = "The verification session ID."),
        ChallengeAudioQuery
    )
)]
pub async fn challenge_audio_handler(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
    Query(query): Query<ChallengeAudioQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let language = query
        .lang
        .as_deref()
        .unwrap_or("en")
        .parse::<Language>()
        .map_err(|e| (StatusCode::BAD_REQUEST, e))?;

    let challenge = {
        let handle = lookup_session(&app_state, session_id).await?;
        let controller = handle.lock().await;
        controller.session().challenge
    };

    let text = challenge_prompt(language, challenge);
    let audio = app_state.speech_adapter.synthesize(text).await.map_err(|e| {
        error!("Challenge audio synthesis failed: {}", e);
        (StatusCode::BAD_GATEWAY, "Failed to generate audio".to_string())
    })?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "audio/mpeg".to_string())],
        audio,
    ))
}

/// Submit a selfie for the liveness challenge.
///
/// Accepts a multipart/form-data request with a single image part. A failed
/// attempt leaves the session in the liveness step with the same challenge.
#[utoipa::path(
    post,
    path = "/sessions/{session_id}/selfie",
    request_body(content_type = "multipart/form-data", description = "The selfie capture."),
    responses(
        (status = 200, description = "Liveness attempt evaluated", body = LivenessResponse),
        (status = 404, description = "Session not found"),
        (status = 409, description = "Session is not in the liveness step")
    ),
    params(
        ("session_id" = Uuid, Path, description = "The verification session ID.")
    )
)]
pub async fn submit_selfie_handler(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
    multipart: Multipart,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let image = read_image_part(multipart).await?;
    let handle = lookup_session(&app_state, session_id).await?;
    let mut controller = handle.lock().await;

    let result = controller
        .submit_liveness(image)
        .await
        .map_err(flow_error_response)?;
    info!(
        "Liveness attempt for session {}: detected '{}', passed={}",
        session_id, result.detected_emotion, result.passed
    );

    Ok(Json(LivenessResponse {
        session_id,
        challenge: challenge_name(result.challenge),
        detected_emotion: result.detected_emotion,
        passed: result.passed,
        step: step_name(controller.session().step),
    }))
}

/// Advance to the final match after a passed liveness attempt.
#[utoipa::path(
    post,
    path = "/sessions/{session_id}/advance",
    responses(
        (status = 200, description = "Advanced to the final match", body = SessionResponse),
        (status = 404, description = "Session not found"),
        (status = 409, description = "No passed liveness selfie on the session")
    ),
    params(
        ("session_id" = Uuid, Path, description = "The verification session ID.")
    )
)]
pub async fn advance_handler(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let handle = lookup_session(&app_state, session_id).await?;
    let mut controller = handle.lock().await;

    controller
        .advance_to_final_match()
        .map_err(flow_error_response)?;
    let session = controller.session();

    Ok(Json(SessionResponse {
        session_id,
        step: step_name(session.step),
        challenge: challenge_name(session.challenge),
        created_at: session.created_at,
    }))
}

/// Run the final document-vs-selfie match and issue the certificate.
#[utoipa::path(
    post,
    path = "/sessions/{session_id}/verify",
    responses(
        (status = 200, description = "Identity verified, certificate issued", body = MatchResponse),
        (status = 404, description = "Session not found"),
        (status = 409, description = "Session is not in the final match step"),
        (status = 422, description = "Match distance above the threshold"),
        (status = 502, description = "Certificate rendering failed; verification stands")
    ),
    params(
        ("session_id" = Uuid, Path, description = "The verification session ID.")
    )
)]
pub async fn verify_handler(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let handle = lookup_session(&app_state, session_id).await?;
    let mut controller = handle.lock().await;

    let outcome = controller.run_final_match().await.map_err(|e| {
        error!("Final match failed for session {}: {}", session_id, e);
        flow_error_response(e)
    })?;
    info!(
        "Session {} verified with distance {:.2} ({})",
        session_id, outcome.result.distance, outcome.verification_id
    );

    Ok(Json(MatchResponse {
        session_id,
        distance: outcome.result.distance,
        verified: outcome.result.verified,
        verification_id: outcome.verification_id,
        certificate_file: outcome.certificate.file_name,
        step: step_name(controller.session().step),
    }))
}

/// Download the verification certificate for a completed session.
#[utoipa::path(
    get,
    path = "/sessions/{session_id}/certificate",
    responses(
        (status = 200, description = "The certificate artifact", body = Vec<u8>, content_type = "application/pdf"),
        (status = 404, description = "Session not found"),
        (status = 409, description = "Session is not completed"),
        (status = 502, description = "Certificate rendering failed")
    ),
    params(
        ("session_id" = Uuid, Path, description = "The verification session ID.")
    )
)]
pub async fn certificate_handler(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let handle = lookup_session(&app_state, session_id).await?;
    let controller = handle.lock().await;

    let certificate = controller
        .issue_certificate()
        .await
        .map_err(flow_error_response)?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", certificate.file_name),
            ),
        ],
        certificate.bytes,
    ))
}

/// Start the verification over from the first step.
///
/// Clears all extracted and captured data and re-rolls the challenge.
#[utoipa::path(
    post,
    path = "/sessions/{session_id}/reset",
    responses(
        (status = 200, description = "Session reset", body = SessionResponse),
        (status = 404, description = "Session not found")
    ),
    params(
        ("session_id" = Uuid, Path, description = "The verification session ID.")
    )
)]
pub async fn reset_handler(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let handle = lookup_session(&app_state, session_id).await?;
    let mut controller = handle.lock().await;

    controller.reset();
    let session = controller.session();
    info!("Session {} was reset", session_id);

    Ok(Json(SessionResponse {
        session_id,
        step: step_name(session.step),
        challenge: challenge_name(session.challenge),
        created_at: session.created_at,
    }))
}
