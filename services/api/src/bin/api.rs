//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{
        OpenAiEmotionAdapter, OpenAiTtsAdapter, OpenAiVisionExtractor, PdfCertificateAdapter,
        SilentSpeechAdapter, SimulatedEmotionDetector, SimulatedExtractor, SimulatedFaceMatcher,
    },
    config::Config,
    error::ApiError,
    web::{
        advance_handler, certificate_handler, challenge_audio_handler, confirm_document_handler,
        create_session_handler, get_session_handler, reset_handler,
        rest::ApiDoc,
        state::{AppState, SessionStore},
        submit_document_handler, submit_selfie_handler, verify_handler,
    },
};
use async_openai::{
    config::OpenAIConfig,
    types::{SpeechModel, Voice},
    Client,
};
use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use verifly_core::flow::Collaborators;
use verifly_core::ports::{
    DocumentExtractionService, LivenessDetectionService, SpeechService,
};

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Initialize Service Adapters ---
    // With an API key the vision, emotion and speech collaborators run against
    // OpenAI; without one every collaborator is simulated and the flow still
    // works end to end in demo mode.
    let extractor: Arc<dyn DocumentExtractionService>;
    let liveness: Arc<dyn LivenessDetectionService>;
    let speech_adapter: Arc<dyn SpeechService>;

    if let Some(api_key) = &config.openai_api_key {
        let openai_config = OpenAIConfig::new().with_api_key(api_key);
        let openai_client = Client::with_config(openai_config);

        extractor = Arc::new(OpenAiVisionExtractor::new(
            openai_client.clone(),
            config.vision_model.clone(),
        ));
        liveness = Arc::new(OpenAiEmotionAdapter::new(
            openai_client.clone(),
            config.emotion_model.clone(),
        ));

        let tts_voice = match config.tts_voice.to_lowercase().as_str() {
            "alloy" => Voice::Alloy,
            "echo" => Voice::Echo,
            "fable" => Voice::Fable,
            "onyx" => Voice::Onyx,
            "nova" => Voice::Nova,
            "shimmer" => Voice::Shimmer,
            _ => {
                return Err(ApiError::Internal(format!(
                    "Invalid TTS voice specified in config: '{}'",
                    config.tts_voice
                )))
            }
        };
        speech_adapter = Arc::new(OpenAiTtsAdapter::new(
            openai_client,
            SpeechModel::Tts1Hd,
            tts_voice,
        ));
        info!("Running with OpenAI-backed vision, emotion and speech adapters.");
    } else {
        extractor = Arc::new(SimulatedExtractor::new(config.simulated_delay));
        liveness = Arc::new(SimulatedEmotionDetector::new(config.simulated_delay));
        speech_adapter = Arc::new(SilentSpeechAdapter);
        info!("No OPENAI_API_KEY set; running with fully simulated adapters.");
    }

    // The face matcher and certificate renderer have no model backend.
    let matcher = Arc::new(SimulatedFaceMatcher::new(config.simulated_delay));
    let issuer = Arc::new(PdfCertificateAdapter::new(config.certificate_issuer.clone()));

    let collaborators = Collaborators {
        extractor,
        liveness,
        matcher,
        issuer,
    };

    // --- 3. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        config: config.clone(),
        collaborators,
        flow_options: config.flow_options(),
        speech_adapter,
        sessions: SessionStore::new(),
    });

    let cors = CorsLayer::new()
        .allow_origin("http://localhost:3000".parse::<HeaderValue>().unwrap())
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 4. Create the Web Router ---
    let api_router = Router::new()
        .route("/sessions", post(create_session_handler))
        .route("/sessions/{session_id}", get(get_session_handler))
        .route(
            "/sessions/{session_id}/document",
            post(submit_document_handler),
        )
        .route(
            "/sessions/{session_id}/document/confirm",
            post(confirm_document_handler),
        )
        .route(
            "/sessions/{session_id}/challenge-audio",
            get(challenge_audio_handler),
        )
        .route("/sessions/{session_id}/selfie", post(submit_selfie_handler))
        .route("/sessions/{session_id}/advance", post(advance_handler))
        .route("/sessions/{session_id}/verify", post(verify_handler))
        .route(
            "/sessions/{session_id}/certificate",
            get(certificate_handler),
        )
        .route("/sessions/{session_id}/reset", post(reset_handler))
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024))
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 5. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
