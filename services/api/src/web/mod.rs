pub mod rest;
pub mod state;

// Re-export the handlers to make them easily accessible
// to the binary that will build the web server router.
pub use rest::{
    advance_handler, certificate_handler, challenge_audio_handler, confirm_document_handler,
    create_session_handler, get_session_handler, reset_handler, submit_document_handler,
    submit_selfie_handler, verify_handler,
};
