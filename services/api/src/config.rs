//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;
use verifly_core::flow::{DetectorFallback, FlowOptions, LivenessPolicy};

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    pub openai_api_key: Option<String>,
    pub vision_model: String,
    pub emotion_model: String,
    pub tts_voice: String,
    pub liveness_policy: LivenessPolicy,
    pub detector_fallback: DetectorFallback,
    pub match_threshold: f32,
    pub call_timeout: Duration,
    pub simulated_delay: Duration,
    pub certificate_issuer: String,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load API Keys (as optional; absent means fully simulated adapters) ---
        let openai_api_key = std::env::var("OPENAI_API_KEY").ok();

        // --- Load Adapter-specific Settings ---
        let vision_model =
            std::env::var("VISION_MODEL").unwrap_or_else(|_| "gpt-4o".to_string());
        let emotion_model =
            std::env::var("EMOTION_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        let tts_voice = std::env::var("TTS_VOICE").unwrap_or_else(|_| "alloy".to_string());
        let certificate_issuer =
            std::env::var("CERTIFICATE_ISSUER").unwrap_or_else(|_| "Veri-fly AI".to_string());

        // --- Load Flow Policy Settings ---
        let liveness_policy_str =
            std::env::var("LIVENESS_POLICY").unwrap_or_else(|_| "always_pass".to_string());
        let liveness_policy = parse_liveness_policy(&liveness_policy_str)?;

        let detector_fallback_str =
            std::env::var("DETECTOR_FALLBACK").unwrap_or_else(|_| "assume_match".to_string());
        let detector_fallback = match detector_fallback_str.as_str() {
            "assume_match" => DetectorFallback::AssumeChallengeMet,
            "fail_closed" => DetectorFallback::FailClosed,
            other => {
                return Err(ConfigError::InvalidValue(
                    "DETECTOR_FALLBACK".to_string(),
                    format!("'{}' is not a valid fallback mode", other),
                ))
            }
        };

        let match_threshold = parse_env_f32("MATCH_THRESHOLD", 0.4)?;
        let call_timeout = Duration::from_secs(parse_env_u64("CALL_TIMEOUT_SECS", 30)?);
        let simulated_delay = Duration::from_millis(parse_env_u64("SIMULATED_DELAY_MS", 2000)?);

        Ok(Self {
            bind_address,
            log_level,
            openai_api_key,
            vision_model,
            emotion_model,
            tts_voice,
            liveness_policy,
            detector_fallback,
            match_threshold,
            call_timeout,
            simulated_delay,
            certificate_issuer,
        })
    }

    /// Assembles the flow controller options selected by this configuration.
    pub fn flow_options(&self) -> FlowOptions {
        FlowOptions {
            liveness_policy: self.liveness_policy,
            detector_fallback: self.detector_fallback,
            match_threshold: self.match_threshold,
            call_timeout: self.call_timeout,
        }
    }
}

/// Parses `LIVENESS_POLICY`: `always_pass`, `exact_match` or `confidence:<f32>`.
fn parse_liveness_policy(value: &str) -> Result<LivenessPolicy, ConfigError> {
    match value {
        "always_pass" => Ok(LivenessPolicy::AlwaysPass),
        "exact_match" => Ok(LivenessPolicy::ExactMatch),
        other => {
            if let Some(threshold) = other.strip_prefix("confidence:") {
                let min_confidence = threshold.parse::<f32>().map_err(|_| {
                    ConfigError::InvalidValue(
                        "LIVENESS_POLICY".to_string(),
                        format!("'{}' is not a valid confidence value", threshold),
                    )
                })?;
                return Ok(LivenessPolicy::ConfidenceThreshold { min_confidence });
            }
            Err(ConfigError::InvalidValue(
                "LIVENESS_POLICY".to_string(),
                format!("'{}' is not a valid liveness policy", other),
            ))
        }
    }
}

fn parse_env_f32(var: &str, default: f32) -> Result<f32, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => raw
            .parse::<f32>()
            .map_err(|e| ConfigError::InvalidValue(var.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

fn parse_env_u64(var: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => raw
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidValue(var.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn liveness_policy_strings_parse_to_strategies() {
        assert_eq!(
            parse_liveness_policy("always_pass").unwrap(),
            LivenessPolicy::AlwaysPass
        );
        assert_eq!(
            parse_liveness_policy("exact_match").unwrap(),
            LivenessPolicy::ExactMatch
        );
        match parse_liveness_policy("confidence:0.75").unwrap() {
            LivenessPolicy::ConfidenceThreshold { min_confidence } => {
                assert!((min_confidence - 0.75).abs() < f32::EPSILON);
            }
            other => panic!("expected a confidence policy, got {:?}", other),
        }
    }

    #[test]
    fn malformed_policy_strings_are_rejected() {
        assert!(parse_liveness_policy("strict").is_err());
        assert!(parse_liveness_policy("confidence:high").is_err());
        assert!(parse_liveness_policy("confidence:").is_err());
    }
}
