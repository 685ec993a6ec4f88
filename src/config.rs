use crate::translation::KeyPolicy;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash-lite";
pub const DEFAULT_GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone)]
pub struct Config {
    // Gemini
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_api_url: String,

    // Request behavior
    pub request_timeout: Duration,
    pub max_attempts: u32,
    pub key_policy: KeyPolicy,

    // Archive layout
    pub source_file: String,
    pub target_file: String,
    pub archive_extension: String,
    pub scratch_dir: PathBuf,
}

impl Config {
    /// Settings with defaults for everything but the API key
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            gemini_api_key: api_key.into(),
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            gemini_api_url: DEFAULT_GEMINI_API_URL.to_string(),
            request_timeout: Duration::from_secs(120),
            max_attempts: 3,
            key_policy: KeyPolicy::Strict,
            source_file: "en_us.json".to_string(),
            target_file: "ko_kr.json".to_string(),
            archive_extension: "jar".to_string(),
            scratch_dir: PathBuf::from("temp"),
        }
    }

    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY").context("GEMINI_API_KEY not set")?;
        Self::from_env_with_api_key(api_key)
    }

    /// Read everything but the API key from the environment
    pub fn from_env_with_api_key(api_key: String) -> Result<Self> {
        let defaults = Self::with_api_key(String::new());

        Ok(Self {
            // Gemini
            gemini_api_key: api_key,
            gemini_model: std::env::var("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            gemini_api_url: std::env::var("GEMINI_API_URL").unwrap_or(defaults.gemini_api_url),

            // Request behavior
            request_timeout: std::env::var("TRANSLATE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            max_attempts: std::env::var("TRANSLATE_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_attempts),
            key_policy: match std::env::var("KEY_POLICY") {
                Ok(v) => v.parse().context("Invalid KEY_POLICY")?,
                Err(_) => defaults.key_policy,
            },

            // Archive layout
            source_file: std::env::var("SOURCE_FILE").unwrap_or(defaults.source_file),
            target_file: std::env::var("TARGET_FILE").unwrap_or(defaults.target_file),
            archive_extension: std::env::var("ARCHIVE_EXTENSION")
                .map(|v| v.trim_start_matches('.').to_string())
                .unwrap_or(defaults.archive_extension),
            scratch_dir: std::env::var("SCRATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.scratch_dir),
        })
    }
}
