use std::env;

use once_cell::sync::Lazy;
use tracing::warn;

use crate::storyboard::Language;

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-3-flash-preview";

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub log_dir: String,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub gemini_timeout_seconds: u64,
    pub default_language: Language,
}

pub static CONFIG: Lazy<Config> = Lazy::new(Config::load);

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn first_non_empty_env(names: &[&str]) -> String {
    names
        .iter()
        .filter_map(|name| env::var(name).ok())
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
        .unwrap_or_default()
}

fn parse_default_language(value: &str) -> Language {
    match value.parse::<Language>() {
        Ok(language) => language,
        Err(err) => {
            warn!("{err}; defaulting to CN.");
            Language::Cn
        }
    }
}

fn normalize_base_url(value: String) -> String {
    let trimmed = value.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return DEFAULT_GEMINI_BASE_URL.to_string();
    }
    trimmed.to_string()
}

impl Config {
    /// Reads configuration from the environment. A missing API key is not an
    /// error here; it only surfaces when an analysis is attempted.
    pub fn load() -> Self {
        Config {
            log_level: env_string("LOG_LEVEL", "info").to_lowercase(),
            log_dir: env_string("LOG_DIR", "logs"),
            gemini_api_key: first_non_empty_env(&["GEMINI_API_KEY", "API_KEY"]),
            gemini_model: env_string("GEMINI_MODEL", DEFAULT_GEMINI_MODEL),
            gemini_base_url: normalize_base_url(env_string(
                "GEMINI_BASE_URL",
                DEFAULT_GEMINI_BASE_URL,
            )),
            gemini_timeout_seconds: env_u64("GEMINI_TIMEOUT_SECONDS", 90).max(1),
            default_language: parse_default_language(&env_string("DEFAULT_LANGUAGE", "CN")),
        }
    }
}
