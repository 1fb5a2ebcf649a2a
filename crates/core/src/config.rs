use std::env;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_u16(key: &str, default: u16) -> u16 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    env_opt(key)
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(default)
}

/// Application configuration assembled from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub agent: AgentConfig,
    /// Verbose logging toggle (`DEBUG=true`).
    pub debug: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Reasoning-engine selection and credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Engine mode: "echo" selects the built-in dev engine; anything else
    /// leaves the engine unconfigured and the stream endpoint returns 503.
    pub engine: String,
    /// API key for a model-backed engine integration.
    pub openai_api_key: Option<String>,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig {
                host: env_or("HOST", "0.0.0.0"),
                port: env_u16("PORT", 8000),
            },
            agent: AgentConfig {
                engine: env_or("AGENT_ENGINE", "echo"),
                openai_api_key: env_opt("OPENAI_API_KEY"),
            },
            debug: env_bool("DEBUG", false),
        }
    }
}
