//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.murmur/config.json`) and environment.
//! Read once at startup; nothing here is reloaded while the relay or gateway runs.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Literal default for the relay's backend endpoint.
pub const DEFAULT_RELAY_ENDPOINT: &str = "http://localhost:8001/api/v1/bridge/imessage";

/// Default poll interval in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: f64 = 1.5;

const DEFAULT_OLLAMA_HOST: &str = "http://127.0.0.1:11434";

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Relay (message store poller) settings.
    #[serde(default)]
    pub relay: RelayConfig,

    /// Gateway server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Agent runtime defaults (Ollama host, model, system prompt).
    #[serde(default)]
    pub agents: AgentsConfig,
}

/// Which cursor advancement policy the relay loop uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CursorAdvance {
    /// Every completed message moves the cursor to its id, even when an earlier
    /// message in the same cycle failed. The failed message is then never retried.
    #[default]
    LatestCompleted,

    /// The cursor only moves through an unbroken run of completed messages. A message
    /// that fails on every cycle holds the cursor in place for good; the relay logs a
    /// warning every few cycles while that lasts.
    InOrder,
}

/// Relay settings. Every field is optional; see the `resolve_*` helpers for defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayConfig {
    /// Backend endpoint. Overridden by MURMUR_BRIDGE_ENDPOINT env.
    pub endpoint: Option<String>,
    /// Poll interval in seconds. Overridden by MURMUR_BRIDGE_POLL env.
    pub poll_interval: Option<f64>,
    /// Bearer token sent to the backend. Overridden by MURMUR_BRIDGE_TOKEN env.
    pub token: Option<String>,
    #[serde(default)]
    pub cursor_advance: CursorAdvance,
    /// Messages database (default ~/Library/Messages/chat.db).
    pub chat_db: Option<PathBuf>,
    /// Cursor file (default ~/.murmur/imessage_state.json).
    pub state_path: Option<PathBuf>,
}

/// Gateway bind, port, auth, and session table settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for HTTP (default 8001).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,

    #[serde(default)]
    pub auth: GatewayAuthConfig,

    /// Upper bound on live conversation sessions. Absent means unbounded.
    #[serde(default)]
    pub max_sessions: Option<usize>,
}

/// Gateway auth: when a token is set, bridge requests must carry it as a bearer token.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayAuthConfig {
    /// Shared secret. Overridden by MURMUR_GATEWAY_TOKEN env.
    pub token: Option<String>,
}

fn default_gateway_port() -> u16 {
    8001
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
            auth: GatewayAuthConfig::default(),
            max_sessions: None,
        }
    }
}

/// Agent defaults (Ollama host and model).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentsConfig {
    /// Ollama base URL. Overridden by OLLAMA_HOST env.
    pub ollama_host: Option<String>,
    /// Model name as listed by `ollama list` (e.g. "llama3.2:latest").
    pub default_model: Option<String>,
    /// Replaces the built-in system prompt when set.
    pub system_prompt: Option<String>,
}

/// Environment lookup used by the `resolve_*` helpers. Production code passes
/// [`process_env`]; tests pass a fixed map.
pub type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Reads the process environment.
pub fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Non-blank, trimmed value of an environment variable.
fn env_non_empty(env: EnvLookup<'_>, key: &str) -> Option<String> {
    env(key).and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

fn trimmed(value: Option<&String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Resolve the relay endpoint: env MURMUR_BRIDGE_ENDPOINT, then config, then the literal default.
pub fn resolve_relay_endpoint(config: &Config, env: EnvLookup<'_>) -> String {
    env_non_empty(env, "MURMUR_BRIDGE_ENDPOINT")
        .or_else(|| trimmed(config.relay.endpoint.as_ref()))
        .unwrap_or_else(|| DEFAULT_RELAY_ENDPOINT.to_string())
}

/// Resolve the relay bearer token: env MURMUR_BRIDGE_TOKEN overrides config.
pub fn resolve_relay_token(config: &Config, env: EnvLookup<'_>) -> Option<String> {
    env_non_empty(env, "MURMUR_BRIDGE_TOKEN").or_else(|| trimmed(config.relay.token.as_ref()))
}

/// Resolve the poll interval: env MURMUR_BRIDGE_POLL (seconds), then config, then 1.5s.
/// An unparsable env value is ignored; non-finite or non-positive values fall back to the default.
pub fn resolve_poll_interval(config: &Config, env: EnvLookup<'_>) -> Duration {
    let from_env = env_non_empty(env, "MURMUR_BRIDGE_POLL").and_then(|s| match s.parse::<f64>() {
        Ok(v) => Some(v),
        Err(_) => {
            log::warn!("ignoring unparsable MURMUR_BRIDGE_POLL={:?}", s);
            None
        }
    });
    let secs = from_env
        .or(config.relay.poll_interval)
        .unwrap_or(DEFAULT_POLL_INTERVAL_SECS);
    poll_interval_from_secs(secs)
}

/// Convert seconds to a Duration, falling back to the default for invalid values.
pub fn poll_interval_from_secs(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::from_secs_f64(secs)
    } else {
        log::warn!(
            "invalid poll interval {}, using {}s",
            secs,
            DEFAULT_POLL_INTERVAL_SECS
        );
        Duration::from_secs_f64(DEFAULT_POLL_INTERVAL_SECS)
    }
}

/// Resolve the gateway token: env MURMUR_GATEWAY_TOKEN overrides config.
pub fn resolve_gateway_token(config: &Config, env: EnvLookup<'_>) -> Option<String> {
    env_non_empty(env, "MURMUR_GATEWAY_TOKEN")
        .or_else(|| trimmed(config.gateway.auth.token.as_ref()))
}

/// Resolve the Ollama host: env OLLAMA_HOST, then config, then the local default.
pub fn resolve_ollama_host(config: &Config, env: EnvLookup<'_>) -> String {
    env_non_empty(env, "OLLAMA_HOST")
        .or_else(|| trimmed(config.agents.ollama_host.as_ref()))
        .unwrap_or_else(|| DEFAULT_OLLAMA_HOST.to_string())
}

/// Messages database path from config or the macOS default.
pub fn resolve_chat_db_path(config: &Config) -> PathBuf {
    config.relay.chat_db.clone().unwrap_or_else(|| {
        dirs::home_dir()
            .map(|h| h.join("Library").join("Messages").join("chat.db"))
            .unwrap_or_else(|| PathBuf::from("chat.db"))
    })
}

/// Cursor file path from config or ~/.murmur/imessage_state.json.
pub fn resolve_state_path(config: &Config) -> PathBuf {
    config.relay.state_path.clone().unwrap_or_else(|| {
        dirs::home_dir()
            .map(|h| h.join(".murmur").join("imessage_state.json"))
            .unwrap_or_else(|| PathBuf::from("imessage_state.json"))
    })
}

/// True if the bind address is loopback (127.0.0.1, ::1, etc.).
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    b == "127.0.0.1" || b == "::1" || b == "localhost"
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("MURMUR_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".murmur").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the given path, the default path, or MURMUR_CONFIG_PATH. Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = read_config_file(&path)?;
    Ok((config, path))
}

fn read_config_file(path: &Path) -> Result<Config> {
    if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        return Ok(Config::default());
    }
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("reading config from {}", path.display()))?;
    serde_json::from_str(&s).with_context(|| format!("parsing config from {}", path.display()))
}
