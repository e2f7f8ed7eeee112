//! Relay: polls the Messages database and relays each new message to the backend.
//!
//! One process per message store. The relay owns the cursor file; nothing else writes it.

mod client;
mod cursor;
mod runner;

pub use client::{Backend, RelayClient, RelayError, DEFAULT_TIMEOUT};
pub use cursor::{CursorError, CursorStore};
pub use runner::{CycleSummary, RelayLoop, STALL_WARN_CYCLES};

use crate::channels::{AppleScriptSender, ChatDbSource};
use crate::config::{self, Config, CursorAdvance, EnvLookup};
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Fully resolved relay settings. Build with [`RelaySettings::from_config`], then apply
/// command-line [`RelayOverrides`].
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub endpoint: String,
    pub token: Option<String>,
    pub poll_interval: Duration,
    pub cursor_advance: CursorAdvance,
    pub chat_db: PathBuf,
    pub state_path: PathBuf,
}

impl RelaySettings {
    /// Resolve from the process environment, then config file, then defaults.
    pub fn from_config(config: &Config) -> Self {
        Self::resolve(config, &config::process_env)
    }

    pub fn resolve(config: &Config, env: EnvLookup<'_>) -> Self {
        Self {
            endpoint: config::resolve_relay_endpoint(config, env),
            token: config::resolve_relay_token(config, env),
            poll_interval: config::resolve_poll_interval(config, env),
            cursor_advance: config.relay.cursor_advance,
            chat_db: config::resolve_chat_db_path(config),
            state_path: config::resolve_state_path(config),
        }
    }

    /// Apply command-line values, which take precedence over env and config.
    /// Blank strings are ignored; a blank token leaves the resolved token in place.
    pub fn apply(&mut self, overrides: RelayOverrides) {
        if let Some(server) = overrides.server.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            self.endpoint = server.to_string();
        }
        if let Some(secs) = overrides.poll_interval {
            self.poll_interval = config::poll_interval_from_secs(secs);
        }
        if let Some(token) = overrides.token.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            self.token = Some(token.to_string());
        }
        if let Some(advance) = overrides.cursor_advance {
            self.cursor_advance = advance;
        }
    }
}

/// Relay settings given on the command line.
#[derive(Debug, Clone, Default)]
pub struct RelayOverrides {
    pub server: Option<String>,
    pub poll_interval: Option<f64>,
    pub token: Option<String>,
    pub cursor_advance: Option<CursorAdvance>,
}

/// Run the relay until Ctrl+C or SIGTERM.
///
/// Fails before polling starts when not on macOS or when the Messages database is
/// missing or cannot be opened.
pub async fn run_relay(settings: RelaySettings) -> Result<()> {
    if !cfg!(target_os = "macos") {
        anyhow::bail!("the iMessage relay only runs on macOS (Messages database and osascript required)");
    }
    let source = ChatDbSource::open(&settings.chat_db)
        .with_context(|| format!("opening Messages database {}", settings.chat_db.display()))?;
    let backend = RelayClient::new(settings.endpoint.clone(), settings.token.clone(), DEFAULT_TIMEOUT)
        .context("building backend HTTP client")?;
    let store = CursorStore::new(settings.state_path.clone());

    log::info!(
        "relay: watching {} -> {} every {:?} (cursor {}, policy {:?})",
        settings.chat_db.display(),
        backend.endpoint(),
        settings.poll_interval,
        store.path().display(),
        settings.cursor_advance
    );

    let mut relay = RelayLoop::new(
        source,
        backend,
        AppleScriptSender::new(),
        store,
        settings.cursor_advance,
    );
    tokio::select! {
        _ = relay.run(settings.poll_interval) => {},
        _ = crate::shutdown::wait_for_shutdown() => {},
    }
    log::info!("relay: stopped at message {}", relay.cursor());
    Ok(())
}
