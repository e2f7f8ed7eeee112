//! Cursor store: the id of the last relayed message, persisted as `{"last_rowid": n}`.
//!
//! A missing or unreadable file means "start from 0", never an error.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum CursorError {
    #[error("cursor write failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("cursor encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CursorState {
    #[serde(default, deserialize_with = "lenient_rowid")]
    last_rowid: i64,
}

/// Accepts an integer, a decimal string (`"7"`) or a finite float (`7.0`, truncated).
fn lenient_rowid<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let rowid = match &value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.abs() < i64::MAX as f64)
                .map(|f| f.trunc() as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    rowid.ok_or_else(|| serde::de::Error::custom(format!("last_rowid is not an integer: {}", value)))
}

/// File-backed cursor.
#[derive(Debug, Clone)]
pub struct CursorStore {
    path: PathBuf,
}

impl CursorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last persisted cursor, or 0 when the file is absent or corrupt.
    pub fn load(&self) -> i64 {
        let s = match std::fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("cursor file {} not found, starting at 0", self.path.display());
                return 0;
            }
            Err(e) => {
                log::warn!("cursor file {} unreadable ({}), starting at 0", self.path.display(), e);
                return 0;
            }
        };
        match serde_json::from_str::<CursorState>(&s) {
            Ok(state) => state.last_rowid,
            Err(e) => {
                log::warn!("cursor file {} corrupt ({}), starting at 0", self.path.display(), e);
                0
            }
        }
    }

    /// Persist the cursor. Writes a sibling temp file and renames it over the target.
    pub fn save(&self, last_rowid: i64) -> Result<(), CursorError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(&CursorState { last_rowid })?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
