//! Device identity and local flags, persisted across restarts.
//!
//! The device identifier is a client-generated random token used only to
//! scope session ids -- it is not an authentication credential. It lives
//! in a small JSON file next to the voluntary-logout flag so both survive
//! application restarts.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use quantdesk_core::types::DbId;

#[derive(Debug, Serialize, Deserialize)]
struct PersistedState {
    device_id: String,
    #[serde(default)]
    voluntary_logout: bool,
}

/// Errors reading or writing the local state file.
#[derive(Debug, thiserror::Error)]
pub enum DeviceStateError {
    #[error("Failed to access local state file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode local state: {0}")]
    Encode(#[from] serde_json::Error),
}

/// File-backed device identity and voluntary-logout flag.
pub struct DeviceState {
    path: PathBuf,
    inner: Mutex<PersistedState>,
}

impl DeviceState {
    /// Load the state file, creating it with a fresh device token if it
    /// is missing or unreadable. A corrupt file is replaced rather than
    /// surfaced -- losing the device id only means this device looks new.
    pub fn load_or_init(path: impl Into<PathBuf>) -> Result<Self, DeviceStateError> {
        let path = path.into();

        let state = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<PersistedState>(&raw) {
                Ok(state) => state,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Corrupt device state, regenerating");
                    fresh_state()
                }
            },
            Err(_) => fresh_state(),
        };

        let device = Self {
            path,
            inner: Mutex::new(state),
        };
        device.persist()?;
        Ok(device)
    }

    /// The stable device token.
    pub fn device_id(&self) -> String {
        self.lock().device_id.clone()
    }

    /// Session id for this device: `"<user_id>:<device_id>"`.
    pub fn session_id(&self, user_id: DbId) -> String {
        format!("{user_id}:{}", self.lock().device_id)
    }

    /// Record that the next observed sign-out was user-initiated.
    pub fn set_voluntary_logout(&self) {
        self.lock().voluntary_logout = true;
        if let Err(e) = self.persist() {
            tracing::warn!(error = %e, "Failed to persist voluntary-logout flag");
        }
    }

    /// Read and clear the voluntary-logout flag.
    pub fn take_voluntary_logout(&self) -> bool {
        let value = {
            let mut state = self.lock();
            std::mem::take(&mut state.voluntary_logout)
        };
        if value {
            if let Err(e) = self.persist() {
                tracing::warn!(error = %e, "Failed to persist cleared voluntary-logout flag");
            }
        }
        value
    }

    fn persist(&self) -> Result<(), DeviceStateError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let encoded = serde_json::to_string_pretty(&*self.lock())?;
        std::fs::write(&self.path, encoded)?;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PersistedState> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn fresh_state() -> PersistedState {
    PersistedState {
        device_id: uuid::Uuid::new_v4().to_string(),
        voluntary_logout: false,
    }
}

/// Convenience for tests and defaults.
pub fn default_state_path(dir: &Path) -> PathBuf {
    dir.join("quantdesk-state.json")
}
