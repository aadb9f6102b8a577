//! Engine configuration and user sync settings.
//!
//! Two layers of configuration exist:
//!
//! - [`EngineConfig`]: process-level knobs fixed at engine construction
//!   (state directory, timer periods, startup settle delay).
//! - [`SyncSettings`]: the user-facing settings supplied by the host's
//!   settings form. These can change at any time; the engine receives the
//!   new value over a watch channel and the scheduler reacts after a
//!   debounce window.
//!
//! # Example
//!
//! ```rust
//! use marksync::{EngineConfig, SyncSettings};
//!
//! let config = EngineConfig::new("/path/to/state");
//!
//! let settings = SyncSettings::new("token", "doc-id", "bookmarks.json")
//!     .with_auto_sync(true)
//!     .with_auto_sync_interval(30)
//!     .with_encryption("hunter2");
//! assert!(settings.validate().is_ok());
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::{DEFAULT_AUTO_SYNC_INTERVAL_MINUTES, DEFAULT_SCHEDULER_TICK_SECS, DEFAULT_STARTUP_DELAY_SECS};

/// Process-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory holding the persisted engine state file.
    pub data_dir: PathBuf,

    /// Settling delay before the startup reconciler runs, in seconds.
    pub startup_delay_secs: u64,

    /// Fixed period of the auto-sync timer, in seconds.
    ///
    /// Much finer-grained than the user-configured sync interval; each tick
    /// only checks whether that interval has elapsed.
    pub scheduler_tick_secs: u64,

    /// Quiet window for coalescing rapid settings writes, in milliseconds.
    pub settings_debounce_ms: u64,
}

impl EngineConfig {
    /// Create a configuration with the given state directory.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            startup_delay_secs: DEFAULT_STARTUP_DELAY_SECS,
            scheduler_tick_secs: DEFAULT_SCHEDULER_TICK_SECS,
            settings_debounce_ms: 500,
        }
    }

    /// Set the startup settle delay
    #[must_use]
    pub const fn with_startup_delay(mut self, secs: u64) -> Self {
        self.startup_delay_secs = secs;
        self
    }

    /// Set the scheduler tick period
    #[must_use]
    pub const fn with_scheduler_tick(mut self, secs: u64) -> Self {
        self.scheduler_tick_secs = secs;
        self
    }

    /// Set the settings debounce window
    #[must_use]
    pub const fn with_settings_debounce(mut self, ms: u64) -> Self {
        self.settings_debounce_ms = ms;
        self
    }

    /// Get the default state directory
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("marksync")
    }

    /// Path to the persisted engine state file
    #[must_use]
    pub fn state_file_path(&self) -> PathBuf {
        self.data_dir.join("state.json")
    }

    pub(crate) fn settings_debounce(&self) -> Duration {
        Duration::from_millis(self.settings_debounce_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(Self::default_data_dir())
    }
}

/// User-facing sync settings, as supplied by the host's settings form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSettings {
    /// Credential for the remote document API.
    pub credential: String,
    /// Id of the remote document holding the snapshot.
    pub document_id: String,
    /// File name of the snapshot within the document.
    pub file_name: String,
    /// Whether outcome notifications are shown.
    pub notifications_enabled: bool,
    /// Whether automatic synchronization runs.
    pub auto_sync_enabled: bool,
    /// Minutes between automatic inbound merge-downloads.
    pub auto_sync_interval_minutes: u64,
    /// Whether the remote payload is encrypted.
    pub encryption_enabled: bool,
    /// Password for payload encryption, when enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_password: Option<String>,
    /// Whether the user has acknowledged initial setup.
    ///
    /// The startup reconciler does nothing until this is set.
    pub setup_complete: bool,
}

impl SyncSettings {
    /// Create settings with the required remote coordinates.
    #[must_use]
    pub fn new(
        credential: impl Into<String>,
        document_id: impl Into<String>,
        file_name: impl Into<String>,
    ) -> Self {
        Self {
            credential: credential.into(),
            document_id: document_id.into(),
            file_name: file_name.into(),
            notifications_enabled: true,
            auto_sync_enabled: false,
            auto_sync_interval_minutes: DEFAULT_AUTO_SYNC_INTERVAL_MINUTES,
            encryption_enabled: false,
            encryption_password: None,
            setup_complete: false,
        }
    }

    /// Enable or disable outcome notifications
    #[must_use]
    pub const fn with_notifications(mut self, enabled: bool) -> Self {
        self.notifications_enabled = enabled;
        self
    }

    /// Enable or disable automatic synchronization
    #[must_use]
    pub const fn with_auto_sync(mut self, enabled: bool) -> Self {
        self.auto_sync_enabled = enabled;
        self
    }

    /// Set the automatic sync interval in minutes
    #[must_use]
    pub const fn with_auto_sync_interval(mut self, minutes: u64) -> Self {
        self.auto_sync_interval_minutes = minutes;
        self
    }

    /// Enable encryption with the given password
    #[must_use]
    pub fn with_encryption(mut self, password: impl Into<String>) -> Self {
        self.encryption_enabled = true;
        self.encryption_password = Some(password.into());
        self
    }

    /// Mark initial setup as acknowledged
    #[must_use]
    pub const fn with_setup_complete(mut self, complete: bool) -> Self {
        self.setup_complete = complete;
        self
    }

    /// Whether the remote coordinates are all present.
    #[must_use]
    pub fn is_remote_configured(&self) -> bool {
        !self.credential.is_empty() && !self.document_id.is_empty() && !self.file_name.is_empty()
    }

    /// The effective encryption password, when encryption is on.
    #[must_use]
    pub fn password(&self) -> Option<&str> {
        if !self.encryption_enabled {
            return None;
        }
        self.encryption_password.as_deref().filter(|p| !p.is_empty())
    }

    /// Check that the settings can carry a sync operation.
    ///
    /// Missing remote coordinates are a configuration error; encryption
    /// enabled without a password asks for one.
    pub fn validate(&self) -> Result<()> {
        if self.credential.is_empty() {
            return Err(Error::config("credential is not configured"));
        }
        if self.document_id.is_empty() {
            return Err(Error::config("document id is not configured"));
        }
        if self.file_name.is_empty() {
            return Err(Error::config("file name is not configured"));
        }
        if self.encryption_enabled && self.password().is_none() {
            return Err(Error::PasswordMissing);
        }
        Ok(())
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::new("", "", "")
    }
}
