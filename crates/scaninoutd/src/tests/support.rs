//! Collaborator doubles shared by the behavioural suites.

use std::ffi::OsString;
use std::sync::{Arc, Mutex};

use camino::Utf8PathBuf;
use ortho_config::{OrthoConfig as _, OrthoError};
use scaninout_config::{Config, SocketEndpoint};
use tempfile::TempDir;

use crate::bootstrap::ConfigLoader;
use crate::health::{HealthReporter, LifecycleEvent};

/// Owned copy of a [`LifecycleEvent`], kept for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    BootstrapStarting,
    CatalogInstalled(usize),
    BootstrapSucceeded,
    BootstrapFailed(String),
    Serving,
    Stopped,
}

impl From<&LifecycleEvent<'_>> for HealthEvent {
    fn from(event: &LifecycleEvent<'_>) -> Self {
        match *event {
            LifecycleEvent::BootstrapStarting => Self::BootstrapStarting,
            LifecycleEvent::CatalogInstalled { commands } => Self::CatalogInstalled(commands),
            LifecycleEvent::BootstrapSucceeded { .. } => Self::BootstrapSucceeded,
            LifecycleEvent::BootstrapFailed { error } => Self::BootstrapFailed(error.to_string()),
            LifecycleEvent::Serving { .. } => Self::Serving,
            LifecycleEvent::Stopped { .. } => Self::Stopped,
        }
    }
}

#[derive(Debug, Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events.lock().expect("events lock").clone()
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn report(&self, event: &LifecycleEvent<'_>) {
        self.events.lock().expect("events lock").push(event.into());
    }
}

/// Loader that places the daemon socket under a temporary directory.
pub struct TestConfigLoader {
    socket_dir: TempDir,
    salt_hex: Option<String>,
}

impl TestConfigLoader {
    #[must_use]
    pub fn new() -> Self {
        Self {
            socket_dir: TempDir::new().expect("failed to create temporary socket directory"),
            salt_hex: None,
        }
    }

    /// Overrides the configured key-derivation salt.
    #[must_use]
    pub fn with_salt_hex(mut self, salt_hex: &str) -> Self {
        self.salt_hex = Some(salt_hex.to_owned());
        self
    }

    fn socket_path(&self) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(self.socket_dir.path().join("scaninoutd.sock"))
            .expect("temporary socket path was not valid UTF-8")
    }
}

impl ConfigLoader for TestConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let defaults = Config::default();
        Ok(Config {
            daemon_socket: SocketEndpoint::unix(self.socket_path()),
            kdf_salt_hex: self
                .salt_hex
                .clone()
                .unwrap_or_else(|| defaults.kdf_salt_hex.clone()),
            ..defaults
        })
    }
}

/// Loader that intentionally fails by passing an unparseable socket flag.
pub struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let args = vec![
            OsString::from("scaninoutd"),
            OsString::from("--daemon-socket"),
            OsString::from("invalid://socket"),
        ];
        Config::load_from_iter(args)
    }
}
