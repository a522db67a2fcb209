//! Lifecycle reporting for operators.
//!
//! Bootstrap and the launch sequence describe each stage they pass through as
//! a [`LifecycleEvent`]. The default [`StructuredHealthReporter`] turns those
//! into `tracing` events under the `scaninoutd::health` target; tests swap in
//! a recorder.

use scaninout_config::{Config, SocketEndpoint};

use crate::bootstrap::BootstrapError;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// A daemon lifecycle stage.
#[derive(Debug, Clone, Copy)]
pub enum LifecycleEvent<'a> {
    /// Configuration loading is about to begin.
    BootstrapStarting,
    /// The command catalog is published and every command has a handler.
    CatalogInstalled { commands: usize },
    /// Bootstrap finished with `config`.
    BootstrapSucceeded { config: &'a Config },
    /// Bootstrap stopped at `error`.
    BootstrapFailed { error: &'a BootstrapError },
    /// The listener accepts connections on `endpoint`.
    Serving { endpoint: &'a SocketEndpoint },
    /// The listener on `endpoint` has shut down.
    Stopped { endpoint: &'a SocketEndpoint },
}

impl LifecycleEvent<'_> {
    /// Stable name carried in the `event` field of log records.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::BootstrapStarting => "bootstrap_starting",
            Self::CatalogInstalled { .. } => "catalog_installed",
            Self::BootstrapSucceeded { .. } => "bootstrap_succeeded",
            Self::BootstrapFailed { .. } => "bootstrap_failed",
            Self::Serving { .. } => "serving",
            Self::Stopped { .. } => "stopped",
        }
    }
}

/// Receives lifecycle events.
pub trait HealthReporter: Send + Sync {
    fn report(&self, event: &LifecycleEvent<'_>);
}

/// Reporter that logs every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl HealthReporter for StructuredHealthReporter {
    fn report(&self, event: &LifecycleEvent<'_>) {
        let name = event.name();
        match *event {
            LifecycleEvent::BootstrapStarting => {
                tracing::info!(target: HEALTH_TARGET, event = name, "bootstrapping daemon");
            }
            LifecycleEvent::CatalogInstalled { commands } => {
                tracing::info!(target: HEALTH_TARGET, event = name, commands, "command catalog ready");
            }
            LifecycleEvent::BootstrapSucceeded { config } => tracing::info!(
                target: HEALTH_TARGET,
                event = name,
                socket = %config.daemon_socket(),
                log_format = ?config.log_format(),
                kdf_iterations = config.kdf_iterations(),
                scan_expiry_hours = config.scan_expiry_hours,
                "daemon ready to serve"
            ),
            LifecycleEvent::BootstrapFailed { error } => {
                tracing::error!(target: HEALTH_TARGET, event = name, %error, "daemon bootstrap failed");
            }
            LifecycleEvent::Serving { endpoint } => {
                tracing::info!(target: HEALTH_TARGET, event = name, %endpoint, "accepting connections");
            }
            LifecycleEvent::Stopped { endpoint } => {
                tracing::info!(target: HEALTH_TARGET, event = name, %endpoint, "no longer accepting connections");
            }
        }
    }
}
