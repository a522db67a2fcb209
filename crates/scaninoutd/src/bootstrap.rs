//! Daemon bootstrap orchestration.

use std::sync::Arc;

use ortho_config::{OrthoConfig as _, OrthoError};
use scaninout_config::{Config, SocketPreparationError};
use scaninout_proto::{AuthError, AuthKey, RegistryError, TagValidator, auth, catalog};
use thiserror::Error;
use time::Duration;

use crate::dispatch::{Dispatcher, HandlerTable, RouteError};
use crate::health::{HealthReporter, LifecycleEvent};
use crate::store::Persistence;
use crate::telemetry::{self, TelemetryError, TelemetryHandle};

/// Source of the daemon configuration.
pub trait ConfigLoader: Send + Sync {
    /// # Errors
    ///
    /// Returns the loader's error when a layer cannot be read or merged.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Loader that hands out a configuration resolved earlier.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// The bootstrap stage that failed.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("configuration could not be loaded: {source}")]
    Configuration {
        #[source]
        source: Arc<OrthoError>,
    },
    #[error("logging could not be initialised: {source}")]
    Telemetry {
        #[source]
        source: TelemetryError,
    },
    #[error("socket directory could not be prepared: {source}")]
    Socket {
        #[source]
        source: SocketPreparationError,
    },
    /// The configured salt or iteration count is unusable.
    #[error("signing key could not be derived: {source}")]
    Key {
        #[source]
        source: AuthError,
    },
    #[error("command catalog is inconsistent: {source}")]
    Catalog {
        #[source]
        source: RegistryError,
    },
    #[error("command handlers are inconsistent: {source}")]
    Handlers {
        #[source]
        source: RouteError,
    },
}

/// A bootstrapped daemon, ready to be bound to a listener.
#[derive(Debug)]
pub struct Daemon {
    config: Config,
    telemetry: TelemetryHandle,
    dispatcher: Arc<Dispatcher>,
}

impl Daemon {
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// The dispatcher shared by every connection.
    #[must_use]
    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::clone(&self.dispatcher)
    }
}

/// Derives the signing key. This is the slow step of startup; it runs once.
fn derive_key(config: &Config) -> Result<AuthKey, BootstrapError> {
    let salt = auth::decode_hex(config.kdf_salt_hex())
        .map_err(|source| BootstrapError::Key { source })?;
    AuthKey::derive(config.passphrase(), &salt, config.kdf_iterations())
        .map_err(|source| BootstrapError::Key { source })
}

fn build_dispatcher(
    config: &Config,
    store: Arc<dyn Persistence>,
) -> Result<Dispatcher, BootstrapError> {
    let key = derive_key(config)?;
    let format = config.tag_format();
    let tags: Arc<dyn TagValidator> = Arc::new(move |tag: &str| format.matches(tag));
    let registry = catalog::install(tags).map_err(|source| BootstrapError::Catalog { source })?;
    let handlers = HandlerTable::standard().map_err(|source| BootstrapError::Handlers { source })?;
    Ok(Dispatcher::new(registry, handlers, store, key).with_scan_expiry(scan_expiry(config)))
}

fn scan_expiry(config: &Config) -> Duration {
    Duration::try_from(config.scan_expiry()).unwrap_or(Duration::MAX)
}

/// Bootstraps the daemon using the supplied collaborators.
///
/// # Errors
///
/// Returns the first failing stage. The failure is reported to `reporter`
/// before it is returned.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    store: Arc<dyn Persistence>,
) -> Result<Daemon, BootstrapError> {
    reporter.report(&LifecycleEvent::BootstrapStarting);
    let outcome = run_stages(loader, reporter.as_ref(), store);
    match &outcome {
        Ok(daemon) => reporter.report(&LifecycleEvent::BootstrapSucceeded {
            config: &daemon.config,
        }),
        Err(error) => reporter.report(&LifecycleEvent::BootstrapFailed { error }),
    }
    outcome
}

fn run_stages(
    loader: &dyn ConfigLoader,
    reporter: &dyn HealthReporter,
    store: Arc<dyn Persistence>,
) -> Result<Daemon, BootstrapError> {
    let config = loader
        .load()
        .map_err(|source| BootstrapError::Configuration { source })?;
    let telemetry =
        telemetry::initialise(&config).map_err(|source| BootstrapError::Telemetry { source })?;
    config
        .daemon_socket()
        .prepare_filesystem()
        .map_err(|source| BootstrapError::Socket { source })?;
    let dispatcher = Arc::new(build_dispatcher(&config, store)?);
    reporter.report(&LifecycleEvent::CatalogInstalled {
        commands: dispatcher.registry().len(),
    });
    Ok(Daemon {
        config,
        telemetry,
        dispatcher,
    })
}
