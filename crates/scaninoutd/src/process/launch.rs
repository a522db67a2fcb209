//! Launch sequencing: bootstrap, bind, serve, shut down.

use std::sync::Arc;

use tracing::warn;

use crate::bootstrap::{ConfigLoader, SystemConfigLoader, bootstrap_with};
use crate::dispatch::DispatchConnectionHandler;
use crate::health::{HealthReporter, LifecycleEvent, StructuredHealthReporter};
use crate::store::{MemoryStore, Persistence};
use crate::transport::SocketListener;

use super::PROCESS_TARGET;
use super::errors::LaunchError;
use super::shutdown::{ShutdownSignal, SystemShutdownSignal};

/// Runs the daemon in the foreground until a termination signal arrives.
///
/// # Errors
///
/// Returns the first failure of the launch sequence.
pub fn run_daemon() -> Result<(), LaunchError> {
    run_daemon_with(
        &SystemConfigLoader,
        Arc::new(StructuredHealthReporter),
        &SystemShutdownSignal,
        Arc::new(MemoryStore::new()),
    )
}

/// Bootstraps, serves until `shutdown` returns, then stops accepting and
/// removes the socket.
pub(crate) fn run_daemon_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    shutdown: &dyn ShutdownSignal,
    store: Arc<dyn Persistence>,
) -> Result<(), LaunchError> {
    let daemon = bootstrap_with(loader, Arc::clone(&reporter), store)?;
    let listener = SocketListener::bind(daemon.config().daemon_socket())?;
    let endpoint = listener.endpoint().clone();
    let accepting = listener.start(Arc::new(DispatchConnectionHandler::new(
        daemon.dispatcher(),
    )))?;
    reporter.report(&LifecycleEvent::Serving {
        endpoint: &endpoint,
    });

    let waited = shutdown.wait();
    if let Err(error) = &waited {
        warn!(target: PROCESS_TARGET, %error, "stopping without a shutdown signal");
    }
    accepting.shutdown();
    accepting.join()?;
    reporter.report(&LifecycleEvent::Stopped {
        endpoint: &endpoint,
    });
    waited.map_err(LaunchError::from)
}
