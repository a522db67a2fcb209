use thiserror::Error;

use crate::bootstrap::BootstrapError;
use crate::transport::ListenerError;

use super::shutdown::ShutdownError;

/// Why the daemon stopped before a clean shutdown.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
    #[error("daemon socket could not be served: {0}")]
    Listener(#[from] ListenerError),
    #[error("shutdown signal could not be awaited: {0}")]
    Shutdown(#[from] ShutdownError),
}
