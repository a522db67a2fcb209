use std::io;

use scaninout_config::SocketEndpoint;
use thiserror::Error;

/// Failures while binding the daemon socket or running its accept loop.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("cannot resolve {endpoint}: {source}")]
    Resolve {
        endpoint: SocketEndpoint,
        #[source]
        source: io::Error,
    },
    #[error("{endpoint} resolved to no addresses")]
    NoAddress { endpoint: SocketEndpoint },
    #[error("cannot bind {endpoint}: {source}")]
    Bind {
        endpoint: SocketEndpoint,
        #[source]
        source: io::Error,
    },
    #[error("{endpoint} is already served by another process")]
    SocketInUse { endpoint: SocketEndpoint },
    #[error("{endpoint} names a file that is not a socket")]
    NotASocket { endpoint: SocketEndpoint },
    #[error("cannot reclaim leftover socket {endpoint}: {source}")]
    StaleSocket {
        endpoint: SocketEndpoint,
        #[source]
        source: io::Error,
    },
    #[cfg(not(unix))]
    #[error("unix sockets are unavailable on this platform: {endpoint}")]
    Unsupported { endpoint: SocketEndpoint },
    #[error("cannot switch the listener to non-blocking accepts: {0}")]
    Configure(#[source] io::Error),
    #[error("cannot start the accept thread: {0}")]
    Spawn(#[source] io::Error),
    #[error("the accept loop panicked")]
    AcceptLoopPanicked,
}
