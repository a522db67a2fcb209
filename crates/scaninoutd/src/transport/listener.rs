//! Binding the daemon endpoint and accepting connections off-thread.

use std::fs;
use std::io;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use scaninout_config::SocketEndpoint;
use tracing::{debug, info, warn};

use super::{ConnectionHandler, ConnectionStream, LISTENER_TARGET, ListenerError};

#[cfg(unix)]
use std::os::unix::fs::FileTypeExt;
#[cfg(unix)]
use std::os::unix::net::{UnixListener, UnixStream};
#[cfg(unix)]
use std::path::Path;

/// Pause between polls when no connection is pending.
const IDLE_POLL: Duration = Duration::from_millis(25);
/// Pause after an accept failure before trying again.
const FAULT_PAUSE: Duration = Duration::from_millis(150);

#[derive(Debug)]
enum BoundSocket {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener),
}

impl BoundSocket {
    fn open(endpoint: &SocketEndpoint) -> Result<Self, ListenerError> {
        match endpoint {
            SocketEndpoint::Tcp { host, port } => open_tcp(endpoint, host, *port).map(Self::Tcp),
            #[cfg(unix)]
            SocketEndpoint::Unix { path } => {
                reclaim_stale_socket(endpoint, path.as_std_path())?;
                UnixListener::bind(path.as_std_path())
                    .map(Self::Unix)
                    .map_err(|source| ListenerError::Bind {
                        endpoint: endpoint.clone(),
                        source,
                    })
            }
            #[cfg(not(unix))]
            SocketEndpoint::Unix { .. } => Err(ListenerError::Unsupported {
                endpoint: endpoint.clone(),
            }),
        }
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        match self {
            Self::Tcp(listener) => listener.local_addr().ok(),
            #[cfg(unix)]
            Self::Unix(_) => None,
        }
    }

    fn set_nonblocking(&self) -> io::Result<()> {
        match self {
            Self::Tcp(listener) => listener.set_nonblocking(true),
            #[cfg(unix)]
            Self::Unix(listener) => listener.set_nonblocking(true),
        }
    }

    /// Takes one pending connection, or `None` when nobody is waiting.
    fn accept(&self) -> io::Result<Option<ConnectionStream>> {
        let accepted = match self {
            Self::Tcp(listener) => listener.accept().and_then(|(stream, _)| {
                stream.set_nonblocking(false)?;
                Ok(ConnectionStream::Tcp(stream))
            }),
            #[cfg(unix)]
            Self::Unix(listener) => listener.accept().and_then(|(stream, _)| {
                stream.set_nonblocking(false)?;
                Ok(ConnectionStream::Unix(stream))
            }),
        };
        match accepted {
            Ok(stream) => Ok(Some(stream)),
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(error) => Err(error),
        }
    }
}

/// A bound daemon socket that is not yet accepting connections.
#[derive(Debug)]
pub struct SocketListener {
    endpoint: SocketEndpoint,
    socket: BoundSocket,
}

impl SocketListener {
    /// Binds `endpoint`.
    ///
    /// A Unix socket file left behind by a dead daemon is removed first. One
    /// that still answers is reported as [`ListenerError::SocketInUse`].
    ///
    /// # Errors
    ///
    /// Fails when the endpoint cannot be resolved, reclaimed or bound.
    pub fn bind(endpoint: &SocketEndpoint) -> Result<Self, ListenerError> {
        let socket = BoundSocket::open(endpoint)?;
        Ok(Self {
            endpoint: endpoint.clone(),
            socket,
        })
    }

    #[must_use]
    pub const fn endpoint(&self) -> &SocketEndpoint {
        &self.endpoint
    }

    /// The TCP address actually bound, which differs from the endpoint when it
    /// asked for port `0`.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.local_addr()
    }

    /// Accepts connections on a background thread, handing each one to
    /// `handler` on a thread of its own.
    ///
    /// # Errors
    ///
    /// Fails when the socket cannot poll without blocking or the accept
    /// thread cannot be spawned.
    pub fn start(
        self,
        handler: Arc<dyn ConnectionHandler>,
    ) -> Result<ListenerHandle, ListenerError> {
        if let Err(error) = self.socket.set_nonblocking() {
            remove_socket_file(&self.endpoint);
            return Err(ListenerError::Configure(error));
        }
        let stop = Arc::new(AtomicBool::new(false));
        let accept_loop = AcceptLoop {
            endpoint: self.endpoint,
            socket: self.socket,
            handler,
            stop: Arc::clone(&stop),
            accepted: 0,
        };
        let thread = thread::Builder::new()
            .name("scaninoutd-accept".to_owned())
            .spawn(move || accept_loop.run())
            .map_err(ListenerError::Spawn)?;
        Ok(ListenerHandle {
            stop,
            thread: Some(thread),
        })
    }
}

/// Controls a running accept loop. Dropping the handle stops the loop
/// without waiting for it.
#[derive(Debug)]
pub struct ListenerHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ListenerHandle {
    /// Stops accepting new connections. Open connections are unaffected.
    pub fn shutdown(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Waits for the accept loop to finish and its socket file to be removed.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::AcceptLoopPanicked`] when the loop panicked.
    pub fn join(mut self) -> Result<(), ListenerError> {
        self.thread.take().map_or(Ok(()), |thread| {
            thread
                .join()
                .map_err(|_| ListenerError::AcceptLoopPanicked)
        })
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct AcceptLoop {
    endpoint: SocketEndpoint,
    socket: BoundSocket,
    handler: Arc<dyn ConnectionHandler>,
    stop: Arc<AtomicBool>,
    accepted: u64,
}

impl AcceptLoop {
    fn run(mut self) {
        info!(target: LISTENER_TARGET, endpoint = %self.endpoint, "accept loop running");
        let mut failing = None::<io::ErrorKind>;
        while !self.stop.load(Ordering::SeqCst) {
            match self.socket.accept() {
                Ok(Some(stream)) => {
                    failing = None;
                    self.hand_off(stream);
                }
                Ok(None) => thread::sleep(IDLE_POLL),
                Err(error) => {
                    // Log once per run of identical failures.
                    if failing != Some(error.kind()) {
                        warn!(target: LISTENER_TARGET, %error, "accept failed");
                    }
                    failing = Some(error.kind());
                    thread::sleep(FAULT_PAUSE);
                }
            }
        }
        remove_socket_file(&self.endpoint);
        info!(target: LISTENER_TARGET, endpoint = %self.endpoint, "accept loop finished");
    }

    fn hand_off(&mut self, stream: ConnectionStream) {
        let connection = self.accepted;
        self.accepted += 1;
        let peer = stream.peer();
        let handler = Arc::clone(&self.handler);
        let spawned = thread::Builder::new()
            .name(format!("scaninoutd-conn-{connection}"))
            .spawn(move || handler.handle(stream));
        if let Err(error) = spawned {
            warn!(target: LISTENER_TARGET, connection, %peer, %error, "connection dropped: no thread");
        } else {
            debug!(target: LISTENER_TARGET, connection, %peer, "connection accepted");
        }
    }
}

fn open_tcp(endpoint: &SocketEndpoint, host: &str, port: u16) -> Result<TcpListener, ListenerError> {
    let address = (host, port)
        .to_socket_addrs()
        .map_err(|source| ListenerError::Resolve {
            endpoint: endpoint.clone(),
            source,
        })?
        .next()
        .ok_or_else(|| ListenerError::NoAddress {
            endpoint: endpoint.clone(),
        })?;
    TcpListener::bind(address).map_err(|source| ListenerError::Bind {
        endpoint: endpoint.clone(),
        source,
    })
}

/// Clears the way for binding `path`, refusing to touch anything that is
/// not a dead socket.
#[cfg(unix)]
fn reclaim_stale_socket(endpoint: &SocketEndpoint, path: &Path) -> Result<(), ListenerError> {
    let stale = |source| ListenerError::StaleSocket {
        endpoint: endpoint.clone(),
        source,
    };
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(error) => return Err(stale(error)),
    };
    if !metadata.file_type().is_socket() {
        return Err(ListenerError::NotASocket {
            endpoint: endpoint.clone(),
        });
    }
    match UnixStream::connect(path) {
        Ok(_) => Err(ListenerError::SocketInUse {
            endpoint: endpoint.clone(),
        }),
        Err(error)
            if matches!(
                error.kind(),
                io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound
            ) =>
        {
            debug!(target: LISTENER_TARGET, %endpoint, "removing leftover socket file");
            fs::remove_file(path).map_err(stale)
        }
        Err(error) => Err(stale(error)),
    }
}

fn remove_socket_file(endpoint: &SocketEndpoint) {
    let Some(path) = endpoint.unix_path() else {
        return;
    };
    match fs::remove_file(path) {
        Err(error) if error.kind() != io::ErrorKind::NotFound => {
            warn!(target: LISTENER_TARGET, %error, %path, "socket file left behind");
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpStream;
    use std::sync::atomic::AtomicUsize;

    use super::super::CountingHandler;
    use super::*;

    fn counting() -> (Arc<AtomicUsize>, Arc<CountingHandler>) {
        let count = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(CountingHandler::new(Arc::clone(&count)));
        (count, handler)
    }

    #[test]
    fn every_tcp_connection_reaches_the_handler() {
        let listener =
            SocketListener::bind(&SocketEndpoint::tcp("127.0.0.1", 0)).expect("bind tcp");
        let address = listener.local_addr().expect("tcp address");
        let (count, handler) = counting();
        let handle = listener.start(handler).expect("start");

        let _first = TcpStream::connect(address).expect("first client");
        let _second = TcpStream::connect(address).expect("second client");

        assert!(CountingHandler::wait_for(&count, 2), "two connections");
        handle.shutdown();
        handle.join().expect("join");
    }

    #[test]
    fn a_stopped_listener_refuses_connections() {
        let listener =
            SocketListener::bind(&SocketEndpoint::tcp("127.0.0.1", 0)).expect("bind tcp");
        let address = listener.local_addr().expect("tcp address");
        let (_, handler) = counting();
        let handle = listener.start(handler).expect("start");
        handle.shutdown();
        handle.join().expect("join");

        assert!(TcpStream::connect(address).is_err());
    }

    #[cfg(unix)]
    mod unix {
        use super::*;

        fn endpoint_in(dir: &tempfile::TempDir) -> (std::path::PathBuf, SocketEndpoint) {
            let path = dir.path().join("scaninoutd.sock");
            let endpoint = SocketEndpoint::unix(path.to_str().expect("utf-8 path"));
            (path, endpoint)
        }

        #[test]
        fn leftover_sockets_are_reclaimed_and_removed_on_shutdown() {
            let dir = tempfile::tempdir().expect("temp dir");
            let (path, endpoint) = endpoint_in(&dir);
            drop(UnixListener::bind(&path).expect("leftover socket"));
            assert!(path.exists());

            let (count, handler) = counting();
            let handle = SocketListener::bind(&endpoint)
                .expect("bind over leftover")
                .start(handler)
                .expect("start");
            let _client = UnixStream::connect(&path).expect("unix client");
            assert!(CountingHandler::wait_for(&count, 1), "one connection");

            handle.shutdown();
            handle.join().expect("join");
            assert!(!path.exists(), "socket file removed");
        }

        #[test]
        fn a_live_socket_is_left_alone() {
            let dir = tempfile::tempdir().expect("temp dir");
            let (path, endpoint) = endpoint_in(&dir);
            let _live = UnixListener::bind(&path).expect("live socket");

            let error = SocketListener::bind(&endpoint).expect_err("in use");
            assert!(matches!(error, ListenerError::SocketInUse { .. }));
            assert!(path.exists());
        }

        #[test]
        fn regular_files_are_never_removed() {
            let dir = tempfile::tempdir().expect("temp dir");
            let (path, endpoint) = endpoint_in(&dir);
            fs::write(&path, b"keep me").expect("write file");

            let error = SocketListener::bind(&endpoint).expect_err("not a socket");
            assert!(matches!(error, ListenerError::NotASocket { .. }));
            assert_eq!(fs::read(&path).expect("read file"), b"keep me");
        }
    }
}
