//! A real daemon dispatcher served over loopback TCP.

use std::sync::Arc;

use anyhow::Context;
use scaninout_config::{
    Config, DEFAULT_KDF_ITERATIONS, DEFAULT_KDF_SALT_HEX, DEFAULT_PASSPHRASE, SocketEndpoint,
};
use scaninout_proto::field::AcceptAnyTag;
use scaninout_proto::{AuthKey, auth, catalog};
use scaninoutd::transport::{ListenerHandle, SocketListener};
use scaninoutd::{DispatchConnectionHandler, Dispatcher, HandlerTable, MemoryStore};

pub struct TestDaemon {
    endpoint: SocketEndpoint,
    handle: Option<ListenerHandle>,
}

impl TestDaemon {
    /// Starts a daemon keyed on the default passphrase.
    pub fn start() -> anyhow::Result<Self> {
        let registry = catalog::build(Arc::new(AcceptAnyTag))?;
        let salt = auth::decode_hex(DEFAULT_KDF_SALT_HEX)?;
        let key = AuthKey::derive(DEFAULT_PASSPHRASE, &salt, DEFAULT_KDF_ITERATIONS)?;
        let dispatcher = Dispatcher::new(
            Arc::new(registry),
            HandlerTable::standard()?,
            Arc::new(MemoryStore::new()),
            key,
        );

        let listener = SocketListener::bind(&SocketEndpoint::tcp("127.0.0.1", 0))?;
        let address = listener
            .local_addr()
            .context("listener has no TCP address")?;
        let handler = Arc::new(DispatchConnectionHandler::new(Arc::new(dispatcher)));
        let handle = listener.start(handler)?;
        Ok(Self {
            endpoint: SocketEndpoint::tcp(address.ip().to_string(), address.port()),
            handle: Some(handle),
        })
    }

    pub fn endpoint(&self) -> &SocketEndpoint {
        &self.endpoint
    }

    /// Default settings pointed at this daemon.
    pub fn config(&self) -> Config {
        Config {
            daemon_socket: self.endpoint.clone(),
            ..Config::default()
        }
    }
}

impl Drop for TestDaemon {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.shutdown();
            let _ = handle.join();
        }
    }
}
