//! Blocking RPC clients.
//!
//! [`Client`] turns named values into a request record, exchanges one line
//! with the daemon, and decodes the reply against the command's response
//! schema. The connection opens lazily; after a connection failure the
//! exchange is retried once on a fresh connection. A response timeout is
//! never retried since the daemon may already have applied the request.
//!
//! [`AuthenticatedClient`] wraps every call in the nonce/signature handshake,
//! so one privileged call costs three round trips.

use std::io::BufReader;
use std::sync::Arc;
use std::time::Duration;

use scaninout_config::{Config, SocketEndpoint};
use scaninout_proto::catalog::{self, names};
use scaninout_proto::{
    AuthKey, CommandRegistry, CommandSchema, Record, RpcRequest, TagValidator, Value, WireError,
    auth, wire,
};
use serde_json::{Map as JsonMap, Value as Json};

use crate::ClientError;
use crate::transport::{self, Connection};

/// A connection to the daemon that issues one call at a time.
#[derive(Debug)]
pub struct Client {
    endpoint: SocketEndpoint,
    registry: Arc<CommandRegistry>,
    response_timeout: Option<Duration>,
    connection: Option<BufReader<Connection>>,
}

impl Client {
    /// Creates a client for `endpoint`. Nothing is opened until the first
    /// call.
    #[must_use]
    pub fn new(endpoint: SocketEndpoint, registry: Arc<CommandRegistry>) -> Self {
        Self {
            endpoint,
            registry,
            response_timeout: None,
            connection: None,
        }
    }

    /// Bounds the wait for each response line. `None` waits indefinitely.
    #[must_use]
    pub fn with_response_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Creates a client for the configured endpoint, installing the command
    /// catalog with the configured tag format.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Catalog`] when the catalog cannot be built.
    pub fn from_config(config: &Config) -> Result<Self, ClientError> {
        let format = config.tag_format();
        let tags: Arc<dyn TagValidator> = Arc::new(move |tag: &str| format.matches(tag));
        let registry = catalog::install(tags).map_err(|source| ClientError::Catalog { source })?;
        Ok(Self::new(config.daemon_socket().clone(), registry)
            .with_response_timeout(config.response_timeout()))
    }

    #[must_use]
    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// Looks up a command by name or `snake_case` alias.
    ///
    /// # Errors
    ///
    /// Returns the `unknown-command` error without contacting the daemon.
    pub fn command(&self, name: &str) -> Result<Arc<CommandSchema>, ClientError> {
        Ok(Arc::clone(self.registry.resolve(name)?))
    }

    /// Calls `name` with the given field values.
    ///
    /// # Errors
    ///
    /// Fails when the values do not form a valid request, when the exchange
    /// fails, or with the daemon's [`scaninout_proto::CommandError`].
    pub fn call<I, K, V>(&mut self, name: &str, values: I) -> Result<Record, ClientError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let command = self.command(name)?;
        let request = command.request(values).map_err(request_error)?;
        self.send(&command, &request)
    }

    /// Calls `name` with fields given in their wire form.
    ///
    /// # Errors
    ///
    /// See [`Client::call`].
    pub fn call_json(
        &mut self,
        name: &str,
        fields: &JsonMap<String, Json>,
    ) -> Result<Record, ClientError> {
        let command = self.command(name)?;
        let request = command.decode_request(fields).map_err(request_error)?;
        self.send(&command, &request)
    }

    /// Sends a prepared request record of `command`.
    ///
    /// # Errors
    ///
    /// See [`Client::call`].
    pub fn send(&mut self, command: &CommandSchema, request: &Record) -> Result<Record, ClientError> {
        let line = request_line(command, request)?;
        self.send_line(command, &line)
    }

    /// Drops the current connection; the next call reconnects.
    pub fn disconnect(&mut self) {
        self.connection = None;
    }

    pub(crate) fn send_line(
        &mut self,
        command: &CommandSchema,
        line: &[u8],
    ) -> Result<Record, ClientError> {
        let reply = self.exchange(line)?;
        let response =
            wire::decode_response(&reply).map_err(|source| ClientError::Protocol { source })?;
        let fields = response.into_result()?;
        command
            .decode_response(&fields)
            .map_err(|source| ClientError::Response { source })
    }

    fn exchange(&mut self, line: &[u8]) -> Result<Vec<u8>, ClientError> {
        let error = match self.exchange_once(line) {
            Ok(reply) => return Ok(reply),
            Err(error) => error,
        };
        self.disconnect();
        if !error.is_connection_failure() {
            return Err(error);
        }
        let retried = self.exchange_once(line);
        if retried.is_err() {
            self.disconnect();
        }
        retried
    }

    fn exchange_once(&mut self, line: &[u8]) -> Result<Vec<u8>, ClientError> {
        let timeout = self.response_timeout;
        let connection = self.connection()?;
        wire::write_line(connection.get_mut(), line).map_err(exchange_error)?;
        match wire::read_line(connection) {
            Ok(Some(reply)) => Ok(reply),
            Ok(None) => Err(ClientError::Closed),
            Err(WireError::Io(source)) => Err(match timeout {
                Some(timeout) if is_timeout(&source) => ClientError::Timeout { timeout },
                _ => ClientError::Transport { source },
            }),
            Err(source) => Err(ClientError::Protocol { source }),
        }
    }

    fn connection(&mut self) -> Result<&mut BufReader<Connection>, ClientError> {
        let connection = match self.connection.take() {
            Some(connection) => connection,
            None => {
                let connection = transport::connect(&self.endpoint)?;
                connection
                    .set_read_timeout(self.response_timeout)
                    .map_err(|source| ClientError::Transport { source })?;
                BufReader::new(connection)
            }
        };
        Ok(self.connection.insert(connection))
    }
}

/// A client whose every call is authorised by a fresh signature.
#[derive(Debug)]
pub struct AuthenticatedClient {
    client: Client,
    key: AuthKey,
}

impl AuthenticatedClient {
    #[must_use]
    pub fn new(client: Client, key: AuthKey) -> Self {
        Self { client, key }
    }

    /// Creates a client for the configured endpoint and derives the signing
    /// key from the configured passphrase.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Auth`] when the salt or iteration count is
    /// invalid.
    pub fn from_config(config: &Config) -> Result<Self, ClientError> {
        let salt = auth::decode_hex(config.kdf_salt_hex()).map_err(auth_error)?;
        let key = AuthKey::derive(config.passphrase(), &salt, config.kdf_iterations())
            .map_err(auth_error)?;
        Ok(Self::new(Client::from_config(config)?, key))
    }

    /// The underlying client, for unauthenticated calls.
    pub fn client(&mut self) -> &mut Client {
        &mut self.client
    }

    /// Calls `name` with the given field values.
    ///
    /// # Errors
    ///
    /// See [`Client::call`]; handshake failures surface as the daemon's
    /// `no-nonce`, `forbidden`, or `invalid-signature` errors.
    pub fn call<I, K, V>(&mut self, name: &str, values: I) -> Result<Record, ClientError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let command = self.client.command(name)?;
        let request = command.request(values).map_err(request_error)?;
        self.send(&command, &request)
    }

    /// Calls `name` with fields given in their wire form.
    ///
    /// # Errors
    ///
    /// See [`AuthenticatedClient::call`].
    pub fn call_json(
        &mut self,
        name: &str,
        fields: &JsonMap<String, Json>,
    ) -> Result<Record, ClientError> {
        let command = self.client.command(name)?;
        let request = command.decode_request(fields).map_err(request_error)?;
        self.send(&command, &request)
    }

    /// Signs and sends a prepared request record of `command`.
    ///
    /// # Errors
    ///
    /// See [`AuthenticatedClient::call`].
    pub fn send(&mut self, command: &CommandSchema, request: &Record) -> Result<Record, ClientError> {
        let line = request_line(command, request)?;
        let nonce = self.request_nonce()?;
        let signature = self.key.sign_hex(&nonce, &line).map_err(auth_error)?;
        self.client
            .call(names::PRELOAD_SIGNATURE, [("signature_hex", signature)])?;
        self.client.send_line(command, &line)
    }

    fn request_nonce(&mut self) -> Result<Vec<u8>, ClientError> {
        let command = self.client.command(names::GENERATE_NONCE)?;
        let request = Record::empty(command.request_schema()).map_err(request_error)?;
        let issued = self.client.send(&command, &request)?;
        let nonce_hex = issued.str("nonce_hex").ok_or(ClientError::MissingNonce)?;
        auth::decode_hex(nonce_hex).map_err(auth_error)
    }
}

/// The exact bytes sent for `request`; signatures are computed over these.
fn request_line(command: &CommandSchema, request: &Record) -> Result<Vec<u8>, ClientError> {
    let fields = command.encode_request(request).map_err(request_error)?;
    wire::encode_line(&RpcRequest::new(command.name(), fields))
        .map_err(|source| ClientError::Protocol { source })
}

fn is_timeout(error: &std::io::Error) -> bool {
    matches!(
        error.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

fn exchange_error(error: WireError) -> ClientError {
    match error {
        WireError::Io(source) => ClientError::Transport { source },
        source => ClientError::Protocol { source },
    }
}

fn request_error(source: scaninout_proto::SchemaError) -> ClientError {
    ClientError::Request { source }
}

fn auth_error(source: scaninout_proto::AuthError) -> ClientError {
    ClientError::Auth { source }
}
