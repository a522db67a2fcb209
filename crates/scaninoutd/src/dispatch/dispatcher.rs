//! Request execution for a single line.

use std::sync::Arc;

use serde_json::{Map as JsonMap, Value as Json};
use time::{Duration, OffsetDateTime};
use tracing::{debug, error};

use scaninout_proto::{
    AuthKey, CommandError, CommandRegistry, CommandSchema, Record, RpcResponse, Schema, Value, wire,
};

use crate::store::{Persistence, Transaction};

use super::clock::{Clock, SystemClock};
use super::errors::HandlerError;
use super::router::{Access, DISPATCH_TARGET, HandlerTable, Route};
use super::session::Session;

/// Everything a handler may touch while serving one request.
pub struct HandlerContext<'a> {
    command: &'a CommandSchema,
    registry: &'a CommandRegistry,
    transaction: &'a mut dyn Transaction,
    session: &'a mut Session,
    clock: &'a dyn Clock,
    scan_expiry: Duration,
}

impl HandlerContext<'_> {
    /// The command being served.
    #[must_use]
    pub fn command(&self) -> &CommandSchema {
        self.command
    }

    /// The request's open transaction.
    pub fn transaction(&mut self) -> &mut dyn Transaction {
        &mut *self.transaction
    }

    /// The connection's handshake state.
    pub fn session(&mut self) -> &mut Session {
        &mut *self.session
    }

    #[must_use]
    pub fn now(&self) -> OffsetDateTime {
        self.clock.now()
    }

    /// Age after which an open scan-in is discarded.
    #[must_use]
    pub const fn scan_expiry(&self) -> Duration {
        self.scan_expiry
    }

    /// A shared record schema such as `Member`.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::UnknownSchema`] when it is not registered.
    pub fn record_schema(&self, name: &str) -> Result<&Arc<Schema>, HandlerError> {
        self.registry
            .record_schema(name)
            .ok_or_else(|| HandlerError::UnknownSchema {
                name: name.to_owned(),
            })
    }

    /// Builds the command's response record.
    ///
    /// # Errors
    ///
    /// Fails when `values` do not satisfy the response schema.
    pub fn respond<I, K, V>(&self, values: I) -> Result<Record, HandlerError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        Ok(self.command.response(values)?)
    }

    /// Builds an empty response record.
    ///
    /// # Errors
    ///
    /// Fails when the response schema has required fields.
    pub fn acknowledge(&self) -> Result<Record, HandlerError> {
        self.respond(std::iter::empty::<(&str, Value)>())
    }
}

/// Executes request lines against the registry, the handler table and the
/// store.
pub struct Dispatcher {
    registry: Arc<CommandRegistry>,
    handlers: HandlerTable,
    store: Arc<dyn Persistence>,
    key: AuthKey,
    clock: Arc<dyn Clock>,
    scan_expiry: Duration,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Dispatcher")
            .field("commands", &self.registry.len())
            .field("handlers", &self.handlers)
            .field("key", &self.key)
            .field("scan_expiry", &self.scan_expiry)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Default age after which an open scan-in is discarded.
    pub const DEFAULT_SCAN_EXPIRY: Duration = Duration::hours(4);

    #[must_use]
    pub fn new(
        registry: Arc<CommandRegistry>,
        handlers: HandlerTable,
        store: Arc<dyn Persistence>,
        key: AuthKey,
    ) -> Self {
        Self {
            registry,
            handlers,
            store,
            key,
            clock: Arc::new(SystemClock),
            scan_expiry: Self::DEFAULT_SCAN_EXPIRY,
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub const fn with_scan_expiry(mut self, scan_expiry: Duration) -> Self {
        self.scan_expiry = scan_expiry;
        self
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    /// Executes one request line on behalf of the connection owning
    /// `session` and returns the envelope to send back.
    pub fn dispatch(&self, session: &mut Session, line: &[u8]) -> RpcResponse {
        match self.execute(session, line) {
            Ok(fields) => RpcResponse::success(fields),
            Err(HandlerError::Command(rejection)) => {
                debug!(
                    target: DISPATCH_TARGET,
                    id = rejection.id(),
                    message = rejection.message(),
                    "request rejected"
                );
                RpcResponse::failure(rejection)
            }
            Err(fault) => {
                error!(
                    target: DISPATCH_TARGET,
                    error = ?fault,
                    "request failed"
                );
                RpcResponse::failure(CommandError::critical())
            }
        }
    }

    fn execute(
        &self,
        session: &mut Session,
        line: &[u8],
    ) -> Result<JsonMap<String, Json>, HandlerError> {
        let request = wire::decode_request(line)
            .map_err(|error| error.to_command_error().unwrap_or_else(CommandError::critical))?;
        let command = self.registry.get(&request.command)?;
        let route = self
            .handlers
            .route(command.name())
            .ok_or_else(CommandError::no_handler)?;
        debug!(
            target: DISPATCH_TARGET,
            command = command.name(),
            access = ?route.access(),
            "dispatching request"
        );
        if route.access() == Access::Private {
            session.check(&self.key, line)?;
        }
        let record = command
            .decode_request(&request.fields)
            .map_err(|error| CommandError::validation(&error))?;

        let mut transaction = self.store.begin()?;
        match self.run(route, command, &record, session, transaction.as_mut()) {
            Ok(fields) => {
                transaction.commit()?;
                Ok(fields)
            }
            Err(error) => {
                transaction.rollback();
                Err(error)
            }
        }
    }

    fn run(
        &self,
        route: &Route,
        command: &CommandSchema,
        request: &Record,
        session: &mut Session,
        transaction: &mut dyn Transaction,
    ) -> Result<JsonMap<String, Json>, HandlerError> {
        let mut context = HandlerContext {
            command,
            registry: &self.registry,
            transaction,
            session,
            clock: self.clock.as_ref(),
            scan_expiry: self.scan_expiry,
        };
        let response = route.handler().handle(request, &mut context)?;
        if !command.is_response(&response) {
            return Err(CommandError::no_response().into());
        }
        Ok(command.encode_response(&response)?)
    }
}
