//! Command handler table.
//!
//! The command registry declares what each command looks like on the wire;
//! this table declares who serves it and whether it needs the handshake.
//! Keeping the two apart lets a registered command exist without a handler,
//! which the dispatcher reports as `no-handler`.

use std::collections::HashMap;
use std::sync::Arc;

use scaninout_proto::Record;
use scaninout_proto::catalog::names;
use thiserror::Error;

use super::dispatcher::HandlerContext;
use super::errors::HandlerError;
use super::handlers::{info_fields, members, scans, system};

/// Tracing target for dispatch operations.
pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// Whether a command needs an authenticated handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Served to any connection.
    Public,
    /// Served only after a successful signature check.
    Private,
}

/// Serves one command.
pub trait CommandHandler: Send + Sync {
    /// Produces the response record for `request`.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::Command`] for failures the client should see;
    /// anything else becomes `critical-error`.
    fn handle(
        &self,
        request: &Record,
        context: &mut HandlerContext<'_>,
    ) -> Result<Record, HandlerError>;
}

impl<F> CommandHandler for F
where
    F: Fn(&Record, &mut HandlerContext<'_>) -> Result<Record, HandlerError> + Send + Sync,
{
    fn handle(
        &self,
        request: &Record,
        context: &mut HandlerContext<'_>,
    ) -> Result<Record, HandlerError> {
        self(request, context)
    }
}

/// Errors raised while assembling a [`HandlerTable`].
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("command '{command}' already has a handler")]
    Duplicate { command: String },
}

#[derive(Clone)]
pub(crate) struct Route {
    access: Access,
    handler: Arc<dyn CommandHandler>,
}

impl Route {
    pub(crate) const fn access(&self) -> Access {
        self.access
    }

    pub(crate) fn handler(&self) -> &dyn CommandHandler {
        self.handler.as_ref()
    }
}

/// Maps command names to their handlers and access levels.
#[derive(Clone, Default)]
pub struct HandlerTable {
    routes: HashMap<String, Route>,
}

impl std::fmt::Debug for HandlerTable {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut commands: Vec<_> = self.routes.keys().collect();
        commands.sort();
        formatter
            .debug_struct("HandlerTable")
            .field("commands", &commands)
            .finish()
    }
}

impl HandlerTable {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The handlers for the whole command catalog.
    ///
    /// # Errors
    ///
    /// Never fails in practice; the catalog names are distinct.
    pub fn standard() -> Result<Self, RouteError> {
        let mut table = Self::new();
        table.register(names::PING, Access::Public, system::ping)?;
        table.register(
            names::AUTHENTICATED_PING,
            Access::Private,
            system::authenticated_ping,
        )?;
        table.register(names::GENERATE_NONCE, Access::Public, system::generate_nonce)?;
        table.register(
            names::PRELOAD_SIGNATURE,
            Access::Public,
            system::preload_signature,
        )?;

        table.register(names::MEMBER_INFO_FIELD_ADD, Access::Private, info_fields::add)?;
        table.register(names::MEMBER_INFO_FIELD_EDIT, Access::Private, info_fields::edit)?;
        table.register(
            names::MEMBER_INFO_FIELD_DELETE,
            Access::Private,
            info_fields::delete,
        )?;
        table.register(names::MEMBER_INFO_FIELD_GET, Access::Private, info_fields::get)?;
        table.register(
            names::MEMBER_INFO_FIELD_GET_ALL,
            Access::Private,
            info_fields::get_all,
        )?;

        table.register(names::MEMBER_ADD, Access::Public, members::add)?;
        table.register(names::MEMBER_EDIT, Access::Private, members::edit)?;
        table.register(names::MEMBER_DELETE, Access::Private, members::delete)?;
        table.register(names::MEMBER_GET, Access::Private, members::get)?;
        table.register(names::MEMBER_GET_ALL, Access::Private, members::get_all)?;

        table.register(names::MEMBER_SCAN_IN_OUT, Access::Public, scans::scan_in_out)?;
        table.register(names::MEMBER_GET_SHIFTS, Access::Private, scans::get_shifts)?;
        Ok(table)
    }

    /// Adds a handler for `command`.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::Duplicate`] when `command` already has one.
    pub fn register(
        &mut self,
        command: &str,
        access: Access,
        handler: impl CommandHandler + 'static,
    ) -> Result<&mut Self, RouteError> {
        if self.routes.contains_key(command) {
            return Err(RouteError::Duplicate {
                command: command.to_owned(),
            });
        }
        self.routes.insert(
            command.to_owned(),
            Route {
                access,
                handler: Arc::new(handler),
            },
        );
        Ok(self)
    }

    /// The access level of `command`, if it has a handler.
    #[must_use]
    pub fn access(&self, command: &str) -> Option<Access> {
        self.routes.get(command).map(Route::access)
    }

    pub(crate) fn route(&self, command: &str) -> Option<&Route> {
        self.routes.get(command)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
