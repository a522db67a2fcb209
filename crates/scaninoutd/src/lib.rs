//! The scan-in/scan-out record-keeping daemon.
//!
//! `scaninoutd` listens on a single local socket and serves the command
//! catalog declared in [`scaninout_proto::catalog`]. Each accepted connection
//! runs its own sequential read loop: one request line in, one response line
//! out. Privileged commands are gated by a per-connection challenge-response
//! handshake keyed on a password-derived secret, and every request that
//! reaches a handler runs inside exactly one persistence transaction.
//!
//! The bootstrap sequence loads configuration, initialises structured
//! telemetry, prepares the socket directory, derives the signing key once,
//! and installs the process-wide command registry. Health hooks emit a
//! structured event at each stage so operators can diagnose failures.

mod bootstrap;
pub mod dispatch;
mod health;
mod process;
pub mod store;
pub mod telemetry;
pub mod transport;

pub use bootstrap::{
    BootstrapError, ConfigLoader, Daemon, StaticConfigLoader, SystemConfigLoader, bootstrap_with,
};
pub use dispatch::{
    Access, CommandHandler, DispatchConnectionHandler, Dispatcher, HandlerContext, HandlerError,
    HandlerTable, Session,
};
pub use health::{HealthReporter, LifecycleEvent, StructuredHealthReporter};
pub use process::{LaunchError, run_daemon};
pub use store::{MemoryStore, Persistence, StoreError, Transaction};
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
