//! Socket listener for the daemon endpoint.
//!
//! The transport binds the configured endpoint and accepts connections in a
//! background thread, handing each accepted stream to a
//! [`ConnectionHandler`] on its own thread.

mod errors;
mod handler;
mod listener;
#[cfg(test)]
mod test_utils;

pub use self::errors::ListenerError;
pub use self::handler::{ConnectionHandler, ConnectionStream};
pub use self::listener::{ListenerHandle, SocketListener};
#[cfg(test)]
pub(crate) use self::test_utils::CountingHandler;

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
