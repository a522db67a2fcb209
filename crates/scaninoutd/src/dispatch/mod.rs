//! Line-oriented RPC dispatch.
//!
//! Every accepted connection runs [`DispatchConnectionHandler`]'s read loop:
//!
//! 1. read one line (oversized lines are answered with `format-error` and
//!    skipped);
//! 2. decode the `{"command", "fields"}` envelope (`json-error` /
//!    `format-error`);
//! 3. look the command up in the registry (`unknown-command`) and in the
//!    [`HandlerTable`] (`no-handler`);
//! 4. for [`Access::Private`] commands, check the connection's handshake
//!    against the raw line bytes (`forbidden` / `invalid-signature`);
//! 5. decode the fields into the request record (`validation-error`);
//! 6. run the handler inside one transaction, check that it produced the
//!    command's response record (`no-response`), encode it, and commit.
//!
//! Handler [`scaninout_proto::CommandError`]s roll back and reach the client
//! verbatim. Any other failure rolls back, is logged locally, and reaches the
//! client as an opaque `critical-error`.

mod clock;
mod dispatcher;
mod errors;
mod handler;
mod handlers;
mod response;
mod router;
mod session;
#[cfg(test)]
pub(crate) mod test_utils;

pub use self::clock::{Clock, SystemClock};
pub use self::dispatcher::{Dispatcher, HandlerContext};
pub use self::errors::HandlerError;
pub use self::handler::DispatchConnectionHandler;
pub use self::response::ResponseWriter;
pub use self::router::{Access, CommandHandler, HandlerTable, RouteError};
pub use self::session::Session;
