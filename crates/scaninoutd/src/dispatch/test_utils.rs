use std::sync::{Arc, Mutex, PoisonError};

use scaninout_proto::field::AcceptAnyTag;
use scaninout_proto::{AuthKey, RpcResponse, catalog};
use serde_json::{Value as Json, json};
use time::{Duration, OffsetDateTime};

use crate::store::{MemoryStore, Persistence};

use super::{Clock, Dispatcher, HandlerTable, Session};

pub(crate) const TEST_KEY: AuthKey = AuthKey::from_bytes([42; 32]);

/// A clock that only moves when told to.
#[derive(Debug)]
pub(crate) struct ManualClock {
    now: Mutex<OffsetDateTime>,
}

impl ManualClock {
    pub(crate) fn new(start: OffsetDateTime) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub(crate) fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A dispatcher over the full catalog with every tag accepted.
pub(crate) fn dispatcher_with(store: Arc<dyn Persistence>, clock: Arc<dyn Clock>) -> Arc<Dispatcher> {
    let registry = catalog::build(Arc::new(AcceptAnyTag)).expect("catalog");
    let handlers = HandlerTable::standard().expect("handlers");
    Arc::new(Dispatcher::new(Arc::new(registry), handlers, store, TEST_KEY).with_clock(clock))
}

pub(crate) fn dispatcher() -> Arc<Dispatcher> {
    dispatcher_with(
        Arc::new(MemoryStore::new()),
        Arc::new(ManualClock::new(OffsetDateTime::UNIX_EPOCH)),
    )
}

/// The request line for `command` with `fields`.
pub(crate) fn request_line(command: &str, fields: &Json) -> Vec<u8> {
    serde_json::to_vec(&json!({"command": command, "fields": fields})).expect("request line")
}

/// Arms `session` and preloads a valid signature for `line`.
pub(crate) fn authorise(session: &mut Session, line: &[u8]) {
    let nonce = session.arm();
    let signature = TEST_KEY.sign(&nonce, line).expect("sign");
    session.preload(signature).expect("preload");
}

/// Dispatches `command` on `session`, signing it first when `signed`.
pub(crate) fn call(
    dispatcher: &Dispatcher,
    session: &mut Session,
    command: &str,
    fields: &Json,
    signed: bool,
) -> RpcResponse {
    let line = request_line(command, fields);
    if signed {
        authorise(session, &line);
    }
    dispatcher.dispatch(session, &line)
}
