//! Behavioural tests for the line-oriented dispatch loop.

use std::cell::RefCell;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use scaninout_config::SocketEndpoint;
use scaninout_proto::catalog::{names, records};
use scaninout_proto::envelope::ids;
use scaninout_proto::field::AcceptAnyTag;
use scaninout_proto::{CommandError, Record, auth, catalog, wire};
use serde_json::{Value as Json, json};
use time::{Duration, OffsetDateTime};

use crate::dispatch::test_utils::{ManualClock, TEST_KEY, dispatcher_with, request_line};
use crate::dispatch::{
    Access, DispatchConnectionHandler, Dispatcher, HandlerContext, HandlerError, HandlerTable,
};
use crate::store::MemoryStore;
use crate::transport::{ListenerHandle, SocketListener};

const ENROLMENT_CLOSED: &str = "enrolment-closed";

fn enrol_then_refuse(
    request: &Record,
    context: &mut HandlerContext<'_>,
) -> Result<Record, HandlerError> {
    if let Some(member) = request.record("member") {
        context.transaction().insert(member.clone())?;
    }
    Err(CommandError::new(ENROLMENT_CLOSED, "Enrolment is closed.").into())
}

fn echo_request(
    request: &Record,
    _context: &mut HandlerContext<'_>,
) -> Result<Record, HandlerError> {
    Ok(request.clone())
}

fn enrol_then_fault(
    request: &Record,
    context: &mut HandlerContext<'_>,
) -> Result<Record, HandlerError> {
    if let Some(member) = request.record("member") {
        context.transaction().insert(member.clone())?;
    }
    Err(HandlerError::UnknownSchema {
        name: "Visitor".to_owned(),
    })
}

fn missing_schema(
    _request: &Record,
    context: &mut HandlerContext<'_>,
) -> Result<Record, HandlerError> {
    context.record_schema("Visitor")?;
    context.acknowledge()
}

/// Handlers that misbehave in every way the dispatcher must contain.
/// `AuthenticatedPing` is deliberately left without a handler.
fn faulty_handlers() -> HandlerTable {
    let mut table = HandlerTable::new();
    table
        .register(names::MEMBER_ADD, Access::Public, enrol_then_refuse)
        .and_then(|table| table.register(names::PING, Access::Public, echo_request))
        .and_then(|table| table.register(names::MEMBER_EDIT, Access::Public, enrol_then_fault))
        .and_then(|table| table.register(names::MEMBER_GET_ALL, Access::Public, missing_schema))
        .expect("faulty handlers");
    table
}

struct DispatchWorld {
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
    listener: Option<ListenerHandle>,
    connection: Option<BufReader<TcpStream>>,
    last_line: Vec<u8>,
    response: Option<Json>,
}

impl DispatchWorld {
    fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            clock: Arc::new(ManualClock::new(OffsetDateTime::UNIX_EPOCH)),
            listener: None,
            connection: None,
            last_line: Vec::new(),
            response: None,
        }
    }

    fn start(&mut self, dispatcher: Arc<Dispatcher>) {
        let listener =
            SocketListener::bind(&SocketEndpoint::tcp("127.0.0.1", 0)).expect("bind listener");
        let address = listener.local_addr().expect("tcp address");
        let handler = Arc::new(DispatchConnectionHandler::new(dispatcher));
        self.listener = Some(listener.start(handler).expect("start listener"));

        let stream = TcpStream::connect(address).expect("connect");
        stream
            .set_read_timeout(Some(StdDuration::from_secs(5)))
            .expect("set read timeout");
        self.connection = Some(BufReader::new(stream));
    }

    fn start_standard(&mut self) {
        let dispatcher = dispatcher_with(self.store.clone(), self.clock.clone());
        self.start(dispatcher);
    }

    fn start_faulty(&mut self) {
        let registry = catalog::build(Arc::new(AcceptAnyTag)).expect("catalog");
        let dispatcher = Dispatcher::new(
            Arc::new(registry),
            faulty_handlers(),
            self.store.clone(),
            TEST_KEY,
        );
        self.start(Arc::new(dispatcher));
    }

    fn connection(&mut self) -> &mut BufReader<TcpStream> {
        self.connection.as_mut().expect("daemon not started")
    }

    fn write_raw(&mut self, bytes: &[u8]) {
        let stream = self.connection().get_mut();
        stream.write_all(bytes).expect("write request");
        stream.flush().expect("flush");
    }

    fn read_response(&mut self) -> Json {
        let mut line = String::new();
        self.connection().read_line(&mut line).expect("read response");
        let response: Json = serde_json::from_str(&line).expect("response json");
        self.response = Some(response.clone());
        response
    }

    fn send_line(&mut self, line: &[u8]) -> Json {
        let mut framed = line.to_vec();
        framed.push(b'\n');
        self.write_raw(&framed);
        self.last_line = line.to_vec();
        self.read_response()
    }

    fn send(&mut self, command: &str, fields: &Json) -> Json {
        self.send_line(&request_line(command, fields))
    }

    fn fields(&mut self, command: &str, fields: &Json) -> Json {
        let response = self.send(command, fields);
        assert_eq!(response["success"], true, "{command} failed: {response}");
        response["fields"].clone()
    }

    /// Runs the three-step handshake; `tamper` flips one signature byte.
    fn send_signed(&mut self, command: &str, fields: &Json, tamper: bool) {
        let nonce = self.fields(names::GENERATE_NONCE, &json!({}));
        let nonce = auth::decode_hex(nonce["nonce_hex"].as_str().expect("nonce hex"))
            .expect("nonce bytes");
        let line = request_line(command, fields);
        let mut signature = TEST_KEY.sign(&nonce, &line).expect("sign");
        if tamper {
            if let Some(byte) = signature.first_mut() {
                *byte ^= 0xff;
            }
        }
        self.fields(
            names::PRELOAD_SIGNATURE,
            &json!({"signature_hex": hex::encode(signature)}),
        );
        self.send_line(&line);
    }

    fn response(&self) -> &Json {
        self.response.as_ref().expect("no response recorded")
    }
}

impl Drop for DispatchWorld {
    fn drop(&mut self) {
        self.connection.take();
        if let Some(handle) = self.listener.take() {
            handle.shutdown();
            let _ = handle.join();
        }
    }
}

#[fixture]
fn world() -> RefCell<DispatchWorld> {
    RefCell::new(DispatchWorld::new())
}

#[given("a running daemon")]
fn given_running_daemon(world: &RefCell<DispatchWorld>) {
    world.borrow_mut().start_standard();
}

#[given("a running daemon with faulty handlers")]
fn given_faulty_daemon(world: &RefCell<DispatchWorld>) {
    world.borrow_mut().start_faulty();
}

#[given("a member enrolled with tag {tag}")]
fn given_member(world: &RefCell<DispatchWorld>, tag: String) {
    let member = json!({"member": {
        "tag": strip_quotes(&tag),
        "first_name": "Ada",
        "last_name": "Lovelace"
    }});
    world.borrow_mut().fields(names::MEMBER_ADD, &member);
}

#[when("the client sends a {command} request")]
fn when_plain_request(world: &RefCell<DispatchWorld>, command: String) {
    world
        .borrow_mut()
        .send(strip_quotes(&command), &json!({}));
}

#[when("the client signs and sends a {command} request")]
fn when_signed_request(world: &RefCell<DispatchWorld>, command: String) {
    world
        .borrow_mut()
        .send_signed(strip_quotes(&command), &json!({}), false);
}

#[when("the client tampers with the signature of a {command} request")]
fn when_tampered_request(world: &RefCell<DispatchWorld>, command: String) {
    world
        .borrow_mut()
        .send_signed(strip_quotes(&command), &json!({}), true);
}

#[when("the client repeats the last request")]
fn when_repeat(world: &RefCell<DispatchWorld>) {
    let mut world = world.borrow_mut();
    let line = world.last_line.clone();
    world.send_line(&line);
}

#[when("the client sends a malformed line")]
fn when_malformed(world: &RefCell<DispatchWorld>) {
    world.borrow_mut().send_line(b"{\"command\": \"Ping\", ");
}

#[when("the client sends an oversized line")]
fn when_oversized(world: &RefCell<DispatchWorld>) {
    let mut line = vec![b' '; wire::MAX_LINE_BYTES + 1];
    line.push(b'\n');
    let mut world = world.borrow_mut();
    world.write_raw(&line);
    world.read_response();
}

#[when("the client enrols a member without a first name")]
fn when_invalid_member(world: &RefCell<DispatchWorld>) {
    let member = json!({"member": {"tag": "H012345678", "last_name": "Lovelace"}});
    world.borrow_mut().send(names::MEMBER_ADD, &member);
}

#[when("the client enrols a member with tag {tag}")]
fn when_enrol(world: &RefCell<DispatchWorld>, tag: String) {
    let member = json!({"member": {
        "tag": strip_quotes(&tag),
        "first_name": "Grace",
        "last_name": "Hopper"
    }});
    world.borrow_mut().send(names::MEMBER_ADD, &member);
}

#[when("the client edits a member with tag {tag}")]
fn when_edit(world: &RefCell<DispatchWorld>, tag: String) {
    let member = json!({"member": {
        "tag": strip_quotes(&tag),
        "first_name": "Grace",
        "last_name": "Hopper"
    }});
    world.borrow_mut().send(names::MEMBER_EDIT, &member);
}

#[when("the tag {tag} is scanned")]
fn when_scanned(world: &RefCell<DispatchWorld>, tag: String) {
    world
        .borrow_mut()
        .send(names::MEMBER_SCAN_IN_OUT, &json!({"tag": strip_quotes(&tag)}));
}

#[when("{minutes} minutes pass")]
fn when_time_passes(world: &RefCell<DispatchWorld>, minutes: i64) {
    world.borrow().clock.advance(Duration::minutes(minutes));
}

#[when("the first member's shifts are requested")]
fn when_shifts_requested(world: &RefCell<DispatchWorld>) {
    world
        .borrow_mut()
        .send_signed(names::MEMBER_GET_SHIFTS, &json!({"id": 1}), false);
}

#[then("the response succeeds with no fields")]
fn then_empty_success(world: &RefCell<DispatchWorld>) {
    assert_eq!(
        world.borrow().response(),
        &json!({"success": true, "fields": {}})
    );
}

#[then("the response fails with {id}")]
fn then_failure(world: &RefCell<DispatchWorld>, id: String) {
    let world = world.borrow();
    let response = world.response();
    assert_eq!(response["success"], false, "unexpected success: {response}");
    assert_eq!(response["error"]["id"], strip_quotes(&id), "{response}");
    assert!(response.get("fields").is_none(), "{response}");
}

#[then("the member is scanned in")]
fn then_scanned_in(world: &RefCell<DispatchWorld>) {
    let world = world.borrow();
    let response = world.response();
    assert_eq!(response["fields"]["scanned_in"], true, "{response}");
    assert_eq!(response["fields"]["elapsed_hours"], Json::Null);
}

#[then("the member is scanned out after {hours} hours")]
fn then_scanned_out(world: &RefCell<DispatchWorld>, hours: f64) {
    let world = world.borrow();
    let response = world.response();
    assert_eq!(response["fields"]["scanned_in"], false, "{response}");
    assert_eq!(response["fields"]["elapsed_hours"].as_f64(), Some(hours));
}

#[then("the shifts total {hours} hours over {count} shifts")]
fn then_shift_total(world: &RefCell<DispatchWorld>, hours: f64, count: usize) {
    let world = world.borrow();
    let fields = &world.response()["fields"];
    assert_eq!(fields["hours"].as_f64(), Some(hours), "{fields}");
    assert_eq!(fields["shifts"].as_array().map(Vec::len), Some(count));
}

#[then("no member was stored")]
fn then_no_member(world: &RefCell<DispatchWorld>) {
    assert!(world.borrow().store.rows(records::MEMBER).is_empty());
}

#[then("the response reports an unexpected fault")]
fn then_critical(world: &RefCell<DispatchWorld>) {
    let world = world.borrow();
    let response = world.response();
    assert_eq!(response["error"]["id"], ids::CRITICAL_ERROR);
    assert_eq!(
        response["error"]["message"],
        "Critical error. See log for details."
    );
}

fn strip_quotes(value: &str) -> &str {
    value.trim_matches('"')
}

#[scenario(path = "tests/features/daemon_dispatch.feature")]
fn daemon_dispatch(#[from(world)] world: RefCell<DispatchWorld>) {
    drop(world);
}

#[scenario(path = "tests/features/handler_faults.feature")]
fn handler_faults(#[from(world)] world: RefCell<DispatchWorld>) {
    drop(world);
}

#[scenario(path = "tests/features/scanning.feature")]
fn scanning(#[from(world)] world: RefCell<DispatchWorld>) {
    drop(world);
}
