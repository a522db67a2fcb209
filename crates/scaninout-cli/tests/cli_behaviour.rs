//! Behavioural tests for the `scaninout` command-line front end.

mod common;

use std::cell::RefCell;
use std::ffi::OsString;
use std::process::ExitCode;

use common::TestDaemon;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use serde_json::Value as Json;

#[derive(Default)]
struct CliWorld {
    daemon: Option<TestDaemon>,
    exit_code: Option<ExitCode>,
    stdout: String,
    stderr: String,
}

impl CliWorld {
    fn run(&mut self, command: &str, fields: &str, authenticated: bool) {
        let endpoint = self
            .daemon
            .as_ref()
            .expect("daemon not started")
            .endpoint()
            .to_string();
        let mut args: Vec<OsString> = ["scaninout", "--daemon-socket", endpoint.as_str(), command, fields]
            .iter()
            .map(OsString::from)
            .collect();
        if authenticated {
            args.push(OsString::from("--authenticated"));
        }

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        self.exit_code = Some(scaninout_cli::run(args, &mut stdout, &mut stderr));
        self.stdout = String::from_utf8(stdout).expect("stdout utf8");
        self.stderr = String::from_utf8(stderr).expect("stderr utf8");
    }
}

#[fixture]
fn world() -> RefCell<CliWorld> {
    RefCell::new(CliWorld::default())
}

#[given("a running daemon")]
fn given_daemon(world: &RefCell<CliWorld>) {
    world.borrow_mut().daemon = Some(TestDaemon::start().expect("start daemon"));
}

#[given("a member enrolled from the command line")]
fn given_member(world: &RefCell<CliWorld>) {
    let mut world = world.borrow_mut();
    world.run(
        "MemberAdd",
        r#"{"member": {"tag": "H012345678", "first_name": "Ada", "last_name": "Lovelace"}}"#,
        false,
    );
    assert_eq!(world.exit_code, Some(ExitCode::SUCCESS), "{}", world.stderr);
}

#[when("the operator runs {command} with {fields}")]
fn when_runs(world: &RefCell<CliWorld>, command: String, fields: String) {
    world
        .borrow_mut()
        .run(strip_quotes(&command), &fields, false);
}

#[when("the operator signs and runs {command} with {fields}")]
fn when_signs_and_runs(world: &RefCell<CliWorld>, command: String, fields: String) {
    world
        .borrow_mut()
        .run(strip_quotes(&command), &fields, true);
}

#[then("the command succeeds")]
fn then_succeeds(world: &RefCell<CliWorld>) {
    let world = world.borrow();
    assert_eq!(world.exit_code, Some(ExitCode::SUCCESS), "{}", world.stderr);
    assert!(world.stderr.is_empty(), "{}", world.stderr);
}

#[then("the output is {expected}")]
fn then_output(world: &RefCell<CliWorld>, expected: String) {
    let expected: Json = serde_json::from_str(&expected).expect("expected json");
    let printed: Json = serde_json::from_str(&world.borrow().stdout).expect("printed json");
    assert_eq!(printed, expected);
}

#[then("the command fails reporting {id}")]
fn then_fails(world: &RefCell<CliWorld>, id: String) {
    let world = world.borrow();
    assert_eq!(world.exit_code, Some(ExitCode::FAILURE));
    assert!(world.stdout.is_empty(), "{}", world.stdout);
    let prefix = format!("error [{}]: ", strip_quotes(&id));
    assert!(world.stderr.starts_with(&prefix), "{}", world.stderr);
}

fn strip_quotes(value: &str) -> &str {
    value.trim_matches('"')
}

#[scenario(path = "tests/features/command_line.feature")]
fn command_line(#[from(world)] world: RefCell<CliWorld>) {
    drop(world);
}
