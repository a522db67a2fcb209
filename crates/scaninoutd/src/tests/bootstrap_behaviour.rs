//! Behavioural tests for the daemon bootstrap sequence.

use std::cell::RefCell;
use std::sync::Arc;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use scaninout_config::LogFormat;
use scaninout_proto::catalog::names;
use serde_json::json;

use crate::bootstrap::{BootstrapError, ConfigLoader, Daemon, bootstrap_with};
use crate::dispatch::Session;
use crate::dispatch::test_utils::request_line;
use crate::store::MemoryStore;

use super::support::{FailingConfigLoader, HealthEvent, RecordingHealthReporter, TestConfigLoader};

struct BootstrapWorld {
    loader: Box<dyn ConfigLoader>,
    reporter: Arc<RecordingHealthReporter>,
    outcome: Option<Result<Daemon, BootstrapError>>,
}

impl BootstrapWorld {
    fn daemon(&self) -> &Daemon {
        match &self.outcome {
            Some(Ok(daemon)) => daemon,
            other => panic!("bootstrap did not succeed: {other:?}"),
        }
    }

    fn error(&self) -> &BootstrapError {
        match &self.outcome {
            Some(Err(error)) => error,
            other => panic!("bootstrap did not fail: {other:?}"),
        }
    }
}

#[fixture]
fn world() -> RefCell<BootstrapWorld> {
    RefCell::new(BootstrapWorld {
        loader: Box::new(TestConfigLoader::new()),
        reporter: Arc::new(RecordingHealthReporter::default()),
        outcome: None,
    })
}

#[given("a healthy configuration loader")]
fn given_healthy_loader(world: &RefCell<BootstrapWorld>) {
    world.borrow_mut().loader = Box::new(TestConfigLoader::new());
}

#[given("a failing configuration loader")]
fn given_failing_loader(world: &RefCell<BootstrapWorld>) {
    world.borrow_mut().loader = Box::new(FailingConfigLoader);
}

#[given("a configuration with the salt {salt}")]
fn given_salt(world: &RefCell<BootstrapWorld>, salt: String) {
    world.borrow_mut().loader =
        Box::new(TestConfigLoader::new().with_salt_hex(strip_quotes(&salt)));
}

#[when("the daemon bootstrap runs")]
fn when_bootstrap_runs(world: &RefCell<BootstrapWorld>) {
    let mut world = world.borrow_mut();
    let outcome = bootstrap_with(
        world.loader.as_ref(),
        world.reporter.clone(),
        Arc::new(MemoryStore::new()),
    );
    world.outcome = Some(outcome);
}

#[then("bootstrap succeeds")]
fn then_bootstrap_succeeds(world: &RefCell<BootstrapWorld>) {
    let world = world.borrow();
    let config = world.daemon().config();
    assert!(
        config
            .daemon_socket()
            .unix_path()
            .and_then(|path| path.parent())
            .is_some_and(|dir| dir.exists()),
        "socket directory should be prepared"
    );
    assert_eq!(world.daemon().telemetry().format(), LogFormat::Json);
}

#[then("the bootstrapped dispatcher answers a ping")]
fn then_dispatcher_answers(world: &RefCell<BootstrapWorld>) {
    let world = world.borrow();
    let line = request_line(names::PING, &json!({}));
    let response = world
        .daemon()
        .dispatcher()
        .dispatch(&mut Session::new(), &line);
    assert_eq!(response.into_result().expect("ping"), serde_json::Map::new());
}

#[then("bootstrap fails with a {stage} error")]
fn then_bootstrap_fails(world: &RefCell<BootstrapWorld>, stage: String) {
    let world = world.borrow();
    let error = world.error();
    let matched = match stage.as_str() {
        "configuration" => matches!(error, BootstrapError::Configuration { .. }),
        "key" => matches!(error, BootstrapError::Key { .. }),
        other => panic!("unknown bootstrap stage {other}"),
    };
    assert!(matched, "unexpected bootstrap error: {error:?}");
}

#[then("the reporter recorded bootstrap start")]
fn then_reporter_start(world: &RefCell<BootstrapWorld>) {
    let events = world.borrow().reporter.events();
    assert_eq!(events.first(), Some(&HealthEvent::BootstrapStarting));
}

#[then("the reporter recorded bootstrap success")]
fn then_reporter_success(world: &RefCell<BootstrapWorld>) {
    let events = world.borrow().reporter.events();
    assert!(
        events.contains(&HealthEvent::BootstrapSucceeded),
        "bootstrap success event missing: {events:?}"
    );
}

#[then("the reporter recorded {count} installed commands")]
fn then_reporter_catalog(world: &RefCell<BootstrapWorld>, count: usize) {
    let events = world.borrow().reporter.events();
    assert!(
        events.contains(&HealthEvent::CatalogInstalled(count)),
        "catalog event missing: {events:?}"
    );
}

#[then("the reporter recorded bootstrap failure")]
fn then_reporter_failure(world: &RefCell<BootstrapWorld>) {
    let events = world.borrow().reporter.events();
    let failed = events
        .iter()
        .any(|event| matches!(event, HealthEvent::BootstrapFailed(_)));
    assert!(failed, "bootstrap failure event missing: {events:?}");
    assert!(!events.contains(&HealthEvent::BootstrapSucceeded));
}

fn strip_quotes(value: &str) -> &str {
    value.trim_matches('"')
}

#[scenario(path = "tests/features/daemon_bootstrap.feature")]
fn daemon_bootstrap(#[from(world)] world: RefCell<BootstrapWorld>) {
    drop(world);
}
