use std::sync::Arc;

use cucumber::{given, then, when, World};
use probe_dispatch::*;
use serde_json::json;
use uuid::Uuid;
use vigil_core::MemoryStore;

#[derive(Debug, World)]
#[world(init = Self::new)]
struct DispatchWorld {
    store: Arc<MemoryStore>,
    gateway: Option<IngestGateway>,
    last_submission: Option<WireSubmission>,
    outcome: Option<Result<()>>,
}

impl DispatchWorld {
    fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            gateway: None,
            last_submission: None,
            outcome: None,
        }
    }

    fn gateway(&self) -> &IngestGateway {
        self.gateway.as_ref().expect("gateway should be configured")
    }
}

#[given("a registry with the built-in handlers")]
async fn given_registry(world: &mut DispatchWorld) {
    let registry = Registry::with_default_handlers(world.store.clone());
    world.gateway = Some(IngestGateway::new(Arc::new(registry)));
}

#[when(expr = "an agent submits a {string} result with target {string}")]
async fn when_agent_submits(world: &mut DispatchWorld, kind: String, target: String) {
    let wire: WireSubmission = serde_json::from_value(json!({
        "probeId": Uuid::new_v4(),
        "originalAgentId": Uuid::new_v4(),
        "type": kind,
        "target": target,
        "payload": {
            "packetsSent": 10,
            "packetsReceived": 9,
            "packetLoss": 10.0,
            "minRtt": 4.2,
            "avgRtt": 5.0,
            "maxRtt": 7.9,
            "startTimestamp": "2026-03-01T10:00:00Z",
            "stopTimestamp": "2026-03-01T10:00:10Z",
        },
    }))
    .expect("wire submission should parse");

    world.last_submission = Some(wire.clone());
    world.outcome = Some(world.gateway().submit(wire).await);
}

#[when("the agent retries the same submission")]
async fn when_agent_retries(world: &mut DispatchWorld) {
    let wire = world
        .last_submission
        .clone()
        .expect("a submission should have been sent");
    world.outcome = Some(world.gateway().submit(wire).await);
}

#[then("the submission is accepted")]
async fn then_accepted(world: &mut DispatchWorld) {
    let outcome = world.outcome.as_ref().expect("no submission was made");
    assert!(outcome.is_ok(), "unexpected failure: {outcome:?}");
}

#[then("the submission is rejected as undispatchable")]
async fn then_rejected(world: &mut DispatchWorld) {
    let outcome = world.outcome.as_ref().expect("no submission was made");
    assert!(matches!(outcome, Err(err) if err.is_dispatch()));
}

#[then(expr = "{int} result rows of kind {string} are stored")]
async fn then_rows_stored(world: &mut DispatchWorld, expected: usize, kind: String) {
    let rows = world
        .store
        .probe_results()
        .into_iter()
        .filter(|row| row.kind.as_str() == kind)
        .count();
    assert_eq!(rows, expected);
}

#[tokio::main]
async fn main() {
    DispatchWorld::run("tests/features/dispatch.feature").await;
}
