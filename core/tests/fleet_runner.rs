use async_trait::async_trait;
use fleetcheck_core::{
    CancelToken, ConfigError, EndpointSpec, Expectation, FailureKind, FleetRunner, Host, Payload, Plan, Predicate,
    Probe, ProbeError, ProbeOutcome, ProbeSet, RequestDescriptor, Suite, TransportKind, Verdict,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
enum Behavior {
    Reply(ProbeOutcome),
    Refuse,
    Hang,
}

/// Answers by (host, path); unknown pairs are refused.
#[derive(Default)]
struct ScriptedProbe {
    script: HashMap<(String, String), Behavior>,
    delay: HashMap<String, Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedProbe {
    fn on(mut self, host: &str, path: &str, behavior: Behavior) -> Self {
        self.script.insert((host.to_string(), path.to_string()), behavior);
        self
    }

    fn slow(mut self, host: &str, delay: Duration) -> Self {
        self.delay.insert(host.to_string(), delay);
        self
    }
}

#[async_trait]
impl Probe for ScriptedProbe {
    async fn probe(&self, host: &Host, request: &RequestDescriptor) -> Result<ProbeOutcome, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if let Some(d) = self.delay.get(host.as_str()) {
            tokio::time::sleep(*d).await;
        }
        let behavior = self
            .script
            .get(&(host.to_string(), request.path.clone()))
            .cloned()
            .unwrap_or(Behavior::Refuse);
        let result = match behavior {
            Behavior::Reply(o) => Ok(o),
            Behavior::Refuse => Err(ProbeError::Connect { host: host.to_string(), cause: "connection refused".into() }),
            Behavior::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

const CORS_OPTIONS: [&str; 5] = [
    "Access-Control-Allow-Headers",
    "Access-Control-Allow-Methods",
    "Access-Control-Allow-Origin",
    "Access-Control-Max-Age",
    "X-Vega-Node-Id",
];

fn options_spec() -> EndpointSpec {
    let mut spec = EndpointSpec::new(
        "options /graphql",
        RequestDescriptor::new(TransportKind::HttpOptions, "graphql")
            .with_header("access-control-request-method", "POST"),
    )
    .expect(Expectation::status(204));
    for h in CORS_OPTIONS {
        spec = spec.expect(Expectation::header_once(h));
    }
    spec
}

fn stats_spec() -> EndpointSpec {
    EndpointSpec::new("statistics", RequestDescriptor::new(TransportKind::GrpcUnary, "/api.v1.CoreService/Statistics"))
        .expect(Expectation::field("statistics.chain_id", Predicate::contains("vega-mainnet")))
        .expect(Expectation::field("statistics.block_height", Predicate::greater_than(100.0)))
}

fn good_options() -> ProbeOutcome {
    CORS_OPTIONS
        .iter()
        .fold(ProbeOutcome::new(204), |o, h| o.with_header(h, "v"))
}

fn stats(height: u64) -> ProbeOutcome {
    ProbeOutcome::new(0).with_payload(Payload::Json(
        json!({"statistics": {"chain_id": "vega-mainnet-0011", "block_height": height}}),
    ))
}

fn hosts(names: &[&str]) -> Vec<Host> {
    names.iter().map(|h| Host::from(*h)).collect()
}

fn plan(host_names: &[&str]) -> Plan {
    Plan::new(vec![Suite::new("api", hosts(host_names), vec![options_spec(), stats_spec()])])
}

fn healthy(probe: ScriptedProbe, host: &str) -> ScriptedProbe {
    probe
        .on(host, "graphql", Behavior::Reply(good_options()))
        .on(host, "/api.v1.CoreService/Statistics", Behavior::Reply(stats(150)))
}

async fn run(probe: ScriptedProbe, plan: &Plan) -> (fleetcheck_core::Report, Arc<ScriptedProbe>) {
    let probe = Arc::new(probe);
    let runner = FleetRunner::new(probe.clone());
    let report = runner.run(plan, CancelToken::new()).await.unwrap();
    (report, probe)
}

fn failing<'a>(report: &'a fleetcheck_core::Report, host: &str) -> Vec<&'a str> {
    report
        .failures()
        .filter(|e| e.host.as_str() == host)
        .map(|e| e.expectation.as_str())
        .collect()
}

#[tokio::test]
async fn one_entry_per_host_spec_expectation_even_when_unreachable() {
    let probe = healthy(healthy(ScriptedProbe::default(), "api0"), "api2");
    let plan = plan(&["api0", "api1", "api2"]);
    let (report, _) = run(probe, &plan).await;

    assert_eq!(report.entries.len(), 3 * (6 + 2));
    assert_eq!(report.entries.len(), plan.expected_entries());
    assert!(!report.cancelled);

    let api1: Vec<_> = report.entries.iter().filter(|e| e.host.as_str() == "api1").collect();
    assert_eq!(api1.len(), 8);
    assert!(api1.iter().all(|e| e.verdict.failure_kind() == Some(FailureKind::Transport)));
    assert!(api1.iter().all(|e| e.detail().unwrap().contains("connection refused")));

    assert!(failing(&report, "api0").is_empty());
    assert!(failing(&report, "api2").is_empty());
    assert!(!report.is_passing());
}

#[tokio::test]
async fn missing_max_age_fails_only_that_check() {
    let mut outcome = ProbeOutcome::new(204);
    for h in CORS_OPTIONS.iter().filter(|h| **h != "Access-Control-Max-Age") {
        outcome = outcome.with_header(h, "v");
    }
    let probe = healthy(ScriptedProbe::default(), "api0").on("api0", "graphql", Behavior::Reply(outcome));
    let (report, _) = run(probe, &plan(&["api0"])).await;

    assert_eq!(report.entries.len(), 8);
    assert_eq!(failing(&report, "api0"), ["header access-control-max-age exactly once"]);
    let failure = report.failures().next().unwrap();
    assert_eq!(failure.verdict.failure_kind(), Some(FailureKind::Violation));
}

#[tokio::test]
async fn duplicated_node_id_is_a_failure() {
    let outcome = good_options().with_header("x-vega-node-id", "v");
    let probe = healthy(ScriptedProbe::default(), "api0").on("api0", "graphql", Behavior::Reply(outcome));
    let (report, _) = run(probe, &plan(&["api0"])).await;

    assert_eq!(failing(&report, "api0"), ["header x-vega-node-id exactly once"]);
    assert!(report.failures().next().unwrap().detail().unwrap().contains("2 times"));
}

#[tokio::test]
async fn block_height_threshold() {
    let probe = healthy(healthy(ScriptedProbe::default(), "api0"), "api1")
        .on("api0", "/api.v1.CoreService/Statistics", Behavior::Reply(stats(50)));
    let (report, _) = run(probe, &plan(&["api0", "api1"])).await;

    assert_eq!(failing(&report, "api0"), ["statistics.block_height > 100"]);
    assert!(failing(&report, "api1").is_empty());
}

#[tokio::test]
async fn websocket_height_must_match_request() {
    let spec = |height: &str| {
        EndpointSpec::new(
            format!("block {}", height),
            RequestDescriptor::new(TransportKind::WebsocketRoundtrip, format!("websocket#{}", height))
                .with_body(format!(r#"{{"method":"block","params":["{}"],"id":1}}"#, height)),
        )
        .expect(Expectation::field("result.block_id.hash", Predicate::NonEmpty))
        .expect(Expectation::field("result.block.header.height", Predicate::equals(height)))
    };
    let reply = |height: &str| {
        Behavior::Reply(ProbeOutcome::new(101).with_payload(Payload::Json(json!({
            "result": {"block_id": {"hash": "AB12"}, "block": {"header": {"height": height}}}
        }))))
    };
    let probe = ScriptedProbe::default()
        .on("be0", "websocket#20", reply("19"))
        .on("be0", "websocket#15", reply("15"));
    let plan = Plan::new(vec![Suite::new("be", hosts(&["be0"]), vec![spec("20"), spec("15")])]);
    let (report, _) = run(probe, &plan).await;

    let failures: Vec<_> = report.failures().map(|e| (e.endpoint.as_str(), e.expectation.as_str())).collect();
    assert_eq!(failures, [("block 20", "result.block.header.height equals \"20\"")]);
}

#[tokio::test]
async fn plain_websocket_must_be_rejected() {
    let spec = EndpointSpec::new(
        "plain ws refused",
        RequestDescriptor::new(TransportKind::WebsocketRoundtrip, "").insecure(),
    )
    .expect(Expectation::ConnectionRejected);
    let plan = Plan::new(vec![Suite::new("be", hosts(&["be0", "be1"]), vec![spec])]);
    let probe = ScriptedProbe::default().on("be1", "", Behavior::Reply(ProbeOutcome::new(101)));
    let (report, _) = run(probe, &plan).await;

    assert!(report.entries[0].verdict.is_pass());
    assert_eq!(report.entries[1].verdict.failure_kind(), Some(FailureKind::Violation));
}

#[tokio::test]
async fn order_follows_declaration_not_completion() {
    let probe = healthy(healthy(ScriptedProbe::default(), "api0"), "api1").slow("api0", Duration::from_millis(80));
    let (report, _) = run(probe, &plan(&["api0", "api1"])).await;

    let seen: Vec<(&str, &str)> = report.entries.iter().map(|e| (e.host.as_str(), e.endpoint.as_str())).collect();
    let mut expected = Vec::new();
    for h in ["api0", "api1"] {
        expected.extend(std::iter::repeat((h, "options /graphql")).take(6));
        expected.extend(std::iter::repeat((h, "statistics")).take(2));
    }
    assert_eq!(seen, expected);
}

#[tokio::test]
async fn repeated_runs_are_identical() {
    let make = || healthy(ScriptedProbe::default(), "api0").on("api1", "graphql", Behavior::Reply(ProbeOutcome::new(500)));
    let plan = plan(&["api0", "api1", "api2"]);
    let (first, _) = run(make(), &plan).await;
    let (second, _) = run(make(), &plan).await;
    assert_eq!(first.entries, second.entries);
    assert_eq!(first.summary(), second.summary());
}

#[tokio::test]
async fn in_flight_probes_are_bounded() {
    let names: Vec<String> = (0..8).map(|i| format!("api{}", i)).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let mut probe = ScriptedProbe::default();
    for h in &refs {
        probe = healthy(probe, h).slow(h, Duration::from_millis(20));
    }
    let mut plan = plan(&refs);
    plan.options.max_in_flight = 2;
    let (report, probe) = run(probe, &plan).await;

    assert!(report.is_passing());
    assert_eq!(probe.calls.load(Ordering::SeqCst), 16);
    assert!(probe.peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn deadline_cancels_and_keeps_completed_entries() {
    let probe = healthy(ScriptedProbe::default(), "api0")
        .on("api1", "graphql", Behavior::Hang)
        .on("api1", "/api.v1.CoreService/Statistics", Behavior::Hang);
    let mut plan = plan(&["api0", "api1"]);
    plan.options.deadline = Some(Duration::from_millis(150));

    let (report, _) = tokio::time::timeout(Duration::from_secs(5), run(probe, &plan)).await.unwrap();
    assert!(report.cancelled);
    assert_eq!(report.pairs_total, 4);
    assert_eq!(report.pairs_without_entries, 2);
    assert_eq!(report.entries.len(), 8);
    assert!(report.entries.iter().all(|e| e.host.as_str() == "api0" && e.verdict == Verdict::Pass));
    assert!(!report.is_passing());
}

#[tokio::test]
async fn external_cancel_stops_launching() {
    let probe = Arc::new(ScriptedProbe::default().on("api0", "graphql", Behavior::Hang));
    let runner = FleetRunner::new(probe.clone());
    let mut plan = plan(&["api0", "api1", "api2"]);
    plan.options.max_in_flight = 1;
    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });
    let report = tokio::time::timeout(Duration::from_secs(5), runner.run(&plan, cancel)).await.unwrap().unwrap();

    assert!(report.cancelled);
    assert!(report.entries.is_empty());
    assert_eq!(report.pairs_without_entries, 6);
    assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unsupported_transport_aborts_before_probing() {
    let scripted = Arc::new(healthy(ScriptedProbe::default(), "api0"));
    let set = ProbeSet::new().with_http(scripted.clone());
    let runner = FleetRunner::new(Arc::new(set));
    let err = runner.run(&plan(&["api0"]), CancelToken::new()).await.unwrap_err();

    assert!(matches!(err, ConfigError::UnsupportedTransport { transport: TransportKind::GrpcUnary, .. }));
    assert_eq!(scripted.calls.load(Ordering::SeqCst), 0);
}
