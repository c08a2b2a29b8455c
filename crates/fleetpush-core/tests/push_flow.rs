//! End-to-end engine behavior against scripted collaborators

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use fleetpush_core::{
    AbortDecider, DeployConfig, ErrorDecider, ErrorDecision, HostPlan, PushControl, PushEngine,
    PushError, PushRequest,
};
use fleetpush_exec::{ExecError, RemoteRunner};
use fleetpush_inventory::{HostSource, InventoryError};

// ----------------------------------------------------------------------
// Scripted collaborators
// ----------------------------------------------------------------------

type Responder = Box<dyn FnMut(&str, &[String]) -> Result<String, ExecError> + Send>;

/// Runner that records every dispatched command and answers from a script
struct ScriptedRunner {
    log: Arc<Mutex<Vec<String>>>,
    respond: Responder,
}

impl ScriptedRunner {
    fn ok(log: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            log,
            respond: Box::new(|_, _| Ok("ok\n".to_string())),
        }
    }

    fn with(log: Arc<Mutex<Vec<String>>>, respond: Responder) -> Self {
        Self { log, respond }
    }
}

#[async_trait]
impl RemoteRunner for ScriptedRunner {
    async fn run(
        &mut self,
        host: &str,
        binary: &str,
        args: &[String],
        _quiet: bool,
    ) -> Result<String, ExecError> {
        self.log
            .lock()
            .unwrap()
            .push(format!("{host}: {binary} {}", args.join(" ")));
        (self.respond)(host, args)
    }

    async fn shutdown(&mut self) {
        self.log.lock().unwrap().push("shutdown".to_string());
    }
}

/// Inventory with a configurable set of hosts known to be gone
struct TestSource {
    dead: HashSet<String>,
    shutdowns: Arc<AtomicUsize>,
}

impl TestSource {
    fn alive(shutdowns: Arc<AtomicUsize>) -> Self {
        Self {
            dead: HashSet::new(),
            shutdowns,
        }
    }

    fn with_dead(dead: &[&str], shutdowns: Arc<AtomicUsize>) -> Self {
        Self {
            dead: dead.iter().map(ToString::to_string).collect(),
            shutdowns,
        }
    }
}

#[async_trait]
impl HostSource for TestSource {
    async fn get_all_hosts(&self) -> Result<Vec<String>, InventoryError> {
        Ok(Vec::new())
    }

    async fn should_host_be_alive(&self, host: &str) -> bool {
        !self.dead.contains(host)
    }

    async fn shut_down(&mut self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

/// Decider that records its invocations and answers from a queue
struct ScriptedDecider {
    asked: Arc<Mutex<Vec<String>>>,
    answers: Mutex<VecDeque<ErrorDecision>>,
}

impl ScriptedDecider {
    fn new(asked: Arc<Mutex<Vec<String>>>, answers: &[ErrorDecision]) -> Self {
        Self {
            asked,
            answers: Mutex::new(answers.iter().copied().collect()),
        }
    }
}

#[async_trait]
impl ErrorDecider for ScriptedDecider {
    async fn decide(&self, host: &str, _error: &PushError) -> ErrorDecision {
        self.asked.lock().unwrap().push(host.to_string());
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ErrorDecision::Abort)
    }
}

/// Decider that cancels the push out-of-band and then asks for a retry
struct CancellingDecider {
    control: PushControl,
}

#[async_trait]
impl ErrorDecider for CancellingDecider {
    async fn decide(&self, _host: &str, _error: &PushError) -> ErrorDecision {
        self.control.cancel("\"x\" pressed");
        ErrorDecision::Retry
    }
}

// ----------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------

fn deploy_config() -> DeployConfig {
    DeployConfig {
        build_host: "build-01".to_string(),
        deploy_binary: "deploy-tool".to_string(),
        build_binary: "build-tool".to_string(),
        default_ref: "origin/master".to_string(),
        static_repo: "public".to_string(),
    }
}

fn plan_of(hosts: &[&str]) -> HostPlan {
    HostPlan {
        hosts: hosts.iter().map(ToString::to_string).collect(),
        start_at: None,
        stop_before: None,
    }
}

/// Request that runs a single observable command per host
fn restart_request() -> PushRequest {
    PushRequest {
        deploy_commands: vec![vec!["restart".to_string(), "all".to_string()]],
        ..PushRequest::default()
    }
}

fn record_events(engine: &mut PushEngine) -> Arc<Mutex<Vec<String>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    engine.events_mut().subscribe_all(move |payload| {
        let mut line = format!("{}:{:?}", payload.phase, payload.stage);
        if let Some(host) = payload.host {
            line.push_str(&format!(":{host}"));
        }
        sink.lock().unwrap().push(line);
    });
    seen
}

fn remote_failure() -> ExecError {
    ExecError::RemoteExit { code: 1 }
}

// ----------------------------------------------------------------------
// Phase sequencing
// ----------------------------------------------------------------------

#[tokio::test]
async fn full_push_runs_phases_then_hosts_in_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let shutdowns = Arc::new(AtomicUsize::new(0));

    let responder: Responder = Box::new(|_, args| {
        if args.first().is_some_and(|cmd| cmd == "get-revision") {
            Ok("abc123\n".to_string())
        } else {
            Ok(String::new())
        }
    });

    let request = PushRequest {
        fetches: vec!["private".to_string()],
        deploys: vec!["public".to_string()],
        build_static: true,
        ..PushRequest::default()
    };

    let engine = PushEngine::new(
        deploy_config(),
        request,
        plan_of(&["h1", "h2"]),
        Box::new(ScriptedRunner::with(log.clone(), responder)),
        Box::new(TestSource::alive(shutdowns.clone())),
    );

    engine.run().await.unwrap();

    let log = log.lock().unwrap();
    assert_eq!(
        log.as_slice(),
        [
            "build-01: build-tool synchronize private",
            "build-01: deploy-tool fetch private",
            "build-01: build-tool get-revision public origin/master",
            "build-01: deploy-tool deploy public abc123",
            // "public" is the static repo, so no probe is needed
            "build-01: build-tool build-static",
            "h1: deploy-tool fetch private",
            "h1: deploy-tool deploy public abc123",
            "h1: deploy-tool fetch-names",
            "h2: deploy-tool fetch private",
            "h2: deploy-tool deploy public abc123",
            "h2: deploy-tool fetch-names",
            "shutdown",
        ]
    );
    assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn lifecycle_events_bracket_every_phase() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let shutdowns = Arc::new(AtomicUsize::new(0));

    let request = PushRequest {
        deploys: vec!["private".to_string()],
        ..PushRequest::default()
    };

    let mut engine = PushEngine::new(
        deploy_config(),
        request,
        plan_of(&["h1"]),
        Box::new(ScriptedRunner::ok(log)),
        Box::new(TestSource::alive(shutdowns)),
    );
    let events = record_events(&mut engine);

    engine.run().await.unwrap();

    assert_eq!(
        events.lock().unwrap().as_slice(),
        [
            "push:Began",
            "resolve_refs:Began",
            "resolve_refs:Ended",
            "deploy_to_build_host:Began",
            "deploy_to_build_host:Ended",
            "process_host:Began:h1",
            "process_host:Ended:h1",
            "push:Ended",
        ]
    );
}

// ----------------------------------------------------------------------
// Static build policy
// ----------------------------------------------------------------------

#[tokio::test]
async fn failed_static_probe_counts_as_no_build() {
    // documented policy choice: a probe that errors means "no static
    // build needed", it does not abort the push
    let log = Arc::new(Mutex::new(Vec::new()));
    let shutdowns = Arc::new(AtomicUsize::new(0));

    let responder: Responder = Box::new(|_, args| match args.first().map(String::as_str) {
        Some("needs-static-build") => Err(ExecError::RemoteExit { code: 2 }),
        Some("get-revision") => Ok("abc123\n".to_string()),
        _ => Ok(String::new()),
    });

    let request = PushRequest {
        deploys: vec!["private".to_string()],
        build_static: true,
        ..PushRequest::default()
    };

    let engine = PushEngine::new(
        deploy_config(),
        request,
        plan_of(&["h1"]),
        Box::new(ScriptedRunner::with(log.clone(), responder)),
        Box::new(TestSource::alive(shutdowns)),
    );

    engine.run().await.unwrap();

    let log = log.lock().unwrap();
    assert!(log.iter().any(|line| line.contains("needs-static-build")));
    assert!(!log.iter().any(|line| line.contains("build-static ")));
    assert!(!log.iter().any(|line| line.contains("fetch-names")));
}

#[tokio::test]
async fn successful_probe_builds_static_and_appends_fetch_names() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let shutdowns = Arc::new(AtomicUsize::new(0));

    let responder: Responder = Box::new(|_, args| {
        if args.first().is_some_and(|cmd| cmd == "get-revision") {
            Ok("abc123\n".to_string())
        } else {
            Ok(String::new())
        }
    });

    let request = PushRequest {
        deploys: vec!["private".to_string()],
        build_static: true,
        ..PushRequest::default()
    };

    let engine = PushEngine::new(
        deploy_config(),
        request,
        plan_of(&["h1"]),
        Box::new(ScriptedRunner::with(log.clone(), responder)),
        Box::new(TestSource::alive(shutdowns)),
    );

    engine.run().await.unwrap();

    let log = log.lock().unwrap();
    assert!(log.contains(&"build-01: build-tool build-static".to_string()));
    assert!(log.contains(&"h1: deploy-tool fetch-names".to_string()));
}

// ----------------------------------------------------------------------
// Failure recovery
// ----------------------------------------------------------------------

/// Responder that fails `restart` on the given host a limited number of times
fn failing_restart(host: &'static str, mut times: usize) -> Responder {
    Box::new(move |target, args| {
        if target == host && args.first().is_some_and(|cmd| cmd == "restart") && times > 0 {
            times -= 1;
            Err(remote_failure())
        } else {
            Ok(String::new())
        }
    })
}

#[tokio::test]
async fn dead_host_is_skipped_without_consulting_the_decider() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let asked = Arc::new(Mutex::new(Vec::new()));
    let shutdowns = Arc::new(AtomicUsize::new(0));

    let engine = PushEngine::new(
        deploy_config(),
        restart_request(),
        plan_of(&["h1", "h2"]),
        Box::new(ScriptedRunner::with(log.clone(), failing_restart("h1", 1))),
        Box::new(TestSource::with_dead(&["h1"], shutdowns)),
    )
    .with_decider(Box::new(ScriptedDecider::new(asked.clone(), &[])));

    engine.run().await.unwrap();

    assert!(asked.lock().unwrap().is_empty());
    assert!(
        log.lock()
            .unwrap()
            .contains(&"h2: deploy-tool restart all".to_string())
    );
}

#[tokio::test]
async fn retry_reattempts_the_same_host() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let asked = Arc::new(Mutex::new(Vec::new()));
    let shutdowns = Arc::new(AtomicUsize::new(0));

    let mut engine = PushEngine::new(
        deploy_config(),
        restart_request(),
        plan_of(&["h1", "h2"]),
        Box::new(ScriptedRunner::with(log.clone(), failing_restart("h1", 1))),
        Box::new(TestSource::alive(shutdowns)),
    )
    .with_decider(Box::new(ScriptedDecider::new(
        asked.clone(),
        &[ErrorDecision::Retry],
    )));
    let events = record_events(&mut engine);

    engine.run().await.unwrap();

    assert_eq!(asked.lock().unwrap().as_slice(), ["h1"]);

    let events = events.lock().unwrap();
    let h1_begins = events
        .iter()
        .filter(|line| *line == "process_host:Began:h1")
        .count();
    assert_eq!(h1_begins, 2);
    assert!(events.contains(&"process_host:Ended:h2".to_string()));
}

#[tokio::test]
async fn continue_moves_on_to_the_next_host() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let asked = Arc::new(Mutex::new(Vec::new()));
    let shutdowns = Arc::new(AtomicUsize::new(0));

    let engine = PushEngine::new(
        deploy_config(),
        restart_request(),
        plan_of(&["h1", "h2"]),
        Box::new(ScriptedRunner::with(log.clone(), failing_restart("h1", 9))),
        Box::new(TestSource::alive(shutdowns)),
    )
    .with_decider(Box::new(ScriptedDecider::new(
        asked.clone(),
        &[ErrorDecision::Continue],
    )));

    engine.run().await.unwrap();

    assert_eq!(asked.lock().unwrap().as_slice(), ["h1"]);
    assert!(
        log.lock()
            .unwrap()
            .contains(&"h2: deploy-tool restart all".to_string())
    );
}

#[tokio::test]
async fn default_policy_aborts_and_still_tears_down() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let shutdowns = Arc::new(AtomicUsize::new(0));

    let mut engine = PushEngine::new(
        deploy_config(),
        restart_request(),
        plan_of(&["h1", "h2"]),
        Box::new(ScriptedRunner::with(log.clone(), failing_restart("h1", 1))),
        Box::new(TestSource::alive(shutdowns.clone())),
    )
    .with_decider(Box::new(AbortDecider));
    let events = record_events(&mut engine);

    let err = engine.run().await.unwrap_err();
    assert!(matches!(err, PushError::Remote(_)));

    let log = log.lock().unwrap();
    assert!(!log.iter().any(|line| line.starts_with("h2:")));
    assert_eq!(log.last().map(String::as_str), Some("shutdown"));
    assert_eq!(shutdowns.load(Ordering::SeqCst), 1);

    let events = events.lock().unwrap();
    assert!(events.contains(&"process_host:Aborted:h1".to_string()));
    assert_eq!(events.last().map(String::as_str), Some("push:Aborted"));
}

#[tokio::test]
async fn phase_level_failures_terminate_the_run() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let asked = Arc::new(Mutex::new(Vec::new()));
    let shutdowns = Arc::new(AtomicUsize::new(0));

    let responder: Responder = Box::new(|_, args| {
        if args.first().is_some_and(|cmd| cmd == "synchronize") {
            Err(remote_failure())
        } else {
            Ok(String::new())
        }
    });

    let request = PushRequest {
        fetches: vec!["private".to_string()],
        ..PushRequest::default()
    };

    let engine = PushEngine::new(
        deploy_config(),
        request,
        plan_of(&["h1"]),
        Box::new(ScriptedRunner::with(log.clone(), responder)),
        Box::new(TestSource::alive(shutdowns)),
    )
    .with_decider(Box::new(ScriptedDecider::new(asked.clone(), &[])));

    let err = engine.run().await.unwrap_err();
    assert!(matches!(err, PushError::Remote(_)));
    // the per-host recovery protocol never saw the phase failure
    assert!(asked.lock().unwrap().is_empty());
    assert!(!log.lock().unwrap().iter().any(|line| line.starts_with("h1:")));
}

// ----------------------------------------------------------------------
// Markers and skipping
// ----------------------------------------------------------------------

fn processed_hosts(log: &[String]) -> Vec<String> {
    log.iter()
        .filter_map(|line| line.split(": ").next())
        .filter(|host| host.starts_with('h'))
        .map(ToString::to_string)
        .collect()
}

async fn run_with_markers(
    hosts: &[&str],
    start_at: Option<&str>,
    stop_before: Option<&str>,
) -> Vec<String> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let shutdowns = Arc::new(AtomicUsize::new(0));

    let plan = HostPlan {
        hosts: hosts.iter().map(ToString::to_string).collect(),
        start_at: start_at.map(ToString::to_string),
        stop_before: stop_before.map(ToString::to_string),
    };

    let engine = PushEngine::new(
        deploy_config(),
        restart_request(),
        plan,
        Box::new(ScriptedRunner::ok(log.clone())),
        Box::new(TestSource::alive(shutdowns)),
    );
    engine.run().await.unwrap();

    let log = log.lock().unwrap();
    processed_hosts(&log)
}

#[tokio::test]
async fn start_at_skips_until_the_marker() {
    let processed = run_with_markers(&["h1", "h2", "h3", "h4"], Some("h3"), None).await;
    assert_eq!(processed, vec!["h3", "h4"]);
}

#[tokio::test]
async fn stop_before_halts_at_the_marker() {
    let processed = run_with_markers(&["h1", "h2", "h3", "h4"], None, Some("h3")).await;
    assert_eq!(processed, vec!["h1", "h2"]);
}

#[tokio::test]
async fn both_markers_bound_the_window() {
    let processed = run_with_markers(&["h1", "h2", "h3", "h4"], Some("h1"), Some("h4")).await;
    assert_eq!(processed, vec!["h1", "h2", "h3"]);
}

#[tokio::test]
async fn skip_request_drops_exactly_one_host() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let shutdowns = Arc::new(AtomicUsize::new(0));

    let engine = PushEngine::new(
        deploy_config(),
        restart_request(),
        plan_of(&["h1", "h2", "h3"]),
        Box::new(ScriptedRunner::ok(log.clone())),
        Box::new(TestSource::alive(shutdowns)),
    );
    engine.control().skip_next_host();

    engine.run().await.unwrap();

    let log = log.lock().unwrap();
    assert_eq!(processed_hosts(&log), vec!["h2", "h3"]);
}

// ----------------------------------------------------------------------
// Cancellation
// ----------------------------------------------------------------------

#[tokio::test]
async fn pending_cancellation_stops_the_push_before_any_command() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let shutdowns = Arc::new(AtomicUsize::new(0));

    let mut engine = PushEngine::new(
        deploy_config(),
        restart_request(),
        plan_of(&["h1"]),
        Box::new(ScriptedRunner::ok(log.clone())),
        Box::new(TestSource::alive(shutdowns.clone())),
    );
    let events = record_events(&mut engine);
    engine.control().cancel("received SIGINT");

    let err = engine.run().await.unwrap_err();
    assert!(matches!(err, PushError::Cancelled { reason } if reason == "received SIGINT"));

    let log = log.lock().unwrap();
    assert_eq!(log.as_slice(), ["shutdown"]);
    assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
    assert_eq!(
        events.lock().unwrap().last().map(String::as_str),
        Some("push:Aborted")
    );
}

#[tokio::test]
async fn cancellation_wins_over_a_retry_decision() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let shutdowns = Arc::new(AtomicUsize::new(0));

    let mut engine = PushEngine::new(
        deploy_config(),
        restart_request(),
        plan_of(&["h1", "h2"]),
        Box::new(ScriptedRunner::with(log.clone(), failing_restart("h1", 9))),
        Box::new(TestSource::alive(shutdowns)),
    );
    let control = engine.control();
    engine = engine.with_decider(Box::new(CancellingDecider { control }));

    let err = engine.run().await.unwrap_err();
    assert!(matches!(err, PushError::Cancelled { reason } if reason == "\"x\" pressed"));

    // no second attempt on h1, no h2 at all
    let log = log.lock().unwrap();
    let h1_attempts = log
        .iter()
        .filter(|line| line.starts_with("h1:"))
        .count();
    assert_eq!(h1_attempts, 1);
    assert!(!log.iter().any(|line| line.starts_with("h2:")));
}
