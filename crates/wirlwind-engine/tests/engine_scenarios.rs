//! End-to-end poll cycles against a scripted transport and a canned
//! TextFSM engine stand-in.

use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use wirlwind_collections::CollectionRegistry;
use wirlwind_common::{
    ConnectionState, DeviceTarget, ParserKind, Row, TelemetryEvent, UpdateEvent,
};
use wirlwind_engine::{
    CommandChannel, EngineOptions, PollEngine, StateStore, Transport, TransportError,
};
use wirlwind_parse::{EngineSet, ParserChain, TemplateEngine, TemplateResolver, TraceStore};

const CPU_COMMAND: &str = "show processes cpu sorted";

const CPU_OUTPUT: &str = "\
show processes cpu sorted
CPU utilization for five seconds: 13%/2%; one minute: 11%; five minutes: 10%
 PID  Runtime(ms)     Invoked      uSecs   5Sec   1Min   5Min TTY Process
   1          384       32789         11  0.00%  0.00%  0.00%   0 Chunk Manager
 112        45612      823401         55  4.15%  3.90%  3.80%   0 IP Input
router1#";

/// TextFSM stand-in: recognizes the canned CPU fixture and emits NTC-style
/// uppercase rows; anything else parses to zero rows.
struct ScriptedTextFsm;

impl TemplateEngine for ScriptedTextFsm {
    fn parse(&self, template_source: &str, input: &str) -> Result<Vec<Row>, String> {
        if template_source.contains("broken") {
            return Err("template syntax error: unbalanced group".to_string());
        }
        if !input.contains("CPU utilization") {
            return Ok(Vec::new());
        }
        let header = json!({
            "CPU_USAGE_5_SEC": "13", "CPU_USAGE_1_MIN": "11", "CPU_USAGE_5_MIN": "10",
            "PROCESS_PID": "1", "PROCESS_NAME": "Chunk Manager",
            "PROCESS_CPU_USAGE_5_SEC": "0.00",
        });
        let busy = json!({
            "CPU_USAGE_5_SEC": "13", "CPU_USAGE_1_MIN": "11", "CPU_USAGE_5_MIN": "10",
            "PROCESS_PID": "112", "PROCESS_NAME": "IP Input",
            "PROCESS_CPU_USAGE_5_SEC": "4.15", "PROCESS_CPU_USAGE_1_MIN": "3.90",
        });
        Ok(vec![
            header.as_object().cloned().unwrap(),
            busy.as_object().cloned().unwrap(),
        ])
    }
}

// ── Scripted transport ──

#[derive(Default)]
struct Script {
    /// Per-command response queues. A queue's last entry repeats forever.
    responses: HashMap<String, VecDeque<String>>,
    /// Commands that fail with an I/O error before any response.
    fail_next: u32,
    commands: Vec<String>,
    connects: u32,
}

impl Script {
    fn respond(&mut self, command: &str) -> Result<String, TransportError> {
        self.commands.push(command.to_string());
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Err(TransportError::Io("connection reset by peer".into()));
        }
        let Some(queue) = self.responses.get_mut(command) else {
            return Ok(String::new());
        };
        if queue.len() > 1 {
            Ok(queue.pop_front().unwrap_or_default())
        } else {
            Ok(queue.front().cloned().unwrap_or_default())
        }
    }
}

#[derive(Clone)]
struct MockTransport(Arc<Mutex<Script>>);

struct MockChannel(Arc<Mutex<Script>>);

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, _target: &DeviceTarget) -> Result<Box<dyn CommandChannel>, TransportError> {
        self.0.lock().unwrap().connects += 1;
        Ok(Box::new(MockChannel(Arc::clone(&self.0))))
    }
}

#[async_trait]
impl CommandChannel for MockChannel {
    async fn execute(&mut self, command: &str) -> Result<String, TransportError> {
        self.0.lock().unwrap().respond(command)
    }

    fn prompt(&self) -> Option<&str> {
        Some("router1#")
    }

    async fn close(&mut self) {}
}

// ── Harness ──

struct Harness {
    engine: Option<PollEngine>,
    store: Arc<StateStore>,
    traces: Arc<TraceStore>,
    script: Arc<Mutex<Script>>,
}

fn write_tree(root: &Path, files: &[(&str, &str)]) {
    for (rel, body) in files {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }
}

fn harness(root: &Path, vendor: &str, responses: &[(&str, &[&str])]) -> Harness {
    let collections = CollectionRegistry::load(&root.join("collections"), vendor).unwrap();
    let driver = wirlwind_drivers::DriverRegistry::with_builtins()
        .unwrap()
        .get(vendor);
    let resolver = TemplateResolver::new(vec![root.join("templates/textfsm")], vec![]);
    let chain = ParserChain::new(
        resolver,
        EngineSet::new().with_textfsm(Arc::new(ScriptedTextFsm)),
    );
    let store = Arc::new(StateStore::new());
    let traces = Arc::new(TraceStore::default());

    let target = DeviceTarget {
        host: "10.0.0.1".into(),
        port: 22,
        vendor: vendor.into(),
        display_name: None,
    };
    let engine = PollEngine::new(
        target,
        collections,
        driver,
        chain,
        Arc::clone(&store),
        Arc::clone(&traces),
    )
    .with_options(EngineOptions {
        command_timeout: std::time::Duration::from_secs(15),
        failure_threshold: 3,
        backoff_base: std::time::Duration::from_secs(3),
        backoff_cap: std::time::Duration::from_secs(60),
    });

    let mut script = Script::default();
    for (command, outputs) in responses {
        script.responses.insert(
            command.to_string(),
            outputs.iter().map(|s| s.to_string()).collect(),
        );
    }

    Harness {
        engine: Some(engine),
        store,
        traces,
        script: Arc::new(Mutex::new(script)),
    }
}

impl Harness {
    /// Spawn the engine; returns the shutdown sender and the join handle.
    fn start(
        &mut self,
    ) -> (
        watch::Sender<bool>,
        tokio::task::JoinHandle<Result<(), wirlwind_engine::EngineError>>,
    ) {
        let (tx, rx) = watch::channel(false);
        let transport = MockTransport(Arc::clone(&self.script));
        let engine = self.engine.take().expect("engine already started");
        let handle = tokio::spawn(async move { engine.run(&transport, rx).await });
        (tx, handle)
    }
}

async fn next_update(rx: &mut tokio::sync::mpsc::Receiver<TelemetryEvent>) -> UpdateEvent {
    loop {
        match rx.recv().await.expect("event stream ended") {
            TelemetryEvent::Update(update) => return update,
            TelemetryEvent::Connection(_) => continue,
        }
    }
}

const CPU_YAML: &str = "\
command: show processes cpu sorted
interval: 30
parsers:
  - type: textfsm
    templates:
      - cisco_ios_show_processes_cpu.textfsm
normalize:
  five_sec_total: cpu_usage_5_sec
  one_min: cpu_usage_1_min
  five_min: cpu_usage_5_min
";

const CPU_SCHEMA: &str = "\
fields:
  five_sec_total: { type: float }
  one_min: { type: float }
  five_min: { type: float }
";

// ── Scenarios ──

#[tokio::test(start_paused = true)]
async fn cisco_cpu_success_publishes_contract_envelope() {
    let dir = tempfile::tempdir().unwrap();
    write_tree(
        dir.path(),
        &[
            ("collections/cpu/cisco_ios.yaml", CPU_YAML),
            ("collections/cpu/_schema.yaml", CPU_SCHEMA),
            ("templates/textfsm/cisco_ios_show_processes_cpu.textfsm", "cpu template"),
        ],
    );
    let mut h = harness(dir.path(), "cisco_ios_xe", &[(CPU_COMMAND, &[CPU_OUTPUT])]);
    let mut rx = h.store.subscribe("test", 16);
    let (shutdown, handle) = h.start();

    let update = next_update(&mut rx).await;
    assert_eq!(update.collection, "cpu");
    assert_eq!(update.sequence, 1);
    assert_eq!(update.parsed_by, ParserKind::Textfsm);
    assert_eq!(
        update.template.as_deref(),
        Some("cisco_ios_show_processes_cpu.textfsm")
    );
    assert_eq!(update.envelope["five_sec_total"], json!(13.0));
    assert_eq!(update.envelope["one_min"], json!(11.0));
    assert_eq!(update.envelope["five_min"], json!(10.0));

    // Drop-zero filter: only IP Input survives, with lowercase keys and
    // dashboard aliases.
    let processes = update.envelope["processes"].as_array().unwrap();
    assert_eq!(processes.len(), 1);
    assert_eq!(processes[0]["name"], "IP Input");
    assert_eq!(processes[0]["pid"], "112");
    assert_eq!(processes[0]["cpu_pct"], json!(4.15));

    // The collection's vendor file resolved through the one-step fallback.
    shutdown.send(true).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn template_fallback_wins_with_second_template() {
    let dir = tempfile::tempdir().unwrap();
    let cpu_yaml = "\
command: show processes cpu sorted
interval: 30
parsers:
  - type: textfsm
    templates:
      - my_fixed_cpu.textfsm
      - cisco_ios_show_processes_cpu.textfsm
";
    write_tree(
        dir.path(),
        &[
            ("collections/cpu/cisco_ios.yaml", cpu_yaml),
            ("templates/textfsm/my_fixed_cpu.textfsm", "broken template"),
            ("templates/textfsm/cisco_ios_show_processes_cpu.textfsm", "cpu template"),
        ],
    );
    let mut h = harness(dir.path(), "cisco_ios", &[(CPU_COMMAND, &[CPU_OUTPUT])]);
    let mut rx = h.store.subscribe("test", 16);
    let (shutdown, handle) = h.start();

    let update = next_update(&mut rx).await;
    assert_eq!(update.parsed_by, ParserKind::Textfsm);
    assert_eq!(
        update.template.as_deref(),
        Some("cisco_ios_show_processes_cpu.textfsm")
    );
    assert!(update.error.is_none());

    // Both attempts in one trace, with distinct reasons.
    let recent = h.traces.recent("cpu", 1);
    assert_eq!(recent.len(), 1);
    let reasons: Vec<String> = recent[0]
        .steps
        .iter()
        .filter_map(|s| match s {
            wirlwind_parse::trace::TraceStep::Parse {
                reason: Some(r), ..
            } => Some(r.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(reasons.len(), 1);
    assert!(reasons[0].contains("template syntax error"));

    shutdown.send(true).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn all_parsers_failed_publishes_error_and_retains_prior_good() {
    let dir = tempfile::tempdir().unwrap();
    write_tree(
        dir.path(),
        &[
            ("collections/cpu/cisco_ios.yaml", CPU_YAML),
            ("templates/textfsm/cisco_ios_show_processes_cpu.textfsm", "cpu template"),
        ],
    );
    let mut h = harness(
        dir.path(),
        "cisco_ios",
        &[(CPU_COMMAND, &[CPU_OUTPUT, "%Invalid input detected\nrouter1#"])],
    );
    let mut rx = h.store.subscribe("test", 16);
    let (shutdown, handle) = h.start();

    let good = next_update(&mut rx).await;
    assert!(good.error.is_none());

    let bad = next_update(&mut rx).await;
    assert_eq!(bad.sequence, 2);
    assert_eq!(bad.parsed_by, ParserKind::None);
    let error = bad.error.as_deref().unwrap();
    assert!(error.starts_with("AllParsersFailed:"), "got: {error}");
    assert_eq!(bad.envelope["_collection"], "cpu");
    assert!(bad.envelope["error"]
        .as_str()
        .unwrap()
        .starts_with("AllParsersFailed:"));

    // Prior good envelope still readable next to the error marker.
    assert_eq!(h.store.get("cpu").unwrap()["five_sec_total"], json!(13.0));
    assert!(h.store.get_error("cpu").is_some());

    // Exactly one trace per cycle (two cycles so far).
    assert_eq!(h.traces.recent("cpu", 10).len(), 2);

    shutdown.send(true).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn one_shot_collection_runs_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let device_info_yaml = "\
command: show version
interval: 0
parsers:
  - type: regex
    pattern: 'Version (?P<version>\\S+)'
";
    write_tree(
        dir.path(),
        &[
            ("collections/cpu/cisco_ios.yaml", CPU_YAML),
            ("collections/device_info/cisco_ios.yaml", device_info_yaml),
            ("templates/textfsm/cisco_ios_show_processes_cpu.textfsm", "cpu template"),
        ],
    );
    let mut h = harness(
        dir.path(),
        "cisco_ios",
        &[
            (CPU_COMMAND, &[CPU_OUTPUT]),
            ("show version", &["Cisco IOS XE, Version 17.3.4a\nrouter1#"]),
        ],
    );
    let mut rx = h.store.subscribe("test", 64);
    let (shutdown, handle) = h.start();

    // One-shots run first, in definition order: cpu sorts before
    // device_info but only device_info is one-shot.
    let first = next_update(&mut rx).await;
    assert_eq!(first.collection, "device_info");
    assert_eq!(first.envelope["version"], "17.3.4a");

    // Let several cpu cycles elapse; device_info must not fire again.
    let mut cpu_updates = 0;
    while cpu_updates < 3 {
        let update = next_update(&mut rx).await;
        assert_eq!(update.collection, "cpu");
        cpu_updates += 1;
    }
    assert_eq!(h.store.sequence("device_info"), 1);

    shutdown.send(true).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn reconnect_backs_off_and_reissues_pagination() {
    let dir = tempfile::tempdir().unwrap();
    write_tree(
        dir.path(),
        &[
            ("collections/cpu/cisco_ios.yaml", CPU_YAML),
            ("templates/textfsm/cisco_ios_show_processes_cpu.textfsm", "cpu template"),
        ],
    );
    let mut h = harness(dir.path(), "cisco_ios", &[(CPU_COMMAND, &[CPU_OUTPUT])]);
    let mut rx = h.store.subscribe("test", 64);

    // First poll succeeds, then the channel dies for three cycles.
    h.script.lock().unwrap().fail_next = 0;
    let (shutdown, handle) = h.start();
    let first = next_update(&mut rx).await;
    assert!(first.error.is_none());
    h.script.lock().unwrap().fail_next = 3;

    // Watch the connection-state transitions.
    let mut states = Vec::new();
    loop {
        match rx.recv().await.unwrap() {
            TelemetryEvent::Connection(c) => {
                states.push((c.state, c.attempt));
                if c.state == ConnectionState::Connected {
                    break;
                }
            }
            TelemetryEvent::Update(_) => {}
        }
    }
    assert_eq!(states[0].0, ConnectionState::Reconnecting);
    assert_eq!(states[0].1, Some(1));
    assert_eq!(states.last().unwrap().0, ConnectionState::Connected);

    // A fresh channel was built and pagination re-issued on it.
    {
        let script = h.script.lock().unwrap();
        assert_eq!(script.connects, 2);
        let pagination_count = script
            .commands
            .iter()
            .filter(|c| c.as_str() == "terminal length 0")
            .count();
        assert_eq!(pagination_count, 2);
    }

    // Polling resumes after reconnect.
    let update = next_update(&mut rx).await;
    assert_eq!(update.collection, "cpu");
    assert!(update.error.is_none());

    shutdown.send(true).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn empty_output_traces_without_publishing() {
    let dir = tempfile::tempdir().unwrap();
    write_tree(
        dir.path(),
        &[
            ("collections/cpu/cisco_ios.yaml", CPU_YAML),
            ("templates/textfsm/cisco_ios_show_processes_cpu.textfsm", "cpu template"),
        ],
    );
    let mut h = harness(dir.path(), "cisco_ios", &[(CPU_COMMAND, &["", CPU_OUTPUT])]);
    let mut rx = h.store.subscribe("test", 16);
    let (shutdown, handle) = h.start();

    // The first cycle returned nothing: no update event, but a failed
    // trace with parsed_by none.
    let update = next_update(&mut rx).await;
    assert_eq!(update.sequence, 1, "empty cycle must not publish");
    assert!(update.error.is_none());

    let failures = h.traces.failures(Some("cpu"));
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].result.parsed_by, ParserKind::None);
    assert_eq!(failures[0].result.error.as_deref(), Some("empty output"));

    shutdown.send(true).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn history_accumulates_engine_clock_samples() {
    let dir = tempfile::tempdir().unwrap();
    write_tree(
        dir.path(),
        &[
            ("collections/cpu/cisco_ios.yaml", CPU_YAML),
            ("templates/textfsm/cisco_ios_show_processes_cpu.textfsm", "cpu template"),
        ],
    );
    let mut h = harness(dir.path(), "cisco_ios", &[(CPU_COMMAND, &[CPU_OUTPUT])]);
    let mut rx = h.store.subscribe("test", 64);
    let (shutdown, handle) = h.start();

    for _ in 0..3 {
        next_update(&mut rx).await;
    }
    let history = h.store.history("cpu", "five_sec_total");
    assert_eq!(history.len(), 3);
    assert!(history.iter().all(|s| s.value == 13.0));
    assert!(history.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

    shutdown.send(true).unwrap();
    handle.await.unwrap().unwrap();
}
