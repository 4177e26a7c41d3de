// tests/runtime_fake_backends.rs

mod common;

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

use taskrunner::config::ConfigFile;
use taskrunner::engine::{CoreRuntime, LaunchOutcome, Runtime, RuntimeEvent};
use taskrunner::errors::TaskRunnerError;
use taskrunner::protocol::{OutboundMessage, StatsReport, TaskReply};
use taskrunner::types::ReplyStatus;
use taskrunner_test_utils::builders::{settings_for, task_envelope};
use taskrunner_test_utils::fakes::{FakeLauncher, FakeProbe, RecordingTransport};
use taskrunner_test_utils::init_tracing;

use common::{sample_builder, CONFIG_PATH};

type TestResult = Result<(), Box<dyn Error>>;

const TASK_PIDFILE: &str = "/run/taskrunner/agent.task_abc123.pid";

fn fast_config(heartbeat: bool) -> ConfigFile {
    sample_builder()
        .reg_period(Duration::from_secs(3600))
        .maint_period(Duration::from_secs(3600))
        .watchdog_tick(Duration::from_millis(20))
        .heartbeat(heartbeat)
        .build()
}

struct Harness {
    tx: mpsc::Sender<RuntimeEvent>,
    outbound: mpsc::UnboundedReceiver<OutboundMessage>,
    handle: JoinHandle<Result<CoreRuntime, TaskRunnerError>>,
}

impl Harness {
    fn start(
        cfg: &ConfigFile,
        make_launcher: impl FnOnce(mpsc::Sender<RuntimeEvent>) -> FakeLauncher,
        probe: FakeProbe,
    ) -> Self {
        let (settings, timers) = settings_for(cfg, Path::new(CONFIG_PATH));
        let (tx, rx) = mpsc::channel::<RuntimeEvent>(64);
        let (transport, outbound) = RecordingTransport::new();
        let launcher = make_launcher(tx.clone());

        let runtime = Runtime::new(
            CoreRuntime::new(settings),
            rx,
            tx.clone(),
            transport,
            launcher,
            Arc::new(probe),
            timers,
        );
        let handle = tokio::spawn(runtime.run());

        Self {
            tx,
            outbound,
            handle,
        }
    }

    async fn submit(&self, task_id: &str, handler: &str) -> TestResult {
        self.tx
            .send(RuntimeEvent::Inbound(task_envelope(task_id, handler)))
            .await?;
        Ok(())
    }

    /// Next task reply, skipping registration and stats messages.
    async fn next_reply(&mut self) -> Result<TaskReply, Box<dyn Error>> {
        loop {
            let msg = timeout(Duration::from_secs(3), self.outbound.recv())
                .await?
                .ok_or("transport closed")?;
            if let OutboundMessage::Reply(reply) = msg {
                return Ok(reply);
            }
        }
    }

    async fn next_stats(&mut self) -> Result<StatsReport, Box<dyn Error>> {
        loop {
            let msg = timeout(Duration::from_secs(3), self.outbound.recv())
                .await?
                .ok_or("transport closed")?;
            if let OutboundMessage::Stats(stats) = msg {
                return Ok(stats);
            }
        }
    }

    async fn shutdown(self) -> Result<CoreRuntime, Box<dyn Error>> {
        self.tx.send(RuntimeEvent::ShutdownRequested).await?;
        let core = timeout(Duration::from_secs(3), self.handle).await???;
        Ok(core)
    }
}

#[tokio::test]
async fn task_lifecycle_from_request_to_stopped() -> TestResult {
    init_tracing();
    let probe = FakeProbe::new();
    probe.set_alive(TASK_PIDFILE);

    let mut harness = Harness::start(&fast_config(false), FakeLauncher::new, probe.clone());
    harness.submit("abc123", "sample").await?;

    let starting = harness.next_reply().await?;
    assert_eq!(starting.task_id, "abc123");
    assert_eq!(starting.status, ReplyStatus::Starting);

    let launched = harness.next_reply().await?;
    assert_eq!(launched.status, ReplyStatus::Launched);
    assert_eq!(launched.feedback.get("rc"), Some(&json!(0)));
    assert_eq!(launched.feedback.get("out"), Some(&json!("b2s=")));

    // A few ticks go by while the process is alive.
    sleep(Duration::from_millis(80)).await;
    probe.kill(Path::new(TASK_PIDFILE));

    let stopped = harness.next_reply().await?;
    assert_eq!(stopped.status, ReplyStatus::Stopped);

    // No further replies for the task.
    let extra = timeout(Duration::from_millis(100), harness.next_reply()).await;
    assert!(extra.is_err(), "unexpected reply after stopped: {:?}", extra);

    let core = harness.shutdown().await?;
    let state = core.registry().get("abc123").ok_or("task state missing")?;
    assert!(!state.is_active());
    Ok(())
}

#[tokio::test]
async fn registration_is_sent_at_startup() -> TestResult {
    let mut harness = Harness::start(&fast_config(false), FakeLauncher::new, FakeProbe::new());

    let msg = timeout(Duration::from_secs(3), harness.outbound.recv())
        .await?
        .ok_or("transport closed")?;
    match msg {
        OutboundMessage::Register(r) => assert_eq!(r.host, "db1"),
        other => panic!("expected register message, got {:?}", other),
    }

    harness.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn heartbeat_sends_running_while_alive() -> TestResult {
    let probe = FakeProbe::new();
    probe.set_alive(TASK_PIDFILE);

    let mut harness = Harness::start(&fast_config(true), FakeLauncher::new, probe.clone());
    harness.submit("abc123", "sample").await?;

    assert_eq!(harness.next_reply().await?.status, ReplyStatus::Starting);
    assert_eq!(harness.next_reply().await?.status, ReplyStatus::Launched);
    assert_eq!(harness.next_reply().await?.status, ReplyStatus::Running);
    assert_eq!(harness.next_reply().await?.status, ReplyStatus::Running);

    harness.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn failed_bootstrap_is_reported_and_not_watched() -> TestResult {
    let probe = FakeProbe::new();
    let mut harness = Harness::start(
        &fast_config(false),
        |tx| FakeLauncher::new(tx).with_outcome("abc123", LaunchOutcome::new(2, "bad args")),
        probe,
    );
    harness.submit("abc123", "sample").await?;

    assert_eq!(harness.next_reply().await?.status, ReplyStatus::Starting);
    let failed = harness.next_reply().await?;
    assert_eq!(failed.status, ReplyStatus::Failed);
    assert_eq!(failed.feedback.get("rc"), Some(&json!(2)));

    // Never watched, so never stopped.
    let extra = timeout(Duration::from_millis(100), harness.next_reply()).await;
    assert!(extra.is_err());

    let core = harness.shutdown().await?;
    assert!(core.registry().get("abc123").is_none());
    Ok(())
}

#[tokio::test]
async fn refused_launch_is_reported_as_failed() -> TestResult {
    let mut harness = Harness::start(
        &fast_config(false),
        |tx| FakeLauncher::new(tx).refusing("abc123"),
        FakeProbe::new(),
    );
    harness.submit("abc123", "sample").await?;

    assert_eq!(harness.next_reply().await?.status, ReplyStatus::Starting);
    let failed = harness.next_reply().await?;
    assert_eq!(failed.status, ReplyStatus::Failed);
    assert_eq!(failed.feedback.get("rc"), Some(&json!(-1)));

    harness.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn duplicate_during_slow_launch_is_launched_once() -> TestResult {
    init_tracing();
    let probe = FakeProbe::new();
    probe.set_alive(TASK_PIDFILE);

    let launcher_cell = Arc::new(std::sync::Mutex::new(None));
    let cell = Arc::clone(&launcher_cell);
    let mut harness = Harness::start(
        &fast_config(false),
        move |tx| {
            let launcher = FakeLauncher::new(tx).with_delay(Duration::from_millis(150));
            *cell.lock().unwrap() = Some(launcher.launched());
            launcher
        },
        probe,
    );

    harness.submit("abc123", "sample").await?;
    harness.submit("abc123", "sample").await?;

    assert_eq!(harness.next_reply().await?.status, ReplyStatus::Starting);
    assert_eq!(harness.next_reply().await?.status, ReplyStatus::Launched);

    let extra = timeout(Duration::from_millis(100), harness.next_reply()).await;
    assert!(extra.is_err(), "duplicate produced a reply: {:?}", extra);

    let launched = launcher_cell
        .lock()
        .unwrap()
        .clone()
        .ok_or("launcher not built")?;
    assert_eq!(launched.lock().unwrap().len(), 1);

    harness.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn unconfigured_handler_fails_without_launch() -> TestResult {
    let mut harness = Harness::start(&fast_config(false), FakeLauncher::new, FakeProbe::new());
    harness.submit("t9", "missing").await?;

    let failed = harness.next_reply().await?;
    assert_eq!(failed.task_id, "t9");
    assert_eq!(failed.status, ReplyStatus::Failed);

    harness.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn probe_errors_keep_task_active() -> TestResult {
    let probe = FakeProbe::new();
    probe.break_pidfile(TASK_PIDFILE);

    let mut harness = Harness::start(&fast_config(false), FakeLauncher::new, probe);
    harness.submit("abc123", "sample").await?;

    assert_eq!(harness.next_reply().await?.status, ReplyStatus::Starting);
    assert_eq!(harness.next_reply().await?.status, ReplyStatus::Launched);

    let extra = timeout(Duration::from_millis(150), harness.next_reply()).await;
    assert!(extra.is_err(), "probe error changed task state: {:?}", extra);

    let core = harness.shutdown().await?;
    assert!(core.registry().get("abc123").ok_or("missing")?.is_active());
    Ok(())
}

#[tokio::test]
async fn shutdown_interrupts_running_tasks() -> TestResult {
    let probe = FakeProbe::new();
    probe.set_alive(TASK_PIDFILE);

    let mut harness = Harness::start(&fast_config(false), FakeLauncher::new, probe.clone());
    harness.submit("abc123", "sample").await?;
    assert_eq!(harness.next_reply().await?.status, ReplyStatus::Starting);
    assert_eq!(harness.next_reply().await?.status, ReplyStatus::Launched);

    harness.shutdown().await?;

    assert_eq!(probe.interrupted(), vec![PathBuf::from(TASK_PIDFILE)]);
    Ok(())
}

#[tokio::test]
async fn maintenance_publishes_stats_periodically() -> TestResult {
    let cfg = sample_builder()
        .reg_period(Duration::from_secs(3600))
        .maint_period(Duration::from_millis(50))
        .watchdog_tick(Duration::from_millis(20))
        .build();
    let probe = FakeProbe::new();
    probe.set_alive(TASK_PIDFILE);

    let mut harness = Harness::start(&cfg, FakeLauncher::new, probe);
    harness.submit("abc123", "sample").await?;

    // Counters are per period, so keep reading until the launch shows up.
    let mut seen_launch = false;
    for _ in 0..10 {
        let stats = harness.next_stats().await?;
        assert_eq!(stats.host, "db1");
        if stats.tasks_launched == 1 {
            assert_eq!(stats.tasks_active, 1);
            seen_launch = true;
            break;
        }
    }
    assert!(seen_launch, "launch never counted in stats");

    let next = harness.next_stats().await?;
    assert_eq!(next.tasks_launched, 0);
    assert_eq!(next.tasks_active, 1);

    harness.shutdown().await?;
    Ok(())
}
