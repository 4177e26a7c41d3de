// tests/core_watchdog.rs

mod common;

use std::error::Error;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use taskrunner::engine::{CoreCommand, CoreRuntime, LaunchOutcome, RuntimeEvent};
use taskrunner::protocol::OutboundMessage;
use taskrunner::types::ReplyStatus;
use taskrunner_test_utils::builders::task_envelope;
use taskrunner_test_utils::init_tracing;

use common::{core_for, sample_builder, sample_config, statuses};

type TestResult = Result<(), Box<dyn Error>>;

/// Drive a task through acceptance and a successful bootstrap.
fn launch(core: &mut CoreRuntime, task_id: &str, now: Instant) {
    core.step(RuntimeEvent::Inbound(task_envelope(task_id, "sample")), now);
    core.step(
        RuntimeEvent::LaunchCompleted {
            task_id: task_id.to_string(),
            outcome: LaunchOutcome::new(0, "ok"),
        },
        now,
    );
}

fn probe(task_id: &str, alive: bool) -> RuntimeEvent {
    RuntimeEvent::ProbeCompleted {
        task_id: task_id.to_string(),
        alive,
    }
}

fn stats_report(step: &taskrunner::engine::CoreStep) -> taskrunner::protocol::StatsReport {
    step.commands
        .iter()
        .find_map(|c| match c {
            CoreCommand::Send(OutboundMessage::Stats(s)) => Some(s.clone()),
            _ => None,
        })
        .expect("maintenance publishes stats")
}

#[test]
fn alive_probe_without_heartbeat_is_silent() -> TestResult {
    init_tracing();
    let mut core = core_for(&sample_config());
    let now = Instant::now();
    launch(&mut core, "abc123", now);

    let step = core.step(probe("abc123", true), now);
    assert!(step.commands.is_empty());
    assert!(core.registry().get("abc123").ok_or("missing")?.is_active());
    Ok(())
}

#[test]
fn alive_probe_with_heartbeat_sends_running() -> TestResult {
    let cfg = sample_builder().heartbeat(true).build();
    let mut core = core_for(&cfg);
    let now = Instant::now();
    launch(&mut core, "abc123", now);

    for _ in 0..3 {
        let step = core.step(probe("abc123", true), now);
        assert_eq!(statuses(&step), vec![ReplyStatus::Running]);
    }
    Ok(())
}

#[test]
fn dead_process_yields_exactly_one_stopped_reply() -> TestResult {
    init_tracing();
    let mut core = core_for(&sample_config());
    let now = Instant::now();
    launch(&mut core, "abc123", now);

    let later = now + Duration::from_secs(5);
    let step = core.step(probe("abc123", false), later);

    assert_eq!(statuses(&step), vec![ReplyStatus::Stopped]);
    assert!(step.commands.contains(&CoreCommand::CancelWatchdog {
        task_id: "abc123".to_string()
    }));

    let state = core.registry().get("abc123").ok_or("missing")?;
    assert!(!state.is_active());
    assert_eq!(state.dead_since, Some(later));

    // Late probes (already in the channel when the watchdog was cancelled)
    // change nothing.
    let again = core.step(probe("abc123", false), later);
    assert!(again.commands.is_empty());
    let alive_again = core.step(probe("abc123", true), later);
    assert!(alive_again.commands.is_empty());
    Ok(())
}

#[test]
fn heartbeat_stops_once_task_is_stopped() -> TestResult {
    let cfg = sample_builder().heartbeat(true).build();
    let mut core = core_for(&cfg);
    let now = Instant::now();
    launch(&mut core, "abc123", now);

    core.step(probe("abc123", false), now);
    let step = core.step(probe("abc123", true), now);
    assert!(statuses(&step).is_empty());
    Ok(())
}

#[test]
fn probe_for_untracked_task_is_ignored() -> TestResult {
    let mut core = core_for(&sample_config());
    let step = core.step(probe("ghost", false), Instant::now());
    assert!(step.commands.is_empty());
    Ok(())
}

#[test]
fn sweep_evicts_only_after_grace_period_has_passed() -> TestResult {
    init_tracing();
    let cfg = sample_builder().grace_period(Duration::from_secs(900)).build();
    let mut core = core_for(&cfg);
    let t0 = Instant::now();
    launch(&mut core, "abc123", t0);
    core.step(probe("abc123", false), t0);

    // Exactly at the grace period: kept.
    core.step(RuntimeEvent::MaintenanceDue, t0 + Duration::from_secs(900));
    assert!(core.registry().get("abc123").is_some());

    // Past it: forgotten.
    let step = core.step(
        RuntimeEvent::MaintenanceDue,
        t0 + Duration::from_secs(900) + Duration::from_millis(1),
    );
    assert!(core.registry().get("abc123").is_none());
    assert_eq!(stats_report(&step).tasks_evicted, 1);

    // And the id can be reused.
    let reuse = core.step(
        RuntimeEvent::Inbound(task_envelope("abc123", "sample")),
        t0 + Duration::from_secs(901),
    );
    assert_eq!(statuses(&reuse), vec![ReplyStatus::Starting]);
    Ok(())
}

#[test]
fn sweep_never_evicts_active_tasks() -> TestResult {
    let mut core = core_for(&sample_config());
    let t0 = Instant::now();
    launch(&mut core, "long-running", t0);

    core.step(RuntimeEvent::MaintenanceDue, t0 + Duration::from_secs(86_400));
    assert!(core.registry().get("long-running").is_some());
    Ok(())
}

#[test]
fn stats_report_counts_and_resets() -> TestResult {
    let mut core = core_for(&sample_config());
    let now = Instant::now();

    launch(&mut core, "ok1", now);
    launch(&mut core, "ok2", now);
    core.step(RuntimeEvent::Inbound(task_envelope("bad", "sample")), now);
    core.step(
        RuntimeEvent::LaunchCompleted {
            task_id: "bad".to_string(),
            outcome: LaunchOutcome::new(1, ""),
        },
        now,
    );
    core.step(RuntimeEvent::Inbound(task_envelope("pending", "sample")), now);
    core.step(probe("ok2", false), now);

    let step = core.step(RuntimeEvent::MaintenanceDue, now);
    let report = stats_report(&step);
    assert_eq!(report.req, "task.stats");
    assert_eq!(report.host, "db1");
    assert_eq!(report.tasks_launched, 2);
    assert_eq!(report.tasks_failed, 1);
    assert_eq!(report.tasks_evicted, 0);
    assert_eq!(report.tasks_active, 1);
    assert_eq!(report.tasks_stopped, 1);
    assert_eq!(report.launches_in_flight, 1);

    let next = stats_report(&core.step(RuntimeEvent::MaintenanceDue, now));
    assert_eq!(next.tasks_launched, 0);
    assert_eq!(next.tasks_failed, 0);
    // Gauges are read from the registry, not reset.
    assert_eq!(next.tasks_active, 1);
    assert_eq!(next.tasks_stopped, 1);
    Ok(())
}

#[test]
fn registration_announces_local_id() -> TestResult {
    let mut core = core_for(&sample_config());

    let step = core.step(RuntimeEvent::RegistrationDue, Instant::now());

    assert_eq!(step.commands.len(), 1);
    match &step.commands[0] {
        CoreCommand::Send(OutboundMessage::Register(r)) => {
            assert_eq!(r.req, "task.register");
            assert_eq!(r.host, "db1");
        }
        other => panic!("expected register message, got {:?}", other),
    }
    assert!(step.keep_running);
    Ok(())
}

#[test]
fn shutdown_interrupts_active_tasks_and_stops_loop() -> TestResult {
    init_tracing();
    let mut core = core_for(&sample_config());
    let now = Instant::now();
    launch(&mut core, "a1", now);
    launch(&mut core, "a2", now);
    core.step(probe("a2", false), now);

    let step = core.step(RuntimeEvent::ShutdownRequested, now);

    assert!(!step.keep_running);
    assert_eq!(
        step.commands,
        vec![CoreCommand::Interrupt {
            task_id: "a1".to_string(),
            pidfile: PathBuf::from("/run/taskrunner/agent.task_a1.pid"),
        }]
    );
    Ok(())
}
