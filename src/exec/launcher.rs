// src/exec/launcher.rs

//! Bootstrap process runner.

use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::engine::dispatch::TASK_PIDFILE_ENV;
use crate::engine::{LaunchOutcome, LaunchRequest, RuntimeEvent};

/// Run a task's bootstrap process and report the outcome to the runtime as
/// `LaunchCompleted`.
///
/// Spawn errors are reported like a failed exit (`rc = -1`, error text as
/// output) so the router always hears back about a `starting` task.
pub async fn launch_task(request: LaunchRequest, runtime_tx: mpsc::Sender<RuntimeEvent>) {
    let task_id = request.task_id.clone();

    let outcome = match run_launch(&request).await {
        Ok(outcome) => outcome,
        Err(err) => {
            error!(task_id = %task_id, error = %err, "task launch error");
            LaunchOutcome::new(-1, format!("{err:#}"))
        }
    };

    if runtime_tx
        .send(RuntimeEvent::LaunchCompleted { task_id, outcome })
        .await
        .is_err()
    {
        debug!(task_id = %request.task_id, "runtime gone; dropping launch outcome");
    }
}

/// Spawn the process, feed it the task info on stdin, and wait for it to
/// exit while capturing combined stdout/stderr.
pub async fn run_launch(request: &LaunchRequest) -> Result<LaunchOutcome> {
    info!(
        task_id = %request.task_id,
        cmd = %request.command_line(),
        "launching task"
    );

    let mut cmd = Command::new(&request.program);
    cmd.args(&request.args)
        .env(TASK_PIDFILE_ENV, &request.pidfile)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning '{}'", request.command_line()))?;

    let stdin = child.stdin.take();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let feed = async {
        if let Some(mut stdin) = stdin {
            // A task that never reads its stdin closes the pipe early; that
            // is its business, not a launch failure.
            if let Err(e) = stdin.write_all(&request.stdin).await {
                warn!(task_id = %request.task_id, error = %e, "could not write task info to stdin");
            }
            // Dropping stdin closes the pipe so the task sees EOF.
        }
    };

    let (_, output) = tokio::join!(feed, collect_combined(stdout, stderr));
    let output = output.with_context(|| {
        format!("reading output of task '{}'", request.task_id)
    })?;

    let status = child
        .wait()
        .await
        .with_context(|| format!("waiting for bootstrap of task '{}'", request.task_id))?;

    let rc = exit_rc(status);
    info!(
        task_id = %request.task_id,
        rc,
        success = status.success(),
        "task bootstrap exited"
    );

    Ok(LaunchOutcome::new(rc, output))
}

/// Exit code of the bootstrap; a signal death reports the negated signal
/// number so it stays distinct from a spawn failure (-1 only for SIGHUP).
#[cfg(unix)]
fn exit_rc(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(sig)) => -sig,
        (None, None) => -1,
    }
}

#[cfg(not(unix))]
fn exit_rc(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

/// Read two streams to EOF, appending chunks to one buffer in the order they
/// arrive.
pub async fn collect_combined<O, E>(stdout: Option<O>, stderr: Option<E>) -> std::io::Result<Vec<u8>>
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let mut stdout = stdout;
    let mut stderr = stderr;
    let mut combined = Vec::new();
    let mut out_buf = [0u8; 4096];
    let mut err_buf = [0u8; 4096];

    while stdout.is_some() || stderr.is_some() {
        tokio::select! {
            n = read_chunk(&mut stdout, &mut out_buf) => {
                let n = n?;
                if n == 0 {
                    stdout = None;
                } else {
                    combined.extend_from_slice(&out_buf[..n]);
                }
            }
            n = read_chunk(&mut stderr, &mut err_buf) => {
                let n = n?;
                if n == 0 {
                    stderr = None;
                } else {
                    combined.extend_from_slice(&err_buf[..n]);
                }
            }
        }
    }

    Ok(combined)
}

/// Read from a stream that may already be closed; a closed stream never
/// completes, so `select!` keeps waiting on the other one.
async fn read_chunk<R>(stream: &mut Option<R>, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    match stream {
        Some(r) => r.read(buf).await,
        None => std::future::pending().await,
    }
}
