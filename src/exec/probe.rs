// src/exec/probe.rs

//! Pidfile-based process liveness probing and signalling.

use std::path::Path;

use crate::errors::ProbeError;
use crate::fs::FileSystem;

/// How watchdogs check and stop task processes.
pub trait ProcessProbe: Send + Sync {
    /// Non-destructive liveness test for the process recorded in `pidfile`.
    ///
    /// A missing pidfile or a vanished process is `Ok(false)`.
    fn is_alive(&self, pidfile: &Path) -> Result<bool, ProbeError>;

    /// Send an interrupt to the process recorded in `pidfile`.
    ///
    /// Returns `Ok(false)` when there was nothing to signal.
    fn interrupt(&self, pidfile: &Path) -> Result<bool, ProbeError>;
}

/// Production probe: reads the pid from the pidfile and uses `kill(2)`.
#[derive(Debug, Clone)]
pub struct PidfileProbe<F: FileSystem> {
    fs: F,
}

impl<F: FileSystem> PidfileProbe<F> {
    pub fn new(fs: F) -> Self {
        Self { fs }
    }

    /// Pid recorded in `pidfile`, or `None` if the file does not exist or is
    /// empty (a stale file left behind by an exited task).
    pub fn read_pid(&self, pidfile: &Path) -> Result<Option<i32>, ProbeError> {
        let content = self
            .fs
            .read_optional(pidfile)
            .map_err(|source| ProbeError::Unreadable {
                path: pidfile.display().to_string(),
                source,
            })?;

        let Some(content) = content else {
            return Ok(None);
        };
        if content.trim().is_empty() {
            return Ok(None);
        }

        match content.trim().parse::<i32>() {
            Ok(pid) if pid > 0 => Ok(Some(pid)),
            _ => Err(ProbeError::InvalidPid {
                path: pidfile.display().to_string(),
                content,
            }),
        }
    }

    fn signal_pidfile(&self, pidfile: &Path, sig: Signal) -> Result<bool, ProbeError> {
        match self.read_pid(pidfile)? {
            Some(pid) => send_signal(pid, sig),
            None => Ok(false),
        }
    }
}

impl<F: FileSystem> ProcessProbe for PidfileProbe<F> {
    fn is_alive(&self, pidfile: &Path) -> Result<bool, ProbeError> {
        self.signal_pidfile(pidfile, Signal::Probe)
    }

    fn interrupt(&self, pidfile: &Path) -> Result<bool, ProbeError> {
        self.signal_pidfile(pidfile, Signal::Interrupt)
    }
}

#[derive(Debug, Clone, Copy)]
enum Signal {
    /// Signal 0: existence check only.
    Probe,
    Interrupt,
}

/// `Ok(true)` if the signal was delivered (or the process exists but belongs
/// to another user), `Ok(false)` if no such process exists.
#[cfg(unix)]
fn send_signal(pid: i32, sig: Signal) -> Result<bool, ProbeError> {
    let signo = match sig {
        Signal::Probe => 0,
        Signal::Interrupt => libc::SIGINT,
    };

    // SAFETY: kill(2) has no memory-safety preconditions.
    if unsafe { libc::kill(pid, signo) } == 0 {
        return Ok(true);
    }

    let err = std::io::Error::last_os_error();
    match err.raw_os_error() {
        Some(libc::ESRCH) => Ok(false),
        // Process exists but runs as another user (e.g. a sudo'd task).
        Some(libc::EPERM) if matches!(sig, Signal::Probe) => Ok(true),
        _ => Err(ProbeError::Signal { pid, source: err }),
    }
}

#[cfg(not(unix))]
fn send_signal(_pid: i32, _sig: Signal) -> Result<bool, ProbeError> {
    Err(ProbeError::Unsupported)
}
