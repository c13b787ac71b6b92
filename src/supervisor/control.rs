//! `start|stop|restart|reload|status|connections` against a recorded pid.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{Result, ServerError};
use crate::supervisor::pidfile::PidFile;
use crate::supervisor::process::ProcessControl;

pub const POLL_INTERVAL: Duration = Duration::from_millis(10);
pub const STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Restart,
    Reload,
    Status,
    Connections,
}

impl FromStr for Command {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "start" => Ok(Command::Start),
            "stop" => Ok(Command::Stop),
            "restart" => Ok(Command::Restart),
            "reload" => Ok(Command::Reload),
            "status" => Ok(Command::Status),
            "connections" => Ok(Command::Connections),
            other => Err(ServerError::UnknownCommand(other.to_string())),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Command::Start => "start",
            Command::Stop => "stop",
            Command::Restart => "restart",
            Command::Reload => "reload",
            Command::Status => "status",
            Command::Connections => "connections",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Immediate,
    Graceful,
}

/// What the command line asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Invocation {
    pub command: Command,
    pub mode: Mode,
}

impl Invocation {
    pub fn new(command: Command, mode: Mode) -> Self {
        Self { command, mode }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Go on and start a new supervisor.
    Start,
    /// Print the message and exit successfully.
    Exit(String),
}

/// Signal that stops a running supervisor in `mode`.
pub fn stop_signal(mode: Mode) -> i32 {
    match mode {
        Mode::Immediate => libc::SIGINT,
        Mode::Graceful => libc::SIGTERM,
    }
}

/// Signal that reloads a running supervisor in `mode`.
pub fn reload_signal(mode: Mode) -> i32 {
    match mode {
        Mode::Immediate => libc::SIGQUIT,
        Mode::Graceful => libc::SIGUSR1,
    }
}

/// Pid recorded in `pid_file` if that process is alive.
pub fn running_pid<P: ProcessControl>(process: &mut P, pid_file: &PidFile) -> Option<i32> {
    pid_file.read().filter(|pid| process.signal(*pid, 0).is_ok())
}

pub fn execute<P: ProcessControl>(
    invocation: Invocation,
    pid_file: &PidFile,
    process: &mut P,
) -> Result<Outcome> {
    let running = running_pid(process, pid_file);
    debug!(command = %invocation.command, ?running, "control command");

    match invocation.command {
        Command::Start => match running {
            Some(_) => Err(ServerError::AlreadyRunning),
            None => Ok(Outcome::Start),
        },
        Command::Stop => {
            let pid = running.ok_or(ServerError::NotRunning)?;
            stop(process, pid, invocation.mode)?;
            Ok(Outcome::Exit(match invocation.mode {
                Mode::Immediate => "Master stopped".to_string(),
                Mode::Graceful => "Master stopping gracefully".to_string(),
            }))
        }
        Command::Restart => {
            if let Some(pid) = running {
                process.signal(pid, stop_signal(invocation.mode))?;
                let timeout = match invocation.mode {
                    Mode::Immediate => Some(STOP_TIMEOUT),
                    Mode::Graceful => None,
                };
                wait_gone(process, pid, timeout)?;
            }
            Ok(Outcome::Start)
        }
        Command::Reload => {
            let pid = running.ok_or(ServerError::NotRunning)?;
            process.signal(pid, reload_signal(invocation.mode))?;
            Ok(Outcome::Exit(format!("Master {pid} reloading")))
        }
        Command::Status => {
            let pid = running.ok_or(ServerError::NotRunning)?;
            process.signal(pid, libc::SIGUSR2)?;
            Ok(Outcome::Exit(format!("Master running, pid {pid}")))
        }
        Command::Connections => {
            let pid = running.ok_or(ServerError::NotRunning)?;
            process.signal(pid, libc::SIGIO)?;
            Ok(Outcome::Exit(format!("Master {pid} asked for a connection report")))
        }
    }
}

/// Signals `pid` to stop. An immediate stop waits for it to vanish and
/// fails after [`STOP_TIMEOUT`]; a graceful stop returns once signalled.
pub fn stop<P: ProcessControl>(process: &mut P, pid: i32, mode: Mode) -> Result<()> {
    process.signal(pid, stop_signal(mode))?;
    match mode {
        Mode::Immediate => wait_gone(process, pid, Some(STOP_TIMEOUT)),
        Mode::Graceful => Ok(()),
    }
}

/// Polls `pid` every [`POLL_INTERVAL`] until it no longer exists.
pub fn wait_gone<P: ProcessControl>(process: &mut P, pid: i32, timeout: Option<Duration>) -> Result<()> {
    let started = Instant::now();
    let mut waited = Duration::ZERO;
    while process.signal(pid, 0).is_ok() {
        if timeout.is_some_and(|limit| waited >= limit || started.elapsed() >= limit) {
            return Err(ServerError::StopTimeout);
        }
        process.sleep(POLL_INTERVAL);
        waited += POLL_INTERVAL;
    }
    Ok(())
}
