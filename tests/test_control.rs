use std::collections::HashSet;
use std::io;
use std::time::Duration;

use prefork::error::ServerError;
use prefork::supervisor::control::{self, Command, Invocation, Mode, Outcome};
use prefork::supervisor::pidfile::PidFile;
use prefork::supervisor::process::{ChildExit, Fork, ProcessControl};

/// A process table holding live pids. A stop signal kills the target unless
/// it is stubborn; graceful stops take a few polls.
#[derive(Default)]
struct FakeProcess {
    alive: HashSet<i32>,
    stubborn: bool,
    polls_until_gone: usize,
    sent: Vec<(i32, i32)>,
    slept: Duration,
}

impl FakeProcess {
    fn with_master(pid: i32) -> Self {
        Self {
            alive: HashSet::from([pid]),
            ..Self::default()
        }
    }
}

impl ProcessControl for FakeProcess {
    fn fork(&mut self) -> io::Result<Fork> {
        Err(io::Error::other("no forking in tests"))
    }

    fn reap(&mut self) -> io::Result<Option<ChildExit>> {
        Ok(None)
    }

    fn signal(&mut self, pid: i32, signal: i32) -> io::Result<()> {
        if !self.alive.contains(&pid) {
            return Err(io::Error::from_raw_os_error(libc::ESRCH));
        }
        if signal == 0 {
            if self.polls_until_gone > 0 {
                self.polls_until_gone -= 1;
                if self.polls_until_gone == 0 {
                    self.alive.remove(&pid);
                    return Err(io::Error::from_raw_os_error(libc::ESRCH));
                }
            }
            return Ok(());
        }
        self.sent.push((pid, signal));
        if signal == libc::SIGINT && !self.stubborn {
            self.alive.remove(&pid);
        }
        Ok(())
    }

    fn listen(&mut self, _signals: &[i32]) -> io::Result<()> {
        Ok(())
    }

    fn wait_signals(&mut self) -> Vec<i32> {
        Vec::new()
    }

    fn sleep(&mut self, duration: Duration) {
        self.slept += duration;
    }
}

fn pid_file_with(pid: Option<i32>) -> (tempfile::TempDir, PidFile) {
    let dir = tempfile::tempdir().unwrap();
    let pid_file = PidFile::new(dir.path().join("master.pid"));
    if let Some(pid) = pid {
        pid_file.write(pid).unwrap();
    }
    (dir, pid_file)
}

fn run(command: Command, mode: Mode, pid_file: &PidFile, process: &mut FakeProcess) -> prefork::error::Result<Outcome> {
    control::execute(Invocation::new(command, mode), pid_file, process)
}

#[test]
fn test_start_without_master() {
    let (_dir, pid_file) = pid_file_with(None);
    let mut process = FakeProcess::default();

    let outcome = run(Command::Start, Mode::Immediate, &pid_file, &mut process).unwrap();
    assert_eq!(outcome, Outcome::Start);
}

#[test]
fn test_start_with_stale_pid_file() {
    let (_dir, pid_file) = pid_file_with(Some(777));
    let mut process = FakeProcess::default();

    let outcome = run(Command::Start, Mode::Immediate, &pid_file, &mut process).unwrap();
    assert_eq!(outcome, Outcome::Start);
}

#[test]
fn test_start_refuses_second_master() {
    let (_dir, pid_file) = pid_file_with(Some(500));
    let mut process = FakeProcess::with_master(500);

    let err = run(Command::Start, Mode::Immediate, &pid_file, &mut process).unwrap_err();
    assert!(matches!(err, ServerError::AlreadyRunning));
    assert_eq!(err.to_string(), "Master already running");
}

#[test]
fn test_commands_need_a_master() {
    let (_dir, pid_file) = pid_file_with(None);
    for command in [Command::Stop, Command::Reload, Command::Status, Command::Connections] {
        let mut process = FakeProcess::default();
        let err = run(command, Mode::Immediate, &pid_file, &mut process).unwrap_err();
        assert_eq!(err.to_string(), "Master not run");
    }
}

#[test]
fn test_immediate_stop() {
    let (_dir, pid_file) = pid_file_with(Some(500));
    let mut process = FakeProcess::with_master(500);

    let outcome = run(Command::Stop, Mode::Immediate, &pid_file, &mut process).unwrap();

    assert_eq!(outcome, Outcome::Exit("Master stopped".into()));
    assert_eq!(process.sent, vec![(500, libc::SIGINT)]);
}

#[test]
fn test_immediate_stop_times_out() {
    let (_dir, pid_file) = pid_file_with(Some(500));
    let mut process = FakeProcess::with_master(500);
    process.stubborn = true;

    let err = run(Command::Stop, Mode::Immediate, &pid_file, &mut process).unwrap_err();

    assert_eq!(err.to_string(), "Master stop failed");
    assert!(process.slept >= control::STOP_TIMEOUT);
}

#[test]
fn test_graceful_stop_does_not_wait() {
    let (_dir, pid_file) = pid_file_with(Some(500));
    let mut process = FakeProcess::with_master(500);

    let outcome = run(Command::Stop, Mode::Graceful, &pid_file, &mut process).unwrap();

    assert_eq!(outcome, Outcome::Exit("Master stopping gracefully".into()));
    assert_eq!(process.sent, vec![(500, libc::SIGTERM)]);
    assert_eq!(process.slept, Duration::ZERO);
}

#[test]
fn test_reload_signals() {
    let (_dir, pid_file) = pid_file_with(Some(500));

    let mut process = FakeProcess::with_master(500);
    run(Command::Reload, Mode::Immediate, &pid_file, &mut process).unwrap();
    assert_eq!(process.sent, vec![(500, libc::SIGQUIT)]);

    let mut process = FakeProcess::with_master(500);
    let outcome = run(Command::Reload, Mode::Graceful, &pid_file, &mut process).unwrap();
    assert_eq!(process.sent, vec![(500, libc::SIGUSR1)]);
    assert_eq!(outcome, Outcome::Exit("Master 500 reloading".into()));
}

#[test]
fn test_status_and_connections() {
    let (_dir, pid_file) = pid_file_with(Some(500));
    let mut process = FakeProcess::with_master(500);

    let outcome = run(Command::Status, Mode::Immediate, &pid_file, &mut process).unwrap();
    assert_eq!(outcome, Outcome::Exit("Master running, pid 500".into()));
    run(Command::Connections, Mode::Immediate, &pid_file, &mut process).unwrap();

    assert_eq!(process.sent, vec![(500, libc::SIGUSR2), (500, libc::SIGIO)]);
}

#[test]
fn test_graceful_restart_waits_until_gone() {
    let (_dir, pid_file) = pid_file_with(Some(500));
    let mut process = FakeProcess::with_master(500);
    // one liveness check in execute, three in the wait loop
    process.polls_until_gone = 4;

    let outcome = run(Command::Restart, Mode::Graceful, &pid_file, &mut process).unwrap();

    assert_eq!(outcome, Outcome::Start);
    assert_eq!(process.sent, vec![(500, libc::SIGTERM)]);
    assert_eq!(process.slept, control::POLL_INTERVAL * 2);
}

#[test]
fn test_restart_without_master_starts() {
    let (_dir, pid_file) = pid_file_with(None);
    let mut process = FakeProcess::default();

    let outcome = run(Command::Restart, Mode::Immediate, &pid_file, &mut process).unwrap();
    assert_eq!(outcome, Outcome::Start);
    assert!(process.sent.is_empty());
}
