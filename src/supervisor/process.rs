use std::io;
use std::time::Duration;

use crate::reactor::SignalQueue;

/// Outcome of duplicating the current process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fork {
    Parent(i32),
    Child,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Code(i32),
    Signaled(i32),
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Code(0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildExit {
    pub pid: i32,
    pub status: ExitStatus,
}

/// The OS process primitives the supervisor needs, so the monitor loop can
/// be driven without forking.
pub trait ProcessControl {
    fn fork(&mut self) -> io::Result<Fork>;

    /// Collects one exited child without blocking.
    fn reap(&mut self) -> io::Result<Option<ChildExit>>;

    /// Sends `signal` to `pid`. Signal 0 probes whether `pid` exists.
    fn signal(&mut self, pid: i32, signal: i32) -> io::Result<()>;

    /// Starts queueing the given signals for [`ProcessControl::wait_signals`].
    fn listen(&mut self, signals: &[i32]) -> io::Result<()>;

    /// Blocks until at least one queued signal arrives.
    fn wait_signals(&mut self) -> Vec<i32>;

    /// Drops supervisor-only state inherited by a freshly forked child.
    fn detach(&mut self) {}

    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// The real thing: `fork(2)`, `waitpid(2)`, `kill(2)` and a signal queue.
#[derive(Debug, Default)]
pub struct SystemProcess {
    signals: Option<SignalQueue>,
}

impl SystemProcess {
    pub fn new() -> Self {
        Self::default()
    }
}

pub fn fork_process() -> io::Result<Fork> {
    // SAFETY: the supervisor is single-threaded when it forks.
    match unsafe { libc::fork() } {
        -1 => Err(io::Error::last_os_error()),
        0 => Ok(Fork::Child),
        pid => Ok(Fork::Parent(pid)),
    }
}

pub fn send_signal(pid: i32, signal: i32) -> io::Result<()> {
    // SAFETY: kill has no memory-safety preconditions.
    if unsafe { libc::kill(pid, signal) } == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

impl ProcessControl for SystemProcess {
    fn fork(&mut self) -> io::Result<Fork> {
        fork_process()
    }

    fn reap(&mut self) -> io::Result<Option<ChildExit>> {
        loop {
            let mut status: libc::c_int = 0;
            // SAFETY: `status` is a valid out-pointer for the duration of the call.
            let pid = unsafe { libc::waitpid(-1, &mut status, libc::WNOHANG) };
            if pid > 0 {
                let status = if libc::WIFSIGNALED(status) {
                    ExitStatus::Signaled(libc::WTERMSIG(status))
                } else {
                    ExitStatus::Code(libc::WEXITSTATUS(status))
                };
                return Ok(Some(ChildExit { pid, status }));
            }
            if pid == 0 {
                return Ok(None);
            }
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EINTR) => continue,
                Some(libc::ECHILD) => return Ok(None),
                _ => return Err(err),
            }
        }
    }

    fn signal(&mut self, pid: i32, signal: i32) -> io::Result<()> {
        send_signal(pid, signal)
    }

    fn listen(&mut self, signals: &[i32]) -> io::Result<()> {
        let queue = match self.signals.take() {
            Some(queue) => queue,
            None => SignalQueue::new()?,
        };
        let queue = self.signals.insert(queue);
        for &signal in signals {
            queue.add(signal)?;
        }
        Ok(())
    }

    fn wait_signals(&mut self) -> Vec<i32> {
        match self.signals.as_mut() {
            Some(queue) => queue.wait(),
            None => {
                std::thread::sleep(Duration::from_secs(1));
                Vec::new()
            }
        }
    }

    fn detach(&mut self) {
        self.signals = None;
    }
}
