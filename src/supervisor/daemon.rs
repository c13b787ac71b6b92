use std::fs::OpenOptions;
use std::io;
use std::os::fd::AsRawFd;

use crate::error::{Result, ServerError};
use crate::supervisor::process::{Fork, fork_process};

/// Detaches from the controlling terminal: fork, new session, fork again.
///
/// Both intermediate parents exit here. The surviving process is neither a
/// session nor a process-group leader, and its stdio points at `/dev/null`.
pub fn daemonize() -> Result<()> {
    if let Fork::Parent(_) = fork_process().map_err(ServerError::Fork)? {
        std::process::exit(0);
    }

    // SAFETY: setsid has no memory-safety preconditions.
    if unsafe { libc::setsid() } == -1 {
        return Err(io::Error::last_os_error().into());
    }

    if let Fork::Parent(_) = fork_process().map_err(ServerError::Fork)? {
        std::process::exit(0);
    }

    let null = OpenOptions::new().read(true).write(true).open("/dev/null")?;
    for target in [libc::STDIN_FILENO, libc::STDOUT_FILENO, libc::STDERR_FILENO] {
        // SAFETY: both descriptors are valid; dup2 atomically replaces `target`.
        if unsafe { libc::dup2(null.as_raw_fd(), target) } == -1 {
            return Err(io::Error::last_os_error().into());
        }
    }
    Ok(())
}
