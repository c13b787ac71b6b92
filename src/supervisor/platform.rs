//! Thin wrappers over the process primitives the supervisor relies on.

use crate::error::{Result, ServerError};

/// Fails on systems without fork/waitpid/kill semantics.
pub fn ensure_supported() -> Result<()> {
    if cfg!(unix) {
        Ok(())
    } else {
        Err(ServerError::UnsupportedPlatform(std::env::consts::OS))
    }
}

/// Writes to a peer that already closed must fail with EPIPE, not kill the process.
pub fn ignore_sigpipe() {
    // SAFETY: SIG_IGN is a valid disposition and SIGPIPE a valid signal.
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
    }
}

/// Sets the name shown by `ps -o comm` and `top`. The kernel keeps 15 bytes.
pub fn set_process_title(title: &str) {
    #[cfg(target_os = "linux")]
    {
        let truncated: String = title.chars().filter(|c| *c != '\0').take(15).collect();
        if let Ok(name) = std::ffi::CString::new(truncated) {
            // SAFETY: PR_SET_NAME reads a NUL-terminated string of at most 16 bytes.
            unsafe {
                libc::prctl(libc::PR_SET_NAME, name.as_ptr() as libc::c_ulong, 0, 0, 0);
            }
        }
    }
    tracing::debug!(title, "process title set");
}

pub fn current_pid() -> i32 {
    std::process::id() as i32
}
