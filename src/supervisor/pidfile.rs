use std::fs::{self, File};
use std::io;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, ServerError};

/// Decimal pid of the running supervisor. Never removed implicitly: forked
/// workers drop their copy of this value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// A path in the temp directory derived from the program's absolute path,
    /// so every installed copy gets its own file.
    pub fn default_for(program: &Path) -> Self {
        let identity: String = program
            .to_string_lossy()
            .trim_start_matches('/')
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
            .collect();
        Self::new(std::env::temp_dir().join(format!("{identity}.pid")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The recorded pid, if the file exists and holds one.
    pub fn read(&self) -> Option<i32> {
        fs::read_to_string(&self.path)
            .ok()
            .and_then(|content| content.trim().parse().ok())
            .filter(|pid| *pid > 0)
    }

    pub fn write(&self, pid: i32) -> Result<()> {
        fs::write(&self.path, pid.to_string()).map_err(|source| ServerError::PidFile {
            path: self.path.clone(),
            source,
        })
    }

    pub fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(ServerError::PidFile {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

/// Exclusive advisory lock held while a starting supervisor checks for a
/// running instance and records its pid. Released on drop.
#[derive(Debug)]
pub struct StartupLock {
    file: File,
}

impl StartupLock {
    pub fn acquire(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        // SAFETY: the descriptor is owned by `file` and stays open for the call.
        if unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) } != 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock {
                return Err(ServerError::AlreadyRunning);
            }
            return Err(err.into());
        }
        debug!(path = %path.display(), "startup lock acquired");
        Ok(Self { file })
    }
}

impl Drop for StartupLock {
    fn drop(&mut self) {
        // SAFETY: the descriptor is still owned by `self.file`.
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
    }
}
