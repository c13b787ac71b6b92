//! Single-threaded readiness event loop.
//!
//! A [`Reactor`] maps `(fd, kind)` pairs to callbacks and dispatches them when
//! the multiplexing backend reports the descriptor ready. Signals are a fourth
//! event kind: the OS handler only enqueues the signal number, and the loop
//! runs the callback between waits, never inside the interrupt context.
//!
//! ```text
//!   ┌──────────────────────────┐
//!   │ drain pending signals    │
//!   ├──────────────────────────┤
//!   │ build fd set from table  │
//!   ├──────────────────────────┤
//!   │ wait (bounded timeout)   │ ← only suspension point
//!   ├──────────────────────────┤
//!   │ drain pending signals    │
//!   ├──────────────────────────┤
//!   │ dispatch ready callbacks │ ← read before write per fd
//!   └──────────────────────────┘
//! ```
//!
//! The trait is the seam for alternate backends; connections and workers only
//! ever see `&mut dyn Reactor`.

pub mod poll;
pub mod signals;

use std::os::fd::RawFd;
use std::time::Duration;

use crate::error::Result;

pub use poll::PollReactor;
pub use signals::SignalQueue;

/// Interest kinds a callback can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    Readable,
    Writable,
    Exceptional,
    /// The "fd" of a signal registration is the signal number.
    Signal,
}

/// Callback invoked with the reactor that dispatched it and the ready fd (or signal number).
pub type Callback = Box<dyn FnMut(&mut dyn Reactor, RawFd)>;

/// How long a single wait may block when nothing is ready.
pub const DEFAULT_WAIT: Duration = Duration::from_secs(1);

pub trait Reactor {
    /// Registers `callback` for `(fd, kind)`, replacing any previous one.
    fn add(&mut self, fd: RawFd, kind: EventKind, callback: Callback);

    /// Unregisters `(fd, kind)`. Absent registrations are ignored.
    fn remove(&mut self, fd: RawFd, kind: EventKind);

    /// Runs one loop iteration, waiting at most `timeout` for readiness.
    fn run_once(&mut self, timeout: Duration) -> Result<()>;

    /// Makes [`Reactor::run_forever`] return after the current iteration.
    fn stop(&mut self);

    fn is_stopped(&self) -> bool;

    /// Number of live registrations of `kind`.
    fn registered(&self, kind: EventKind) -> usize;

    fn run_forever(&mut self) -> Result<()> {
        while !self.is_stopped() {
            self.run_once(DEFAULT_WAIT)?;
        }
        Ok(())
    }
}
