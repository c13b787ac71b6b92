//! Deferred signal delivery.
//!
//! The OS handler installed by `signal-hook` only writes to a self-pipe; the
//! numbers are collected here and handed to the owner between waits.

use std::collections::BTreeSet;
use std::io;

use signal_hook::iterator::Signals;

pub struct SignalQueue {
    signals: Signals,
    registered: BTreeSet<i32>,
}

impl SignalQueue {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            signals: Signals::new(Vec::<i32>::new())?,
            registered: BTreeSet::new(),
        })
    }

    /// Starts queueing `signal`. Registering the same signal twice is a no-op.
    pub fn add(&mut self, signal: i32) -> io::Result<()> {
        if self.registered.insert(signal) {
            if let Err(e) = self.signals.add_signal(signal) {
                self.registered.remove(&signal);
                return Err(e);
            }
        }
        Ok(())
    }

    pub fn is_registered(&self, signal: i32) -> bool {
        self.registered.contains(&signal)
    }

    /// Drains whatever arrived since the last call without blocking.
    pub fn pending(&mut self) -> Vec<i32> {
        self.signals.pending().collect()
    }

    /// Blocks until at least one registered signal arrives.
    pub fn wait(&mut self) -> Vec<i32> {
        self.signals.wait().collect()
    }
}

impl Drop for SignalQueue {
    fn drop(&mut self) {
        self.signals.handle().close();
    }
}

impl std::fmt::Debug for SignalQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalQueue")
            .field("registered", &self.registered)
            .finish()
    }
}
