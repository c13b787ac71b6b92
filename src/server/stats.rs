use std::cell::Cell;

/// Counters of one worker process. Never shared across processes.
#[derive(Debug, Default)]
pub struct WorkerStats {
    live: Cell<usize>,
    accepted: Cell<u64>,
    requests: Cell<u64>,
    protocol_errors: Cell<u64>,
    send_failures: Cell<u64>,
    draining: Cell<bool>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub live: usize,
    pub accepted: u64,
    pub requests: u64,
    pub protocol_errors: u64,
    pub send_failures: u64,
}

impl WorkerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.live.set(self.live.get() + 1);
        self.accepted.set(self.accepted.get() + 1);
    }

    /// Returns true when this was the last connection of a draining worker.
    pub fn connection_closed(&self) -> bool {
        let live = self.live.get().saturating_sub(1);
        self.live.set(live);
        self.draining.get() && live == 0
    }

    pub fn request(&self) {
        self.requests.set(self.requests.get() + 1);
    }

    pub fn protocol_error(&self) {
        self.protocol_errors.set(self.protocol_errors.get() + 1);
    }

    pub fn send_failed(&self) {
        self.send_failures.set(self.send_failures.get() + 1);
    }

    /// Marks the worker as draining. Returns true if nothing is left to drain.
    pub fn begin_drain(&self) -> bool {
        self.draining.set(true);
        self.live.get() == 0
    }

    pub fn is_draining(&self) -> bool {
        self.draining.get()
    }

    pub fn live(&self) -> usize {
        self.live.get()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            live: self.live.get(),
            accepted: self.accepted.get(),
            requests: self.requests.get(),
            protocol_errors: self.protocol_errors.get(),
            send_failures: self.send_failures.get(),
        }
    }
}
