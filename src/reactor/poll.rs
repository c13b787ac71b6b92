use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io;
use std::os::fd::RawFd;
use std::rc::Rc;
use std::time::Duration;

use tracing::{debug, error, warn};

use super::{Callback, EventKind, Reactor, SignalQueue};
use crate::error::Result;

/// Registrations above this count still work but are reported, since the
/// classic `select` limit is where deployments should switch backends.
pub const SOFT_FD_LIMIT: usize = 1024;

/// Default backend: rebuilds a `poll(2)` set from the event table every tick.
pub struct PollReactor {
    events: BTreeMap<(RawFd, EventKind), Rc<RefCell<Callback>>>,
    signals: Option<SignalQueue>,
    stopped: bool,
}

impl PollReactor {
    pub fn new() -> Self {
        Self {
            events: BTreeMap::new(),
            signals: None,
            stopped: false,
        }
    }

    fn install_signal(&mut self, signal: i32) -> io::Result<()> {
        let queue = match self.signals.take() {
            Some(queue) => queue,
            None => SignalQueue::new()?,
        };
        self.signals.insert(queue).add(signal)
    }

    fn dispatch_signals(&mut self) {
        let pending = match self.signals.as_mut() {
            Some(queue) => queue.pending(),
            None => return,
        };
        for signal in pending {
            self.dispatch(signal, EventKind::Signal);
        }
    }

    fn dispatch(&mut self, fd: RawFd, kind: EventKind) {
        let Some(callback) = self.events.get(&(fd, kind)).cloned() else {
            return;
        };
        let Ok(mut callback) = callback.try_borrow_mut() else {
            debug!(fd, ?kind, "callback already running, skipped");
            return;
        };
        let reactor: &mut dyn Reactor = self;
        (*callback)(reactor, fd);
    }

    fn poll_set(&self) -> Vec<libc::pollfd> {
        let mut set: Vec<libc::pollfd> = Vec::new();
        for &(fd, kind) in self.events.keys() {
            let events = match kind {
                EventKind::Readable => libc::POLLIN,
                EventKind::Writable => libc::POLLOUT,
                EventKind::Exceptional => libc::POLLPRI,
                EventKind::Signal => continue,
            };
            // keys are ordered by fd, so one fd's kinds are adjacent
            match set.last_mut() {
                Some(last) if last.fd == fd => last.events |= events,
                _ => set.push(libc::pollfd { fd, events, revents: 0 }),
            }
        }
        set
    }

    fn forget_fd(&mut self, fd: RawFd) {
        self.events
            .retain(|&(registered, kind), _| registered != fd || kind == EventKind::Signal);
    }
}

impl Default for PollReactor {
    fn default() -> Self {
        Self::new()
    }
}

impl Reactor for PollReactor {
    fn add(&mut self, fd: RawFd, kind: EventKind, callback: Callback) {
        match kind {
            EventKind::Signal => {
                if let Err(e) = self.install_signal(fd) {
                    error!(signal = fd, error = %e, "failed to install signal handler");
                    return;
                }
            }
            EventKind::Readable | EventKind::Writable => {
                if !self.events.contains_key(&(fd, kind)) && self.registered(kind) >= SOFT_FD_LIMIT {
                    warn!(?kind, limit = SOFT_FD_LIMIT, "Upper limit {} connections", SOFT_FD_LIMIT);
                }
            }
            EventKind::Exceptional => {}
        }
        self.events.insert((fd, kind), Rc::new(RefCell::new(callback)));
    }

    fn remove(&mut self, fd: RawFd, kind: EventKind) {
        self.events.remove(&(fd, kind));
    }

    fn run_once(&mut self, timeout: Duration) -> Result<()> {
        if self.stopped {
            return Ok(());
        }

        self.dispatch_signals();

        let mut set = self.poll_set();
        let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as libc::c_int;
        // SAFETY: `set` is a live, correctly sized buffer of pollfd for the whole call.
        let ready = unsafe { libc::poll(set.as_mut_ptr(), set.len() as libc::nfds_t, timeout_ms) };
        if ready < 0 {
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err.into());
            }
        }

        self.dispatch_signals();

        if ready <= 0 {
            return Ok(());
        }

        for pollfd in set.iter().filter(|p| p.revents != 0) {
            let (fd, revents) = (pollfd.fd, pollfd.revents);
            if revents & libc::POLLNVAL != 0 {
                warn!(fd, "polled a closed descriptor, dropping its registrations");
                self.forget_fd(fd);
                continue;
            }
            if revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0 {
                self.dispatch(fd, EventKind::Readable);
            }
            if revents & (libc::POLLOUT | libc::POLLHUP | libc::POLLERR) != 0 {
                self.dispatch(fd, EventKind::Writable);
            }
            if revents & libc::POLLPRI != 0 {
                self.dispatch(fd, EventKind::Exceptional);
            }
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.stopped = true;
    }

    fn is_stopped(&self) -> bool {
        self.stopped
    }

    fn registered(&self, kind: EventKind) -> usize {
        self.events.keys().filter(|(_, k)| *k == kind).count()
    }
}

impl std::fmt::Debug for PollReactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollReactor")
            .field("registrations", &self.events.keys().collect::<Vec<_>>())
            .field("signals", &self.signals)
            .field("stopped", &self.stopped)
            .finish()
    }
}
