use std::cell::RefCell;
use std::io;
use std::os::fd::AsRawFd;
use std::rc::Rc;

use tracing::{debug, info, warn};

use crate::connection::ConnectionInfo;
use crate::error::Result;
use crate::reactor::{EventKind, PollReactor, Reactor};
use crate::server::acceptor::{self, Acceptor};
use crate::server::socket::Listener;
use crate::server::stats::{StatsSnapshot, WorkerStats};
use crate::server::template::WorkerTemplate;
use crate::supervisor::platform;

/// One worker process: a listening socket, its connections and a reactor.
pub struct Worker {
    template: WorkerTemplate,
    listener: Option<Listener>,
    server_name: String,
}

/// State shared by the accept callback and the signal callbacks.
struct Serving {
    name: String,
    listener: Option<Listener>,
    acceptor: Box<dyn Acceptor>,
    stats: Rc<WorkerStats>,
    next_id: u64,
}

impl Serving {
    /// Accepts until the backlog is empty.
    fn on_acceptable(&mut self, reactor: &mut dyn Reactor) {
        loop {
            let Some(listener) = self.listener.as_ref() else {
                return;
            };
            let accepted = match listener.accept() {
                Ok(accepted) => accepted,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!(worker = %self.name, error = %e, "accept failed");
                    return;
                }
            };

            self.next_id += 1;
            let info = ConnectionInfo::new(self.next_id, accepted.peer, accepted.local);
            debug!(worker = %self.name, id = info.id, peer = %info.peer, "accepted connection");
            if let Err(e) = self.acceptor.accept(reactor, accepted.transport, info) {
                debug!(worker = %self.name, error = %e, "failed to set up connection");
            }
        }
    }

    fn close_listener(&mut self, reactor: &mut dyn Reactor) {
        if let Some(listener) = self.listener.take() {
            reactor.remove(listener.as_raw_fd(), EventKind::Readable);
        }
    }

    fn stop(&mut self, reactor: &mut dyn Reactor, graceful: bool) {
        self.close_listener(reactor);
        if !graceful {
            info!(worker = %self.name, live = self.stats.live(), "stopping now");
            reactor.stop();
            return;
        }

        info!(worker = %self.name, live = self.stats.live(), "draining connections");
        if self.stats.begin_drain() {
            reactor.stop();
            return;
        }
        self.acceptor.drain(reactor);
    }

    fn report(&self) {
        let stats = self.stats.snapshot();
        info!(
            worker = %self.name,
            pid = platform::current_pid(),
            live = stats.live,
            accepted = stats.accepted,
            requests = stats.requests,
            protocol_errors = stats.protocol_errors,
            send_failures = stats.send_failures,
            "worker status"
        );
    }
}

impl Worker {
    pub fn new(template: WorkerTemplate, listener: Listener, server_name: impl Into<String>) -> Self {
        Self {
            template,
            listener: Some(listener),
            server_name: server_name.into(),
        }
    }

    pub fn template(&self) -> &WorkerTemplate {
        &self.template
    }

    pub fn local_addr(&self) -> Option<String> {
        self.listener.as_ref().map(Listener::local_addr)
    }

    /// Registers the listening socket and the worker's signal handlers.
    ///
    /// SIGINT stops now and SIGTERM drains first. The reload signals restart
    /// the worker the same way: SIGUSR1 now, SIGQUIT after draining. The
    /// supervisor refills the slot with the reloaded template.
    pub fn start(&mut self, reactor: &mut dyn Reactor) -> Result<Rc<WorkerStats>> {
        let stats = Rc::new(WorkerStats::new());
        let acceptor = acceptor::build(&self.template, stats.clone())?;
        let listener = self.listener.take();
        let fd = listener.as_ref().map(Listener::as_raw_fd);

        let serving = Rc::new(RefCell::new(Serving {
            name: self.template.name.clone(),
            listener,
            acceptor,
            stats: stats.clone(),
            next_id: 0,
        }));

        if let Some(fd) = fd {
            let state = serving.clone();
            reactor.add(
                fd,
                EventKind::Readable,
                Box::new(move |reactor, _fd| {
                    if let Ok(mut serving) = state.try_borrow_mut() {
                        serving.on_acceptable(reactor);
                    }
                }),
            );
        }

        for (signal, graceful) in [
            (libc::SIGINT, false),
            (libc::SIGTERM, true),
            (libc::SIGUSR1, false),
            (libc::SIGQUIT, true),
        ] {
            let state = serving.clone();
            reactor.add(
                signal,
                EventKind::Signal,
                Box::new(move |reactor, signal| {
                    if let Ok(mut serving) = state.try_borrow_mut() {
                        debug!(worker = %serving.name, signal, "signal received");
                        serving.stop(reactor, graceful);
                    }
                }),
            );
        }

        for signal in [libc::SIGUSR2, libc::SIGIO] {
            let state = serving.clone();
            reactor.add(
                signal,
                EventKind::Signal,
                Box::new(move |_reactor, _signal| {
                    if let Ok(serving) = state.try_borrow() {
                        serving.report();
                    }
                }),
            );
        }

        Ok(stats)
    }

    /// Runs the worker until a stop signal has been handled.
    pub fn run(mut self) -> Result<StatsSnapshot> {
        platform::set_process_title(&format!(
            "{}: worker {} {}",
            self.server_name, self.template.name, self.template.target
        ));

        let mut reactor = PollReactor::new();
        let stats = self.start(&mut reactor)?;
        info!(
            worker = %self.template.name,
            listen = %self.template.target,
            pid = platform::current_pid(),
            "worker started"
        );

        reactor.run_forever()?;

        let snapshot = stats.snapshot();
        if snapshot.live > 0 {
            warn!(worker = %self.template.name, live = snapshot.live, "exiting with open connections");
        }
        info!(worker = %self.template.name, requests = snapshot.requests, "worker stopped");
        Ok(snapshot)
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("template", &self.template)
            .field("listener", &self.listener)
            .finish()
    }
}
