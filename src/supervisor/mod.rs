//! The master process: provisions worker processes, watches them and
//! relays administrative signals.
//!
//! # Supervisor State Machine
//!
//! ```text
//!   Starting ──► Running ◄──► Reloading
//!                   │
//!                   ▼
//!             ShuttingDown ──► (all children gone) ──► exit
//! ```
//!
//! The monitor loop reaps exited children, refills their slots unless
//! shutting down, then blocks until the next signal (SIGCHLD included).

pub mod control;
pub mod daemon;
pub mod pidfile;
pub mod platform;
pub mod process;
pub mod slots;

use tracing::{debug, error, info, warn};

use crate::error::{Result, ServerError};
use crate::server::{ListenAddress, Listener, Worker, WorkerTemplate};
use control::{Mode, stop_signal};
use pidfile::PidFile;
use process::{ChildExit, Fork, ProcessControl};
use slots::SlotTable;

pub use control::{Command, Invocation, Outcome};
pub use process::SystemProcess;

/// Signals the master queues and handles between waits.
pub const MASTER_SIGNALS: [i32; 7] = [
    libc::SIGINT,
    libc::SIGTERM,
    libc::SIGQUIT,
    libc::SIGUSR1,
    libc::SIGUSR2,
    libc::SIGIO,
    libc::SIGCHLD,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Starting,
    Running,
    Reloading,
    ShuttingDown,
}

/// What the current process should do once [`Supervisor::run`] returns.
#[derive(Debug)]
pub enum Role {
    /// This is a freshly forked child; run the worker and exit.
    Worker(Worker),
    /// The master finished its shutdown.
    Exit,
}

/// Produces the current set of templates; invoked again on reload.
pub type TemplateLoader = Box<dyn FnMut() -> Result<Vec<WorkerTemplate>>>;

struct Entry {
    template: WorkerTemplate,
    listener: Listener,
}

enum Source {
    Reuse(usize),
    Fresh(Listener),
}

pub struct Supervisor<P: ProcessControl> {
    name: String,
    process: P,
    state: SupervisorState,
    entries: Vec<Entry>,
    slots: SlotTable,
    loader: Option<TemplateLoader>,
    pid_file: Option<PidFile>,
}

/// Signal telling children to restart for a reload in `mode`.
pub fn child_reload_signal(mode: Mode) -> i32 {
    match mode {
        Mode::Immediate => libc::SIGUSR1,
        Mode::Graceful => libc::SIGQUIT,
    }
}

impl<P: ProcessControl> Supervisor<P> {
    /// Binds every template's listener. Any bind failure is fatal.
    pub fn new(name: impl Into<String>, process: P, templates: Vec<WorkerTemplate>) -> Result<Self> {
        let mut entries = Vec::with_capacity(templates.len());
        let mut slots = SlotTable::new();
        for template in templates {
            let listener = Listener::bind(&template.target, &template.socket)?;
            info!(
                worker = %template.name,
                listen = %template.target,
                address = %listener.local_addr(),
                count = template.count,
                "listening"
            );
            slots.resize(&template.name, template.count);
            entries.push(Entry { template, listener });
        }

        Ok(Self {
            name: name.into(),
            process,
            state: SupervisorState::Starting,
            entries,
            slots,
            loader: None,
            pid_file: None,
        })
    }

    pub fn with_loader(mut self, loader: TemplateLoader) -> Self {
        self.loader = Some(loader);
        self
    }

    /// The pid file is removed once shutdown completes.
    pub fn with_pid_file(mut self, pid_file: PidFile) -> Self {
        self.pid_file = Some(pid_file);
        self
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn slots(&self) -> &SlotTable {
        &self.slots
    }

    pub fn process(&self) -> &P {
        &self.process
    }

    pub fn process_mut(&mut self) -> &mut P {
        &mut self.process
    }

    pub fn templates(&self) -> impl Iterator<Item = &WorkerTemplate> {
        self.entries.iter().map(|entry| &entry.template)
    }

    pub fn local_addr(&self, name: &str) -> Option<String> {
        self.entries
            .iter()
            .find(|entry| entry.template.name == name)
            .map(|entry| entry.listener.local_addr())
    }

    /// Provisions every slot, then monitors until shutdown completes.
    pub fn run(&mut self) -> Result<Role> {
        self.start()?;
        if let Some(worker) = self.fork_workers()? {
            return Ok(Role::Worker(worker));
        }
        info!(master = %self.name, pid = platform::current_pid(), workers = self.slots.live(), "master running");

        loop {
            if let Some(role) = self.monitor_once()? {
                return Ok(role);
            }
        }
    }

    /// Installs the signal queue and enters `Running`.
    pub fn start(&mut self) -> Result<()> {
        self.process.listen(&MASTER_SIGNALS).map_err(ServerError::Signal)?;
        platform::set_process_title(&format!("{}: master", self.name));
        self.state = SupervisorState::Running;
        Ok(())
    }

    /// Fills every vacant slot. In a forked child this returns its worker.
    pub fn fork_workers(&mut self) -> Result<Option<Worker>> {
        for index in 0..self.entries.len() {
            let name = self.entries[index].template.name.clone();
            for slot in self.slots.vacancies(&name) {
                match self.process.fork().map_err(ServerError::Fork)? {
                    Fork::Parent(pid) => {
                        debug!(worker = %name, slot, pid, "worker forked");
                        self.slots.occupy(&name, slot, pid);
                    }
                    Fork::Child => return self.become_worker(index).map(Some),
                }
            }
        }
        Ok(None)
    }

    /// One monitor iteration: reap and refill, finish if shut down, then wait
    /// for signals and handle them.
    pub fn monitor_once(&mut self) -> Result<Option<Role>> {
        if let Some(worker) = self.reap_children()? {
            return Ok(Some(Role::Worker(worker)));
        }

        if self.state == SupervisorState::ShuttingDown && self.slots.is_empty() {
            self.finish();
            return Ok(Some(Role::Exit));
        }

        for signal in self.process.wait_signals() {
            self.handle_signal(signal);
        }
        Ok(None)
    }

    pub fn handle_signal(&mut self, signal: i32) {
        match signal {
            libc::SIGINT => self.stop(Mode::Immediate),
            libc::SIGTERM => self.stop(Mode::Graceful),
            libc::SIGQUIT => self.reload(Mode::Immediate),
            libc::SIGUSR1 => self.reload(Mode::Graceful),
            libc::SIGUSR2 => self.report_status(),
            libc::SIGIO => self.report_connections(),
            libc::SIGCHLD => {}
            other => debug!(signal = other, "ignored signal"),
        }
    }

    pub fn stop(&mut self, mode: Mode) {
        info!(?mode, workers = self.slots.live(), "master stopping");
        self.state = SupervisorState::ShuttingDown;
        self.broadcast(stop_signal(mode));
    }

    /// Re-reads the templates and restarts every child. The running
    /// configuration is kept when loading or binding fails.
    pub fn reload(&mut self, mode: Mode) {
        if self.state == SupervisorState::ShuttingDown {
            debug!("reload ignored while shutting down");
            return;
        }
        let Some(loader) = self.loader.as_mut() else {
            warn!("no configuration source, reload ignored");
            return;
        };

        self.state = SupervisorState::Reloading;
        info!(?mode, "master reloading");
        let loaded = loader();
        match loaded.and_then(|templates| self.apply(templates)) {
            Ok(()) => self.broadcast(child_reload_signal(mode)),
            Err(e) => error!(error = %e, "reload abandoned, keeping the running configuration"),
        }
        self.state = SupervisorState::Running;
    }

    fn apply(&mut self, templates: Vec<WorkerTemplate>) -> Result<()> {
        let mut claimed = vec![false; self.entries.len()];
        let mut sources = Vec::with_capacity(templates.len());
        for template in &templates {
            let reusable = (0..self.entries.len())
                .find(|&i| !claimed[i] && self.entries[i].template.same_listener(template));
            match reusable {
                Some(i) => {
                    claimed[i] = true;
                    sources.push(Source::Reuse(i));
                }
                None => sources.push(Source::Fresh(Listener::bind(&template.target, &template.socket)?)),
            }
        }

        let mut old: Vec<Option<Entry>> = self.entries.drain(..).map(Some).collect();
        for (template, source) in templates.into_iter().zip(sources) {
            let listener = match source {
                Source::Fresh(listener) => {
                    info!(worker = %template.name, listen = %template.target, "listener bound");
                    listener
                }
                Source::Reuse(i) => match old[i].take() {
                    Some(entry) => entry.listener,
                    None => continue,
                },
            };
            self.slots.resize(&template.name, template.count);
            self.entries.push(Entry { template, listener });
        }

        for name in self.slots.names() {
            if !self.entries.iter().any(|entry| entry.template.name == name) {
                info!(worker = %name, "worker removed");
                self.slots.resize(&name, 0);
            }
        }
        Ok(())
    }

    fn reap_children(&mut self) -> Result<Option<Worker>> {
        loop {
            match self.process.reap() {
                Ok(Some(exit)) => self.on_child_exit(exit),
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "waitpid failed");
                    break;
                }
            }
        }

        if self.state == SupervisorState::ShuttingDown {
            return Ok(None);
        }
        self.fork_workers()
    }

    fn on_child_exit(&mut self, exit: ChildExit) {
        match self.slots.release(exit.pid) {
            Some((name, slot)) if exit.status.success() => {
                debug!(worker = %name, slot, pid = exit.pid, "worker exited");
            }
            Some((name, slot)) => {
                warn!(worker = %name, slot, pid = exit.pid, status = ?exit.status, "worker exited abnormally");
            }
            None => debug!(pid = exit.pid, "reaped unknown child"),
        }
    }

    fn broadcast(&mut self, signal: i32) {
        for pid in self.slots.pids() {
            if let Err(e) = self.process.signal(pid, signal) {
                debug!(pid, signal, error = %e, "signal not delivered");
            }
        }
    }

    fn report_status(&mut self) {
        info!(
            master = %self.name,
            pid = platform::current_pid(),
            state = ?self.state,
            workers = self.slots.live(),
            "master status"
        );
        for entry in &self.entries {
            let name = &entry.template.name;
            info!(
                worker = %name,
                listen = %entry.template.target,
                capacity = self.slots.capacity(name),
                pids = ?self.slots.seats(name),
                "worker slots"
            );
        }
        self.broadcast(libc::SIGUSR2);
    }

    fn report_connections(&mut self) {
        info!(workers = self.slots.live(), "connection report requested");
        self.broadcast(libc::SIGIO);
    }

    /// Leaves supervisor duties behind in a forked child.
    fn become_worker(&mut self, index: usize) -> Result<Worker> {
        let entry = self.entries.swap_remove(index);
        self.entries.clear();
        self.slots.clear();
        self.pid_file = None;
        self.loader = None;
        self.process.detach();
        Ok(Worker::new(entry.template, entry.listener, self.name.clone()))
    }

    fn finish(&mut self) {
        for entry in self.entries.drain(..) {
            if let ListenAddress::Unix(path) = &entry.template.target.address {
                drop(entry.listener);
                if let Err(e) = std::fs::remove_file(path) {
                    debug!(path = %path.display(), error = %e, "socket file not removed");
                }
            }
        }
        if let Some(pid_file) = self.pid_file.take() {
            if let Err(e) = pid_file.remove() {
                warn!(error = %e, "pid file not removed");
            }
        }
        info!(master = %self.name, "master stopped");
    }
}
