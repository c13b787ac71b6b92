use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use prefork::cli::Cli;
use prefork::config::Config;
use prefork::logging;
use prefork::supervisor::control::{self, Outcome};
use prefork::supervisor::daemon::daemonize;
use prefork::supervisor::pidfile::{PidFile, StartupLock};
use prefork::supervisor::{Role, Supervisor, SystemProcess, TemplateLoader, platform};

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            println!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> anyhow::Result<ExitCode> {
    platform::ensure_supported()?;

    let cli = Cli::parse();
    let invocation = cli.invocation()?;
    let config = Config::load(cli.config.as_deref())?;
    logging::init(&config.log)?;
    platform::ignore_sigpipe();

    let program = std::env::current_exe().context("cannot locate the running executable")?;
    let pid_file = match &config.server.pid_file {
        Some(path) => PidFile::new(path),
        None => PidFile::default_for(&program),
    };

    let lock = StartupLock::acquire(&program)?;
    let mut process = SystemProcess::new();
    if let Outcome::Exit(message) = control::execute(invocation, &pid_file, &mut process)? {
        println!("{message}");
        return Ok(ExitCode::SUCCESS);
    }

    let templates = config.templates()?;
    let config_path = cli.config.clone();
    let loader: TemplateLoader = Box::new(move || Config::load(config_path.as_deref())?.templates());
    let mut supervisor = Supervisor::new(config.server.name.clone(), process, templates)?
        .with_loader(loader)
        .with_pid_file(pid_file.clone());

    if cli.daemon || config.server.daemonize {
        daemonize()?;
    }
    pid_file.write(platform::current_pid())?;
    // Workers must not inherit the lock.
    drop(lock);

    match supervisor.run()? {
        Role::Worker(worker) => {
            worker.run()?;
            Ok(ExitCode::SUCCESS)
        }
        Role::Exit => Ok(ExitCode::SUCCESS),
    }
}
