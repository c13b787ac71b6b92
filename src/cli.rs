use std::path::PathBuf;

use clap::Parser;

use crate::error::Result;
use crate::supervisor::control::{Command, Invocation, Mode};

/// Multi-process event-driven server.
#[derive(Debug, Parser)]
#[command(about)]
pub struct Cli {
    /// start, stop, restart, reload, status or connections
    #[arg(default_value = "start")]
    pub command: String,

    /// Stop, restart or reload gracefully
    #[arg(short, long)]
    pub graceful: bool,

    /// YAML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Detach from the terminal after starting
    #[arg(short, long)]
    pub daemon: bool,
}

impl Cli {
    pub fn invocation(&self) -> Result<Invocation> {
        let command: Command = self.command.parse()?;
        let mode = if self.graceful { Mode::Graceful } else { Mode::Immediate };
        Ok(Invocation::new(command, mode))
    }
}
