use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::app::{self, Application};
use crate::connection::ConnectionLimits;
use crate::error::{Result, ServerError};
use crate::http::HttpOptions;
use crate::logging::LogConfig;
use crate::server::template::DEFAULT_BACKLOG;
use crate::server::{ListenTarget, Protocol, SocketOptions, WorkerTemplate};

pub const DEFAULT_LISTEN: &str = "127.0.0.1:8080";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub name: String,
    pub pid_file: Option<PathBuf>,
    pub daemonize: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            name: "prefork".to_string(),
            pid_file: None,
            daemonize: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub name: String,
    pub listen: String,
    pub count: usize,
    pub backlog: i32,
    pub reuse_port: bool,
    pub app: String,
    pub max_receive: usize,
    pub max_send: usize,
    pub http: HttpOptions,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let limits = ConnectionLimits::default();
        Self {
            name: String::new(),
            listen: String::new(),
            count: 1,
            backlog: DEFAULT_BACKLOG,
            reuse_port: false,
            app: "echo".to_string(),
            max_receive: limits.max_receive,
            max_send: limits.max_send,
            http: HttpOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerSection,
    pub log: LogConfig,
    pub workers: Vec<WorkerConfig>,
}

impl Config {
    /// Reads YAML from `path`, or serves `hello` over HTTP on `$LISTEN`
    /// when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let content = fs::read_to_string(path).map_err(|source| ServerError::ConfigRead {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_yaml(&content)
            }
            None => Ok(Self::from_env()),
        }
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_env() -> Self {
        let listen = std::env::var("LISTEN").unwrap_or_else(|_| DEFAULT_LISTEN.to_string());
        let listen = if listen.contains("://") {
            listen
        } else {
            format!("http://{listen}")
        };

        Self {
            workers: vec![WorkerConfig {
                name: "http".to_string(),
                listen,
                app: "hello".to_string(),
                ..WorkerConfig::default()
            }],
            ..Self::default()
        }
    }

    /// Validates the worker list and resolves it into templates.
    pub fn templates(&self) -> Result<Vec<WorkerTemplate>> {
        if self.workers.is_empty() {
            return Err(ServerError::InvalidConfig("no workers configured".into()));
        }

        let mut names = HashSet::new();
        self.workers
            .iter()
            .map(|worker| {
                if worker.name.is_empty() {
                    return Err(ServerError::InvalidConfig("worker without a name".into()));
                }
                if !names.insert(worker.name.as_str()) {
                    return Err(ServerError::InvalidConfig(format!(
                        "duplicate worker name `{}`",
                        worker.name
                    )));
                }
                worker.template()
            })
            .collect()
    }
}

impl WorkerConfig {
    pub fn template(&self) -> Result<WorkerTemplate> {
        if self.count == 0 {
            return Err(ServerError::InvalidConfig(format!(
                "worker `{}` needs a count of at least 1",
                self.name
            )));
        }

        let target: ListenTarget = self.listen.parse()?;
        let app = app::builtin(&self.app).ok_or_else(|| ServerError::UnknownApp(self.app.clone()))?;
        if !supports(app.as_ref(), target.protocol) {
            return Err(ServerError::UnsupportedProtocol {
                app: self.app.clone(),
                protocol: target.protocol.to_string(),
            });
        }

        Ok(WorkerTemplate {
            name: self.name.clone(),
            target,
            count: self.count,
            socket: SocketOptions {
                backlog: self.backlog,
                reuse_port: self.reuse_port,
            },
            limits: ConnectionLimits {
                max_receive: self.max_receive,
                max_send: self.max_send,
            },
            http: self.http,
            app,
        })
    }
}

fn supports(app: &dyn Application, protocol: Protocol) -> bool {
    match protocol {
        Protocol::Tcp => app.raw().is_some(),
        Protocol::Text => app.text().is_some(),
        Protocol::Frame => app.frame().is_some(),
        Protocol::Http => app.http().is_some(),
    }
}
