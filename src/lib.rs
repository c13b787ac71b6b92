//! prefork - multi-process event-driven server core
//!
//! A supervisor forks worker processes that share listening sockets; each
//! worker runs a single-threaded reactor serving raw TCP, text-line, framed
//! or HTTP connections.

pub mod app;
pub mod cli;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod http;
pub mod logging;
pub mod reactor;
pub mod server;
pub mod supervisor;
