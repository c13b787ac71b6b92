use std::io::Write;
use std::path::PathBuf;

use prefork::config::{Config, DEFAULT_LISTEN};
use prefork::error::ServerError;
use prefork::logging::LogLevel;
use prefork::server::{ListenAddress, Protocol};

const FULL: &str = r#"
server:
  name: edge
  pid_file: /tmp/edge.pid
  daemonize: true
log:
  dir: /var/log/edge
  level: debug
workers:
  - name: web
    listen: http://0.0.0.0:8080
    count: 4
    app: hello
    reuse_port: true
    http:
      max_header: 8192
      gzip: false
  - name: lines
    listen: text:///tmp/edge-lines.sock
    max_receive: 1024
"#;

#[test]
fn test_config_default_address() {
    // When LISTEN env var is not set, should use default
    unsafe {
        std::env::remove_var("LISTEN");
    }
    let cfg = Config::load(None).unwrap();
    assert_eq!(cfg.workers.len(), 1);
    assert_eq!(cfg.workers[0].listen, format!("http://{DEFAULT_LISTEN}"));
    assert_eq!(cfg.workers[0].app, "hello");
}

#[test]
fn test_config_full_yaml() {
    let cfg = Config::from_yaml(FULL).unwrap();

    assert_eq!(cfg.server.name, "edge");
    assert_eq!(cfg.server.pid_file, Some(PathBuf::from("/tmp/edge.pid")));
    assert!(cfg.server.daemonize);
    assert_eq!(cfg.log.level, LogLevel::Debug);

    let web = &cfg.workers[0];
    assert_eq!(web.count, 4);
    assert!(web.reuse_port);
    assert_eq!(web.http.max_header, 8192);
    assert_eq!(web.http.max_request_line, 4096);
    assert!(!web.http.gzip);

    let lines = &cfg.workers[1];
    assert_eq!(lines.count, 1);
    assert_eq!(lines.app, "echo");
    assert_eq!(lines.max_receive, 1024);
    assert_eq!(lines.max_send, 1 << 20);
    assert_eq!(lines.backlog, 102_400);
}

#[test]
fn test_config_templates() {
    let templates = Config::from_yaml(FULL).unwrap().templates().unwrap();

    assert_eq!(templates.len(), 2);
    assert_eq!(templates[0].protocol(), Protocol::Http);
    assert_eq!(templates[0].app.name(), "hello");
    assert!(templates[0].socket.reuse_port);
    assert_eq!(templates[1].protocol(), Protocol::Text);
    assert_eq!(
        templates[1].target.address,
        ListenAddress::Unix(PathBuf::from("/tmp/edge-lines.sock"))
    );
    assert_eq!(templates[1].limits.max_receive, 1024);
}

#[test]
fn test_config_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(FULL.as_bytes()).unwrap();

    let cfg = Config::load(Some(file.path())).unwrap();
    assert_eq!(cfg.workers.len(), 2);
}

#[test]
fn test_config_missing_file() {
    let result = Config::load(Some(std::path::Path::new("/nonexistent/prefork.yaml")));
    assert!(matches!(result, Err(ServerError::ConfigRead { .. })));
}

#[test]
fn test_config_rejects_duplicate_names() {
    let yaml = "workers:\n  - name: a\n    listen: tcp://127.0.0.1:9000\n  - name: a\n    listen: tcp://127.0.0.1:9001\n";
    let result = Config::from_yaml(yaml).unwrap().templates();
    assert!(matches!(result, Err(ServerError::InvalidConfig(_))));
}

#[test]
fn test_config_rejects_zero_count() {
    let yaml = "workers:\n  - name: a\n    listen: tcp://127.0.0.1:9000\n    count: 0\n";
    let result = Config::from_yaml(yaml).unwrap().templates();
    assert!(matches!(result, Err(ServerError::InvalidConfig(_))));
}

#[test]
fn test_config_rejects_unknown_app() {
    let yaml = "workers:\n  - name: a\n    listen: tcp://127.0.0.1:9000\n    app: proxy\n";
    let result = Config::from_yaml(yaml).unwrap().templates();
    assert!(matches!(result, Err(ServerError::UnknownApp(name)) if name == "proxy"));
}

#[test]
fn test_config_rejects_protocol_the_app_lacks() {
    let yaml = "workers:\n  - name: a\n    listen: frame://127.0.0.1:9000\n    app: hello\n";
    let result = Config::from_yaml(yaml).unwrap().templates();
    assert!(matches!(result, Err(ServerError::UnsupportedProtocol { .. })));
}

#[test]
fn test_config_rejects_bad_listen_target() {
    let yaml = "workers:\n  - name: a\n    listen: udp://127.0.0.1:53\n";
    let result = Config::from_yaml(yaml).unwrap().templates();
    assert!(matches!(result, Err(ServerError::InvalidTarget { .. })));
}

#[test]
fn test_config_rejects_empty_worker_list() {
    let result = Config::from_yaml("server:\n  name: idle\n").unwrap().templates();
    assert!(matches!(result, Err(ServerError::InvalidConfig(_))));
}
