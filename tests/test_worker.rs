use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use prefork::config::Config;
use prefork::reactor::{PollReactor, Reactor};
use prefork::server::{Listener, Worker};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

/// A worker serving one template on an ephemeral port from its own thread.
struct Running {
    addr: String,
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Running {
    fn spawn(listen: &str, app: &str) -> Self {
        let yaml = format!("workers:\n  - name: test\n    listen: {listen}\n    app: {app}\n");
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let (tx, rx) = mpsc::channel();

        let handle = thread::spawn(move || {
            let template = Config::from_yaml(&yaml).unwrap().templates().unwrap().remove(0);
            let listener = Listener::bind(&template.target, &template.socket).unwrap();
            let mut worker = Worker::new(template, listener, "test");
            tx.send(worker.local_addr().unwrap()).unwrap();

            let mut reactor = PollReactor::new();
            worker.start(&mut reactor).unwrap();
            while !flag.load(Ordering::Relaxed) && !reactor.is_stopped() {
                reactor.run_once(Duration::from_millis(10)).unwrap();
            }
        });

        let addr = rx.recv_timeout(WAIT).unwrap();
        Self {
            addr,
            stop,
            handle: Some(handle),
        }
    }
}

impl Drop for Running {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

async fn read_until(stream: &mut TcpStream, needle: &[u8], count: usize) -> Vec<u8> {
    let mut received = Vec::new();
    let mut chunk = [0u8; 4096];
    while received.windows(needle.len()).filter(|w| *w == needle).count() < count {
        let n = timeout(WAIT, stream.read(&mut chunk)).await.unwrap().unwrap();
        if n == 0 {
            break;
        }
        received.extend_from_slice(&chunk[..n]);
    }
    received
}

#[tokio::test]
async fn test_hello_over_http() {
    let worker = Running::spawn("http://127.0.0.1:0", "hello");
    let mut stream = TcpStream::connect(&worker.addr).await.unwrap();

    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = Vec::new();
    timeout(WAIT, stream.read_to_end(&mut response)).await.unwrap().unwrap();
    let text = String::from_utf8(response).unwrap();

    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(text.contains("Content-Type: text/html; charset=utf-8\r\n"));
    assert!(text.ends_with("\r\n\r\nHello from prefork\n"));
}

#[tokio::test]
async fn test_keep_alive_pipelining() {
    let worker = Running::spawn("http://127.0.0.1:0", "hello");
    let mut stream = TcpStream::connect(&worker.addr).await.unwrap();

    stream
        .write_all(b"GET /a HTTP/1.1\r\nHost: localhost\r\n\r\nGET /b HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();
    let received = read_until(&mut stream, b"Hello from prefork\n", 2).await;
    let text = String::from_utf8(received).unwrap();

    assert_eq!(text.matches("HTTP/1.1 200 OK").count(), 2);
}

#[tokio::test]
async fn test_http_echo_returns_body() {
    let worker = Running::spawn("http://127.0.0.1:0", "echo");
    let mut stream = TcpStream::connect(&worker.addr).await.unwrap();

    stream
        .write_all(
            b"POST /echo HTTP/1.1\r\nHost: localhost\r\nContent-Type: text/plain\r\nContent-Length: 4\r\nConnection: close\r\n\r\nping",
        )
        .await
        .unwrap();
    let mut response = Vec::new();
    timeout(WAIT, stream.read_to_end(&mut response)).await.unwrap().unwrap();
    let text = String::from_utf8(response).unwrap();

    assert!(text.contains("Content-Type: text/plain\r\n"));
    assert!(text.ends_with("\r\n\r\nping"));
}

#[tokio::test]
async fn test_oversized_request_line() {
    let worker = Running::spawn("http://127.0.0.1:0", "hello");
    let mut stream = TcpStream::connect(&worker.addr).await.unwrap();

    let mut line = b"GET /".to_vec();
    line.extend(std::iter::repeat_n(b'a', 5000));
    stream.write_all(&line).await.unwrap();

    let mut response = Vec::new();
    timeout(WAIT, stream.read_to_end(&mut response)).await.unwrap().unwrap();
    assert_eq!(response, b"HTTP/1.1 414 Request-URI Too Long\r\n\r\n".to_vec());
}

#[tokio::test]
async fn test_text_echo() {
    let worker = Running::spawn("text://127.0.0.1:0", "echo");
    let mut stream = TcpStream::connect(&worker.addr).await.unwrap();

    stream.write_all(b"first\nsecond\n").await.unwrap();
    let received = read_until(&mut stream, b"\r\n", 2).await;

    assert_eq!(received, b"first\r\nsecond\r\n".to_vec());
}

#[tokio::test]
async fn test_frame_echo() {
    let worker = Running::spawn("frame://127.0.0.1:0", "echo");
    let mut stream = TcpStream::connect(&worker.addr).await.unwrap();

    stream.write_all(b"\x00\x00\x00\x07abc").await.unwrap();
    let mut reply = [0u8; 7];
    timeout(WAIT, stream.read_exact(&mut reply)).await.unwrap().unwrap();

    assert_eq!(&reply, b"\x00\x00\x00\x07abc");
}

#[tokio::test]
async fn test_connections_are_independent() {
    let worker = Running::spawn("text://127.0.0.1:0", "echo");
    let mut first = TcpStream::connect(&worker.addr).await.unwrap();
    let mut second = TcpStream::connect(&worker.addr).await.unwrap();

    first.write_all(b"from-").await.unwrap();
    second.write_all(b"other\n").await.unwrap();
    first.write_all(b"first\n").await.unwrap();

    assert_eq!(read_until(&mut second, b"\r\n", 1).await, b"other\r\n".to_vec());
    assert_eq!(read_until(&mut first, b"\r\n", 1).await, b"from-first\r\n".to_vec());
}

#[test]
fn test_one_readiness_event_accepts_whole_backlog() {
    let template = Config::from_yaml("workers:\n  - name: test\n    listen: text://127.0.0.1:0\n")
        .unwrap()
        .templates()
        .unwrap()
        .remove(0);
    let listener = Listener::bind(&template.target, &template.socket).unwrap();
    let mut worker = Worker::new(template, listener, "test");
    let addr = worker.local_addr().unwrap();

    let mut reactor = PollReactor::new();
    let stats = worker.start(&mut reactor).unwrap();
    let _clients: Vec<std::net::TcpStream> = (0..3)
        .map(|_| std::net::TcpStream::connect(&addr).unwrap())
        .collect();

    reactor.run_once(Duration::from_millis(500)).unwrap();

    assert_eq!(stats.snapshot().accepted, 3);
    assert_eq!(stats.live(), 3);
}
