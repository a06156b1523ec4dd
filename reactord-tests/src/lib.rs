//! Integration-test support: a raw TCP client and a harness that boots
//! a real `Server` on a loopback port and tears it down again.

use reactord::handlers::{Echo, Health};
use reactord::router::EntrySpec;
use reactord::{Config, Server};
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Build the same default route table the binary registers, so
/// integration tests exercise real handlers rather than stubs.
pub fn default_entries() -> Vec<EntrySpec> {
    vec![
        EntrySpec {
            prefix: b"/health".to_vec(),
            handler: Box::new(Health),
            args: Vec::new(),
        },
        EntrySpec {
            prefix: b"/echo".to_vec(),
            handler: Box::new(Echo),
            args: Vec::new(),
        },
    ]
}

/// Bootstrap a server bound to `port` with a small worker/connection
/// footprint, suitable for a single test process.
fn config_for(port: u16) -> Config {
    Config {
        port,
        workers: Some(2),
        keep_alive_timeout: 5,
        max_conns_per_worker: 1024,
        backlog: None,
    }
}

/// A running server plus the means to stop it: signals the acceptor's
/// shutdown flag and joins the thread `run()` was driven from.
pub struct TestServer {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl TestServer {
    pub fn stop(mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Bootstrap a server bound to `port` and drive it on a background
/// thread. Blocks briefly to give the acceptor a chance to start
/// listening before returning.
pub fn spawn_server(port: u16) -> TestServer {
    let mut server = Server::bootstrap(config_for(port), default_entries()).expect("server bootstrap failed");
    let shutdown = server.shutdown_handle();
    let handle = std::thread::spawn(move || {
        let _ = server.run();
    });
    std::thread::sleep(Duration::from_millis(100));
    TestServer { shutdown, handle: Some(handle) }
}

/// Open a connection, send a raw request line, and return whatever the
/// server wrote back before closing or going quiet.
pub fn raw_request(port: u16, request: &str) -> Vec<u8> {
    let mut stream = connect(port);
    stream.write_all(request.as_bytes()).expect("write request");
    read_available(&mut stream)
}

pub fn connect(port: u16) -> TcpStream {
    let stream = TcpStream::connect(("127.0.0.1", port)).expect("connect to server");
    stream
        .set_read_timeout(Some(Duration::from_millis(500)))
        .expect("set read timeout");
    stream
}

pub fn read_available(stream: &mut TcpStream) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut scratch = [0u8; 4096];
    loop {
        match stream.read(&mut scratch) {
            Ok(0) => break,
            Ok(n) => buf.extend_from_slice(&scratch[..n]),
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
            Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => break,
            Err(_) => break,
        }
    }
    buf
}
