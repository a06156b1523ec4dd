//! Scenario 2 from spec §8: an idle connection is closed by the reaper
//! once `keep_alive_timeout` elapses.
//!
//! A connection is only enrolled in the death queue on its first
//! dispatch (spec §4.4 step 6), which requires at least one epoll
//! event; a socket that never sends a byte never generates one, so
//! this drives one request first and then leaves the keep-alive
//! connection idle, which is the enrollment path every real
//! connection actually takes.

use reactord_tests::{connect, read_available, spawn_server};
use std::io::{Read, Write};
use std::time::Duration;

#[test]
fn idle_connection_is_reaped_after_timeout() {
    // `spawn_server`'s test config sets keep_alive_timeout = 5.
    let server = spawn_server(18280);

    let mut stream = connect(18280);
    stream
        .write_all(b"GET /health HTTP/1.1\r\nHost: h\r\n\r\n")
        .unwrap();
    let response = read_available(&mut stream);
    assert!(String::from_utf8_lossy(&response).starts_with("HTTP/1.1 200"));

    // The reaper ticks once per second of idle epoll_wait; give it
    // comfortable headroom past the 5s timeout.
    std::thread::sleep(Duration::from_secs(7));

    stream
        .set_read_timeout(Some(Duration::from_millis(500)))
        .unwrap();
    let mut buf = [0u8; 16];
    let result = stream.read(&mut buf);
    // The peer closed the fd: either a clean EOF (Ok(0)) or a reset.
    match result {
        Ok(0) => {}
        Ok(n) => panic!("expected EOF, got {n} bytes"),
        Err(_) => {}
    }

    server.stop();
}
