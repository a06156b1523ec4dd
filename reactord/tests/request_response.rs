//! End-to-end exercises of scenarios 1 and 4 from spec §8: a full
//! keep-alive request/response round trip, and longest-prefix routing,
//! both driven over a real TCP socket against a running `Server`.

use reactord_tests::{raw_request, spawn_server};

#[test]
fn single_keep_alive_request_round_trips() {
    let server = spawn_server(18180);

    let response = raw_request(18180, "GET /echo/hello HTTP/1.1\r\nHost: h\r\n\r\n");
    let text = String::from_utf8_lossy(&response);

    assert!(text.starts_with("HTTP/1.1 200"), "got: {text}");
    assert!(text.contains("Connection: keep-alive"), "got: {text}");
    assert!(text.ends_with("/echo/hello"), "got: {text}");

    server.stop();
}

#[test]
fn connection_close_request_is_honored() {
    let server = spawn_server(18181);

    let response = raw_request(
        18181,
        "GET /echo/bye HTTP/1.1\r\nHost: h\r\nConnection: close\r\n\r\n",
    );
    let text = String::from_utf8_lossy(&response);

    assert!(text.contains("Connection: close"), "got: {text}");

    server.stop();
}

#[test]
fn router_dispatches_health_and_rejects_unknown_prefix() {
    let server = spawn_server(18182);

    let ok = raw_request(18182, "GET /health HTTP/1.1\r\nHost: h\r\n\r\n");
    assert!(String::from_utf8_lossy(&ok).starts_with("HTTP/1.1 200"));

    let missing = raw_request(18182, "GET /nope HTTP/1.1\r\nHost: h\r\n\r\n");
    assert!(String::from_utf8_lossy(&missing).starts_with("HTTP/1.1 404"));

    server.stop();
}
