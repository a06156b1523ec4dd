//! Per-connection state: the record stored at `Slab[fd]`.

use crate::core::coro::Coro;
use bytes::BytesMut;
use once_cell::sync::Lazy;
use std::os::unix::io::RawFd;
use std::sync::Arc;

/// Key/value pairs parsed out of a request's query string, in order of
/// appearance. The empty case is a clone of [`EMPTY_QUERY_PARAMS`] so a
/// request with no query string never allocates.
pub type QueryParams = Arc<Vec<(String, String)>>;

pub static EMPTY_QUERY_PARAMS: Lazy<QueryParams> = Lazy::new(|| Arc::new(Vec::new()));

/// Lifecycle flags tracked per connection (spec §3).
#[derive(Debug, Clone, Copy)]
pub struct ConnFlags {
    /// The reactor considers this fd tracked; the OS fd is open.
    pub alive: bool,
    /// The last coroutine step indicated "not finished".
    pub should_resume_coro: bool,
    /// The reactor's current epoll interest is write-readiness.
    pub write_events: bool,
    /// The in-progress or completed request indicates keep-alive.
    pub is_keep_alive: bool,
}

impl Default for ConnFlags {
    fn default() -> Self {
        ConnFlags {
            alive: false,
            should_resume_coro: false,
            write_events: false,
            is_keep_alive: false,
        }
    }
}

/// One slot of the slab: everything the reactor needs to drive a single
/// accepted connection through its request/response cycle.
pub struct ConnectionState {
    /// The socket descriptor; also this state's index in the slab.
    pub fd: RawFd,
    /// The currently-running per-request coroutine, if any.
    pub coro: Option<Coro>,
    /// Bytes read off the socket, not yet parsed into a request. Allocated
    /// once, reset (not freed) between requests (invariant 6).
    pub read_buffer: BytesMut,
    /// Owned, growable response buffer. Allocated once, reset (not freed)
    /// between requests on the same connection (invariant 6).
    pub response_buffer: BytesMut,
    pub query_params: QueryParams,
    pub flags: ConnFlags,
    /// Tick at which the death queue reaps this fd absent further activity.
    pub time_to_die: u64,
    /// Index of the worker that owns this fd, for assertions/logging only.
    pub worker: usize,
}

impl ConnectionState {
    /// Build a fresh slot. Called once at slab-allocation time; the
    /// response buffer is the one and only allocation for this slot's
    /// lifetime (invariant 6).
    pub fn new(fd: RawFd) -> Self {
        ConnectionState {
            fd,
            coro: None,
            read_buffer: BytesMut::with_capacity(4 * 1024),
            response_buffer: BytesMut::with_capacity(8 * 1024),
            query_params: EMPTY_QUERY_PARAMS.clone(),
            flags: ConnFlags::default(),
            time_to_die: 0,
            worker: usize::MAX,
        }
    }

    /// Reset state for a new request on an already-open connection.
    /// Preserves `fd`, `coro`, `response_buffer` identity; query params are
    /// rebound to the shared sentinel (by-identity compare avoids a drop of
    /// an already-empty allocation); everything else returns to its zero
    /// value, exactly as required by the round-trip property in spec §8.
    pub fn reset_for_request(&mut self) {
        if !Arc::ptr_eq(&self.query_params, &EMPTY_QUERY_PARAMS) {
            self.query_params = EMPTY_QUERY_PARAMS.clone();
        }
        self.read_buffer.clear();
        self.response_buffer.clear();
        self.flags.should_resume_coro = false;
        self.flags.write_events = false;
        self.flags.is_keep_alive = false;
        self.time_to_die = 0;
    }

    /// Called when the connection is handed a brand new accepted fd,
    /// reusing a slab slot the OS previously freed and reallocated.
    pub fn bind(&mut self, fd: RawFd, worker: usize) {
        debug_assert!(self.coro.is_none());
        self.fd = fd;
        self.worker = worker;
        self.read_buffer.clear();
        self.response_buffer.clear();
        self.query_params = EMPTY_QUERY_PARAMS.clone();
        self.flags = ConnFlags::default();
        self.time_to_die = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_preserves_identity_fields() {
        let mut conn = ConnectionState::new(7);
        let buf_ptr = conn.response_buffer.as_ptr();
        conn.query_params = Arc::new(vec![("a".into(), "b".into())]);
        conn.flags.is_keep_alive = true;
        conn.flags.should_resume_coro = true;
        conn.time_to_die = 42;
        conn.response_buffer.extend_from_slice(b"hello");

        conn.reset_for_request();

        assert_eq!(conn.fd, 7);
        assert!(Arc::ptr_eq(&conn.query_params, &EMPTY_QUERY_PARAMS));
        assert!(!conn.flags.is_keep_alive);
        assert!(!conn.flags.should_resume_coro);
        assert_eq!(conn.time_to_die, 0);
        assert_eq!(conn.response_buffer.len(), 0);
        // same backing allocation, not reallocated
        assert_eq!(conn.response_buffer.as_ptr(), buf_ptr);
    }

    #[test]
    fn empty_sentinel_is_shared_by_default() {
        let conn = ConnectionState::new(3);
        assert!(Arc::ptr_eq(&conn.query_params, &EMPTY_QUERY_PARAMS));
    }
}
