//! The external collaborator the core calls into per request
//! (`process_request`). Full HTTP/1.1 parsing, MIME policy *content* and
//! status-table *content* are all out of scope as a subsystem (spec §1);
//! what lives here is just enough of a real implementation to drive the
//! reactor and router end to end and to exercise the scenarios in spec §8.

pub mod mime;
pub mod request;
pub mod response;
pub mod status;

pub use mime::{mime_for_path, DEFAULT_MIME};
pub use request::{parse_request, ParseError, RequestCtx};
pub use response::{render_headers, ResponseBuf};
pub use status::{status_as_string, HttpStatus};

use crate::core::connection::QueryParams;
use crate::core::coro::{ConnIo, Coro};
use crate::core::slab::Slab;
use crate::router::Router;
use nix::errno::Errno;
use nix::unistd::{read as nix_read, write as nix_write};
use std::os::unix::io::RawFd;
use tracing::{debug, warn};

/// Build the per-connection coroutine a freshly accepted (or freshly
/// reset) fd is handed. `slab` and `router` are leaked for the process's
/// lifetime by the lifecycle controller, so `'static` here just means
/// "as long as the server runs", matching the teacher's own long-lived
/// per-core state.
pub fn spawn_request_coro(fd: RawFd, slab: &'static Slab, router: &'static Router) -> Coro {
    Coro::create(fd, move |io| process_request(fd, slab, router, io))
}

enum ReadOutcome {
    GotMore,
    Eof,
}

/// Read once, retrying on `EAGAIN` by suspending the coroutine. Appends
/// to `conn.read_buffer`. The `conn` reference this derives is used
/// synchronously and never held across the `.await` below: it is
/// re-derived fresh on every loop iteration, which is the discipline
/// that keeps two non-overlapping raw accesses to the same slot from
/// ever being alive at once (see [`Slab::get_mut`]).
async fn read_once(fd: RawFd, slab: &'static Slab, io: &ConnIo) -> ReadOutcome {
    let mut scratch = [0u8; 4096];
    loop {
        match nix_read(fd, &mut scratch) {
            Ok(0) => return ReadOutcome::Eof,
            Ok(n) => {
                let conn = unsafe { slab.get_mut(fd) };
                conn.read_buffer.extend_from_slice(&scratch[..n]);
                return ReadOutcome::GotMore;
            }
            Err(Errno::EAGAIN) => io.wait_readable().await,
            Err(e) => {
                warn!(fd, error = %e, "read failed");
                return ReadOutcome::Eof;
            }
        }
    }
}

/// Write `conn.response_buffer[offset..]` to the socket, retrying on
/// `EAGAIN`. Same re-derive-per-iteration discipline as [`read_once`].
async fn write_body(fd: RawFd, slab: &'static Slab, io: &ConnIo, mut offset: usize) -> bool {
    loop {
        let conn = unsafe { slab.get_mut(fd) };
        if offset >= conn.response_buffer.len() {
            return true;
        }
        match nix_write(fd, &conn.response_buffer[offset..]) {
            Ok(0) => return false,
            Ok(n) => offset += n,
            Err(Errno::EAGAIN) => io.wait_writable().await,
            Err(e) => {
                warn!(fd, error = %e, "write failed");
                return false;
            }
        }
    }
}

/// Write an owned buffer that isn't part of the connection's slab slot
/// (the rendered header block): safe to hold across `.await` since it
/// aliases nothing the reactor touches.
async fn write_owned(fd: RawFd, io: &ConnIo, mut buf: &[u8]) -> bool {
    while !buf.is_empty() {
        match nix_write(fd, buf) {
            Ok(0) => return false,
            Ok(n) => buf = &buf[n..],
            Err(Errno::EAGAIN) => io.wait_writable().await,
            Err(e) => {
                warn!(fd, error = %e, "write failed");
                return false;
            }
        }
    }
    true
}

/// Read, parse, dispatch to the router and write a response, once. Loops
/// for as many keep-alive requests as the peer sends on this connection;
/// returns when it does — one coroutine drives exactly one request (spec
/// §4.4's "per-request coroutine body"); the reactor spawns a fresh one
/// the next time this fd becomes readable, which is what makes a
/// connection's second and later keep-alive requests happen at all.
async fn process_request(fd: RawFd, slab: &'static Slab, router: &'static Router, io: ConnIo) {
    {
        let conn = unsafe { slab.get_mut(fd) };
        conn.reset_for_request();
    }

    let consumed = loop {
        let conn = unsafe { slab.get_mut(fd) };
        match parse_request(&conn.read_buffer) {
            Ok(ctx) => break ctx.consumed,
            Err(ParseError::Incomplete) => {}
            Err(_) => {
                warn!(fd, "malformed request, closing connection");
                unsafe { slab.get_mut(fd) }.flags.is_keep_alive = false;
                return;
            }
        }
        match read_once(fd, slab, &io).await {
            ReadOutcome::GotMore => continue,
            ReadOutcome::Eof => {
                unsafe { slab.get_mut(fd) }.flags.is_keep_alive = false;
                return;
            }
        }
    };

    let (path, query_params, keep_alive): (String, QueryParams, bool) = {
        let conn = unsafe { slab.get_mut(fd) };
        let parsed = parse_request(&conn.read_buffer).expect("re-parse of already-parsed head");
        (parsed.path.to_string(), parsed.query_params.clone(), parsed.keep_alive)
    };

    let status = dispatch(fd, slab, router, &path, query_params, keep_alive);

    {
        let conn = unsafe { slab.get_mut(fd) };
        let _ = conn.read_buffer.split_to(consumed);
        conn.flags.is_keep_alive = keep_alive;
    }

    let body_len = unsafe { slab.get_mut(fd) }.response_buffer.len();
    let headers = render_headers(status, &path, keep_alive, body_len);
    if !write_owned(fd, &io, &headers).await {
        unsafe { slab.get_mut(fd) }.flags.is_keep_alive = false;
        return;
    }
    if !write_body(fd, slab, &io, 0).await {
        unsafe { slab.get_mut(fd) }.flags.is_keep_alive = false;
        return;
    }

    debug!(fd, %path, status = status.code(), keep_alive, "request served");
}

/// Route and invoke a handler. Not itself async: `Handler::handle` must
/// resolve on its first poll (see [`crate::router::Handler`]), so there
/// is nothing here for a coroutine suspension point to attach to.
fn dispatch(
    fd: RawFd,
    slab: &'static Slab,
    router: &'static Router,
    path: &str,
    query_params: QueryParams,
    keep_alive: bool,
) -> HttpStatus {
    let entry = match router.lookup(path.as_bytes()) {
        Some(entry) => entry,
        None => return HttpStatus::NotFound,
    };

    let mut ctx = RequestCtx {
        method: "GET",
        path,
        query_params,
        keep_alive,
        consumed: 0,
    };

    let conn = unsafe { slab.get_mut(fd) };
    let mut future = entry
        .handler
        .handle(&mut ctx, &mut conn.response_buffer, entry.data.as_ref());

    // The handler contract requires resolving on the first poll (see
    // `Handler::handle`); a no-op waker is therefore sufficient here too.
    use futures::task::noop_waker_ref;
    use std::task::{Context, Poll};
    let waker = noop_waker_ref();
    let mut cx = Context::from_waker(waker);
    match future.as_mut().poll(&mut cx) {
        Poll::Ready(status) => status,
        Poll::Pending => {
            warn!(fd, %path, "handler did not resolve synchronously");
            HttpStatus::InternalError
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::connection::ConnectionState;
    use crate::core::slab::Slab;
    use crate::router::{EntrySpec, Handler, HandlerArgs, Router};
    use std::any::Any;
    use std::future::Future;
    use std::pin::Pin;

    struct EchoHandler;
    impl Handler for EchoHandler {
        fn handle<'a>(
            &'a self,
            ctx: &'a mut RequestCtx<'_>,
            response: &'a mut ResponseBuf,
            _state: &'a (dyn Any + Send + Sync),
        ) -> Pin<Box<dyn Future<Output = HttpStatus> + 'a>> {
            let path = ctx.path.to_string();
            Box::pin(async move {
                response.extend_from_slice(path.as_bytes());
                HttpStatus::Ok
            })
        }
    }

    fn build_router() -> Router {
        Router::build(vec![EntrySpec {
            prefix: b"/echo".to_vec(),
            handler: Box::new(EchoHandler),
            args: HandlerArgs::new(),
        }])
        .unwrap()
    }

    #[test]
    fn dispatch_routes_to_registered_handler() {
        let slab = Box::leak(Box::new(Slab::new(8)));
        let router: &'static Router = Box::leak(Box::new(build_router()));
        unsafe {
            *slab.get_mut(3) = ConnectionState::new(3);
        }

        let status = dispatch(
            3,
            slab,
            router,
            "/echo/1",
            crate::core::connection::EMPTY_QUERY_PARAMS.clone(),
            true,
        );

        assert_eq!(status, HttpStatus::Ok);
        let conn = unsafe { slab.get_mut(3) };
        assert_eq!(&conn.response_buffer[..], b"/echo/1");
    }

    #[test]
    fn dispatch_with_no_matching_prefix_is_not_found() {
        let slab = Box::leak(Box::new(Slab::new(8)));
        let router: &'static Router = Box::leak(Box::new(build_router()));
        unsafe {
            *slab.get_mut(1) = ConnectionState::new(1);
        }

        let status = dispatch(
            1,
            slab,
            router,
            "/missing",
            crate::core::connection::EMPTY_QUERY_PARAMS.clone(),
            true,
        );

        assert_eq!(status, HttpStatus::NotFound);
    }
}
