//! A minimal reference handler set: enough to exercise the router and
//! reactor end to end. Not a production handler set — real handler
//! bodies (static file serving, embedded scripts) are out of scope.

use crate::http::{HttpStatus, RequestCtx, ResponseBuf};
use crate::router::Handler;
use std::any::Any;
use std::future::Future;
use std::pin::Pin;

/// Writes the request path back as the response body. Used by the
/// binary's default route table and by integration tests that need a
/// known-good handler.
pub struct Echo;

impl Handler for Echo {
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

/// Always answers 200 with an empty body. Used for `/health`.
pub struct Health;

impl Handler for Health {
    fn handle<'a>(
        &'a self,
        _ctx: &'a mut RequestCtx<'_>,
        _response: &'a mut ResponseBuf,
        _state: &'a (dyn Any + Send + Sync),
    ) -> Pin<Box<dyn Future<Output = HttpStatus> + 'a>> {
        Box::pin(async { HttpStatus::Ok })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::connection::EMPTY_QUERY_PARAMS;
    use futures::task::noop_waker_ref;
    use std::task::{Context, Poll};

    fn poll_once<'a>(
        mut fut: Pin<Box<dyn Future<Output = HttpStatus> + 'a>>,
    ) -> HttpStatus {
        let waker = noop_waker_ref();
        let mut cx = Context::from_waker(waker);
        match fut.as_mut().poll(&mut cx) {
            Poll::Ready(status) => status,
            Poll::Pending => panic!("reference handlers must resolve on first poll"),
        }
    }

    #[test]
    fn echo_writes_path_into_response() {
        let mut ctx = RequestCtx {
            method: "GET",
            path: "/echo/42",
            query_params: EMPTY_QUERY_PARAMS.clone(),
            keep_alive: true,
            consumed: 0,
        };
        let mut response = ResponseBuf::new();
        let status = poll_once(Echo.handle(&mut ctx, &mut response, &()));

        assert_eq!(status, HttpStatus::Ok);
        assert_eq!(&response[..], b"/echo/42");
    }

    #[test]
    fn health_always_ok_with_empty_body() {
        let mut ctx = RequestCtx {
            method: "GET",
            path: "/health",
            query_params: EMPTY_QUERY_PARAMS.clone(),
            keep_alive: true,
            consumed: 0,
        };
        let mut response = ResponseBuf::new();
        let status = poll_once(Health.handle(&mut ctx, &mut response, &()));

        assert_eq!(status, HttpStatus::Ok);
        assert!(response.is_empty());
    }
}
