//! The router's contract with pluggable handlers (spec §6). Handler
//! bodies themselves — embedded-script execution, static file serving,
//! and so on — are out of scope; only this interface is.

use crate::error::RouterError;
use crate::http::{HttpStatus, RequestCtx, ResponseBuf};
use std::any::Any;
use std::future::Future;
use std::pin::Pin;

/// Hints which parts of the request the core should pre-parse before
/// calling `handle`. Absent an explicit `init`, `ParseMask::ALL` is
/// assumed (spec §6). A plain bitmask newtype: the router's flag set is
/// three bits wide and fixed, not worth a dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseMask(u8);

impl ParseMask {
    pub const QUERY_STRING: ParseMask = ParseMask(0b0001);
    pub const HEADERS: ParseMask = ParseMask(0b0010);
    pub const BODY: ParseMask = ParseMask(0b0100);
    pub const ALL: ParseMask = ParseMask(0b0111);
    pub const NONE: ParseMask = ParseMask(0);

    pub const fn contains(self, other: ParseMask) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: ParseMask) -> ParseMask {
        ParseMask(self.0 | other.0)
    }
}

/// Arguments passed to `Handler::init`, opaque to the core.
pub type HandlerArgs = Vec<(String, String)>;

/// A registered handler. `init`/`teardown` are optional lifecycle hooks.
/// `handle` returns a boxed future for calling-convention flexibility
/// (an `async fn` body, or a call into another future-returning
/// library), but the core polls it to completion in a single step: a
/// handler must resolve on its first poll, never suspend across a
/// reactor dispatch.
pub trait Handler: Send + Sync {
    fn init(&self, _args: &HandlerArgs) -> Result<Box<dyn Any + Send + Sync>, RouterError> {
        Ok(Box::new(()))
    }

    fn teardown(&self, _state: &mut (dyn Any + Send + Sync)) {}

    fn flags(&self) -> ParseMask {
        ParseMask::ALL
    }

    fn handle<'a>(
        &'a self,
        ctx: &'a mut RequestCtx<'_>,
        response: &'a mut ResponseBuf,
        state: &'a (dyn Any + Send + Sync),
    ) -> Pin<Box<dyn Future<Output = HttpStatus> + 'a>>;
}
