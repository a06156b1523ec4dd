//! A small, high-throughput HTTP connection engine: N worker reactors
//! poll epoll sets of accepted connections, driving one coroutine per
//! in-flight request; a single acceptor thread round-robins new
//! connections across the workers. See `core` for the engine itself,
//! `router` for URL dispatch, and `http` for the request/response
//! collaborator the core calls into.

pub mod config;
pub mod core;
pub mod error;
pub mod handlers;
pub mod http;
pub mod router;

pub use config::Config;
pub use core::Server;
pub use error::{InitError, ReactorError, RouterError};
pub use router::{EntrySpec, Handler, HandlerArgs, ParseMask, Router};
