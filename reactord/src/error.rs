//! Error taxonomy.
//!
//! Fatal init errors abort the process (see [`InitError`]); everything
//! else is logged and absorbed by the component that observed it, per
//! the propagation policy in the design: init errors exit, per-connection
//! errors never leave the owning worker.

use snafu::Snafu;
use std::path::PathBuf;

/// Errors that occur during process bootstrap. These are programmer or
/// deployment errors: the caller logs them and aborts the process.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum InitError {
    #[snafu(display("failed to raise RLIMIT_NOFILE: {source}"))]
    RaiseNoFile { source: nix::Error },

    #[snafu(display("failed to create listening socket: {source}"))]
    CreateSocket { source: nix::Error },

    #[snafu(display("failed to bind {addr}: {source}"))]
    Bind { addr: String, source: nix::Error },

    #[snafu(display("failed to listen (backlog={backlog}): {source}"))]
    Listen { backlog: i32, source: nix::Error },

    #[snafu(display("epoll_create1 failed: {source}"))]
    CreateEpoll { source: nix::Error },

    #[snafu(display("failed to spawn worker thread {id}: {source}"))]
    SpawnWorker { id: usize, source: std::io::Error },

    #[snafu(display("failed to install signal handler: {source}"))]
    InstallSignal { source: std::io::Error },

    #[snafu(display("router initialization failed: {source}"))]
    RouterInit { source: RouterError },

    #[snafu(display("log directory {path:?} is not writable: {source}"))]
    LogDir { path: PathBuf, source: std::io::Error },
}

/// Non-fatal conditions observed while a worker is draining I/O on one
/// connection. Logged by the worker that owns the fd; never escapes it.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ReactorError {
    #[snafu(display("epoll_ctl({op}) on fd {fd} failed: {source}"))]
    EpollCtl {
        op: &'static str,
        fd: i32,
        source: nix::Error,
    },

    #[snafu(display("accept() failed: {source}"))]
    Accept { source: nix::Error },

    #[snafu(display("read on fd {fd} failed: {source}"))]
    Read { fd: i32, source: nix::Error },

    #[snafu(display("write on fd {fd} failed: {source}"))]
    Write { fd: i32, source: nix::Error },
}

/// Errors raised while (re)configuring the prefix router.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum RouterError {
    #[snafu(display("handler init failed for prefix {prefix:?}: {reason}"))]
    HandlerInit { prefix: String, reason: String },

    #[snafu(display("duplicate prefix registered: {prefix:?}"))]
    DuplicatePrefix { prefix: String },
}
