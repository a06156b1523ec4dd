//! The connection engine: the fd-indexed slab, the coroutine runtime,
//! the death-queue reaper, and the acceptor/reactor/lifecycle trio that
//! drives them.

pub mod acceptor;
pub mod connection;
pub mod coro;
pub mod death_queue;
pub mod lifecycle;
pub mod reactor;
pub mod slab;

pub use acceptor::{Acceptor, Notify, NoopNotify};
pub use connection::ConnectionState;
pub use coro::{ConnIo, Coro, Interest, ResumeOutcome};
pub use death_queue::DeathQueue;
pub use lifecycle::Server;
pub use reactor::Reactor;
pub use slab::Slab;
