//! Worker Reactor (WR): one per CPU. Owns an epoll set, a death-queue
//! ring and a monotonic `tick`, and drives per-connection coroutines in
//! response to I/O readiness and timeouts.
//!
//! The dispatch algorithm below is a direct translation of spec §4.4;
//! see [`crate::core::coro`] for how "coroutine yields wanting write" is
//! represented in Rust, and the module docs on [`crate::core::slab`] for
//! the fd-sharding invariant this all rests on.

use crate::core::connection::ConnectionState;
use crate::core::coro::Interest;
use crate::core::death_queue::DeathQueue;
use crate::core::slab::Slab;
use crate::error::{CreateEpollSnafu, EpollCtlSnafu, InitError, ReactorError};
use crate::http::spawn_request_coro;
use crate::router::Router;
use nix::sys::epoll::{
    epoll_create1, epoll_ctl, epoll_wait, EpollCreateFlags, EpollEvent, EpollFlags, EpollOp,
};
use nix::unistd::close;
use snafu::ResultExt;
use std::os::unix::io::RawFd;
use tracing::{debug, info, warn};

/// `epoll_ctl(ADD)` a freshly accepted fd with read interest onto
/// `epoll_fd`. A free function (not a `Reactor` method) because the
/// acceptor calls this from its own thread against a *different*
/// thread's epoll set; spec §5 notes this is the one sanctioned
/// cross-thread interaction, serialized by the kernel.
pub(crate) fn register_fd(epoll_fd: RawFd, fd: RawFd) -> Result<(), ReactorError> {
    let mut event = EpollEvent::new(read_interest(), fd as u64);
    epoll_ctl(epoll_fd, EpollOp::EpollCtlAdd, fd, Some(&mut event)).context(EpollCtlSnafu { op: "ADD", fd })
}

fn read_interest() -> EpollFlags {
    EpollFlags::EPOLLIN | EpollFlags::EPOLLRDHUP | EpollFlags::EPOLLERR | EpollFlags::EPOLLET
}

fn write_interest() -> EpollFlags {
    EpollFlags::EPOLLOUT | EpollFlags::EPOLLRDHUP | EpollFlags::EPOLLERR
}

pub struct Reactor {
    id: usize,
    epoll_fd: RawFd,
    events: Vec<EpollEvent>,
    death_queue: DeathQueue,
    tick: u64,
    keep_alive_timeout: u32,
    slab: &'static Slab,
    router: &'static Router,
}

impl Reactor {
    pub fn new(
        id: usize,
        slab: &'static Slab,
        router: &'static Router,
        max_conns: usize,
        keep_alive_timeout: u32,
    ) -> Result<Reactor, InitError> {
        let epoll_fd = epoll_create1(EpollCreateFlags::empty()).context(CreateEpollSnafu)?;

        Ok(Reactor {
            id,
            epoll_fd,
            events: vec![EpollEvent::new(EpollFlags::empty(), 0); max_conns],
            death_queue: DeathQueue::new(max_conns),
            tick: 0,
            keep_alive_timeout,
            slab,
            router,
        })
    }

    pub fn epoll_fd(&self) -> RawFd {
        self.epoll_fd
    }

    /// Register a freshly accepted fd, as the acceptor does via
    /// `epoll_ctl(ADD)` (spec §4.5). `conn` must already be bound to
    /// `fd` (see `ConnectionState::bind`) before this call.
    pub fn register(&self, fd: RawFd) -> Result<(), ReactorError> {
        register_fd(self.epoll_fd, fd)
    }

    /// Main loop (spec §4.4). Returns once `epoll_wait` reports the
    /// epoll fd itself was closed out from under us (`EBADF`/`EINVAL`),
    /// which is how shutdown reaches a blocked worker.
    pub fn run(&mut self) {
        info!(worker = self.id, "reactor started");
        loop {
            let timeout_ms = if self.death_queue.is_empty() { -1 } else { 1000 };
            let n = match epoll_wait(self.epoll_fd, &mut self.events, timeout_ms) {
                Ok(n) => n,
                Err(nix::errno::Errno::EBADF) | Err(nix::errno::Errno::EINVAL) => break,
                Err(nix::errno::Errno::EINTR) => continue,
                Err(e) => {
                    warn!(worker = self.id, error = %e, "epoll_wait failed");
                    continue;
                }
            };

            if n == 0 {
                self.tick += 1;
                self.reap_expired();
            } else {
                for event in self.events[..n].to_vec() {
                    self.dispatch(event);
                }
            }
        }
        info!(worker = self.id, "reactor stopped");
    }

    fn dispatch(&mut self, ev: EpollEvent) {
        let fd = ev.data() as RawFd;
        let events = ev.events();

        if events.intersects(EpollFlags::EPOLLHUP | EpollFlags::EPOLLRDHUP) {
            let conn = unsafe { self.slab.get_mut(fd) };
            conn.flags.alive = false;
            let _ = close(fd);
            return;
        }

        {
            let conn = unsafe { self.slab.get_mut(fd) };
            cleanup_coro(conn);
            self.spawn_coro_if_needed(fd, conn);
        }

        self.resume_coro(fd);

        let conn = unsafe { self.slab.get_mut(fd) };
        conn.time_to_die = if conn.flags.is_keep_alive || conn.flags.should_resume_coro {
            self.tick + self.keep_alive_timeout as u64
        } else {
            self.tick
        };

        if !conn.flags.alive {
            self.death_queue.enroll(fd);
            conn.flags.alive = true;
        }
    }

    fn spawn_coro_if_needed(&self, fd: RawFd, conn: &mut ConnectionState) {
        if conn.coro.is_none() {
            conn.coro = Some(spawn_request_coro(fd, self.slab, self.router));
            conn.flags.should_resume_coro = true;
            conn.flags.write_events = false;
        }
    }

    /// Resume the coroutine and, if its I/O direction flipped relative
    /// to the last-programmed epoll interest, reprogram it. The fixed
    /// `write_events` → event-mask mapping is spec §4.4 step 4 verbatim.
    ///
    /// Resolves the literal wording "`should_resume_coro` now differs
    /// from `write_events`" against the coroutine's actual reported
    /// interest rather than the two flags' raw boolean values — see
    /// `DESIGN.md` for why those aren't the same comparison.
    ///
    /// Takes `fd`, not a `&mut ConnectionState`: the coroutine being
    /// resumed re-enters the slab for this same fd (to read/write its
    /// own request state), so nothing here may hold a whole-connection
    /// borrow across the `resume()` call itself — only a raw pointer to
    /// the `Coro` sub-object, which touches none of the fields the
    /// coroutine body touches.
    fn resume_coro(&mut self, fd: RawFd) {
        let coro_ptr: *mut crate::core::coro::Coro = {
            let conn = unsafe { self.slab.get_mut(fd) };
            conn.coro
                .as_mut()
                .expect("spawn_coro_if_needed guarantees a coro here") as *mut _
        };
        let outcome = unsafe { (*coro_ptr).resume() };

        let conn = unsafe { self.slab.get_mut(fd) };
        let (should_resume, wants_write) = match outcome {
            crate::core::coro::ResumeOutcome::Finished => (false, conn.flags.write_events),
            crate::core::coro::ResumeOutcome::Yielded(interest) => {
                (true, interest == Interest::Write)
            }
        };
        conn.flags.should_resume_coro = should_resume;

        if should_resume && wants_write != conn.flags.write_events {
            conn.flags.write_events = wants_write;
            let mask = if wants_write { write_interest() } else { read_interest() };
            let mut event = EpollEvent::new(mask, fd as u64);
            if let Err(e) = epoll_ctl(self.epoll_fd, EpollOp::EpollCtlMod, fd, Some(&mut event)) {
                // Per spec §7: logged, not escalated; the connection may wedge.
                warn!(fd, error = %e, "epoll_ctl MOD failed");
            }
        }
    }

    fn reap_expired(&mut self) {
        let slab = self.slab;
        let tick = self.tick;
        self.death_queue.reap_expired(
            |fd| unsafe { slab.get_mut(fd) }.time_to_die <= tick,
            |fd| {
                let conn = unsafe { slab.get_mut(fd) };
                // The connection is being torn down either way, including
                // the case where `dispatch`'s HUP/RDHUP branch already
                // closed the fd and marked it not-alive with the coroutine
                // still mid-request (`should_resume_coro` stuck `true`,
                // since it never gets resumed again). Free it unconditionally
                // rather than waiting for it to report itself finished.
                conn.coro = None;
                if !conn.flags.alive {
                    return;
                }
                conn.flags.alive = false;
                let _ = close(fd);
                debug!(fd, "reaped idle connection");
            },
        );
    }
}

// No `Drop` impl: closing the epoll fd is the lifecycle controller's
// responsibility (spec §4.6 shutdown step 1), done from outside this
// thread while `run()` may still be blocked in `epoll_wait`. A `Drop`
// here would race that external close and risk double-closing an
// already-reused fd.

/// Free a finished coroutine. A coroutine is finished exactly when the
/// last `resume` cleared `should_resume_coro` (spec §4.4 step 2).
fn cleanup_coro(conn: &mut ConnectionState) {
    if conn.coro.is_some() && !conn.flags.should_resume_coro {
        conn.coro = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::coro::{Coro, ResumeOutcome};

    #[test]
    fn cleanup_frees_finished_coro() {
        let mut conn = ConnectionState::new(5);
        conn.coro = Some(Coro::create(5, |_io| async move {}));
        conn.flags.should_resume_coro = false;

        cleanup_coro(&mut conn);

        assert!(conn.coro.is_none());
    }

    #[test]
    fn cleanup_keeps_unfinished_coro() {
        let mut conn = ConnectionState::new(5);
        conn.coro = Some(Coro::create(5, |io| async move {
            io.wait_readable().await;
        }));
        assert_eq!(conn.coro.as_mut().unwrap().resume(), ResumeOutcome::Yielded(crate::core::coro::Interest::Read));
        conn.flags.should_resume_coro = true;

        cleanup_coro(&mut conn);

        assert!(conn.coro.is_some());
    }
}
