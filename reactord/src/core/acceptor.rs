//! Acceptor (AC): single listener thread. Accepts connections off the
//! bound socket and round-robins each one into a worker's epoll set.
//!
//! Also owns the root epoll set (listening socket + an auxiliary
//! file-watch descriptor) and the SIGINT-driven shutdown poll (spec
//! §4.5). File-cache/directory-watch is out of scope (spec §1); the
//! auxiliary fd exists only so this epoll set's shape matches the spec,
//! fed by a [`Notify`] that never actually signals.

use crate::core::connection::ConnectionState;
use crate::core::reactor::register_fd;
use crate::core::slab::Slab;
use crate::error::ReactorError;
use nix::sys::epoll::{epoll_create1, epoll_ctl, epoll_wait, EpollCreateFlags, EpollEvent, EpollFlags, EpollOp};
use nix::sys::socket::{accept4, SockFlag};
use nix::unistd::{close, pipe2};
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

const LISTEN_TOKEN: u64 = u64::MAX - 1;
const NOTIFY_TOKEN: u64 = u64::MAX - 2;

/// Delegate for directory-watch readiness. The file-cache subsystem this
/// would feed is out of scope; this crate ships only the no-op case.
pub trait Notify: Send {
    fn fd(&self) -> RawFd;
    fn on_ready(&mut self) {}
}

/// A `pipe2(O_NONBLOCK)` whose write end is never written to: the read
/// end sits in the acceptor's epoll set, structurally present, forever
/// silent.
pub struct NoopNotify {
    read_fd: RawFd,
    write_fd: RawFd,
}

impl NoopNotify {
    pub fn new() -> nix::Result<NoopNotify> {
        let (read_fd, write_fd) = pipe2(nix::fcntl::OFlag::O_NONBLOCK)?;
        Ok(NoopNotify { read_fd, write_fd })
    }
}

impl Notify for NoopNotify {
    fn fd(&self) -> RawFd {
        self.read_fd
    }
}

impl Drop for NoopNotify {
    fn drop(&mut self) {
        let _ = close(self.read_fd);
        let _ = close(self.write_fd);
    }
}

pub struct Acceptor {
    listen_fd: RawFd,
    epoll_fd: RawFd,
    notify: Box<dyn Notify>,
    worker_epoll_fds: Vec<RawFd>,
    next_worker: usize,
    slab: &'static Slab,
    shutdown: Arc<AtomicBool>,
}

impl Acceptor {
    pub fn new(
        listen_fd: RawFd,
        notify: Box<dyn Notify>,
        worker_epoll_fds: Vec<RawFd>,
        slab: &'static Slab,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Acceptor, ReactorError> {
        let epoll_fd = epoll_create1(EpollCreateFlags::empty())
            .map_err(|source| ReactorError::EpollCtl { op: "create1", fd: -1, source })?;

        let mut listen_ev = EpollEvent::new(EpollFlags::EPOLLIN, LISTEN_TOKEN);
        epoll_ctl(epoll_fd, EpollOp::EpollCtlAdd, listen_fd, Some(&mut listen_ev))
            .map_err(|source| ReactorError::EpollCtl { op: "ADD listen", fd: listen_fd, source })?;

        let mut notify_ev = EpollEvent::new(EpollFlags::EPOLLIN, NOTIFY_TOKEN);
        epoll_ctl(epoll_fd, EpollOp::EpollCtlAdd, notify.fd(), Some(&mut notify_ev))
            .map_err(|source| ReactorError::EpollCtl { op: "ADD notify", fd: notify.fd(), source })?;

        Ok(Acceptor {
            listen_fd,
            epoll_fd,
            notify,
            worker_epoll_fds,
            next_worker: 0,
            slab,
            shutdown,
        })
    }

    /// Runs until the shutdown flag is observed. Polls it once per loop
    /// iteration, the Design Notes §9 replacement for `setjmp`/`longjmp`.
    pub fn run(&mut self) {
        info!("acceptor started");
        let mut events = vec![EpollEvent::new(EpollFlags::empty(), 0); 16];
        while !self.shutdown.load(Ordering::Relaxed) {
            let n = match epoll_wait(self.epoll_fd, &mut events, 1000) {
                Ok(n) => n,
                Err(nix::errno::Errno::EINTR) => continue,
                Err(e) => {
                    warn!(error = %e, "acceptor epoll_wait failed");
                    continue;
                }
            };

            for event in &events[..n] {
                match event.data() {
                    LISTEN_TOKEN => self.drain_accepts(),
                    NOTIFY_TOKEN => self.notify.on_ready(),
                    _ => {}
                }
            }
        }
        info!("acceptor stopping");
    }

    fn drain_accepts(&mut self) {
        loop {
            match accept4(self.listen_fd, SockFlag::SOCK_NONBLOCK) {
                Ok(fd) => self.dispatch_accepted(fd),
                Err(nix::errno::Errno::EAGAIN) => break,
                Err(nix::errno::Errno::ECONNABORTED) => {
                    warn!("accept() aborted by peer before completion");
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, "accept() failed");
                    break;
                }
            }
        }
    }

    fn dispatch_accepted(&mut self, fd: RawFd) {
        let worker = self.next_worker;
        self.next_worker = (self.next_worker + 1) % self.worker_epoll_fds.len();

        let conn = unsafe { self.slab.get_mut(fd) };
        rebind(conn, fd, worker);

        if let Err(e) = register_fd(self.worker_epoll_fds[worker], fd) {
            warn!(fd, worker, error = %e, "failed to hand connection to worker");
            let _ = close(fd);
        }
    }
}

fn rebind(conn: &mut ConnectionState, fd: RawFd, worker: usize) {
    conn.bind(fd, worker);
}

impl Drop for Acceptor {
    fn drop(&mut self) {
        let _ = close(self.epoll_fd);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_robins_across_workers() {
        let slab: &'static Slab = Box::leak(Box::new(Slab::new(1024)));
        let notify = Box::new(NoopNotify::new().unwrap());
        let worker_fds: Vec<RawFd> = (0..4)
            .map(|_| epoll_create1(EpollCreateFlags::empty()).unwrap())
            .collect();
        let (listen_fd, _keep_listen_peer_open) = nix::unistd::pipe().unwrap();
        let mut acceptor = Acceptor::new(
            listen_fd,
            notify,
            worker_fds.clone(),
            slab,
            Arc::new(AtomicBool::new(false)),
        )
        .unwrap();

        // `dispatch_accepted` registers real fds with real epoll sets, so
        // feed it real (pipe) fds rather than arbitrary small integers.
        let pipes: Vec<(RawFd, RawFd)> = (0..8).map(|_| nix::unistd::pipe().unwrap()).collect();

        let mut assigned_workers = Vec::new();
        for &(read_fd, _write_fd) in &pipes {
            let worker = acceptor.next_worker;
            acceptor.dispatch_accepted(read_fd);
            assigned_workers.push(worker);
        }

        assert_eq!(assigned_workers, vec![0, 1, 2, 3, 0, 1, 2, 3]);

        for (read_fd, write_fd) in pipes {
            let _ = close(read_fd);
            let _ = close(write_fd);
        }
        for fd in worker_fds {
            let _ = close(fd);
        }
        let _ = close(listen_fd);
        let _ = close(_keep_listen_peer_open);
    }
}
