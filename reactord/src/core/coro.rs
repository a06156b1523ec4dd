//! Coroutine Runtime (CR).
//!
//! Stackful coroutines are unavailable in safe Rust, so per the Design
//! Notes this is realized as the suggested fallback: the per-request body
//! is an `async fn`, and "resume" is a single manual poll of it with a
//! no-op waker — the same manual-poll idiom the teacher uses to drive
//! futures from its own reactor loop (`Reactor::block_on`). Suspension
//! points are ordinary `.await`s on [`YieldOnce`]; the direction (read vs
//! write) the coroutine wants is recorded in a side channel ([`Interest`])
//! read back by the worker immediately after a `Pending` poll.

use futures::task::{noop_waker_ref, Context, Poll};
use std::cell::Cell;
use std::future::Future;
use std::os::unix::io::RawFd;
use std::pin::Pin;
use std::rc::Rc;

/// I/O direction a suspended coroutine is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Read,
    Write,
}

/// Outcome of a single [`Coro::resume`] step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeOutcome {
    /// The entry function returned; the coroutine is finished.
    Finished,
    /// The coroutine yielded wanting this I/O direction next.
    Yielded(Interest),
}

/// A future that is `Pending` exactly once, then `Ready`. `.await`ing one
/// suspends the enclosing coroutine for a single reactor dispatch.
#[derive(Default)]
pub(crate) struct YieldOnce {
    polled: bool,
}

impl Future for YieldOnce {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        if self.polled {
            Poll::Ready(())
        } else {
            self.polled = true;
            Poll::Pending
        }
    }
}

/// Handle the per-request entry closure uses to suspend itself. Cheap to
/// clone (an `Rc`), never crosses a worker thread boundary.
#[derive(Clone)]
pub struct ConnIo {
    fd: RawFd,
    interest: Rc<Cell<Interest>>,
}

impl ConnIo {
    fn new(fd: RawFd) -> Self {
        ConnIo {
            fd,
            interest: Rc::new(Cell::new(Interest::Read)),
        }
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// Suspend until the fd is readable.
    pub async fn wait_readable(&self) {
        self.interest.set(Interest::Read);
        YieldOnce::default().await
    }

    /// Suspend until the fd is writable.
    pub async fn wait_writable(&self) {
        self.interest.set(Interest::Write);
        YieldOnce::default().await
    }
}

/// A single per-connection coroutine instance.
pub struct Coro {
    fd: RawFd,
    task: async_task::Task<()>,
    interest: Rc<Cell<Interest>>,
}

impl Coro {
    /// Create a coroutine primed to run `entry(conn_io)` on first resume.
    /// `entry` receives the handle it must suspend through; any other
    /// captured state (the connection's own data) is the Rust analogue of
    /// `coro_get_data`: the closure simply owns it.
    pub fn create<F, Fut>(fd: RawFd, entry: F) -> Coro
    where
        F: FnOnce(ConnIo) -> Fut,
        Fut: Future<Output = ()> + 'static,
    {
        let io = ConnIo::new(fd);
        let interest = io.interest.clone();
        let future = entry(io);

        // The schedule callback fires if the future calls `cx.waker().wake()`
        // on its own initiative; this design never does that; direction is
        // instead always re-read immediately after a `Pending` poll.
        fn noop_schedule(_runnable: async_task::Runnable) {}
        let (_runnable, task) = async_task::spawn_local(future, noop_schedule);

        Coro { fd, task, interest }
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// Transfer control to the coroutine until it yields or returns.
    pub fn resume(&mut self) -> ResumeOutcome {
        let waker = noop_waker_ref();
        let mut cx = Context::from_waker(waker);
        match Pin::new(&mut self.task).poll(&mut cx) {
            Poll::Ready(()) => ResumeOutcome::Finished,
            Poll::Pending => ResumeOutcome::Yielded(self.interest.get()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn yields_then_finishes() {
        let log: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));
        let log2 = log.clone();

        let mut coro = Coro::create(9, move |io| {
            let log = log2.clone();
            async move {
                log.borrow_mut().push("before-read");
                io.wait_readable().await;
                log.borrow_mut().push("after-read");
                io.wait_writable().await;
                log.borrow_mut().push("after-write");
            }
        });

        assert_eq!(coro.resume(), ResumeOutcome::Yielded(Interest::Read));
        assert_eq!(*log.borrow(), vec!["before-read"]);

        assert_eq!(coro.resume(), ResumeOutcome::Yielded(Interest::Write));
        assert_eq!(*log.borrow(), vec!["before-read", "after-read"]);

        assert_eq!(coro.resume(), ResumeOutcome::Finished);
        assert_eq!(
            *log.borrow(),
            vec!["before-read", "after-read", "after-write"]
        );
    }

    #[test]
    fn entry_with_no_yield_finishes_immediately() {
        let mut coro = Coro::create(1, |_io| async move {});
        assert_eq!(coro.resume(), ResumeOutcome::Finished);
    }
}
