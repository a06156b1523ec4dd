//! Lifecycle Controller (LC): init and shutdown ordering (spec §4.6).

use crate::config::Config;
use crate::core::acceptor::{Acceptor, NoopNotify};
use crate::core::reactor::Reactor;
use crate::core::slab::Slab;
use crate::error::{
    BindSnafu, CreateEpollSnafu, CreateSocketSnafu, InitError, InstallSignalSnafu, ListenSnafu,
    RouterInitSnafu, SpawnWorkerSnafu,
};
use crate::router::{EntrySpec, Router};
use nix::errno::Errno;
use nix::sys::signal::{signal, SigHandler, Signal};
use nix::sys::socket::{bind, listen, setsockopt, socket, sockopt, AddressFamily, InetAddr, SockAddr, SockFlag, SockType};
use nix::unistd::close;
use snafu::ResultExt;
use std::os::unix::io::RawFd;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::info;

pub struct Server {
    config: Config,
    listen_fd: RawFd,
    slab: &'static Slab,
    router: &'static mut Router,
    worker_epoll_fds: Vec<RawFd>,
    worker_handles: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    acceptor: Acceptor,
}

impl Server {
    /// Run the full init order: raise RLIMIT_NOFILE, allocate SL, seed
    /// signal dispositions, close stdin, bind the listening socket,
    /// spawn workers, build the router.
    pub fn bootstrap(config: Config, entries: Vec<EntrySpec>) -> Result<Server, InitError> {
        let max_fd = raise_fd_limit()?;

        let slab: &'static Slab = Box::leak(Box::new(Slab::new(max_fd as usize)));
        let router: &'static mut Router =
            Box::leak(Box::new(Router::build(entries).context(RouterInitSnafu)?));

        install_signal_dispositions()?;
        close_stdin();

        let listen_fd = bind_listener(&config)?;

        let workers = config.resolved_workers();
        let mut worker_epoll_fds = Vec::with_capacity(workers);
        let mut worker_handles = Vec::with_capacity(workers);

        let router_shared: &'static Router = &*router;
        for id in 0..workers {
            let mut reactor = Reactor::new(id, slab, router_shared, config.max_conns_per_worker, config.keep_alive_timeout)?;
            worker_epoll_fds.push(reactor.epoll_fd());
            let handle = std::thread::Builder::new()
                .name(format!("reactor-{id}"))
                .spawn(move || reactor.run())
                .context(SpawnWorkerSnafu { id })?;
            worker_handles.push(handle);
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        let notify = Box::new(NoopNotify::new().context(CreateEpollSnafu)?);
        let acceptor = Acceptor::new(listen_fd, notify, worker_epoll_fds.clone(), slab, shutdown.clone())
            // `Acceptor::new` only ever produces `EpollCtl`; reuse
            // `InitError::CreateEpoll` rather than add an init-only variant
            // that would just duplicate its shape.
            .map_err(|source| match source {
                crate::error::ReactorError::EpollCtl { source, .. } => InitError::CreateEpoll { source },
                _ => unreachable!("Acceptor::new only returns EpollCtl"),
            })?;

        info!(workers, port = config.port, "server bootstrapped");

        Ok(Server {
            config,
            listen_fd,
            slab,
            router,
            worker_epoll_fds,
            worker_handles,
            shutdown,
            acceptor,
        })
    }

    /// Install a SIGINT handler that flips this server's shutdown flag,
    /// then run the acceptor loop on the calling thread until it
    /// observes that flag (spec §5: "the main thread... becomes the
    /// acceptor after init").
    pub fn run(&mut self) -> Result<(), InitError> {
        signal_hook::flag::register(signal_hook::consts::SIGINT, self.shutdown.clone())
            .context(InstallSignalSnafu)?;

        self.acceptor.run();
        self.shutdown();
        Ok(())
    }

    /// Reverse shutdown order (spec §4.6): close worker epoll fds (they
    /// exit their own `epoll_wait` on the next iteration), join them,
    /// close the listening socket, tear down the router, free
    /// per-connection response buffers, then free SL itself.
    fn shutdown(&mut self) {
        info!("shutting down");
        for fd in &self.worker_epoll_fds {
            let _ = close(*fd);
        }
        for handle in self.worker_handles.drain(..) {
            let _ = handle.join();
        }
        let _ = close(self.listen_fd);
        self.router.teardown();

        // Safety: every worker that could hold a `get_mut` borrow into
        // `slab` has been joined above, so no concurrent access remains.
        unsafe {
            self.slab.free_response_buffers();
            drop(Box::from_raw(self.slab as *const Slab as *mut Slab));
        }

        info!("shutdown complete");
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// A clone of the shutdown flag the acceptor polls. Flipping it from
    /// another thread (tests do this instead of sending a real SIGINT)
    /// unblocks [`Server::run`] on its next acceptor poll.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }
}

fn raise_fd_limit() -> Result<u64, InitError> {
    let mut rl = libc::rlimit { rlim_cur: 0, rlim_max: 0 };
    if unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut rl) } != 0 {
        return Err(InitError::RaiseNoFile { source: Errno::last() });
    }
    let target = if rl.rlim_max == libc::RLIM_INFINITY {
        rl.rlim_cur.saturating_mul(8)
    } else {
        rl.rlim_max
    };
    rl.rlim_cur = target;
    if unsafe { libc::setrlimit(libc::RLIMIT_NOFILE, &rl) } != 0 {
        return Err(InitError::RaiseNoFile { source: Errno::last() });
    }
    Ok(target)
}

/// Ignore SIGPIPE (writes to a peer that reset its connection would
/// otherwise kill the process); spec §4.6 step 2.
fn install_signal_dispositions() -> Result<(), InitError> {
    unsafe { signal(Signal::SIGPIPE, SigHandler::SigIgn) }
        .map_err(|source| InitError::InstallSignal { source: std::io::Error::from_raw_os_error(source as i32) })?;
    Ok(())
}

fn close_stdin() {
    let _ = close(0);
}

fn bind_listener(config: &Config) -> Result<RawFd, InitError> {
    let fd = socket(AddressFamily::Inet, SockType::Stream, SockFlag::SOCK_NONBLOCK, None)
        .context(CreateSocketSnafu)?;

    setsockopt(fd, sockopt::ReuseAddr, &true).context(CreateSocketSnafu)?;
    set_linger(fd, 1, 1);

    let addr = SockAddr::Inet(InetAddr::new(config.bind_addr(), config.port));
    bind(fd, &addr).context(BindSnafu {
        addr: format!("{}:{}", config.bind_addr(), config.port),
    })?;

    let backlog = config.resolved_backlog();
    listen(fd, backlog as usize).context(ListenSnafu { backlog })?;

    Ok(fd)
}

fn set_linger(fd: RawFd, onoff: i32, linger_secs: i32) {
    let linger = libc::linger { l_onoff: onoff, l_linger: linger_secs };
    unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_LINGER,
            &linger as *const libc::linger as *const libc::c_void,
            std::mem::size_of::<libc::linger>() as libc::socklen_t,
        );
    }
}
