//! Process configuration.
//!
//! CLI-only, matching the teacher's `structopt` convention; no config
//! file format is introduced since none of the ambient stack this crate
//! is grounded on carries one.

use std::net::{IpAddr, Ipv4Addr};
use structopt::StructOpt;

/// Keep-alive ticks: each tick is one second of reactor idle timeout
/// (the death queue is enrolled in units of ticks, not wall-clock time).
pub const DEFAULT_KEEP_ALIVE_TIMEOUT: u32 = 15;

#[derive(Debug, Clone, StructOpt)]
#[structopt(name = "reactord", about = "Multi-reactor HTTP connection engine")]
pub struct Config {
    /// TCP port to listen on.
    #[structopt(long, short, default_value = "8080")]
    pub port: u16,

    /// Number of worker reactors. Defaults to the number of online CPUs.
    #[structopt(long)]
    pub workers: Option<usize>,

    /// Seconds of idle time before a keep-alive connection is reaped.
    #[structopt(long, default_value = "15")]
    pub keep_alive_timeout: u32,

    /// Upper bound on simultaneously tracked connections per worker; also
    /// sizes each worker's epoll scratch buffer and death-queue ring.
    #[structopt(long, default_value = "65536")]
    pub max_conns_per_worker: usize,

    /// listen() backlog override. Defaults to `workers * max_conns_per_worker`.
    #[structopt(long)]
    pub backlog: Option<i32>,
}

impl Config {
    pub fn bind_addr(&self) -> IpAddr {
        IpAddr::V4(Ipv4Addr::UNSPECIFIED)
    }

    pub fn resolved_workers(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    pub fn resolved_backlog(&self) -> i32 {
        self.backlog.unwrap_or_else(|| {
            (self.resolved_workers() * self.max_conns_per_worker) as i32
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 8080,
            workers: None,
            keep_alive_timeout: DEFAULT_KEEP_ALIVE_TIMEOUT,
            max_conns_per_worker: 65536,
            backlog: None,
        }
    }
}
