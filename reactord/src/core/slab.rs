//! Slab (SL): a flat, fd-indexed connection-state table.
//!
//! One instance per process, shared by all workers. There is no hashing
//! and no free list — the OS fd allocator is the free list, and fd
//! sharding (a live fd is owned by exactly one worker) guarantees no two
//! threads ever touch the same slot concurrently. That guarantee is a
//! runtime invariant enforced by the reactor's dispatch discipline, not
//! something the type system can see, so slot access goes through a thin
//! `unsafe` accessor — the direct translation of the teacher's own
//! raw-pointer channel structures (`NexusChannel` wraps `*mut
//! NexusChannelInner`) to a per-fd shard instead of a per-core one.

use crate::core::connection::ConnectionState;
use bytes::BytesMut;
use std::cell::UnsafeCell;
use std::os::unix::io::RawFd;

pub struct Slab {
    slots: Box<[UnsafeCell<ConnectionState>]>,
}

// Safety: callers only ever call `get_mut(fd)` from the single worker
// thread that owns `fd`'s epoll registration (see module docs). No two
// threads observe the same index at the same time.
unsafe impl Sync for Slab {}

impl Slab {
    /// Allocate `len` zero-initialized slots, one per legal fd value.
    pub fn new(len: usize) -> Self {
        let slots = (0..len)
            .map(|fd| UnsafeCell::new(ConnectionState::new(fd as RawFd)))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Slab { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Borrow the slot for `fd`.
    ///
    /// # Safety
    /// The caller must be the single worker thread `fd` is currently
    /// dispatched to (or, before the first dispatch, the acceptor binding
    /// a freshly accepted fd that no worker has observed yet).
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get_mut(&self, fd: RawFd) -> &mut ConnectionState {
        &mut *self.slots[fd as usize].get()
    }

    /// Release every slot's response buffer allocation (spec §4.6
    /// shutdown step 5).
    ///
    /// # Safety
    /// Callers must ensure no worker thread still holds a `get_mut`
    /// borrow into this slab — i.e. every worker has already been
    /// joined.
    pub unsafe fn free_response_buffers(&self) {
        for slot in self.slots.iter() {
            (*slot.get()).response_buffer = BytesMut::new();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fd_is_its_own_index() {
        let slab = Slab::new(16);
        for fd in 0..16 {
            let conn = unsafe { slab.get_mut(fd) };
            assert_eq!(conn.fd, fd as RawFd);
        }
    }

    #[test]
    fn slot_survives_across_fd_reuse() {
        let slab = Slab::new(4);
        unsafe {
            let conn = slab.get_mut(2);
            conn.flags.alive = true;
            conn.bind(2, 0);
            assert!(!conn.flags.alive);
        }
    }
}
