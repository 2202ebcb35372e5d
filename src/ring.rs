//! Bounded buffers used for media delivery.
//!
//! Two distinct shapes appear in the architecture:
//!
//! - [`new_ring`]: a session's outgoing packet queue, handed off between the
//!   stream-fanout call and the session's writer task. Built directly on a
//!   bounded `crossbeam-channel`, so closing it (dropping every `Sender`)
//!   naturally wakes a consumer blocked in `recv`, with no extra signaling.
//!   Publishing uses `try_send` and drops the packet on a full ring rather
//!   than blocking the publisher (policy-driven drop, see DESIGN.md).
//! - [`PacketPool`]: the per-connection pre-allocated RTP buffer ring used by
//!   the read loop to avoid an allocation per interleaved frame. This one
//!   never crosses a thread boundary — only the connection's own read task
//!   touches it — so it's a plain reusable `Vec<Vec<u8>>`, not a channel.

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::error::{Result, RtspError};

pub fn validate_power_of_two(capacity: usize) -> Result<()> {
    if capacity == 0 || !capacity.is_power_of_two() {
        return Err(RtspError::WriteBufferMisconfigured(capacity));
    }
    Ok(())
}

/// Builds a bounded channel to use as a packet ring, after checking that
/// `capacity` is a non-zero power of two.
pub fn new_ring<T>(capacity: usize) -> Result<(Sender<T>, Receiver<T>)> {
    validate_power_of_two(capacity)?;
    Ok(bounded(capacity))
}

/// Non-blocking publish into a ring built by [`new_ring`]. Returns `false`
/// (and silently drops `item`) if the ring is full or already closed.
pub fn try_publish<T>(tx: &Sender<T>, item: T) -> bool {
    tx.try_send(item).is_ok()
}

/// Fixed pool of reusable byte buffers for the connection's read loop.
///
/// `next_slot` hands out buffers round-robin; the caller (the read loop) is
/// responsible for making sure the handler callback finishes consuming a
/// slot's previous contents before the pool wraps back around to it — with
/// `capacity` a power of two comfortably larger than the number of
/// in-flight packets, that's true in practice.
pub struct PacketPool {
    buffers: Vec<Vec<u8>>,
    mask: usize,
    next: usize,
}

impl PacketPool {
    pub fn new(capacity: usize) -> Result<Self> {
        validate_power_of_two(capacity)?;
        Ok(Self {
            buffers: vec![Vec::new(); capacity],
            mask: capacity - 1,
            next: 0,
        })
    }

    pub fn next_slot(&mut self) -> &mut Vec<u8> {
        let index = self.next & self.mask;
        self.next = self.next.wrapping_add(1);
        &mut self.buffers[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_power_of_two_capacity() {
        assert!(new_ring::<u8>(3).is_err());
        assert!(new_ring::<u8>(0).is_err());
        assert!(new_ring::<u8>(16).is_ok());
    }

    #[test]
    fn publish_drops_on_full_ring() {
        let (tx, rx) = new_ring::<u32>(2).unwrap();
        assert!(try_publish(&tx, 1));
        assert!(try_publish(&tx, 2));
        assert!(!try_publish(&tx, 3));
        assert_eq!(rx.try_recv().unwrap(), 1);
    }

    #[test]
    fn dropping_sender_wakes_blocked_receiver() {
        let (tx, rx) = new_ring::<u32>(4).unwrap();
        drop(tx);
        assert!(rx.recv().is_err());
    }

    #[test]
    fn packet_pool_wraps_around() {
        let mut pool = PacketPool::new(2).unwrap();
        pool.next_slot().extend_from_slice(b"a");
        pool.next_slot().extend_from_slice(b"b");
        assert_eq!(pool.next_slot().as_slice(), b"a");
    }
}
