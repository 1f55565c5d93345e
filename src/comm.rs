//! Communicators
//!
//! The library only talks to other processes through the [`Comm`] trait. Every method is a
//! collective over the members of the communicator: all members must call it, in the same
//! order, or the process group aborts.

#[cfg(feature = "mpi")]
mod mpi_comm;
mod thread;

#[cfg(feature = "mpi")]
pub use mpi_comm::MpiComm;
pub use thread::{ThreadComm, ThreadUniverse};

use crate::types::Payload;

/// A group of processes that can exchange data.
pub trait Comm {
    /// Rank of the calling process within the communicator
    fn rank(&self) -> usize;

    /// Number of processes in the communicator
    fn size(&self) -> usize;

    /// Split into sub-communicators, one per distinct `color`, ordering each by
    /// `(key, rank)`.
    fn split(&self, color: usize, key: usize) -> Self
    where
        Self: Sized;

    /// Block until every member has reached the barrier.
    fn barrier(&self);

    /// Gather a variable-length contribution from every member on every member.
    ///
    /// The result is indexed by the rank of the contributor.
    fn all_gather_v<T: Payload>(&self, send: &[T]) -> Vec<Vec<T>>;

    /// Personalised all-to-all exchange.
    ///
    /// `send[r]` is delivered to rank `r`; entry `s` of the result was sent by rank `s`.
    fn all_to_all_v<T: Payload>(&self, send: Vec<Vec<T>>) -> Vec<Vec<T>>;

    /// Replace `data` on every member by its contents on `root`.
    fn broadcast<T: Payload>(&self, data: &mut Vec<T>, root: usize);

    /// Gather one value from every member on every member.
    fn all_gather<T: Payload>(&self, value: T) -> Vec<T> {
        self.all_gather_v(&[value])
            .into_iter()
            .flat_map(|v| v.into_iter().take(1))
            .collect()
    }

    /// Broadcast a single value from `root`.
    fn broadcast_value<T: Payload>(&self, value: T, root: usize) -> T {
        let mut data = vec![value];
        self.broadcast(&mut data, root);
        data.first().copied().unwrap_or(value)
    }

    /// Send `send` to `dest` while receiving from `source`.
    ///
    /// Every member must call this; the `(dest, source)` pairs must form a permutation.
    fn send_recv<T: Payload>(&self, send: &[T], dest: usize, source: usize) -> Vec<T> {
        let mut packets = vec![Vec::new(); self.size()];
        packets[dest] = send.to_vec();
        let mut received = self.all_to_all_v(packets);
        std::mem::take(&mut received[source])
    }
}
