//! Backend on top of the `mpi` crate.
use super::Comm;
use crate::types::Payload;
use mpi::datatype::{Partition, PartitionMut};
use mpi::topology::{Color, SimpleCommunicator};
use mpi::traits::{Communicator, CommunicatorCollectives, Root};
use mpi::Count;

/// Communicator wrapping an MPI communicator.
pub struct MpiComm {
    comm: SimpleCommunicator,
}

impl MpiComm {
    /// Wrap an existing MPI communicator.
    pub fn new(comm: SimpleCommunicator) -> Self {
        Self { comm }
    }

    /// The world communicator. MPI must have been initialised.
    pub fn world() -> Self {
        Self::new(SimpleCommunicator::world())
    }

    /// The underlying MPI communicator.
    pub fn raw(&self) -> &SimpleCommunicator {
        &self.comm
    }
}

fn displacements(counts: &[Count]) -> Vec<Count> {
    counts
        .iter()
        .scan(0, |acc, &c| {
            let d = *acc;
            *acc += c;
            Some(d)
        })
        .collect()
}

/// Cut a received buffer into the contributions of each rank.
fn unpack<T: Payload>(buffer: Vec<T>, counts: &[Count]) -> Vec<Vec<T>> {
    let mut values = buffer.into_iter();
    counts
        .iter()
        .map(|&c| values.by_ref().take(c as usize).collect())
        .collect()
}

impl Comm for MpiComm {
    fn rank(&self) -> usize {
        self.comm.rank() as usize
    }

    fn size(&self) -> usize {
        self.comm.size() as usize
    }

    fn split(&self, color: usize, key: usize) -> Self {
        match self
            .comm
            .split_by_color_with_key(Color::with_value(color as i32), key as i32)
        {
            Some(comm) => Self::new(comm),
            None => unreachable!("a defined color always yields a communicator"),
        }
    }

    fn barrier(&self) {
        self.comm.barrier();
    }

    fn all_gather_v<T: Payload>(&self, send: &[T]) -> Vec<Vec<T>> {
        let mut counts = vec![0 as Count; self.size()];
        self.comm
            .all_gather_into(&(send.len() as Count), &mut counts[..]);
        let displs = displacements(&counts);
        let total = counts.iter().sum::<Count>() as usize;

        let mut buffer = vec![T::default(); total];
        {
            let mut partition = PartitionMut::new(&mut buffer[..], &counts[..], &displs[..]);
            self.comm.all_gather_varcount_into(send, &mut partition);
        }
        unpack(buffer, &counts)
    }

    fn all_to_all_v<T: Payload>(&self, send: Vec<Vec<T>>) -> Vec<Vec<T>> {
        assert_eq!(send.len(), self.size());
        let send_counts = send.iter().map(|v| v.len() as Count).collect::<Vec<_>>();
        let send_displs = displacements(&send_counts);
        let send_buffer = send.into_iter().flatten().collect::<Vec<T>>();

        let mut recv_counts = vec![0 as Count; self.size()];
        self.comm
            .all_to_all_into(&send_counts[..], &mut recv_counts[..]);
        let recv_displs = displacements(&recv_counts);
        let total = recv_counts.iter().sum::<Count>() as usize;

        let mut recv_buffer = vec![T::default(); total];
        {
            let partition = Partition::new(&send_buffer[..], &send_counts[..], &send_displs[..]);
            let mut recv_partition =
                PartitionMut::new(&mut recv_buffer[..], &recv_counts[..], &recv_displs[..]);
            self.comm
                .all_to_all_varcount_into(&partition, &mut recv_partition);
        }
        unpack(recv_buffer, &recv_counts)
    }

    fn broadcast<T: Payload>(&self, data: &mut Vec<T>, root: usize) {
        let root_process = self.comm.process_at_rank(root as i32);
        let mut len = data.len() as u64;
        root_process.broadcast_into(&mut len);
        if self.rank() != root {
            data.clear();
            data.resize(len as usize, T::default());
        }
        root_process.broadcast_into(&mut data[..]);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_unpack() {
        let parts = unpack(vec![1, 2, 3, 4, 5], &[2, 0, 3]);
        assert_eq!(parts, vec![vec![1, 2], vec![], vec![3, 4, 5]]);
        assert_eq!(displacements(&[2, 0, 3]), vec![0, 2, 2]);
    }
}
