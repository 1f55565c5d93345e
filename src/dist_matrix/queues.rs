//! Queued remote updates and pulls
//!
//! Both queues are drained by a personalised exchange over the column-major communicator
//! of the grid, so every process of the grid slice has to take part even when its own
//! queue is empty.
use super::DistMatrix;
use crate::comm::Comm;
use crate::distribution::OwnerMap;
use crate::error::{Error, Result};
use crate::grid::CommKind;
use crate::types::{Element, Entry};
use itertools::izip;

impl<T: Element, C: Comm> DistMatrix<'_, T, C> {
    /// Make room for `count` queued updates.
    pub fn reserve(&mut self, count: usize) {
        self.remote_updates.reserve(count);
    }

    /// Queue an addition to entry `(i, j)`; nothing is sent until [`Self::process_queues`].
    pub fn queue_update(&mut self, i: usize, j: usize, value: T) -> Result<()> {
        self.assert_valid_entry(i, j)?;
        self.assert_not_locked()?;
        self.remote_updates.push(Entry::new(i, j, value));
        Ok(())
    }

    /// Queue an addition given as an entry.
    pub fn queue_update_entry(&mut self, entry: Entry<T>) -> Result<()> {
        self.queue_update(entry.i, entry.j, entry.value)
    }

    /// Number of queued updates
    pub fn queued_updates(&self) -> usize {
        self.remote_updates.len()
    }

    /// Deliver every queued update to all processes storing its entry and add it there.
    ///
    /// Collective over the grid.
    pub fn process_queues(&mut self) -> Result<()> {
        self.assert_not_locked()?;
        if !self.grid.participating() {
            self.remote_updates.clear();
            return Err(Error::NotParticipating.report());
        }
        let grid = self.grid;
        let comm = grid.comm(CommKind::Vc);
        let map = OwnerMap::new(grid, self.dist, self.root);
        let updates = std::mem::take(&mut self.remote_updates);
        log::trace!("Sending {} queued updates", updates.len());

        let mut indices = vec![Vec::new(); comm.size()];
        let mut values = vec![Vec::new(); comm.size()];
        for entry in &updates {
            for &holder in map.holders(self.row_owner(entry.i), self.col_owner(entry.j)) {
                indices[holder].extend([entry.i, entry.j]);
                values[holder].push(entry.value);
            }
        }
        let indices = comm.all_to_all_v(indices);
        let values = comm.all_to_all_v(values);

        for (indices, values) in izip!(&indices, &values) {
            for (ij, &value) in izip!(indices.chunks_exact(2), values) {
                let (i_loc, j_loc) = (self.local_row_offset(ij[0]), self.local_col_offset(ij[1]));
                self.matrix.update(i_loc, j_loc, value);
            }
        }
        Ok(())
    }

    /// Make room for `count` queued pulls.
    pub fn reserve_pulls(&self, count: usize) {
        self.remote_pulls.borrow_mut().reserve(count);
    }

    /// Ask for the value of entry `(i, j)` at the next [`Self::process_pull_queue`].
    pub fn queue_pull(&self, i: usize, j: usize) -> Result<()> {
        self.assert_valid_entry(i, j)?;
        self.remote_pulls.borrow_mut().push((i, j));
        Ok(())
    }

    /// Number of queued pulls
    pub fn queued_pulls(&self) -> usize {
        self.remote_pulls.borrow().len()
    }

    /// Fetch the values of the queued pulls, in the order they were queued.
    ///
    /// Every entry is served by the first of its holders, so processes pulling the same
    /// entries observe the same values. Collective over the grid.
    pub fn process_pull_queue(&self) -> Result<Vec<T>> {
        let pulls = std::mem::take(&mut *self.remote_pulls.borrow_mut());
        if !self.grid.participating() {
            return Err(Error::NotParticipating.report());
        }
        let comm = self.grid.comm(CommKind::Vc);
        let map = OwnerMap::new(self.grid, self.dist, self.root);

        let mut requests = vec![Vec::new(); comm.size()];
        let sources = pulls
            .iter()
            .map(|&(i, j)| {
                let source = map.designated(self.row_owner(i), self.col_owner(j));
                requests[source].extend([i, j]);
                source
            })
            .collect::<Vec<_>>();
        let requests = comm.all_to_all_v(requests);

        let replies = requests
            .iter()
            .map(|request| {
                request
                    .chunks_exact(2)
                    .map(|ij| {
                        self.get_local(self.local_row_offset(ij[0]), self.local_col_offset(ij[1]))
                    })
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();
        let replies = comm.all_to_all_v(replies);

        let mut cursors = vec![0; comm.size()];
        Ok(sources
            .into_iter()
            .map(|source| {
                let value = replies[source][cursors[source]];
                cursors[source] += 1;
                value
            })
            .collect())
    }
}
