//! In-process backend: every rank of the group is a thread of the current process.
//!
//! Collectives rendezvous through an [`Exchange`] shared by the members of a
//! communicator. Each member deposits its contribution in its slot, waits on a
//! generation barrier, reads what it needs and waits again before the slots may be
//! reused.

use super::Comm;
use crate::types::Payload;
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};

type Slot = Option<Box<dyn Any + Send>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn slot_ref<V: 'static>(slot: &Slot) -> &V {
    match slot.as_ref().and_then(|b| b.downcast_ref::<V>()) {
        Some(value) => value,
        None => panic!("Peers entered different collectives"),
    }
}

fn slot_mut<V: 'static>(slot: &mut Slot) -> &mut V {
    match slot.as_mut().and_then(|b| b.downcast_mut::<V>()) {
        Some(value) => value,
        None => panic!("Peers entered different collectives"),
    }
}

/// State shared by all ranks of a universe.
struct Universe {
    departed: Vec<AtomicBool>,
    /// Every exchange created in the universe, so that a departure can wake its waiters
    exchanges: Mutex<Vec<Weak<Exchange>>>,
}

impl Universe {
    fn departed_member(&self, members: &[usize]) -> Option<usize> {
        members
            .iter()
            .copied()
            .find(|&w| self.departed[w].load(Ordering::Acquire))
    }

    fn register(&self, exchange: &Arc<Exchange>) {
        let mut exchanges = lock(&self.exchanges);
        exchanges.retain(|e| e.strong_count() > 0);
        exchanges.push(Arc::downgrade(exchange));
    }

    /// Mark `rank` as gone and wake every collective it is a member of.
    fn depart(&self, rank: usize) {
        self.departed[rank].store(true, Ordering::Release);
        let exchanges = lock(&self.exchanges)
            .iter()
            .filter_map(Weak::upgrade)
            .collect::<Vec<_>>();
        for exchange in exchanges {
            if exchange.members.contains(&rank) {
                // Taking the state lock orders the notification after any waiter's check.
                let _state = lock(&exchange.state);
                exchange.cvar.notify_all();
            }
        }
    }
}

/// Marks a rank as gone when its thread stops, whether it returned or panicked.
struct Departure<'u> {
    universe: &'u Universe,
    rank: usize,
}

impl Drop for Departure<'_> {
    fn drop(&mut self) {
        self.universe.depart(self.rank);
    }
}

struct BarrierState {
    arrived: usize,
    generation: u64,
}

/// Rendezvous point of one communicator.
struct Exchange {
    universe: Arc<Universe>,
    /// Universe rank of every member, in communicator order
    members: Vec<usize>,
    slots: Mutex<Vec<Slot>>,
    state: Mutex<BarrierState>,
    cvar: Condvar,
}

impl Exchange {
    fn create(universe: Arc<Universe>, members: Vec<usize>) -> Arc<Self> {
        let slots = (0..members.len()).map(|_| None).collect();
        let exchange = Arc::new(Self {
            universe,
            members,
            slots: Mutex::new(slots),
            state: Mutex::new(BarrierState {
                arrived: 0,
                generation: 0,
            }),
            cvar: Condvar::new(),
        });
        exchange.universe.register(&exchange);
        exchange
    }

    fn put(&self, index: usize, item: Box<dyn Any + Send>) {
        lock(&self.slots)[index] = Some(item);
    }

    fn wait(&self) {
        let mut state = lock(&self.state);
        let generation = state.generation;
        state.arrived += 1;
        if state.arrived == self.members.len() {
            state.arrived = 0;
            state.generation = state.generation.wrapping_add(1);
            self.cvar.notify_all();
            return;
        }
        loop {
            if let Some(rank) = self.universe.departed_member(&self.members) {
                drop(state);
                panic!("Rank {rank} left the process group during a collective");
            }
            state = self
                .cvar
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
            if state.generation != generation {
                return;
            }
        }
    }
}

/// Communicator between threads of one [`ThreadUniverse`].
pub struct ThreadComm {
    rank: usize,
    exchange: Arc<Exchange>,
}

impl ThreadComm {
    /// Rank of the calling thread in the universe it was started in.
    pub fn universe_rank(&self) -> usize {
        self.exchange.members[self.rank]
    }

    fn gather_any<V: Any + Send + Clone>(&self, value: V) -> Vec<V> {
        self.exchange.put(self.rank, Box::new(value));
        self.exchange.wait();
        let gathered = lock(&self.exchange.slots)
            .iter()
            .map(|slot| slot_ref::<V>(slot).clone())
            .collect();
        self.exchange.wait();
        gathered
    }
}

impl Comm for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.exchange.members.len()
    }

    fn split(&self, color: usize, key: usize) -> Self {
        let requests = self.gather_any((color, key));
        let mut group = (0..requests.len())
            .filter(|&r| requests[r].0 == color)
            .collect::<Vec<_>>();
        group.sort_by_key(|&r| (requests[r].1, r));
        let leader = group[0];
        let rank = group.iter().take_while(|&&r| r != self.rank).count();

        let created = if self.rank == leader {
            let members = group.iter().map(|&r| self.exchange.members[r]).collect();
            Some(Exchange::create(self.exchange.universe.clone(), members))
        } else {
            None
        };
        let mut shared = self.gather_any(created);
        match shared.swap_remove(leader) {
            Some(exchange) => ThreadComm { rank, exchange },
            None => unreachable!("the leader of a group always creates its exchange"),
        }
    }

    fn barrier(&self) {
        self.exchange.wait();
    }

    fn all_gather_v<T: Payload>(&self, send: &[T]) -> Vec<Vec<T>> {
        self.gather_any(send.to_vec())
    }

    fn all_to_all_v<T: Payload>(&self, send: Vec<Vec<T>>) -> Vec<Vec<T>> {
        assert_eq!(
            send.len(),
            self.size(),
            "One packet per rank is required for an all-to-all"
        );
        self.exchange.put(self.rank, Box::new(send));
        self.exchange.wait();
        let received = lock(&self.exchange.slots)
            .iter_mut()
            .map(|slot| std::mem::take(&mut slot_mut::<Vec<Vec<T>>>(slot)[self.rank]))
            .collect();
        self.exchange.wait();
        received
    }

    fn broadcast<T: Payload>(&self, data: &mut Vec<T>, root: usize) {
        if self.rank == root {
            self.exchange.put(root, Box::new(data.clone()));
        }
        self.exchange.wait();
        if self.rank != root {
            *data = slot_ref::<Vec<T>>(&lock(&self.exchange.slots)[root]).clone();
        }
        self.exchange.wait();
    }
}

/// Runs a closure once per rank, each on its own thread.
///
/// ```
/// use distmat::{Comm, ThreadUniverse};
///
/// let ranks = ThreadUniverse::run(4, |comm| comm.all_gather(comm.rank()));
/// assert_eq!(ranks[2], vec![0, 1, 2, 3]);
/// ```
pub struct ThreadUniverse;

impl ThreadUniverse {
    /// Run `f` on `size` ranks and return the results in rank order.
    ///
    /// If a rank panics, every peer blocked in a collective with it panics too, and the
    /// panic of the lowest failed rank is resumed once all threads have stopped.
    pub fn run<R, F>(size: usize, f: F) -> Vec<R>
    where
        F: Fn(ThreadComm) -> R + Sync,
        R: Send,
    {
        assert!(size > 0, "A universe needs at least one rank");
        let universe = Arc::new(Universe {
            departed: (0..size).map(|_| AtomicBool::new(false)).collect(),
            exchanges: Mutex::new(vec![]),
        });
        let world = Exchange::create(universe.clone(), (0..size).collect());

        let joined = std::thread::scope(|scope| {
            let handles = (0..size)
                .map(|rank| {
                    let comm = ThreadComm {
                        rank,
                        exchange: world.clone(),
                    };
                    let universe = &*universe;
                    let f = &f;
                    scope.spawn(move || {
                        let _departure = Departure { universe, rank };
                        f(comm)
                    })
                })
                .collect::<Vec<_>>();
            handles.into_iter().map(|h| h.join()).collect::<Vec<_>>()
        });

        let mut results = Vec::with_capacity(size);
        let mut failure = None;
        for outcome in joined {
            match outcome {
                Ok(value) => results.push(value),
                Err(payload) => {
                    if failure.is_none() {
                        failure = Some(payload);
                    }
                }
            }
        }
        if let Some(payload) = failure {
            std::panic::resume_unwind(payload);
        }
        results
    }
}
