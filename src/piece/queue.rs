use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// FIFO of piece indices shared by every download worker.
///
/// Each index is always in exactly one place: queued, held by a single
/// [`Claim`], or accepted. The lock only guards O(1) deque operations and
/// is never held across an await.
#[derive(Debug)]
pub struct WorkQueue {
    state: Mutex<QueueState>,
    changed: Notify,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<u32>,
    in_flight: usize,
}

impl WorkQueue {
    pub fn new(indices: impl IntoIterator<Item = u32>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                pending: indices.into_iter().collect(),
                in_flight: 0,
            }),
            changed: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // Every critical section leaves the state consistent, so a
        // poisoned lock is still safe to use
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take the next index off the front of the queue.
    ///
    /// While the queue is empty but other claims are outstanding this waits,
    /// since a failing worker may still hand its index back. Without that
    /// wait a requeued index could outlive every worker able to fetch it.
    /// `None` means every index has been accepted.
    pub async fn claim(&self) -> Option<Claim<'_>> {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            // Register before looking, so a release in between is not missed
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if let Some(index) = state.pending.pop_front() {
                    state.in_flight += 1;
                    return Some(Claim {
                        queue: self,
                        index,
                        settled: false,
                    });
                }
                if state.in_flight == 0 {
                    return None;
                }
            }

            notified.await;
        }
    }

    fn release(&self, index: u32, requeue: bool) {
        {
            let mut state = self.lock();
            state.in_flight -= 1;
            if requeue {
                state.pending.push_back(index);
            }
        }
        self.changed.notify_waiters();
    }

    /// Indices waiting to be claimed, front first
    pub fn pending(&self) -> Vec<u32> {
        self.lock().pending.iter().copied().collect()
    }

    /// Number of indices currently claimed
    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }
}

/// Exclusive hold on one piece index.
///
/// Settle it with [`Claim::complete`] or [`Claim::requeue`]. A claim
/// dropped unsettled (a worker that panicked or was cancelled) goes back
/// on the queue.
#[derive(Debug)]
pub struct Claim<'a> {
    queue: &'a WorkQueue,
    index: u32,
    settled: bool,
}

impl Claim<'_> {
    pub fn index(&self) -> u32 {
        self.index
    }

    /// The piece was fetched and verified
    pub fn complete(mut self) {
        self.settled = true;
        self.queue.release(self.index, false);
    }

    /// The piece failed; put it back at the tail
    pub fn requeue(mut self) {
        self.settled = true;
        self.queue.release(self.index, true);
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.queue.release(self.index, true);
        }
    }
}
