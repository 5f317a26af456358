//! Wait queues for blocking reads
//!
//! Each key with blocked readers owns a FIFO of one-shot signals. The engine
//! enqueues and dequeues under the keyspace lock; the signal itself parks
//! the waiter's thread on a condvar. Fairness is enqueue order: a push wakes
//! the head waiter, and a woken waiter that loses the re-check race
//! re-enqueues at the front.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Instant;

/// Observes whether the client a blocked reader serves is still connected.
///
/// Blocking handlers poll this between wait slices: a waiter whose peer has
/// vanished abandons its slot immediately instead of swallowing a wake, and
/// a wake that raced the disconnect is forwarded to the next waiter.
pub trait PeerMonitor: Send + Sync {
    fn is_closed(&self) -> bool;
}

/// Monitor for contexts with no disconnectable peer (the replication apply
/// loop, tests)
pub struct NoPeer;

impl PeerMonitor for NoPeer {
    fn is_closed(&self) -> bool {
        false
    }
}

/// A one-shot wakeup signal owned by a single blocked reader
pub struct WaitSignal {
    signalled: Mutex<bool>,
    cond: Condvar,
}

impl WaitSignal {
    pub fn new() -> Arc<Self> {
        Arc::new(WaitSignal {
            signalled: Mutex::new(false),
            cond: Condvar::new(),
        })
    }

    /// Fire the signal, waking the owning waiter
    pub fn notify(&self) {
        let mut signalled = self.signalled.lock().unwrap();
        *signalled = true;
        self.cond.notify_one();
    }

    /// Park until the signal fires or the deadline passes.
    /// Returns true if woken by a notify, false on timeout.
    /// Consumes the signal so it can be reused for the next wait round.
    pub fn wait_until(&self, deadline: Option<Instant>) -> bool {
        let mut signalled = self.signalled.lock().unwrap();
        loop {
            if *signalled {
                *signalled = false;
                return true;
            }
            match deadline {
                None => {
                    signalled = self.cond.wait(signalled).unwrap();
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    let (guard, result) =
                        self.cond.wait_timeout(signalled, deadline - now).unwrap();
                    signalled = guard;
                    if result.timed_out() && !*signalled {
                        return false;
                    }
                }
            }
        }
    }

    /// Consume a pending notification without waiting.
    /// Used to detect a wake that raced with a timeout.
    pub fn consume(&self) -> bool {
        let mut signalled = self.signalled.lock().unwrap();
        std::mem::replace(&mut *signalled, false)
    }
}

/// FIFO wait queues keyed by key bytes
#[derive(Default)]
pub struct WaitRegistry {
    queues: HashMap<Vec<u8>, VecDeque<Arc<WaitSignal>>>,
}

impl WaitRegistry {
    pub fn new() -> Self {
        WaitRegistry {
            queues: HashMap::new(),
        }
    }

    /// Register a waiter at the back of the queue (normal arrival order)
    pub fn enqueue_back(&mut self, key: &[u8], waiter: Arc<WaitSignal>) {
        self.queues.entry(key.to_vec()).or_default().push_back(waiter);
    }

    /// Register a waiter at the front (a woken waiter that lost the re-check
    /// race keeps its place in line)
    pub fn enqueue_front(&mut self, key: &[u8], waiter: Arc<WaitSignal>) {
        self.queues.entry(key.to_vec()).or_default().push_front(waiter);
    }

    /// Drop a specific waiter (timeout or disconnect)
    pub fn remove(&mut self, key: &[u8], waiter: &Arc<WaitSignal>) {
        if let Some(queue) = self.queues.get_mut(key) {
            queue.retain(|w| !Arc::ptr_eq(w, waiter));
            if queue.is_empty() {
                self.queues.remove(key);
            }
        }
    }

    /// Dequeue and wake the head waiter. Returns true if someone was woken.
    pub fn wake_one(&mut self, key: &[u8]) -> bool {
        if let Some(queue) = self.queues.get_mut(key) {
            if let Some(waiter) = queue.pop_front() {
                if queue.is_empty() {
                    self.queues.remove(key);
                }
                waiter.notify();
                return true;
            }
        }
        false
    }

    /// Dequeue and wake every waiter on the key
    pub fn wake_all(&mut self, key: &[u8]) {
        if let Some(queue) = self.queues.remove(key) {
            for waiter in queue {
                waiter.notify();
            }
        }
    }

    #[cfg(test)]
    fn waiter_count(&self, key: &[u8]) -> usize {
        self.queues.get(key).map(|q| q.len()).unwrap_or(0)
    }
}
