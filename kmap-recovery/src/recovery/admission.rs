//! Priority admission gate
//!
//! Bounds how many recoveries run at once. Callers over the limit wait in a
//! queue ordered by action priority (lower number first), then by arrival.
//! A released permit is handed straight to the next live waiter, so a
//! late-arriving high-priority call cannot be overtaken by the fast path.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use crate::error::{KmapError, Result};

#[derive(Debug, Default)]
struct GateState {
    running: usize,
    waiting: BinaryHeap<Waiter>,
    next_seq: u64,
}

#[derive(Debug)]
struct Waiter {
    priority: u8,
    seq: u64,
    tx: oneshot::Sender<Permit>,
}

impl PartialEq for Waiter {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for Waiter {}

impl PartialOrd for Waiter {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Waiter {
    // Max-heap: the lowest priority number and earliest arrival pops first
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then(other.seq.cmp(&self.seq))
    }
}

/// Permission to run one recovery; dropping it admits the next waiter
#[derive(Debug)]
pub struct Permit {
    gate: Option<Arc<Mutex<GateState>>>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        if let Some(gate) = self.gate.take() {
            release(&gate);
        }
    }
}

fn lock(state: &Mutex<GateState>) -> MutexGuard<'_, GateState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn release(gate: &Arc<Mutex<GateState>>) {
    let mut state = lock(gate);
    while let Some(waiter) = state.waiting.pop() {
        let permit = Permit {
            gate: Some(Arc::clone(gate)),
        };
        match waiter.tx.send(permit) {
            Ok(()) => return,
            // Waiter gave up; disarm so the returned permit does not release again
            Err(mut unclaimed) => unclaimed.gate = None,
        }
    }
    state.running = state.running.saturating_sub(1);
}

/// Concurrency ceiling with a priority-ordered wait queue
#[derive(Debug)]
pub struct AdmissionGate {
    capacity: usize,
    state: Arc<Mutex<GateState>>,
}

impl AdmissionGate {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Arc::new(Mutex::new(GateState::default())),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Wait for a slot.
    ///
    /// Dropping the returned future while queued leaves no trace: the slot it
    /// would have received passes to the next waiter.
    pub async fn acquire(&self, priority: u8) -> Result<Permit> {
        let rx = {
            let mut state = lock(&self.state);
            state.waiting.retain(|w| !w.tx.is_closed());
            if state.running < self.capacity && state.waiting.is_empty() {
                state.running += 1;
                return Ok(Permit {
                    gate: Some(Arc::clone(&self.state)),
                });
            }

            let (tx, rx) = oneshot::channel();
            let seq = state.next_seq;
            state.next_seq += 1;
            state.waiting.push(Waiter { priority, seq, tx });
            rx
        };

        rx.await
            .map_err(|_| KmapError::Lock("admission gate closed".into()))
    }

    /// Recoveries currently holding a slot
    pub fn active(&self) -> usize {
        lock(&self.state).running
    }

    /// Callers waiting for a slot
    pub fn queued(&self) -> usize {
        lock(&self.state)
            .waiting
            .iter()
            .filter(|w| !w.tx.is_closed())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_admits_up_to_capacity() {
        let gate = AdmissionGate::new(2);
        let _a = gate.acquire(3).await.unwrap();
        let _b = gate.acquire(3).await.unwrap();
        assert_eq!(gate.active(), 2);

        let blocked = tokio::time::timeout(Duration::from_millis(20), gate.acquire(3)).await;
        assert!(blocked.is_err());
        assert_eq!(gate.queued(), 0);
    }

    #[tokio::test]
    async fn test_release_admits_next() {
        let gate = Arc::new(AdmissionGate::new(1));
        let first = gate.acquire(3).await.unwrap();

        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.acquire(3).await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(gate.queued(), 1);

        drop(first);
        waiter.await.unwrap().unwrap();
        assert_eq!(gate.active(), 0);
    }

    #[tokio::test]
    async fn test_waiters_served_by_priority_then_arrival() {
        let gate = Arc::new(AdmissionGate::new(1));
        let first = gate.acquire(1).await.unwrap();
        let (order_tx, mut order_rx) = tokio::sync::mpsc::unbounded_channel();

        let mut handles = Vec::new();
        for (label, priority) in [("low", 5u8), ("high-a", 1), ("mid", 3), ("high-b", 1)] {
            let gate = Arc::clone(&gate);
            let order_tx = order_tx.clone();
            handles.push(tokio::spawn(async move {
                let _permit = gate.acquire(priority).await.unwrap();
                order_tx.send(label).unwrap();
            }));
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(gate.queued(), 4);

        drop(first);
        for handle in handles {
            handle.await.unwrap();
        }
        drop(order_tx);

        let mut order = Vec::new();
        while let Some(label) = order_rx.recv().await {
            order.push(label);
        }
        assert_eq!(order, vec!["high-a", "high-b", "mid", "low"]);
    }

    #[tokio::test]
    async fn test_abandoned_waiter_passes_slot_on() {
        let gate = Arc::new(AdmissionGate::new(1));
        let first = gate.acquire(1).await.unwrap();

        let abandoned = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                let _ = gate.acquire(1).await;
            })
        };
        let patient = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.acquire(5).await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        abandoned.abort();
        let _ = abandoned.await;
        assert_eq!(gate.queued(), 1);

        drop(first);
        patient.await.unwrap().unwrap();
        assert_eq!(gate.active(), 0);
    }

    #[test]
    fn test_zero_capacity_clamped() {
        assert_eq!(AdmissionGate::new(0).capacity(), 1);
    }
}
