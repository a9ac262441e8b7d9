//! Per-subscriber outbound queue.
//!
//! Bounded, single-consumer, and never blocks the producer: when full, the
//! oldest pending event is replaced by the new one. Closing the queue
//! discards whatever is still pending, so a retired subscriber's writer
//! never sees another event.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::domain::pricing::PriceChanged;

/// Outcome of [`OutboundQueue::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Event queued without displacing anything.
    Queued,
    /// Queue was full; the oldest pending event was dropped.
    ReplacedOldest,
    /// Queue is closed; the event was discarded.
    Closed,
}

#[derive(Debug)]
struct QueueState {
    pending: VecDeque<Arc<PriceChanged>>,
    closed: bool,
    replaced: u64,
}

/// Bounded drop-oldest queue feeding one subscriber's writer.
#[derive(Debug)]
pub struct OutboundQueue {
    state: Mutex<QueueState>,
    ready: Notify,
    capacity: usize,
}

impl OutboundQueue {
    /// Create a queue holding at most `capacity` events (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                pending: VecDeque::with_capacity(capacity),
                closed: false,
                replaced: 0,
            }),
            ready: Notify::new(),
            capacity,
        }
    }

    /// Enqueue an event without waiting.
    pub fn push(&self, event: Arc<PriceChanged>) -> PushOutcome {
        let outcome = {
            let mut state = self.state.lock();
            if state.closed {
                return PushOutcome::Closed;
            }
            let outcome = if state.pending.len() >= self.capacity {
                state.pending.pop_front();
                state.replaced += 1;
                PushOutcome::ReplacedOldest
            } else {
                PushOutcome::Queued
            };
            state.pending.push_back(event);
            outcome
        };
        self.ready.notify_one();
        outcome
    }

    /// Wait for the next event.
    ///
    /// Returns `None` once the queue is closed.
    pub async fn pop(&self) -> Option<Arc<PriceChanged>> {
        loop {
            let notified = self.ready.notified();
            {
                let mut state = self.state.lock();
                if let Some(event) = state.pending.pop_front() {
                    return Some(event);
                }
                if state.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Take the next event if one is pending.
    pub fn try_pop(&self) -> Option<Arc<PriceChanged>> {
        self.state.lock().pending.pop_front()
    }

    /// Close the queue and discard pending events.
    ///
    /// Returns `true` only for the call that actually closed it.
    pub fn close(&self) -> bool {
        let newly_closed = {
            let mut state = self.state.lock();
            let newly_closed = !state.closed;
            state.closed = true;
            state.pending.clear();
            newly_closed
        };
        self.ready.notify_one();
        newly_closed
    }

    /// Whether the queue has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of events waiting to be written.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Whether no events are waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total events dropped to make room for newer ones.
    #[must_use]
    pub fn replaced(&self) -> u64 {
        self.state.lock().replaced
    }

    /// Maximum number of pending events.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rust_decimal::Decimal;
    use tokio::time::timeout;

    use super::*;

    fn event(value: i64) -> Arc<PriceChanged> {
        Arc::new(PriceChanged::now("white_wool", Decimal::new(value, 0)))
    }

    #[test]
    fn full_queue_replaces_oldest() {
        let queue = OutboundQueue::new(1);

        assert_eq!(queue.push(event(45)), PushOutcome::Queued);
        assert_eq!(queue.push(event(46)), PushOutcome::ReplacedOldest);

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.replaced(), 1);
        assert_eq!(queue.try_pop().unwrap().value, Decimal::new(46, 0));
    }

    #[test]
    fn larger_queue_keeps_fifo_order() {
        let queue = OutboundQueue::new(3);
        for value in 1..=4 {
            queue.push(event(value));
        }

        let drained: Vec<_> = std::iter::from_fn(|| queue.try_pop())
            .map(|e| e.value)
            .collect();
        assert_eq!(
            drained,
            vec![Decimal::new(2, 0), Decimal::new(3, 0), Decimal::new(4, 0)]
        );
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        assert_eq!(OutboundQueue::new(0).capacity(), 1);
    }

    #[test]
    fn close_discards_pending_and_rejects_pushes() {
        let queue = OutboundQueue::new(1);
        queue.push(event(45));

        assert!(queue.close());
        assert!(!queue.close());
        assert!(queue.is_empty());
        assert_eq!(queue.push(event(46)), PushOutcome::Closed);
    }

    #[test]
    fn pop_is_pending_until_push() {
        let queue = OutboundQueue::new(1);
        let mut pop = tokio_test::task::spawn(queue.pop());

        tokio_test::assert_pending!(pop.poll());
        queue.push(event(45));

        assert!(pop.is_woken());
        let received = tokio_test::assert_ready!(pop.poll());
        assert_eq!(received.unwrap().value, Decimal::new(45, 0));
    }

    #[tokio::test]
    async fn pop_wakes_on_push() {
        let queue = Arc::new(OutboundQueue::new(1));
        let consumer = Arc::clone(&queue);
        let waiter = tokio::spawn(async move { consumer.pop().await });

        tokio::task::yield_now().await;
        queue.push(event(45));

        let received = timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.unwrap().value, Decimal::new(45, 0));
    }

    #[tokio::test]
    async fn pop_returns_none_after_close() {
        let queue = Arc::new(OutboundQueue::new(1));
        let consumer = Arc::clone(&queue);
        let waiter = tokio::spawn(async move { consumer.pop().await });

        tokio::task::yield_now().await;
        queue.close();

        let received = timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(received.is_none());
    }
}
