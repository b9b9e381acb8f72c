//! Fan-out of workflow events
//!
//! Each run keeps a bounded history for late subscribers, and every
//! subscriber owns an independent bounded queue, so a slow reader only
//! loses its own oldest non-terminal events and never stalls the others.

use super::event::WorkflowEvent;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use sdd_ledger::RunId;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};
use tokio::sync::Notify;

/// Fixed-capacity event queue that never drops terminal events
#[derive(Debug, Clone)]
pub(crate) struct BoundedQueue {
    events: VecDeque<WorkflowEvent>,
    capacity: usize,
}

impl BoundedQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity.min(64)),
            capacity: capacity.max(1),
        }
    }

    /// Push, dropping the oldest non-terminal event when over capacity
    ///
    /// Returns the dropped event, if any.
    pub(crate) fn push(&mut self, event: WorkflowEvent) -> Option<WorkflowEvent> {
        self.events.push_back(event);
        if self.events.len() <= self.capacity {
            return None;
        }
        let oldest = self.events.iter().position(|e| !e.is_terminal())?;
        self.events.remove(oldest)
    }

    pub(crate) fn pop_front(&mut self) -> Option<WorkflowEvent> {
        self.events.pop_front()
    }

    pub(crate) fn last(&self) -> Option<&WorkflowEvent> {
        self.events.back()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &WorkflowEvent> {
        self.events.iter()
    }

    pub(crate) fn len(&self) -> usize {
        self.events.len()
    }
}

#[derive(Debug)]
struct SlotState {
    queue: BoundedQueue,
    closed: bool,
}

#[derive(Debug)]
struct Slot {
    filter: Option<RunId>,
    state: Mutex<SlotState>,
    notify: Notify,
}

impl Slot {
    fn deliver(&self, event: &WorkflowEvent) {
        {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            if let Some(dropped) = state.queue.push(event.clone()) {
                tracing::debug!(run_id = %dropped.run_id, id = dropped.id, "slow subscriber, dropped event");
            }
            if self.filter.is_some() && event.is_terminal() {
                state.closed = true;
            }
        }
        self.notify.notify_one();
    }
}

#[derive(Debug, Default)]
struct HubState {
    history: HashMap<RunId, BoundedQueue>,
    subscribers: Vec<Weak<Slot>>,
}

/// Delivers workflow events to any number of subscribers
#[derive(Debug)]
pub struct EventHub {
    state: Mutex<HubState>,
    history_window: usize,
    subscriber_capacity: usize,
}

impl EventHub {
    #[must_use]
    pub fn new(history_window: usize, subscriber_capacity: usize) -> Self {
        Self {
            state: Mutex::new(HubState::default()),
            history_window,
            subscriber_capacity,
        }
    }

    /// Record `event` in its run's history and hand it to every subscriber
    pub fn publish(&self, event: &WorkflowEvent) {
        let mut state = self.state.lock();
        let window = self.history_window;
        state
            .history
            .entry(event.run_id)
            .or_insert_with(|| BoundedQueue::new(window))
            .push(event.clone());

        state.subscribers.retain(|weak| {
            let Some(slot) = weak.upgrade() else {
                return false;
            };
            if slot.filter.map_or(true, |run| run == event.run_id) {
                slot.deliver(event);
            }
            true
        });
    }

    /// Subscribe to one run (`Some`) or every run (`None`)
    ///
    /// The retained history is replayed first. A run-scoped subscription
    /// follows a single attempt: replay starts after the previous attempt's
    /// terminal event, and the subscription ends at the next terminal event,
    /// live or replayed.
    #[must_use]
    pub fn subscribe(&self, filter: Option<RunId>) -> Subscription {
        let mut state = self.state.lock();

        let mut queue = BoundedQueue::new(self.subscriber_capacity);
        let mut closed = false;
        match filter {
            Some(run) => {
                if let Some(history) = state.history.get(&run) {
                    let events: Vec<&WorkflowEvent> = history.iter().collect();
                    closed = events.last().is_some_and(|e| e.is_terminal());
                    let open_end = if closed { events.len() - 1 } else { events.len() };
                    let attempt_start = events[..open_end]
                        .iter()
                        .rposition(|e| e.is_terminal())
                        .map_or(0, |idx| idx + 1);
                    for event in &events[attempt_start..] {
                        queue.push((*event).clone());
                    }
                }
            }
            None => {
                let mut replay: Vec<&WorkflowEvent> =
                    state.history.values().flat_map(BoundedQueue::iter).collect();
                replay.sort_by_key(|e| e.id);
                for event in replay {
                    queue.push(event.clone());
                }
            }
        }

        let slot = Arc::new(Slot {
            filter,
            state: Mutex::new(SlotState { queue, closed }),
            notify: Notify::new(),
        });
        state.subscribers.push(Arc::downgrade(&slot));
        Subscription { slot }
    }

    /// Drop a run's retained history; live subscriptions keep their queues
    pub fn forget(&self, run: RunId) {
        self.state.lock().history.remove(&run);
    }

    /// Retained events for a run, oldest first
    #[must_use]
    pub fn history(&self, run: RunId) -> Vec<WorkflowEvent> {
        self.state
            .lock()
            .history
            .get(&run)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Live subscriber count
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.state
            .lock()
            .subscribers
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }
}

/// Receiving end of a subscription; dropping it unsubscribes
#[derive(Debug)]
pub struct Subscription {
    slot: Arc<Slot>,
}

impl Subscription {
    /// Next event, or `None` once a run-scoped subscription has ended
    pub async fn recv(&self) -> Option<WorkflowEvent> {
        loop {
            {
                let mut state = self.slot.state.lock();
                if let Some(event) = state.queue.pop_front() {
                    return Some(event);
                }
                if state.closed {
                    return None;
                }
            }
            self.slot.notify.notified().await;
        }
    }

    /// Next buffered event without waiting
    #[must_use]
    pub fn try_recv(&self) -> Option<WorkflowEvent> {
        self.slot.state.lock().queue.pop_front()
    }

    /// Buffered, not yet received events
    #[must_use]
    pub fn pending(&self) -> usize {
        self.slot.state.lock().queue.len()
    }

    /// Adapt into a stream that ends with the subscription
    #[must_use]
    pub fn into_stream(self) -> BoxStream<'static, WorkflowEvent> {
        stream::unfold(self, |sub| async move {
            let event = sub.recv().await?;
            Some((event, sub))
        })
        .boxed()
    }
}
