use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Events broadcast to session observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    InstanceNew {
        session_id: String,
        instance_name: String,
        ip: String,
        hostname: String,
    },
    InstanceDelete {
        session_id: String,
        instance_name: String,
    },
    InstanceTerminalOut {
        session_id: String,
        instance_name: String,
        data: String,
    },
}

impl Event {
    /// Session the event is scoped to.
    pub fn session_id(&self) -> &str {
        match self {
            Event::InstanceNew { session_id, .. }
            | Event::InstanceDelete { session_id, .. }
            | Event::InstanceTerminalOut { session_id, .. } => session_id,
        }
    }

    pub fn instance_name(&self) -> &str {
        match self {
            Event::InstanceNew { instance_name, .. }
            | Event::InstanceDelete { instance_name, .. }
            | Event::InstanceTerminalOut { instance_name, .. } => instance_name,
        }
    }
}

/// Fan-out of [`Event`]s to every subscriber.
///
/// Each subscriber owns a bounded queue of `capacity` events. Publishing
/// waits while any live subscriber's queue is full, so a slow observer
/// slows the publisher down instead of losing events. Dropping the
/// receiver unsubscribes.
pub struct EventBus {
    capacity: usize,
    subscribers: Mutex<Vec<mpsc::Sender<Event>>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn subscribe(&self) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.lock_subscribers().push(tx);
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.lock_subscribers();
        subscribers.retain(|tx| !tx.is_closed());
        subscribers.len()
    }

    /// Deliver `event` to every subscriber, waiting for queue space.
    /// Returns the number of subscribers that received it.
    pub async fn publish(&self, event: Event) -> usize {
        let subscribers = self.lock_subscribers().clone();
        if subscribers.is_empty() {
            tracing::trace!(session = %event.session_id(), "no event subscribers");
            return 0;
        }

        let mut delivered = 0;
        let mut dropped = false;
        for tx in &subscribers {
            match tx.send(event.clone()).await {
                Ok(()) => delivered += 1,
                Err(_) => dropped = true,
            }
        }
        if dropped {
            self.lock_subscribers().retain(|tx| !tx.is_closed());
        }
        delivered
    }

    fn lock_subscribers(&self) -> MutexGuard<'_, Vec<mpsc::Sender<Event>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
