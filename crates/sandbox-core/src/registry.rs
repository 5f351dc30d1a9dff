//! Connection registry: one attach channel per (session, instance).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::engine::BoxedWriter;

/// A live attach channel as seen by writers.
///
/// The read half is owned by the relay task; closing the connection wakes
/// that task so it can stop.
pub struct Connection {
    generation: u64,
    writer: Mutex<BoxedWriter>,
    closed: CancellationToken,
}

impl Connection {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Write all of `data` and flush. Writing to a closed connection is a
    /// no-op, and closing the connection abandons a write that is blocked.
    pub async fn write(&self, data: &[u8]) -> std::io::Result<()> {
        let mut writer = tokio::select! {
            biased;
            _ = self.closed.cancelled() => return Ok(()),
            writer = self.writer.lock() => writer,
        };
        let result = tokio::select! {
            biased;
            _ = self.closed.cancelled() => return Ok(()),
            result = async {
                writer.write_all(data).await?;
                writer.flush().await
            } => result,
        };
        match result {
            Err(_) if self.closed.is_cancelled() => Ok(()),
            other => other,
        }
    }

    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    pub(crate) fn closed_token(&self) -> CancellationToken {
        self.closed.clone()
    }
}

enum Slot {
    /// Reserved while the engine attach call is in flight.
    Attaching(u64),
    Live(Arc<Connection>),
}

impl Slot {
    fn generation(&self) -> u64 {
        match self {
            Slot::Attaching(generation) => *generation,
            Slot::Live(conn) => conn.generation,
        }
    }
}

/// Claim on a registry key, handed out by [`ConnectionRegistry::reserve`].
#[derive(Debug)]
pub struct Reservation {
    session_id: String,
    instance_name: String,
    generation: u64,
}

impl Reservation {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Maps (session id, instance name) to its attach channel.
///
/// At most one slot exists per key. The map is sharded per session; the
/// lock is only held for map updates, never across engine calls or writes.
#[derive(Default)]
pub struct ConnectionRegistry {
    sessions: RwLock<HashMap<String, HashMap<String, Slot>>>,
    next_generation: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the key. Returns `None` when a channel is already attached or
    /// being attached.
    pub async fn reserve(&self, session_id: &str, instance_name: &str) -> Option<Reservation> {
        let mut map = self.sessions.write().await;
        let slots = map.entry(session_id.to_string()).or_default();
        if slots.contains_key(instance_name) {
            return None;
        }
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        slots.insert(instance_name.to_string(), Slot::Attaching(generation));
        Some(Reservation {
            session_id: session_id.to_string(),
            instance_name: instance_name.to_string(),
            generation,
        })
    }

    /// Turn a reservation into a live connection closed through `closed`.
    /// Returns `None` when the reservation was closed in the meantime;
    /// `writer` is dropped then.
    pub async fn activate(
        &self,
        reservation: &Reservation,
        writer: BoxedWriter,
        closed: CancellationToken,
    ) -> Option<Arc<Connection>> {
        let mut map = self.sessions.write().await;
        let slot = map
            .get_mut(&reservation.session_id)?
            .get_mut(&reservation.instance_name)?;
        if !matches!(slot, Slot::Attaching(g) if *g == reservation.generation) {
            return None;
        }
        let conn = Arc::new(Connection {
            generation: reservation.generation,
            writer: Mutex::new(writer),
            closed,
        });
        *slot = Slot::Live(Arc::clone(&conn));
        Some(conn)
    }

    /// Give up a reservation whose attach failed.
    pub async fn release(&self, reservation: &Reservation) {
        self.remove_generation(&reservation.session_id, &reservation.instance_name, reservation.generation)
            .await;
    }

    /// Live connection for the key, if any.
    pub async fn get(&self, session_id: &str, instance_name: &str) -> Option<Arc<Connection>> {
        let map = self.sessions.read().await;
        match map.get(session_id)?.get(instance_name)? {
            Slot::Live(conn) => Some(Arc::clone(conn)),
            Slot::Attaching(_) => None,
        }
    }

    /// Whether the key holds a live or attaching slot.
    pub async fn contains(&self, session_id: &str, instance_name: &str) -> bool {
        let map = self.sessions.read().await;
        map.get(session_id)
            .is_some_and(|slots| slots.contains_key(instance_name))
    }

    /// Close and remove the slot for the key. Returns whether one existed.
    pub async fn close(&self, session_id: &str, instance_name: &str) -> bool {
        let mut map = self.sessions.write().await;
        let Some(slots) = map.get_mut(session_id) else {
            return false;
        };
        let removed = slots.remove(instance_name);
        if slots.is_empty() {
            map.remove(session_id);
        }
        match removed {
            Some(Slot::Live(conn)) => {
                conn.close();
                true
            }
            Some(Slot::Attaching(_)) => true,
            None => false,
        }
    }

    /// Remove the slot only if it still belongs to `generation`.
    pub async fn remove_generation(&self, session_id: &str, instance_name: &str, generation: u64) -> bool {
        let mut map = self.sessions.write().await;
        let Some(slots) = map.get_mut(session_id) else {
            return false;
        };
        if slots.get(instance_name).map(Slot::generation) != Some(generation) {
            return false;
        }
        if let Some(Slot::Live(conn)) = slots.remove(instance_name) {
            conn.close();
        }
        if slots.is_empty() {
            map.remove(session_id);
        }
        true
    }

    /// Close every connection. Returns how many slots were removed.
    pub async fn close_all(&self) -> usize {
        let mut map = self.sessions.write().await;
        let mut count = 0;
        for (_, slots) in map.drain() {
            for (_, slot) in slots {
                if let Slot::Live(conn) = slot {
                    conn.close();
                }
                count += 1;
            }
        }
        count
    }

    /// Number of slots across all sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.values().map(HashMap::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
