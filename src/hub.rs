//! Live push channels, one per (room, user) connection.
//!
//! A user holds at most one channel per room: registering again supersedes
//! and closes the previous connection, so reconnects never double-deliver.
//! Delivery is best-effort `try_send`; a consumer that lets its buffer fill
//! is disconnected rather than allowed to stall or buffer the whole room.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::events::Event;

const CHANNEL_CAPACITY: usize = 64;

/// Identity of one registration, used to guard `unregister` against racing a
/// newer connection for the same user.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnId(u64);

struct Conn {
    id: ConnId,
    tx: mpsc::Sender<Event>,
}

#[derive(Default)]
pub struct Hub {
    rooms: DashMap<String, HashMap<String, Conn>>,
    next_conn: AtomicU64,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a channel for `(room, user_id)`, closing any previous one.
    pub fn register(&self, room: &str, user_id: &str) -> (ConnId, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let id = ConnId(self.next_conn.fetch_add(1, Ordering::Relaxed));
        self.rooms
            .entry(room.to_owned())
            .or_default()
            .insert(user_id.to_owned(), Conn { id, tx });
        (id, rx)
    }

    /// Removes the mapping only while `conn` is still the registered one; a
    /// stale unregister arriving after a reconnect is a no-op.
    pub fn unregister(&self, room: &str, user_id: &str, conn: ConnId) {
        let Some(mut conns) = self.rooms.get_mut(room) else {
            return;
        };
        if conns.get(user_id).is_some_and(|c| c.id == conn) {
            conns.remove(user_id);
        }
        if conns.is_empty() {
            drop(conns);
            self.rooms.remove_if(room, |_, conns| conns.is_empty());
        }
    }

    /// Fans `event` out to every live channel in `room`. Never blocks and
    /// never reports failure to the caller: dead channels are dropped, and a
    /// full one is disconnected so its client can reconnect for a fresh
    /// snapshot.
    pub fn broadcast(&self, room: &str, event: &Event) {
        let Some(mut conns) = self.rooms.get_mut(room) else {
            return;
        };
        conns.retain(|user_id, conn| match conn.tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(room, user_id, "push channel overflow, disconnecting");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        });
    }
}
