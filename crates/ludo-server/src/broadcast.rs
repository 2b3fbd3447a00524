//! Fan-out of committed game state to room subscribers.

use crate::protocol::{EventType, GameEventEnvelope, GameStateView, ServerMessage};
use dashmap::DashMap;
use std::collections::HashSet;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// Delivery of state changes to everyone watching a room.
///
/// Best-effort: a subscriber that misses an event re-fetches the state.
pub trait Broadcaster: Send + Sync {
    fn publish(&self, room_code: &str, event_type: EventType, view: &GameStateView);
}

/// Live WebSocket connections and the rooms they follow.
#[derive(Default)]
pub struct ConnectionHub {
    /// Outgoing channel per connection
    senders: DashMap<Uuid, mpsc::UnboundedSender<ServerMessage>>,
    /// Connection IDs per room code
    subscribers: DashMap<String, HashSet<Uuid>>,
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, connection_id: Uuid, sender: mpsc::UnboundedSender<ServerMessage>) {
        self.senders.insert(connection_id, sender);
    }

    /// Drop a connection and all of its subscriptions
    pub fn disconnect(&self, connection_id: Uuid) {
        self.senders.remove(&connection_id);
        for mut subs in self.subscribers.iter_mut() {
            subs.remove(&connection_id);
        }
        self.subscribers.retain(|_, subs| !subs.is_empty());
    }

    pub fn subscribe(&self, room_code: &str, connection_id: Uuid) {
        self.subscribers
            .entry(room_code.to_string())
            .or_default()
            .insert(connection_id);
    }

    pub fn unsubscribe(&self, room_code: &str, connection_id: Uuid) {
        if let Some(mut subs) = self.subscribers.get_mut(room_code) {
            subs.remove(&connection_id);
        }
        self.subscribers.remove_if(room_code, |_, subs| subs.is_empty());
    }

    /// Forget every subscription to a room
    pub fn close_room(&self, room_code: &str) {
        self.subscribers.remove(room_code);
    }

    pub fn subscriber_count(&self, room_code: &str) -> usize {
        self.subscribers.get(room_code).map_or(0, |s| s.len())
    }

    /// Send a message to a specific connection.
    pub fn send_to(&self, connection_id: Uuid, msg: ServerMessage) {
        if let Some(sender) = self.senders.get(&connection_id) {
            let _ = sender.send(msg);
        }
    }

    /// Send a message to every subscriber of a room.
    pub fn broadcast_to_room(&self, room_code: &str, msg: ServerMessage) {
        let targets: Vec<Uuid> = match self.subscribers.get(room_code) {
            Some(subs) => subs.iter().copied().collect(),
            None => return,
        };
        for id in targets {
            self.send_to(id, msg.clone());
        }
    }
}

impl Broadcaster for ConnectionHub {
    fn publish(&self, room_code: &str, event_type: EventType, view: &GameStateView) {
        debug!(
            room = room_code,
            event = ?event_type,
            subscribers = self.subscriber_count(room_code),
            "broadcasting"
        );
        let envelope = GameEventEnvelope::new(room_code, event_type, view.clone());
        self.broadcast_to_room(room_code, ServerMessage::GameEvent(envelope));
    }
}
