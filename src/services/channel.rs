use parking_lot::RwLock;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    error::{AppError, Result},
    models::websocket::{FanOutEvent, ServerMessage},
};

/// Where committed comments are announced. Injected into the comment
/// service so the write path never reaches for a global socket handle.
#[cfg_attr(test, mockall::automock)]
pub trait FanOutPublisher: Send + Sync {
    /// Returns how many connections the event was queued for.
    fn publish(&self, room_key: &str, event: &FanOutEvent) -> Result<usize>;
}

#[derive(Default)]
struct Rooms {
    // room_key -> connection_id -> outbound queue
    members: HashMap<String, HashMap<String, mpsc::UnboundedSender<ServerMessage>>>,
    // connection_id -> joined rooms
    joined: HashMap<String, HashSet<String>>,
}

/// 按博客划分的广播房间
///
/// Each connection has exactly one outbound queue, drained in order by its
/// writer task, so events published to a room arrive in publish order.
/// Nothing is buffered for connections that are not joined.
#[derive(Clone, Default)]
pub struct ChannelHub {
    rooms: Arc<RwLock<Rooms>>,
}

impl ChannelHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(
        &self,
        connection_id: &str,
        room_key: &str,
        sender: mpsc::UnboundedSender<ServerMessage>,
    ) {
        let mut rooms = self.rooms.write();
        rooms
            .members
            .entry(room_key.to_string())
            .or_default()
            .insert(connection_id.to_string(), sender);
        rooms
            .joined
            .entry(connection_id.to_string())
            .or_default()
            .insert(room_key.to_string());

        info!("Connection {} joined room {}", connection_id, room_key);
    }

    pub fn leave(&self, connection_id: &str, room_key: &str) {
        let mut rooms = self.rooms.write();
        Self::forget(&mut rooms, connection_id, room_key);

        debug!("Connection {} left room {}", connection_id, room_key);
    }

    /// Drops the connection from every room it joined.
    pub fn disconnect(&self, connection_id: &str) {
        let mut rooms = self.rooms.write();
        let joined = rooms.joined.remove(connection_id).unwrap_or_default();
        for room_key in &joined {
            Self::remove_member(&mut rooms, connection_id, room_key);
        }

        debug!("Connection {} removed from {} rooms", connection_id, joined.len());
    }

    pub fn room_size(&self, room_key: &str) -> usize {
        self.rooms
            .read()
            .members
            .get(room_key)
            .map(|members| members.len())
            .unwrap_or(0)
    }

    /// Removes one membership from both indexes.
    fn forget(rooms: &mut Rooms, connection_id: &str, room_key: &str) {
        Self::remove_member(rooms, connection_id, room_key);
        if let Some(joined) = rooms.joined.get_mut(connection_id) {
            joined.remove(room_key);
            if joined.is_empty() {
                rooms.joined.remove(connection_id);
            }
        }
    }

    fn remove_member(rooms: &mut Rooms, connection_id: &str, room_key: &str) {
        if let Some(members) = rooms.members.get_mut(room_key) {
            members.remove(connection_id);
            if members.is_empty() {
                rooms.members.remove(room_key);
            }
        }
    }
}

impl FanOutPublisher for ChannelHub {
    fn publish(&self, room_key: &str, event: &FanOutEvent) -> Result<usize> {
        // The write guard serializes concurrent publishes, so every member
        // sees the same relative order.
        let mut rooms = self.rooms.write();
        let Some(members) = rooms.members.get(room_key) else {
            debug!("No subscribers in room {}", room_key);
            return Ok(0);
        };

        let message = ServerMessage::CommentNew(event.clone());
        let mut delivered = 0;
        let mut closed = Vec::new();

        for (connection_id, sender) in members {
            match sender.send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => closed.push(connection_id.clone()),
            }
        }

        for connection_id in &closed {
            warn!("Dropping closed connection {} from room {}", connection_id, room_key);
            Self::forget(&mut rooms, connection_id, room_key);
        }

        if delivered == 0 && !closed.is_empty() {
            return Err(AppError::ChannelUnavailable(format!(
                "every connection in room {} is closed",
                room_key
            )));
        }

        debug!("Published {} to {} connections in room {}", event.comment_id(), delivered, room_key);
        Ok(delivered)
    }
}
