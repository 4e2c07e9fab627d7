use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::blob::BlobRef;

/// One ephemeral room: users in join order, messages in append order.
/// All mutation happens through the [`RoomStore`](crate::store::RoomStore)
/// while it holds this room's map entry exclusively.
#[derive(Debug)]
pub struct Room {
    pub code: String,
    pub created_at: OffsetDateTime,
    pub users: Vec<User>,
    pub messages: Vec<Message>,
    /// Set by the reaper once the room drains; eviction happens after the
    /// grace period so a briefly idle room keeps its code.
    pub empty_since: Option<OffsetDateTime>,
}

impl Room {
    pub fn new(code: impl Into<String>, now: OffsetDateTime) -> Self {
        Self {
            code: code.into(),
            created_at: now,
            users: Vec::new(),
            messages: Vec::new(),
            empty_since: None,
        }
    }

    pub fn user(&self, user_id: &str) -> Option<&User> {
        self.users.iter().find(|u| u.id == user_id)
    }

    pub fn user_mut(&mut self, user_id: &str) -> Option<&mut User> {
        self.users.iter_mut().find(|u| u.id == user_id)
    }

    pub fn is_drained(&self) -> bool {
        self.users.is_empty() && self.messages.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct User {
    pub id: String,
    pub name: String,
    pub joined_at: OffsetDateTime,
    pub last_heartbeat: OffsetDateTime,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    File,
    Image,
    Voice,
    Location,
}

impl MessageKind {
    pub fn is_blob(self) -> bool {
        matches!(self, Self::File | Self::Image | Self::Voice)
    }
}

#[derive(Clone, Debug)]
pub struct Message {
    pub id: String,
    pub room_code: String,
    pub user_id: String,
    /// Denormalized at creation time; later renames do not touch it.
    pub username: String,
    pub created_at: OffsetDateTime,
    pub payload: MessagePayload,
}

#[derive(Clone, Debug)]
pub enum MessagePayload {
    Text {
        body: String,
        links: Vec<String>,
    },
    Blob {
        kind: MessageKind,
        filename: String,
        mime: String,
        size_bytes: u64,
        blob_ref: BlobRef,
    },
    Location {
        latitude: f64,
        longitude: f64,
    },
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match &self.payload {
            MessagePayload::Text { .. } => MessageKind::Text,
            MessagePayload::Blob { kind, .. } => *kind,
            MessagePayload::Location { .. } => MessageKind::Location,
        }
    }

    pub fn blob_ref(&self) -> Option<&BlobRef> {
        match &self.payload {
            MessagePayload::Blob { blob_ref, .. } => Some(blob_ref),
            _ => None,
        }
    }
}
