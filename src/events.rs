//! Wire protocol: every event a client can receive over its room socket.
//!
//! Serialized shape is `{"type": "<snake_case variant>", ...fields}`; message
//! bodies carry an absolute `time_remaining` so clients derive their own
//! countdowns from a single authoritative snapshot.

use serde::Serialize;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

use crate::store::room::{Message, MessageKind, MessagePayload, User};

static CLOCK_FMT: &[BorrowedFormatItem<'static>] = format_description!("[hour]:[minute]");

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    UsersList { users: Vec<UserView> },
    NewMessage { message: MessageView },
    MessageDeleted { message_id: String },
    UserJoined { user_id: String, user_name: String },
    UserLeft { user_id: String, user_name: String },
    UserRenamed { user_id: String, old_name: String, new_name: String },
    RoomCleared { message: String },
}

#[derive(Clone, Debug, Serialize)]
pub struct UserView {
    pub id: String,
    pub name: String,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct MessageView {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub username: String,
    /// Wall-clock "HH:MM" the message was posted, for display only.
    pub time: String,
    pub time_remaining: i64,
    #[serde(flatten)]
    pub body: BodyView,
}

#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum BodyView {
    Text {
        text: String,
        links: Vec<String>,
    },
    File {
        filename: String,
        size_mb: f64,
    },
    Location {
        latitude: f64,
        longitude: f64,
    },
}

impl MessageView {
    pub fn of(msg: &Message, time_remaining: i64) -> Self {
        let body = match &msg.payload {
            MessagePayload::Text { body, links } => BodyView::Text {
                text: body.clone(),
                links: links.clone(),
            },
            MessagePayload::Blob {
                filename, size_bytes, ..
            } => BodyView::File {
                filename: filename.clone(),
                size_mb: (*size_bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0,
            },
            MessagePayload::Location {
                latitude,
                longitude,
            } => BodyView::Location {
                latitude: *latitude,
                longitude: *longitude,
            },
        };

        Self {
            id: msg.id.clone(),
            kind: msg.kind(),
            username: msg.username.clone(),
            time: msg.created_at.format(&CLOCK_FMT).unwrap_or_default(),
            time_remaining,
            body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn text_message() -> Message {
        Message {
            id: "m1".into(),
            room_code: "R7K2".into(),
            user_id: "u1".into(),
            username: "SwiftPanda".into(),
            created_at: datetime!(2026-01-01 09:30 UTC),
            payload: MessagePayload::Text {
                body: "see https://example.com now".into(),
                links: vec!["https://example.com".into()],
            },
        }
    }

    #[test]
    fn new_message_wire_shape() {
        let event = Event::NewMessage {
            message: MessageView::of(&text_message(), 3600),
        };
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "new_message");
        assert_eq!(json["message"]["type"], "text");
        assert_eq!(json["message"]["text"], "see https://example.com now");
        assert_eq!(json["message"]["links"][0], "https://example.com");
        assert_eq!(json["message"]["time"], "09:30");
        assert_eq!(json["message"]["time_remaining"], 3600);
    }

    #[test]
    fn file_view_rounds_size_to_two_decimals() {
        let mut msg = text_message();
        msg.payload = MessagePayload::Blob {
            kind: MessageKind::File,
            filename: "notes.pdf".into(),
            mime: "application/pdf".into(),
            size_bytes: 1_572_864,
            blob_ref: crate::blob::BlobRef::new("m1_notes.pdf"),
        };
        let json = serde_json::to_value(MessageView::of(&msg, 10)).unwrap();
        assert_eq!(json["type"], "file");
        assert_eq!(json["filename"], "notes.pdf");
        assert_eq!(json["size_mb"], 1.5);
    }

    #[test]
    fn user_left_wire_shape() {
        let event = Event::UserLeft {
            user_id: "u1".into(),
            user_name: "SwiftPanda".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "user_left");
        assert_eq!(json["user_id"], "u1");
        assert_eq!(json["user_name"], "SwiftPanda");
    }
}
