//! Message registry for one room: append, delete, bulk clear and TTL sweep.

use once_cell::sync::Lazy;
use regex::Regex;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::blob::BlobRef;
use crate::clock::TtlPolicy;
use crate::store::room::{Message, MessageKind, MessagePayload, Room};

static LINK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://\S+").unwrap());

/// Every `http(s)://` run up to the next whitespace, in order of appearance,
/// repeats included.
pub fn extract_links(text: &str) -> Vec<String> {
    LINK_RE.find_iter(text).map(|m| m.as_str().to_owned()).collect()
}

pub fn generate_message_id() -> String {
    Uuid::now_v7().simple().to_string()
}

impl Room {
    pub fn append(
        &mut self,
        user_id: &str,
        username: &str,
        payload: MessagePayload,
        now: OffsetDateTime,
    ) -> Message {
        let message = Message {
            id: generate_message_id(),
            room_code: self.code.clone(),
            user_id: user_id.to_owned(),
            username: username.to_owned(),
            created_at: now,
            payload,
        };
        self.messages.push(message.clone());
        self.empty_since = None;
        message
    }

    pub fn delete_message(&mut self, message_id: &str) -> Option<Message> {
        let idx = self.messages.iter().position(|m| m.id == message_id)?;
        Some(self.messages.remove(idx))
    }

    pub fn delete_all_messages(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.messages)
    }

    pub fn sweep_expired(&mut self, policy: &TtlPolicy, now: OffsetDateTime) -> Vec<Message> {
        let mut removed = Vec::new();
        self.messages.retain(|msg| {
            if policy.is_expired(msg.created_at, now) {
                removed.push(msg.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    /// Non-expired messages in append order.
    pub fn live_messages(&self, policy: &TtlPolicy, now: OffsetDateTime) -> Vec<&Message> {
        self.messages
            .iter()
            .filter(|msg| !policy.is_expired(msg.created_at, now))
            .collect()
    }
}

pub fn text_payload(body: String) -> MessagePayload {
    let links = extract_links(&body);
    MessagePayload::Text { body, links }
}

pub fn blob_payload(
    kind: MessageKind,
    filename: String,
    mime: String,
    size_bytes: u64,
    blob_ref: BlobRef,
) -> MessagePayload {
    MessagePayload::Blob {
        kind,
        filename,
        mime,
        size_bytes,
        blob_ref,
    }
}
