//! The single owner of all room/user/message state.
//!
//! Rooms live in a [`DashMap`]; every mutation runs while holding that room's
//! entry exclusively and broadcasts its events through the hub before the
//! entry is released, so for any one room the broadcast order is exactly the
//! commit order.

pub mod messages;
pub mod presence;
pub mod room;

use dashmap::DashMap;
use serde::Serialize;
use time::{Duration, OffsetDateTime};

use crate::appresult::{AppError, AppResult};
use crate::blob::BlobRef;
use crate::clock::TtlPolicy;
use crate::events::{Event, MessageView, UserView};
use crate::hub::Hub;
use crate::store::messages::text_payload;
use crate::store::presence::JoinOutcome;
use crate::store::room::{Message, MessageKind, MessagePayload, Room};

pub const EMPTY_ROOM_GRACE: Duration = Duration::minutes(5);

/// What a client asked to post. Uploads take a separate path because their
/// payload references bytes already handed to the blob store.
#[derive(Clone, Debug)]
pub enum MessageDraft {
    Text { body: String },
    Location { latitude: f64, longitude: f64 },
}

pub struct RoomStore {
    rooms: DashMap<String, Room>,
    hub: Hub,
    policy: TtlPolicy,
    empty_room_grace: Duration,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct RoomSnapshot {
    pub users: Vec<UserView>,
    pub messages: Vec<MessageView>,
}

#[derive(Clone, Debug)]
pub struct FileHandle {
    pub filename: String,
    pub mime: String,
    pub blob_ref: BlobRef,
}

impl RoomStore {
    pub fn new(policy: TtlPolicy) -> Self {
        Self::with_grace(policy, EMPTY_ROOM_GRACE)
    }

    pub fn with_grace(policy: TtlPolicy, empty_room_grace: Duration) -> Self {
        Self {
            rooms: DashMap::new(),
            hub: Hub::new(),
            policy,
            empty_room_grace,
        }
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Lazily creates the room. Known user ids are upserted, never duplicated.
    pub fn join_room(
        &self,
        code: &str,
        user_id: Option<&str>,
        user_name: Option<&str>,
        now: OffsetDateTime,
    ) -> JoinOutcome {
        let mut room = self
            .rooms
            .entry(code.to_owned())
            .or_insert_with(|| Room::new(code, now));
        let (outcome, events) = room.join(user_id, user_name, now);
        for event in &events {
            self.hub.broadcast(code, event);
        }
        outcome
    }

    /// Strict membership: posting into an unknown room or with an unknown
    /// user id fails instead of provisioning on the fly.
    pub fn post_message(
        &self,
        code: &str,
        user_id: &str,
        draft: MessageDraft,
        now: OffsetDateTime,
    ) -> AppResult<Message> {
        let payload = match draft {
            MessageDraft::Text { body } => {
                let body = body.trim().to_owned();
                if body.is_empty() {
                    return Err(AppError::Validation("empty message".into()));
                }
                text_payload(body)
            }
            MessageDraft::Location {
                latitude,
                longitude,
            } => MessagePayload::Location {
                latitude,
                longitude,
            },
        };
        self.append(code, user_id, payload, now)
    }

    /// One message per stored file; called by the upload handler after the
    /// blob store accepted the bytes.
    pub fn post_upload(
        &self,
        code: &str,
        user_id: &str,
        kind: MessageKind,
        filename: String,
        mime: String,
        size_bytes: u64,
        blob_ref: BlobRef,
        now: OffsetDateTime,
    ) -> AppResult<Message> {
        if !kind.is_blob() {
            return Err(AppError::Validation(format!(
                "cannot upload a {kind:?} message"
            )));
        }
        let payload = messages::blob_payload(kind, filename, mime, size_bytes, blob_ref);
        self.append(code, user_id, payload, now)
    }

    fn append(
        &self,
        code: &str,
        user_id: &str,
        payload: MessagePayload,
        now: OffsetDateTime,
    ) -> AppResult<Message> {
        let mut room = self.rooms.get_mut(code).ok_or(AppError::NotFound("room"))?;
        let username = {
            let user = room.user_mut(user_id).ok_or(AppError::NotFound("user"))?;
            user.last_heartbeat = now;
            user.name.clone()
        };
        let message = room.append(user_id, &username, payload, now);
        let view = MessageView::of(
            &message,
            self.policy.remaining_secs(message.created_at, now),
        );
        self.hub.broadcast(code, &Event::NewMessage { message: view });
        Ok(message)
    }

    pub fn ensure_member(&self, code: &str, user_id: &str) -> AppResult<()> {
        let room = self.rooms.get(code).ok_or(AppError::NotFound("room"))?;
        room.user(user_id)
            .map(|_| ())
            .ok_or(AppError::NotFound("user"))
    }

    /// Idempotent: a second delete of the same id returns `false` and emits
    /// nothing. Any blob reference is handed back for deferred cleanup.
    pub fn delete_message(&self, message_id: &str) -> (bool, Option<BlobRef>) {
        for mut entry in self.rooms.iter_mut() {
            if let Some(msg) = entry.value_mut().delete_message(message_id) {
                let code = entry.key().clone();
                self.hub.broadcast(
                    &code,
                    &Event::MessageDeleted {
                        message_id: msg.id.clone(),
                    },
                );
                return (true, msg.blob_ref().cloned());
            }
        }
        (false, None)
    }

    /// Clears the room's registry, emitting a single `room_cleared` rather
    /// than one deletion per message. A missing room counts as already clear.
    pub fn delete_all_messages(&self, code: &str) -> (usize, Vec<BlobRef>) {
        let Some(mut room) = self.rooms.get_mut(code) else {
            return (0, Vec::new());
        };
        let removed = room.delete_all_messages();
        let blobs = removed.iter().filter_map(|m| m.blob_ref().cloned()).collect();
        self.hub.broadcast(
            code,
            &Event::RoomCleared {
                message: "All messages deleted".into(),
            },
        );
        (removed.len(), blobs)
    }

    /// Refreshes the user's presence in every room that knows the id.
    /// Unknown ids are a silent no-op: heartbeats race with eviction.
    pub fn heartbeat(&self, user_id: &str, now: OffsetDateTime) -> bool {
        let mut seen = false;
        for mut entry in self.rooms.iter_mut() {
            seen |= entry.value_mut().heartbeat(user_id, now);
        }
        seen
    }

    pub fn rename_user(&self, user_id: &str, new_name: &str) -> bool {
        let Some(name) = presence::clean_name(new_name) else {
            return false;
        };
        let mut renamed = false;
        for mut entry in self.rooms.iter_mut() {
            if let Some(event) = entry.value_mut().rename(user_id, &name) {
                let code = entry.key().clone();
                self.hub.broadcast(&code, &event);
                renamed = true;
            }
        }
        renamed
    }

    /// Consistent view of one room: active users in join order plus live
    /// messages with their remaining lifetimes, taken under the room's lock.
    pub fn room_snapshot(&self, code: &str, now: OffsetDateTime) -> RoomSnapshot {
        let Some(room) = self.rooms.get(code) else {
            return RoomSnapshot::default();
        };
        RoomSnapshot {
            users: room
                .list_active(&self.policy, now)
                .into_iter()
                .map(UserView::from)
                .collect(),
            messages: room
                .live_messages(&self.policy, now)
                .into_iter()
                .map(|m| MessageView::of(m, self.policy.remaining_secs(m.created_at, now)))
                .collect(),
        }
    }

    pub fn active_users(&self, code: &str, now: OffsetDateTime) -> Vec<UserView> {
        self.room_snapshot(code, now).users
    }

    pub fn find_file(&self, message_id: &str, now: OffsetDateTime) -> AppResult<FileHandle> {
        for entry in self.rooms.iter() {
            let Some(msg) = entry.value().messages.iter().find(|m| m.id == message_id) else {
                continue;
            };
            let MessagePayload::Blob {
                filename,
                mime,
                blob_ref,
                ..
            } = &msg.payload
            else {
                return Err(AppError::Validation("not a file message".into()));
            };
            if self.policy.is_expired(msg.created_at, now) {
                return Err(AppError::Gone("file"));
            }
            return Ok(FileHandle {
                filename: filename.clone(),
                mime: mime.clone(),
                blob_ref: blob_ref.clone(),
            });
        }
        Err(AppError::NotFound("file"))
    }

    /// Reaper entry point: expire messages, evict stale users, drop rooms
    /// that stayed drained past the grace period. Each room is swept under
    /// its own lock, so appends racing the sweep are never half-removed.
    pub fn sweep(&self, now: OffsetDateTime) -> Vec<BlobRef> {
        let mut purged = Vec::new();
        self.rooms.retain(|code, room| {
            for msg in room.sweep_expired(&self.policy, now) {
                purged.extend(msg.blob_ref().cloned());
                self.hub
                    .broadcast(code, &Event::MessageDeleted { message_id: msg.id });
            }
            for user in room.sweep_stale(&self.policy, now) {
                self.hub.broadcast(
                    code,
                    &Event::UserLeft {
                        user_id: user.id,
                        user_name: user.name,
                    },
                );
            }

            if !room.is_drained() {
                room.empty_since = None;
                return true;
            }
            let drained_at = *room.empty_since.get_or_insert(now);
            if now - drained_at >= self.empty_room_grace {
                tracing::debug!(room = %code, "evicting empty room");
                false
            } else {
                true
            }
        });
        purged
    }
}
