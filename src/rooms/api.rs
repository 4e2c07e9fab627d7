use std::sync::Arc;

use axum::{
    Json, debug_handler,
    extract::{Multipart, Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use rand::Rng;
use serde::Deserialize;
use serde_json::json;
use time::OffsetDateTime;

use crate::blob::{BlobRef, BlobStore};
use crate::config::UploadLimits;
use crate::store::room::MessageKind;
use crate::store::{MessageDraft, RoomStore};
use crate::{AppError, AppResult};

/// Room codes skip 0/O/1/I so they survive being read aloud.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const CODE_LEN: usize = 6;

fn generate_room_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

#[debug_handler]
pub(crate) async fn new_room() -> Json<serde_json::Value> {
    Json(json!({ "room_code": generate_room_code() }))
}

#[derive(Deserialize)]
pub(crate) struct JoinQuery {
    user_id: Option<String>,
    user_name: Option<String>,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn join(
    Path(room_code): Path<String>,
    Query(JoinQuery { user_id, user_name }): Query<JoinQuery>,
    State(store): State<Arc<RoomStore>>,
) -> Json<serde_json::Value> {
    let outcome = store.join_room(
        &room_code.to_uppercase(),
        user_id.as_deref(),
        user_name.as_deref(),
        OffsetDateTime::now_utc(),
    );
    Json(json!({
        "success": true,
        "user_id": outcome.user_id,
        "user_name": outcome.user_name,
        "existing": outcome.existing,
    }))
}

#[derive(Deserialize)]
pub(crate) struct SendQuery {
    user_id: String,
    text: Option<String>,
    message_type: Option<MessageKind>,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn send_message(
    Path(room_code): Path<String>,
    Query(query): Query<SendQuery>,
    State(store): State<Arc<RoomStore>>,
) -> AppResult<Json<serde_json::Value>> {
    let draft = match query.message_type.unwrap_or(MessageKind::Text) {
        MessageKind::Text => MessageDraft::Text {
            body: query.text.unwrap_or_default(),
        },
        MessageKind::Location => {
            let (Some(latitude), Some(longitude)) = (query.latitude, query.longitude) else {
                return Err(AppError::Validation("missing location data".into()));
            };
            MessageDraft::Location {
                latitude,
                longitude,
            }
        }
        other => {
            return Err(AppError::Validation(format!(
                "{other:?} messages go through the upload endpoint"
            )));
        }
    };

    let message = store.post_message(
        &room_code.to_uppercase(),
        &query.user_id,
        draft,
        OffsetDateTime::now_utc(),
    )?;
    Ok(Json(json!({ "success": true, "message_id": message.id })))
}

#[derive(Deserialize)]
pub(crate) struct UploadQuery {
    user_id: String,
    message_type: Option<MessageKind>,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn upload(
    Path(room_code): Path<String>,
    Query(UploadQuery {
        user_id,
        message_type,
    }): Query<UploadQuery>,
    State(store): State<Arc<RoomStore>>,
    State(blobs): State<Arc<dyn BlobStore>>,
    State(limits): State<UploadLimits>,
    mut multipart: Multipart,
) -> AppResult<Json<serde_json::Value>> {
    let room_code = room_code.to_uppercase();
    let kind = message_type.unwrap_or(MessageKind::File);
    if !kind.is_blob() {
        return Err(AppError::Validation(format!(
            "cannot upload a {kind:?} message"
        )));
    }
    store.ensure_member(&room_code, &user_id)?;

    let mut uploaded = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        let Some(filename) = field.file_name().map(str::to_owned) else {
            continue;
        };
        let mime = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_owned();
        let bytes = field.bytes().await?;

        if let Some(saved) =
            save_upload(&store, &blobs, limits, &room_code, &user_id, kind, filename, mime, &bytes)
                .await
        {
            uploaded.push(saved);
        }
    }

    Ok(Json(json!({
        "success": true,
        "message": format!("{} file(s) uploaded", uploaded.len()),
        "files": uploaded,
    })))
}

/// Stores one file of a batch and appends its message. Returns `None` when
/// the file is skipped: an oversized or blob-rejected file never aborts its
/// siblings.
async fn save_upload(
    store: &RoomStore,
    blobs: &Arc<dyn BlobStore>,
    limits: UploadLimits,
    room_code: &str,
    user_id: &str,
    kind: MessageKind,
    filename: String,
    mime: String,
    bytes: &[u8],
) -> Option<serde_json::Value> {
    if bytes.len() > limits.max_file_size {
        tracing::warn!(filename, size = bytes.len(), "skipping oversized upload");
        return None;
    }

    let blob_ref = match blobs.store(bytes, &filename, &mime).await {
        Ok(blob_ref) => blob_ref,
        Err(err) => {
            tracing::warn!(filename, error = %err, "blob store rejected upload");
            return None;
        }
    };

    match store.post_upload(
        room_code,
        user_id,
        kind,
        filename.clone(),
        mime,
        bytes.len() as u64,
        blob_ref.clone(),
        OffsetDateTime::now_utc(),
    ) {
        Ok(message) => Some(json!({ "id": message.id, "name": filename })),
        Err(err) => {
            // room or user vanished mid-batch; drop the orphaned blob
            tracing::warn!(filename, error = %err, "upload raced eviction");
            purge_blobs(blobs.clone(), vec![blob_ref]);
            None
        }
    }
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn delete_message(
    Path(message_id): Path<String>,
    State(store): State<Arc<RoomStore>>,
    State(blobs): State<Arc<dyn BlobStore>>,
) -> Json<serde_json::Value> {
    let (deleted, blob) = store.delete_message(&message_id);
    purge_blobs(blobs, blob.into_iter().collect());
    Json(json!({ "success": true, "deleted": deleted }))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn delete_all(
    Path(room_code): Path<String>,
    State(store): State<Arc<RoomStore>>,
    State(blobs): State<Arc<dyn BlobStore>>,
) -> Json<serde_json::Value> {
    let (count, purged) = store.delete_all_messages(&room_code.to_uppercase());
    purge_blobs(blobs, purged);
    Json(json!({
        "success": true,
        "message": format!("Deleted {count} messages"),
        "count": count,
    }))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn room_data(
    Path(room_code): Path<String>,
    State(store): State<Arc<RoomStore>>,
) -> Json<crate::store::RoomSnapshot> {
    Json(store.room_snapshot(&room_code.to_uppercase(), OffsetDateTime::now_utc()))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn heartbeat(
    Path(user_id): Path<String>,
    State(store): State<Arc<RoomStore>>,
) -> Json<serde_json::Value> {
    let seen = store.heartbeat(&user_id, OffsetDateTime::now_utc());
    Json(json!({ "success": seen }))
}

#[derive(Deserialize)]
pub(crate) struct RenameQuery {
    name: String,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn rename(
    Path(user_id): Path<String>,
    Query(RenameQuery { name }): Query<RenameQuery>,
    State(store): State<Arc<RoomStore>>,
) -> AppResult<Json<serde_json::Value>> {
    if name.trim().is_empty() {
        return Err(AppError::Validation("empty name".into()));
    }
    Ok(Json(json!({ "success": store.rename_user(&user_id, &name) })))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn download(
    Path(message_id): Path<String>,
    State(store): State<Arc<RoomStore>>,
    State(blobs): State<Arc<dyn BlobStore>>,
) -> AppResult<Response> {
    let file = store.find_file(&message_id, OffsetDateTime::now_utc())?;
    let bytes = blobs
        .retrieve(&file.blob_ref)
        .await
        .map_err(AppError::Transient)?;
    Ok((
        [
            (header::CONTENT_TYPE, file.mime),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file.filename),
            ),
        ],
        bytes,
    )
        .into_response())
}

/// Blob deletion rides on spawned tasks so no mutation ever waits on disk.
fn purge_blobs(blobs: Arc<dyn BlobStore>, refs: Vec<BlobRef>) {
    for blob in refs {
        let blobs = blobs.clone();
        tokio::spawn(async move {
            if let Err(err) = blobs.delete(&blob).await {
                tracing::warn!(%blob, error = %err, "failed to delete blob");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::clock::TtlPolicy;

    /// Accepts everything except one filename, to stand in for a disk that
    /// fails part-way through a batch.
    struct RejectingBlobs {
        fail_on: &'static str,
    }

    #[async_trait]
    impl BlobStore for RejectingBlobs {
        async fn store(
            &self,
            _bytes: &[u8],
            filename: &str,
            _mime: &str,
        ) -> anyhow::Result<BlobRef> {
            if filename == self.fail_on {
                anyhow::bail!("disk full");
            }
            Ok(BlobRef::new(format!("k_{filename}")))
        }

        async fn retrieve(&self, _blob: &BlobRef) -> anyhow::Result<Vec<u8>> {
            anyhow::bail!("not stored")
        }

        async fn delete(&self, _blob: &BlobRef) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn limits() -> UploadLimits {
        UploadLimits { max_file_size: 1024 }
    }

    #[tokio::test]
    async fn failed_blob_skips_that_file_but_not_its_siblings() {
        let store = RoomStore::new(TtlPolicy::default());
        let user = store.join_room("R7K2", None, None, OffsetDateTime::now_utc());
        let blobs: Arc<dyn BlobStore> = Arc::new(RejectingBlobs { fail_on: "bad.bin" });

        let skipped = save_upload(
            &store,
            &blobs,
            limits(),
            "R7K2",
            &user.user_id,
            MessageKind::File,
            "bad.bin".into(),
            "application/octet-stream".into(),
            b"xx",
        )
        .await;
        assert!(skipped.is_none());

        let saved = save_upload(
            &store,
            &blobs,
            limits(),
            "R7K2",
            &user.user_id,
            MessageKind::File,
            "good.bin".into(),
            "application/octet-stream".into(),
            b"yy",
        )
        .await;
        let saved = saved.expect("sibling file should go through");
        assert_eq!(saved["name"], "good.bin");

        let snapshot = store.room_snapshot("R7K2", OffsetDateTime::now_utc());
        assert_eq!(snapshot.messages.len(), 1);
    }

    #[tokio::test]
    async fn oversized_file_is_skipped_without_reaching_the_blob_store() {
        let store = RoomStore::new(TtlPolicy::default());
        let user = store.join_room("R7K2", None, None, OffsetDateTime::now_utc());
        let blobs: Arc<dyn BlobStore> = Arc::new(RejectingBlobs { fail_on: "" });

        let skipped = save_upload(
            &store,
            &blobs,
            limits(),
            "R7K2",
            &user.user_id,
            MessageKind::File,
            "huge.bin".into(),
            "application/octet-stream".into(),
            &[0u8; 2048],
        )
        .await;
        assert!(skipped.is_none());
        assert!(
            store
                .room_snapshot("R7K2", OffsetDateTime::now_utc())
                .messages
                .is_empty()
        );
    }
}
