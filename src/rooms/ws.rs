use std::sync::Arc;

use axum::{
    debug_handler,
    extract::{Path, State, WebSocketUpgrade, ws},
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use time::OffsetDateTime;

use crate::events::Event;
use crate::store::RoomStore;

#[debug_handler(state = crate::AppState)]
pub async fn room_ws(
    Path((room_code, user_id)): Path<(String, String)>,
    State(store): State<Arc<RoomStore>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(async move |socket| {
        let room_code = room_code.to_uppercase();
        let (conn, mut rx) = store.hub().register(&room_code, &user_id);
        let (mut sender, mut receiver) = socket.split();

        // first frame: who is in the room right now
        let hello = Event::UsersList {
            users: store.active_users(&room_code, OffsetDateTime::now_utc()),
        };
        if let Ok(text) = serde_json::to_string(&hello) {
            if sender.send(ws::Message::Text(text.into())).await.is_err() {
                store.hub().unregister(&room_code, &user_id, conn);
                return;
            }
        }

        let push_task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let Ok(text) = serde_json::to_string(&event) else {
                    continue;
                };
                if sender.send(ws::Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
        });

        // any inbound frame counts as a heartbeat
        while let Some(Ok(frame)) = receiver.next().await {
            if matches!(frame, ws::Message::Close(_)) {
                break;
            }
            store.heartbeat(&user_id, OffsetDateTime::now_utc());
        }

        push_task.abort();
        // guarded: a reconnect may already own this slot, and closing the
        // socket never evicts the user from presence
        store.hub().unregister(&room_code, &user_id, conn);
    })
}
