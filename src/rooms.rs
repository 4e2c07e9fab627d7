mod api;
mod ws;

use axum::{routing::{delete, get, post}, Router};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/room/new", get(api::new_room))
        .route("/api/join/{room_code}", get(api::join))
        .route("/api/message/{id}", post(api::send_message).delete(api::delete_message))
        .route("/api/upload/{room_code}", post(api::upload))
        .route("/api/room/{room_code}/all", delete(api::delete_all))
        .route("/api/room/{room_code}/data", get(api::room_data))
        .route("/api/heartbeat/{user_id}", post(api::heartbeat))
        .route("/api/rename/{user_id}", post(api::rename))
        .route("/api/download/{message_id}", get(api::download))
        .route("/ws/{room_code}/{user_id}", get(ws::room_ws))
}
