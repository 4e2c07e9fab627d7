pub mod appresult;
pub mod blob;
pub mod clock;
pub mod config;
pub mod events;
pub mod hub;
pub mod reaper;
pub mod rooms;
pub mod store;

use std::sync::Arc;

use axum::extract::FromRef;

pub use crate::appresult::{AppError, AppResult};
use crate::blob::BlobStore;
use crate::config::UploadLimits;
use crate::store::RoomStore;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub store: Arc<RoomStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub limits: UploadLimits,
}
