use std::sync::Arc;

use axum::Router;

use crate::RecordStore;

mod health;
mod index;
mod measurements;

// ---

pub fn router(store: Arc<RecordStore>) -> Router {
    // ---
    Router::new()
        .merge(measurements::router())
        .merge(health::router())
        .merge(index::router())
        .with_state(store)
}
