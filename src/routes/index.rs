// src/routes/index.rs
//! Static landing page served at `/`.

use axum::{response::Html, routing::get, Router};

const INDEX_HTML: &str = include_str!("../../static/index.html");

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/", get(index))
}
