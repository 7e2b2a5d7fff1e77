//! HTTP adapter.
//!
//! One fallback handler takes every method and path (WebDAV verbs have no
//! axum routing helpers) and hands the request to the [`Dispatcher`].

use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Request as HttpRequest, State};
use axum::response::{IntoResponse, Response};
use axum::Router;
use std::sync::Arc;

use crate::constants::STREAM_CHUNK_MAX;
use crate::dispatch::Dispatcher;
use crate::protocol::{Outcome, Reply, Request};

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        (self.status, self.headers, self.body).into_response()
    }
}

/// Router serving the card through `dispatcher`.
pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .fallback(handle)
        .layer(DefaultBodyLimit::disable())
        .with_state(dispatcher)
}

async fn handle(State(dispatcher): State<Arc<Dispatcher>>, request: HttpRequest) -> Response {
    let (parts, body) = request.into_parts();
    let req = Request {
        method: parts.method,
        path: parts.uri.path().to_string(),
        headers: parts.headers,
    };

    match dispatcher.dispatch(&req).await {
        Outcome::Reply(reply) => reply.into_response(),
        Outcome::Download { headers, download } => {
            let body = Body::from_stream(download.into_stream(STREAM_CHUNK_MAX));
            (headers, body).into_response()
        }
        Outcome::Upload(session) => session.drive(body.into_data_stream()).await.into_response(),
    }
}
