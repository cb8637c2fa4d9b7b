//! Body transfer endpoints used by connectors.
//!
//! Outsourced request bodies are fetched here, and response bodies too large to
//! inline are uploaded here before the response message is sent.

use axum::{
    body::Body,
    extract::{Path, Query, Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures_util::TryStreamExt;
use serde::Deserialize;
use tokio_util::io::{ReaderStream, StreamReader};
use uuid::Uuid;

use crate::body_store::{BodyReader, BodyRemoval, BodyStoreError, RemovingReader};
use crate::http::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct FetchQuery {
    /// Remove the body once it was streamed.
    #[serde(default)]
    delete: bool,
}

pub async fn fetch_request_body(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Query(query): Query<FetchQuery>,
) -> Response {
    let store = state.core.body_store().clone();
    let reader = match store.open_request_body(request_id).await {
        Ok(reader) => reader,
        Err(e) => return body_error(e),
    };

    let reader: BodyReader = if query.delete {
        Box::new(RemovingReader::new(reader, BodyRemoval::request(store, request_id)))
    } else {
        reader
    };

    (
        [(header::CONTENT_TYPE, "application/octet-stream")],
        Body::from_stream(ReaderStream::new(reader)),
    )
        .into_response()
}

pub async fn upload_response_body(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    request: Request,
) -> Response {
    let stream = request.into_body().into_data_stream().map_err(std::io::Error::other);
    let reader: BodyReader = Box::new(StreamReader::new(stream));

    match state.core.body_store().store_response_body(request_id, reader).await {
        Ok(size) => {
            tracing::debug!(request_id = %request_id, size, "Response body stored");
            Json(serde_json::json!({ "bodySize": size })).into_response()
        }
        Err(e) => body_error(e),
    }
}

fn body_error(error: BodyStoreError) -> Response {
    match error {
        BodyStoreError::NotFound { .. } => (StatusCode::NOT_FOUND, error.to_string()).into_response(),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "Body store failure").into_response(),
    }
}
