use super::dispatch::not_found;
use axum::body::Body;
use axum::extract::Request;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use std::path::PathBuf;
use tower::ServiceExt;
use tower_http::services::ServeDir;
use tracing::warn;

/// Serve `remainder` (the request path with the mount stripped) from `directory`
pub async fn serve(directory: PathBuf, remainder: &str, request: Request) -> Response {
    let (mut parts, body) = request.into_parts();
    let target = match parts.uri.query() {
        Some(query) => format!("{}?{}", remainder, query),
        None => remainder.to_string(),
    };
    parts.uri = match target.parse::<Uri>() {
        Ok(uri) => uri,
        Err(e) => {
            warn!(%remainder, "Unusable static file path: {}", e);
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let response = match ServeDir::new(directory)
        .oneshot(Request::from_parts(parts, body))
        .await
    {
        Ok(response) => response,
        Err(infallible) => match infallible {},
    };

    if response.status() == StatusCode::NOT_FOUND {
        return not_found();
    }
    response.map(Body::new)
}
