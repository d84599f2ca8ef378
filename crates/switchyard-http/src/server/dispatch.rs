//! Request dispatch pipeline
//!
//! Every request to a server instance lands in one fallback handler that
//! resolves the route against the instance's [`PathRouter`](crate::routing::PathRouter)
//! and then serves a plain callback, upgrades to a WebSocket or serves a file.

use super::registry::ServerRegistry;
use super::static_files;
use crate::config::ServerConfig;
use crate::engine::{CallbackResponse, RequestDescriptor};
use crate::errors::{HubError, HubResult};
use crate::foundation::{ClientId, ServerId, HEADER_VALUE_SEPARATOR, INTERNAL_ERROR_PREFIX, NOT_FOUND_BODY};
use crate::logging::structured;
use crate::routing::ResolvedRoute;
use crate::websocket::connection::run_connection;
use crate::websocket::WebSocketClient;
use axum::body::Body;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, FromRequestParts, Request, State};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE, HOST};
use axum::http::{request::Parts, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::timeout::TimeoutLayer;
use tracing::{error, warn};

/// State shared by every request of one server instance
#[derive(Clone)]
pub struct DispatchContext {
    pub registry: Arc<ServerRegistry>,
    pub server_id: ServerId,
    pub config: Arc<ServerConfig>,
}

impl DispatchContext {
    pub fn new(registry: Arc<ServerRegistry>, server_id: ServerId, config: ServerConfig) -> Self {
        Self {
            registry,
            server_id,
            config: Arc::new(config),
        }
    }
}

/// Router serving one instance
pub fn build_router(context: DispatchContext) -> Router {
    let timeout = context.config.request_timeout();
    Router::new()
        .fallback(dispatch)
        .with_state(context)
        .layer(TimeoutLayer::new(timeout))
}

async fn dispatch(State(context): State<DispatchContext>, request: Request) -> Response {
    let started = Instant::now();
    let method = request.method().to_string();
    let request_path = request.uri().path().to_string();

    let response = if header_block_size(request.headers()) > context.config.max_header_bytes {
        StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE.into_response()
    } else {
        match context.registry.resolve_route(context.server_id, &request_path).await {
            Some(ResolvedRoute::Handler {
                path,
                callback: Some(_),
            }) => handle_request(&context, path, request).await,
            Some(ResolvedRoute::WebSocket {
                path,
                callback: Some(_),
            }) => upgrade(context.clone(), path, request).await,
            Some(ResolvedRoute::Static {
                directory, remainder, ..
            }) => static_files::serve(directory, &remainder, request).await,
            // unknown path, or a route whose handle has gone inert
            _ => not_found(),
        }
    };

    structured::log_request(
        context.server_id,
        &method,
        &request_path,
        response.status().as_u16(),
        started.elapsed().as_millis(),
    );
    response
}

async fn handle_request(context: &DispatchContext, path: String, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, context.config.max_body_size).await {
        Ok(body) => body,
        Err(e) => {
            warn!(server_id = %context.server_id, %path, "Failed to read request body: {}", e);
            return StatusCode::PAYLOAD_TOO_LARGE.into_response();
        }
    };

    let descriptor = RequestDescriptor {
        method: parts.method.to_string(),
        path: path.clone(),
        url: parts.uri.to_string(),
        proto: format!("{:?}", parts.version),
        content_length: parts
            .headers
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse().ok()),
        host: request_host(&parts),
        remote_addr: parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.to_string())
            .unwrap_or_default(),
        headers: header_snapshot(&parts.headers, context.config.max_callback_headers),
        body,
    };

    match invoke_detached(context, &path, descriptor).await {
        None => not_found(),
        Some(Err(e)) => {
            error!(server_id = %context.server_id, %path, "Request callback failed: {}", e);
            let detail = match e {
                HubError::EngineCallFailed { message } => message,
                other => other.to_string(),
            };
            (StatusCode::INTERNAL_SERVER_ERROR, format!("{}{}", INTERNAL_ERROR_PREFIX, detail)).into_response()
        }
        Some(Ok(response)) if response.is_not_found_sentinel() => not_found(),
        Some(Ok(response)) => into_http_response(context.server_id, response),
    }
}

/// Run the callback on its own task.
///
/// An engine call is never cancelled once started: when the request times
/// out only the waiting side is dropped and the call still completes under
/// the global lock.
async fn invoke_detached(
    context: &DispatchContext,
    path: &str,
    descriptor: RequestDescriptor,
) -> Option<HubResult<CallbackResponse>> {
    let registry = Arc::clone(&context.registry);
    let server_id = context.server_id;
    let path = path.to_string();
    let call = tokio::spawn(async move { registry.invoke_request(server_id, &path, descriptor).await });
    match call.await {
        Ok(outcome) => outcome,
        Err(e) => Some(Err(HubError::engine(format!("callback task failed: {}", e)))),
    }
}

async fn upgrade(context: DispatchContext, path: String, request: Request) -> Response {
    let (mut parts, _body) = request.into_parts();
    let ws = match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
        Ok(ws) => ws,
        Err(rejection) => {
            warn!(server_id = %context.server_id, %path, "upgrade: {}", rejection);
            return rejection.into_response();
        }
    };

    let server_id = context.server_id;
    ws.on_failed_upgrade(move |e| warn!(%server_id, "upgrade: {}", e))
        .on_upgrade(move |socket| accept_client(context.registry, server_id, path, socket))
}

/// Register a freshly upgraded socket and run its read loop
async fn accept_client(registry: Arc<ServerRegistry>, server_id: ServerId, path: String, socket: WebSocket) {
    let (client, outbound) = WebSocketClient::channel(ClientId::new(), path.clone());
    let client_id = client.id;
    if let Err(e) = registry.attach_client(server_id, client).await {
        warn!(%server_id, %client_id, %path, "Refusing WebSocket client: {}", e);
        return;
    }
    run_connection(registry, server_id, client_id, path, socket, outbound).await;
}

/// The standard not-found response
pub fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        [(CONTENT_TYPE, "text/plain; charset=utf-8")],
        NOT_FOUND_BODY,
    )
        .into_response()
}

/// Build the HTTP response for a callback result.
///
/// Invalid header entries are skipped; an out-of-range status becomes 500.
fn into_http_response(server_id: ServerId, callback: CallbackResponse) -> Response {
    let mut headers = HeaderMap::with_capacity(callback.headers.len());
    for (name, value) in &callback.headers {
        match (HeaderName::try_from(name.as_str()), HeaderValue::try_from(value.as_str())) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => warn!(%server_id, header = %name, "Skipping invalid response header"),
        }
    }

    let status = StatusCode::from_u16(callback.status).unwrap_or_else(|_| {
        warn!(%server_id, status = callback.status, "Callback returned an invalid status code");
        StatusCode::INTERNAL_SERVER_ERROR
    });

    let mut response = Response::new(Body::from(callback.body));
    *response.headers_mut() = headers;
    *response.status_mut() = status;
    response
}

fn request_host(parts: &Parts) -> String {
    parts
        .headers
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .or_else(|| parts.uri.authority().map(|authority| authority.as_str()))
        .unwrap_or_default()
        .to_string()
}

/// Header entries handed to the engine.
///
/// One entry per header name in arrival order, repeated values joined with
/// `|`, at most `cap` entries. Values that are not visible ASCII are skipped.
pub fn header_snapshot(headers: &HeaderMap, cap: usize) -> Vec<(String, String)> {
    headers
        .keys()
        .take(cap)
        .map(|name| {
            let values: Vec<&str> = headers
                .get_all(name)
                .iter()
                .filter_map(|value| value.to_str().ok())
                .collect();
            (name.as_str().to_string(), values.join(HEADER_VALUE_SEPARATOR))
        })
        .collect()
}

/// Approximate wire size of a header block, `name: value\r\n` per entry
fn header_block_size(headers: &HeaderMap) -> usize {
    headers
        .iter()
        .map(|(name, value)| name.as_str().len() + value.len() + 4)
        .sum()
}
