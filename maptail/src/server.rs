//! HTTP front-end: event stream and viewer assets under the base path

use crate::sse;
use crate::static_files::{self, AssetError};
use bytes::Bytes;
use futures_util::StreamExt;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use hyper::body::Frame;
use hyper::header::{self, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use maptail_core::Hub;
use std::convert::Infallible;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub type ResponseBody = UnsyncBoxBody<Bytes, Infallible>;

/// Shared, read-only state for every connection
pub struct AppState {
    pub hub: Arc<Hub>,
    /// Normalized base path, "" when mounted at the root
    pub route_prefix: String,
    pub public_dir: PathBuf,
    pub keepalive: Option<Duration>,
}

#[derive(Debug, PartialEq, Eq)]
enum Route<'a> {
    Events,
    Redirect(String),
    Asset(&'a str),
    NotFound,
}

fn classify<'a>(prefix: &str, path: &'a str) -> Route<'a> {
    if !prefix.is_empty() && path == prefix {
        return Route::Redirect(format!("{}/", prefix));
    }

    let rel = match path.strip_prefix(prefix) {
        Some(rel) if rel.starts_with('/') => rel,
        _ => return Route::NotFound,
    };

    if rel == "/events" {
        Route::Events
    } else {
        Route::Asset(rel)
    }
}

pub async fn run_http_server(
    state: Arc<AppState>,
    host: &str,
    port: u16,
    shutdown: impl Future<Output = ()>,
) -> anyhow::Result<()> {
    let ip = host.parse::<IpAddr>()?;
    let addr = SocketAddr::new(ip, port);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(
        "Serving viewer on http://{}{}/",
        addr,
        state.route_prefix
    );

    tokio::pin!(shutdown);
    loop {
        let (socket, peer_addr) = tokio::select! {
            accepted = listener.accept() => accepted?,
            _ = &mut shutdown => {
                tracing::info!("Shutting down HTTP server");
                return Ok(());
            }
        };

        let state = Arc::clone(&state);
        tokio::spawn(async move {
            let service = service_fn(move |req| handle(Arc::clone(&state), req));
            if let Err(e) = http1::Builder::new()
                .serve_connection(TokioIo::new(socket), service)
                .await
            {
                tracing::debug!("Connection error from {}: {}", peer_addr, e);
            }
        });
    }
}

pub async fn handle<B>(
    state: Arc<AppState>,
    req: Request<B>,
) -> Result<Response<ResponseBody>, Infallible> {
    if req.method() != Method::GET && req.method() != Method::HEAD {
        let mut resp = status_response(StatusCode::METHOD_NOT_ALLOWED);
        resp.headers_mut()
            .insert(header::ALLOW, HeaderValue::from_static("GET, HEAD"));
        return Ok(resp);
    }

    let path = req.uri().path();
    let resp = match classify(&state.route_prefix, path) {
        Route::Events => events_response(&state, req.method() == Method::HEAD),
        Route::Redirect(location) => redirect_response(&location),
        Route::Asset(rel) => match static_files::load_asset(&state.public_dir, rel).await {
            Ok(asset) => {
                let content_type = HeaderValue::from_str(&asset.content_type)
                    .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
                let mut resp = Response::new(Full::new(Bytes::from(asset.body)).boxed_unsync());
                resp.headers_mut().insert(header::CONTENT_TYPE, content_type);
                resp
            }
            Err(e) => {
                if e != AssetError::NotFound {
                    tracing::debug!("Refused asset path {:?}: {:?}", rel, e);
                }
                status_response(StatusCode::NOT_FOUND)
            }
        },
        Route::NotFound => status_response(StatusCode::NOT_FOUND),
    };

    tracing::debug!("{} {} -> {}", req.method(), path, resp.status());
    Ok(resp)
}

fn events_response(state: &AppState, head_only: bool) -> Response<ResponseBody> {
    let body = if head_only {
        Empty::new().boxed_unsync()
    } else {
        let stream = sse::event_stream(state.hub.subscribe(), state.keepalive)
            .map(|bytes| Ok::<_, Infallible>(Frame::data(bytes)));
        StreamBody::new(stream).boxed_unsync()
    };

    let mut resp = Response::new(body);
    let headers = resp.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    resp
}

fn redirect_response(location: &str) -> Response<ResponseBody> {
    match HeaderValue::from_str(location) {
        Ok(value) => {
            let mut resp = status_response(StatusCode::MOVED_PERMANENTLY);
            resp.headers_mut().insert(header::LOCATION, value);
            resp
        }
        Err(_) => status_response(StatusCode::NOT_FOUND),
    }
}

fn status_response(status: StatusCode) -> Response<ResponseBody> {
    let reason = status.canonical_reason().unwrap_or("");
    let mut resp = Response::new(Full::new(Bytes::from(reason)).boxed_unsync());
    *resp.status_mut() = status;
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    resp
}
