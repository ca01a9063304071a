//! HTTP(S) request gate.
//!
//! One route matters: `GET {prefix}/i2pseeds.su3`. Everything else is a
//! bodyless 404. The middleware stack, outermost first: trusted-proxy
//! remap, connection-close, access log, user-agent filter, rate limit.
//!
//! The accept loops consult the blacklist on the raw TCP connection,
//! before TLS: a blocked peer sees its connection accepted and closed
//! without a byte read.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tower::Service;
use tracing::{debug, info, warn};

use crate::blacklist::Blacklist;
use crate::reseeder::{Peer, Reseeder};
use crate::throttle::Throttle;

/// The exact User-Agent the router's reseed client sends. Anything else
/// is not a reseed request.
pub const I2P_USER_AGENT: &str = "Wget/1.11.4";

/// Remote identity attached to every request by the accept loop, and
/// replaced by the first X-Forwarded-For value when the proxy is trusted.
#[derive(Debug, Clone)]
pub struct RemoteIp(pub String);

#[derive(Clone)]
pub struct AppState {
    pub reseeder: Arc<Reseeder>,
    pub throttle: Arc<Throttle>,
}

pub fn router(state: AppState, prefix: &str, trust_proxy: bool) -> Router {
    let su3_path = format!("{prefix}/i2pseeds.su3");

    let mut app = Router::new()
        .route(&su3_path, get(reseed_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), throttle))
        .route_layer(middleware::from_fn(require_i2p_user_agent))
        .fallback(not_found)
        .layer(middleware::from_fn(access_log))
        .layer(middleware::from_fn(close_connection));

    if trust_proxy {
        app = app.layer(middleware::from_fn(trust_proxy_remap));
    }

    app.with_state(state)
}

async fn reseed_handler(State(state): State<AppState>, request: Request) -> Response {
    let peer = Peer(host_only(&remote_ip(&request)));

    match state.reseeder.su3_bytes_for(&peer) {
        Ok(bytes) => {
            let len = bytes.len();
            let mut response = Response::new(Body::from(bytes));
            let headers = response.headers_mut();
            headers.insert(
                header::CONTENT_DISPOSITION,
                HeaderValue::from_static("attachment; filename=i2pseeds.su3"),
            );
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            );
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
            response
        }
        Err(e) => {
            warn!("unable to serve su3 to {}: {e}", peer.0);
            (StatusCode::INTERNAL_SERVER_ERROR, "500 Unable to serve su3").into_response()
        }
    }
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

// ── Middleware ───────────────────────────────────────────────────────

async fn require_i2p_user_agent(request: Request, next: Next) -> Response {
    let genuine = request
        .headers()
        .get(header::USER_AGENT)
        .map(|ua| ua.as_bytes() == I2P_USER_AGENT.as_bytes())
        .unwrap_or(false);

    if !genuine {
        return StatusCode::FORBIDDEN.into_response();
    }
    next.run(request).await
}

async fn throttle(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let key = remote_ip(&request);
    if !state.throttle.allow(&key) {
        debug!("rate limited {key}");
        return StatusCode::TOO_MANY_REQUESTS.into_response();
    }
    next.run(request).await
}

async fn trust_proxy_remap(mut request: Request, next: Next) -> Response {
    let forwarded = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    if let Some(forwarded) = forwarded {
        request.extensions_mut().insert(RemoteIp(forwarded));
    }
    next.run(request).await
}

async fn close_connection(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static("close"));
    response
}

/// Combined Log Format line per completed request.
async fn access_log(request: Request, next: Next) -> Response {
    let remote = remote_ip(&request);
    let method = request.method().clone();
    let uri = request.uri().clone();
    let version = request.version();
    let referer = header_or_dash(request.headers(), header::REFERER);
    let user_agent = header_or_dash(request.headers(), header::USER_AGENT);

    let response = next.run(request).await;

    let status = response.status().as_u16();
    let length = response
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();
    let when = chrono::Utc::now().format("%d/%b/%Y:%H:%M:%S %z");
    info!(
        target: "access",
        "{remote} - - [{when}] \"{method} {uri} {version:?}\" {status} {length} \"{referer}\" \"{user_agent}\""
    );

    response
}

fn remote_ip(request: &Request) -> String {
    request
        .extensions()
        .get::<RemoteIp>()
        .map(|r| r.0.clone())
        .unwrap_or_default()
}

/// The host portion of a remote identity. A plain IP (or anything else
/// that is not `host:port`) passes through verbatim.
fn host_only(remote: &str) -> String {
    remote
        .parse::<SocketAddr>()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|_| remote.to_string())
}

fn header_or_dash(headers: &HeaderMap, name: header::HeaderName) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string()
}

// ── Accept loops ─────────────────────────────────────────────────────

/// Serve plain HTTP (for behind a reverse proxy).
pub async fn serve_plain(
    listener: TcpListener,
    app: Router,
    blacklist: Arc<Blacklist>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    loop {
        let (stream, remote_addr) = listener.accept().await?;
        if blocked(&blacklist, remote_addr) {
            drop(stream);
            continue;
        }

        let app = app.clone();
        tokio::spawn(serve_connection(stream, remote_addr, app));
    }
}

/// Serve HTTPS. The blacklist check happens before the TLS handshake.
pub async fn serve_tls(
    listener: TcpListener,
    app: Router,
    blacklist: Arc<Blacklist>,
    acceptor: TlsAcceptor,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    loop {
        let (stream, remote_addr) = listener.accept().await?;
        if blocked(&blacklist, remote_addr) {
            drop(stream);
            continue;
        }

        let acceptor = acceptor.clone();
        let app = app.clone();
        tokio::spawn(async move {
            match acceptor.accept(stream).await {
                Ok(tls_stream) => serve_connection(tls_stream, remote_addr, app).await,
                Err(e) => debug!("TLS handshake failed from {remote_addr}: {e}"),
            }
        });
    }
}

/// Accept-then-close for blocked peers: nothing is read, nothing is sent.
fn blocked(blacklist: &Blacklist, remote_addr: SocketAddr) -> bool {
    if blacklist.is_blocked(&remote_addr.ip().to_string()) {
        debug!("dropped blacklisted connection from {remote_addr}");
        true
    } else {
        false
    }
}

async fn serve_connection<S>(stream: S, remote_addr: SocketAddr, app: Router)
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    let io = TokioIo::new(stream);

    let service = hyper::service::service_fn(
        move |mut req: hyper::Request<hyper::body::Incoming>| {
            let mut app = app.clone();
            req.extensions_mut()
                .insert(RemoteIp(remote_addr.ip().to_string()));
            async move { app.call(req.map(Body::new)).await }
        },
    );

    let builder = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new());
    if let Err(e) = builder.serve_connection(io, service).await {
        debug!("connection error from {remote_addr}: {e}");
    }
}
