//! HTTP front end: a viewer page for ordinary requests and an MJPEG stream for
//! paths ending in the stream suffix.
//!
//! Each stream request becomes a [`StreamSession`] pulling from the shared
//! [`FrameBroker`]. Hyper drives every connection on its own task, so sessions
//! run in parallel and a dead client only ends its own session.

pub mod multipart;

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, Method, StatusCode, Uri};
use axum::response::{Html, IntoResponse, Response};
use axum::Router;
use bytes::Bytes;
use futures_core::Stream;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::pipeline::FrameBroker;
use crate::ServerConfig;

/// Which request paths get the MJPEG stream.
#[derive(Debug, Clone, PartialEq, Eq)]
enum StreamRoute {
    /// Any path ending in this extension, e.g. `.mjpg`.
    Suffix(String),
    Exact(String),
}

impl StreamRoute {
    /// `.mjpg` for `/cam.mjpg`; the exact path when it has no extension.
    fn for_path(stream_path: &str) -> Self {
        let file = stream_path.rsplit('/').next().unwrap_or(stream_path);
        match file.rfind('.') {
            Some(dot) => StreamRoute::Suffix(file[dot..].to_string()),
            None => StreamRoute::Exact(stream_path.to_string()),
        }
    }

    fn matches(&self, path: &str) -> bool {
        match self {
            StreamRoute::Suffix(suffix) => path.ends_with(suffix.as_str()),
            StreamRoute::Exact(exact) => path == exact,
        }
    }
}

/// Shared state backing the request handler.
pub struct ServerState {
    broker: Arc<FrameBroker>,
    stream_path: String,
    route: StreamRoute,
    boundary: String,
    next_session: AtomicU64,
}

impl ServerState {
    pub fn new(config: &ServerConfig, broker: Arc<FrameBroker>) -> Self {
        Self {
            broker,
            stream_path: config.stream_path.clone(),
            route: StreamRoute::for_path(&config.stream_path),
            boundary: config.boundary.clone(),
            next_session: AtomicU64::new(1),
        }
    }

    /// Stream requests are recognised by extension, so `/anything.mjpg` streams too.
    pub fn is_stream_request(&self, path: &str) -> bool {
        self.route.matches(path)
    }
}

/// Bound listening socket, ready to serve.
pub struct StreamServer {
    listener: TcpListener,
    state: Arc<ServerState>,
}

impl StreamServer {
    pub async fn bind(config: &ServerConfig, broker: Arc<FrameBroker>) -> Result<Self> {
        let addr = format!("{}:{}", config.bind, config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| Error::Bind { addr, source })?;

        Ok(Self {
            listener,
            state: Arc::new(ServerState::new(config, broker)),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `shutdown` resolves and every open connection has
    /// finished; the listening socket is closed on return.
    pub async fn serve<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!(
            "Streaming server listening on http://{}{}",
            self.local_addr()?,
            self.state.stream_path
        );
        let app = router(self.state).into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(self.listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;
        info!("Streaming server stopped");
        Ok(())
    }

    /// Serve on a new task until [`ServerHandle::stop`].
    pub fn spawn(self) -> std::io::Result<ServerHandle> {
        let addr = self.local_addr()?;
        let (stop, stop_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(self.serve(async move {
            let _ = stop_rx.await;
        }));
        Ok(ServerHandle { addr, stop, task })
    }
}

/// A running server task.
pub struct ServerHandle {
    addr: SocketAddr,
    stop: oneshot::Sender<()>,
    task: JoinHandle<std::io::Result<()>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting and wait up to `grace` for open connections to finish.
    ///
    /// A client that stopped reading can hold its connection open forever; past
    /// the grace period the server task is aborted, which closes the listener.
    /// Returns whether every connection drained in time.
    pub async fn stop(mut self, grace: Duration) -> bool {
        let _ = self.stop.send(());
        match tokio::time::timeout(grace, &mut self.task).await {
            Ok(Ok(Ok(()))) => true,
            Ok(Ok(Err(e))) => {
                warn!("Streaming server error: {e}");
                true
            }
            Ok(Err(e)) => {
                warn!("Streaming server task failed: {e}");
                true
            }
            Err(_) => {
                warn!(
                    "Connections to {} still open after {grace:?}, abandoning them",
                    self.addr
                );
                self.task.abort();
                let _ = self.task.await;
                false
            }
        }
    }
}

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new().fallback(handle_request).with_state(state)
}

async fn handle_request(
    State(state): State<Arc<ServerState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    method: Method,
    uri: Uri,
) -> Response {
    if method != Method::GET && method != Method::HEAD {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    if state.is_stream_request(uri.path()) {
        let id = state.next_session.fetch_add(1, Ordering::Relaxed);
        let session = StreamSession::new(
            id,
            peer,
            state.broker.clone(),
            state.boundary.clone(),
        );
        stream_response(&state.boundary, session)
    } else {
        debug!(%peer, path = uri.path(), "Serving viewer page");
        Html(multipart::viewer_page(&state.stream_path)).into_response()
    }
}

fn stream_response(boundary: &str, session: StreamSession) -> Response {
    (
        [
            (header::CONTENT_TYPE, multipart::content_type(boundary)),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        Body::from_stream(session.into_stream()),
    )
        .into_response()
}

/// One client's MJPEG delivery.
///
/// Ends when the broker closes, or when hyper drops the body because a write
/// to the client failed.
pub struct StreamSession {
    id: u64,
    peer: SocketAddr,
    broker: Arc<FrameBroker>,
    boundary: String,
    /// Version of the last frame handed to the connection.
    cursor: u64,
    frames_sent: u64,
    frames_skipped: u64,
    broker_closed: bool,
}

impl StreamSession {
    pub fn new(id: u64, peer: SocketAddr, broker: Arc<FrameBroker>, boundary: String) -> Self {
        info!(session = id, %peer, "Stream session started");
        metrics::gauge!("camstream_sessions_active").increment(1.0);
        Self {
            id,
            peer,
            broker,
            boundary,
            cursor: 0,
            frames_sent: 0,
            frames_skipped: 0,
            broker_closed: false,
        }
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Next encoded part, or `None` once the broker has closed.
    pub async fn next_part(&mut self) -> Option<Bytes> {
        match self.broker.latest(self.cursor).await {
            Ok((frame, version)) => {
                if self.cursor > 0 && version > self.cursor + 1 {
                    let skipped = version - self.cursor - 1;
                    self.frames_skipped += skipped;
                    metrics::counter!("camstream_frames_skipped_total").increment(skipped);
                    debug!(session = self.id, skipped, "Session fell behind");
                }
                self.cursor = version;
                self.frames_sent += 1;
                metrics::counter!("camstream_frames_sent_total").increment(1);
                Some(multipart::encode_part(&self.boundary, &frame.data))
            }
            Err(_) => {
                self.broker_closed = true;
                None
            }
        }
    }

    pub fn into_stream(mut self) -> impl Stream<Item = std::result::Result<Bytes, Infallible>> + Send + 'static {
        stream! {
            while let Some(part) = self.next_part().await {
                yield Ok(part);
            }
        }
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        metrics::gauge!("camstream_sessions_active").decrement(1.0);
        let reason = if self.broker_closed {
            "server shutdown"
        } else {
            "client disconnected"
        };
        info!(
            session = self.id,
            peer = %self.peer,
            frames = self.frames_sent,
            skipped = self.frames_skipped,
            "Stream session ended ({reason})"
        );
    }
}
