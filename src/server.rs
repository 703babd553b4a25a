//! HTTP server, per-request cancellation and graceful shutdown.
//!
//! # Request lifetime
//!
//! Every request gets a fresh [`CancellationToken`]. It fires when:
//!
//! 1. the response has been produced (the handler returned);
//! 2. hyper drops the request future because the client went away;
//! 3. the configured [`Config::request_timeout`] expires.
//!
//! The deadline starts when the request head arrives, so it also bounds
//! reading the body: a client that stalls mid-upload is answered `408`.
//! Bodies over [`Config::max_body_size`] are answered `413`.
//!
//! Handlers pass it to [`CancellableTask`](crate::CancellableTask) so work
//! they pushed into the background is abandoned along with the request.
//! Cancellation is cooperative: a handler that ignores the token runs on.
//!
//! # Graceful shutdown and Kubernetes
//!
//! On **SIGTERM** or Ctrl-C the server:
//! 1. Immediately stops `listener.accept()` — no new connections are made.
//! 2. Lets every in-flight connection task run to completion.
//! 3. Returns from [`Server::serve`], which lets `main` exit cleanly.
//!
//! Set `terminationGracePeriodSeconds` in your pod spec to a value longer
//! than your slowest request.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::Error;
use crate::method::Method;
use crate::request::Request;
use crate::response::Response;
use crate::router::{Router, Service};
use crate::status::Status;

// ── Config ────────────────────────────────────────────────────────────────────

/// Everything the server needs to know before it starts.
///
/// ```rust
/// use std::time::Duration;
/// use kairo::Config;
///
/// let config = Config::new("0.0.0.0:1323")
///     .request_timeout(Duration::from_secs(30))
///     .max_body_size(64 * 1024);
/// assert_eq!(config.addr(), "0.0.0.0:1323");
/// assert_eq!(config.body_limit(), 64 * 1024);
/// ```
#[derive(Clone, Debug)]
pub struct Config {
    addr: String,
    request_timeout: Option<Duration>,
    max_body_size: usize,
}

/// 1 MiB.
pub const DEFAULT_MAX_BODY_SIZE: usize = 1024 * 1024;

impl Config {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into(), request_timeout: None, max_body_size: DEFAULT_MAX_BODY_SIZE }
    }

    /// Cancel each request's token after `limit`, counted from the moment
    /// the request head arrives. Unset by default.
    pub fn request_timeout(mut self, limit: Duration) -> Self {
        self.request_timeout = Some(limit);
        self
    }

    /// Largest request body accepted, in bytes.
    pub fn max_body_size(mut self, bytes: usize) -> Self {
        self.max_body_size = bytes;
        self
    }

    pub fn addr(&self) -> &str { &self.addr }
    pub fn timeout(&self) -> Option<Duration> { self.request_timeout }
    pub fn body_limit(&self) -> usize { self.max_body_size }
}

/// The per-request part of [`Config`], copied into every connection task.
#[derive(Clone, Copy)]
struct Limits {
    timeout: Option<Duration>,
    max_body: usize,
}

// ── Server ────────────────────────────────────────────────────────────────────

/// The HTTP server.
pub struct Server {
    config: Config,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Shortcut for `Server::new(Config::new(addr))`.
    ///
    /// ```rust,no_run
    /// use kairo::Server;
    /// let server = Server::bind("0.0.0.0:3000");
    /// ```
    pub fn bind(addr: &str) -> Self {
        Self::new(Config::new(addr))
    }

    /// Binds the configured address and serves `router` until SIGTERM or
    /// Ctrl-C, then drains in-flight connections.
    pub async fn serve(self, router: Router) -> Result<(), Error> {
        let addr: SocketAddr = self.config.addr.parse().map_err(|source| Error::InvalidAddr {
            addr: self.config.addr.clone(),
            source,
        })?;
        let listener = TcpListener::bind(addr).await?;
        self.serve_with_shutdown(listener, router, shutdown_signal()).await
    }

    /// Serves on an already-bound listener until `shutdown` resolves.
    ///
    /// The configured address is ignored; the listener's is used.
    pub async fn serve_with_shutdown(
        self,
        listener: TcpListener,
        router: Router,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let service = router.into_service();
        let limits = Limits {
            timeout: self.config.request_timeout,
            max_body: self.config.max_body_size,
        };

        info!(addr = %listener.local_addr()?, "kairo listening");

        // JoinSet tracks every spawned connection task so we can wait for
        // them all to finish during graceful shutdown.
        let mut tasks = tokio::task::JoinSet::new();

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // Check shutdown first so a SIGTERM immediately stops
                // accepting new connections, even if more are queued.
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let service = service.clone();
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // Called once per request on the connection.
                        let svc = service_fn(move |req| {
                            let service = service.clone();
                            async move { dispatch(service, req, remote_addr, limits).await }
                        });

                        // `auto::Builder` serves HTTP/1.1 and HTTP/2, whichever
                        // the client speaks.
                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            debug!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the JoinSet does not grow
                // without bound on long-running servers.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("kairo stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Routes one request and produces one response.
///
/// Infallible: every failure is answered with a status code, hyper never
/// sees an error.
async fn dispatch(
    service: Service,
    req: hyper::Request<Incoming>,
    remote_addr: SocketAddr,
    limits: Limits,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let deadline = limits.timeout.map(|limit| Instant::now() + limit);

    let Ok(method) = Method::try_from(req.method()) else {
        debug!(method = %req.method(), "unsupported method");
        return Ok(Response::status(Status::MethodNotAllowed).into_http());
    };

    let (parts, body) = req.into_parts();
    let body = match read_body(body, limits.max_body, deadline).await {
        Ok(body) => body,
        Err(status) => {
            warn!(peer = %remote_addr, status = status.code(), "request body rejected");
            return Ok(Response::status(status).into_http());
        }
    };

    let cancel = CancellationToken::new();
    // Cancels on every way out of this function, including hyper dropping
    // the future mid-request.
    let _guard = cancel.clone().drop_guard();
    if let Some(deadline) = deadline {
        spawn_deadline(cancel.clone(), deadline);
    }

    let mut request = Request::new(method, parts.uri, parts.headers, body, cancel);
    request.remote_addr = Some(remote_addr);
    request.extensions = parts.extensions;

    Ok(service.call(request).await.into_http())
}

/// Buffers the body. `413` past `max` bytes, `408` if the deadline passes
/// first, `400` if the stream breaks.
async fn read_body(body: Incoming, max: usize, deadline: Option<Instant>) -> Result<Bytes, Status> {
    let collect = Limited::new(body, max).collect();
    let collected = match deadline {
        Some(at) => tokio::time::timeout_at(at, collect)
            .await
            .map_err(|_| Status::RequestTimeout)?,
        None => collect.await,
    };

    match collected {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => Err(Status::PayloadTooLarge),
        Err(e) => {
            debug!("failed to read request body: {e}");
            Err(Status::BadRequest)
        }
    }
}

/// Cancels `cancel` at `deadline` unless it fires on its own first.
fn spawn_deadline(cancel: CancellationToken, deadline: Instant) {
    tokio::spawn(async move {
        tokio::select! {
            () = cancel.cancelled() => {}
            () = tokio::time::sleep_until(deadline) => {
                debug!("request deadline reached");
                cancel.cancel();
            }
        }
    });
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first SIGTERM or SIGINT (Ctrl-C) the process receives.
/// On non-Unix platforms only Ctrl-C is available.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
