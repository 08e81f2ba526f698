//! The HTTP/1.1 server shell.
//!
//! One task per connection, each serving requests through the shared
//! [`Pipeline`]. On shutdown the accept loop stops, readiness turns false,
//! open connections are asked to finish their current request, and the server
//! waits up to the configured grace period for them to close.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use portico_core::body;
use portico_middleware::{Pipeline, TokenBucketLimiter};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use crate::error::ServerError;
use crate::health::ReadinessCheck;
use crate::shutdown::{ConnectionTracker, ShutdownSignal};

/// Default grace period for open connections.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Shortest interval between limiter sweeps.
const MIN_SWEEP_PERIOD: Duration = Duration::from_secs(1);

/// Serves a [`Pipeline`] over TCP.
///
/// ```no_run
/// use portico_middleware::Pipeline;
/// use portico_server::Server;
///
/// # async fn run(pipeline: Pipeline) -> Result<(), portico_server::ServerError> {
/// Server::builder(pipeline)
///     .addr("0.0.0.0:8080".parse().unwrap())
///     .build()
///     .run()
///     .await
/// # }
/// ```
pub struct Server {
    pipeline: Arc<Pipeline>,
    addr: SocketAddr,
    shutdown_timeout: Duration,
    readiness: ReadinessCheck,
    limiters: Vec<Arc<TokenBucketLimiter>>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("addr", &self.addr)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .field("stages", &self.pipeline.stage_names())
            .field("routes", &self.pipeline.route_count())
            .finish_non_exhaustive()
    }
}

impl Server {
    /// Starts building a server around `pipeline`.
    #[must_use]
    pub fn builder(pipeline: Pipeline) -> ServerBuilder {
        ServerBuilder::new(pipeline)
    }

    /// The configured bind address.
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The readiness probe flipped off on shutdown.
    #[must_use]
    pub fn readiness(&self) -> &ReadinessCheck {
        &self.readiness
    }

    /// Binds and serves until SIGTERM or ctrl-c.
    pub async fn run(self) -> Result<(), ServerError> {
        let shutdown = ShutdownSignal::with_os_signals();
        self.run_with_shutdown(shutdown).await
    }

    /// Binds and serves until `shutdown` fires.
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: self.addr,
                source,
            })?;
        self.serve(listener, shutdown).await
    }

    /// Serves on an already bound listener until `shutdown` fires.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: ShutdownSignal,
    ) -> Result<(), ServerError> {
        let local = listener.local_addr()?;
        tracing::info!(addr = %local, routes = self.pipeline.route_count(), "listening");

        let sweepers: Vec<JoinHandle<()>> = self
            .limiters
            .iter()
            .map(|limiter| limiter.spawn_sweeper(limiter.idle_after().max(MIN_SWEEP_PERIOD)))
            .collect();

        let tracker = ConnectionTracker::new();
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote)) => {
                        let guard = tracker.acquire();
                        let pipeline = Arc::clone(&self.pipeline);
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            serve_connection(pipeline, stream, remote, shutdown).await;
                            drop(guard);
                        });
                    }
                    Err(e) => tracing::error!(error = %e, "failed to accept connection"),
                },
                () = shutdown.recv() => {
                    self.readiness.set_ready(false);
                    tracing::info!("shutdown requested, no longer accepting connections");
                    break;
                }
            }
        }
        drop(listener);

        tracing::info!(
            active = tracker.active_connections(),
            grace = ?self.shutdown_timeout,
            "waiting for connections to close"
        );
        if tokio::time::timeout(self.shutdown_timeout, tracker.drained())
            .await
            .is_err()
        {
            tracing::warn!(
                active = tracker.active_connections(),
                "grace period elapsed with connections still open"
            );
        }

        for sweeper in sweepers {
            sweeper.abort();
        }
        tracing::info!("server stopped");
        Ok(())
    }
}

async fn serve_connection(
    pipeline: Arc<Pipeline>,
    stream: TcpStream,
    remote: SocketAddr,
    shutdown: ShutdownSignal,
) {
    let service = service_fn(move |request: http::Request<Incoming>| {
        let pipeline = Arc::clone(&pipeline);
        async move {
            let request = request.map(body::boxed);
            Ok::<_, Infallible>(pipeline.handle(request, Some(remote)).await)
        }
    });

    let conn = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
    tokio::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        () = shutdown.recv() => {
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };
    if let Err(e) = result {
        tracing::debug!(remote = %remote, error = %e, "connection closed with error");
    }
}

/// Builder for a [`Server`].
pub struct ServerBuilder {
    pipeline: Pipeline,
    addr: SocketAddr,
    shutdown_timeout: Duration,
    readiness: ReadinessCheck,
    limiters: Vec<Arc<TokenBucketLimiter>>,
}

impl ServerBuilder {
    fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            readiness: ReadinessCheck::new(),
            limiters: Vec::new(),
        }
    }

    /// Sets the bind address.
    #[must_use]
    pub fn addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    /// Sets the grace period for open connections.
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Shares a readiness probe, typically also served by a handler.
    #[must_use]
    pub fn readiness(mut self, readiness: ReadinessCheck) -> Self {
        self.readiness = readiness;
        self
    }

    /// Sweeps idle buckets from `limiter` while the server runs.
    #[must_use]
    pub fn sweep_limiter(mut self, limiter: Arc<TokenBucketLimiter>) -> Self {
        self.limiters.push(limiter);
        self
    }

    /// Finishes the server.
    #[must_use]
    pub fn build(self) -> Server {
        Server {
            pipeline: Arc::new(self.pipeline),
            addr: self.addr,
            shutdown_timeout: self.shutdown_timeout,
            readiness: self.readiness,
            limiters: self.limiters,
        }
    }
}
