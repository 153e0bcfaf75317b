//! HTTP exposition of pipeline metrics.
//!
//! Every scrape pulls a fresh snapshot from a [`StatsSource`] and folds it
//! into the Prometheus registry before encoding, so the acquisition side
//! never has to push anything to the server.

use crate::metrics::{MetricsError, MetricsRegistry};
use crate::pipeline::{FusionPipeline, PipelineState, PipelineStats};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::CorsLayer;

/// Anything that can report pipeline activity on demand.
pub trait StatsSource: Send + Sync {
    fn stats(&self) -> PipelineStats;
    fn state(&self) -> PipelineState;
}

impl StatsSource for FusionPipeline {
    fn stats(&self) -> PipelineStats {
        FusionPipeline::stats(self)
    }

    fn state(&self) -> PipelineState {
        FusionPipeline::state(self)
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to create metrics registry: {0}")]
    Registry(#[from] MetricsError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("metrics server failed: {0}")]
    Serve(std::io::Error),
}

struct Exporter {
    registry: MetricsRegistry,
    source: Arc<dyn StatsSource>,
}

impl Exporter {
    fn scrape(&self) -> Result<String, MetricsError> {
        self.registry.update(&self.source.stats());
        self.registry.encode()
    }

    // Healthy only while the acquisition thread is really running.
    fn health(&self) -> (StatusCode, String) {
        let state = self.source.state();
        let status = if state == PipelineState::Running {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        };
        (status, state.to_string())
    }
}

/// Serves `/metrics` and `/health` for one pipeline.
pub struct MetricsServer {
    addr: SocketAddr,
    exporter: Arc<Exporter>,
}

impl MetricsServer {
    /// Prepares a server on all interfaces at `port`.
    pub fn new(port: u16, source: Arc<dyn StatsSource>) -> Result<Self, ServerError> {
        Ok(Self {
            addr: ([0, 0, 0, 0], port).into(),
            exporter: Arc::new(Exporter {
                registry: MetricsRegistry::new()?,
                source,
            }),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Binds and serves until the runtime shuts down.
    pub async fn serve(self) -> Result<(), ServerError> {
        let app = Router::new()
            .route("/metrics", get(scrape))
            .route("/health", get(health))
            .layer(CorsLayer::permissive())
            .with_state(self.exporter);

        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: self.addr,
                source,
            })?;
        tracing::info!(addr = %self.addr, "Serving pipeline metrics");

        axum::serve(listener, app).await.map_err(ServerError::Serve)
    }
}

async fn scrape(State(exporter): State<Arc<Exporter>>) -> Response {
    match exporter.scrape() {
        Ok(body) => ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response(),
        Err(error) => {
            tracing::warn!(%error, "Metrics scrape failed");
            (StatusCode::INTERNAL_SERVER_ERROR, error.to_string()).into_response()
        }
    }
}

async fn health(State(exporter): State<Arc<Exporter>>) -> (StatusCode, String) {
    exporter.health()
}
