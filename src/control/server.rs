use crate::{
    config::ControlConfig,
    error::{DvmError, Result},
    workload::WorkerPool,
};
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use super::handlers::{health_handler, stats_handler, submit_job_handler};

/// Shared state for the Axum server
#[derive(Clone)]
pub struct ControlState {
    pub(crate) pool: Arc<WorkerPool>,
}

/// HTTP control plane exposing health, job submission and stats
pub struct ControlServer {
    pub(crate) config: ControlConfig,
    pub(crate) pool: Arc<WorkerPool>,
}

impl ControlServer {
    pub fn new(config: ControlConfig, pool: Arc<WorkerPool>) -> Self {
        Self { config, pool }
    }

    pub fn router(&self) -> Router {
        let state = ControlState {
            pool: Arc::clone(&self.pool),
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/jobs", post(submit_job_handler))
            .route("/stats", get(stats_handler))
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
            .with_state(state)
    }

    /// Bind the listener; serving starts with [`BoundControl::serve`]
    pub async fn bind(&self) -> Result<BoundControl> {
        let addr = self.config.address();

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| DvmError::Bind {
                address: addr.clone(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;

        info!("Control plane listening on {}", local_addr);

        Ok(BoundControl {
            listener,
            local_addr,
            app: self.router(),
        })
    }
}

/// A bound but not yet serving control plane
pub struct BoundControl {
    listener: TcpListener,
    local_addr: SocketAddr,
    app: Router,
}

impl BoundControl {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve until the process exits.
    ///
    /// The server stays up while draining so probes can observe the state;
    /// it is not tracked as in-flight work.
    pub fn serve(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = axum::serve(self.listener, self.app).await {
                error!("Control plane error: {}", e);
            }
        })
    }
}
