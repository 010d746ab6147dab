//! Router construction and server host for the bridge's HTTP surface.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::state::ApiState;
use crate::{compat_qb, health, torznab, ws};

/// Axum router wrapper hosting the bridge's HTTP and WebSocket surface.
pub struct ApiServer {
    router: Router,
}

impl ApiServer {
    /// Build the full router over shared state.
    #[must_use]
    pub fn new(state: Arc<ApiState>) -> Self {
        let mut router = Router::new();
        router = compat_qb::mount(router);
        router = torznab::mount(router);
        router = ws::mount(router);
        router = health::mount(router);

        let router = router.with_state(state).layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        );
        Self { router }
    }

    /// Bind and serve until the process is shut down.
    ///
    /// # Errors
    ///
    /// Returns an error when the listener cannot bind or the server
    /// loop fails.
    pub async fn serve(self, addr: SocketAddr) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %addr, "api server listening");
        axum::serve(listener, self.router).await
    }

    /// Serve on an already-bound listener; used by tests that need the
    /// ephemeral port.
    ///
    /// # Errors
    ///
    /// Returns an error when the server loop fails.
    pub async fn serve_on(self, listener: TcpListener) -> std::io::Result<()> {
        axum::serve(listener, self.router).await
    }

    /// The router, for in-process testing.
    #[must_use]
    pub fn into_router(self) -> Router {
        self.router
    }
}
