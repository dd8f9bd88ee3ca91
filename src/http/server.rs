//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router; every method and path goes to one handler
//! - Wire up middleware (request ID, tracing, body limit)
//! - Hand each request to the `Dispatcher` and render the outcome
//! - Serve until the shutdown broadcast fires

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::ProxyConfig;
use crate::http::dispatch::{DispatchError, DispatchOutcome, Dispatcher};
use crate::http::request::into_envelope;
use crate::http::response;
use crate::queue::SharedQueue;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
}

/// HTTP front end of the proxy.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(config: &ProxyConfig, queue: Arc<dyn SharedQueue>) -> Self {
        let state = AppState {
            dispatcher: Dispatcher::new(queue, &config.dispatch),
        };
        Self {
            router: Self::build_router(config, state),
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(dispatch_handler))
            .route("/", any(dispatch_handler))
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(config.listener.max_body_bytes))
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id()),
            )
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server received shutdown signal");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Proxy every inbound request through the shared queue.
async fn dispatch_handler(State(state): State<AppState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read request body");
            return (StatusCode::PAYLOAD_TOO_LARGE, "Request body rejected").into_response();
        }
    };

    let envelope = into_envelope(&parts, &body);
    let uuid = envelope.uuid().to_string();

    match state.dispatcher.dispatch(envelope).await {
        Ok(DispatchOutcome::Completed(stored)) => response::render(&stored),
        Ok(DispatchOutcome::TimedOut) => {
            tracing::warn!(uuid = %uuid, "Answering with gateway timeout");
            response::gateway_timeout()
        }
        Err(DispatchError::Queue(e)) => {
            tracing::error!(uuid = %uuid, error = %e, "Shared queue unavailable");
            response::service_unavailable()
        }
        Err(DispatchError::MalformedResponse(e)) => {
            tracing::error!(uuid = %uuid, error = %e, "Malformed stored response");
            response::bad_gateway()
        }
    }
}
