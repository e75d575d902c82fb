//! Axum-based gateway server: the realtime WebSocket channel plus the
//! read-only operational HTTP surface.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use tracing::{error, info};

use crate::connection::handle_ws_connection;
use crate::state::GatewayState;

#[derive(Clone)]
struct AppState {
    gateway: Arc<GatewayState>,
    prometheus: Arc<PrometheusHandle>,
}

/// Start the gateway server and block until a shutdown signal arrives.
pub async fn start_gateway(state: Arc<GatewayState>) -> anyhow::Result<()> {
    let prometheus = Arc::new(crate::metrics::install_prometheus_recorder());
    let app_state = AppState {
        gateway: state.clone(),
        prometheus,
    };

    let app = Router::new()
        .route("/", get(identity_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/stats", get(stats_handler))
        .route("/api-ws/v1/realtime", get(ws_handler))
        .with_state(app_state);

    let addr = format!("{}:{}", state.config.server_host, state.config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("ASR gateway listening on {addr}");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let budget = Duration::from_secs_f32(state.config.shutdown_budget_sec);

    let serve_task = tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        })
        .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(budget, serve_task).await {
        Ok(Ok(Ok(()))) => Ok(()),
        Ok(Ok(Err(e))) => Err(e.into()),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => {
            error!(
                "graceful shutdown exceeded {}s budget, forcing exit",
                state.config.shutdown_budget_sec
            );
            std::process::exit(1);
        }
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(app): State<AppState>,
) -> impl IntoResponse {
    if let Some(limiter) = &app.gateway.rate_limiter {
        if !limiter.check(addr.ip()) {
            return axum::http::StatusCode::TOO_MANY_REQUESTS.into_response();
        }
    }

    ws.on_upgrade(move |socket| handle_ws_connection(app.gateway, socket, addr.ip()))
        .into_response()
}

async fn identity_handler() -> impl IntoResponse {
    axum::Json(json!({
        "service": "asr-gateway",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health_handler(State(app): State<AppState>) -> impl IntoResponse {
    axum::Json(json!({
        "status": "ok",
        "model_ready": true,
        "connections": app.gateway.connections.read().await.len(),
    }))
}

async fn metrics_handler(State(app): State<AppState>) -> impl IntoResponse {
    app.prometheus.render()
}

async fn stats_handler(State(app): State<AppState>) -> impl IntoResponse {
    let gateway = &app.gateway;
    axum::Json(json!({
        "config": {
            "model_path": gateway.config.model_path,
            "vad_enabled": gateway.config.vad_enabled,
            "vad_threshold": gateway.config.vad_threshold,
            "auto_commit_interval_sec": gateway.config.auto_commit_interval_sec,
        },
        "metrics": {
            "connections_active": gateway.connections.read().await.len(),
            "connections_total": gateway.total_connections.load(Ordering::Relaxed),
            "sessions_total": gateway.sessions_total.load(Ordering::Relaxed),
            "errors_total": gateway.errors_total.load(Ordering::Relaxed),
            "audio_seconds_total": gateway.audio_seconds(),
        }
    }))
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install CTRL+C handler");
    info!("shutdown signal received");
}
