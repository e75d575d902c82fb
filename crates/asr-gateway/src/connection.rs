//! WebSocket connection lifecycle: accept, run the session engine, emit
//! outbound events through a single writer task, and clean up on close.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use asr_core::error::AsrError;
use asr_core::events::parse_inbound;

use crate::session::SessionEngine;
use crate::state::{ConnectionState, GatewayState};

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);
const READ_TIMEOUT: Duration = Duration::from_secs(60);

enum Outbound {
    Event(Value),
    Ping,
}

/// Handle one accepted WebSocket connection end-to-end.
pub async fn handle_ws_connection(state: Arc<GatewayState>, ws: WebSocket, peer_ip: std::net::IpAddr) {
    let mut engine = SessionEngine::new(&state.config, state.backend.clone());
    let session_id = engine.session_id.clone();
    info!(session_id = %session_id, "new realtime connection");
    crate::metrics::record_connect();
    state.total_connections.fetch_add(1, Ordering::Relaxed);
    state.sessions_total.fetch_add(1, Ordering::Relaxed);

    let (mut ws_tx, mut ws_rx) = ws.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Outbound>();

    {
        let mut connections = state.connections.write().await;
        connections.insert(
            session_id.clone(),
            ConnectionState {
                session_id: session_id.clone(),
            },
        );
    }

    let write_task = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            let outcome = match msg {
                Outbound::Event(v) => ws_tx.send(Message::Text(v.to_string().into())).await,
                Outbound::Ping => ws_tx.send(Message::Ping(Vec::new().into())).await,
            };
            if outcome.is_err() {
                break;
            }
        }
    });

    let heartbeat_tx = out_tx.clone();
    let heartbeat_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(KEEPALIVE_INTERVAL);
        interval.tick().await; // first tick fires immediately, skip it
        loop {
            interval.tick().await;
            if heartbeat_tx.send(Outbound::Ping).is_err() {
                break;
            }
        }
    });

    if out_tx
        .send(Outbound::Event(engine.session_created_event()))
        .is_err()
    {
        cleanup(&state, &session_id, peer_ip).await;
        return;
    }

    loop {
        let next = tokio::time::timeout(READ_TIMEOUT, ws_rx.next()).await;
        let msg_result = match next {
            Ok(Some(result)) => result,
            Ok(None) => break,
            Err(_) => {
                let err = AsrError::Transport("keepalive read timeout".into());
                warn!(session_id = %session_id, %err, "keepalive read timeout, closing connection");
                crate::metrics::record_error("keepalive_timeout");
                if err.is_fatal() {
                    break;
                }
                continue;
            }
        };

        match msg_result {
            Ok(Message::Text(text)) => {
                let text = text.to_string();
                let outbound_events = match parse_inbound(&text) {
                    Ok(Ok(event)) => {
                        let is_finish = matches!(event, asr_core::events::InboundEvent::SessionFinish { .. });
                        let samples_before = engine.cumulative_samples();
                        let mut engine_holder = Some(engine);
                        let events = tokio::task::spawn_blocking(move || {
                            let mut e = engine_holder.take().unwrap();
                            let out = e.handle_event(event);
                            (e, out)
                        })
                        .await;
                        match events {
                            Ok((e, out)) => {
                                let samples_after = e.cumulative_samples();
                                engine = e;
                                if samples_after > samples_before {
                                    state.record_audio_seconds(
                                        (samples_after - samples_before) as f64
                                            / asr_media::audio::TARGET_SAMPLE_RATE as f64,
                                    );
                                }
                                if is_finish {
                                    for event in &out {
                                        let _ = out_tx.send(Outbound::Event(event.clone()));
                                    }
                                    break;
                                }
                                out
                            }
                            Err(e) => {
                                error!(session_id = %session_id, %e, "session engine task panicked");
                                break;
                            }
                        }
                    }
                    Ok(Err(unknown)) => {
                        crate::metrics::record_error("invalid_event");
                        state.errors_total.fetch_add(1, Ordering::Relaxed);
                        engine.handle_unknown_event(&unknown.0)
                    }
                    Err(e) => {
                        let err = AsrError::from(e);
                        debug!(session_id = %session_id, %err, "invalid frame");
                        crate::metrics::record_error("parse_error");
                        state.errors_total.fetch_add(1, Ordering::Relaxed);
                        vec![asr_core::events::error_event(
                            "invalid_request_error",
                            "parse_error",
                            &format!("invalid frame: {err}"),
                            None,
                            None,
                        )]
                    }
                };

                for event in outbound_events {
                    if out_tx.send(Outbound::Event(event)).is_err() {
                        break;
                    }
                }
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                debug!(session_id = %session_id, "client closed connection");
                break;
            }
            Err(e) => {
                let err = AsrError::Transport(e.to_string());
                error!(session_id = %session_id, %err, "websocket transport error");
                crate::metrics::record_error("transport_error");
                if err.is_fatal() {
                    break;
                }
            }
            _ => {}
        }
    }

    heartbeat_task.abort();
    drop(out_tx);
    let _ = write_task.await;
    crate::metrics::record_disconnect();
    cleanup(&state, &session_id, peer_ip).await;
    info!(session_id = %session_id, "realtime connection closed");
}

async fn cleanup(state: &Arc<GatewayState>, session_id: &str, peer_ip: std::net::IpAddr) {
    state.connections.write().await.remove(session_id);
    if let Some(limiter) = &state.rate_limiter {
        limiter.release(peer_ip);
    }
}
