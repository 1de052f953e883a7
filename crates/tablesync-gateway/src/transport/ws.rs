//! WebSocket handler.
//!
//! Responsibilities:
//! - Upgrade HTTP -> WS (frame size capped by `gateway.max_frame_bytes`)
//! - One participant + one multiplexer per connection
//! - Lifecycle: ping/pong + idle timeout
//! - Inbound frames are processed in arrival order; a malformed frame or
//!   a response that cannot be queued closes the connection

use std::sync::Arc;

use axum::{
    extract::{ws::Message, ws::WebSocket, ws::WebSocketUpgrade, State},
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};
use tracing::Instrument;

use tablesync_core::socket::MessageSocket;

use crate::app_state::AppState;
use crate::transport::codec::{decode, frame_len, Inbound};

// --------------------
// Entry
// --------------------
pub async fn ws_upgrade(State(app): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let max = app.cfg().gateway.max_frame_bytes;
    ws.max_message_size(max)
        .max_frame_size(max)
        .on_upgrade(move |socket| run_connection(app, socket))
}

// --------------------
// Core connection loop
// --------------------
async fn run_connection(app: AppState, socket: WebSocket) {
    let gw = app.cfg().gateway.clone();

    // ---- outbound channel, drained by the writer arm below
    let (out_tx, mut out_rx) = mpsc::channel::<String>(gw.outbound_queue);
    let msg_socket = Arc::new(MessageSocket::new(out_tx));
    let participant = app.open_connection(Arc::clone(&msg_socket));
    let processor = app.processor_for(&participant);

    let span = tracing::info_span!("conn", id = participant.id());
    async move {
        tracing::info!("connection opened");

        let (mut ws_tx, mut ws_rx) = socket.split();

        let ping_every = Duration::from_millis(gw.ping_interval_ms);
        let idle_timeout = Duration::from_millis(gw.idle_timeout_ms);

        let mut ping_tick = tokio::time::interval(ping_every);
        ping_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut last_activity = Instant::now();

        loop {
            tokio::select! {
                // outbound writer
                maybe_out = out_rx.recv() => {
                    match maybe_out {
                        Some(frame) => {
                            if ws_tx.send(Message::Text(frame)).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }

                // inbound reader
                incoming = ws_rx.next() => {
                    let Some(incoming) = incoming else { break; };
                    let Ok(msg) = incoming else { break; };

                    last_activity = Instant::now();

                    if frame_len(&msg) > gw.max_frame_bytes {
                        tracing::warn!(bytes = frame_len(&msg), "frame too large, closing");
                        break;
                    }

                    match decode(msg) {
                        Ok(Inbound::Frame(frame)) => {
                            if let Err(e) = msg_socket.receive(&frame, &processor).await {
                                tracing::warn!(error = %e, "bad frame");
                                if e.is_connection_fatal() {
                                    break;
                                }
                            }
                        }
                        Ok(Inbound::Ping(payload)) => {
                            if ws_tx.send(Message::Pong(payload)).await.is_err() {
                                break;
                            }
                        }
                        Ok(Inbound::Pong(_)) => {}
                        Ok(Inbound::Close) => break,
                        Err(e) => {
                            tracing::warn!(error = %e, "undecodable message, closing");
                            break;
                        }
                    }
                }

                // ping
                _ = ping_tick.tick() => {
                    if ws_tx.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }

                // idle timeout
                _ = tokio::time::sleep(Duration::from_millis(250)) => {
                    if last_activity.elapsed() >= idle_timeout {
                        tracing::info!("idle timeout");
                        break;
                    }
                }
            }
        }

        app.disconnect(&participant).await;
        let _ = ws_tx.close().await;
        tracing::info!("connection closed");
    }
    .instrument(span)
    .await
}
