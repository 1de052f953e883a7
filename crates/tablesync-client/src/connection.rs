//! WebSocket client connection.
//!
//! The multiplexer exists before the connection does: it starts unready, so
//! requests issued early are queued and flushed once the handshake
//! completed. Server-initiated messages (`tokenCreate` forwards,
//! `assetCreate`, ...) are handled by a [`Dispatcher`] with a caller-chosen
//! context, in arrival order.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use tablesync_core::dispatch::{DispatchProcessor, Dispatcher};
use tablesync_core::error::{Result, TableSyncError};
use tablesync_core::socket::MessageSocket;

pub struct ClientConnection {
    socket: Arc<MessageSocket>,
    outbound: Option<mpsc::UnboundedReceiver<String>>,
    stop: Option<oneshot::Sender<()>>,
    driver: Option<JoinHandle<()>>,
}

impl ClientConnection {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            socket: Arc::new(MessageSocket::unready(tx)),
            outbound: Some(rx),
            stop: None,
            driver: None,
        }
    }

    /// The connection's multiplexer; usable before `connect`.
    pub fn socket(&self) -> &Arc<MessageSocket> {
        &self.socket
    }

    /// Open the WebSocket at `url` and start driving the multiplexer.
    pub async fn connect<C>(&mut self, url: &str, dispatcher: Arc<Dispatcher<C>>, ctx: C) -> Result<()>
    where
        C: Clone + Send + Sync + 'static,
    {
        let mut outbound = self
            .outbound
            .take()
            .ok_or_else(|| TableSyncError::Internal("connection already started".into()))?;

        let (ws, _) = tokio_tungstenite::connect_async(url).await.map_err(|e| {
            self.socket.close();
            TableSyncError::Internal(format!("connect {url} failed: {e}"))
        })?;
        tracing::info!(url, "connected");

        let (mut ws_tx, mut ws_rx) = ws.split();
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let socket = Arc::clone(&self.socket);
        let processor = DispatchProcessor::new(dispatcher, ctx);

        self.driver = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    maybe_out = outbound.recv() => {
                        let Some(frame) = maybe_out else { break; };
                        if ws_tx.send(Message::Text(frame)).await.is_err() {
                            break;
                        }
                    }

                    incoming = ws_rx.next() => {
                        let frame = match incoming {
                            Some(Ok(Message::Text(frame))) => frame,
                            Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                                Ok(frame) => frame,
                                Err(_) => {
                                    tracing::warn!("non utf-8 binary frame, closing");
                                    break;
                                }
                            },
                            Some(Ok(Message::Ping(payload))) => {
                                if ws_tx.send(Message::Pong(payload)).await.is_err() {
                                    break;
                                }
                                continue;
                            }
                            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                            Some(Ok(_)) => continue,
                        };

                        if let Err(e) = socket.receive(&frame, &processor).await {
                            tracing::warn!(error = %e, "bad frame from server");
                            if e.is_connection_fatal() {
                                break;
                            }
                        }
                    }

                    _ = &mut stop_rx => {
                        let _ = ws_tx.send(Message::Close(None)).await;
                        break;
                    }
                }
            }

            socket.close();
            tracing::info!("disconnected");
        }));
        self.stop = Some(stop_tx);

        self.socket.mark_ready()
    }

    /// Close the connection; pending requests fail with `ConnectionClosed`.
    pub async fn close(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(driver) = self.driver.take() {
            let _ = driver.await;
        }
        self.socket.close();
    }
}

impl Default for ClientConnection {
    fn default() -> Self {
        Self::new()
    }
}
