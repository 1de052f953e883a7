//! Channel multiplexer over one connection.
//!
//! A `MessageSocket` owns the outbound side of exactly one connection and is
//! fed every inbound frame by the connection's reader loop:
//! - `request` allocates the lowest unused channel id, sends, and suspends
//!   until the matching Response arrives or the socket closes.
//! - `send` is fire-and-forget (it only waits for readiness).
//! - Inbound Send envelopes are handed to a [`MessageProcessor`]; its
//!   forward is broadcast before the initiator gets its reply.
//! - Frames written before `mark_ready` are queued and flushed in call order;
//!   each writer learns whether its own frame went out.
//!
//! Handler failures are answered with a Response `error`. `receive` fails on
//! a malformed frame, or when a Response owed to the peer cannot be written:
//! the socket is then closed, since the peer would wait for it forever.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::error::{Result, TableSyncError};
use crate::protocol::envelope::{self, Envelope, ResponseEnvelope, SendEnvelope};
use crate::protocol::HandlerOutcome;

/// Outbound half of a transport: accepts encoded text frames.
pub trait FrameSink: Send + Sync {
    fn send_frame(&self, frame: String) -> Result<()>;
}

impl FrameSink for mpsc::Sender<String> {
    fn send_frame(&self, frame: String) -> Result<()> {
        self.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                TableSyncError::Internal("outbound queue full".into())
            }
            mpsc::error::TrySendError::Closed(_) => TableSyncError::ConnectionClosed,
        })
    }
}

impl FrameSink for mpsc::UnboundedSender<String> {
    fn send_frame(&self, frame: String) -> Result<()> {
        self.send(frame).map_err(|_| TableSyncError::ConnectionClosed)
    }
}

/// Receiving side of a socket: turns inbound messages into outcomes.
#[async_trait]
pub trait MessageProcessor: Send + Sync {
    async fn process(&self, name: &str, payload: Value) -> Result<HandlerOutcome>;

    /// Deliver a forwarded payload to the initiator's peers.
    /// Sides without peers (clients) ignore forwards.
    async fn forward(&self, _name: &str, _payload: Value) {}
}

/// Transport readiness as seen by the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Transport not open yet; outbound frames are queued.
    Pending,
    Ready,
    Closed,
}

struct QueuedFrame {
    frame: String,
    written: oneshot::Sender<Result<()>>,
}

struct Outbox {
    readiness: Readiness,
    queued: Vec<QueuedFrame>,
}

#[derive(Default)]
struct PendingChannels {
    callbacks: HashMap<u32, oneshot::Sender<Result<Value>>>,
    closed: bool,
}

impl PendingChannels {
    fn lowest_unused(&self) -> u32 {
        let mut channel = 0;
        while self.callbacks.contains_key(&channel) {
            channel += 1;
        }
        channel
    }
}

pub struct MessageSocket {
    sink: Box<dyn FrameSink>,
    outbox: Mutex<Outbox>,
    pending: Mutex<PendingChannels>,
}

impl MessageSocket {
    /// Socket over an already open transport.
    pub fn new(sink: impl FrameSink + 'static) -> Self {
        Self::with_readiness(sink, Readiness::Ready)
    }

    /// Socket whose transport is still connecting; call `mark_ready` once open.
    pub fn unready(sink: impl FrameSink + 'static) -> Self {
        Self::with_readiness(sink, Readiness::Pending)
    }

    fn with_readiness(sink: impl FrameSink + 'static, readiness: Readiness) -> Self {
        Self {
            sink: Box::new(sink),
            outbox: Mutex::new(Outbox {
                readiness,
                queued: Vec::new(),
            }),
            pending: Mutex::new(PendingChannels::default()),
        }
    }

    pub fn readiness(&self) -> Readiness {
        lock(&self.outbox)
            .map(|o| o.readiness)
            .unwrap_or(Readiness::Closed)
    }

    /// Number of requests still waiting for a response.
    pub fn pending_requests(&self) -> usize {
        lock(&self.pending).map(|p| p.callbacks.len()).unwrap_or(0)
    }

    /// Flush queued frames in call order and let later sends go straight out.
    /// A frame the sink refuses fails its own `send`/`request`.
    pub fn mark_ready(&self) -> Result<()> {
        let mut outbox = lock(&self.outbox)?;
        if outbox.readiness != Readiness::Pending {
            return Ok(());
        }
        outbox.readiness = Readiness::Ready;

        let queued = std::mem::take(&mut outbox.queued);
        let flushed = queued.len();
        let mut failed = 0;
        for QueuedFrame { frame, written } in queued {
            let res = self.sink.send_frame(frame);
            if let Err(e) = &res {
                failed += 1;
                tracing::warn!(error = %e, "failed to flush queued frame");
            }
            let _ = written.send(res);
        }
        tracing::debug!(flushed, failed, "socket ready");
        Ok(())
    }

    /// Close the socket: queued frames are dropped and every pending request
    /// is rejected with `ConnectionClosed`.
    pub fn close(&self) {
        match lock(&self.outbox) {
            Ok(mut outbox) => {
                outbox.readiness = Readiness::Closed;
                outbox.queued.clear();
            }
            Err(e) => tracing::warn!(error = %e, "outbox unavailable on close"),
        }

        let callbacks = match lock(&self.pending) {
            Ok(mut pending) => {
                pending.closed = true;
                std::mem::take(&mut pending.callbacks)
            }
            Err(e) => {
                tracing::warn!(error = %e, "pending channels unavailable on close");
                HashMap::new()
            }
        };
        let rejected = callbacks.len();
        for (_, callback) in callbacks {
            let _ = callback.send(Err(TableSyncError::ConnectionClosed));
        }
        if rejected > 0 {
            tracing::debug!(rejected, "rejected pending requests on close");
        }
    }

    /// Fire-and-forget message.
    pub async fn send<P: Serialize>(&self, name: &str, payload: P) -> Result<()> {
        let payload = to_value(&payload)?;
        self.send_envelope(&Envelope::send(name, payload)).await
    }

    /// Send a message on a fresh channel and wait for its response.
    pub async fn request<P: Serialize>(&self, name: &str, payload: P) -> Result<Value> {
        let payload = to_value(&payload)?;
        let (tx, rx) = oneshot::channel();

        let channel = {
            let mut pending = lock(&self.pending)?;
            if pending.closed {
                return Err(TableSyncError::ConnectionClosed);
            }
            let channel = pending.lowest_unused();
            pending.callbacks.insert(channel, tx);
            channel
        };
        tracing::trace!(name, channel, "request");

        if let Err(e) = self
            .send_envelope(&Envelope::request(name, payload, channel))
            .await
        {
            if let Ok(mut pending) = lock(&self.pending) {
                pending.callbacks.remove(&channel);
            }
            return Err(e);
        }

        rx.await.unwrap_or(Err(TableSyncError::ConnectionClosed))
    }

    /// `request` with the response deserialized into `R`.
    pub async fn request_as<P: Serialize, R: DeserializeOwned>(
        &self,
        name: &str,
        payload: P,
    ) -> Result<R> {
        let value = self.request(name, payload).await?;
        serde_json::from_value(value).map_err(|e| {
            TableSyncError::BadRequest(format!("{name}: unexpected response shape: {e}"))
        })
    }

    /// Process one inbound frame. Errors are connection-fatal: a malformed
    /// frame, or a Response that could not be written.
    pub async fn receive(&self, frame: &str, processor: &dyn MessageProcessor) -> Result<()> {
        match envelope::decode(frame)? {
            Envelope::Response(response) => {
                self.resolve(response);
                Ok(())
            }
            Envelope::Send(message) => self.handle_message(message, processor).await,
        }
    }

    fn resolve(&self, response: ResponseEnvelope) {
        let channel = response.channel;
        let callback = match lock(&self.pending) {
            Ok(mut pending) => pending.callbacks.remove(&channel),
            Err(e) => {
                tracing::warn!(channel, error = %e, "pending channels unavailable");
                return;
            }
        };

        match callback {
            Some(callback) => {
                if callback.send(response.into_result()).is_err() {
                    tracing::debug!(channel, "requester went away before its response");
                }
            }
            None => tracing::warn!(channel, "no callback registered for response channel"),
        }
    }

    async fn handle_message(
        &self,
        message: SendEnvelope,
        processor: &dyn MessageProcessor,
    ) -> Result<()> {
        let SendEnvelope {
            name,
            payload,
            channel,
        } = message;

        match processor.process(&name, payload).await {
            Ok(outcome) => {
                let (reply, forward) = outcome.into_parts();
                if let Some(forward) = forward {
                    processor.forward(&name, forward).await;
                }
                match channel {
                    Some(channel) => self.reply(ResponseEnvelope::ok(channel, reply)).await,
                    None => Ok(()),
                }
            }
            Err(e) => {
                tracing::debug!(name = %name, code = e.client_code().as_str(), error = %e, "handler failed");
                match channel {
                    Some(channel) => {
                        self.reply(ResponseEnvelope::error(channel, e.to_string()))
                            .await
                    }
                    None => {
                        tracing::warn!(name = %name, error = %e, "fire-and-forget message failed");
                        Ok(())
                    }
                }
            }
        }
    }

    /// Write the Response for `channel`. The peer waits for exactly one, so
    /// failing to write it closes the socket.
    async fn reply(&self, response: ResponseEnvelope) -> Result<()> {
        let channel = response.channel;
        if let Err(e) = self.send_envelope(&Envelope::Response(response)).await {
            tracing::warn!(channel, error = %e, "failed to send response, closing");
            self.close();
            return Err(TableSyncError::ConnectionClosed);
        }
        Ok(())
    }

    async fn send_envelope(&self, envelope: &Envelope) -> Result<()> {
        self.send_encoded(envelope::encode(envelope)?).await
    }

    /// Send an already encoded frame (encode once, send to many sockets).
    pub async fn send_encoded(&self, frame: String) -> Result<()> {
        let written = {
            let mut outbox = lock(&self.outbox)?;
            match outbox.readiness {
                Readiness::Ready => return self.sink.send_frame(frame),
                Readiness::Closed => return Err(TableSyncError::ConnectionClosed),
                Readiness::Pending => {
                    let (tx, rx) = oneshot::channel();
                    outbox.queued.push(QueuedFrame { frame, written: tx });
                    rx
                }
            }
        };

        // dropped unsent by `close`
        written.await.unwrap_or(Err(TableSyncError::ConnectionClosed))
    }
}

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    m.lock()
        .map_err(|_| TableSyncError::Internal("socket state lock poisoned".into()))
}

fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value)
        .map_err(|e| TableSyncError::Internal(format!("json encode failed: {e}")))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]

    use std::sync::Arc;

    use serde_json::json;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        forwards: Mutex<Vec<(String, Value)>>,
    }

    #[async_trait]
    impl MessageProcessor for Recorder {
        async fn process(&self, name: &str, payload: Value) -> Result<HandlerOutcome> {
            match name {
                "echo" => HandlerOutcome::respond(&payload),
                "public" => HandlerOutcome::public(&payload),
                "move" => HandlerOutcome::forward(&payload),
                "fail" => Err(TableSyncError::NotAuthorized("Not in a session".into())),
                other => Err(TableSyncError::UnhandledMessage(other.into())),
            }
        }

        async fn forward(&self, name: &str, payload: Value) {
            self.forwards.lock().unwrap().push((name.to_string(), payload));
        }
    }

    fn socket() -> (Arc<MessageSocket>, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(MessageSocket::new(tx)), rx)
    }

    async fn next_send(rx: &mut mpsc::UnboundedReceiver<String>) -> SendEnvelope {
        match envelope::decode(&rx.recv().await.unwrap()).unwrap() {
            Envelope::Send(s) => s,
            other => panic!("expected send envelope, got {other:?}"),
        }
    }

    async fn next_response(rx: &mut mpsc::UnboundedReceiver<String>) -> ResponseEnvelope {
        match envelope::decode(&rx.recv().await.unwrap()).unwrap() {
            Envelope::Response(r) => r,
            other => panic!("expected response envelope, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn reuses_lowest_free_channel() {
        let (s, mut rx) = socket();

        let mut tasks = Vec::new();
        for i in 0..3 {
            let s2 = Arc::clone(&s);
            tasks.push(tokio::spawn(async move { s2.request("echo", i).await }));
            assert_eq!(next_send(&mut rx).await.channel, Some(i));
        }

        s.receive(r#"{"channel":1,"response":"b"}"#, &Recorder::default())
            .await
            .unwrap();
        assert_eq!(tasks.remove(1).await.unwrap().unwrap(), json!("b"));

        let s2 = Arc::clone(&s);
        let fourth = tokio::spawn(async move { s2.request("echo", 3).await });
        assert_eq!(next_send(&mut rx).await.channel, Some(1));

        s.close();
        assert_eq!(fourth.await.unwrap(), Err(TableSyncError::ConnectionClosed));
        for t in tasks {
            assert_eq!(t.await.unwrap(), Err(TableSyncError::ConnectionClosed));
        }
    }

    #[tokio::test]
    async fn out_of_order_responses_reach_their_own_callers() {
        let (s, mut rx) = socket();

        let a = {
            let s = Arc::clone(&s);
            tokio::spawn(async move { s.request("echo", "a").await })
        };
        let ch_a = next_send(&mut rx).await.channel.unwrap();
        let b = {
            let s = Arc::clone(&s);
            tokio::spawn(async move { s.request("echo", "b").await })
        };
        let ch_b = next_send(&mut rx).await.channel.unwrap();
        assert_ne!(ch_a, ch_b);

        let p = Recorder::default();
        s.receive(&format!(r#"{{"channel":{ch_b},"response":"for b"}}"#), &p)
            .await
            .unwrap();
        s.receive(&format!(r#"{{"channel":{ch_a},"error":"for a"}}"#), &p)
            .await
            .unwrap();

        assert_eq!(b.await.unwrap().unwrap(), json!("for b"));
        assert_eq!(
            a.await.unwrap(),
            Err(TableSyncError::Rejected("for a".into()))
        );
        assert_eq!(s.pending_requests(), 0);
    }

    #[tokio::test]
    async fn queues_until_ready_then_flushes_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let s = Arc::new(MessageSocket::unready(tx));

        let first = {
            let s = Arc::clone(&s);
            tokio::spawn(async move { s.send("tokensMove", json!({"n": 1})).await })
        };
        tokio::task::yield_now().await;
        let second = {
            let s = Arc::clone(&s);
            tokio::spawn(async move { s.send("tokensMove", json!({"n": 2})).await })
        };
        tokio::task::yield_now().await;

        assert!(rx.try_recv().is_err());
        assert!(!first.is_finished());

        s.mark_ready().unwrap();
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        assert_eq!(next_send(&mut rx).await.payload, json!({"n": 1}));
        assert_eq!(next_send(&mut rx).await.payload, json!({"n": 2}));
    }

    #[tokio::test]
    async fn close_before_ready_fails_queued_sends() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let s = Arc::new(MessageSocket::unready(tx));

        let waiting = {
            let s = Arc::clone(&s);
            tokio::spawn(async move { s.request("echo", 1).await })
        };
        tokio::task::yield_now().await;
        s.close();

        assert_eq!(waiting.await.unwrap(), Err(TableSyncError::ConnectionClosed));
        assert_eq!(s.send("echo", 2).await, Err(TableSyncError::ConnectionClosed));
    }

    #[tokio::test]
    async fn refused_queued_frames_fail_their_own_writers() {
        let (tx, mut rx) = mpsc::channel(1);
        let s = Arc::new(MessageSocket::unready(tx));

        let sent = {
            let s = Arc::clone(&s);
            tokio::spawn(async move { s.send("tokensMove", json!({"n": 1})).await })
        };
        tokio::task::yield_now().await;
        let asked = {
            let s = Arc::clone(&s);
            tokio::spawn(async move { s.request("echo", 2).await })
        };
        tokio::task::yield_now().await;

        s.mark_ready().unwrap();
        assert_eq!(sent.await.unwrap(), Ok(()));
        assert_eq!(
            asked.await.unwrap(),
            Err(TableSyncError::Internal("outbound queue full".into()))
        );
        assert_eq!(s.pending_requests(), 0);

        match envelope::decode(&rx.recv().await.unwrap()).unwrap() {
            Envelope::Send(first) => assert_eq!(first.payload, json!({"n": 1})),
            other => panic!("expected send envelope, got {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unwritable_response_closes_the_socket() {
        let (tx, mut rx) = mpsc::channel(1);
        let s = Arc::new(MessageSocket::new(tx));

        // our own request fills the outbound queue
        let waiting = {
            let s = Arc::clone(&s);
            tokio::spawn(async move { s.request("echo", 1).await })
        };
        tokio::task::yield_now().await;
        assert_eq!(s.pending_requests(), 1);

        let err = s
            .receive(r#"{"name":"echo","payload":2,"channel":0}"#, &Recorder::default())
            .await
            .unwrap_err();
        assert_eq!(err, TableSyncError::ConnectionClosed);
        assert!(err.is_connection_fatal());
        assert_eq!(s.readiness(), Readiness::Closed);
        assert_eq!(waiting.await.unwrap(), Err(TableSyncError::ConnectionClosed));

        assert!(rx.recv().await.is_some());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn answers_requests_and_forwards_public_payloads() {
        let (s, mut rx) = socket();
        let p = Recorder::default();

        s.receive(r#"{"name":"public","payload":{"x":1},"channel":4}"#, &p)
            .await
            .unwrap();

        let r = next_response(&mut rx).await;
        assert_eq!(r, ResponseEnvelope::ok(4, Some(json!({"x": 1}))));
        assert_eq!(
            *p.forwards.lock().unwrap(),
            vec![("public".to_string(), json!({"x": 1}))]
        );
    }

    #[tokio::test]
    async fn forward_only_message_without_channel_gets_no_reply() {
        let (s, mut rx) = socket();
        let p = Recorder::default();

        s.receive(r#"{"name":"move","payload":{"t1":{"x":1,"y":1}}}"#, &p)
            .await
            .unwrap();

        assert!(rx.try_recv().is_err());
        assert_eq!(p.forwards.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn handler_errors_become_response_errors_without_forward() {
        let (s, mut rx) = socket();
        let p = Recorder::default();

        s.receive(r#"{"name":"fail","payload":null,"channel":0}"#, &p)
            .await
            .unwrap();
        s.receive(r#"{"name":"missing","payload":null,"channel":1}"#, &p)
            .await
            .unwrap();

        let r = next_response(&mut rx).await;
        assert_eq!(r.channel, 0);
        assert_eq!(r.error.as_deref(), Some("not authorized: Not in a session"));
        let r = next_response(&mut rx).await;
        assert_eq!(r.error.as_deref(), Some("unhandled message: missing"));
        assert!(p.forwards.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn stray_response_is_dropped_and_garbage_is_fatal() {
        let (s, _rx) = socket();
        let p = Recorder::default();

        assert!(s.receive(r#"{"channel":9,"response":1}"#, &p).await.is_ok());

        let err = s.receive("{not json", &p).await.unwrap_err();
        assert_eq!(err.client_code().as_str(), "MALFORMED_ENVELOPE");
        assert!(err.is_connection_fatal());
    }
}
