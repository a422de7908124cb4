//! Socket lifecycle: connect, receive, reconnect with exponential backoff.
//!
//! One `ConnectionManager` owns the single logical socket for one user
//! identity. Decoded frames go straight into the reconciliation store;
//! status transitions are published through the store's connection scope.
//! Transport faults are never fatal: they resolve into `Disconnected` and
//! the standard reconnect policy.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use classline_shared::InboundEvent;
use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::StreamExt;
use tokio::task::JoinHandle;

use super::transport::{FrameSink, FrameStream, Transport};
use crate::store::SyncStore;

/// Connection status as observed through the store's connection scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }
}

/// Reconnect policy. The Nth retry waits `base_delay * 2^(N-1)`; after
/// `max_retries` consecutive failures the connection stays down until an
/// explicit `connect`.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl ReconnectConfig {
    /// Delay before the retry that follows `retry_count` consecutive
    /// failures, computed before the count is incremented.
    pub fn delay_after(&self, retry_count: u32) -> Duration {
        self.base_delay * (1u32 << retry_count.min(31))
    }
}

/// Owns the socket for one identity: the connection task, the outbound
/// frame queue, and the reconnect schedule.
pub struct ConnectionManager {
    url: String,
    transport: Arc<dyn Transport>,
    store: Arc<SyncStore>,
    config: ReconnectConfig,
    outbound: UnboundedSender<String>,
    receiver: Arc<tokio::sync::Mutex<UnboundedReceiver<String>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    pub fn new(
        ws_base: &str,
        identity: i64,
        transport: Arc<dyn Transport>,
        store: Arc<SyncStore>,
        config: ReconnectConfig,
    ) -> Self {
        let url = format!("{}/messaging/ws/{}", ws_base.trim_end_matches('/'), identity);
        let (outbound, receiver) = unbounded();
        Self {
            url,
            transport,
            store,
            config,
            outbound,
            receiver: Arc::new(tokio::sync::Mutex::new(receiver)),
            task: Mutex::new(None),
        }
    }

    /// Start the connection loop. Idempotent: a live task for this identity
    /// is left alone, so at most one socket exists per identity.
    pub fn connect(&self) {
        let mut task = self.task.lock().expect("connection task slot poisoned");
        if let Some(handle) = task.as_ref() {
            if !handle.is_finished() {
                tracing::debug!(url = %self.url, "connect ignored, socket already live");
                return;
            }
        }
        let url = self.url.clone();
        let transport = self.transport.clone();
        let store = self.store.clone();
        let config = self.config.clone();
        let receiver = self.receiver.clone();
        *task = Some(tokio::spawn(async move {
            run_connection_loop(url, transport, store, config, receiver).await;
        }));
    }

    /// Tear the connection down: cancels any pending reconnect timer and
    /// closes the socket unconditionally. Idempotent, safe from teardown
    /// paths.
    pub fn disconnect(&self) {
        let handle = self
            .task
            .lock()
            .expect("connection task slot poisoned")
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
        self.store
            .set_connection_status(ConnectionStatus::Disconnected);
    }

    /// Queue a frame on the push channel. Best-effort: returns false and
    /// drops the frame when the socket is not connected.
    pub fn push(&self, frame: String) -> bool {
        if !self.store.connection_status().is_connected() {
            tracing::debug!("push mirror skipped, socket not connected");
            return false;
        }
        self.outbound.unbounded_send(frame).is_ok()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.disconnect();
    }
}

async fn run_connection_loop(
    url: String,
    transport: Arc<dyn Transport>,
    store: Arc<SyncStore>,
    config: ReconnectConfig,
    receiver: Arc<tokio::sync::Mutex<UnboundedReceiver<String>>>,
) {
    let mut retry_count = 0u32;
    loop {
        store.set_connection_status(ConnectionStatus::Connecting);
        match transport.connect(&url).await {
            Ok((sink, stream)) => {
                store.set_connection_status(ConnectionStatus::Connected);
                retry_count = 0;
                tracing::info!(%url, "socket connected");
                drive_connection(sink, stream, &store, &receiver).await;
                tracing::info!(%url, "socket closed");
                store.set_connection_status(ConnectionStatus::Disconnected);
            }
            Err(e) => {
                tracing::warn!(%url, error = %e, "socket connect failed");
                store.set_connection_status(ConnectionStatus::Disconnected);
            }
        }

        if retry_count >= config.max_retries {
            tracing::warn!(%url, retries = retry_count, "retry ceiling reached, staying disconnected");
            return;
        }
        let delay = config.delay_after(retry_count);
        retry_count += 1;
        tracing::info!(%url, attempt = retry_count, ?delay, "reconnecting after backoff");
        tokio::time::sleep(delay).await;
    }
}

/// Pump one open socket until it closes: inbound frames are decoded and
/// applied to the store, queued outbound frames are written out.
async fn drive_connection(
    mut sink: Box<dyn FrameSink>,
    mut stream: Box<dyn FrameStream>,
    store: &Arc<SyncStore>,
    receiver: &Arc<tokio::sync::Mutex<UnboundedReceiver<String>>>,
) {
    // Only one connection exists at a time, so holding the receiver for the
    // socket's lifetime is fine.
    let mut outbound = receiver.lock().await;
    loop {
        tokio::select! {
            frame = stream.next_frame() => match frame {
                Some(Ok(text)) => store.apply_event(InboundEvent::decode(&text)),
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "socket read error");
                    return;
                }
                None => return,
            },
            queued = outbound.next() => match queued {
                Some(frame) => {
                    if let Err(e) = sink.send(frame).await {
                        tracing::warn!(error = %e, "socket send failed");
                        return;
                    }
                }
                // Manager dropped; the connection task is about to be aborted.
                None => return,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use classline_shared::ConversationId;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;
    use tokio::time::Instant;

    /// Scripted transport: a queue of per-attempt outcomes, plus a log of
    /// connect times. Once the script runs out, every attempt fails.
    struct FakeTransport {
        script: StdMutex<VecDeque<Outcome>>,
        attempts: StdMutex<Vec<Instant>>,
    }

    enum Outcome {
        Fail,
        Succeed {
            frames: UnboundedReceiver<Result<String, String>>,
            sent: Arc<StdMutex<Vec<String>>>,
        },
    }

    impl FakeTransport {
        fn failing() -> Arc<Self> {
            Self::scripted(Vec::new())
        }

        fn scripted(script: Vec<Outcome>) -> Arc<Self> {
            Arc::new(Self {
                script: StdMutex::new(script.into()),
                attempts: StdMutex::new(Vec::new()),
            })
        }

        fn attempt_times(&self) -> Vec<Instant> {
            self.attempts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn connect(
            &self,
            _url: &str,
        ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameStream>), String> {
            self.attempts.lock().unwrap().push(Instant::now());
            match self.script.lock().unwrap().pop_front() {
                Some(Outcome::Succeed { frames, sent }) => Ok((
                    Box::new(FakeSink { sent }),
                    Box::new(FakeStream { frames }),
                )),
                _ => Err("connection refused".to_string()),
            }
        }
    }

    struct FakeSink {
        sent: Arc<StdMutex<Vec<String>>>,
    }

    #[async_trait]
    impl FrameSink for FakeSink {
        async fn send(&mut self, frame: String) -> Result<(), String> {
            self.sent.lock().unwrap().push(frame);
            Ok(())
        }
    }

    struct FakeStream {
        frames: UnboundedReceiver<Result<String, String>>,
    }

    #[async_trait]
    impl FrameStream for FakeStream {
        async fn next_frame(&mut self) -> Option<Result<String, String>> {
            self.frames.next().await
        }
    }

    fn live_outcome() -> (
        Outcome,
        UnboundedSender<Result<String, String>>,
        Arc<StdMutex<Vec<String>>>,
    ) {
        let (tx, rx) = unbounded();
        let sent = Arc::new(StdMutex::new(Vec::new()));
        (
            Outcome::Succeed {
                frames: rx,
                sent: sent.clone(),
            },
            tx,
            sent,
        )
    }

    fn manager(transport: Arc<FakeTransport>) -> (ConnectionManager, Arc<SyncStore>) {
        let store = Arc::new(SyncStore::new());
        let manager = ConnectionManager::new(
            "ws://campus.test",
            7,
            transport,
            store.clone(),
            ReconnectConfig::default(),
        );
        (manager, store)
    }

    async fn settle() {
        // Give the connection task a chance to run between steps.
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn retry_delays_double_per_failure() {
        let config = ReconnectConfig::default();
        let delays: Vec<u64> = (0..5).map(|n| config.delay_after(n).as_secs()).collect();
        assert_eq!(delays, [1, 2, 4, 8, 16]);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_schedule_and_retry_ceiling() {
        let transport = FakeTransport::failing();
        let (manager, _store) = manager(transport.clone());
        manager.connect();

        // Far beyond the full backoff schedule (1+2+4+8+16 = 31s).
        tokio::time::sleep(Duration::from_secs(300)).await;

        let times = transport.attempt_times();
        // Initial attempt plus exactly 5 retries, never a 6th.
        assert_eq!(times.len(), 6);
        let gaps: Vec<u64> = times.windows(2).map(|w| (w[1] - w[0]).as_secs()).collect();
        assert_eq!(gaps, [1, 2, 4, 8, 16]);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_count_resets_after_a_successful_connection() {
        let (outcome, tx, _sent) = live_outcome();
        // Fail twice, connect, then fail again once the server drops us.
        let transport = FakeTransport::scripted(vec![Outcome::Fail, Outcome::Fail, outcome]);
        let (manager, store) = manager(transport.clone());
        manager.connect();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(store.connection_status().is_connected());
        assert_eq!(transport.attempt_times().len(), 3);

        // Server-initiated close.
        drop(tx);
        let closed_at = Instant::now();
        tokio::time::sleep(Duration::from_secs(2)).await;

        // The reconnect after a successful session waits 2^0, not 2^2.
        let times = transport.attempt_times();
        assert_eq!(times.len(), 4);
        assert_eq!((times[3] - closed_at).as_secs(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_is_idempotent_while_live() {
        let (outcome, _tx, _sent) = live_outcome();
        let transport = FakeTransport::scripted(vec![outcome]);
        let (manager, store) = manager(transport.clone());

        manager.connect();
        settle().await;
        manager.connect();
        manager.connect();
        settle().await;

        assert_eq!(transport.attempt_times().len(), 1);
        assert!(store.connection_status().is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_the_pending_reconnect() {
        let transport = FakeTransport::failing();
        let (manager, store) = manager(transport.clone());
        manager.connect();
        settle().await;
        assert_eq!(transport.attempt_times().len(), 1);

        // A 1s reconnect timer is pending now; teardown must cancel it.
        manager.disconnect();
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(transport.attempt_times().len(), 1);
        assert_eq!(store.connection_status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_is_idempotent() {
        let transport = FakeTransport::failing();
        let (manager, _store) = manager(transport);
        manager.disconnect();
        manager.connect();
        settle().await;
        manager.disconnect();
        manager.disconnect();
    }

    #[tokio::test(start_paused = true)]
    async fn inbound_frames_reach_the_store() {
        let (outcome, tx, _sent) = live_outcome();
        let transport = FakeTransport::scripted(vec![outcome]);
        let (manager, store) = manager(transport);
        manager.connect();
        settle().await;

        tx.unbounded_send(Ok(r#"{
            "type": "new_message",
            "message_id": 11,
            "sender_id": 3,
            "sender_name": "Ravi Menon",
            "content": "assembly at 9",
            "sent_at": "2026-03-02T08:00:00Z"
        }"#
        .to_string()))
            .unwrap();
        // Garbage frames must not break the loop.
        tx.unbounded_send(Ok("not json".to_string())).unwrap();
        tx.unbounded_send(Ok(r#"{"type":"unknown_kind"}"#.to_string()))
            .unwrap();
        settle().await;

        let messages = store.conversation_messages(&ConversationId::Direct(3));
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, "11");
        assert!(store.connection_status().is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn queued_frames_are_written_to_the_socket() {
        let (outcome, _tx, sent) = live_outcome();
        let transport = FakeTransport::scripted(vec![outcome]);
        let (manager, _store) = manager(transport);
        manager.connect();
        settle().await;

        assert!(manager.push(r#"{"receiver_id":5,"content":"hi"}"#.to_string()));
        settle().await;

        let frames = sent.lock().unwrap().clone();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].contains("receiver_id"));
    }

    #[tokio::test(start_paused = true)]
    async fn push_is_dropped_while_disconnected() {
        let transport = FakeTransport::failing();
        let (manager, _store) = manager(transport);
        assert!(!manager.push("frame".to_string()));
    }
}
