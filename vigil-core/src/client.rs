use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::alert::SecurityAlert;
use crate::config::FeedConfig;
use crate::error::{FeedError, FeedResult};
use crate::feed::{AlertFeed, FeedMetrics};
use crate::transport::{FrameStream, Transport, WsTransport};

/// Observable connection state of the live feed.
///
/// Connected holds only while the transport is open and has not errored
/// or closed; any close or error moves to Disconnected and schedules
/// exactly one reconnect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Connecting => f.write_str("connecting"),
            ConnectionState::Connected => f.write_str("connected"),
            ConnectionState::Disconnected => f.write_str("disconnected"),
        }
    }
}

/// Messages delivered on the client's single-consumer event channel.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// A valid alert frame arrived and was prepended to the feed.
    Alert(SecurityAlert),
    /// The connection state changed.
    StateChanged(ConnectionState),
}

/// Live alert feed client.
///
/// Owns the transport, the alert feed, and the connection state. A
/// supervisor task opens the configured endpoint, prepends every valid
/// inbound alert to the feed, and retries dropped connections after a
/// flat delay, forever, until `stop()` is called. Malformed frames are
/// dropped with a warning and never tear the connection down.
pub struct FeedClient {
    transport: Arc<dyn Transport>,
    feed: Arc<RwLock<AlertFeed>>,
    state_tx: watch::Sender<ConnectionState>,
    state_rx: watch::Receiver<ConnectionState>,
    events_tx: mpsc::UnboundedSender<FeedEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<FeedEvent>>,
    reconnect_delay: Duration,
    handle: Option<JoinHandle<()>>,
    cancel: Option<CancellationToken>,
}

impl FeedClient {
    /// Client talking to the configured WebSocket endpoint.
    pub fn new(config: &FeedConfig) -> Self {
        Self::with_transport(
            Arc::new(WsTransport::new(config.ws_url.clone())),
            config.reconnect_delay(),
            config.max_feed_len,
        )
    }

    /// Client over an arbitrary transport. The seam the tests use.
    pub fn with_transport(
        transport: Arc<dyn Transport>,
        reconnect_delay: Duration,
        max_feed_len: Option<usize>,
    ) -> Self {
        let feed = match max_feed_len {
            Some(max) => AlertFeed::with_max_len(max),
            None => AlertFeed::new(),
        };
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Self {
            transport,
            feed: Arc::new(RwLock::new(feed)),
            state_tx,
            state_rx,
            events_tx,
            events_rx: Some(events_rx),
            reconnect_delay,
            handle: None,
            cancel: None,
        }
    }

    /// Spawn the supervisor task and begin connecting. Fire-and-forget:
    /// returns immediately, never blocks on the network.
    pub fn start(&mut self) -> FeedResult<()> {
        if self.handle.is_some() {
            return Err(FeedError::AlreadyStarted);
        }

        let cancel = CancellationToken::new();
        let supervisor = Supervisor {
            transport: Arc::clone(&self.transport),
            feed: Arc::clone(&self.feed),
            state_tx: self.state_tx.clone(),
            events_tx: self.events_tx.clone(),
            reconnect_delay: self.reconnect_delay,
            cancel: cancel.clone(),
        };

        self.handle = Some(tokio::spawn(supervisor.run()));
        self.cancel = Some(cancel);
        Ok(())
    }

    /// Close the transport and cancel any pending reconnect, then join the
    /// supervisor task. No reconnect can fire after this returns.
    pub async fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }

        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!("feed supervisor task failed to join: {}", e);
            }
        }
    }

    /// Empty the feed. Connection state is untouched.
    pub async fn clear(&self) {
        self.feed.write().await.clear();
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Receiver that observes every connection-state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Snapshot of the current feed, newest first.
    pub async fn alerts(&self) -> Vec<SecurityAlert> {
        self.feed.read().await.snapshot()
    }

    pub async fn len(&self) -> usize {
        self.feed.read().await.len()
    }

    /// Derived counts for the display layer, relative to now.
    pub async fn metrics(&self) -> FeedMetrics {
        self.feed.read().await.metrics(Utc::now())
    }

    /// Take the event channel. Single-consumer: the first call returns the
    /// receiver, later calls return `None`.
    pub fn events(&mut self) -> Option<mpsc::UnboundedReceiver<FeedEvent>> {
        self.events_rx.take()
    }
}

/// Owns the connect/read/retry loop on its own task. Exclusive writer of
/// the feed and the connection state.
struct Supervisor {
    transport: Arc<dyn Transport>,
    feed: Arc<RwLock<AlertFeed>>,
    state_tx: watch::Sender<ConnectionState>,
    events_tx: mpsc::UnboundedSender<FeedEvent>,
    reconnect_delay: Duration,
    cancel: CancellationToken,
}

impl Supervisor {
    async fn run(self) {
        loop {
            self.set_state(ConnectionState::Connecting);

            let connected = tokio::select! {
                _ = self.cancel.cancelled() => return,
                result = self.transport.connect() => result,
            };

            match connected {
                Ok(frames) => {
                    info!("feed connected");
                    self.set_state(ConnectionState::Connected);
                    self.pump(frames).await;
                    if self.cancel.is_cancelled() {
                        return;
                    }
                }
                Err(e) => warn!("failed to open feed connection: {}", e),
            }

            self.set_state(ConnectionState::Disconnected);

            // Flat retry delay, cancelled by stop().
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = sleep(self.reconnect_delay) => {}
            }
        }
    }

    /// Read frames until the connection closes, errors, or stop() fires.
    async fn pump(&self, mut frames: FrameStream) {
        use futures::StreamExt;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                frame = frames.next() => match frame {
                    Some(Ok(text)) => self.handle_frame(&text).await,
                    Some(Err(e)) => {
                        warn!("feed transport error: {}", e);
                        return;
                    }
                    None => {
                        info!("feed connection closed by server");
                        return;
                    }
                }
            }
        }
    }

    async fn handle_frame(&self, text: &str) {
        match serde_json::from_str::<SecurityAlert>(text) {
            Ok(alert) => {
                debug!(
                    alert_id = %alert.alert_id,
                    severity = %alert.severity,
                    repository = %alert.repository,
                    "received alert"
                );
                self.feed.write().await.push(alert.clone());
                let _ = self.events_tx.send(FeedEvent::Alert(alert));
            }
            Err(e) => warn!("dropping malformed alert frame: {}", e),
        }
    }

    fn set_state(&self, next: ConnectionState) {
        let prev = self.state_tx.send_replace(next);
        if prev != next {
            let _ = self.events_tx.send(FeedEvent::StateChanged(next));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::Severity;
    use async_trait::async_trait;
    use futures::stream;
    use futures::StreamExt;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// One scripted connection: the frames it will deliver, and whether it
    /// stays open afterwards or hangs up.
    struct Script {
        frames: Vec<FeedResult<String>>,
        hold_open: bool,
    }

    struct ScriptedTransport {
        scripts: Mutex<VecDeque<Script>>,
        attempts: AtomicUsize,
    }

    impl ScriptedTransport {
        fn new(scripts: Vec<Script>) -> Arc<Self> {
            Arc::new(Self {
                scripts: Mutex::new(scripts.into()),
                attempts: AtomicUsize::new(0),
            })
        }

        fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn connect(&self) -> FeedResult<FrameStream> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let script = self.scripts.lock().unwrap().pop_front();
            match script {
                Some(script) => {
                    let frames = stream::iter(script.frames);
                    if script.hold_open {
                        Ok(frames.chain(stream::pending()).boxed())
                    } else {
                        Ok(frames.boxed())
                    }
                }
                None => Err(FeedError::Transport("script exhausted".to_string())),
            }
        }
    }

    fn alert_json(id: &str, severity: &str) -> String {
        format!(
            r#"{{"alert_id":"{id}","repository":"acme/webapp","severity":"{severity}","timestamp":"2024-03-01T12:00:00Z"}}"#
        )
    }

    fn client_over(
        transport: Arc<ScriptedTransport>,
        delay_ms: u64,
    ) -> FeedClient {
        FeedClient::with_transport(transport, Duration::from_millis(delay_ms), None)
    }

    async fn next_alert(rx: &mut mpsc::UnboundedReceiver<FeedEvent>) -> SecurityAlert {
        loop {
            match rx.recv().await.expect("event channel closed") {
                FeedEvent::Alert(alert) => return alert,
                FeedEvent::StateChanged(_) => continue,
            }
        }
    }

    #[tokio::test]
    async fn feed_accumulates_newest_first() {
        let transport = ScriptedTransport::new(vec![Script {
            frames: vec![
                Ok(alert_json("1", "critical")),
                Ok(alert_json("2", "low")),
                Ok(alert_json("3", "high")),
                Ok(alert_json("4", "unknown")),
            ],
            hold_open: true,
        }]);
        let mut client = client_over(Arc::clone(&transport), 10);
        let mut events = client.events().unwrap();
        client.start().unwrap();

        for _ in 0..4 {
            next_alert(&mut events).await;
        }

        let alerts = client.alerts().await;
        assert_eq!(alerts.len(), 4);
        let severities: Vec<Severity> = alerts.iter().map(|a| a.severity).collect();
        assert_eq!(
            severities,
            vec![
                Severity::Unknown,
                Severity::High,
                Severity::Low,
                Severity::Critical,
            ]
        );
        assert_eq!(client.state(), ConnectionState::Connected);

        client.stop().await;
    }

    #[tokio::test]
    async fn malformed_frames_are_dropped() {
        let transport = ScriptedTransport::new(vec![Script {
            frames: vec![
                Ok(alert_json("1", "high")),
                Ok("definitely not json".to_string()),
                Ok(r#"{"unexpected":"shape"}"#.to_string()),
                Ok(alert_json("2", "low")),
            ],
            hold_open: true,
        }]);
        let mut client = client_over(Arc::clone(&transport), 10);
        let mut events = client.events().unwrap();
        client.start().unwrap();

        assert_eq!(next_alert(&mut events).await.alert_id, "1");
        assert_eq!(next_alert(&mut events).await.alert_id, "2");

        assert_eq!(client.len().await, 2);
        // Malformed frames must not drop the connection.
        assert_eq!(client.state(), ConnectionState::Connected);
        assert_eq!(transport.attempts(), 1);

        client.stop().await;
    }

    #[tokio::test]
    async fn reconnects_after_server_hangup_without_duplicating() {
        let transport = ScriptedTransport::new(vec![
            Script {
                frames: vec![Ok(alert_json("1", "critical"))],
                hold_open: false,
            },
            Script {
                frames: vec![Ok(alert_json("2", "low"))],
                hold_open: true,
            },
        ]);
        let mut client = client_over(Arc::clone(&transport), 10);
        let mut events = client.events().unwrap();
        client.start().unwrap();

        // Full observable lifecycle across the drop and recovery.
        let mut states = Vec::new();
        let mut alert_ids = Vec::new();
        while alert_ids.len() < 2 {
            match events.recv().await.expect("event channel closed") {
                FeedEvent::StateChanged(s) => states.push(s),
                FeedEvent::Alert(a) => alert_ids.push(a.alert_id),
            }
        }

        assert_eq!(alert_ids, vec!["1", "2"]);
        assert_eq!(
            states,
            vec![
                ConnectionState::Connecting,
                ConnectionState::Connected,
                ConnectionState::Disconnected,
                ConnectionState::Connecting,
                ConnectionState::Connected,
            ]
        );
        assert_eq!(transport.attempts(), 2);
        // No duplicates carried over from the first connection.
        assert_eq!(client.len().await, 2);

        client.stop().await;
    }

    #[tokio::test]
    async fn schedules_exactly_one_reconnect_per_drop() {
        let transport = ScriptedTransport::new(vec![
            Script {
                frames: vec![],
                hold_open: false,
            },
            Script {
                frames: vec![],
                hold_open: true,
            },
        ]);
        let mut client = client_over(Arc::clone(&transport), 10);
        client.start().unwrap();

        let mut state_rx = client.watch_state();
        state_rx
            .wait_for(|s| *s == ConnectionState::Connected)
            .await
            .unwrap();
        // First connection already hung up by now or is about to; wait for
        // the second connection to settle, then give the retry timer several
        // more periods to prove no extra attempts fire while connected.
        state_rx
            .wait_for(|s| *s == ConnectionState::Connected)
            .await
            .unwrap();
        sleep(Duration::from_millis(100)).await;

        assert_eq!(transport.attempts(), 2);
        assert_eq!(client.state(), ConnectionState::Connected);

        client.stop().await;
    }

    #[tokio::test]
    async fn stop_suppresses_pending_reconnect() {
        let transport = ScriptedTransport::new(vec![Script {
            frames: vec![],
            hold_open: false,
        }]);
        // Long delay so the retry is guaranteed still pending when we stop.
        let mut client = client_over(Arc::clone(&transport), 200);
        client.start().unwrap();

        let mut state_rx = client.watch_state();
        state_rx
            .wait_for(|s| *s == ConnectionState::Disconnected)
            .await
            .unwrap();

        client.stop().await;

        // Let the previously scheduled retry delay elapse; nothing may
        // re-open a connection after stop().
        sleep(Duration::from_millis(500)).await;
        assert_eq!(transport.attempts(), 1);
    }

    #[tokio::test]
    async fn clear_empties_feed_and_leaves_state() {
        let transport = ScriptedTransport::new(vec![Script {
            frames: vec![Ok(alert_json("1", "medium"))],
            hold_open: true,
        }]);
        let mut client = client_over(Arc::clone(&transport), 10);
        let mut events = client.events().unwrap();
        client.start().unwrap();

        next_alert(&mut events).await;
        assert_eq!(client.len().await, 1);

        client.clear().await;
        assert_eq!(client.len().await, 0);
        assert_eq!(client.state(), ConnectionState::Connected);

        client.stop().await;
    }

    #[tokio::test]
    async fn start_twice_is_an_error() {
        let transport = ScriptedTransport::new(vec![Script {
            frames: vec![],
            hold_open: true,
        }]);
        let mut client = client_over(transport, 10);

        client.start().unwrap();
        assert!(matches!(client.start(), Err(FeedError::AlreadyStarted)));

        client.stop().await;
    }

    #[tokio::test]
    async fn bounded_client_evicts_oldest() {
        let transport = ScriptedTransport::new(vec![Script {
            frames: vec![
                Ok(alert_json("1", "low")),
                Ok(alert_json("2", "low")),
                Ok(alert_json("3", "low")),
            ],
            hold_open: true,
        }]);
        let mut client =
            FeedClient::with_transport(Arc::clone(&transport) as Arc<dyn Transport>, Duration::from_millis(10), Some(2));
        let mut events = client.events().unwrap();
        client.start().unwrap();

        for _ in 0..3 {
            next_alert(&mut events).await;
        }

        let ids: Vec<String> = client.alerts().await.into_iter().map(|a| a.alert_id).collect();
        assert_eq!(ids, vec!["3", "2"]);

        client.stop().await;
    }

    #[tokio::test]
    async fn events_channel_is_single_consumer() {
        let transport = ScriptedTransport::new(vec![]);
        let mut client = client_over(transport, 10);

        assert!(client.events().is_some());
        assert!(client.events().is_none());
    }
}
