//! Per-exchange connection supervision.
//!
//! One supervisor owns one logical feed connection for the lifetime of the
//! process: it connects, subscribes, decodes inbound frames into quotes,
//! keeps the link alive with heartbeats, and reconnects with backoff when
//! the transport fails. Failures on one feed never reach another feed.

use crate::codec::{FeedMessage, QuoteCodec};
use crate::metrics::FeedMetrics;
use crate::transport::{FeedConnection, FeedTransport, TransportMessage};
use chrono::Utc;
use common::{CommonError, ConnectionState, ExchangeId, Quote, StatusEvent};
use resilience::{Retrier, RetryPolicy};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Per-feed connection settings.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub exchange: ExchangeId,
    pub url: String,
    /// Interval between outbound heartbeats.
    pub heartbeat_interval: Duration,
    /// Heartbeat windows without any inbound traffic before the feed is
    /// reported DEGRADED.
    pub missed_beat_tolerance: u32,
    /// Reconnect attempt budget per disconnect. Exhaustion closes the feed.
    pub max_reconnect_attempts: u32,
    /// Backoff schedule between reconnect attempts.
    pub retry: RetryPolicy,
}

impl SupervisorConfig {
    fn liveness_window(&self) -> Duration {
        self.heartbeat_interval * self.missed_beat_tolerance.max(1)
    }
}

enum ConnectOutcome {
    Connected(Box<dyn FeedConnection>),
    ShutdownRequested,
    Exhausted,
}

enum SessionEnd {
    Shutdown,
    Disconnected,
}

/// Owns one exchange connection's lifecycle state machine.
pub struct ConnectionSupervisor {
    config: SupervisorConfig,
    transport: Arc<dyn FeedTransport>,
    codec: Arc<dyn QuoteCodec>,
    quote_tx: mpsc::Sender<Quote>,
    status_tx: mpsc::Sender<StatusEvent>,
    shutdown_rx: watch::Receiver<bool>,
    metrics: Arc<FeedMetrics>,
    state: ConnectionState,
}

impl ConnectionSupervisor {
    pub fn new(
        config: SupervisorConfig,
        transport: Arc<dyn FeedTransport>,
        codec: Arc<dyn QuoteCodec>,
        quote_tx: mpsc::Sender<Quote>,
        status_tx: mpsc::Sender<StatusEvent>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            transport,
            codec,
            quote_tx,
            status_tx,
            shutdown_rx,
            metrics: Arc::new(FeedMetrics::default()),
            state: ConnectionState::Connecting,
        }
    }

    /// Health counters for this feed, readable from any task.
    pub fn metrics(&self) -> Arc<FeedMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Spawns the supervisor onto the runtime.
    pub fn spawn(self) -> JoinHandle<Result<(), CommonError>> {
        tokio::spawn(self.run())
    }

    /// Runs until explicit shutdown or reconnect exhaustion.
    pub async fn run(mut self) -> Result<(), CommonError> {
        self.publish_state().await;
        loop {
            let conn = match self.connect_with_backoff().await {
                ConnectOutcome::Connected(conn) => conn,
                ConnectOutcome::ShutdownRequested => {
                    self.transition(ConnectionState::Closed).await;
                    return Ok(());
                }
                ConnectOutcome::Exhausted => {
                    warn!(
                        exchange = %self.config.exchange,
                        attempts = self.config.max_reconnect_attempts,
                        "reconnect budget exhausted; feed closed"
                    );
                    self.transition(ConnectionState::Closed).await;
                    self.publish(StatusEvent::FeedUnavailable {
                        exchange: self.config.exchange.clone(),
                        attempts: self.config.max_reconnect_attempts,
                        at: Utc::now(),
                    })
                    .await;
                    return Err(CommonError::FeedUnavailable(
                        self.config.exchange.to_string(),
                    ));
                }
            };

            match self.stream_session(conn).await? {
                SessionEnd::Shutdown => {
                    self.transition(ConnectionState::Closed).await;
                    return Ok(());
                }
                SessionEnd::Disconnected => {
                    self.metrics.record_reconnection();
                    self.transition(ConnectionState::Reconnecting).await;
                }
            }
        }
    }

    /// One reconnect cycle, delegated to the shared retry executor. The
    /// attempt budget restarts every cycle, so a connection that reaches
    /// OPEN resets the backoff schedule. The whole cycle is raced against
    /// the shutdown signal, cancelling any in-flight backoff wait.
    async fn connect_with_backoff(&mut self) -> ConnectOutcome {
        let transport = Arc::clone(&self.transport);
        let codec = Arc::clone(&self.codec);
        let url = self.config.url.clone();
        let quote_tx = self.quote_tx.clone();
        let ack_timeout = self.config.heartbeat_interval;
        let exchange = self.config.exchange.clone();

        let mut policy = self.config.retry.clone();
        policy.max_attempts = self.config.max_reconnect_attempts.max(1);
        let retrier = Retrier::<CommonError>::new(policy).with_on_retry({
            let exchange = exchange.clone();
            move |err: &CommonError, attempt: u32, delay| {
                warn!(
                    %exchange,
                    attempt,
                    ?delay,
                    error = %err,
                    "connect attempt failed; backing off"
                );
            }
        });

        let connect = retrier.execute(move || {
            establish(
                Arc::clone(&transport),
                Arc::clone(&codec),
                url.clone(),
                quote_tx.clone(),
                ack_timeout,
                exchange.clone(),
            )
        });
        tokio::pin!(connect);

        tokio::select! {
            result = &mut connect => match result {
                Ok(conn) => {
                    self.transition(ConnectionState::Open).await;
                    ConnectOutcome::Connected(conn)
                }
                Err(err) => {
                    warn!(exchange = %self.config.exchange, error = %err, "connect cycle failed");
                    ConnectOutcome::Exhausted
                }
            },
            _ = self.shutdown_rx.changed() => ConnectOutcome::ShutdownRequested,
        }
    }

    /// Pumps one connected session until shutdown or disconnect.
    async fn stream_session(
        &mut self,
        mut conn: Box<dyn FeedConnection>,
    ) -> Result<SessionEnd, CommonError> {
        let mut heartbeat = interval(self.config.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_activity = Instant::now();

        loop {
            tokio::select! {
                _ = self.shutdown_rx.changed() => {
                    if let Err(err) = conn.close().await {
                        debug!(exchange = %self.config.exchange, error = %err, "close failed during shutdown");
                    }
                    return Ok(SessionEnd::Shutdown);
                }
                _ = heartbeat.tick() => {
                    if self.state == ConnectionState::Open
                        && last_activity.elapsed() > self.config.liveness_window()
                    {
                        warn!(
                            exchange = %self.config.exchange,
                            silent_for = ?last_activity.elapsed(),
                            "no liveness signal within tolerance"
                        );
                        self.transition(ConnectionState::Degraded).await;
                    }
                    let sent = match self.codec.heartbeat_message() {
                        Some(text) => conn.send_text(text).await,
                        None => conn.send_ping().await,
                    };
                    if let Err(err) = sent {
                        warn!(exchange = %self.config.exchange, error = %err, "heartbeat send failed");
                        return Ok(SessionEnd::Disconnected);
                    }
                }
                message = conn.next_message() => match message {
                    None => {
                        warn!(exchange = %self.config.exchange, "stream ended");
                        return Ok(SessionEnd::Disconnected);
                    }
                    Some(Err(err)) => {
                        warn!(exchange = %self.config.exchange, error = %err, "transport error");
                        return Ok(SessionEnd::Disconnected);
                    }
                    Some(Ok(TransportMessage::Text(text))) => {
                        self.metrics.record_message();
                        self.note_activity(&mut last_activity).await;
                        match self.codec.decode(&text) {
                            Ok(FeedMessage::Quote(quote)) => self.forward_quote(quote).await?,
                            Ok(FeedMessage::Heartbeat)
                            | Ok(FeedMessage::SubscribeAck)
                            | Ok(FeedMessage::Ignored) => {}
                            Err(err) => {
                                self.metrics.record_decode_failure();
                                warn!(exchange = %self.config.exchange, error = %err, "dropping undecodable message");
                            }
                        }
                    }
                    Some(Ok(TransportMessage::Ping(payload))) => {
                        self.note_activity(&mut last_activity).await;
                        if conn.send_pong(payload).await.is_err() {
                            return Ok(SessionEnd::Disconnected);
                        }
                    }
                    Some(Ok(TransportMessage::Pong)) => {
                        self.note_activity(&mut last_activity).await;
                    }
                    Some(Ok(TransportMessage::Closed)) => {
                        info!(exchange = %self.config.exchange, "server closed connection");
                        return Ok(SessionEnd::Disconnected);
                    }
                }
            }
        }
    }

    async fn forward_quote(&mut self, quote: Quote) -> Result<(), CommonError> {
        self.metrics.record_quote();
        self.quote_tx
            .send(quote)
            .await
            .map_err(|_| CommonError::ChannelClosed("quote receiver dropped".to_string()))
    }

    async fn note_activity(&mut self, last_activity: &mut Instant) {
        *last_activity = Instant::now();
        if self.state == ConnectionState::Degraded {
            self.transition(ConnectionState::Open).await;
        }
    }

    async fn transition(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }
        info!(
            exchange = %self.config.exchange,
            from = %self.state,
            to = %next,
            "connection state changed"
        );
        self.state = next;
        self.publish_state().await;
    }

    async fn publish_state(&self) {
        self.publish(StatusEvent::StateChanged {
            exchange: self.config.exchange.clone(),
            state: self.state,
            at: Utc::now(),
        })
        .await;
    }

    async fn publish(&self, event: StatusEvent) {
        if self.status_tx.send(event).await.is_err() {
            debug!(exchange = %self.config.exchange, "status receiver dropped");
        }
    }
}

/// One connection attempt: handshake plus subscription. The connection is
/// usable once the feed's ack arrives, or immediately for ack-less feeds.
async fn establish(
    transport: Arc<dyn FeedTransport>,
    codec: Arc<dyn QuoteCodec>,
    url: String,
    quote_tx: mpsc::Sender<Quote>,
    ack_timeout: Duration,
    exchange: ExchangeId,
) -> Result<Box<dyn FeedConnection>, CommonError> {
    let mut conn = transport.connect(&url).await?;
    if let Some(subscribe) = codec.subscribe_message() {
        conn.send_text(subscribe).await?;
        if codec.expects_subscribe_ack() {
            timeout(
                ack_timeout,
                wait_for_ack(&mut conn, codec.as_ref(), &quote_tx, &exchange),
            )
            .await
            .map_err(|_| {
                CommonError::Subscribe(format!("no subscription ack from {}", exchange))
            })??;
        }
    }
    Ok(conn)
}

async fn wait_for_ack(
    conn: &mut Box<dyn FeedConnection>,
    codec: &dyn QuoteCodec,
    quote_tx: &mpsc::Sender<Quote>,
    exchange: &ExchangeId,
) -> Result<(), CommonError> {
    loop {
        match conn.next_message().await {
            None => {
                return Err(CommonError::Transport(
                    "connection closed during subscribe".to_string(),
                ));
            }
            Some(Err(err)) => return Err(err),
            Some(Ok(TransportMessage::Text(text))) => match codec.decode(&text) {
                Ok(FeedMessage::SubscribeAck) => return Ok(()),
                // Data flowing counts as an implicit ack.
                Ok(FeedMessage::Quote(quote)) => {
                    quote_tx.send(quote).await.map_err(|_| {
                        CommonError::ChannelClosed("quote receiver dropped".to_string())
                    })?;
                    return Ok(());
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(%exchange, error = %err, "dropping undecodable message");
                }
            },
            Some(Ok(_)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::types::Price;
    use common::{Asset, AssetPair};
    use rust_decimal::Decimal;
    use std::collections::VecDeque;
    use std::str::FromStr;
    use std::sync::Mutex;
    use tokio::time::timeout;

    fn usdt_inr() -> AssetPair {
        AssetPair::new(Asset::from("usdt"), Asset::from("inr"))
    }

    /// Line-oriented test dialect: `quote:<buy>:<sell>`, `beat`, `ack`.
    struct TestCodec {
        exchange: ExchangeId,
        pair: AssetPair,
        expects_ack: bool,
    }

    impl TestCodec {
        fn new(expects_ack: bool) -> Self {
            Self {
                exchange: ExchangeId::from("testex"),
                pair: usdt_inr(),
                expects_ack,
            }
        }
    }

    impl QuoteCodec for TestCodec {
        fn exchange(&self) -> &ExchangeId {
            &self.exchange
        }

        fn pair(&self) -> &AssetPair {
            &self.pair
        }

        fn subscribe_message(&self) -> Option<String> {
            Some("SUB".to_string())
        }

        fn expects_subscribe_ack(&self) -> bool {
            self.expects_ack
        }

        fn decode(&self, raw: &str) -> Result<FeedMessage, CommonError> {
            if raw == "beat" {
                return Ok(FeedMessage::Heartbeat);
            }
            if raw == "ack" {
                return Ok(FeedMessage::SubscribeAck);
            }
            let mut parts = raw.split(':');
            match (parts.next(), parts.next(), parts.next()) {
                (Some("quote"), Some(buy), Some(sell)) => {
                    let buy = Decimal::from_str(buy)
                        .map_err(|e| CommonError::Decode(e.to_string()))?;
                    let sell = Decimal::from_str(sell)
                        .map_err(|e| CommonError::Decode(e.to_string()))?;
                    Ok(FeedMessage::Quote(Quote {
                        exchange: self.exchange.clone(),
                        pair: self.pair.clone(),
                        buy_price: Price(buy),
                        sell_price: Price(sell),
                        observed_at: Utc::now(),
                        volume_hint: None,
                    }))
                }
                _ => Err(CommonError::Decode(format!("unknown frame: {}", raw))),
            }
        }
    }

    struct MockConnection {
        inbound: mpsc::UnboundedReceiver<Result<TransportMessage, CommonError>>,
        sent: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl FeedConnection for MockConnection {
        async fn send_text(&mut self, text: String) -> Result<(), CommonError> {
            self.sent.lock().unwrap().push(text);
            Ok(())
        }

        async fn send_ping(&mut self) -> Result<(), CommonError> {
            Ok(())
        }

        async fn send_pong(&mut self, _payload: Vec<u8>) -> Result<(), CommonError> {
            Ok(())
        }

        async fn next_message(&mut self) -> Option<Result<TransportMessage, CommonError>> {
            self.inbound.recv().await
        }

        async fn close(&mut self) -> Result<(), CommonError> {
            Ok(())
        }
    }

    struct MockTransport {
        connections: Mutex<VecDeque<MockConnection>>,
    }

    impl MockTransport {
        fn new(connections: Vec<MockConnection>) -> Self {
            Self {
                connections: Mutex::new(connections.into()),
            }
        }
    }

    #[async_trait]
    impl FeedTransport for MockTransport {
        async fn connect(&self, _url: &str) -> Result<Box<dyn FeedConnection>, CommonError> {
            match self.connections.lock().unwrap().pop_front() {
                Some(conn) => Ok(Box::new(conn)),
                None => Err(CommonError::Transport("connection refused".to_string())),
            }
        }
    }

    struct Feed {
        sender: mpsc::UnboundedSender<Result<TransportMessage, CommonError>>,
        sent: Arc<Mutex<Vec<String>>>,
    }

    fn scripted_connection() -> (Feed, MockConnection) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sent = Arc::new(Mutex::new(Vec::new()));
        (
            Feed {
                sender: tx,
                sent: Arc::clone(&sent),
            },
            MockConnection { inbound: rx, sent },
        )
    }

    fn test_config(heartbeat_ms: u64, max_attempts: u32, initial_delay_ms: u64) -> SupervisorConfig {
        SupervisorConfig {
            exchange: ExchangeId::from("testex"),
            url: "wss://example.invalid/stream".to_string(),
            heartbeat_interval: Duration::from_millis(heartbeat_ms),
            missed_beat_tolerance: 1,
            max_reconnect_attempts: max_attempts,
            retry: RetryPolicy {
                max_attempts,
                initial_delay: Duration::from_millis(initial_delay_ms),
                backoff_multiplier: 2.0,
                max_delay: Duration::from_secs(10),
            },
        }
    }

    async fn next_state(rx: &mut mpsc::Receiver<StatusEvent>) -> StatusEvent {
        timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for status")
            .expect("status channel closed")
    }

    fn assert_state(event: &StatusEvent, expected: ConnectionState) {
        match event {
            StatusEvent::StateChanged { state, .. } => assert_eq!(*state, expected),
            other => panic!("expected state change, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_quotes_flow_and_exhaustion_closes_feed() {
        let (feed, conn) = scripted_connection();
        feed.sender
            .send(Ok(TransportMessage::Text("quote:83.2:83.0".to_string())))
            .unwrap();
        feed.sender
            .send(Ok(TransportMessage::Text("garbage".to_string())))
            .unwrap();
        feed.sender
            .send(Ok(TransportMessage::Text("quote:84.0:83.8".to_string())))
            .unwrap();
        drop(feed.sender); // transport drops after the third frame

        let (quote_tx, mut quote_rx) = mpsc::channel(32);
        let (status_tx, mut status_rx) = mpsc::channel(32);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let supervisor = ConnectionSupervisor::new(
            test_config(1_000, 2, 1),
            Arc::new(MockTransport::new(vec![conn])),
            Arc::new(TestCodec::new(false)),
            quote_tx,
            status_tx,
            shutdown_rx,
        );
        let metrics = supervisor.metrics();
        let handle = supervisor.spawn();

        let first = timeout(Duration::from_secs(2), quote_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.buy_price, Price(Decimal::from_str("83.2").unwrap()));
        let second = timeout(Duration::from_secs(2), quote_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.buy_price, Price(Decimal::from_str("84.0").unwrap()));

        assert_state(&next_state(&mut status_rx).await, ConnectionState::Connecting);
        assert_state(&next_state(&mut status_rx).await, ConnectionState::Open);
        assert_state(
            &next_state(&mut status_rx).await,
            ConnectionState::Reconnecting,
        );
        assert_state(&next_state(&mut status_rx).await, ConnectionState::Closed);
        match next_state(&mut status_rx).await {
            StatusEvent::FeedUnavailable { attempts, .. } => assert_eq!(attempts, 2),
            other => panic!("expected FeedUnavailable, got {:?}", other),
        }

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(CommonError::FeedUnavailable(_))));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.quotes_published, 2);
        assert_eq!(snapshot.decode_failures, 1);
        assert_eq!(snapshot.reconnections, 1);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_backoff_wait() {
        let (quote_tx, _quote_rx) = mpsc::channel(32);
        let (status_tx, mut status_rx) = mpsc::channel(32);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // No connections at all and a long backoff between attempts.
        let supervisor = ConnectionSupervisor::new(
            test_config(1_000, 5, 5_000),
            Arc::new(MockTransport::new(Vec::new())),
            Arc::new(TestCodec::new(false)),
            quote_tx,
            status_tx,
            shutdown_rx,
        );
        let handle = supervisor.spawn();

        assert_state(&next_state(&mut status_rx).await, ConnectionState::Connecting);

        // Let the first refused attempt land and the 5s backoff wait start.
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(true).unwrap();
        let result = timeout(Duration::from_millis(500), handle)
            .await
            .expect("shutdown did not cancel the backoff wait")
            .unwrap();
        assert!(result.is_ok());
        assert_state(&next_state(&mut status_rx).await, ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_silent_feed_degrades_and_recovers() {
        let (feed, conn) = scripted_connection();
        let (quote_tx, mut quote_rx) = mpsc::channel(32);
        let (status_tx, mut status_rx) = mpsc::channel(32);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let supervisor = ConnectionSupervisor::new(
            test_config(25, 3, 1),
            Arc::new(MockTransport::new(vec![conn])),
            Arc::new(TestCodec::new(false)),
            quote_tx,
            status_tx,
            shutdown_rx,
        );
        let handle = supervisor.spawn();

        assert_state(&next_state(&mut status_rx).await, ConnectionState::Connecting);
        assert_state(&next_state(&mut status_rx).await, ConnectionState::Open);

        // Silence beyond the liveness window degrades the feed.
        assert_state(&next_state(&mut status_rx).await, ConnectionState::Degraded);

        // Any inbound traffic recovers it.
        feed.sender
            .send(Ok(TransportMessage::Text("quote:83.2:83.0".to_string())))
            .unwrap();
        assert_state(&next_state(&mut status_rx).await, ConnectionState::Open);
        assert!(quote_rx.recv().await.is_some());

        shutdown_tx.send(true).unwrap();
        assert_state(&next_state(&mut status_rx).await, ConnectionState::Closed);
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_subscribe_ack_gates_open() {
        let (feed, conn) = scripted_connection();
        feed.sender
            .send(Ok(TransportMessage::Text("ack".to_string())))
            .unwrap();
        feed.sender
            .send(Ok(TransportMessage::Text("quote:83.2:83.0".to_string())))
            .unwrap();

        let (quote_tx, mut quote_rx) = mpsc::channel(32);
        let (status_tx, mut status_rx) = mpsc::channel(32);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let supervisor = ConnectionSupervisor::new(
            test_config(1_000, 2, 1),
            Arc::new(MockTransport::new(vec![conn])),
            Arc::new(TestCodec::new(true)),
            quote_tx,
            status_tx,
            shutdown_rx,
        );
        let handle = supervisor.spawn();

        assert_state(&next_state(&mut status_rx).await, ConnectionState::Connecting);
        assert_state(&next_state(&mut status_rx).await, ConnectionState::Open);
        assert!(quote_rx.recv().await.is_some());

        // The subscribe frame went out before anything else.
        assert_eq!(feed.sent.lock().unwrap().first().unwrap(), "SUB");

        shutdown_tx.send(true).unwrap();
        assert!(handle.await.unwrap().is_ok());
    }
}
