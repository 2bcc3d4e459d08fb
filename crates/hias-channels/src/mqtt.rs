use async_trait::async_trait;
use parking_lot::Mutex;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, LastWill, MqttOptions, Outgoing, Packet,
    QoS, TlsConfiguration, Transport,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::adapter::*;
use hias_config::MqttConfig;
use hias_core::{AgentStatus, HiasError, Result};

const CHANNEL_ID: &str = "mqtt";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const DISCONNECT_GRACE: Duration = Duration::from_secs(3);
const REQUEST_CAPACITY: usize = 64;

/// MQTT session with the HIAS broker, backed by rumqttc.
///
/// The event loop runs on its own task after `connect`. It re-announces
/// presence and re-subscribes after every reconnect, publishes the life
/// heartbeat and forwards inbound messages as [`ChannelEvent`]s.
pub struct MqttChannel {
    config: MqttConfig,
    topics: TopicBuilder,
    client: Mutex<Option<AsyncClient>>,
    connected: Arc<AtomicBool>,
    shutdown_tx: Mutex<Option<watch::Sender<bool>>>,
    task: Mutex<Option<JoinHandle<()>>>,
    events: Mutex<Option<mpsc::Receiver<ChannelEvent>>>,
    /// Held for the whole of `connect` and `disconnect`.
    session: tokio::sync::Mutex<()>,
}

impl MqttChannel {
    /// Build the channel. No I/O happens until `connect`.
    pub fn new(config: MqttConfig) -> Self {
        let topics = TopicBuilder::from_config(&config);
        Self {
            config,
            topics,
            client: Mutex::new(None),
            connected: Arc::new(AtomicBool::new(false)),
            shutdown_tx: Mutex::new(None),
            task: Mutex::new(None),
            events: Mutex::new(None),
            session: tokio::sync::Mutex::new(()),
        }
    }

    fn options(&self) -> Result<MqttOptions> {
        let client_id = self.config.effective_client_id();
        let mut opts = MqttOptions::new(client_id, self.config.host.clone(), self.config.port);
        opts.set_keep_alive(Duration::from_secs(self.config.keep_alive_secs.max(5)));
        opts.set_clean_session(true);
        opts.set_last_will(LastWill::new(
            self.topics.topic(AgentTopic::Status),
            AgentStatus::Offline.as_str().as_bytes().to_vec(),
            QoS::AtLeastOnce,
            true,
        ));

        if let (Some(user), Some(pass)) = (&self.config.username, &self.config.password) {
            opts.set_credentials(user.clone(), pass.clone());
        }

        if let Some(ref ca_file) = self.config.ca_file {
            let ca = std::fs::read(ca_file).map_err(|e| {
                HiasError::channel(
                    CHANNEL_ID,
                    format!("failed to read CA file {}: {e}", ca_file.display()),
                )
            })?;
            opts.set_transport(Transport::tls_with_config(TlsConfiguration::Simple {
                ca,
                alpn: None,
                client_auth: None,
            }));
        }
        Ok(opts)
    }
}

#[async_trait]
impl MessagingChannel for MqttChannel {
    fn id(&self) -> &str {
        CHANNEL_ID
    }

    async fn connect(&self) -> Result<()> {
        let _session = self.session.lock().await;
        if self.client.lock().is_some() {
            debug!("MQTT channel already connected");
            return Ok(());
        }

        let opts = self.options()?;
        let (client, mut eventloop) = AsyncClient::new(opts, REQUEST_CAPACITY);
        info!(
            host = %self.config.host,
            port = self.config.port,
            client_id = %self.config.effective_client_id(),
            "connecting to MQTT broker"
        );

        match tokio::time::timeout(CONNECT_TIMEOUT, wait_for_connack(&mut eventloop)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(HiasError::channel(
                    CHANNEL_ID,
                    format!(
                        "no CONNACK from {}:{} within {}s",
                        self.config.host,
                        self.config.port,
                        CONNECT_TIMEOUT.as_secs()
                    ),
                ));
            }
        }

        self.connected.store(true, Ordering::SeqCst);
        announce(&client, &self.topics);
        info!(status = %self.topics.topic(AgentTopic::Status), "MQTT channel connected");

        let (event_tx, event_rx) = mpsc::channel(256);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let _ = event_tx.try_send(ChannelEvent::Connected);

        let handle = tokio::spawn(run_event_loop(
            eventloop,
            client.clone(),
            self.topics.clone(),
            Arc::clone(&self.connected),
            event_tx,
            shutdown_rx,
            Duration::from_secs(self.config.life_interval_secs),
            self.config.reconnect_max_secs.max(1),
        ));

        *self.client.lock() = Some(client);
        *self.shutdown_tx.lock() = Some(shutdown_tx);
        *self.task.lock() = Some(handle);
        *self.events.lock() = Some(event_rx);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let _session = self.session.lock().await;
        let Some(client) = self.client.lock().take() else {
            debug!("MQTT channel was never connected, nothing to disconnect");
            return Ok(());
        };

        if let Err(e) = client.try_publish(
            self.topics.topic(AgentTopic::Status),
            QoS::AtLeastOnce,
            true,
            AgentStatus::Offline.as_str().as_bytes().to_vec(),
        ) {
            warn!(error = %e, "failed to queue OFFLINE status");
        }
        if let Err(e) = client.try_disconnect() {
            warn!(error = %e, "failed to queue MQTT DISCONNECT");
        }

        let handle = self.task.lock().take();
        let shutdown_tx = self.shutdown_tx.lock().take();
        if let Some(mut handle) = handle {
            // The loop exits on its own once DISCONNECT is flushed.
            if tokio::time::timeout(DISCONNECT_GRACE, &mut handle).await.is_err() {
                debug!("MQTT event loop did not stop in time, cancelling");
                if let Some(tx) = shutdown_tx {
                    let _ = tx.send(true);
                }
                handle.abort();
            }
        }

        self.connected.store(false, Ordering::SeqCst);
        info!("MQTT channel disconnected");
        Ok(())
    }

    async fn publish(&self, topic: AgentTopic, payload: &serde_json::Value) -> Result<()> {
        let client = self.client.lock().clone();
        let Some(client) = client.filter(|_| self.is_connected()) else {
            return Err(HiasError::ChannelNotConnected(CHANNEL_ID.into()));
        };
        let bytes = serde_json::to_vec(payload)?;
        client
            .publish(self.topics.topic(topic), QoS::AtLeastOnce, false, bytes)
            .await
            .map_err(|e| HiasError::channel(CHANNEL_ID, e))?;
        debug!(topic = %topic, "published");
        Ok(())
    }

    fn take_events(&self) -> Option<mpsc::Receiver<ChannelEvent>> {
        self.events.lock().take()
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Poll until the broker acknowledges the session.
async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<()> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    return Ok(());
                }
                return Err(HiasError::channel(
                    CHANNEL_ID,
                    format!("broker refused connection: {:?}", ack.code),
                ));
            }
            Ok(_) => continue,
            Err(e) => return Err(HiasError::channel(CHANNEL_ID, e)),
        }
    }
}

/// Publish retained ONLINE and (re)subscribe to the command topic.
fn announce(client: &AsyncClient, topics: &TopicBuilder) {
    if let Err(e) = client.try_publish(
        topics.topic(AgentTopic::Status),
        QoS::AtLeastOnce,
        true,
        AgentStatus::Online.as_str().as_bytes().to_vec(),
    ) {
        warn!(error = %e, "failed to queue ONLINE status");
    }
    if let Err(e) = client.try_subscribe(topics.topic(AgentTopic::Commands), QoS::AtLeastOnce) {
        warn!(error = %e, "failed to queue command subscription");
    }
}

fn life_payload(started: Instant) -> serde_json::Value {
    serde_json::json!({
        "Status": AgentStatus::Online.as_str(),
        "Uptime": started.elapsed().as_secs(),
        "Timestamp": chrono::Utc::now().to_rfc3339(),
    })
}

#[allow(clippy::too_many_arguments)]
async fn run_event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    topics: TopicBuilder,
    connected: Arc<AtomicBool>,
    event_tx: mpsc::Sender<ChannelEvent>,
    mut shutdown_rx: watch::Receiver<bool>,
    life_interval: Duration,
    max_backoff_secs: u64,
) {
    let started = Instant::now();
    let life_enabled = !life_interval.is_zero();
    let period = life_interval.max(Duration::from_secs(1));
    let mut life = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    let mut consecutive_failures: u32 = 0;

    loop {
        tokio::select! {
            biased; // prefer shutdown signal

            _ = shutdown_rx.changed() => {
                debug!("MQTT event loop: shutdown requested");
                break;
            }

            _ = life.tick(), if life_enabled => {
                if connected.load(Ordering::SeqCst) {
                    let payload = life_payload(started).to_string();
                    if let Err(e) = client.try_publish(
                        topics.topic(AgentTopic::Life),
                        QoS::AtMostOnce,
                        false,
                        payload.into_bytes(),
                    ) {
                        warn!(error = %e, "failed to queue life heartbeat");
                    }
                }
            }

            polled = eventloop.poll() => {
                match polled {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        if consecutive_failures > 0 {
                            info!(prev_failures = consecutive_failures, "MQTT session recovered");
                        }
                        consecutive_failures = 0;
                        connected.store(true, Ordering::SeqCst);
                        announce(&client, &topics);
                        let _ = event_tx.try_send(ChannelEvent::Connected);
                    }
                    Ok(Event::Incoming(Packet::Publish(p))) => {
                        let message = InboundMessage {
                            agent_topic: topics.parse(&p.topic),
                            topic: p.topic,
                            payload: p.payload.to_vec(),
                        };
                        if event_tx.send(ChannelEvent::Message(message)).await.is_err() {
                            debug!("MQTT event receiver dropped");
                        }
                    }
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                        debug!("MQTT DISCONNECT sent");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        connected.store(false, Ordering::SeqCst);
                        consecutive_failures += 1;
                        error!(error = %e, attempt = consecutive_failures, "MQTT connection error");
                        let _ = event_tx.try_send(ChannelEvent::Disconnected(Some(e.to_string())));

                        let backoff = backoff_duration(consecutive_failures, max_backoff_secs);
                        tokio::select! {
                            _ = shutdown_rx.changed() => break,
                            _ = tokio::time::sleep(backoff) => {}
                        }
                    }
                }
            }
        }
    }

    connected.store(false, Ordering::SeqCst);
    debug!("MQTT event loop stopped");
}

/// Exponential backoff with jitter: 1s, 2s, 4s, 8s, … capped at `max_secs`.
fn backoff_duration(consecutive_failures: u32, max_secs: u64) -> Duration {
    let base = 1u64
        .checked_shl(consecutive_failures.saturating_sub(1).min(6))
        .unwrap_or(max_secs);
    let capped = base.min(max_secs);
    // ±25% jitter
    let jitter_ms = (rand::random::<u64>() % (capped * 500 + 1)) as i64 - (capped as i64 * 250);
    let ms = (capped as i64 * 1000 + jitter_ms).max(500) as u64;
    Duration::from_millis(ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_backoff_grows_and_caps() {
        let first = backoff_duration(1, 60);
        assert!(first >= Duration::from_millis(500) && first <= Duration::from_millis(1250));
        let capped = backoff_duration(20, 8);
        assert!(capped <= Duration::from_secs(10));
        assert!(capped >= Duration::from_secs(6));
    }

    #[test]
    fn test_options_reject_missing_ca_file() {
        let channel = MqttChannel::new(MqttConfig {
            ca_file: Some("/nonexistent/hias/ca.pem".into()),
            ..MqttConfig::default()
        });
        assert!(matches!(
            channel.options(),
            Err(HiasError::Channel { .. })
        ));
    }

    #[tokio::test]
    async fn test_disconnect_without_connect_is_noop() {
        let channel = MqttChannel::new(MqttConfig::default());
        channel.disconnect().await.unwrap();
        channel.disconnect().await.unwrap();
        assert!(!channel.is_connected());
        assert!(channel.take_events().is_none());
    }

    #[tokio::test]
    async fn test_publish_requires_connection() {
        let channel = MqttChannel::new(MqttConfig::default());
        let err = channel
            .publish(AgentTopic::Sensors, &serde_json::json!({"x": 1}))
            .await
            .unwrap_err();
        assert!(matches!(err, HiasError::ChannelNotConnected(_)));
    }

    /// Minimal broker that acknowledges every CONNECT and counts sessions.
    async fn ack_broker() -> (u16, Arc<AtomicUsize>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let sessions = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&sessions);
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    if socket.read(&mut buf).await.unwrap_or(0) == 0 {
                        return;
                    }
                    // CONNACK, session not present, accepted
                    let _ = socket.write_all(&[0x20, 0x02, 0x00, 0x00]).await;
                    while socket.read(&mut buf).await.unwrap_or(0) > 0 {}
                });
            }
        });
        (port, sessions)
    }

    #[tokio::test]
    async fn test_concurrent_connects_open_one_session() {
        let (port, sessions) = ack_broker().await;
        let channel = MqttChannel::new(MqttConfig {
            host: "127.0.0.1".into(),
            port,
            ..MqttConfig::default()
        });

        let (a, b) = tokio::join!(channel.connect(), channel.connect());
        a.unwrap();
        b.unwrap();
        assert!(channel.is_connected());
        assert_eq!(sessions.load(Ordering::SeqCst), 1);

        channel.disconnect().await.unwrap();
        assert!(!channel.is_connected());
    }

    #[test]
    fn test_life_payload_shape() {
        let payload = life_payload(Instant::now());
        assert_eq!(payload["Status"], "ONLINE");
        assert!(payload["Uptime"].is_u64());
    }
}
