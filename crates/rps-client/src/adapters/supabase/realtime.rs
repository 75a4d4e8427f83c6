//! Realtime change feed over the Phoenix websocket protocol.
//!
//! One socket per subscription. The task joins `realtime:<channel>` with the
//! requested `postgres_changes`, heartbeats every [`HEARTBEAT_INTERVAL`], and
//! reconnects with exponential backoff until the subscription is released.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use super::SupabaseStore;
use crate::domain::StoreError;
use crate::ports::outbound::{ChangeEvent, ChangeFeed, ChangeKind, ChangeSpec, ChangeSubscription};

/// Protocol version sent on connect.
const PROTOCOL_VSN: &str = "1.0.0";

/// Heartbeat period expected by the server.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

/// Reconnection attempts before the subscription gives up.
const MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Base delay between reconnection attempts (exponential backoff).
const RECONNECT_BASE_DELAY_SECS: u64 = 1;

/// Maximum delay between reconnection attempts.
const MAX_RECONNECT_DELAY_SECS: u64 = 30;

/// Per-subscription buffer.
const SUBSCRIPTION_BUFFER: usize = 256;

/// Reference of the join message; replies carry it back.
const JOIN_REF: &str = "1";

/// Phoenix wire frame.
#[derive(Debug, Serialize, Deserialize)]
struct PhoenixMessage {
    topic: String,
    event: String,
    payload: Value,
    #[serde(rename = "ref", default)]
    reference: Option<String>,
}

impl PhoenixMessage {
    fn new(topic: impl Into<String>, event: &str, payload: Value, reference: &str) -> Self {
        Self {
            topic: topic.into(),
            event: event.to_string(),
            payload,
            reference: Some(reference.to_string()),
        }
    }

    fn to_frame(&self) -> Result<Message, StoreError> {
        serde_json::to_string(self)
            .map(|text| Message::Text(text.into()))
            .map_err(|e| StoreError::Parse(e.to_string()))
    }
}

/// `payload.data` of a `postgres_changes` frame.
#[derive(Debug, Deserialize)]
struct ChangeData {
    #[serde(rename = "type")]
    kind: ChangeKind,
    schema: String,
    table: String,
    #[serde(default)]
    record: Option<Value>,
    #[serde(default)]
    old_record: Option<Value>,
}

impl From<ChangeData> for ChangeEvent {
    fn from(data: ChangeData) -> Self {
        ChangeEvent {
            kind: data.kind,
            schema: data.schema,
            table: data.table,
            record: data.record.unwrap_or_else(|| json!({})),
            old_record: data.old_record,
        }
    }
}

/// Websocket endpoint for `base_url` (http → ws, https → wss).
fn realtime_url(base_url: &str, anon_key: &str, events_per_second: u32) -> String {
    let socket_base = if let Some(rest) = base_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base_url.to_string()
    };
    format!(
        "{socket_base}/realtime/v1/websocket?apikey={anon_key}&eventsPerSecond={events_per_second}&vsn={PROTOCOL_VSN}"
    )
}

fn topic_for(channel: &str) -> String {
    format!("realtime:{channel}")
}

/// `postgres_changes` entry for one spec, filter as `col=eq.value`.
fn change_config(spec: &ChangeSpec) -> Value {
    let mut config = json!({
        "event": spec.kind,
        "schema": spec.schema,
        "table": spec.table,
    });
    if let (Some(filter), Some(object)) = (&spec.filter, config.as_object_mut()) {
        object.insert(
            "filter".to_string(),
            Value::String(format!("{}={}", filter.column(), filter.operator_value())),
        );
    }
    config
}

fn join_message(channel: &str, specs: &[ChangeSpec], access_token: &str) -> PhoenixMessage {
    let changes: Vec<Value> = specs.iter().map(change_config).collect();
    PhoenixMessage::new(
        topic_for(channel),
        "phx_join",
        json!({
            "config": {
                "broadcast": {"ack": false, "self": false},
                "presence": {"key": ""},
                "postgres_changes": changes,
                "private": false
            },
            "access_token": access_token,
        }),
        JOIN_REF,
    )
}

/// What a frame means to the subscription.
#[derive(Debug, PartialEq)]
enum Incoming {
    Joined,
    JoinRejected(String),
    Change(ChangeEvent),
    ChannelClosed(String),
    Other,
}

fn classify(message: PhoenixMessage, topic: &str) -> Incoming {
    if message.topic != topic {
        return Incoming::Other;
    }
    match message.event.as_str() {
        "phx_reply" if message.reference.as_deref() == Some(JOIN_REF) => {
            match message.payload.get("status").and_then(Value::as_str) {
                Some("ok") => Incoming::Joined,
                _ => Incoming::JoinRejected(
                    message
                        .payload
                        .pointer("/response/reason")
                        .and_then(Value::as_str)
                        .unwrap_or("join rejected")
                        .to_string(),
                ),
            }
        }
        "postgres_changes" => message
            .payload
            .get("data")
            .cloned()
            .and_then(|data| serde_json::from_value::<ChangeData>(data).ok())
            .map_or(Incoming::Other, |data| Incoming::Change(data.into())),
        "phx_error" | "phx_close" => Incoming::ChannelClosed(message.event),
        _ => Incoming::Other,
    }
}

/// Exponential backoff delay.
fn backoff_delay(attempts: u32) -> Duration {
    Duration::from_secs(std::cmp::min(
        RECONNECT_BASE_DELAY_SECS.saturating_mul(1 << attempts.min(6)),
        MAX_RECONNECT_DELAY_SECS,
    ))
}

/// How a connection ended without error.
enum ConnectionEnd {
    /// Subscription released.
    Shutdown,
    /// Consumer dropped its receiver.
    ReceiverGone,
}

/// Everything a connection needs, owned by the background task.
struct ChannelTask {
    url: String,
    channel: String,
    specs: Vec<ChangeSpec>,
    access_token: String,
    events_tx: mpsc::Sender<ChangeEvent>,
}

impl ChannelTask {
    async fn connection_loop(
        self,
        mut shutdown_rx: oneshot::Receiver<()>,
        mut ready: Option<oneshot::Sender<Result<(), StoreError>>>,
    ) {
        let mut attempts = 0u32;
        loop {
            match self.run_connection(&mut shutdown_rx, &mut ready, &mut attempts).await {
                Ok(ConnectionEnd::Shutdown) | Ok(ConnectionEnd::ReceiverGone) => break,
                Err(e) => {
                    if let Some(ready) = ready.take() {
                        let _ = ready.send(Err(e));
                        break;
                    }
                    attempts += 1;
                    warn!(channel = %self.channel, attempts, error = %e, "Realtime connection lost");
                    if attempts >= MAX_RECONNECT_ATTEMPTS {
                        warn!(channel = %self.channel, "Giving up on realtime channel");
                        break;
                    }
                    tokio::select! {
                        _ = tokio::time::sleep(backoff_delay(attempts)) => {}
                        _ = &mut shutdown_rx => break,
                    }
                }
            }
        }
        debug!(channel = %self.channel, "Realtime task finished");
    }

    async fn run_connection(
        &self,
        shutdown_rx: &mut oneshot::Receiver<()>,
        ready: &mut Option<oneshot::Sender<Result<(), StoreError>>>,
        attempts: &mut u32,
    ) -> Result<ConnectionEnd, StoreError> {
        let (socket, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| StoreError::Realtime(format!("connect failed: {e}")))?;
        let (mut write, mut read) = socket.split();
        let topic = topic_for(&self.channel);

        write
            .send(join_message(&self.channel, &self.specs, &self.access_token).to_frame()?)
            .await
            .map_err(|e| StoreError::Realtime(e.to_string()))?;

        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut next_ref: u64 = 2;

        loop {
            tokio::select! {
                _ = &mut *shutdown_rx => {
                    let leave = PhoenixMessage::new(topic.clone(), "phx_leave", json!({}), &next_ref.to_string());
                    let _ = write.send(leave.to_frame()?).await;
                    let _ = write.close().await;
                    info!(channel = %self.channel, "Realtime channel left");
                    return Ok(ConnectionEnd::Shutdown);
                }
                _ = heartbeat.tick() => {
                    let beat = PhoenixMessage::new("phoenix", "heartbeat", json!({}), &next_ref.to_string());
                    next_ref += 1;
                    write
                        .send(beat.to_frame()?)
                        .await
                        .map_err(|e| StoreError::Realtime(e.to_string()))?;
                }
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        let Ok(message) = serde_json::from_str::<PhoenixMessage>(text.as_str()) else {
                            continue;
                        };
                        match classify(message, &topic) {
                            Incoming::Joined => {
                                info!(channel = %self.channel, "Realtime channel joined");
                                *attempts = 0;
                                if let Some(ready) = ready.take() {
                                    let _ = ready.send(Ok(()));
                                }
                            }
                            Incoming::JoinRejected(reason) => {
                                return Err(StoreError::Realtime(reason));
                            }
                            Incoming::Change(event) => {
                                if !self.specs.iter().any(|spec| spec.matches(&event)) {
                                    continue;
                                }
                                if self.events_tx.send(event).await.is_err() {
                                    return Ok(ConnectionEnd::ReceiverGone);
                                }
                            }
                            Incoming::ChannelClosed(event) => {
                                return Err(StoreError::Realtime(format!("channel {event}")));
                            }
                            Incoming::Other => {}
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        return Err(StoreError::Realtime("socket closed".to_string()));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(StoreError::Realtime(e.to_string())),
                }
            }
        }
    }
}

#[async_trait]
impl ChangeFeed for SupabaseStore {
    async fn subscribe(
        &self,
        channel: &str,
        specs: Vec<ChangeSpec>,
    ) -> Result<ChangeSubscription, StoreError> {
        let (events_tx, events_rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (ready_tx, ready_rx) = oneshot::channel();

        let task = ChannelTask {
            url: realtime_url(&self.base_url, &self.anon_key, self.events_per_second),
            channel: channel.to_string(),
            specs,
            access_token: self.bearer(),
            events_tx,
        };
        tokio::spawn(task.connection_loop(shutdown_rx, Some(ready_tx)));

        match tokio::time::timeout(self.request_timeout, ready_rx).await {
            Ok(Ok(Ok(()))) => Ok(ChangeSubscription::new(channel, events_rx, shutdown_tx)),
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(_)) => Err(StoreError::Realtime("channel task ended".to_string())),
            Err(_) => {
                let _ = shutdown_tx.send(());
                Err(StoreError::Realtime("subscribe timed out".to_string()))
            }
        }
    }
}
