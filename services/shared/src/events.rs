// Tenant lifecycle events and the bus that carries them

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::tenant::TenantId;

pub const TOPIC_TENANT_CREATED: &str = "tenant.created";
pub const TOPIC_TENANT_ACTIVATED: &str = "tenant.activated";
pub const TOPIC_TENANT_SUSPENDED: &str = "tenant.suspended";
pub const TOPIC_TENANT_DEACTIVATED: &str = "tenant.deactivated";
pub const TOPIC_TENANT_REACTIVATED: &str = "tenant.reactivated";
pub const TOPIC_TENANT_SCHEMA_CREATED: &str = "tenant.schema.created";

/// A tenant lifecycle event. `id` is the idempotency key; `version` is the
/// tenant's monotonic lifecycle version, the dedupe axis for consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub event_type: String,
    pub tenant_id: TenantId,
    pub version: i64,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(
        event_type: &str,
        tenant_id: TenantId,
        version: i64,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: event_type.to_string(),
            tenant_id,
            version,
            payload,
            timestamp: Utc::now(),
        }
    }
}

/// Wire payload of `tenant.schema.created`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantSchemaCreatedPayload {
    pub tenant_id: TenantId,
    pub schema_name: String,
    pub version: i64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Subscription error: {0}")]
    Subscription(String),
}

impl From<redis::RedisError> for EventBusError {
    fn from(e: redis::RedisError) -> Self {
        EventBusError::Transport(e.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventHandlerError {
    #[error("Handler error: {0}")]
    Handler(String),
    #[error("Retry needed: {0}")]
    Retry(String),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &Event) -> Result<(), EventHandlerError>;
}

/// Delivery is at-least-once on every implementation; handlers must be
/// idempotent. Events for a single tenant arrive in publication order;
/// events across tenants interleave freely.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, topic: &str, event: &Event) -> Result<(), EventBusError>;

    /// Registers `handler` under `group` for `topic`. Each group sees every
    /// event exactly once per delivery attempt; distinct groups each get
    /// their own copy.
    async fn subscribe(
        &self,
        topic: &str,
        group: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<(), EventBusError>;
}

// ---------------------------------------------------------------------------
// In-memory bus: tests and single-process development mode.

struct InMemorySubscription {
    group: String,
    handler: Arc<dyn EventHandler>,
}

pub struct InMemoryEventBus {
    subscriptions: RwLock<HashMap<String, Vec<InMemorySubscription>>>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, topic: &str, event: &Event) -> Result<(), EventBusError> {
        let subscriptions = self.subscriptions.read().await;
        if let Some(subscribers) = subscriptions.get(topic) {
            for subscription in subscribers {
                // Per-tenant ordering: deliver inline rather than spawning,
                // retry once on a transient handler failure.
                let mut result = subscription.handler.handle(event).await;
                if matches!(result, Err(EventHandlerError::Retry(_))) {
                    result = subscription.handler.handle(event).await;
                }
                if let Err(e) = result {
                    tracing::error!(
                        topic = %topic,
                        group = %subscription.group,
                        event_id = %event.id,
                        error = %e,
                        "Event handler failed"
                    );
                }
            }
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
        group: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<(), EventBusError> {
        let mut subscriptions = self.subscriptions.write().await;
        subscriptions
            .entry(topic.to_string())
            .or_default()
            .push(InMemorySubscription {
                group: group.to_string(),
                handler,
            });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Redis Streams bus: one stream per topic, one consumer group per service.

#[derive(Clone)]
pub struct RedisEventBus {
    conn: ConnectionManager,
    consumer_name: String,
    block_millis: usize,
    max_retry_backoff: Duration,
}

impl RedisEventBus {
    pub async fn connect(redis_url: &str, consumer_name: &str) -> Result<Self, EventBusError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            consumer_name: consumer_name.to_string(),
            block_millis: 5_000,
            max_retry_backoff: Duration::from_secs(30),
        })
    }

    async fn ensure_group(&self, topic: &str, group: &str) -> Result<(), EventBusError> {
        let mut conn = self.conn.clone();
        let created: redis::RedisResult<()> =
            conn.xgroup_create_mkstream(topic, group, "$").await;
        match created {
            Ok(()) => Ok(()),
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_batch(
        &self,
        topic: &str,
        group: &str,
        start_id: &str,
        block: bool,
    ) -> Result<Vec<(String, Event)>, EventBusError> {
        let mut conn = self.conn.clone();
        let mut options = StreamReadOptions::default()
            .group(group, &self.consumer_name)
            .count(16);
        if block {
            options = options.block(self.block_millis);
        }

        let reply: StreamReadReply = conn
            .xread_options(&[topic], &[start_id], &options)
            .await?;

        let mut batch = Vec::new();
        for key in reply.keys {
            for entry in key.ids {
                let Some(raw) = entry.map.get("payload") else {
                    continue;
                };
                let json: String = redis::from_redis_value(raw)?;
                match serde_json::from_str::<Event>(&json) {
                    Ok(event) => batch.push((entry.id.clone(), event)),
                    Err(e) => {
                        // Poison entries are acked away, not replayed forever.
                        tracing::error!(
                            topic = %topic,
                            stream_id = %entry.id,
                            error = %e,
                            "Dropping undecodable event"
                        );
                        let _: i64 = conn.xack(topic, group, &[&entry.id]).await?;
                    }
                }
            }
        }
        Ok(batch)
    }

    async fn consume_loop(
        self: Arc<Self>,
        topic: String,
        group: String,
        handler: Arc<dyn EventHandler>,
    ) {
        let mut backoff = Duration::from_millis(250);
        loop {
            // Own pending (delivered but unacked) entries first, then new
            // ones. Pending redelivery is the at-least-once retry path.
            let pending = self.read_batch(&topic, &group, "0", false).await;
            let fresh = match pending {
                Ok(mut batch) => match self.read_batch(&topic, &group, ">", true).await {
                    Ok(more) => {
                        batch.extend(more);
                        Ok(batch)
                    }
                    Err(e) => Err(e),
                },
                Err(e) => Err(e),
            };

            let batch = match fresh {
                Ok(batch) => {
                    backoff = Duration::from_millis(250);
                    batch
                }
                Err(e) => {
                    tracing::warn!(topic = %topic, error = %e, "Event bus read failed, backing off");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(self.max_retry_backoff);
                    continue;
                }
            };

            for (stream_id, event) in batch {
                match handler.handle(&event).await {
                    Ok(()) => {
                        let mut conn = self.conn.clone();
                        let acked: redis::RedisResult<i64> =
                            conn.xack(&topic, &group, &[&stream_id]).await;
                        if let Err(e) = acked {
                            tracing::warn!(topic = %topic, stream_id = %stream_id, error = %e, "Ack failed");
                        }
                    }
                    Err(EventHandlerError::Retry(reason)) => {
                        // Leave unacked; the pending read on the next pass
                        // redelivers after the backoff below.
                        tracing::warn!(
                            topic = %topic,
                            event_id = %event.id,
                            reason = %reason,
                            "Transient handler failure, event left pending"
                        );
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(self.max_retry_backoff);
                    }
                    Err(EventHandlerError::Handler(reason)) => {
                        tracing::error!(
                            topic = %topic,
                            event_id = %event.id,
                            reason = %reason,
                            "Permanent handler failure, acking event away"
                        );
                        let mut conn = self.conn.clone();
                        let _: redis::RedisResult<i64> =
                            conn.xack(&topic, &group, &[&stream_id]).await;
                    }
                }
            }
        }
    }
}

#[async_trait]
impl EventBus for RedisEventBus {
    async fn publish(&self, topic: &str, event: &Event) -> Result<(), EventBusError> {
        let json = serde_json::to_string(event)?;
        let mut conn = self.conn.clone();
        let _: String = conn.xadd(topic, "*", &[("payload", json.as_str())]).await?;
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
        group: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<(), EventBusError> {
        self.ensure_group(topic, group).await?;
        let bus = Arc::new(self.clone());
        tokio::spawn(bus.consume_loop(topic.to_string(), group.to_string(), handler));
        Ok(())
    }
}
