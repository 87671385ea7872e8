// Outbox relay: drains unpublished events onto the bus

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use ldp_shared::events::EventBus;

use crate::repositories::OutboxRepository;

pub struct OutboxRelay {
    outbox: OutboxRepository,
    bus: Arc<dyn EventBus>,
    poll_interval: Duration,
    batch_size: i64,
}

impl OutboxRelay {
    pub fn new(outbox: OutboxRepository, bus: Arc<dyn EventBus>, poll_interval: Duration) -> Self {
        Self {
            outbox,
            bus,
            poll_interval,
            batch_size: 32,
        }
    }

    /// Runs until the process exits. Entries publish oldest-first, so
    /// per-tenant order on the bus matches transition order; a failed
    /// publish stops the batch and the entry is retried on the next pass
    /// (at-least-once, consumers dedupe).
    pub async fn run(self) {
        info!("Outbox relay started");
        loop {
            match self.drain_once().await {
                Ok(0) => tokio::time::sleep(self.poll_interval).await,
                Ok(published) => {
                    info!(published = published, "Outbox entries published");
                }
                Err(e) => {
                    error!(error = %e, "Outbox drain failed");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }

    pub async fn drain_once(&self) -> crate::error::TenantServiceResult<usize> {
        let entries = self.outbox.fetch_unpublished(self.batch_size).await?;
        let mut published = 0;

        for entry in entries {
            let topic = entry.event.event_type.clone();
            if let Err(e) = self.bus.publish(&topic, &entry.event).await {
                warn!(
                    outbox_id = entry.id,
                    topic = %topic,
                    error = %e,
                    "Event publish failed, will retry"
                );
                break;
            }
            self.outbox.mark_published(entry.id).await?;
            published += 1;
        }

        Ok(published)
    }
}
