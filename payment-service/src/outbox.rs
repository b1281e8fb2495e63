use anyhow::Result;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use rdkafka::producer::{FutureProducer, FutureRecord};
use std::time::Duration;
use tokio::time;
use tracing::{debug, error, info};

use crate::models::*;
use crate::schema::*;
use crate::store::DbPool;

const POLL_INTERVAL: Duration = Duration::from_secs(5);
const BATCH_SIZE: i64 = 100;

/// Relays settled-payment events from `outbox_events` to Kafka, oldest first.
pub struct OutboxProcessor {
    pool: DbPool,
    producer: FutureProducer,
    topic: String,
}

impl OutboxProcessor {
    pub fn new(pool: DbPool, producer: FutureProducer, topic: String) -> Self {
        Self { pool, producer, topic }
    }

    pub async fn run(&self) {
        let mut interval = time::interval(POLL_INTERVAL);

        loop {
            interval.tick().await;

            if let Err(e) = self.process_outbox_events().await {
                error!("Error processing outbox events: {:#}", e);
            }
        }
    }

    async fn process_outbox_events(&self) -> Result<()> {
        let mut conn = self.pool.get().await?;

        let pending = outbox_events::table
            .filter(outbox_events::processed.eq(false))
            .order(outbox_events::created_at.asc())
            .limit(BATCH_SIZE)
            .load::<DbOutboxEvent>(&mut conn)
            .await?;

        if !pending.is_empty() {
            debug!(count = pending.len(), "Relaying outbox events");
        }

        for event in pending {
            if let Err(e) = self.publish_event(&event).await {
                error!(event_id = %event.id, "Failed to publish event: {:#}", e);
                continue;
            }

            diesel::update(outbox_events::table.filter(outbox_events::id.eq(event.id)))
                .set(outbox_events::processed.eq(true))
                .execute(&mut conn)
                .await?;

            info!(
                event_id = %event.id,
                event_type = %event.event_type,
                transaction_id = %event.aggregate_id,
                "Published payment event"
            );
        }

        Ok(())
    }

    async fn publish_event(&self, event: &DbOutboxEvent) -> Result<()> {
        let json = serde_json::to_string(&event.event_data)?;
        let key = event.aggregate_id.to_string();
        let record = FutureRecord::to(&self.topic).payload(&json).key(&key);

        self.producer
            .send(record, Duration::from_secs(5))
            .await
            .map_err(|(e, _)| anyhow::anyhow!("Failed to publish event: {}", e))?;

        Ok(())
    }
}
