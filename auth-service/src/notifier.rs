use anyhow::Result;
use async_trait::async_trait;
use rdkafka::producer::{FutureProducer, FutureRecord};
use shared::NotificationRequest;
use std::time::Duration;
use tracing::debug;

/// Hands a delivery request to the email/SMS side channel.
#[async_trait]
pub trait OtpDelivery: Send + Sync {
    async fn deliver(&self, request: NotificationRequest) -> Result<()>;
}

pub struct KafkaNotifier {
    producer: FutureProducer,
    topic: String,
}

impl KafkaNotifier {
    pub fn new(producer: FutureProducer, topic: String) -> Self {
        Self { producer, topic }
    }
}

#[async_trait]
impl OtpDelivery for KafkaNotifier {
    async fn deliver(&self, request: NotificationRequest) -> Result<()> {
        let json = serde_json::to_string(&request)?;
        let key = request.id.to_string();
        let record = FutureRecord::to(&self.topic).payload(&json).key(&key);

        self.producer
            .send(record, Duration::from_secs(5))
            .await
            .map_err(|(e, _)| anyhow::anyhow!("Failed to publish notification: {}", e))?;

        debug!(notification_id = %request.id, channel = ?request.channel, "Notification queued");
        Ok(())
    }
}
