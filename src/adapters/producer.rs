//! Kafka message producer.
//!
//! # Responsibilities
//! - Create an `acks=all` producer for the configured topic
//! - Optionally prove the brokers answer by fetching topic metadata
//! - Flush in-flight messages on release
//!
//! # Design Decisions
//! - librdkafka calls that block (metadata, flush) run on the blocking pool
//! - A producer that was created but failed verification is returned with
//!   its release, so its client threads are shut down

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::error::KafkaError;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use thiserror::Error;

use crate::adapters::{Acquisition, ResourceAdapter, RELEASE_GRACE};
use crate::config::KafkaConfig;
use crate::lifecycle::error::BoxError;
use crate::lifecycle::handle::Resources;
use crate::lifecycle::registry::Release;

const MAX_METADATA_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ProducerError {
    #[error("cannot create producer for {brokers}: {source}")]
    Create {
        brokers: String,
        #[source]
        source: KafkaError,
    },

    #[error("brokers did not return metadata for topic '{topic}': {source}")]
    Metadata {
        topic: String,
        #[source]
        source: KafkaError,
    },

    #[error("delivery failed: {0}")]
    Delivery(#[source] KafkaError),

    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Producer bound to the configured topic.
#[derive(Clone)]
pub struct MessageProducer {
    producer: FutureProducer,
    topic: String,
    queue_timeout: Duration,
}

impl MessageProducer {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publish one message; resolves to `(partition, offset)` once delivered.
    pub async fn send(
        &self,
        key: Option<&[u8]>,
        payload: &[u8],
    ) -> Result<(i32, i64), ProducerError> {
        let mut record = FutureRecord::<[u8], [u8]>::to(&self.topic).payload(payload);
        if let Some(key) = key {
            record = record.key(key);
        }
        self.producer
            .send(record, Timeout::After(self.queue_timeout))
            .await
            .map_err(|(e, _)| ProducerError::Delivery(e))
    }
}

impl std::fmt::Debug for MessageProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageProducer")
            .field("topic", &self.topic)
            .finish()
    }
}

pub struct ProducerAdapter {
    config: KafkaConfig,
}

impl ProducerAdapter {
    pub fn new(config: KafkaConfig) -> Self {
        Self { config }
    }

    fn message_timeout(&self) -> Duration {
        Duration::from_millis(self.config.producer.message_timeout_ms)
    }

    fn create(&self) -> Result<FutureProducer, ProducerError> {
        let brokers = self.config.bootstrap_servers();
        ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("acks", "all")
            .set(
                "message.timeout.ms",
                self.config.producer.message_timeout_ms.to_string(),
            )
            .create()
            .map_err(|source| ProducerError::Create { brokers, source })
    }

    async fn verify(&self, producer: FutureProducer) -> Result<(), ProducerError> {
        let topic = self.config.topic.clone();
        let timeout = self.message_timeout().min(MAX_METADATA_TIMEOUT);

        tokio::task::spawn_blocking(move || {
            producer
                .client()
                .fetch_metadata(Some(topic.as_str()), Timeout::After(timeout))
                .map(|_| ())
                .map_err(|source| ProducerError::Metadata { topic, source })
        })
        .await?
    }

    fn release(&self, producer: FutureProducer) -> Release {
        let deadline = self.config.producer.close_timeout();
        Release::new(self.name(), move || async move {
            tokio::task::spawn_blocking(move || producer.flush(Timeout::After(deadline)))
                .await
                .map_err(|e| Box::new(e) as BoxError)?
                .map_err(|e| Box::new(e) as BoxError)
        })
        .with_timeout(deadline + RELEASE_GRACE)
    }
}

#[async_trait]
impl ResourceAdapter for ProducerAdapter {
    type Resource = MessageProducer;

    fn name(&self) -> &str {
        "producer"
    }

    async fn construct(&self, _resources: &Resources) -> Acquisition<MessageProducer> {
        let producer = match self.create() {
            Ok(producer) => producer,
            Err(e) => return Acquisition::failed(e),
        };
        let release = self.release(producer.clone());

        if self.config.producer.verify_on_start {
            if let Err(e) = self.verify(producer.clone()).await {
                return Acquisition::partial(e, release);
            }
        }

        tracing::info!(
            brokers = %self.config.bootstrap_servers(),
            topic = %self.config.topic,
            "Kafka producer ready"
        );
        Acquisition::ready(
            MessageProducer {
                producer,
                topic: self.config.topic.clone(),
                queue_timeout: self.message_timeout(),
            },
            release,
        )
    }
}
