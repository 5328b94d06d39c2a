//! Kafka consumer with a background poll loop.
//!
//! # Data Flow
//! ```text
//! brokers → StreamConsumer::recv (poll loop task)
//!     → ConsumedMessage (owned copy)
//!     → broadcast channel → every MessageConsumer::subscribe() receiver
//! ```
//!
//! # Design Decisions
//! - Messages are fanned out; a lagging subscriber drops old messages
//!   instead of stalling the poll loop
//! - The release stops the loop, then closes the consumer off the async
//!   runtime, all within the close timeout

use std::sync::Arc;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::Message;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::adapters::{stop_task, Acquisition, ResourceAdapter, RELEASE_GRACE};
use crate::config::KafkaConfig;
use crate::lifecycle::error::BoxError;
use crate::lifecycle::handle::Resources;
use crate::lifecycle::registry::Release;
use crate::lifecycle::shutdown::{Shutdown, ShutdownListener};

#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("cannot create consumer for {brokers}: {source}")]
    Create {
        brokers: String,
        #[source]
        source: KafkaError,
    },

    #[error("cannot subscribe to '{topic}': {source}")]
    Subscribe {
        topic: String,
        #[source]
        source: KafkaError,
    },
}

/// Owned copy of a received message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumedMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub payload: Option<Vec<u8>>,
}

/// Subscription point for messages read by the poll loop.
#[derive(Debug)]
pub struct MessageConsumer {
    messages: broadcast::Sender<ConsumedMessage>,
    topic: String,
    group_id: String,
}

impl MessageConsumer {
    pub fn subscribe(&self) -> broadcast::Receiver<ConsumedMessage> {
        self.messages.subscribe()
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }
}

pub struct ConsumerAdapter {
    config: KafkaConfig,
}

impl ConsumerAdapter {
    pub fn new(config: KafkaConfig) -> Self {
        Self { config }
    }

    fn create(&self) -> Result<StreamConsumer, ConsumerError> {
        let brokers = self.config.bootstrap_servers();
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("group.id", &self.config.group_id)
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", &self.config.consumer.auto_offset_reset)
            .create()
            .map_err(|source| ConsumerError::Create { brokers, source })?;

        consumer
            .subscribe(&[self.config.topic.as_str()])
            .map_err(|source| ConsumerError::Subscribe {
                topic: self.config.topic.clone(),
                source,
            })?;
        Ok(consumer)
    }
}

async fn poll_loop(
    consumer: Arc<StreamConsumer>,
    messages: broadcast::Sender<ConsumedMessage>,
    stop: ShutdownListener,
) -> Result<(), BoxError> {
    let stop = stop.wait();
    tokio::pin!(stop);

    loop {
        tokio::select! {
            _ = &mut stop => break,
            received = consumer.recv() => match received {
                Ok(message) => {
                    let owned = ConsumedMessage {
                        topic: message.topic().to_string(),
                        partition: message.partition(),
                        offset: message.offset(),
                        key: message.key().map(<[u8]>::to_vec),
                        payload: message.payload().map(<[u8]>::to_vec),
                    };
                    // No subscribers yet is not an error.
                    let _ = messages.send(owned);
                }
                Err(e) => tracing::warn!(error = %e, "Kafka consumer poll error"),
            }
        }
    }

    tracing::debug!("Kafka poll loop stopped, closing consumer");
    consumer.unsubscribe();
    tokio::task::spawn_blocking(move || drop(consumer)).await?;
    Ok(())
}

#[async_trait]
impl ResourceAdapter for ConsumerAdapter {
    type Resource = MessageConsumer;

    fn name(&self) -> &str {
        "consumer"
    }

    async fn construct(&self, _resources: &Resources) -> Acquisition<MessageConsumer> {
        let consumer = match self.create() {
            Ok(consumer) => Arc::new(consumer),
            Err(e) => return Acquisition::failed(e),
        };

        let (messages, _) = broadcast::channel(self.config.consumer.channel_capacity);
        let shutdown = Shutdown::new();
        let task = tokio::spawn(poll_loop(consumer, messages.clone(), shutdown.subscribe()));

        tracing::info!(
            brokers = %self.config.bootstrap_servers(),
            topic = %self.config.topic,
            group_id = %self.config.group_id,
            "Kafka consumer subscribed"
        );

        let deadline = self.config.consumer.close_timeout();
        let release = Release::new(self.name(), move || stop_task(shutdown, task, deadline))
            .with_timeout(deadline + RELEASE_GRACE);

        Acquisition::ready(
            MessageConsumer {
                messages,
                topic: self.config.topic.clone(),
                group_id: self.config.group_id.clone(),
            },
            release,
        )
    }
}
