//! Kafka consumer for content-lifecycle events
//!
//! Subscribes to one topic per event subject (`{prefix}.{subject}`), decodes
//! each message and hands it to the fan-out processor. Records are applied
//! one at a time in the order they are received, and a record's offset is
//! committed only after its handler has finished, so a crash replays it
//! instead of skipping it. Handler failures are logged and the offset still
//! advances; fan-out is best-effort.

use futures::StreamExt;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::{ClientConfig, Offset, TopicPartitionList};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::KafkaConfig;
use crate::error::{AppError, Result};
use crate::models::events::{subject_from_topic, topic_for};
use crate::models::FeedEvent;
use crate::services::FanOutProcessor;

#[derive(Clone, Debug)]
pub struct LifecycleEventConsumerConfig {
    pub brokers: String,
    pub group_id: String,
    pub topic_prefix: String,
}

impl From<&KafkaConfig> for LifecycleEventConsumerConfig {
    fn from(config: &KafkaConfig) -> Self {
        Self {
            brokers: config.brokers.clone(),
            group_id: config.group_id.clone(),
            topic_prefix: config.topic_prefix.clone(),
        }
    }
}

impl LifecycleEventConsumerConfig {
    pub fn topics(&self) -> Vec<String> {
        FeedEvent::SUBJECTS
            .iter()
            .map(|subject| topic_for(&self.topic_prefix, subject))
            .collect()
    }
}

pub struct LifecycleEventConsumer {
    consumer: StreamConsumer,
    processor: Arc<FanOutProcessor>,
    config: LifecycleEventConsumerConfig,
    shutdown_rx: watch::Receiver<bool>,
}

impl LifecycleEventConsumer {
    pub fn new(
        config: LifecycleEventConsumerConfig,
        processor: Arc<FanOutProcessor>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "false") // committed after each handler completes
            .set("auto.offset.reset", "latest")
            .set("enable.partition.eof", "false")
            .set("session.timeout.ms", "45000")
            .set("max.poll.interval.ms", "300000")
            .create()
            .map_err(|e| AppError::Internal(format!("Failed to create Kafka consumer: {e}")))?;

        let topics = config.topics();
        let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
        consumer
            .subscribe(&topic_refs)
            .map_err(|e| AppError::Internal(format!("Failed to subscribe to topics: {e}")))?;

        info!(
            brokers = %config.brokers,
            group_id = %config.group_id,
            topics = ?topics,
            "Lifecycle event consumer initialized"
        );

        Ok(Self {
            consumer,
            processor,
            config,
            shutdown_rx,
        })
    }

    /// Run until the shutdown signal fires. A record already being handled
    /// is finished and committed before the loop exits.
    pub async fn run(mut self) {
        info!("Starting lifecycle event consumer loop");

        let mut message_stream = self.consumer.stream();

        loop {
            tokio::select! {
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping lifecycle consumer");
                        break;
                    }
                }

                message = message_stream.next() => {
                    match message {
                        Some(Ok(msg)) => {
                            let topic = msg.topic().to_string();
                            let partition = msg.partition();
                            let offset = msg.offset();
                            let payload = msg.payload().map(<[u8]>::to_vec);
                            drop(msg);

                            apply_record(
                                &self.processor,
                                &self.config.topic_prefix,
                                &topic,
                                payload.as_deref(),
                            )
                            .await;
                            commit_offset(&self.consumer, &topic, partition, offset);
                        }
                        Some(Err(e)) => {
                            error!(error = %e, "Kafka consumer error");
                        }
                        None => {
                            warn!("Message stream ended unexpectedly");
                            break;
                        }
                    }
                }
            }
        }

        info!("Lifecycle event consumer stopped");
    }
}

/// Decode one record and apply it to completion. Undecodable records and
/// handler failures are logged and skipped.
pub async fn apply_record(
    processor: &FanOutProcessor,
    prefix: &str,
    topic: &str,
    payload: Option<&[u8]>,
) {
    let Some(event) = decode_message(prefix, topic, payload) else {
        return;
    };
    if let Err(e) = processor.handle(&event).await {
        error!(subject = event.subject(), error = %e, "Failed to handle lifecycle event");
    }
}

fn commit_offset(consumer: &StreamConsumer, topic: &str, partition: i32, offset: i64) {
    let mut tpl = TopicPartitionList::new();
    if let Err(e) = tpl.add_partition_offset(topic, partition, Offset::Offset(offset + 1)) {
        warn!(topic, partition, offset, error = %e, "Failed to build offset commit");
        return;
    }
    if let Err(e) = consumer.commit(&tpl, CommitMode::Async) {
        warn!(topic, partition, offset, error = %e, "Failed to commit offset");
    }
}

/// Map a raw Kafka record to an event. Records on unknown topics, with an
/// empty payload, or with an undecodable body are logged and dropped.
pub fn decode_message(prefix: &str, topic: &str, payload: Option<&[u8]>) -> Option<FeedEvent> {
    let Some(subject) = subject_from_topic(prefix, topic) else {
        debug!(topic, "Ignoring message on unrelated topic");
        return None;
    };
    let Some(payload) = payload else {
        debug!(topic, "Received Kafka message with empty payload");
        return None;
    };

    match FeedEvent::decode(subject, payload) {
        Ok(Some(event)) => Some(event),
        Ok(None) => {
            debug!(subject, "Ignoring unknown event subject");
            None
        }
        Err(e) => {
            warn!(subject, error = %e, "Dropping malformed lifecycle event");
            None
        }
    }
}
