//! Export Queue
//!
//! Export jobs travel as JSON values keyed by file name. The Kafka transport
//! is used in deployment; the channel transport runs the same producer and
//! worker in-process for tests and single-node runs.
//!
//! Delivery is at-least-once. The worker commits a message only after the
//! job has been handed to a spawned task, so a crash between hand-off and
//! completion loses that job, and a crash before commit replays it.

use async_trait::async_trait;
use fleet_core::{ExportJob, FleetResult, TransferError};
use rdkafka::{
    config::ClientConfig,
    consumer::{CommitMode, Consumer, StreamConsumer},
    message::Message,
    producer::{FutureProducer, FutureRecord},
    Offset, TopicPartitionList,
};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::QueueConfig;

/// One message pulled off the export topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub topic: String,
    pub key: Option<String>,
    pub payload: Vec<u8>,
    pub partition: i32,
    pub offset: i64,
}

impl QueueMessage {
    /// Decode the payload as an export job.
    pub fn decode(&self) -> FleetResult<ExportJob> {
        ExportJob::from_json(&self.payload)
    }
}

// ============================================================================
// TRANSPORT SEAMS
// ============================================================================

/// Sending half of the export queue.
#[async_trait]
pub trait ExportPublisher: Send + Sync {
    /// Publish one value and wait for the broker acknowledgement.
    async fn publish(&self, key: &str, payload: Vec<u8>) -> FleetResult<()>;

    fn topic(&self) -> &str;
}

/// Receiving half of the export queue.
#[async_trait]
pub trait ExportSubscriber: Send {
    /// Next message, or `None` once the queue has ended.
    async fn next_message(&mut self) -> FleetResult<Option<QueueMessage>>;

    /// Mark the message and everything before it on its partition consumed.
    async fn commit(&mut self, message: &QueueMessage) -> FleetResult<()>;

    async fn close(&mut self) -> FleetResult<()>;
}

fn queue_error(reason: impl std::fmt::Display) -> TransferError {
    TransferError::Queue {
        reason: reason.to_string(),
    }
}

// ============================================================================
// PRODUCER
// ============================================================================

/// Validates export jobs and publishes them keyed by file name.
#[derive(Clone)]
pub struct ExportProducer {
    publisher: Arc<dyn ExportPublisher>,
}

impl ExportProducer {
    pub fn new(publisher: Arc<dyn ExportPublisher>) -> Self {
        Self { publisher }
    }

    pub fn topic(&self) -> &str {
        self.publisher.topic()
    }

    pub async fn submit(&self, job: &ExportJob) -> FleetResult<()> {
        job.validate()?;
        let payload = job.to_json()?;
        self.publisher.publish(job.file_name(), payload).await?;
        tracing::info!(
            user_id = job.user_id,
            file_name = %job.file_name(),
            topic = %self.publisher.topic(),
            "Queued export job"
        );
        Ok(())
    }
}

// ============================================================================
// KAFKA TRANSPORT
// ============================================================================

pub struct KafkaExportPublisher {
    producer: FutureProducer,
    topic: String,
    timeout: Duration,
}

impl KafkaExportPublisher {
    pub fn new(config: &QueueConfig) -> FleetResult<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("message.timeout.ms", config.timeout.as_millis().to_string())
            .set("acks", "all")
            .create()
            .map_err(|e| TransferError::PublishFailed {
                topic: config.export_topic.clone(),
                reason: format!("failed to create producer: {}", e),
            })?;
        tracing::info!(brokers = %config.brokers, topic = %config.export_topic, "Kafka export producer ready");
        Ok(Self {
            producer,
            topic: config.export_topic.clone(),
            timeout: config.timeout,
        })
    }
}

#[async_trait]
impl ExportPublisher for KafkaExportPublisher {
    async fn publish(&self, key: &str, payload: Vec<u8>) -> FleetResult<()> {
        let record = FutureRecord::to(&self.topic).key(key).payload(&payload);
        match self.producer.send(record, self.timeout).await {
            Ok(_) => Ok(()),
            Err((e, _)) => {
                tracing::error!(topic = %self.topic, key, error = %e, "Kafka publish failed");
                Err(TransferError::PublishFailed {
                    topic: self.topic.clone(),
                    reason: e.to_string(),
                }
                .into())
            }
        }
    }

    fn topic(&self) -> &str {
        &self.topic
    }
}

/// Consumer-group member with manual offset commits.
pub struct KafkaExportSubscriber {
    consumer: StreamConsumer,
}

impl KafkaExportSubscriber {
    pub fn new(config: &QueueConfig) -> FleetResult<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "10000")
            .create()
            .map_err(|e| queue_error(format!("failed to create consumer: {}", e)))?;
        consumer
            .subscribe(&[config.export_topic.as_str()])
            .map_err(queue_error)?;
        tracing::info!(
            brokers = %config.brokers,
            topic = %config.export_topic,
            group_id = %config.group_id,
            "Kafka export consumer subscribed"
        );
        Ok(Self { consumer })
    }
}

#[async_trait]
impl ExportSubscriber for KafkaExportSubscriber {
    async fn next_message(&mut self) -> FleetResult<Option<QueueMessage>> {
        let msg = self.consumer.recv().await.map_err(queue_error)?;
        Ok(Some(QueueMessage {
            topic: msg.topic().to_string(),
            key: msg.key().map(|k| String::from_utf8_lossy(k).into_owned()),
            payload: msg.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            partition: msg.partition(),
            offset: msg.offset(),
        }))
    }

    async fn commit(&mut self, message: &QueueMessage) -> FleetResult<()> {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(
            &message.topic,
            message.partition,
            Offset::Offset(message.offset + 1),
        )
        .map_err(queue_error)?;
        self.consumer
            .commit(&tpl, CommitMode::Async)
            .map_err(queue_error)?;
        Ok(())
    }

    async fn close(&mut self) -> FleetResult<()> {
        self.consumer.unsubscribe();
        Ok(())
    }
}

// ============================================================================
// CHANNEL TRANSPORT
// ============================================================================

/// Offsets committed through a [`ChannelExportReceiver`], shared with tests.
#[derive(Debug, Clone, Default)]
pub struct CommitLog {
    offsets: Arc<Mutex<Vec<i64>>>,
}

impl CommitLog {
    pub fn offsets(&self) -> Vec<i64> {
        self.offsets.lock().map(|o| o.clone()).unwrap_or_default()
    }

    fn push(&self, offset: i64) {
        if let Ok(mut offsets) = self.offsets.lock() {
            offsets.push(offset);
        }
    }
}

/// In-process export queue over a bounded tokio channel.
#[derive(Clone)]
pub struct ChannelExportQueue {
    topic: String,
    sender: mpsc::Sender<QueueMessage>,
    next_offset: Arc<AtomicI64>,
}

pub struct ChannelExportReceiver {
    receiver: mpsc::Receiver<QueueMessage>,
    commits: CommitLog,
}

impl ChannelExportQueue {
    pub fn new(topic: impl Into<String>, capacity: usize) -> (Self, ChannelExportReceiver) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let queue = Self {
            topic: topic.into(),
            sender,
            next_offset: Arc::new(AtomicI64::new(0)),
        };
        let receiver = ChannelExportReceiver {
            receiver,
            commits: CommitLog::default(),
        };
        (queue, receiver)
    }
}

#[async_trait]
impl ExportPublisher for ChannelExportQueue {
    async fn publish(&self, key: &str, payload: Vec<u8>) -> FleetResult<()> {
        let message = QueueMessage {
            topic: self.topic.clone(),
            key: Some(key.to_string()),
            payload,
            partition: 0,
            offset: self.next_offset.fetch_add(1, Ordering::SeqCst),
        };
        self.sender
            .send(message)
            .await
            .map_err(|_| TransferError::PublishFailed {
                topic: self.topic.clone(),
                reason: "receiver dropped".to_string(),
            })?;
        Ok(())
    }

    fn topic(&self) -> &str {
        &self.topic
    }
}

impl ChannelExportReceiver {
    pub fn commits(&self) -> CommitLog {
        self.commits.clone()
    }
}

#[async_trait]
impl ExportSubscriber for ChannelExportReceiver {
    async fn next_message(&mut self) -> FleetResult<Option<QueueMessage>> {
        Ok(self.receiver.recv().await)
    }

    async fn commit(&mut self, message: &QueueMessage) -> FleetResult<()> {
        self.commits.push(message.offset);
        Ok(())
    }

    async fn close(&mut self) -> FleetResult<()> {
        self.receiver.close();
        Ok(())
    }
}
