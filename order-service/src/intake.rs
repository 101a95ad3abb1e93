//! Asynchronous order intake.
//!
//! Submissions are published to a Kafka topic and acknowledged right away;
//! [`IntakeWorker`] drains the topic and runs pricing plus the transactional
//! writer off the request path. Delivery is at-least-once, so every job is
//! checked against its public id and idempotency key before it is applied.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::Message;
use serde::Serialize;
use shared::OrderJob;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{OrderError, OrderResult};
use crate::idempotency;
use crate::models::StoredOrder;
use crate::pricing;
use crate::store::OrderStore;
use crate::writer::{self, CreateOrderCommand};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JobHandle {
    pub partition: i32,
    pub offset: i64,
}

#[async_trait]
pub trait WorkQueue: Send + Sync {
    async fn enqueue(&self, job: &OrderJob) -> OrderResult<JobHandle>;
}

pub struct KafkaQueue {
    producer: FutureProducer,
    topic: String,
}

impl KafkaQueue {
    pub fn new(producer: FutureProducer, topic: String) -> Self {
        Self { producer, topic }
    }
}

#[async_trait]
impl WorkQueue for KafkaQueue {
    async fn enqueue(&self, job: &OrderJob) -> OrderResult<JobHandle> {
        let json = serde_json::to_string(job)?;
        let key = job.public_id.to_string();
        let record = FutureRecord::to(&self.topic).payload(&json).key(&key);

        let (partition, offset) = self
            .producer
            .send(record, Duration::from_secs(5))
            .await
            .map_err(|(e, _)| OrderError::from(e))?;

        Ok(JobHandle { partition, offset })
    }
}

/// Applies one intake job. `None` means the job was already applied, either
/// by an earlier delivery of the same job or by another submission carrying
/// the same idempotency key.
pub async fn process_job(store: &dyn OrderStore, job: &OrderJob) -> OrderResult<Option<StoredOrder>> {
    if store.order(job.public_id).await?.is_some() {
        return Ok(None);
    }
    if idempotency::lookup(store, job.idempotency_key.as_deref()).await?.is_some() {
        return Ok(None);
    }

    pricing::validate_request(&job.request)?;
    let priced = pricing::price_order(store, job.request.branch_id, &job.request.items).await?;

    let stored = writer::create_order(
        store,
        CreateOrderCommand {
            public_id: job.public_id,
            customer_id: job.customer_id,
            branch_id: priced.branch.branch_id,
            delivery_address: job.request.delivery_address.clone(),
            ready_interval_minutes: priced.ready_interval_minutes,
            total: priced.total,
            lines: priced.lines,
            idempotency_key: job.idempotency_key.clone(),
        },
    )
    .await?;

    Ok(Some(stored))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Created(Uuid),
    AlreadyApplied(Uuid),
    Requeued { attempt: u32 },
    Dropped(String),
}

pub struct IntakeWorker {
    store: Arc<dyn OrderStore>,
    queue: Arc<dyn WorkQueue>,
    max_attempts: u32,
    backoff: Duration,
}

impl IntakeWorker {
    pub fn new(
        store: Arc<dyn OrderStore>,
        queue: Arc<dyn WorkQueue>,
        max_attempts: u32,
        backoff: Duration,
    ) -> Self {
        Self {
            store,
            queue,
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub async fn run(&self, consumer: StreamConsumer) {
        let mut message_stream = consumer.stream();

        while let Some(message) = message_stream.next().await {
            match message {
                Ok(m) => {
                    match m.payload_view::<str>() {
                        Some(Ok(json_str)) => match serde_json::from_str::<OrderJob>(json_str) {
                            Ok(job) => {
                                self.handle(job).await;
                            }
                            Err(e) => error!("Discarding malformed intake job: {}", e),
                        },
                        Some(Err(e)) => error!("Error parsing intake payload: {}", e),
                        None => warn!("Empty intake message at offset {}", m.offset()),
                    }
                    if let Err(e) = consumer.commit_message(&m, CommitMode::Async) {
                        error!("Error committing intake message: {}", e);
                    }
                }
                Err(e) => error!("Error receiving intake message: {}", e),
            }
        }
    }

    pub async fn handle(&self, job: OrderJob) -> JobOutcome {
        match process_job(self.store.as_ref(), &job).await {
            Ok(Some(stored)) => JobOutcome::Created(stored.order.public_id),
            Ok(None) | Err(OrderError::Duplicate(_)) | Err(OrderError::Conflict(_)) => {
                info!("Intake job for order {} was already applied", job.public_id);
                JobOutcome::AlreadyApplied(job.public_id)
            }
            Err(e) if e.is_transient() => self.retry(job, e).await,
            Err(e) => {
                error!("Order {} rejected by intake worker: {}", job.public_id, e);
                JobOutcome::Dropped(e.to_string())
            }
        }
    }

    /// Re-publishes a failed job after `backoff × attempt`. The delay runs on
    /// its own task so the drain loop keeps consuming other messages.
    async fn retry(&self, job: OrderJob, cause: OrderError) -> JobOutcome {
        let attempt = job.attempt + 1;
        if attempt >= self.max_attempts {
            error!(
                "Order {} dropped after {} attempts: {}",
                job.public_id, attempt, cause
            );
            return JobOutcome::Dropped(cause.to_string());
        }

        warn!(
            "Order {} failed on attempt {}, retrying: {}",
            job.public_id, attempt, cause
        );
        let delay = self.backoff * attempt;
        let retried = job.retry();

        if delay.is_zero() {
            return match requeue(self.queue.as_ref(), &retried).await {
                Ok(()) => JobOutcome::Requeued { attempt },
                Err(e) => JobOutcome::Dropped(e.to_string()),
            };
        }

        let queue = self.queue.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = requeue(queue.as_ref(), &retried).await;
        });
        JobOutcome::Requeued { attempt }
    }
}

async fn requeue(queue: &dyn WorkQueue, job: &OrderJob) -> OrderResult<()> {
    queue.enqueue(job).await.map(|_| ()).map_err(|e| {
        error!("Failed to requeue order {}: {}", job.public_id, e);
        e
    })
}
