//! In-process job queue for webhook delivery.
//!
//! An unbounded mpsc channel feeds a fixed pool of worker tasks.
//! Enqueueing never blocks the request that triggered the event, and
//! delayed redelivery is a detached timer task re-sending the job -
//! backoff never holds a worker idle.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{Mutex, mpsc};

use crate::webhooks::delivery::{DeliveryJob, process_delivery};

#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::UnboundedSender<DeliveryJob>,
}

impl JobQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DeliveryJob>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Schedule a job for immediate pickup. A closed queue (shutdown)
    /// drops the job with an error log - delivery is best-effort.
    pub fn enqueue(&self, job: DeliveryJob) {
        if self.tx.send(job).is_err() {
            tracing::error!("job queue closed; dropping delivery job");
        }
    }

    /// Schedule a job after a delay (retry backoff).
    pub fn enqueue_after(&self, job: DeliveryJob, delay: Duration) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(job).is_err() {
                tracing::error!("job queue closed; dropping delayed delivery job");
            }
        });
    }
}

/// Spawn the delivery worker pool. Each worker pulls jobs off the shared
/// receiver; a delivery attempt blocks only that worker.
pub fn spawn_delivery_workers(
    queue: JobQueue,
    rx: mpsc::UnboundedReceiver<DeliveryJob>,
    client: reqwest::Client,
    count: usize,
) {
    let rx = Arc::new(Mutex::new(rx));
    for worker in 0..count.max(1) {
        let rx = Arc::clone(&rx);
        let client = client.clone();
        let queue = queue.clone();
        tokio::spawn(async move {
            tracing::debug!("delivery worker {} started", worker);
            loop {
                let job = {
                    let mut rx = rx.lock().await;
                    rx.recv().await
                };
                let Some(job) = job else {
                    tracing::debug!("delivery worker {} stopping: queue closed", worker);
                    break;
                };
                // A panicking job must not take the worker down with it.
                let subscription_id = job.subscription_id.clone();
                if AssertUnwindSafe(process_delivery(&client, &queue, job))
                    .catch_unwind()
                    .await
                    .is_err()
                {
                    tracing::error!(
                        subscription_id = %subscription_id,
                        "delivery task panicked; job dropped"
                    );
                }
            }
        });
    }
}
