//! Task queue worker
//!
//! Polls one task queue and drives each transaction through a
//! [`BookingSaga`]. On start, transactions left unfinished in the journal
//! are resumed before new work is accepted.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

use crate::booking::steps::ALL_ACTIVITIES;
use crate::recovery::recover_transactions;
use crate::{BookingSaga, SagaClient, SagaError, TaskExecutor, WorkflowTask};

/// Drives the transactions submitted to one task queue
pub struct Worker<E: TaskExecutor + ?Sized> {
    task_queue: Box<str>,
    tasks: mpsc::Receiver<WorkflowTask>,
    saga: Arc<BookingSaga<E>>,
    max_concurrent: usize,
}

impl<E: TaskExecutor + ?Sized> Worker<E> {
    /// Claim `task_queue` for `saga`. Fails if any booking activity is
    /// missing from the executor or the queue already has a worker.
    pub fn new(
        client: &SagaClient,
        task_queue: &str,
        saga: Arc<BookingSaga<E>>,
    ) -> Result<Self, SagaError> {
        if let Some(missing) = ALL_ACTIVITIES
            .iter()
            .find(|a| !saga.executor().has_activity(a))
        {
            return Err(SagaError::ActivityNotRegistered((*missing).into()));
        }

        let tasks = client.claim_queue(task_queue)?;
        let max_concurrent = saga.config().max_concurrent_transactions;
        Ok(Self {
            task_queue: task_queue.into(),
            tasks,
            saga,
            max_concurrent,
        })
    }

    /// Cap concurrent transactions (at least 1)
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// Queue this worker polls
    pub fn task_queue(&self) -> &str {
        &self.task_queue
    }

    /// Poll until `shutdown` resolves or the queue is closed, then wait for
    /// in-flight transactions to finish.
    ///
    /// A closed queue is drained first. Transactions still queued when
    /// `shutdown` resolves are refused and their callers see
    /// [`SagaError::WorkerGone`].
    pub async fn run<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        let permits = Arc::new(Semaphore::new(self.max_concurrent));
        let mut running = JoinSet::new();

        Self::resume_unfinished(&self.saga, &permits, &mut running).await;

        tracing::info!(
            task_queue = %self.task_queue,
            max_concurrent = self.max_concurrent,
            "Worker polling task queue"
        );

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!(task_queue = %self.task_queue, "Worker shutting down");
                    break;
                }
                task = self.tasks.recv() => {
                    let Some(task) = task else {
                        tracing::info!(task_queue = %self.task_queue, "Task queue closed");
                        break;
                    };
                    let permit = tokio::select! {
                        permit = permits.clone().acquire_owned() => permit,
                        _ = &mut shutdown => {
                            tracing::info!(task_queue = %self.task_queue, "Worker shutting down");
                            refuse(task);
                            break;
                        }
                    };
                    let Ok(permit) = permit else {
                        refuse(task);
                        break;
                    };
                    let saga = self.saga.clone();
                    running.spawn(async move {
                        let transaction_id = task.request.transaction_id();
                        let result = saga.run(task.request).await;
                        if task.reply.send(result).is_err() {
                            tracing::debug!(
                                transaction_id = %transaction_id,
                                "Caller stopped waiting for transaction result"
                            );
                        }
                        drop(permit);
                    });
                }
                Some(joined) = running.join_next(), if !running.is_empty() => {
                    log_join_error(joined);
                }
            }
        }

        self.tasks.close();
        while let Some(task) = self.tasks.recv().await {
            refuse(task);
        }

        while let Some(joined) = running.join_next().await {
            log_join_error(joined);
        }
    }

    async fn resume_unfinished(
        saga: &Arc<BookingSaga<E>>,
        permits: &Arc<Semaphore>,
        running: &mut JoinSet<()>,
    ) {
        let points = match recover_transactions(saga.journal().as_ref()) {
            Ok(points) => points,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read journal for recovery");
                return;
            }
        };
        if points.is_empty() {
            return;
        }

        tracing::info!(count = points.len(), "Resuming unfinished transactions");
        for point in points {
            let Ok(permit) = permits.clone().acquire_owned().await else {
                return;
            };
            let saga = saga.clone();
            running.spawn(async move {
                let transaction_id = point.transaction_id.clone();
                let result = saga.resume(point).await;
                tracing::info!(
                    transaction_id = %transaction_id,
                    result = %result.message(),
                    "Recovered transaction finished"
                );
                drop(permit);
            });
        }
    }
}

/// Drop a task without running it; the caller's reply channel closes
fn refuse(task: WorkflowTask) {
    tracing::warn!(
        transaction_id = %task.request.transaction_id(),
        "Refusing queued transaction during shutdown"
    );
}

fn log_join_error(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        tracing::error!(error = %e, "Transaction task failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::{
        register_booking_activities, ActivityRegistry, BookingRequest, ClientConfig, LocalExecutor,
        SagaConfig, SimulatedServices, TransactionResult,
    };

    fn saga(latency: Duration) -> Arc<BookingSaga<LocalExecutor>> {
        let mut registry = ActivityRegistry::new();
        register_booking_activities(&mut registry, SimulatedServices::new().with_latency(latency));
        Arc::new(BookingSaga::new(
            Arc::new(LocalExecutor::new(registry)),
            SagaConfig::default(),
        ))
    }

    fn request(traveler: &str) -> BookingRequest {
        BookingRequest::new(traveler, "C1", "H1", "F1", 1).unwrap()
    }

    #[test]
    fn test_worker_requires_every_activity() {
        let client = SagaClient::connect(ClientConfig::default()).unwrap();
        let executor = Arc::new(LocalExecutor::new(ActivityRegistry::new()));
        let saga = Arc::new(BookingSaga::new(executor, SagaConfig::default()));

        assert!(matches!(
            Worker::new(&client, "bookings", saga),
            Err(SagaError::ActivityNotRegistered(name)) if &*name == "reserve_car"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_drains_queued_transactions() {
        let client = SagaClient::connect(ClientConfig::default()).unwrap();
        let worker = Worker::new(&client, "bookings", saga(Duration::ZERO)).unwrap();

        let submitter = client.clone();
        let pending = tokio::spawn(async move {
            submitter
                .execute_transaction("bookings", request("jane-123456"))
                .await
        });
        tokio::time::sleep(Duration::from_millis(1)).await;
        client.disconnect();

        // returns once the closed queue is empty
        worker.run(std::future::pending()).await;

        assert!(matches!(
            pending.await.unwrap(),
            Ok(TransactionResult::Success { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_at_capacity_refuses_waiting_transactions() {
        let client = SagaClient::connect(ClientConfig::default()).unwrap();
        // each transaction takes 15s of virtual time
        let worker = Worker::new(&client, "bookings", saga(Duration::from_secs(5)))
            .unwrap()
            .with_max_concurrent(1);
        let handle = tokio::spawn(worker.run(tokio::time::sleep(Duration::from_secs(1))));

        let submit = |traveler: &'static str| {
            let client = client.clone();
            tokio::spawn(async move {
                client
                    .execute_transaction("bookings", request(traveler))
                    .await
            })
        };
        let first = submit("jane-111111");
        let second = submit("john-222222");

        handle.await.unwrap();
        let results = [first.await.unwrap(), second.await.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(SagaError::WorkerGone(_))))
                .count(),
            1
        );
    }
}
