//! Client side of the task queues
//!
//! The gateway submits booking transactions through a [`SagaClient`]; a
//! [`Worker`](crate::Worker) claims the queue and drives each transaction.
//! Submitting waits for the terminal result.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot};

use crate::{
    BookingRequest, InMemoryDedupe, SagaError, TransactionIdStore, TransactionResult,
};

/// Connection settings of a [`SagaClient`]
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Namespace the client and its workers share
    pub namespace: String,
    /// Pending transactions buffered per task queue
    pub queue_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            queue_capacity: 1024,
        }
    }
}

/// One transaction handed to a worker
#[derive(Debug)]
pub struct WorkflowTask {
    /// Transaction input
    pub request: BookingRequest,
    /// Receives the terminal result
    pub reply: oneshot::Sender<TransactionResult>,
}

struct TaskQueue {
    sender: mpsc::Sender<WorkflowTask>,
    receiver: Option<mpsc::Receiver<WorkflowTask>>,
}

struct ClientInner {
    config: ClientConfig,
    queues: Mutex<HashMap<Box<str>, TaskQueue>>,
    dedupe: Arc<dyn TransactionIdStore>,
    connected: AtomicBool,
}

/// Handle shared by the gateway and workers
#[derive(Clone)]
pub struct SagaClient {
    inner: Arc<ClientInner>,
}

impl SagaClient {
    /// Connect with an in-memory transaction id store
    pub fn connect(config: ClientConfig) -> Result<Self, SagaError> {
        Self::connect_with_store(config, Arc::new(InMemoryDedupe::new()))
    }

    /// Connect with a caller-provided transaction id store
    pub fn connect_with_store(
        config: ClientConfig,
        dedupe: Arc<dyn TransactionIdStore>,
    ) -> Result<Self, SagaError> {
        tracing::info!(namespace = %config.namespace, "Saga client connected");
        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                queues: Mutex::new(HashMap::new()),
                dedupe,
                connected: AtomicBool::new(true),
            }),
        })
    }

    /// Namespace this client was connected to
    pub fn namespace(&self) -> &str {
        &self.inner.config.namespace
    }

    /// Whether [`SagaClient::disconnect`] has not been called
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Acquire)
    }

    /// Refuse new submissions and close every task queue. Workers finish the
    /// transactions already queued, then stop.
    pub fn disconnect(&self) {
        if self.inner.connected.swap(false, Ordering::AcqRel) {
            self.inner
                .queues
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clear();
            tracing::info!(namespace = %self.inner.config.namespace, "Saga client disconnected");
        }
    }

    /// Submit a booking transaction to `task_queue` and wait for its result.
    ///
    /// The traveler id is the transaction id; submitting the same id twice is
    /// rejected with [`SagaError::DuplicateTransaction`].
    pub async fn execute_transaction(
        &self,
        task_queue: &str,
        request: BookingRequest,
    ) -> Result<TransactionResult, SagaError> {
        if !self.is_connected() {
            return Err(SagaError::Disconnected);
        }
        request.validate()?;

        let transaction_id = request.transaction_id();
        if !self.inner.dedupe.check_and_mark(&transaction_id)? {
            return Err(SagaError::DuplicateTransaction(transaction_id));
        }

        let (reply, result) = oneshot::channel();

        tracing::debug!(
            transaction_id = %transaction_id,
            task_queue,
            "Submitting transaction"
        );

        // the sender clone must not outlive the send, or disconnect cannot close the queue
        let sent = self.sender(task_queue).send(WorkflowTask { request, reply }).await;
        if sent.is_err() {
            self.inner.dedupe.release(&transaction_id)?;
            return Err(SagaError::WorkerGone(transaction_id));
        }

        result
            .await
            .map_err(|_| SagaError::WorkerGone(transaction_id))
    }

    /// Take the receiving end of `task_queue`. Only one worker may poll a queue.
    pub(crate) fn claim_queue(
        &self,
        task_queue: &str,
    ) -> Result<mpsc::Receiver<WorkflowTask>, SagaError> {
        if !self.is_connected() {
            return Err(SagaError::Disconnected);
        }
        let mut queues = self.inner.queues.lock().unwrap_or_else(|e| e.into_inner());
        let queue = queues
            .entry(task_queue.into())
            .or_insert_with(|| self.new_queue());
        queue
            .receiver
            .take()
            .ok_or_else(|| SagaError::QueueAlreadyPolled(task_queue.into()))
    }

    fn sender(&self, task_queue: &str) -> mpsc::Sender<WorkflowTask> {
        let mut queues = self.inner.queues.lock().unwrap_or_else(|e| e.into_inner());
        queues
            .entry(task_queue.into())
            .or_insert_with(|| self.new_queue())
            .sender
            .clone()
    }

    fn new_queue(&self) -> TaskQueue {
        let (sender, receiver) = mpsc::channel(self.inner.config.queue_capacity.max(1));
        TaskQueue {
            sender,
            receiver: Some(receiver),
        }
    }
}

impl std::fmt::Debug for SagaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SagaClient")
            .field("namespace", &self.inner.config.namespace)
            .field("connected", &self.is_connected())
            .finish()
    }
}
