//! Runtime configuration

use std::net::SocketAddr;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::activity::DEFAULT_START_TO_CLOSE_TIMEOUT;
use crate::{RetryPolicy, RollbackReporting};

/// Task queue polled by the booking worker
pub const DEFAULT_TASK_QUEUE: &str = "saga-task-queue";

/// Coordinator configuration
#[derive(Debug, Clone)]
pub struct SagaConfig {
    /// Task queue the worker polls
    pub task_queue: String,
    /// Start-to-close timeout of every forward attempt
    pub step_timeout: Duration,
    /// Start-to-close timeout of every compensation call
    pub compensation_timeout: Duration,
    /// Constant interval between flight attempts
    pub flight_retry_interval: Duration,
    /// Policy of the car and hotel steps
    pub default_retry_policy: RetryPolicy,
    /// How rollbacks are reported to the caller
    pub rollback_reporting: RollbackReporting,
    /// Maximum transactions a worker drives at once
    pub max_concurrent_transactions: usize,
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            task_queue: DEFAULT_TASK_QUEUE.to_string(),
            step_timeout: DEFAULT_START_TO_CLOSE_TIMEOUT,
            compensation_timeout: DEFAULT_START_TO_CLOSE_TIMEOUT,
            flight_retry_interval: Duration::from_secs(1),
            default_retry_policy: RetryPolicy::default(),
            rollback_reporting: RollbackReporting::Lenient,
            max_concurrent_transactions: 64,
        }
    }
}

impl SagaConfig {
    /// Default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the task queue
    pub fn with_task_queue(mut self, task_queue: impl Into<String>) -> Self {
        self.task_queue = task_queue.into();
        self
    }

    /// Set the per-attempt timeout of forward steps
    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    /// Set the timeout of every compensation
    pub fn with_compensation_timeout(mut self, timeout: Duration) -> Self {
        self.compensation_timeout = timeout;
        self
    }

    /// Set the constant delay between flight attempts
    pub fn with_flight_retry_interval(mut self, interval: Duration) -> Self {
        self.flight_retry_interval = interval;
        self
    }

    /// Set the policy of the car and hotel steps
    pub fn with_default_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.default_retry_policy = policy;
        self
    }

    /// Choose how rollbacks are reported
    pub fn with_rollback_reporting(mut self, reporting: RollbackReporting) -> Self {
        self.rollback_reporting = reporting;
        self
    }

    /// Cap concurrent transactions per worker (at least 1)
    pub fn with_max_concurrent_transactions(mut self, n: usize) -> Self {
        self.max_concurrent_transactions = n.max(1);
        self
    }
}

/// Command-line spelling of [`RollbackReporting`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportingMode {
    /// Report every rollback as cancelled
    Lenient,
    /// Report the failure that caused the rollback
    Strict,
}

impl From<ReportingMode> for RollbackReporting {
    fn from(mode: ReportingMode) -> Self {
        match mode {
            ReportingMode::Lenient => RollbackReporting::Lenient,
            ReportingMode::Strict => RollbackReporting::Strict,
        }
    }
}

/// Vacation booking gateway and worker
#[derive(Debug, Parser)]
#[command(name = "vacation-saga", version, about)]
pub struct CliArgs {
    /// Address the HTTP gateway listens on
    #[arg(long, env = "SAGA_LISTEN", default_value = "0.0.0.0:3002")]
    pub listen: SocketAddr,

    /// Task queue shared by the gateway and the worker
    #[arg(long, env = "SAGA_TASK_QUEUE", default_value = DEFAULT_TASK_QUEUE)]
    pub task_queue: String,

    /// Report rollbacks as `cancelled` (lenient) or with the failure detail (strict)
    #[arg(long, env = "SAGA_ROLLBACK_REPORTING", value_enum, default_value_t = ReportingMode::Lenient)]
    pub rollback_reporting: ReportingMode,

    /// Attempts the simulated flight service fails before it recovers
    #[arg(long, env = "SAGA_FLIGHT_FAILURES", default_value_t = 0)]
    pub flight_failures: u32,

    /// Maximum transactions the worker drives at once
    #[arg(long, env = "SAGA_MAX_CONCURRENT", default_value_t = 64)]
    pub max_concurrent: usize,
}

impl CliArgs {
    /// Coordinator configuration selected by these arguments
    pub fn saga_config(&self) -> SagaConfig {
        SagaConfig::default()
            .with_task_queue(self.task_queue.clone())
            .with_rollback_reporting(self.rollback_reporting.into())
            .with_max_concurrent_transactions(self.max_concurrent)
    }
}
