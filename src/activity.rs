//! Activity registration and per-invocation options

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::{Activity, RetryPolicy};

/// Default start-to-close timeout of every activity attempt
pub const DEFAULT_START_TO_CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// How one activity call is executed
#[derive(Clone, Debug, PartialEq)]
pub struct ActivityOptions {
    /// Hard wall-clock budget per attempt
    pub start_to_close_timeout: Duration,
    /// Retry policy between attempts, `None` runs a single attempt
    pub retry_policy: Option<RetryPolicy>,
}

impl Default for ActivityOptions {
    fn default() -> Self {
        Self {
            start_to_close_timeout: DEFAULT_START_TO_CLOSE_TIMEOUT,
            retry_policy: None,
        }
    }
}

impl ActivityOptions {
    /// Options with the given per-attempt timeout and no retries
    pub fn new(start_to_close_timeout: Duration) -> Self {
        Self {
            start_to_close_timeout,
            retry_policy: None,
        }
    }

    /// Retry failed attempts under `policy`
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }
}

/// Activity registry keyed by activity name
#[derive(Clone, Default)]
pub struct ActivityRegistry {
    activities: HashMap<Box<str>, Arc<dyn Activity>>,
}

impl fmt::Debug for ActivityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.activities.keys().collect();
        names.sort();
        f.debug_struct("ActivityRegistry")
            .field("activities", &names)
            .finish()
    }
}

impl ActivityRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an activity under its own name, replacing any previous one
    pub fn register(&mut self, activity: Arc<dyn Activity>) -> &mut Self {
        let name: Box<str> = activity.name().into();
        if self.activities.insert(name.clone(), activity).is_some() {
            tracing::warn!(activity = %name, "Activity registered twice, replacing");
        }
        self
    }

    /// Look up an activity by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Activity>> {
        self.activities.get(name).cloned()
    }

    /// Whether an activity is registered under `name`
    pub fn contains(&self, name: &str) -> bool {
        self.activities.contains_key(name)
    }

    /// Number of registered activities
    pub fn len(&self) -> usize {
        self.activities.len()
    }

    /// Whether no activity is registered
    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }
}
