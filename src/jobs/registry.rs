use std::sync::Arc;
use std::time::Duration;

use crate::config::settings::JobsConfig;
use crate::jobs::error::{JobError, JobResult};
use crate::jobs::types::JobTask;

/// Retry behaviour for a failing cron tick
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            retry_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Delay before retry number `attempt + 1`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16) as i32;
        self.retry_delay
            .mul_f64(self.backoff_multiplier.max(1.0).powi(exponent))
    }
}

impl From<&JobsConfig> for RetryPolicy {
    fn from(config: &JobsConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_delay: Duration::from_secs(config.retry_delay),
            backoff_multiplier: config.retry_backoff_multiplier,
        }
    }
}

/// One row of the cron registration table.
#[derive(Debug, Clone, PartialEq)]
pub struct CronEntry {
    pub name: String,
    /// Six-field cron expression (seconds first).
    pub cron_expression: String,
    /// Lease key preventing two ticks of this entry from overlapping
    /// anywhere in the fleet.
    pub dedup_key: Option<String>,
    pub dedup_ttl: Duration,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub enabled: bool,
}

impl CronEntry {
    pub fn new(name: impl Into<String>, cron_expression: impl Into<String>, config: &JobsConfig) -> Self {
        let timeout = Duration::from_secs(config.job_timeout);
        Self {
            name: name.into(),
            cron_expression: cron_expression.into(),
            dedup_key: None,
            dedup_ttl: timeout,
            timeout,
            retry: RetryPolicy::from(config),
            enabled: true,
        }
    }

    pub fn with_dedup_key(mut self, key: impl Into<String>) -> Self {
        self.dedup_key = Some(key.into());
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self.dedup_ttl = timeout;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

pub struct RegisteredJob {
    pub entry: CronEntry,
    pub task: Arc<dyn JobTask>,
}

/// Explicit table of cron entries built at startup.
#[derive(Default)]
pub struct JobRegistry {
    jobs: Vec<Arc<RegisteredJob>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, entry: CronEntry, task: Arc<dyn JobTask>) -> JobResult<&mut Self> {
        validate_cron_expression(&entry.cron_expression)?;
        if self.get(&entry.name).is_some() {
            return Err(JobError::AlreadyExists(entry.name));
        }

        self.jobs.push(Arc::new(RegisteredJob { entry, task }));
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<Arc<RegisteredJob>> {
        self.jobs.iter().find(|j| j.entry.name == name).cloned()
    }

    pub fn jobs(&self) -> &[Arc<RegisteredJob>] {
        &self.jobs
    }

    pub fn enabled(&self) -> impl Iterator<Item = &Arc<RegisteredJob>> {
        self.jobs.iter().filter(|j| j.entry.enabled)
    }

    pub fn names(&self) -> Vec<&str> {
        self.jobs.iter().map(|j| j.entry.name.as_str()).collect()
    }
}

/// Checks the shape accepted by the cron runner: six fields (seconds
/// first) or seven with a trailing year.
pub fn validate_cron_expression(expression: &str) -> JobResult<()> {
    let fields = expression.split_whitespace().count();
    if fields == 6 || fields == 7 {
        Ok(())
    } else {
        Err(JobError::InvalidCronExpression(format!(
            "'{}' has {} fields, expected 6 (sec min hour day month weekday)",
            expression, fields
        )))
    }
}
