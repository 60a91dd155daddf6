//! Retry policy for batch inserts
//!
//! The policy only decides; the insert executor owns the loop, the sleep and
//! the fresh connection per attempt. The default policy retries every
//! retryable failure forever with a fixed delay.

use crate::config::RetryConfig;
use crate::error::SinkError;
use std::time::Duration;

/// Verdict for a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait this long, then try again on a fresh connection
    Retry(Duration),
    /// Stop and surface the error
    GiveUp,
}

/// Fixed-delay retry policy
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Delay between attempts
    pub delay: Duration,
    /// Maximum attempts per batch (`None` = unbounded)
    pub max_attempts: Option<u32>,
    /// Whether an error may be retried at all
    pub classifier: fn(&SinkError) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(10),
            max_attempts: None,
            classifier: SinkError::is_retryable,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            delay: Duration::from_millis(config.delay_ms),
            max_attempts: config.max_attempts,
            ..Default::default()
        }
    }
}

impl RetryPolicy {
    /// Create a fixed-delay policy with unbounded attempts
    pub fn fixed_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    /// Cap the number of attempts per batch
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Replace the retryable/fatal classifier
    pub fn with_classifier(mut self, classifier: fn(&SinkError) -> bool) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn is_retryable(&self, err: &SinkError) -> bool {
        (self.classifier)(err)
    }

    /// Decide what to do after attempt number `attempt` (1-based) failed with `err`
    pub fn decide(&self, err: &SinkError, attempt: u32) -> RetryDecision {
        if !self.is_retryable(err) {
            return RetryDecision::GiveUp;
        }
        match self.max_attempts {
            Some(max) if attempt >= max => RetryDecision::GiveUp,
            _ => RetryDecision::Retry(self.delay),
        }
    }
}
