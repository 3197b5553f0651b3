use super::types::FetchOutcome;
use std::time::Duration;
use tracing::debug;

/// Fixed-delay polling budget.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts including the first; `None` polls without limit.
    pub max_attempts: Option<u32>,
    pub delay: Duration,
}

impl RetryPolicy {
    /// `0` means unbounded.
    pub fn from_attempts(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: (max_attempts > 0).then_some(max_attempts),
            delay,
        }
    }

    fn exhausted(&self, attempt: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempt >= max)
    }
}

/// What a single poll attempt concluded.
#[derive(Debug)]
pub enum Step<T> {
    Done(T),
    /// Terminal failure; polling again would not help.
    Fail(String),
    /// Transient condition; sleep and poll again if budget remains.
    Retry(String),
}

/// Run `attempt` until it yields `Done` or `Fail`, or the policy runs out.
pub fn poll<T, F>(policy: RetryPolicy, label: &str, mut attempt: F) -> FetchOutcome<T>
where
    F: FnMut(u32) -> Step<T>,
{
    let mut n = 0u32;
    loop {
        n += 1;
        match attempt(n) {
            Step::Done(value) => return FetchOutcome::Ready(value),
            Step::Fail(reason) => return FetchOutcome::Failed(reason),
            Step::Retry(reason) => {
                if policy.exhausted(n) {
                    debug!("{label}: giving up after {n} attempts ({reason})");
                    return FetchOutcome::TimedOut { attempts: n };
                }
                debug!("{label}: attempt {n} not ready ({reason}), retrying");
                std::thread::sleep(policy.delay);
            }
        }
    }
}
