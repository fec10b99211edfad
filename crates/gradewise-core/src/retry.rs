//! Deferred re-dispatch of rate-limited or failed rewrites with exponential back-off.

use gradewise_domain::entities::{Priority, TargetLevel};
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(300_000),
            max_retries: 3,
        }
    }
}

impl RetryPolicy {
    /// `min(base · 2^retry_count, max)`
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let factor = 1u32.checked_shl(retry_count).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct RetryItem {
    pub id: Uuid,
    pub text: String,
    pub target_level: TargetLevel,
    pub priority: Priority,
    pub retry_count: u32,
    pub enqueued_at: Instant,
    pub next_retry_at: Instant,
    pub last_error: Option<String>,
    in_flight: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDisposition {
    Rescheduled { retry_count: u32, next_retry_at: Instant },
    Exhausted { attempts: u32, last_error: String },
}

pub struct RetryQueue {
    items: Vec<RetryItem>,
    policy: RetryPolicy,
}

impl RetryQueue {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { items: Vec::new(), policy }
    }

    pub fn contains(&self, text: &str, level: TargetLevel) -> bool {
        self.items.iter().any(|i| i.target_level == level && i.text == text)
    }

    /// Adds a pending item unless one already exists for the same pair.
    /// Returns whether a new item was created.
    pub fn enqueue(&mut self, text: &str, level: TargetLevel, priority: Priority, error: Option<String>) -> bool {
        if self.contains(text, level) {
            return false;
        }
        let now = Instant::now();
        self.items.push(RetryItem {
            id: Uuid::new_v4(),
            text: text.to_string(),
            target_level: level,
            priority,
            retry_count: 0,
            enqueued_at: now,
            next_retry_at: now + self.policy.delay_for(0),
            last_error: error,
            in_flight: false,
        });
        true
    }

    /// Snapshots of due items, highest priority first, then earliest due.
    /// Returned items stay queued (and deduplicating) but are marked in flight
    /// until a success or failure is recorded for them.
    pub fn ready(&mut self) -> Vec<RetryItem> {
        let now = Instant::now();
        let mut due: Vec<RetryItem> = Vec::new();
        for item in self.items.iter_mut().filter(|i| !i.in_flight && i.next_retry_at <= now) {
            item.in_flight = true;
            due.push(item.clone());
        }
        due.sort_by_key(|i| (i.priority, i.next_retry_at));
        due
    }

    pub fn record_success(&mut self, id: Uuid) -> Option<RetryItem> {
        let pos = self.items.iter().position(|i| i.id == id)?;
        Some(self.items.remove(pos))
    }

    /// Hands an in-flight item back without counting an attempt, so the next
    /// `ready` call picks it up again at its existing due time.
    pub fn release(&mut self, id: Uuid) -> bool {
        match self.items.iter_mut().find(|i| i.id == id && i.in_flight) {
            Some(item) => {
                item.in_flight = false;
                true
            }
            None => false,
        }
    }

    pub fn record_failure(&mut self, id: Uuid, error: impl Into<String>) -> Option<RetryDisposition> {
        let pos = self.items.iter().position(|i| i.id == id)?;
        let error = error.into();
        let item = &mut self.items[pos];
        item.retry_count += 1;
        item.in_flight = false;
        item.last_error = Some(error.clone());
        if item.retry_count >= self.policy.max_retries {
            let attempts = item.retry_count;
            self.items.remove(pos);
            return Some(RetryDisposition::Exhausted { attempts, last_error: error });
        }
        item.next_retry_at = Instant::now() + self.policy.delay_for(item.retry_count);
        Some(RetryDisposition::Rescheduled { retry_count: item.retry_count, next_retry_at: item.next_retry_at })
    }

    pub fn len(&self) -> usize { self.items.len() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
}
