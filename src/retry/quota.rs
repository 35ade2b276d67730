//! Client-wide retry quota.

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use super::classify::ErrorKind;

/// Cost table and capacity for a [`RetryQuota`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Maximum (and initial) balance.
    pub capacity: u32,
    /// Units debited per retry.
    pub retry_cost: u32,
    /// Units debited per retry of a timed-out attempt.
    pub timeout_cost: u32,
    /// Units credited when a call succeeds after retrying.
    pub success_reward: u32,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            capacity: 500,
            retry_cost: 5,
            timeout_cost: 1,
            success_reward: 1,
        }
    }
}

impl QuotaConfig {
    /// Units a retry of `kind` costs.
    pub fn cost_for(&self, kind: ErrorKind) -> u32 {
        match kind {
            ErrorKind::Timeout => self.timeout_cost,
            ErrorKind::Transient | ErrorKind::Throttling | ErrorKind::Server => self.retry_cost,
        }
    }
}

/// Budget bounding total retries across every call on one client.
///
/// All reads and writes go through a single mutex so concurrent calls
/// cannot overspend. The balance stays within `0..=capacity`.
///
/// # Examples
///
/// ```rust
/// use tideline::{QuotaConfig, RetryQuota};
///
/// let quota = RetryQuota::new(QuotaConfig { capacity: 10, ..QuotaConfig::default() });
/// assert!(quota.try_debit(5));
/// assert!(quota.try_debit(5));
/// assert!(!quota.try_debit(5));
/// assert_eq!(quota.credit(1), 1);
/// ```
#[derive(Debug)]
pub struct RetryQuota {
    config: QuotaConfig,
    balance: Mutex<u32>,
}

impl RetryQuota {
    /// Create a full quota.
    pub fn new(config: QuotaConfig) -> Self {
        Self {
            config,
            balance: Mutex::new(config.capacity),
        }
    }

    /// The cost table.
    pub fn config(&self) -> &QuotaConfig {
        &self.config
    }

    /// Maximum balance.
    pub fn capacity(&self) -> u32 {
        self.config.capacity
    }

    /// Current balance.
    pub fn balance(&self) -> u32 {
        *self.lock()
    }

    /// Returns true if `cost` could be debited right now.
    pub fn can_afford(&self, cost: u32) -> bool {
        *self.lock() >= cost
    }

    /// Debit `cost` if the balance covers it.
    ///
    /// Returns false and leaves the balance untouched otherwise.
    pub fn try_debit(&self, cost: u32) -> bool {
        let mut balance = self.lock();
        if *balance < cost {
            return false;
        }
        *balance -= cost;
        true
    }

    /// Credit `amount`, clamped to capacity. Returns the new balance.
    pub fn credit(&self, amount: u32) -> u32 {
        let mut balance = self.lock();
        *balance = balance.saturating_add(amount).min(self.config.capacity);
        *balance
    }

    fn lock(&self) -> MutexGuard<'_, u32> {
        self.balance.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for RetryQuota {
    fn default() -> Self {
        Self::new(QuotaConfig::default())
    }
}
