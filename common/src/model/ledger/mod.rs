//! Ledger models: transfer results, balance changes and sweep reports

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sender's state after a successful transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferResult {
    pub user_id: Uuid,
    pub balance: i64,
}

/// Compare-and-set balance update
///
/// Storage applies `new_balance` only while the stored balance still equals
/// `expected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceChange {
    pub user_id: Uuid,
    pub expected: i64,
    pub new_balance: i64,
}

/// Outcome of one interest accrual sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccrualReport {
    /// Accounts visited
    pub examined: usize,
    /// Accounts whose balance grew
    pub accrued: usize,
    /// Accounts at or above their ceiling, without one, or gone
    pub skipped: usize,
    /// Accounts whose update failed
    pub failed: usize,
}
