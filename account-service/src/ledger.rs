//! Account ledger: transfers and interest accrual
//!
//! Every balance mutation holds the per-account lock for its whole
//! read-modify-write and commits through a compare-and-set batch, so a
//! transfer and an accrual touching the same account never lose an update.

use std::sync::Arc;

use common::error::{Error, ErrorExt, Result};
use common::model::{AccrualReport, BalanceChange, TransferResult, User};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::locks::KeyedLocks;
use crate::repository::BankRepository;

/// Account ledger
pub struct Ledger {
    repo: Arc<dyn BankRepository>,
    accounts: KeyedLocks<Uuid>,
    interest_rate_percent: u32,
}

impl Ledger {
    pub fn new(repo: Arc<dyn BankRepository>, interest_rate_percent: u32) -> Self {
        Self {
            repo,
            accounts: KeyedLocks::new(),
            interest_rate_percent,
        }
    }

    /// Current balance of an account
    pub async fn balance(&self, user_id: Uuid) -> Result<i64> {
        Ok(self.load(user_id).await?.balance)
    }

    /// Move `amount` from the sender to the recipient
    ///
    /// Returns the sender's balance after the transfer. A self-transfer
    /// still requires sufficient funds but leaves the balance untouched.
    pub async fn transfer(&self, sender_id: Uuid, recipient_id: Uuid, amount: i64) -> Result<TransferResult> {
        if amount <= 0 {
            return Err(Error::ValidationError(format!("Transfer amount must be positive, got {}", amount)));
        }

        let _guard = self.accounts.lock_pair(&sender_id, &recipient_id).await;

        let sender = self.load(sender_id).await?;
        let recipient = if sender_id == recipient_id {
            sender.clone()
        } else {
            self.load(recipient_id).await?
        };

        if sender.balance < amount {
            return Err(Error::Conflict(format!(
                "User with id {} has insufficient funds to transfer {}", sender_id, amount
            )));
        }

        if sender_id == recipient_id {
            debug!("Self-transfer of {} for user {}", amount, sender_id);
            return Ok(TransferResult { user_id: sender_id, balance: sender.balance });
        }

        let mut debited = sender.clone();
        debited.debit(amount).map_err(Error::Conflict)?;

        let mut credited = recipient.clone();
        credited.credit(amount).map_err(Error::Conflict)?;

        self.repo
            .save_balances(&[
                BalanceChange { user_id: sender_id, expected: sender.balance, new_balance: debited.balance },
                BalanceChange { user_id: recipient_id, expected: recipient.balance, new_balance: credited.balance },
            ])
            .await
            .with_context(|| format!("Failed to transfer {} from {} to {}", amount, sender_id, recipient_id))?;

        info!("Transferred {} from user {} to user {}", amount, sender_id, recipient_id);
        Ok(TransferResult { user_id: sender_id, balance: debited.balance })
    }

    /// Apply one interest step to every account below its ceiling
    ///
    /// A failure on one account is logged and counted; the sweep carries on
    /// with the rest.
    pub async fn accrue_interest(&self) -> Result<AccrualReport> {
        let ids = self.repo.list_user_ids().await?;
        let mut report = AccrualReport::default();

        for id in ids {
            report.examined += 1;
            match self.accrue_account(id).await {
                Ok(true) => report.accrued += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    error!("Interest accrual failed for user {}: {}", id, e);
                }
            }
        }

        info!(
            "Interest accrual sweep: {} examined, {} accrued, {} skipped, {} failed",
            report.examined, report.accrued, report.skipped, report.failed
        );
        Ok(report)
    }

    async fn accrue_account(&self, user_id: Uuid) -> Result<bool> {
        let _guard = self.accounts.lock(&user_id).await;

        let user = match self.repo.find_user(user_id).await? {
            Some(user) => user,
            None => return Ok(false),
        };

        let new_balance = match user.accrued_balance(self.interest_rate_percent).map_err(Error::Internal)? {
            Some(balance) => balance,
            None => return Ok(false),
        };

        self.repo
            .save_balances(&[BalanceChange { user_id, expected: user.balance, new_balance }])
            .await?;

        debug!("Accrued interest for user {}: {} -> {}", user_id, user.balance, new_balance);
        Ok(true)
    }

    async fn load(&self, user_id: Uuid) -> Result<User> {
        self.repo
            .find_user(user_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("User with id {} does not exist", user_id)))
    }
}
