//! User models and related types

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::contact::Contact;

/// User model
///
/// The balance is kept in whole currency units and never drops below zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique user ID
    pub id: Uuid,
    /// Login, unique and immutable after creation
    pub login: String,
    /// Display name
    pub name: String,
    /// Birth date
    pub birthday: NaiveDate,
    /// Account balance
    pub balance: i64,
    /// Balance up to which interest keeps accruing
    pub interest_ceiling: Option<i64>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Remove funds from the balance
    pub fn debit(&mut self, amount: i64) -> std::result::Result<(), String> {
        if amount > self.balance {
            return Err(format!("balance {} is less than {}", self.balance, amount));
        }

        self.balance -= amount;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Add funds to the balance
    pub fn credit(&mut self, amount: i64) -> std::result::Result<(), String> {
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or_else(|| format!("crediting {} to {} overflows", amount, self.balance))?;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Balance after one interest step, or `None` when the account is not
    /// eligible (no ceiling, or the balance already reached it).
    ///
    /// Interest is `balance * rate_percent / 100`, truncated.
    pub fn accrued_balance(&self, rate_percent: u32) -> std::result::Result<Option<i64>, String> {
        match self.interest_ceiling {
            Some(ceiling) if self.balance < ceiling => {}
            _ => return Ok(None),
        }

        let interest = self
            .balance
            .checked_mul(i64::from(rate_percent))
            .map(|scaled| scaled / 100)
            .ok_or_else(|| format!("interest on {} overflows", self.balance))?;

        // The step may overshoot the ceiling; the next sweep then skips the account.
        let accrued = self
            .balance
            .checked_add(interest)
            .ok_or_else(|| format!("interest on {} overflows", self.balance))?;

        Ok(Some(accrued))
    }
}

/// Signup request for a new user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub login: String,
    pub name: String,
    pub birthday: NaiveDate,
    pub initial_balance: i64,
    /// Explicit ceiling; derived from the initial balance when absent
    pub interest_ceiling: Option<i64>,
    pub phones: Vec<String>,
    pub emails: Vec<String>,
}

impl NewUser {
    /// Check the field-level rules of a signup against the given date
    pub fn validate(&self, today: NaiveDate) -> Result<()> {
        if self.login.trim().is_empty() {
            return Err(Error::ValidationError("Login must not be blank".to_string()));
        }
        if self.name.trim().is_empty() {
            return Err(Error::ValidationError("Name must not be blank".to_string()));
        }
        if self.birthday >= today {
            return Err(Error::ValidationError(format!(
                "Birthday {} must be in the past", self.birthday
            )));
        }
        if self.initial_balance <= 0 {
            return Err(Error::ValidationError(format!(
                "Initial balance must be positive, got {}", self.initial_balance
            )));
        }
        if self.phones.is_empty() {
            return Err(Error::ValidationError("At least one phone number is required".to_string()));
        }
        if self.emails.is_empty() {
            return Err(Error::ValidationError("At least one email is required".to_string()));
        }
        if let Some(ceiling) = self.interest_ceiling {
            if ceiling < 0 {
                return Err(Error::ValidationError(format!(
                    "Interest ceiling must not be negative, got {}", ceiling
                )));
            }
        }
        Ok(())
    }
}

/// Fully resolved signup handed to storage: one user and its initial contacts
#[derive(Debug, Clone)]
pub struct NewUserRecord {
    pub user: User,
    pub phones: Vec<Contact>,
    pub emails: Vec<Contact>,
}

/// User together with the values of its contacts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserWithContacts {
    pub user: User,
    pub phones: Vec<String>,
    pub emails: Vec<String>,
}

/// Sort direction for user search, by creation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// User search filters and paging
///
/// Filters are optional and combined with AND. Paging follows
/// `page = from / size`, so `from` is rounded down to a page boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSearch {
    /// Exact display name
    pub name: Option<String>,
    /// Only users born strictly after this date
    pub born_after: Option<NaiveDate>,
    /// Substring of any of the user's phone numbers
    pub phone: Option<String>,
    /// Substring of any of the user's emails
    pub email: Option<String>,
    pub from: usize,
    pub size: usize,
    pub sort: Option<SortOrder>,
}

impl Default for UserSearch {
    fn default() -> Self {
        Self {
            name: None,
            born_after: None,
            phone: None,
            email: None,
            from: 0,
            size: 10,
            sort: None,
        }
    }
}

impl UserSearch {
    /// Number of matching users to skip
    pub fn offset(&self) -> usize {
        if self.size == 0 {
            return 0;
        }
        (self.from / self.size) * self.size
    }
}
