//! Repository for users, balances and contacts
//!
//! The ledger, the contact registry and the user service depend only on the
//! [`BankRepository`] port. Adapters enforce login, phone and email
//! uniqueness themselves, so a duplicate insert is rejected by storage even
//! when a caller's pre-check raced with another writer.

mod memory;
mod postgres;

use async_trait::async_trait;
use common::error::Result;
use common::model::{BalanceChange, Contact, ContactKind, NewUserRecord, User};
use uuid::Uuid;

pub use memory::InMemoryBankRepository;
pub use postgres::PostgresBankRepository;

/// Storage interface for the bank core
#[async_trait]
pub trait BankRepository: Send + Sync {
    /// Get a user by ID
    async fn find_user(&self, id: Uuid) -> Result<Option<User>>;

    /// Check whether a user exists
    async fn user_exists(&self, id: Uuid) -> Result<bool>;

    /// Check whether a login is taken
    async fn login_exists(&self, login: &str) -> Result<bool>;

    /// IDs of every user
    async fn list_user_ids(&self) -> Result<Vec<Uuid>>;

    /// Every user, in creation order
    async fn find_all_users(&self) -> Result<Vec<User>>;

    /// Persist a user together with its initial contacts.
    ///
    /// Either everything is stored or nothing is. A taken phone, email or
    /// login fails with `AlreadyExists`, checked in that order.
    async fn create_user(&self, record: NewUserRecord) -> Result<User>;

    /// Apply a batch of balance changes atomically.
    ///
    /// Every change must still match its expected balance, otherwise the
    /// whole batch fails with `Conflict`. Negative balances are rejected.
    async fn save_balances(&self, changes: &[BalanceChange]) -> Result<()>;

    /// Check whether a contact value is taken
    async fn contact_exists(&self, kind: ContactKind, value: &str) -> Result<bool>;

    /// Get a contact by value
    async fn find_contact(&self, kind: ContactKind, value: &str) -> Result<Option<Contact>>;

    /// All contacts of a kind owned by a user, in creation order
    async fn find_contacts_by_owner(&self, kind: ContactKind, user_id: Uuid) -> Result<Vec<Contact>>;

    /// Insert a contact; a taken value fails with `AlreadyExists`
    async fn insert_contact(&self, contact: Contact) -> Result<Contact>;

    /// Rewrite a contact's value keeping its identity; a taken value fails
    /// with `AlreadyExists`
    async fn update_contact_value(&self, kind: ContactKind, id: Uuid, new_value: &str) -> Result<Contact>;

    /// Delete a contact unless it is its owner's last one of that kind
    ///
    /// The last-contact check and the delete are one atomic step in storage;
    /// refusing yields `Conflict`.
    async fn delete_contact(&self, kind: ContactKind, id: Uuid) -> Result<()>;
}
