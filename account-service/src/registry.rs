//! Contact registry: phone numbers and emails
//!
//! Every value is unique per kind across all users. Pre-checks here give
//! callers early, ordered errors; the repository's unique index is what
//! actually rejects a duplicate when two writers race on the same value.

use std::sync::Arc;

use common::error::{Error, Result};
use common::model::{Contact, ContactKind, ContactUpdate};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::locks::KeyedLocks;
use crate::repository::BankRepository;

/// Contact registry
pub struct ContactRegistry {
    repo: Arc<dyn BankRepository>,
    /// Serializes change/remove per owning user
    owners: KeyedLocks<Uuid>,
}

impl ContactRegistry {
    pub fn new(repo: Arc<dyn BankRepository>) -> Self {
        Self { repo, owners: KeyedLocks::new() }
    }

    pub async fn register_phone(&self, user_id: Uuid, phone: &str) -> Result<ContactUpdate> {
        self.register(ContactKind::Phone, user_id, phone).await
    }

    pub async fn change_phone(&self, user_id: Uuid, old_phone: &str, new_phone: &str) -> Result<ContactUpdate> {
        self.change(ContactKind::Phone, user_id, old_phone, new_phone).await
    }

    pub async fn remove_phone(&self, user_id: Uuid, phone: &str) -> Result<()> {
        self.remove(ContactKind::Phone, user_id, phone).await
    }

    pub async fn register_email(&self, user_id: Uuid, email: &str) -> Result<ContactUpdate> {
        self.register(ContactKind::Email, user_id, email).await
    }

    pub async fn change_email(&self, user_id: Uuid, old_email: &str, new_email: &str) -> Result<ContactUpdate> {
        self.change(ContactKind::Email, user_id, old_email, new_email).await
    }

    pub async fn remove_email(&self, user_id: Uuid, email: &str) -> Result<()> {
        self.remove(ContactKind::Email, user_id, email).await
    }

    /// Add a contact to a user
    pub async fn register(&self, kind: ContactKind, user_id: Uuid, value: &str) -> Result<ContactUpdate> {
        self.check_new(kind, value).await?;
        self.check_user(user_id).await?;

        let contact = self.repo.insert_contact(Contact::new(user_id, kind, value.to_string())).await?;
        info!("Registered {} {} for user {}", kind, contact.value, user_id);

        self.values(kind, user_id).await
    }

    /// Replace one of a user's contact values, keeping the record identity
    pub async fn change(&self, kind: ContactKind, user_id: Uuid, old_value: &str, new_value: &str) -> Result<ContactUpdate> {
        self.check_new(kind, new_value).await?;
        self.check_existing(kind, old_value).await?;
        self.check_user(user_id).await?;

        let _guard = self.owners.lock(&user_id).await;
        let contact = self.owned_contact(kind, user_id, old_value).await?;

        self.repo.update_contact_value(kind, contact.id, new_value).await?;
        info!("Changed {} {} to {} for user {}", kind, old_value, new_value, user_id);

        self.values(kind, user_id).await
    }

    /// Delete one of a user's contacts; the last one of a kind cannot go
    pub async fn remove(&self, kind: ContactKind, user_id: Uuid, value: &str) -> Result<()> {
        self.check_user(user_id).await?;
        self.check_existing(kind, value).await?;

        let _guard = self.owners.lock(&user_id).await;
        let contact = self.owned_contact(kind, user_id, value).await?;

        let owned = self.repo.find_contacts_by_owner(kind, user_id).await?;
        if owned.len() <= 1 {
            warn!("Refusing to delete the last {} of user {}", kind, user_id);
            return Err(Error::Conflict(format!(
                "Cannot delete the only {} of user {}", kind.label().to_lowercase(), user_id
            )));
        }

        self.repo.delete_contact(kind, contact.id).await?;
        info!("Removed {} {} from user {}", kind, value, user_id);
        Ok(())
    }

    /// Current values of a kind owned by a user, in creation order
    pub async fn values(&self, kind: ContactKind, user_id: Uuid) -> Result<ContactUpdate> {
        let values = self.repo
            .find_contacts_by_owner(kind, user_id)
            .await?
            .into_iter()
            .map(|contact| contact.value)
            .collect();

        Ok(ContactUpdate { user_id, kind, values })
    }

    /// A value about to be stored: well-formed and free
    pub(crate) async fn check_new(&self, kind: ContactKind, value: &str) -> Result<()> {
        kind.validate(value)?;

        if self.repo.contact_exists(kind, value).await? {
            return Err(Error::AlreadyExists(format!("{} {} is already in use", kind.label(), value)));
        }
        Ok(())
    }

    /// A value being looked up: non-blank and present
    async fn check_existing(&self, kind: ContactKind, value: &str) -> Result<()> {
        if value.trim().is_empty() {
            return Err(Error::ValidationError(format!("{} must not be blank", kind.label())));
        }

        if !self.repo.contact_exists(kind, value).await? {
            return Err(Error::NotFound(format!("{} {} not found", kind.label(), value)));
        }
        Ok(())
    }

    async fn check_user(&self, user_id: Uuid) -> Result<()> {
        if !self.repo.user_exists(user_id).await? {
            return Err(Error::NotFound(format!("User with id {} does not exist", user_id)));
        }
        Ok(())
    }

    async fn owned_contact(&self, kind: ContactKind, user_id: Uuid, value: &str) -> Result<Contact> {
        let contact = self.repo
            .find_contact(kind, value)
            .await?
            .ok_or_else(|| Error::NotFound(format!("{} {} not found", kind.label(), value)))?;

        if contact.user_id != user_id {
            debug!("User {} does not own {} {}", user_id, kind, value);
            return Err(Error::Conflict(format!(
                "User with id {} cannot modify {} {} because they do not own it",
                user_id, kind.label().to_lowercase(), value
            )));
        }
        Ok(contact)
    }
}
