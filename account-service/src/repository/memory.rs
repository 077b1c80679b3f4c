//! In-memory repository

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use common::error::{Error, Result};
use common::model::{BalanceChange, Contact, ContactKind, NewUserRecord, User};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use super::BankRepository;

/// Record with its insertion sequence number
#[derive(Debug, Clone)]
struct Stored<T> {
    seq: u64,
    record: T,
}

/// In-memory repository for users and contacts
///
/// The user table sits behind a single lock so that a batch of balance
/// changes becomes visible all at once. Logins, phones and emails each have
/// a unique index; reserving a slot in an index is the authoritative
/// uniqueness check.
pub struct InMemoryBankRepository {
    /// Users by ID
    users: RwLock<HashMap<Uuid, Stored<User>>>,
    /// Login index
    logins: DashMap<String, Uuid>,
    /// Contacts by ID
    contacts: DashMap<Uuid, Stored<Contact>>,
    /// Phone value index
    phones: DashMap<String, Uuid>,
    /// Email value index
    emails: DashMap<String, Uuid>,
    /// Insertion sequence
    seq: AtomicU64,
    /// Serializes contact deletes
    delete_gate: Mutex<()>,
}

impl Default for InMemoryBankRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBankRepository {
    /// Create a new in-memory repository
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            logins: DashMap::new(),
            contacts: DashMap::new(),
            phones: DashMap::new(),
            emails: DashMap::new(),
            seq: AtomicU64::new(0),
            delete_gate: Mutex::new(()),
        }
    }

    /// Number of stored users
    pub fn user_count(&self) -> usize {
        self.users.read().len()
    }

    /// Number of stored contacts of a kind
    pub fn contact_count(&self, kind: ContactKind) -> usize {
        self.index(kind).len()
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    fn index(&self, kind: ContactKind) -> &DashMap<String, Uuid> {
        match kind {
            ContactKind::Phone => &self.phones,
            ContactKind::Email => &self.emails,
        }
    }

    /// Claim a value in a contact index for the contact `id`
    fn reserve(&self, kind: ContactKind, value: &str, id: Uuid) -> Result<()> {
        match self.index(kind).entry(value.to_string()) {
            Entry::Occupied(_) => Err(Error::AlreadyExists(format!(
                "{} {} is already in use", kind.label(), value
            ))),
            Entry::Vacant(slot) => {
                slot.insert(id);
                Ok(())
            }
        }
    }

    /// Release a value only if it is still claimed by the contact `id`
    fn release(&self, kind: ContactKind, value: &str, id: Uuid) {
        self.index(kind).remove_if(value, |_, owner| *owner == id);
    }

    fn reserve_login(&self, login: &str, id: Uuid) -> Result<()> {
        match self.logins.entry(login.to_string()) {
            Entry::Occupied(_) => Err(Error::AlreadyExists(format!(
                "User with login {} already exists", login
            ))),
            Entry::Vacant(slot) => {
                slot.insert(id);
                Ok(())
            }
        }
    }

    fn reserve_signup(&self, record: &NewUserRecord) -> Result<()> {
        let mut claimed: Vec<&Contact> = Vec::new();

        for contact in record.phones.iter().chain(record.emails.iter()) {
            if let Err(e) = self.reserve(contact.kind, &contact.value, contact.id) {
                for taken in &claimed {
                    self.release(taken.kind, &taken.value, taken.id);
                }
                return Err(e);
            }
            claimed.push(contact);
        }

        if let Err(e) = self.reserve_login(&record.user.login, record.user.id) {
            for taken in &claimed {
                self.release(taken.kind, &taken.value, taken.id);
            }
            return Err(e);
        }

        Ok(())
    }
}

#[async_trait]
impl BankRepository for InMemoryBankRepository {
    async fn find_user(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.users.read().get(&id).map(|stored| stored.record.clone()))
    }

    async fn user_exists(&self, id: Uuid) -> Result<bool> {
        Ok(self.users.read().contains_key(&id))
    }

    async fn login_exists(&self, login: &str) -> Result<bool> {
        Ok(self.logins.contains_key(login))
    }

    async fn list_user_ids(&self) -> Result<Vec<Uuid>> {
        let mut users: Vec<(u64, Uuid)> = self.users
            .read()
            .values()
            .map(|stored| (stored.seq, stored.record.id))
            .collect();
        users.sort_unstable();

        Ok(users.into_iter().map(|(_, id)| id).collect())
    }

    async fn find_all_users(&self) -> Result<Vec<User>> {
        let mut users: Vec<Stored<User>> = self.users.read().values().cloned().collect();
        users.sort_unstable_by_key(|stored| stored.seq);

        Ok(users.into_iter().map(|stored| stored.record).collect())
    }

    async fn create_user(&self, record: NewUserRecord) -> Result<User> {
        debug!(
            "Creating user {} with {} phones and {} emails",
            record.user.login,
            record.phones.len(),
            record.emails.len()
        );

        self.reserve_signup(&record)?;

        // Contacts go in first so a visible user always has its contacts.
        for contact in record.phones.into_iter().chain(record.emails) {
            let seq = self.next_seq();
            self.contacts.insert(contact.id, Stored { seq, record: contact });
        }

        let user = record.user;
        let seq = self.next_seq();
        self.users.write().insert(user.id, Stored { seq, record: user.clone() });

        Ok(user)
    }

    async fn save_balances(&self, changes: &[BalanceChange]) -> Result<()> {
        let mut users = self.users.write();

        for change in changes {
            let stored = users.get(&change.user_id)
                .ok_or_else(|| Error::NotFound(format!("User with id {} does not exist", change.user_id)))?;

            if stored.record.balance != change.expected {
                return Err(Error::Conflict(format!(
                    "Balance of user {} changed concurrently: expected {}, found {}",
                    change.user_id, change.expected, stored.record.balance
                )));
            }
            if change.new_balance < 0 {
                return Err(Error::ValidationError(format!(
                    "Balance of user {} cannot become negative", change.user_id
                )));
            }
        }

        let now = Utc::now();
        for change in changes {
            if let Some(stored) = users.get_mut(&change.user_id) {
                stored.record.balance = change.new_balance;
                stored.record.updated_at = now;
            }
        }

        Ok(())
    }

    async fn contact_exists(&self, kind: ContactKind, value: &str) -> Result<bool> {
        Ok(self.index(kind).contains_key(value))
    }

    async fn find_contact(&self, kind: ContactKind, value: &str) -> Result<Option<Contact>> {
        let id = match self.index(kind).get(value) {
            Some(id) => *id,
            None => return Ok(None),
        };

        Ok(self.contacts.get(&id).map(|stored| stored.record.clone()))
    }

    async fn find_contacts_by_owner(&self, kind: ContactKind, user_id: Uuid) -> Result<Vec<Contact>> {
        let mut owned: Vec<Stored<Contact>> = self.contacts
            .iter()
            .filter(|entry| entry.record.user_id == user_id && entry.record.kind == kind)
            .map(|entry| entry.value().clone())
            .collect();
        owned.sort_unstable_by_key(|stored| stored.seq);

        Ok(owned.into_iter().map(|stored| stored.record).collect())
    }

    async fn insert_contact(&self, contact: Contact) -> Result<Contact> {
        debug!("Inserting {} {} for user {}", contact.kind, contact.value, contact.user_id);

        if !self.users.read().contains_key(&contact.user_id) {
            return Err(Error::NotFound(format!("User with id {} does not exist", contact.user_id)));
        }

        self.reserve(contact.kind, &contact.value, contact.id)?;

        let seq = self.next_seq();
        self.contacts.insert(contact.id, Stored { seq, record: contact.clone() });
        Ok(contact)
    }

    async fn update_contact_value(&self, kind: ContactKind, id: Uuid, new_value: &str) -> Result<Contact> {
        let old_value = match self.contacts.get(&id) {
            Some(stored) if stored.record.kind == kind => stored.record.value.clone(),
            _ => return Err(Error::NotFound(format!("{} with id {} not found", kind.label(), id))),
        };

        if old_value == new_value {
            return self.contacts.get(&id)
                .map(|stored| stored.record.clone())
                .ok_or_else(|| Error::NotFound(format!("{} with id {} not found", kind.label(), id)));
        }

        self.reserve(kind, new_value, id)?;

        let updated = match self.contacts.get_mut(&id) {
            Some(mut stored) => {
                stored.record.value = new_value.to_string();
                stored.record.clone()
            }
            None => {
                self.release(kind, new_value, id);
                return Err(Error::NotFound(format!("{} with id {} not found", kind.label(), id)));
            }
        };

        self.release(kind, &old_value, id);
        Ok(updated)
    }

    async fn delete_contact(&self, kind: ContactKind, id: Uuid) -> Result<()> {
        // Held across count and removal so two deletes cannot both pass the count.
        let _gate = self.delete_gate.lock();

        let owner = match self.contacts.get(&id) {
            Some(stored) if stored.record.kind == kind => stored.record.user_id,
            _ => return Err(Error::NotFound(format!("{} with id {} not found", kind.label(), id))),
        };

        let owned = self.contacts
            .iter()
            .filter(|entry| entry.record.user_id == owner && entry.record.kind == kind)
            .count();
        if owned <= 1 {
            return Err(Error::Conflict(format!(
                "Cannot delete the only {} of user {}", kind.label().to_lowercase(), owner
            )));
        }

        let (_, stored) = self.contacts
            .remove_if(&id, |_, stored| stored.record.kind == kind)
            .ok_or_else(|| Error::NotFound(format!("{} with id {} not found", kind.label(), id)))?;

        self.release(kind, &stored.record.value, id);
        Ok(())
    }
}
