//! User lifecycle: signup, lookup and search

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use common::error::{Error, Result};
use common::model::{
    Contact, ContactKind, NewUser, NewUserRecord, SortOrder, User, UserSearch, UserWithContacts,
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::registry::ContactRegistry;
use crate::repository::BankRepository;

/// User lifecycle service
pub struct UserService {
    repo: Arc<dyn BankRepository>,
    registry: Arc<ContactRegistry>,
    default_ceiling_percent: u32,
}

/// Drop repeated values, keeping the first occurrence of each
fn dedup(values: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    values
        .iter()
        .filter(|value| seen.insert(value.as_str()))
        .cloned()
        .collect()
}

impl UserService {
    pub fn new(repo: Arc<dyn BankRepository>, registry: Arc<ContactRegistry>, default_ceiling_percent: u32) -> Self {
        Self { repo, registry, default_ceiling_percent }
    }

    /// Create a user with its initial phones and emails
    ///
    /// Conflicts are reported phone first, then email, then login. Nothing is
    /// stored unless every check passes.
    pub async fn create_user(&self, new_user: NewUser) -> Result<UserWithContacts> {
        new_user.validate(Utc::now().date_naive())?;

        let phones = dedup(&new_user.phones);
        let emails = dedup(&new_user.emails);

        for phone in &phones {
            self.registry.check_new(ContactKind::Phone, phone).await?;
        }
        for email in &emails {
            self.registry.check_new(ContactKind::Email, email).await?;
        }
        if self.repo.login_exists(&new_user.login).await? {
            return Err(Error::AlreadyExists(format!(
                "User with login {} already exists", new_user.login
            )));
        }

        let interest_ceiling = match new_user.interest_ceiling {
            Some(ceiling) => ceiling,
            None => new_user
                .initial_balance
                .checked_mul(i64::from(self.default_ceiling_percent))
                .map(|scaled| scaled / 100)
                .ok_or_else(|| Error::ValidationError(format!(
                    "Initial balance {} is too large", new_user.initial_balance
                )))?,
        };

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            login: new_user.login,
            name: new_user.name,
            birthday: new_user.birthday,
            balance: new_user.initial_balance,
            interest_ceiling: Some(interest_ceiling),
            created_at: now,
            updated_at: now,
        };

        let record = NewUserRecord {
            phones: phones.iter().map(|p| Contact::new(user.id, ContactKind::Phone, p.clone())).collect(),
            emails: emails.iter().map(|e| Contact::new(user.id, ContactKind::Email, e.clone())).collect(),
            user,
        };

        let user = self.repo.create_user(record).await?;
        info!(
            "Created user {} ({}) with {} phones and {} emails",
            user.login,
            user.id,
            phones.len(),
            emails.len()
        );

        Ok(UserWithContacts { user, phones, emails })
    }

    /// Get a user with its contacts
    pub async fn get_user(&self, user_id: Uuid) -> Result<UserWithContacts> {
        let user = self.repo
            .find_user(user_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("User with id {} does not exist", user_id)))?;

        self.with_contacts(user).await
    }

    /// Find users matching every given filter, one page at a time
    pub async fn search_users(&self, search: &UserSearch) -> Result<Vec<UserWithContacts>> {
        if search.size == 0 {
            return Err(Error::ValidationError("Page size must be positive".to_string()));
        }

        let mut matched = Vec::new();
        for user in self.repo.find_all_users().await? {
            if search.name.as_ref().is_some_and(|name| *name != user.name) {
                continue;
            }
            if search.born_after.is_some_and(|date| user.birthday <= date) {
                continue;
            }

            let found = self.with_contacts(user).await?;
            if let Some(phone) = &search.phone {
                if !found.phones.iter().any(|p| p.contains(phone.as_str())) {
                    continue;
                }
            }
            if let Some(email) = &search.email {
                if !found.emails.iter().any(|e| e.contains(email.as_str())) {
                    continue;
                }
            }
            matched.push(found);
        }

        if search.sort == Some(SortOrder::Desc) {
            matched.reverse();
        }

        debug!("User search matched {} users", matched.len());
        Ok(matched.into_iter().skip(search.offset()).take(search.size).collect())
    }

    async fn with_contacts(&self, user: User) -> Result<UserWithContacts> {
        let phones = self.repo.find_contacts_by_owner(ContactKind::Phone, user.id).await?;
        let emails = self.repo.find_contacts_by_owner(ContactKind::Email, user.id).await?;

        Ok(UserWithContacts {
            user,
            phones: phones.into_iter().map(|c| c.value).collect(),
            emails: emails.into_iter().map(|c| c.value).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_keeps_first_seen_order() {
        let values = vec!["b".to_string(), "a".to_string(), "b".to_string(), "c".to_string(), "a".to_string()];
        assert_eq!(dedup(&values), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_dedup_is_case_sensitive() {
        let values = vec!["A@x.io".to_string(), "a@x.io".to_string()];
        assert_eq!(dedup(&values).len(), 2);
    }
}
