//! Contact models: phone numbers and emails owned by a user

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Kind of contact record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactKind {
    Phone,
    Email,
}

impl ContactKind {
    /// Human-readable name used in error messages
    pub fn label(&self) -> &'static str {
        match self {
            ContactKind::Phone => "Phone number",
            ContactKind::Email => "Email",
        }
    }

    /// Syntactic checks for a contact value of this kind
    pub fn validate(&self, value: &str) -> Result<()> {
        if value.trim().is_empty() {
            return Err(Error::ValidationError(format!("{} must not be blank", self.label())));
        }
        if *self == ContactKind::Email && !value.contains('@') {
            return Err(Error::ValidationError(format!("Email {} must contain '@'", value)));
        }
        Ok(())
    }
}

impl fmt::Display for ContactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContactKind::Phone => write!(f, "phone"),
            ContactKind::Email => write!(f, "email"),
        }
    }
}

/// Contact record
///
/// The value is unique per kind across the whole system. The owner never
/// changes once the record is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Unique contact ID
    pub id: Uuid,
    /// Owning user
    pub user_id: Uuid,
    pub kind: ContactKind,
    /// Raw phone number or email
    pub value: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Contact {
    /// Create a new contact record owned by `user_id`
    pub fn new(user_id: Uuid, kind: ContactKind, value: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            kind,
            value,
            created_at: Utc::now(),
        }
    }
}

/// A user's current contact values of one kind after a mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactUpdate {
    pub user_id: Uuid,
    pub kind: ContactKind,
    /// Values in creation order
    pub values: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phone_validation() {
        assert!(ContactKind::Phone.validate("+79998887766").is_ok());
        assert!(matches!(ContactKind::Phone.validate(""), Err(Error::ValidationError(_))));
        assert!(matches!(ContactKind::Phone.validate("   "), Err(Error::ValidationError(_))));
    }

    #[test]
    fn test_email_validation() {
        assert!(ContactKind::Email.validate("user@mail.ru").is_ok());
        assert!(matches!(ContactKind::Email.validate("user.mail.ru"), Err(Error::ValidationError(_))));
        assert!(matches!(ContactKind::Email.validate(" "), Err(Error::ValidationError(_))));
    }

    #[test]
    fn test_contact_update_serialization() {
        let update = ContactUpdate {
            user_id: Uuid::nil(),
            kind: ContactKind::Phone,
            values: vec!["+100".to_string(), "+200".to_string()],
        };

        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["kind"], "phone");
        assert_eq!(json["values"][1], "+200");
    }
}
