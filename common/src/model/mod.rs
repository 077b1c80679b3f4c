//! Domain models for the bank account core

pub mod user;
pub mod contact;
pub mod ledger;

pub use user::{NewUser, NewUserRecord, SortOrder, User, UserSearch, UserWithContacts};
pub use contact::{Contact, ContactKind, ContactUpdate};
pub use ledger::{AccrualReport, BalanceChange, TransferResult};
