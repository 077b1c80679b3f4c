//! Common types and utilities for the bank account core
//!
//! This library contains the shared domain models, the unified error type and
//! the database helpers used by the account service and its storage adapters.

pub mod error;
pub mod model;
pub mod db;

/// Re-export important types
pub use error::{Error, Result, ErrorExt};
pub use model::{
    AccrualReport, BalanceChange, Contact, ContactKind, ContactUpdate, NewUser, NewUserRecord,
    SortOrder, TransferResult, User, UserSearch, UserWithContacts,
};
