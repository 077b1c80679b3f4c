// Shared fixtures for account service tests

#![allow(dead_code)]

use std::sync::Arc;

use account_service::{AccountService, AccountServiceConfig, InMemoryBankRepository};
use chrono::NaiveDate;
use common::model::{NewUser, UserWithContacts};

pub fn config() -> AccountServiceConfig {
    AccountServiceConfig::new("postgres://unused".to_string(), 1)
}

/// Service over a fresh in-memory repository, plus a handle on the repository
pub fn service() -> (AccountService, Arc<InMemoryBankRepository>) {
    let repo = Arc::new(InMemoryBankRepository::new());
    let service = AccountService::from_repository(repo.clone(), &config());
    (service, repo)
}

pub fn new_user(login: &str, balance: i64, phones: &[&str], emails: &[&str]) -> NewUser {
    NewUser {
        login: login.to_string(),
        name: format!("Name of {}", login),
        birthday: NaiveDate::from_ymd_opt(1991, 1, 1).unwrap(),
        initial_balance: balance,
        interest_ceiling: None,
        phones: phones.iter().map(|p| p.to_string()).collect(),
        emails: emails.iter().map(|e| e.to_string()).collect(),
    }
}

/// Create a user numbered `n` with one phone and one email
pub async fn signup(service: &AccountService, n: u32, balance: i64) -> UserWithContacts {
    let phone = format!("+7999888776{}", n);
    let email = format!("email{}@mail.ru", n);
    service
        .create_user(new_user(&format!("login{}", n), balance, &[&phone], &[&email]))
        .await
        .unwrap()
}
