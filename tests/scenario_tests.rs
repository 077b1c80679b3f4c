// End-to-end behaviour of the account core over the in-memory repository

use std::sync::Arc;

use bank_core::account_service::{AccountService, AccountServiceConfig, InMemoryBankRepository};
use bank_core::common::error::Error;
use bank_core::common::model::NewUser;
use chrono::NaiveDate;
use uuid::Uuid;

fn setup() -> (Arc<AccountService>, Arc<InMemoryBankRepository>) {
    let repo = Arc::new(InMemoryBankRepository::new());
    let config = AccountServiceConfig::new("postgres://unused".to_string(), 1);
    (Arc::new(AccountService::from_repository(repo.clone(), &config)), repo)
}

fn user(login: &str, balance: i64, phones: &[&str], emails: &[&str]) -> NewUser {
    NewUser {
        login: login.to_string(),
        name: login.to_uppercase(),
        birthday: NaiveDate::from_ymd_opt(1988, 8, 8).unwrap(),
        initial_balance: balance,
        interest_ceiling: None,
        phones: phones.iter().map(|s| s.to_string()).collect(),
        emails: emails.iter().map(|s| s.to_string()).collect(),
    }
}

#[tokio::test]
async fn test_signup_with_taken_phone_creates_nothing() {
    let (service, repo) = setup();
    service
        .create_user(user("a", 1000, &["+P1", "+P2"], &["e1@x.io", "e2@x.io"]))
        .await
        .unwrap();

    let err = service
        .create_user(user("b", 1000, &["+P3", "+P1"], &["e3@x.io"]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AlreadyExists(msg) if msg.contains("+P1")));

    assert_eq!(repo.user_count(), 1);
    assert_eq!(repo.contact_count(bank_core::common::model::ContactKind::Phone), 2);
    assert_eq!(repo.contact_count(bank_core::common::model::ContactKind::Email), 2);
}

#[tokio::test]
async fn test_transfer_then_overdraw() {
    let (service, _) = setup();
    let a = service.create_user(user("a", 1000, &["+1"], &["a@x.io"])).await.unwrap().user.id;
    let b = service.create_user(user("b", 1000, &["+2"], &["b@x.io"])).await.unwrap().user.id;

    service.transfer(a, b, 500).await.unwrap();
    assert_eq!(service.get_user(a).await.unwrap().user.balance, 500);
    assert_eq!(service.get_user(b).await.unwrap().user.balance, 1500);

    assert!(matches!(service.transfer(a, b, 700).await, Err(Error::Conflict(_))));
    assert_eq!(service.get_user(a).await.unwrap().user.balance, 500);
    assert_eq!(service.get_user(b).await.unwrap().user.balance, 1500);
}

#[tokio::test]
async fn test_only_phone_cannot_be_removed() {
    let (service, _) = setup();
    let a = service.create_user(user("a", 1000, &["+P1"], &["a@x.io"])).await.unwrap().user.id;

    assert!(matches!(service.remove_phone(a, "+P1").await, Err(Error::Conflict(_))));
    assert_eq!(service.get_user(a).await.unwrap().phones, vec!["+P1"]);
}

#[tokio::test]
async fn test_accrual_until_ceiling() {
    let (service, _) = setup();
    let a = service.create_user(user("a", 1000, &["+1"], &["a@x.io"])).await.unwrap();
    assert_eq!(a.user.interest_ceiling, Some(2070));

    service.accrue_interest().await.unwrap();
    assert_eq!(service.get_user(a.user.id).await.unwrap().user.balance, 1050);
    service.accrue_interest().await.unwrap();
    assert_eq!(service.get_user(a.user.id).await.unwrap().user.balance, 1102);

    let mut last = 0;
    for _ in 0..30 {
        service.accrue_interest().await.unwrap();
        let balance = service.get_user(a.user.id).await.unwrap().user.balance;
        if balance == last {
            break;
        }
        last = balance;
    }
    assert!(last >= 2070);

    service.accrue_interest().await.unwrap();
    assert_eq!(service.get_user(a.user.id).await.unwrap().user.balance, last);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_simultaneous_registration_of_one_phone() {
    let (service, _) = setup();
    let a = service.create_user(user("a", 10, &["+a"], &["a@x.io"])).await.unwrap().user.id;
    let b = service.create_user(user("b", 10, &["+b"], &["b@x.io"])).await.unwrap().user.id;

    let (first, second) = tokio::join!(
        {
            let service = service.clone();
            tokio::spawn(async move { service.register_phone(a, "+1").await })
        },
        {
            let service = service.clone();
            tokio::spawn(async move { service.register_phone(b, "+1").await })
        },
    );

    let results = [first.unwrap(), second.unwrap()];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results.iter().any(|r| matches!(r, Err(Error::AlreadyExists(_)))));
}

#[tokio::test]
async fn test_released_email_can_be_claimed() {
    let (service, _) = setup();
    let a = service.create_user(user("a", 10, &["+a"], &["a@x.io", "shared@x.io"])).await.unwrap().user.id;
    let b = service.create_user(user("b", 10, &["+b"], &["b@x.io"])).await.unwrap().user.id;

    assert!(matches!(service.register_email(b, "shared@x.io").await, Err(Error::AlreadyExists(_))));
    service.remove_email(a, "shared@x.io").await.unwrap();

    let update = service.register_email(b, "shared@x.io").await.unwrap();
    assert_eq!(update.values, vec!["b@x.io", "shared@x.io"]);
}

#[tokio::test]
async fn test_unknown_user_everywhere() {
    let (service, _) = setup();
    let ghost = Uuid::new_v4();

    assert!(matches!(service.get_user(ghost).await, Err(Error::NotFound(_))));
    assert!(matches!(service.register_phone(ghost, "+1").await, Err(Error::NotFound(_))));
    assert!(matches!(service.remove_email(ghost, "a@x.io").await, Err(Error::NotFound(_))));
    assert!(matches!(service.transfer(ghost, ghost, 1).await, Err(Error::NotFound(_))));
}
