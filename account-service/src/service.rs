//! Account service implementation
//!
//! Composes the contact registry, the ledger and the user service over one
//! repository.

use std::sync::Arc;
use std::time::Duration;

use common::error::Result;
use common::model::{
    AccrualReport, ContactUpdate, NewUser, TransferResult, UserSearch, UserWithContacts,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::accrual::spawn_accrual_task;
use crate::config::AccountServiceConfig;
use crate::ledger::Ledger;
use crate::registry::ContactRegistry;
use crate::repository::{BankRepository, InMemoryBankRepository, PostgresBankRepository};
use crate::users::UserService;

/// Account service for managing users, contacts and balances
pub struct AccountService {
    registry: Arc<ContactRegistry>,
    ledger: Arc<Ledger>,
    users: UserService,
    accrual_interval: Duration,
}

/// Repository Type
pub enum RepositoryType {
    /// In-memory repository
    InMemory,
    /// PostgreSQL repository
    Postgres(Option<String>),
}

impl Default for AccountService {
    fn default() -> Self {
        Self::new()
    }
}

impl AccountService {
    /// Create a new account service backed by memory
    pub fn new() -> Self {
        Self::from_repository(Arc::new(InMemoryBankRepository::new()), &AccountServiceConfig::from_env())
    }

    /// Create a new account service with a specific repository type
    pub async fn with_repository(repo_type: RepositoryType) -> Result<Self> {
        let config = AccountServiceConfig::from_env();
        let repo: Arc<dyn BankRepository> = match repo_type {
            RepositoryType::InMemory => {
                Arc::new(InMemoryBankRepository::new())
            },
            RepositoryType::Postgres(database_url) => {
                let repo = PostgresBankRepository::new(database_url).await?;
                repo.migrate().await?;
                Arc::new(repo)
            }
        };

        Ok(Self::from_repository(repo, &config))
    }

    /// Create a new account service on PostgreSQL with a configuration
    pub async fn with_config(config: &AccountServiceConfig) -> Result<Self> {
        let repo = PostgresBankRepository::with_config(config).await?;
        repo.migrate().await?;

        Ok(Self::from_repository(Arc::new(repo), config))
    }

    /// Create a new account service over an existing repository
    pub fn from_repository(repo: Arc<dyn BankRepository>, config: &AccountServiceConfig) -> Self {
        let registry = Arc::new(ContactRegistry::new(repo.clone()));
        let ledger = Arc::new(Ledger::new(repo.clone(), config.interest_rate_percent));
        let users = UserService::new(repo, registry.clone(), config.default_ceiling_percent);

        Self {
            registry,
            ledger,
            users,
            accrual_interval: config.accrual_interval,
        }
    }

    pub fn registry(&self) -> &ContactRegistry {
        &self.registry
    }

    pub fn ledger(&self) -> Arc<Ledger> {
        self.ledger.clone()
    }

    pub fn users(&self) -> &UserService {
        &self.users
    }

    /// Create a user with its initial contacts
    pub async fn create_user(&self, new_user: NewUser) -> Result<UserWithContacts> {
        self.users.create_user(new_user).await
    }

    /// Get a user with its contacts
    pub async fn get_user(&self, user_id: Uuid) -> Result<UserWithContacts> {
        self.users.get_user(user_id).await
    }

    /// Search users
    pub async fn search_users(&self, search: &UserSearch) -> Result<Vec<UserWithContacts>> {
        self.users.search_users(search).await
    }

    pub async fn register_phone(&self, user_id: Uuid, phone: &str) -> Result<ContactUpdate> {
        self.registry.register_phone(user_id, phone).await
    }

    pub async fn change_phone(&self, user_id: Uuid, old_phone: &str, new_phone: &str) -> Result<ContactUpdate> {
        self.registry.change_phone(user_id, old_phone, new_phone).await
    }

    pub async fn remove_phone(&self, user_id: Uuid, phone: &str) -> Result<()> {
        self.registry.remove_phone(user_id, phone).await
    }

    pub async fn register_email(&self, user_id: Uuid, email: &str) -> Result<ContactUpdate> {
        self.registry.register_email(user_id, email).await
    }

    pub async fn change_email(&self, user_id: Uuid, old_email: &str, new_email: &str) -> Result<ContactUpdate> {
        self.registry.change_email(user_id, old_email, new_email).await
    }

    pub async fn remove_email(&self, user_id: Uuid, email: &str) -> Result<()> {
        self.registry.remove_email(user_id, email).await
    }

    /// Transfer funds between two accounts
    pub async fn transfer(&self, sender_id: Uuid, recipient_id: Uuid, amount: i64) -> Result<TransferResult> {
        self.ledger.transfer(sender_id, recipient_id, amount).await
    }

    /// Run one interest accrual sweep now
    pub async fn accrue_interest(&self) -> Result<AccrualReport> {
        self.ledger.accrue_interest().await
    }

    /// Start the recurring accrual sweep
    pub fn start_accrual(&self, cancellation_token: CancellationToken) -> JoinHandle<()> {
        info!("Scheduling interest accrual every {:?}", self.accrual_interval);
        spawn_accrual_task(self.ledger.clone(), self.accrual_interval, cancellation_token)
    }
}
