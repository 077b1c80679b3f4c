//! Account service: contact registry, balance ledger and user lifecycle

pub mod accrual;
pub mod config;
pub mod ledger;
pub mod locks;
pub mod registry;
pub mod repository;
pub mod service;
pub mod users;

pub use accrual::{run_accrual_task, spawn_accrual_task};
pub use config::AccountServiceConfig;
pub use ledger::Ledger;
pub use registry::ContactRegistry;
pub use repository::{BankRepository, InMemoryBankRepository, PostgresBankRepository};
pub use service::{AccountService, RepositoryType};
pub use users::UserService;
