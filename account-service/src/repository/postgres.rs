//! PostgreSQL repository
//!
//! Uniqueness of logins, phones and emails is enforced by unique constraints;
//! a violation surfaces as `AlreadyExists`. Contact foreign keys are deferred,
//! which lets a signup insert its contacts before the user row and so report
//! conflicts in phone, email, login order.

use async_trait::async_trait;
use common::db::{self, DbPool};
use common::error::{Error, Result};
use common::model::{BalanceChange, Contact, ContactKind, NewUserRecord, User};
use sqlx::postgres::PgRow;
use sqlx::{Postgres, Row, Transaction};
use tracing::{debug, error, info};
use uuid::Uuid;

use super::BankRepository;
use crate::config::AccountServiceConfig;

const USER_COLUMNS: &str =
    "id, login, name, birthday, account_balance, interest_ceiling, created_at, updated_at";

/// PostgreSQL repository for users and contacts
pub struct PostgresBankRepository {
    /// Database connection pool
    pool: DbPool,
}

impl PostgresBankRepository {
    /// Create a new PostgreSQL repository, falling back to `DATABASE_URL`
    pub async fn new(database_url: Option<String>) -> Result<Self> {
        let pool = match database_url {
            Some(url) => db::connect(&url, 5).await?,
            None => db::init_db_pool().await?,
        };

        Ok(Self::from_pool(pool))
    }

    /// Create a new PostgreSQL repository with configuration
    pub async fn with_config(config: &AccountServiceConfig) -> Result<Self> {
        info!("Connecting to PostgreSQL database with pool size: {}", config.db_pool_size);
        let pool = db::connect(&config.database_url, config.db_pool_size).await?;

        Ok(Self::from_pool(pool))
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Apply pending schema migrations
    pub async fn migrate(&self) -> Result<()> {
        db::run_migrations(&self.pool).await
    }
}

/// Table and value column holding contacts of a kind
fn contact_table(kind: ContactKind) -> (&'static str, &'static str) {
    match kind {
        ContactKind::Phone => ("phone_numbers", "phone_number"),
        ContactKind::Email => ("emails", "email"),
    }
}

fn user_from_row(row: &PgRow) -> Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        login: row.try_get("login")?,
        name: row.try_get("name")?,
        birthday: row.try_get("birthday")?,
        balance: row.try_get("account_balance")?,
        interest_ceiling: row.try_get("interest_ceiling")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn contact_from_row(kind: ContactKind, row: &PgRow) -> Result<Contact> {
    let (_, column) = contact_table(kind);
    Ok(Contact {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        kind,
        value: row.try_get(column)?,
        created_at: row.try_get("created_at")?,
    })
}

/// Translate a unique-constraint violation into `AlreadyExists`
fn map_unique_violation<F>(err: sqlx::Error, message: F) -> Error
where
    F: FnOnce() -> String,
{
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => Error::AlreadyExists(message()),
        _ => Error::Database(err),
    }
}

async fn insert_contact_tx(tx: &mut Transaction<'static, Postgres>, contact: &Contact) -> Result<()> {
    let (table, column) = contact_table(contact.kind);
    let query = format!(
        "INSERT INTO {} (id, user_id, {}, created_at) VALUES ($1, $2, $3, $4)",
        table, column
    );

    sqlx::query(&query)
        .bind(contact.id)
        .bind(contact.user_id)
        .bind(&contact.value)
        .bind(contact.created_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_unique_violation(e, || {
            format!("{} {} is already in use", contact.kind.label(), contact.value)
        }))?;

    Ok(())
}

async fn rollback(tx: Transaction<'static, Postgres>) {
    if let Err(rollback_err) = tx.rollback().await {
        error!("Failed to roll back transaction: {}", rollback_err);
    }
}

#[async_trait]
impl BankRepository for PostgresBankRepository {
    async fn find_user(&self, id: Uuid) -> Result<Option<User>> {
        debug!("Getting user from database: {}", id);

        let query = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn user_exists(&self, id: Uuid) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.is_some())
    }

    async fn login_exists(&self, login: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM users WHERE login = $1")
            .bind(login)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.is_some())
    }

    async fn list_user_ids(&self) -> Result<Vec<Uuid>> {
        let rows = sqlx::query("SELECT id FROM users ORDER BY seq")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| row.try_get::<Uuid, _>("id").map_err(Error::from))
            .collect()
    }

    async fn find_all_users(&self) -> Result<Vec<User>> {
        let query = format!("SELECT {} FROM users ORDER BY seq", USER_COLUMNS);
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(user_from_row).collect()
    }

    async fn create_user(&self, record: NewUserRecord) -> Result<User> {
        debug!("Creating user in database: {}", record.user.login);

        let mut tx = self.pool.begin().await?;

        let result = async {
            for contact in record.phones.iter().chain(record.emails.iter()) {
                insert_contact_tx(&mut tx, contact).await?;
            }

            let user = &record.user;
            sqlx::query(
                "INSERT INTO users (id, login, name, birthday, account_balance, interest_ceiling, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
            )
            .bind(user.id)
            .bind(&user.login)
            .bind(&user.name)
            .bind(user.birthday)
            .bind(user.balance)
            .bind(user.interest_ceiling)
            .bind(user.created_at)
            .bind(user.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_unique_violation(e, || {
                format!("User with login {} already exists", user.login)
            }))?;

            Ok::<(), Error>(())
        }.await;

        match result {
            Ok(()) => {
                tx.commit().await?;
                Ok(record.user)
            }
            Err(e) => {
                rollback(tx).await;
                Err(e)
            }
        }
    }

    async fn save_balances(&self, changes: &[BalanceChange]) -> Result<()> {
        if let Some(change) = changes.iter().find(|change| change.new_balance < 0) {
            return Err(Error::ValidationError(format!(
                "Balance of user {} cannot become negative", change.user_id
            )));
        }

        // Row locks are taken in ascending id order.
        let mut ordered = changes.to_vec();
        ordered.sort_by_key(|change| change.user_id);

        let mut tx = self.pool.begin().await?;

        let result = async {
            for change in &ordered {
                let updated = sqlx::query(
                    "UPDATE users SET account_balance = $1, updated_at = NOW()
                     WHERE id = $2 AND account_balance = $3"
                )
                .bind(change.new_balance)
                .bind(change.user_id)
                .bind(change.expected)
                .execute(&mut *tx)
                .await?;

                if updated.rows_affected() == 1 {
                    continue;
                }

                let current: Option<i64> = sqlx::query_scalar("SELECT account_balance FROM users WHERE id = $1")
                    .bind(change.user_id)
                    .fetch_optional(&mut *tx)
                    .await?;

                return Err(match current {
                    None => Error::NotFound(format!("User with id {} does not exist", change.user_id)),
                    Some(found) => Error::Conflict(format!(
                        "Balance of user {} changed concurrently: expected {}, found {}",
                        change.user_id, change.expected, found
                    )),
                });
            }
            Ok::<(), Error>(())
        }.await;

        match result {
            Ok(()) => {
                tx.commit().await?;
                Ok(())
            }
            Err(e) => {
                rollback(tx).await;
                Err(e)
            }
        }
    }

    async fn contact_exists(&self, kind: ContactKind, value: &str) -> Result<bool> {
        let (table, column) = contact_table(kind);
        let query = format!("SELECT 1 FROM {} WHERE {} = $1", table, column);

        let row = sqlx::query(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.is_some())
    }

    async fn find_contact(&self, kind: ContactKind, value: &str) -> Result<Option<Contact>> {
        let (table, column) = contact_table(kind);
        let query = format!(
            "SELECT id, user_id, {column}, created_at FROM {table} WHERE {column} = $1"
        );

        let row = sqlx::query(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(|row| contact_from_row(kind, row)).transpose()
    }

    async fn find_contacts_by_owner(&self, kind: ContactKind, user_id: Uuid) -> Result<Vec<Contact>> {
        let (table, column) = contact_table(kind);
        let query = format!(
            "SELECT id, user_id, {column}, created_at FROM {table} WHERE user_id = $1 ORDER BY seq"
        );

        let rows = sqlx::query(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(|row| contact_from_row(kind, row)).collect()
    }

    async fn insert_contact(&self, contact: Contact) -> Result<Contact> {
        debug!("Inserting {} {} for user {}", contact.kind, contact.value, contact.user_id);

        let mut tx = self.pool.begin().await?;
        match insert_contact_tx(&mut tx, &contact).await {
            Ok(()) => {
                // The deferred foreign key is checked here.
                tx.commit().await.map_err(|e| match &e {
                    sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                        Error::NotFound(format!("User with id {} does not exist", contact.user_id))
                    }
                    _ => Error::Database(e),
                })?;
                Ok(contact)
            }
            Err(e) => {
                rollback(tx).await;
                Err(e)
            }
        }
    }

    async fn update_contact_value(&self, kind: ContactKind, id: Uuid, new_value: &str) -> Result<Contact> {
        let (table, column) = contact_table(kind);
        let query = format!(
            "UPDATE {table} SET {column} = $1 WHERE id = $2 RETURNING id, user_id, {column}, created_at"
        );

        let row = sqlx::query(&query)
            .bind(new_value)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_unique_violation(e, || {
                format!("{} {} is already in use", kind.label(), new_value)
            }))?;

        match row {
            Some(row) => contact_from_row(kind, &row),
            None => Err(Error::NotFound(format!("{} with id {} not found", kind.label(), id))),
        }
    }

    async fn delete_contact(&self, kind: ContactKind, id: Uuid) -> Result<()> {
        let (table, _) = contact_table(kind);
        let not_found = || Error::NotFound(format!("{} with id {} not found", kind.label(), id));

        let mut tx = self.pool.begin().await?;

        let result = async {
            let owner: Uuid = sqlx::query_scalar(&format!("SELECT user_id FROM {} WHERE id = $1", table))
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(not_found)?;

            // Deletes for one owner queue on the user row, whichever process issues them.
            sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
                .bind(owner)
                .fetch_optional(&mut *tx)
                .await?;

            let query = format!(
                "DELETE FROM {table} WHERE id = $1
                 AND (SELECT count(*) FROM {table} WHERE user_id = $2) > 1"
            );
            let deleted = sqlx::query(&query)
                .bind(id)
                .bind(owner)
                .execute(&mut *tx)
                .await?;

            if deleted.rows_affected() == 1 {
                return Ok::<(), Error>(());
            }

            let still_there = sqlx::query(&format!("SELECT 1 FROM {} WHERE id = $1", table))
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;

            Err(match still_there {
                Some(_) => Error::Conflict(format!(
                    "Cannot delete the only {} of user {}", kind.label().to_lowercase(), owner
                )),
                None => not_found(),
            })
        }.await;

        match result {
            Ok(()) => {
                tx.commit().await?;
                Ok(())
            }
            Err(e) => {
                rollback(tx).await;
                Err(e)
            }
        }
    }
}
