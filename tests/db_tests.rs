// Schema-level persistence tests
// Run with: cargo test --features db_tests --test db_tests -- --ignored

#![cfg(feature = "db_tests")]

#[cfg(test)]
mod db_persistence_tests {
    use std::env;
    use std::sync::Arc;

    use account_service::{AccountService, AccountServiceConfig, PostgresBankRepository};
    use chrono::NaiveDate;
    use common::model::NewUser;
    use sqlx::{postgres::PgPoolOptions, PgPool, Row};
    use tokio::runtime::Runtime;
    use uuid::Uuid;

    // Helper function to run async tests against a migrated database
    fn run_db_test<F>(test: F)
    where
        F: FnOnce(PgPool) -> futures::future::BoxFuture<'static, ()> + Send + 'static,
    {
        dotenv::dotenv().ok();

        // Skip test if TEST_DATABASE_URL is not set
        let db_url = match env::var("TEST_DATABASE_URL") {
            Ok(url) => url,
            Err(_) => {
                println!("Skipping database test: TEST_DATABASE_URL not set");
                return;
            }
        };

        let rt = Runtime::new().unwrap();

        rt.block_on(async {
            let pool = match PgPoolOptions::new()
                .max_connections(5)
                .connect(&db_url)
                .await
            {
                Ok(pool) => pool,
                Err(err) => {
                    println!("Skipping database test: could not connect to database: {}", err);
                    return;
                }
            };

            common::db::run_migrations(&pool).await.expect("Failed to run migrations");
            test(pool).await;
        });
    }

    fn tag() -> String {
        Uuid::new_v4().simple().to_string()
    }

    async fn insert_user(pool: &PgPool, balance: i64) -> Uuid {
        let id = Uuid::new_v4();
        sqlx::query("
            INSERT INTO users (id, login, name, birthday, account_balance, interest_ceiling)
            VALUES ($1, $2, 'schema test', '1990-01-01', $3, $4)
        ")
        .bind(id)
        .bind(format!("schema-{}", tag()))
        .bind(balance)
        .bind(balance * 2)
        .execute(pool)
        .await
        .expect("Failed to insert user");
        id
    }

    #[test]
    #[ignore = "Requires test database, run with RUST_TEST_THREADS=1 cargo test -- --ignored"]
    fn test_contact_values_are_unique() {
        run_db_test(|pool| {
            Box::pin(async move {
                let first = insert_user(&pool, 10).await;
                let second = insert_user(&pool, 10).await;
                let email = format!("{}@schema.test", tag());

                sqlx::query("INSERT INTO emails (id, user_id, email) VALUES ($1, $2, $3)")
                    .bind(Uuid::new_v4())
                    .bind(first)
                    .bind(&email)
                    .execute(&pool)
                    .await
                    .expect("Failed to insert email");

                let err = sqlx::query("INSERT INTO emails (id, user_id, email) VALUES ($1, $2, $3)")
                    .bind(Uuid::new_v4())
                    .bind(second)
                    .bind(&email)
                    .execute(&pool)
                    .await
                    .unwrap_err();

                let db_err = err.as_database_error().expect("expected a database error");
                assert!(db_err.is_unique_violation());
            })
        });
    }

    #[test]
    #[ignore = "Requires test database, run with RUST_TEST_THREADS=1 cargo test -- --ignored"]
    fn test_negative_balance_rejected() {
        run_db_test(|pool| {
            Box::pin(async move {
                let id = insert_user(&pool, 10).await;

                let result = sqlx::query("UPDATE users SET account_balance = -1 WHERE id = $1")
                    .bind(id)
                    .execute(&pool)
                    .await;
                assert!(result.is_err());

                let row = sqlx::query("SELECT account_balance FROM users WHERE id = $1")
                    .bind(id)
                    .fetch_one(&pool)
                    .await
                    .expect("Failed to read user");
                assert_eq!(row.get::<i64, _>("account_balance"), 10);
            })
        });
    }

    // Contacts may be written before their owner inside one transaction
    #[test]
    #[ignore = "Requires test database, run with RUST_TEST_THREADS=1 cargo test -- --ignored"]
    fn test_owner_check_is_deferred_to_commit() {
        run_db_test(|pool| {
            Box::pin(async move {
                let owner = Uuid::new_v4();
                let phone = format!("+{}", &tag()[..14]);

                let mut tx = pool.begin().await.expect("Failed to start transaction");
                sqlx::query("INSERT INTO phone_numbers (id, user_id, phone_number) VALUES ($1, $2, $3)")
                    .bind(Uuid::new_v4())
                    .bind(owner)
                    .bind(&phone)
                    .execute(&mut *tx)
                    .await
                    .expect("Failed to insert phone");
                sqlx::query("
                    INSERT INTO users (id, login, name, birthday, account_balance)
                    VALUES ($1, $2, 'deferred', '1990-01-01', 1)
                ")
                .bind(owner)
                .bind(format!("deferred-{}", tag()))
                .execute(&mut *tx)
                .await
                .expect("Failed to insert user");
                tx.commit().await.expect("Failed to commit transaction");

                // Orphan contact fails at commit
                let mut tx = pool.begin().await.expect("Failed to start transaction");
                sqlx::query("INSERT INTO phone_numbers (id, user_id, phone_number) VALUES ($1, $2, $3)")
                    .bind(Uuid::new_v4())
                    .bind(Uuid::new_v4())
                    .bind(format!("+{}", &tag()[..14]))
                    .execute(&mut *tx)
                    .await
                    .expect("Failed to insert phone");
                assert!(tx.commit().await.is_err());
            })
        });
    }

    #[test]
    #[ignore = "Requires test database, run with RUST_TEST_THREADS=1 cargo test -- --ignored"]
    fn test_failed_signup_rolls_back() {
        run_db_test(|pool| {
            Box::pin(async move {
                let repo = Arc::new(PostgresBankRepository::from_pool(pool.clone()));
                let config = AccountServiceConfig::new(String::new(), 1);
                let service = AccountService::from_repository(repo, &config);

                let login = format!("rollback-{}", tag());
                let new_user = |phone: String, email: String| NewUser {
                    login: login.clone(),
                    name: "rollback".to_string(),
                    birthday: NaiveDate::from_ymd_opt(1980, 2, 2).unwrap(),
                    initial_balance: 50,
                    interest_ceiling: None,
                    phones: vec![phone],
                    emails: vec![email],
                };

                service
                    .create_user(new_user(format!("+{}", &tag()[..14]), format!("{}@rb.test", tag())))
                    .await
                    .expect("Failed to create user");

                let phone = format!("+{}", &tag()[..14]);
                assert!(service.create_user(new_user(phone.clone(), format!("{}@rb.test", tag()))).await.is_err());

                let row = sqlx::query("SELECT COUNT(*) AS n FROM phone_numbers WHERE phone_number = $1")
                    .bind(&phone)
                    .fetch_one(&pool)
                    .await
                    .expect("Failed to count phones");
                assert_eq!(row.get::<i64, _>("n"), 0);
            })
        });
    }
}
