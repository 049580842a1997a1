#![allow(dead_code)]

use podsync_api::config::ApiConfig;
use podsync_config::shared::{IntoConnectOptions, PgConnectionConfig};
use podsync_config::{Environment, load_config};
use sqlx::{Connection, Executor, PgConnection, PgPool};
use uuid::Uuid;

/// Database settings of the dev configuration, pointed at a fresh, randomly named database.
pub fn test_database_config() -> PgConnectionConfig {
    Environment::Dev.set();

    let mut config = load_config::<ApiConfig>().expect("Failed to read configuration");
    // We use a random database name.
    config.database.name = format!("podsync_test_{}", Uuid::new_v4());

    config.database
}

/// Creates the database named in `config` and runs all migrations from "./migrations" on it.
///
/// Returns a [`PgPool`] connected to the new database. Panics if creation or migration fails.
pub async fn create_podsync_api_database(config: &PgConnectionConfig) -> PgPool {
    // Create the database via a single connection.
    let mut connection = PgConnection::connect_with(&config.without_db())
        .await
        .expect("Failed to connect to Postgres");
    connection
        .execute(&*format!(r#"create database "{}";"#, config.name))
        .await
        .expect("Failed to create database");

    let connection_pool = PgPool::connect_with(config.with_db())
        .await
        .expect("Failed to connect to Postgres");

    sqlx::migrate!("./migrations")
        .run(&connection_pool)
        .await
        .expect("Failed to migrate the database");

    connection_pool
}

/// Terminates the remaining connections to the database named in `config` and drops it.
pub async fn drop_pg_database(config: &PgConnectionConfig) {
    let mut connection = PgConnection::connect_with(&config.without_db())
        .await
        .expect("Failed to connect to Postgres");

    connection
        .execute(&*format!(
            r#"
            select pg_terminate_backend(pg_stat_activity.pid)
            from pg_stat_activity
            where pg_stat_activity.datname = '{}'
            and pid <> pg_backend_pid();"#,
            config.name
        ))
        .await
        .expect("Failed to terminate database connections");

    connection
        .execute(&*format!(r#"drop database if exists "{}";"#, config.name))
        .await
        .expect("Failed to destroy database");
}
