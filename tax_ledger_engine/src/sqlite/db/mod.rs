//! # SQLite Database methods
//!
//! This module contains "low-level" SQLite database interactions.
//!
//! All these interactions are maintained by simple functions (rather than stateful structs) that accept a
//! `&mut SqliteConnection` argument. Callers can obtain a connection from a pool, or create an atomic transaction
//! as the need arises and call through to the functions without any other changes.
use std::env;

use log::info;
use sqlx::{sqlite::SqlitePoolOptions, Error as SqlxError, SqlitePool};

pub mod import_jobs;
pub mod integrations;
pub mod transactions;
pub mod webhook_subs;

const SQLITE_DB_URL: &str = "sqlite://data/tax_ledger.db";

pub fn db_url() -> String {
    let result = env::var("STT_DATABASE_URL").unwrap_or_else(|_| {
        info!("STT_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect(url).await?;
    Ok(pool)
}

/// Apply the embedded schema. Every statement is idempotent, so this is safe to run on every startup.
pub async fn create_schema(pool: &SqlitePool) -> Result<(), SqlxError> {
    let schema = include_str!("schema.sql");
    for statement in schema.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
