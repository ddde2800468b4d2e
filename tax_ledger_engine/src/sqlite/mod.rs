//! SQLite backend for the tax ledger engine.

mod sqlite_impl;

pub mod db;
pub use sqlite_impl::SqliteDatabase;
