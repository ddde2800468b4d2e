//! # Tax sync server
//! This module hosts the synchronization server. It is responsible for:
//! Listening for incoming webhook requests from the commerce platform, authenticating them, and routing the events
//! into the ledger engine.
//! Running historical backfill imports on background workers.
//! Keeping the remote webhook subscriptions healthy via the reconciliation worker.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/shopify/webhook`: The webhook route for receiving order events from the platform.
//! * `/api/...`: Backfill, reconciliation and sync-status endpoints.

pub mod backfill;
pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod integrations;
pub mod middleware;
pub mod reconciler;
pub mod routes;
pub mod server;
pub mod signature;
pub mod webhook_routes;

#[cfg(test)]
mod endpoint_tests;
