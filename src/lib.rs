//! pgroll-rs: a zero-downtime schema migration execution engine for
//! PostgreSQL-compatible databases.
//!
//! A migration document (`migration::Migration`) is a sequence of typed
//! operations (`operation`), each moving the in-memory `schema::Schema`
//! model through Validate/Start/Complete/Rollback while emitting the
//! `dbaction::DbAction`s that bring the real database to the same state.
//! `coordinator::Coordinator` dedupes and orders those actions within a
//! phase; `engine::Engine` runs the phases; `interfaces` defines the
//! external collaborators (driver connection, migration-state persistence,
//! backfill row-copier, versioned-view manager) this crate never implements
//! directly.

pub mod config;
pub mod coordinator;
pub mod dbaction;
pub mod engine;
pub mod error;
pub mod interfaces;
pub mod migration;
pub mod operation;
pub mod schema;
pub mod testutil;
pub mod trigger;

pub use config::Config;
pub use engine::Engine;
pub use error::EngineError;
pub use migration::Migration;
pub use operation::{Operation, OperationTag};
pub use schema::Schema;
