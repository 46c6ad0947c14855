//! # deskflow-store
//!
//! Persistent storage for Deskflow, backed by SQLite.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection` and provides typed CRUD helpers for tickets,
//! activities, documents and users.  Uploaded file bytes go through the
//! [`DocumentStore`] trait; only their paths are kept in the database.

pub mod activities;
pub mod database;
pub mod deadline;
pub mod documents;
pub mod migrations;
pub mod models;
pub mod summary;
pub mod tickets;
pub mod users;

mod error;

pub use database::Database;
pub use deadline::Deadline;
pub use documents::DocumentStore;
pub use error::{Result, StoreError};
pub use models::*;
pub use tickets::MAX_NUMBER_ATTEMPTS;
