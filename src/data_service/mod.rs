//! Data service abstractions
//!
//! The hosted store owns persistence, sessions and roles. This module is the
//! narrow boundary the rest of the crate talks to, so the catalog and the
//! lifecycle workflow can run against SQLite, the in-memory backend, or a
//! `mockall` mock without knowing which.

pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

use crate::inventory::{Item, ItemQuery, ItemUpdate, Movement, NewMovement};
use crate::session::{Role, Session};

pub use memory::{Fault, InMemoryDataService};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataServiceError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("write rejected by data service: {message}")]
    Rejected { message: String },
    #[error("data service unavailable: {message}")]
    Unavailable { message: String },
    #[error("invalid record returned by data service: {message}")]
    InvalidRecord { message: String },
}

impl DataServiceError {
    /// Connectivity problems may succeed if tried again; everything else won't
    pub fn is_transient(&self) -> bool {
        matches!(self, DataServiceError::Unavailable { .. })
    }
}

/// Read/write gateway to the hosted store
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DataService: Send + Sync {
    /// Items matching every constraint in `query`, in store order
    async fn query_items(&self, query: &ItemQuery) -> Result<Vec<Item>, DataServiceError>;

    async fn fetch_item(&self, id: &str) -> Result<Option<Item>, DataServiceError>;

    /// Fails with `NotFound` when no row has this id
    async fn update_item(&self, id: &str, update: &ItemUpdate) -> Result<(), DataServiceError>;

    async fn insert_movement(&self, movement: &NewMovement) -> Result<Movement, DataServiceError>;

    /// Ledger entries of one item, newest first
    async fn list_movements(&self, item_id: &str) -> Result<Vec<Movement>, DataServiceError>;

    /// Role from `users_custom_data`, `None` when the user has no row
    async fn fetch_role(&self, user_id: &str) -> Result<Option<Role>, DataServiceError>;

    /// Session for an access token, `None` when the token is unknown
    async fn get_session(&self, access_token: &str) -> Result<Option<Session>, DataServiceError>;

    /// Re-issue a session with a fresh token and expiry
    async fn refresh_session(&self, access_token: &str) -> Result<Session, DataServiceError>;

    async fn sign_out(&self, access_token: &str) -> Result<(), DataServiceError>;

    /// Open a transaction spanning an item update and its ledger append
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>, DataServiceError>;
}

/// Unit of work for a lifecycle transition. Dropping it without `commit`
/// discards every write made through it.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LedgerTransaction: Send {
    async fn update_item(&mut self, id: &str, update: &ItemUpdate) -> Result<(), DataServiceError>;

    async fn fetch_item(&mut self, id: &str) -> Result<Option<Item>, DataServiceError>;

    async fn insert_movement(&mut self, movement: &NewMovement) -> Result<Movement, DataServiceError>;

    async fn commit(&mut self) -> Result<(), DataServiceError>;

    async fn rollback(&mut self) -> Result<(), DataServiceError>;
}
