// Inventario Library - inventory item lifecycle with an audit ledger
// This exposes the core components for testing and integration

pub mod catalog;
pub mod config;
pub mod data_service;
pub mod database;
pub mod errors;
pub mod inventory;
pub mod lifecycle;
pub mod session;
pub mod telemetry;

// Re-export key types for easy access
pub use catalog::{CatalogController, CatalogView, ListTicket};
pub use config::InventarioConfig;
pub use data_service::{DataService, DataServiceError, InMemoryDataService, LedgerTransaction};
pub use database::DatabaseManager;
pub use errors::InventoryError;
pub use inventory::{Item, ItemQuery, ItemStatus, ItemUpdate, Movement, MovementType, NewMovement};
pub use lifecycle::{LifecycleWorkflow, TransitionOutcome};
pub use session::{
    resolve_context, GuardDecision, GuardOutcome, GuardPolicy, Identity, RequestContext, Role,
    Route, Session, SessionGuard,
};
pub use telemetry::{create_request_span, generate_correlation_id, init_telemetry, shutdown_telemetry};
