//! Shared fixtures for the integration tests: a seeded in-memory data service
//! and signed-in request contexts.

#![allow(dead_code)]

use chrono::{Duration, Utc};
use inventario::config::RoutesConfig;
use inventario::session::{GuardPolicy, Identity, RequestContext, Role, Route, SessionGuard};
use inventario::{InMemoryDataService, Item, ItemStatus, Session};
use std::sync::Arc;

pub const USER_ID: &str = "u-ana";
pub const USER_EMAIL: &str = "ana@example.com";

/// Store with the catalog used across scenarios:
/// A1 (X100, stock 5), B2 (Y200, stock 3) and C3 (X150, deactivated)
pub async fn seeded_store() -> Arc<InMemoryDataService> {
    let store = Arc::new(InMemoryDataService::default());
    store.insert_item(Item::new("A1", "Norte", "X100", 5)).await;
    store.insert_item(Item::new("B2", "Sur", "Y200", 3)).await;

    let mut retired = Item::new("C3", "Norte", "X150", 8);
    retired.estado = ItemStatus::Desactivado;
    retired.deleted_at = Some(Utc::now() - Duration::days(2));
    store.insert_item(retired).await;
    store
}

pub fn signed_in(route: Route) -> RequestContext {
    RequestContext::new(
        "test-correlation",
        route,
        Some(Identity {
            user_id: USER_ID.to_string(),
            email: USER_EMAIL.to_string(),
        }),
        Role::Usuario,
    )
}

pub async fn session_expiring_in(store: &InMemoryDataService, lifetime: Duration) -> Session {
    store
        .issue_session(USER_ID, USER_EMAIL, Utc::now() + lifetime)
        .await
}

pub fn guard_for(store: Arc<InMemoryDataService>) -> SessionGuard {
    let policy = GuardPolicy::new(&RoutesConfig::default()).unwrap();
    SessionGuard::new(policy, store, Duration::minutes(5))
}
