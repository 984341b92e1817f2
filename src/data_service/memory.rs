// In-memory data service backend, used for tests and for running without a database

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use super::{DataService, DataServiceError, LedgerTransaction};
use crate::inventory::{Item, ItemQuery, ItemUpdate, Movement, NewMovement};
use crate::session::{Role, Session};

/// Failures the backend can be told to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    /// `query_items` and `fetch_item` report the store as unavailable
    QueryFailure,
    /// Item updates are rejected
    RejectItemUpdates,
    /// Movement inserts are rejected
    RejectMovements,
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    items: Vec<Item>,
    movements: Vec<Movement>,
    roles: HashMap<String, Role>,
    sessions: HashMap<String, Session>,
    faults: HashSet<Fault>,
}

impl MemoryState {
    fn check(&self, fault: Fault) -> Result<(), DataServiceError> {
        if !self.faults.contains(&fault) {
            return Ok(());
        }
        Err(match fault {
            Fault::QueryFailure => DataServiceError::Unavailable {
                message: "injected query failure".to_string(),
            },
            Fault::RejectItemUpdates => DataServiceError::Rejected {
                message: "injected item update rejection".to_string(),
            },
            Fault::RejectMovements => DataServiceError::Rejected {
                message: "injected movement rejection".to_string(),
            },
        })
    }

    fn fetch_item(&self, id: &str) -> Result<Option<Item>, DataServiceError> {
        self.check(Fault::QueryFailure)?;
        Ok(self.items.iter().find(|item| item.id == id).cloned())
    }

    fn update_item(&mut self, id: &str, update: &ItemUpdate) -> Result<(), DataServiceError> {
        self.check(Fault::RejectItemUpdates)?;
        let item = self
            .items
            .iter_mut()
            .find(|item| item.id == id)
            .ok_or_else(|| DataServiceError::NotFound {
                entity: "elemento",
                id: id.to_string(),
            })?;
        item.apply(update);
        Ok(())
    }

    fn insert_movement(&mut self, movement: &NewMovement) -> Result<Movement, DataServiceError> {
        self.check(Fault::RejectMovements)?;
        if !self.items.iter().any(|item| item.id == movement.elemento_id) {
            return Err(DataServiceError::Rejected {
                message: format!("unknown elemento_id {}", movement.elemento_id),
            });
        }
        let stored = Movement::record(movement, Utc::now());
        self.movements.push(stored.clone());
        Ok(stored)
    }
}

/// Store kept behind a single async mutex. Transactions hold the lock for
/// their whole lifetime, so lifecycle transitions are serialised.
#[derive(Debug, Clone)]
pub struct InMemoryDataService {
    state: Arc<Mutex<MemoryState>>,
    session_ttl: Duration,
}

impl Default for InMemoryDataService {
    fn default() -> Self {
        Self::new(Duration::hours(1))
    }
}

impl InMemoryDataService {
    pub fn new(session_ttl: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            session_ttl,
        }
    }

    /// Store an item row as given, without checking its consistency
    pub async fn insert_item(&self, item: Item) {
        self.state.lock().await.items.push(item);
    }

    pub async fn item(&self, id: &str) -> Option<Item> {
        self.state
            .lock()
            .await
            .items
            .iter()
            .find(|item| item.id == id)
            .cloned()
    }

    /// Every ledger entry in insertion order
    pub async fn movements(&self) -> Vec<Movement> {
        self.state.lock().await.movements.clone()
    }

    pub async fn set_role(&self, user_id: &str, role: Role) {
        self.state
            .lock()
            .await
            .roles
            .insert(user_id.to_string(), role);
    }

    /// Issue a session the way the auth provider would after a login
    pub async fn issue_session(&self, user_id: &str, email: &str, expires_at: DateTime<Utc>) -> Session {
        let session = Session {
            user_id: user_id.to_string(),
            email: email.to_string(),
            access_token: uuid::Uuid::new_v4().to_string(),
            expires_at,
        };
        self.state
            .lock()
            .await
            .sessions
            .insert(session.access_token.clone(), session.clone());
        session
    }

    pub async fn inject_fault(&self, fault: Fault) {
        self.state.lock().await.faults.insert(fault);
    }

    pub async fn clear_faults(&self) {
        self.state.lock().await.faults.clear();
    }
}

#[async_trait]
impl DataService for InMemoryDataService {
    async fn query_items(&self, query: &ItemQuery) -> Result<Vec<Item>, DataServiceError> {
        let state = self.state.lock().await;
        state.check(Fault::QueryFailure)?;
        Ok(state
            .items
            .iter()
            .filter(|item| item.matches(query))
            .cloned()
            .collect())
    }

    async fn fetch_item(&self, id: &str) -> Result<Option<Item>, DataServiceError> {
        self.state.lock().await.fetch_item(id)
    }

    async fn update_item(&self, id: &str, update: &ItemUpdate) -> Result<(), DataServiceError> {
        self.state.lock().await.update_item(id, update)
    }

    async fn insert_movement(&self, movement: &NewMovement) -> Result<Movement, DataServiceError> {
        self.state.lock().await.insert_movement(movement)
    }

    async fn list_movements(&self, item_id: &str) -> Result<Vec<Movement>, DataServiceError> {
        let state = self.state.lock().await;
        state.check(Fault::QueryFailure)?;
        Ok(state
            .movements
            .iter()
            .rev()
            .filter(|movement| movement.elemento_id == item_id)
            .cloned()
            .collect())
    }

    async fn fetch_role(&self, user_id: &str) -> Result<Option<Role>, DataServiceError> {
        Ok(self.state.lock().await.roles.get(user_id).copied())
    }

    async fn get_session(&self, access_token: &str) -> Result<Option<Session>, DataServiceError> {
        Ok(self.state.lock().await.sessions.get(access_token).cloned())
    }

    async fn refresh_session(&self, access_token: &str) -> Result<Session, DataServiceError> {
        let mut state = self.state.lock().await;
        let current = state
            .sessions
            .remove(access_token)
            .ok_or_else(|| DataServiceError::NotFound {
                entity: "session",
                id: access_token.to_string(),
            })?;
        let refreshed = Session {
            access_token: uuid::Uuid::new_v4().to_string(),
            expires_at: Utc::now() + self.session_ttl,
            ..current
        };
        state
            .sessions
            .insert(refreshed.access_token.clone(), refreshed.clone());
        Ok(refreshed)
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), DataServiceError> {
        self.state.lock().await.sessions.remove(access_token);
        Ok(())
    }

    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>, DataServiceError> {
        let guard = self.state.clone().lock_owned().await;
        let snapshot = guard.clone();
        Ok(Box::new(MemoryTransaction {
            guard: Some(guard),
            snapshot,
        }))
    }
}

/// Writes go straight to the locked state; the snapshot taken at `begin`
/// is restored on rollback or when dropped uncommitted.
struct MemoryTransaction {
    guard: Option<OwnedMutexGuard<MemoryState>>,
    snapshot: MemoryState,
}

impl MemoryTransaction {
    fn state(&mut self) -> Result<&mut MemoryState, DataServiceError> {
        self.guard
            .as_deref_mut()
            .ok_or_else(|| DataServiceError::Rejected {
                message: "transaction already finished".to_string(),
            })
    }

    fn restore(&mut self) {
        if let Some(mut guard) = self.guard.take() {
            *guard = std::mem::take(&mut self.snapshot);
            debug!("In-memory transaction rolled back");
        }
    }
}

#[async_trait]
impl LedgerTransaction for MemoryTransaction {
    async fn update_item(&mut self, id: &str, update: &ItemUpdate) -> Result<(), DataServiceError> {
        self.state()?.update_item(id, update)
    }

    async fn fetch_item(&mut self, id: &str) -> Result<Option<Item>, DataServiceError> {
        self.state()?.fetch_item(id)
    }

    async fn insert_movement(&mut self, movement: &NewMovement) -> Result<Movement, DataServiceError> {
        self.state()?.insert_movement(movement)
    }

    async fn commit(&mut self) -> Result<(), DataServiceError> {
        self.state()?;
        self.guard = None;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DataServiceError> {
        self.state()?;
        self.restore();
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        self.restore();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::{ItemStatus, MovementType};

    fn movement_for(id: &str) -> NewMovement {
        NewMovement {
            elemento_id: id.to_string(),
            tipo_movimiento: MovementType::Desactivacion,
            cantidad: 3,
            usuario_id: "u-1".to_string(),
            observaciones: "prueba".to_string(),
        }
    }

    #[tokio::test]
    async fn dropped_transaction_discards_writes() {
        let store = InMemoryDataService::default();
        store.insert_item(Item::new("A1", "Norte", "X100", 3)).await;

        {
            let mut tx = store.begin().await.unwrap();
            tx.update_item("A1", &ItemUpdate::for_status(ItemStatus::Desactivado, Utc::now()))
                .await
                .unwrap();
            tx.insert_movement(&movement_for("A1")).await.unwrap();
        }

        assert_eq!(store.item("A1").await.unwrap().estado, ItemStatus::Activo);
        assert!(store.movements().await.is_empty());
    }

    #[tokio::test]
    async fn committed_transaction_keeps_writes() {
        let store = InMemoryDataService::default();
        store.insert_item(Item::new("A1", "Norte", "X100", 3)).await;

        let mut tx = store.begin().await.unwrap();
        tx.update_item("A1", &ItemUpdate::for_status(ItemStatus::Desactivado, Utc::now()))
            .await
            .unwrap();
        tx.insert_movement(&movement_for("A1")).await.unwrap();
        tx.commit().await.unwrap();
        drop(tx);

        assert_eq!(store.item("A1").await.unwrap().estado, ItemStatus::Desactivado);
        assert_eq!(store.movements().await.len(), 1);
    }

    #[tokio::test]
    async fn transaction_holds_the_store_until_finished() {
        let store = InMemoryDataService::default();
        store.insert_item(Item::new("A1", "Norte", "X100", 3)).await;

        let mut tx = store.begin().await.unwrap();
        assert!(store.state.try_lock().is_err());

        tx.rollback().await.unwrap();
        assert!(store.state.try_lock().is_ok());
        assert!(tx.commit().await.is_err());
    }

    #[tokio::test]
    async fn update_of_missing_item_is_not_found() {
        let store = InMemoryDataService::default();
        let err = store
            .update_item("nope", &ItemUpdate::for_status(ItemStatus::Activo, Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, DataServiceError::NotFound { .. }));
    }

    #[tokio::test]
    async fn refresh_rotates_the_token() {
        let store = InMemoryDataService::new(Duration::minutes(30));
        let session = store
            .issue_session("u-1", "ana@example.com", Utc::now() + Duration::minutes(1))
            .await;

        let refreshed = store.refresh_session(&session.access_token).await.unwrap();
        assert_ne!(refreshed.access_token, session.access_token);
        assert!(refreshed.expires_at > session.expires_at);
        assert!(store.get_session(&session.access_token).await.unwrap().is_none());
        assert!(store.get_session(&refreshed.access_token).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn placa_filter_folds_non_ascii_letters() {
        let store = InMemoryDataService::default();
        store.insert_item(Item::new("1", "Norte", "ÑANDÚ-1", 1)).await;
        store.insert_item(Item::new("2", "Norte", "NANDU-2", 1)).await;

        let items = store
            .query_items(&ItemQuery::active_catalog("ñandú"))
            .await
            .unwrap();
        let ids: Vec<_> = items.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["1"]);
    }
}
