// Item catalog controller: the active-item view and the toggles that change it

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::data_service::DataService;
use crate::errors::InventoryError;
use crate::inventory::{Item, ItemQuery, ItemStatus, Movement};
use crate::lifecycle::{LifecycleWorkflow, TransitionOutcome};
use crate::session::RequestContext;

/// What the catalog page currently shows
#[derive(Debug, Clone, Default, Serialize)]
pub struct CatalogView {
    pub filter: String,
    pub items: Vec<Item>,
    pub loading: bool,
    /// Display-only message of the last failed operation
    pub error: Option<String>,
}

/// Handle for one issued List. Its result is applied only while it is the
/// most recently issued one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListTicket {
    generation: u64,
    filter: String,
}

pub struct CatalogController {
    data: Arc<dyn DataService>,
    workflow: LifecycleWorkflow,
    latest: AtomicU64,
    view: RwLock<CatalogView>,
}

impl CatalogController {
    pub fn new(data: Arc<dyn DataService>) -> Self {
        Self {
            workflow: LifecycleWorkflow::new(data.clone()),
            data,
            latest: AtomicU64::new(0),
            view: RwLock::new(CatalogView::default()),
        }
    }

    /// Snapshot of the visible state
    pub async fn view(&self) -> CatalogView {
        self.view.read().await.clone()
    }

    /// List active items whose placa contains `filter`, and show them
    pub async fn list(&self, filter: &str) -> Result<Vec<Item>, InventoryError> {
        let ticket = self.begin_list(filter).await;
        let result = self.fetch(&ticket).await;
        self.apply_list(&ticket, &result).await;
        result
    }

    /// Issue a List: it supersedes every earlier one
    pub async fn begin_list(&self, filter: &str) -> ListTicket {
        // Generation is drawn under the view lock so ticket order matches
        // the order in which `filter` is written.
        let mut view = self.view.write().await;
        let generation = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        view.filter = filter.to_string();
        view.loading = true;
        view.error = None;
        ListTicket {
            generation,
            filter: filter.to_string(),
        }
    }

    pub async fn fetch(&self, ticket: &ListTicket) -> Result<Vec<Item>, InventoryError> {
        let query = ItemQuery::active_catalog(&ticket.filter);
        self.data
            .query_items(&query)
            .await
            .map_err(|source| InventoryError::DataAccess {
                what: "los elementos".to_string(),
                source,
            })
    }

    /// Show a List result unless a newer List was issued after it. Returns
    /// whether the view changed.
    pub async fn apply_list(&self, ticket: &ListTicket, result: &Result<Vec<Item>, InventoryError>) -> bool {
        let mut view = self.view.write().await;
        if ticket.generation != self.latest.load(Ordering::SeqCst) {
            debug!(
                filter = %ticket.filter,
                generation = ticket.generation,
                "Discarding superseded list result"
            );
            return false;
        }

        view.loading = false;
        match result {
            Ok(items) => {
                view.items = items.clone();
                view.error = None;
            }
            Err(e) => {
                error!(error = %e, filter = %ticket.filter, "Failed to load items");
                view.error = Some(e.user_message());
            }
        }
        true
    }

    /// Load the page for `filter`. A failed load is carried by the view's
    /// error message instead of being returned.
    pub async fn open(&self, filter: &str) {
        if let Err(e) = self.list(filter).await {
            debug!(error = %e, "Catalog opened with a load error");
        }
    }

    /// Deactivate or reactivate an item, then re-read the list with the
    /// filter that was showing.
    pub async fn toggle_lifecycle(
        &self,
        ctx: &RequestContext,
        item_id: &str,
        current: ItemStatus,
    ) -> Result<TransitionOutcome, InventoryError> {
        {
            let mut view = self.view.write().await;
            view.loading = true;
            view.error = None;
        }

        let outcome = match self
            .workflow
            .apply_lifecycle_transition(ctx, item_id, current)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(item_id = %item_id, error = %e, "Failed to toggle item");
                let mut view = self.view.write().await;
                view.loading = false;
                view.error = Some(e.user_message());
                return Err(e);
            }
        };

        let filter = self.view.read().await.filter.clone();
        if let Err(e) = self.list(&filter).await {
            info!(error = %e, "Re-list after toggle failed; view shows the error");
        }
        Ok(outcome)
    }

    /// Item detail page
    pub async fn show(&self, item_id: &str) -> Result<Item, InventoryError> {
        self.data
            .fetch_item(item_id)
            .await
            .map_err(|source| InventoryError::DataAccess {
                what: format!("el elemento {item_id}"),
                source,
            })?
            .ok_or_else(|| InventoryError::NotFound {
                item_id: item_id.to_string(),
            })
    }

    /// Ledger of one item, newest first
    pub async fn history(&self, item_id: &str) -> Result<Vec<Movement>, InventoryError> {
        self.show(item_id).await?;
        self.data
            .list_movements(item_id)
            .await
            .map_err(|source| InventoryError::DataAccess {
                what: format!("los movimientos de {item_id}"),
                source,
            })
    }
}
