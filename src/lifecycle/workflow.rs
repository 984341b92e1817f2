// Lifecycle/audit workflow: flip an item's status and append its ledger entry
//
// All four steps share one data-service transaction. Any failure rolls the
// transaction back, so an item never changes state without a movement.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::data_service::{DataService, LedgerTransaction};
use crate::errors::InventoryError;
use crate::inventory::{ItemStatus, ItemUpdate, Movement, MovementType, NewMovement};
use crate::session::RequestContext;

pub const DEACTIVATION_NOTE: &str = "Elemento desactivado por el usuario.";
pub const ACTIVATION_NOTE: &str = "Elemento activado por el usuario.";

/// Everything derived from the current status before any write happens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionPlan {
    pub item_id: String,
    pub from: ItemStatus,
    pub to: ItemStatus,
    pub movement_type: MovementType,
    pub observaciones: &'static str,
    pub update: ItemUpdate,
}

impl TransitionPlan {
    pub fn for_toggle(item_id: &str, current: ItemStatus, now: DateTime<Utc>) -> Self {
        let to = current.toggled();
        let (movement_type, observaciones) = match to {
            ItemStatus::Desactivado => (MovementType::Desactivacion, DEACTIVATION_NOTE),
            ItemStatus::Activo => (MovementType::Activacion, ACTIVATION_NOTE),
        };
        Self {
            item_id: item_id.to_string(),
            from: current,
            to,
            movement_type,
            observaciones,
            update: ItemUpdate::for_status(to, now),
        }
    }
}

/// A committed transition
#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub plan: TransitionPlan,
    pub movement: Movement,
}

#[derive(Clone)]
pub struct LifecycleWorkflow {
    data: Arc<dyn DataService>,
}

impl LifecycleWorkflow {
    pub fn new(data: Arc<dyn DataService>) -> Self {
        Self { data }
    }

    /// Toggle `item_id` away from `current` and record the movement, atomically
    pub async fn apply_lifecycle_transition(
        &self,
        ctx: &RequestContext,
        item_id: &str,
        current: ItemStatus,
    ) -> Result<TransitionOutcome, InventoryError> {
        let plan = TransitionPlan::for_toggle(item_id, current, Utc::now());
        info!(
            item_id = %item_id,
            from = %plan.from,
            to = %plan.to,
            correlation_id = %ctx.correlation_id(),
            "Starting lifecycle transition"
        );

        let mut tx = self
            .data
            .begin()
            .await
            .map_err(|source| InventoryError::Update {
                item_id: item_id.to_string(),
                source,
            })?;

        match run_steps(tx.as_mut(), ctx, &plan).await {
            Ok(movement) => {
                tx.commit()
                    .await
                    .map_err(|source| InventoryError::AuditWrite {
                        item_id: item_id.to_string(),
                        source,
                    })?;
                info!(
                    item_id = %item_id,
                    estado = %plan.to,
                    movement_id = %movement.id,
                    cantidad = movement.cantidad,
                    "Lifecycle transition committed"
                );
                Ok(TransitionOutcome { plan, movement })
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    error!(item_id = %item_id, error = %rollback_err, "Rollback of lifecycle transition failed");
                }
                warn!(item_id = %item_id, error = %err, "Lifecycle transition aborted");
                Err(err)
            }
        }
    }
}

async fn run_steps(
    tx: &mut dyn LedgerTransaction,
    ctx: &RequestContext,
    plan: &TransitionPlan,
) -> Result<Movement, InventoryError> {
    let item_id = plan.item_id.as_str();

    // 1. item status and soft-delete marker
    tx.update_item(item_id, &plan.update)
        .await
        .map_err(|source| InventoryError::Update {
            item_id: item_id.to_string(),
            source,
        })?;

    // 2. stock snapshot, read after the update
    let cantidad = match tx.fetch_item(item_id).await {
        Ok(Some(item)) => i64::from(item.stock_fisico),
        Ok(None) => {
            debug!(item_id = %item_id, "Item vanished before stock read-back, recording 0");
            0
        }
        Err(source) => {
            return Err(InventoryError::DataAccess {
                what: format!("el stock físico de {item_id}"),
                source,
            })
        }
    };

    // 3. acting identity
    let identity = ctx.identity().ok_or(InventoryError::AuthRequired {
        operation: "registrar el movimiento",
    })?;

    // 4. ledger append
    let movement = NewMovement {
        elemento_id: item_id.to_string(),
        tipo_movimiento: plan.movement_type,
        cantidad,
        usuario_id: identity.user_id.clone(),
        observaciones: plan.observaciones.to_string(),
    };
    tx.insert_movement(&movement)
        .await
        .map_err(|source| InventoryError::AuditWrite {
            item_id: item_id.to_string(),
            source,
        })
}
