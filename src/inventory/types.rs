// Core records for inventory items and their movement ledger

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Lifecycle status of an item. `estado` is the authoritative soft-delete
/// signal; `deleted_at` only records when the current deactivation happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Activo,
    Desactivado,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Activo => "activo",
            ItemStatus::Desactivado => "desactivado",
        }
    }

    /// The only status reachable from this one
    pub fn toggled(self) -> Self {
        match self {
            ItemStatus::Activo => ItemStatus::Desactivado,
            ItemStatus::Desactivado => ItemStatus::Activo,
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} value: {value}")]
pub struct ParseValueError {
    pub kind: &'static str,
    pub value: String,
}

impl FromStr for ItemStatus {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "activo" => Ok(ItemStatus::Activo),
            "desactivado" => Ok(ItemStatus::Desactivado),
            other => Err(ParseValueError {
                kind: "estado",
                value: other.to_string(),
            }),
        }
    }
}

/// An inventory asset (`elementos` row)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub regional: String,
    pub placa: String,
    pub stock_fisico: u32,
    pub estado: ItemStatus,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Item {
    /// A freshly registered, active item
    pub fn new(id: &str, regional: &str, placa: &str, stock_fisico: u32) -> Self {
        Self {
            id: id.to_string(),
            regional: regional.to_string(),
            placa: placa.to_string(),
            stock_fisico,
            estado: ItemStatus::Activo,
            deleted_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.estado == ItemStatus::Activo
    }

    /// Whether `deleted_at` agrees with `estado`
    pub fn is_consistent(&self) -> bool {
        self.deleted_at.is_some() == (self.estado == ItemStatus::Desactivado)
    }

    pub fn apply(&mut self, update: &ItemUpdate) {
        self.estado = update.estado();
        self.deleted_at = update.deleted_at();
    }

    /// Evaluate a query the way the data service does. Each constraint is
    /// checked on its own; none is inferred from another.
    pub fn matches(&self, query: &ItemQuery) -> bool {
        if let Some(estado) = query.estado {
            if self.estado != estado {
                return false;
            }
        }
        if query.exclude_deleted && self.deleted_at.is_some() {
            return false;
        }
        query.matches_placa(&self.placa)
    }
}

/// The lifecycle write for one item. Built only through [`ItemUpdate::for_status`]
/// so `deleted_at` is always set iff the target status is `desactivado`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemUpdate {
    estado: ItemStatus,
    deleted_at: Option<DateTime<Utc>>,
}

impl ItemUpdate {
    pub fn for_status(estado: ItemStatus, now: DateTime<Utc>) -> Self {
        let deleted_at = match estado {
            ItemStatus::Desactivado => Some(now),
            ItemStatus::Activo => None,
        };
        Self { estado, deleted_at }
    }

    pub fn estado(&self) -> ItemStatus {
        self.estado
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }
}

/// Filter understood by the data service
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemQuery {
    /// Equality on `estado`
    pub estado: Option<ItemStatus>,
    /// `deleted_at IS NULL`
    pub exclude_deleted: bool,
    /// Case-insensitive substring on `placa`, matched literally
    pub placa_contains: Option<String>,
}

impl ItemQuery {
    /// The active catalog view: `estado = activo` and `deleted_at IS NULL`
    /// always apply, the placa filter only when non-empty.
    pub fn active_catalog(filter: &str) -> Self {
        Self {
            estado: Some(ItemStatus::Activo),
            exclude_deleted: true,
            placa_contains: if filter.is_empty() {
                None
            } else {
                Some(filter.to_string())
            },
        }
    }

    /// Unicode case-insensitive substring test on `placa`. Every backend
    /// applies the placa constraint through this so they agree on folding.
    pub fn matches_placa(&self, placa: &str) -> bool {
        match &self.placa_contains {
            Some(needle) => placa.to_lowercase().contains(&needle.to_lowercase()),
            None => true,
        }
    }
}

/// Kinds of ledger entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementType {
    Activacion,
    Desactivacion,
    Entrada,
    Salida,
    Ajuste,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Activacion => "activacion",
            MovementType::Desactivacion => "desactivacion",
            MovementType::Entrada => "entrada",
            MovementType::Salida => "salida",
            MovementType::Ajuste => "ajuste",
        }
    }
}

impl fmt::Display for MovementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementType {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "activacion" => Ok(MovementType::Activacion),
            "desactivacion" => Ok(MovementType::Desactivacion),
            "entrada" => Ok(MovementType::Entrada),
            "salida" => Ok(MovementType::Salida),
            "ajuste" => Ok(MovementType::Ajuste),
            other => Err(ParseValueError {
                kind: "tipo_movimiento",
                value: other.to_string(),
            }),
        }
    }
}

/// A movement about to be appended to the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMovement {
    pub elemento_id: String,
    pub tipo_movimiento: MovementType,
    pub cantidad: i64,
    pub usuario_id: String,
    pub observaciones: String,
}

/// A stored ledger entry (`movimientos_inventario` row). Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub id: String,
    pub elemento_id: String,
    pub tipo_movimiento: MovementType,
    pub cantidad: i64,
    pub usuario_id: String,
    pub observaciones: String,
    pub created_at: DateTime<Utc>,
}

impl Movement {
    /// Stamp a new movement with a store id and creation time
    pub fn record(new: &NewMovement, created_at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            elemento_id: new.elemento_id.clone(),
            tipo_movimiento: new.tipo_movimiento,
            cantidad: new.cantidad,
            usuario_id: new.usuario_id.clone(),
            observaciones: new.observaciones.clone(),
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_sets_deleted_at_only_when_deactivating() {
        let now = Utc::now();

        let off = ItemUpdate::for_status(ItemStatus::Desactivado, now);
        assert_eq!(off.deleted_at(), Some(now));

        let on = ItemUpdate::for_status(ItemStatus::Activo, now);
        assert_eq!(on.deleted_at(), None);
    }

    #[test]
    fn applying_updates_keeps_item_consistent() {
        let mut item = Item::new("A1", "Antioquia", "X100", 5);
        assert!(item.is_consistent());

        item.apply(&ItemUpdate::for_status(ItemStatus::Desactivado, Utc::now()));
        assert!(item.is_consistent());
        assert!(!item.is_active());

        item.apply(&ItemUpdate::for_status(ItemStatus::Activo, Utc::now()));
        assert!(item.is_consistent());
        assert!(item.deleted_at.is_none());
    }

    #[test]
    fn catalog_query_enforces_status_and_deleted_at_separately() {
        let query = ItemQuery::active_catalog("");

        let mut stale_marker = Item::new("1", "R", "X100", 1);
        stale_marker.deleted_at = Some(Utc::now());
        assert!(!stale_marker.matches(&query));

        let mut wrong_status = Item::new("2", "R", "X101", 1);
        wrong_status.estado = ItemStatus::Desactivado;
        assert!(!wrong_status.matches(&query));

        assert!(Item::new("3", "R", "X102", 1).matches(&query));
    }

    #[test]
    fn placa_filter_is_case_insensitive_substring() {
        let query = ItemQuery::active_catalog("x1");
        assert!(Item::new("1", "R", "X100", 1).matches(&query));
        assert!(!Item::new("2", "R", "Y200", 1).matches(&query));

        assert_eq!(ItemQuery::active_catalog("").placa_contains, None);
    }

    #[test]
    fn placa_filter_is_used_verbatim() {
        let spaced = ItemQuery::active_catalog(" X1");
        assert_eq!(spaced.placa_contains.as_deref(), Some(" X1"));
        assert!(!spaced.matches_placa("X100"));
        assert!(spaced.matches_placa("LOTE X100"));
    }

    #[test]
    fn placa_filter_folds_non_ascii_letters() {
        let query = ItemQuery::active_catalog("ñandú");
        assert!(query.matches_placa("ÑANDÚ-1"));
        assert!(!query.matches_placa("NANDU-1"));
    }

    #[test]
    fn status_parsing() {
        assert_eq!("activo".parse::<ItemStatus>(), Ok(ItemStatus::Activo));
        assert_eq!(" Desactivado ".parse::<ItemStatus>(), Ok(ItemStatus::Desactivado));
        assert!("borrado".parse::<ItemStatus>().is_err());
        assert_eq!(ItemStatus::Activo.toggled(), ItemStatus::Desactivado);
    }
}
