use thiserror::Error;

use crate::data_service::DataServiceError;
use crate::session::Role;

/// Failures surfaced by catalog and lifecycle operations. Each one is caught
/// at the operation boundary and turned into a display message; none are
/// retried automatically.
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("no authenticated identity available to {operation}")]
    AuthRequired { operation: &'static str },

    #[error("failed to read {what}: {source}")]
    DataAccess {
        what: String,
        #[source]
        source: DataServiceError,
    },

    #[error("failed to update item {item_id}: {source}")]
    Update {
        item_id: String,
        #[source]
        source: DataServiceError,
    },

    #[error("failed to append movement for item {item_id}: {source}")]
    AuditWrite {
        item_id: String,
        #[source]
        source: DataServiceError,
    },

    #[error("role '{role}' may not access {route}")]
    Forbidden { route: String, role: Role },

    #[error("item {item_id} not found")]
    NotFound { item_id: String },

    #[error("failed to sign out: {source}")]
    SignOut {
        #[source]
        source: DataServiceError,
    },
}

impl InventoryError {
    /// Message shown to the user in place of the failed view. `what` of a
    /// `DataAccess` error is worded to follow "Error al cargar".
    pub fn user_message(&self) -> String {
        match self {
            InventoryError::AuthRequired { operation } => {
                format!("Usuario no autenticado. No se puede {operation}.")
            }
            InventoryError::DataAccess { what, .. } => format!("Error al cargar {what}."),
            InventoryError::Update { .. } => "Error al cambiar el estado del elemento.".to_string(),
            InventoryError::AuditWrite { .. } => {
                "No se pudo registrar el movimiento. El estado del elemento no fue modificado."
                    .to_string()
            }
            InventoryError::Forbidden { .. } => {
                "No tiene permisos para acceder a esta sección.".to_string()
            }
            InventoryError::NotFound { .. } => "El elemento solicitado no existe.".to_string(),
            InventoryError::SignOut { .. } => "Error al cerrar la sesión.".to_string(),
        }
    }

    /// Whether the underlying cause looks like a network/availability blip
    pub fn is_transient(&self) -> bool {
        match self {
            InventoryError::DataAccess { source, .. }
            | InventoryError::Update { source, .. }
            | InventoryError::AuditWrite { source, .. }
            | InventoryError::SignOut { source } => source.is_transient(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification_follows_the_store_error() {
        let blip = InventoryError::DataAccess {
            what: "los elementos".to_string(),
            source: DataServiceError::Unavailable {
                message: "connection reset".to_string(),
            },
        };
        assert!(blip.is_transient());
        assert_eq!(blip.user_message(), "Error al cargar los elementos.");

        let rejected = InventoryError::AuditWrite {
            item_id: "A1".to_string(),
            source: DataServiceError::Rejected {
                message: "constraint".to_string(),
            },
        };
        assert!(!rejected.is_transient());
        assert!(rejected.to_string().contains("A1"));
    }

    #[test]
    fn messages_name_the_refused_action() {
        let route = InventoryError::AuthRequired {
            operation: "acceder a una ruta protegida",
        };
        assert_eq!(
            route.user_message(),
            "Usuario no autenticado. No se puede acceder a una ruta protegida."
        );

        let ledger = InventoryError::AuthRequired {
            operation: "registrar el movimiento",
        };
        assert_eq!(
            ledger.user_message(),
            "Usuario no autenticado. No se puede registrar el movimiento."
        );

        let stock = InventoryError::DataAccess {
            what: "el stock físico de A1".to_string(),
            source: DataServiceError::Unavailable {
                message: "timeout".to_string(),
            },
        };
        assert_eq!(stock.user_message(), "Error al cargar el stock físico de A1.");

        let sign_out = InventoryError::SignOut {
            source: DataServiceError::Unavailable {
                message: "timeout".to_string(),
            },
        };
        assert_eq!(sign_out.user_message(), "Error al cerrar la sesión.");
    }
}
