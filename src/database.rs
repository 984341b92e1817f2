#[cfg(feature = "database")]
use async_trait::async_trait;
#[cfg(feature = "database")]
use chrono::{DateTime, Utc};
#[cfg(feature = "database")]
use sqlx::{
    migrate::MigrateDatabase, sqlite::SqlitePoolOptions, sqlite::SqliteRow, Row, Sqlite,
    SqlitePool, Transaction,
};
#[cfg(feature = "database")]
use tracing::{debug, info};

#[cfg(feature = "database")]
use crate::data_service::{DataService, DataServiceError, LedgerTransaction};
#[cfg(feature = "database")]
use crate::inventory::{Item, ItemQuery, ItemUpdate, Movement, NewMovement};
#[cfg(feature = "database")]
use crate::session::{Role, Session};

#[cfg(feature = "database")]
impl From<sqlx::Error> for DataServiceError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DataServiceError::NotFound {
                entity: "row",
                id: String::new(),
            },
            sqlx::Error::Database(db_err) => DataServiceError::Rejected {
                message: db_err.message().to_string(),
            },
            decode @ (sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::Decode(_)
            | sqlx::Error::TypeNotFound { .. }) => DataServiceError::InvalidRecord {
                message: decode.to_string(),
            },
            other => DataServiceError::Unavailable {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(feature = "database")]
/// SQLite-backed data service
pub struct DatabaseManager {
    pool: SqlitePool,
    session_ttl: chrono::Duration,
}

#[cfg(feature = "database")]
impl DatabaseManager {
    /// Initialize database with automatic migrations
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        auto_migrate: bool,
        session_ttl: chrono::Duration,
    ) -> anyhow::Result<Self> {
        // Create database if it doesn't exist
        if !Sqlite::database_exists(database_url).await? {
            info!("Creating database at {}", database_url);
            Sqlite::create_database(database_url).await?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        if auto_migrate {
            info!("Running database migrations...");
            sqlx::migrate!("./migrations").run(&pool).await?;
            info!("Database migrations completed");
        }

        Ok(Self { pool, session_ttl })
    }

    /// Get database pool for queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close database connections gracefully
    pub async fn shutdown(&self) {
        info!("Shutting down database connections...");
        self.pool.close().await;
        info!("Database connections closed");
    }
}

#[cfg(feature = "database")]
const ITEM_COLUMNS: &str = "id, regional, placa, stock_fisico, estado, deleted_at";

#[cfg(feature = "database")]
const MOVEMENT_COLUMNS: &str =
    "id, elemento_id, tipo_movimiento, cantidad, usuario_id, observaciones, created_at";

#[cfg(feature = "database")]
fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, DataServiceError> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| DataServiceError::InvalidRecord {
            message: format!("bad timestamp '{value}': {e}"),
        })
}

#[cfg(feature = "database")]
fn item_from_row(row: &SqliteRow) -> Result<Item, DataServiceError> {
    let stock: i64 = row.try_get("stock_fisico")?;
    let estado: String = row.try_get("estado")?;
    let deleted_at: Option<String> = row.try_get("deleted_at")?;

    Ok(Item {
        id: row.try_get("id")?,
        regional: row.try_get("regional")?,
        placa: row.try_get("placa")?,
        stock_fisico: u32::try_from(stock).map_err(|_| DataServiceError::InvalidRecord {
            message: format!("negative stock_fisico {stock}"),
        })?,
        estado: estado
            .parse()
            .map_err(|e: crate::inventory::ParseValueError| DataServiceError::InvalidRecord {
                message: e.to_string(),
            })?,
        deleted_at: deleted_at.as_deref().map(parse_timestamp).transpose()?,
    })
}

#[cfg(feature = "database")]
fn movement_from_row(row: &SqliteRow) -> Result<Movement, DataServiceError> {
    let tipo: String = row.try_get("tipo_movimiento")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(Movement {
        id: row.try_get("id")?,
        elemento_id: row.try_get("elemento_id")?,
        tipo_movimiento: tipo
            .parse()
            .map_err(|e: crate::inventory::ParseValueError| DataServiceError::InvalidRecord {
                message: e.to_string(),
            })?,
        cantidad: row.try_get("cantidad")?,
        usuario_id: row.try_get("usuario_id")?,
        observaciones: row.try_get("observaciones")?,
        created_at: parse_timestamp(&created_at)?,
    })
}

#[cfg(feature = "database")]
fn session_from_row(row: &SqliteRow) -> Result<Session, DataServiceError> {
    let expires_at: String = row.try_get("expires_at")?;
    Ok(Session {
        user_id: row.try_get("user_id")?,
        email: row.try_get("email")?,
        access_token: row.try_get("access_token")?,
        expires_at: parse_timestamp(&expires_at)?,
    })
}

#[cfg(feature = "database")]
async fn update_item_on(
    conn: &mut sqlx::SqliteConnection,
    id: &str,
    update: &ItemUpdate,
) -> Result<(), DataServiceError> {
    let result = sqlx::query("UPDATE elementos SET estado = ?1, deleted_at = ?2 WHERE id = ?3")
        .bind(update.estado().as_str())
        .bind(update.deleted_at().map(|ts| ts.to_rfc3339()))
        .bind(id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DataServiceError::NotFound {
            entity: "elemento",
            id: id.to_string(),
        });
    }
    Ok(())
}

#[cfg(feature = "database")]
async fn fetch_item_on(conn: &mut sqlx::SqliteConnection, id: &str) -> Result<Option<Item>, DataServiceError> {
    let row = sqlx::query(&format!("SELECT {ITEM_COLUMNS} FROM elementos WHERE id = ?1"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(item_from_row).transpose()
}

#[cfg(feature = "database")]
async fn insert_movement_on(
    conn: &mut sqlx::SqliteConnection,
    movement: &NewMovement,
) -> Result<Movement, DataServiceError> {
    let stored = Movement::record(movement, Utc::now());
    sqlx::query(
        r#"
        INSERT INTO movimientos_inventario
            (id, elemento_id, tipo_movimiento, cantidad, usuario_id, observaciones, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(&stored.id)
    .bind(&stored.elemento_id)
    .bind(stored.tipo_movimiento.as_str())
    .bind(stored.cantidad)
    .bind(&stored.usuario_id)
    .bind(&stored.observaciones)
    .bind(stored.created_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;
    Ok(stored)
}

#[cfg(feature = "database")]
#[async_trait]
impl DataService for DatabaseManager {
    async fn query_items(&self, query: &ItemQuery) -> Result<Vec<Item>, DataServiceError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ITEM_COLUMNS}
            FROM elementos
            WHERE (?1 IS NULL OR estado = ?1)
              AND (?2 = 0 OR deleted_at IS NULL)
            ORDER BY rowid
            "#
        ))
        .bind(query.estado.map(|estado| estado.as_str()))
        .bind(query.exclude_deleted)
        .fetch_all(&self.pool)
        .await?;

        // SQLite LIKE and lower() fold ASCII only, so placa is matched here
        let mut items = Vec::with_capacity(rows.len());
        for row in &rows {
            let item = item_from_row(row)?;
            if query.matches_placa(&item.placa) {
                items.push(item);
            }
        }
        debug!(scanned = rows.len(), count = items.len(), "Queried elementos");
        Ok(items)
    }

    async fn fetch_item(&self, id: &str) -> Result<Option<Item>, DataServiceError> {
        let mut conn = self.pool.acquire().await?;
        fetch_item_on(&mut *conn, id).await
    }

    async fn update_item(&self, id: &str, update: &ItemUpdate) -> Result<(), DataServiceError> {
        let mut conn = self.pool.acquire().await?;
        update_item_on(&mut *conn, id, update).await
    }

    async fn insert_movement(&self, movement: &NewMovement) -> Result<Movement, DataServiceError> {
        let mut conn = self.pool.acquire().await?;
        insert_movement_on(&mut *conn, movement).await
    }

    async fn list_movements(&self, item_id: &str) -> Result<Vec<Movement>, DataServiceError> {
        let rows = sqlx::query(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM movimientos_inventario WHERE elemento_id = ?1 ORDER BY created_at DESC, rowid DESC"
        ))
        .bind(item_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(movement_from_row).collect()
    }

    async fn fetch_role(&self, user_id: &str) -> Result<Option<Role>, DataServiceError> {
        let rol: Option<String> = sqlx::query_scalar("SELECT rol FROM users_custom_data WHERE id = ?1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        rol.map(|rol| {
            rol.parse().map_err(|e: crate::inventory::ParseValueError| DataServiceError::InvalidRecord {
                message: e.to_string(),
            })
        })
        .transpose()
    }

    async fn get_session(&self, access_token: &str) -> Result<Option<Session>, DataServiceError> {
        let row = sqlx::query(
            "SELECT access_token, user_id, email, expires_at FROM sessions WHERE access_token = ?1",
        )
        .bind(access_token)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(session_from_row).transpose()
    }

    async fn refresh_session(&self, access_token: &str) -> Result<Session, DataServiceError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT access_token, user_id, email, expires_at FROM sessions WHERE access_token = ?1",
        )
        .bind(access_token)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| DataServiceError::NotFound {
            entity: "session",
            id: access_token.to_string(),
        })?;
        let current = session_from_row(&row)?;

        let refreshed = Session {
            access_token: uuid::Uuid::new_v4().to_string(),
            expires_at: Utc::now() + self.session_ttl,
            ..current
        };

        sqlx::query("DELETE FROM sessions WHERE access_token = ?1")
            .bind(access_token)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO sessions (access_token, user_id, email, expires_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&refreshed.access_token)
        .bind(&refreshed.user_id)
        .bind(&refreshed.email)
        .bind(refreshed.expires_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(refreshed)
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), DataServiceError> {
        let result = sqlx::query("DELETE FROM sessions WHERE access_token = ?1")
            .bind(access_token)
            .execute(&self.pool)
            .await?;
        info!(removed = result.rows_affected(), "Signed out session");
        Ok(())
    }

    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>, DataServiceError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteLedgerTransaction { tx: Some(tx) }))
    }
}

#[cfg(feature = "database")]
/// A `sqlx` transaction; dropping it uncommitted rolls back
struct SqliteLedgerTransaction {
    tx: Option<Transaction<'static, Sqlite>>,
}

#[cfg(feature = "database")]
impl SqliteLedgerTransaction {
    fn conn(&mut self) -> Result<&mut sqlx::SqliteConnection, DataServiceError> {
        self.tx
            .as_deref_mut()
            .ok_or_else(|| DataServiceError::Rejected {
                message: "transaction already finished".to_string(),
            })
    }

    fn take(&mut self) -> Result<Transaction<'static, Sqlite>, DataServiceError> {
        self.tx.take().ok_or_else(|| DataServiceError::Rejected {
            message: "transaction already finished".to_string(),
        })
    }
}

#[cfg(feature = "database")]
#[async_trait]
impl LedgerTransaction for SqliteLedgerTransaction {
    async fn update_item(&mut self, id: &str, update: &ItemUpdate) -> Result<(), DataServiceError> {
        update_item_on(self.conn()?, id, update).await
    }

    async fn fetch_item(&mut self, id: &str) -> Result<Option<Item>, DataServiceError> {
        fetch_item_on(self.conn()?, id).await
    }

    async fn insert_movement(&mut self, movement: &NewMovement) -> Result<Movement, DataServiceError> {
        insert_movement_on(self.conn()?, movement).await
    }

    async fn commit(&mut self) -> Result<(), DataServiceError> {
        self.take()?.commit().await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DataServiceError> {
        self.take()?.rollback().await?;
        debug!("SQLite transaction rolled back");
        Ok(())
    }
}

// Stub implementation for when database feature is not enabled
#[cfg(not(feature = "database"))]
pub struct DatabaseManager;
