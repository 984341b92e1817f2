use anyhow::Result;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure for inventario
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InventarioConfig {
    /// Data service connection settings
    pub data_service: DataServiceConfig,
    /// Session lifetime and refresh settings
    pub session: SessionConfig,
    /// Route table used by the session guard
    pub routes: RoutesConfig,
    /// Logging settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DataServiceConfig {
    /// Database URL (SQLite file path or connection string)
    pub url: String,
    /// Maximum connections in pool
    pub max_connections: u32,
    /// Enable automatic migrations
    pub auto_migrate: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Sessions expiring within this many seconds are re-issued by the guard
    pub refresh_window_seconds: i64,
    /// Lifetime of a (re-)issued session
    pub session_ttl_seconds: i64,
}

impl SessionConfig {
    pub fn refresh_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.refresh_window_seconds)
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.session_ttl_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RoutesConfig {
    /// Where unauthenticated requests are sent
    pub login_path: String,
    /// Registration form, also closed to signed-in users
    pub register_path: String,
    /// Where signed-in users land when they open an auth form
    pub landing_path: String,
    /// Paths reachable without a session
    pub public_paths: Vec<String>,
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            login_path: "/login".to_string(),
            register_path: "/register".to_string(),
            landing_path: "/dashboard/elementos".to_string(),
            public_paths: vec![
                "/login".to_string(),
                "/register".to_string(),
                "/".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level used when RUST_LOG is not set
    pub log_level: String,
    /// Emit JSON lines instead of human-readable output
    pub json_logs: bool,
}

impl Default for InventarioConfig {
    fn default() -> Self {
        Self {
            data_service: DataServiceConfig {
                url: "sqlite://.inventario/inventario.db".to_string(),
                max_connections: 5,
                auto_migrate: true,
            },
            session: SessionConfig {
                refresh_window_seconds: 300, // 5 minutes
                session_ttl_seconds: 3600,  // 1 hour
            },
            routes: RoutesConfig::default(),
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                json_logs: true,
            },
        }
    }
}

impl InventarioConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration files (inventario.toml, .inventario-rc)
    /// 3. Environment variables (prefixed with INVENTARIO_, nested with `__`)
    pub fn load() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if Path::new("inventario.toml").exists() {
            builder = builder.add_source(File::with_name("inventario"));
        }

        if Path::new(".inventario-rc").exists() {
            builder = builder.add_source(File::new(".inventario-rc", FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix("INVENTARIO")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Render as the TOML accepted by `inventario.toml`
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}
