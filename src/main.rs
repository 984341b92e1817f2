use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn, Instrument};

use inventario::config::InventarioConfig;
use inventario::data_service::DataService;
use inventario::errors::InventoryError;
use inventario::session::{navigation_for, resolve_context, GuardPolicy, RequestContext, Route, SessionGuard};
use inventario::telemetry::{create_request_span, generate_correlation_id, init_telemetry, shutdown_telemetry};
use inventario::{CatalogController, ItemStatus};

#[derive(Parser)]
#[command(name = "inventario")]
#[command(about = "Inventory item lifecycle with an audit ledger")]
#[command(long_about = "Inventario manages the active-item catalog. Every deactivation or \
                       reactivation of an item is recorded in the movement ledger together with \
                       the acting user and the stock at that moment.")]
struct Cli {
    /// Session access token
    #[arg(long, global = true, env = "INVENTARIO_SESSION_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List active items, optionally filtered by placa
    List {
        #[arg(long, default_value = "", help = "Case-insensitive substring of the placa")]
        filter: String,
    },
    /// Deactivate an active item or reactivate a deactivated one
    Toggle {
        id: String,
        /// Filter of the list shown after the toggle
        #[arg(long, default_value = "")]
        filter: String,
    },
    /// Show one item
    Show { id: String },
    /// Show the movement ledger of one item, newest first
    History { id: String },
    /// Show the dashboard navigation for the signed-in role
    Nav,
    /// Evaluate the session guard for an arbitrary path
    Check { path: String },
    /// Sign the current session out
    Logout,
    /// Print the effective configuration as TOML
    Config {
        /// Write it to this file instead of printing it
        #[arg(long)]
        write: Option<std::path::PathBuf>,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::List { .. } => "list",
            Commands::Toggle { .. } => "toggle",
            Commands::Show { .. } => "show",
            Commands::History { .. } => "history",
            Commands::Nav => "nav",
            Commands::Check { .. } => "check",
            Commands::Logout => "logout",
            Commands::Config { .. } => "config",
        }
    }

    fn route(&self) -> Route {
        match self {
            Commands::List { .. } | Commands::Toggle { .. } => Route::ItemList,
            Commands::Show { id } => Route::ItemDetail { id: id.clone() },
            Commands::History { id } => Route::ItemHistory { id: id.clone() },
            Commands::Nav | Commands::Logout | Commands::Config { .. } => Route::Dashboard,
            Commands::Check { path } => Route::parse(path),
        }
    }

    /// Path handed to the guard; `check` keeps the raw path so excluded assets still match
    fn guarded_path(&self) -> String {
        match self {
            Commands::Check { path } => path.clone(),
            other => other.route().path(),
        }
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    tokio::runtime::Runtime::new()?.block_on(run(cli))
}

async fn run(cli: Cli) -> Result<ExitCode> {
    InventarioConfig::load_env_file()?;
    let config = InventarioConfig::load()?;
    init_telemetry(&config.observability)?;

    if let Commands::Config { write } = &cli.command {
        match write {
            Some(path) => {
                config.save_to_file(path)?;
                println!("✅ Configuración guardada en {}", path.display());
            }
            None => print!("{}", config.to_toml()?),
        }
        return Ok(ExitCode::SUCCESS);
    }

    #[cfg(feature = "database")]
    let database = {
        ensure_database_dir(&config.data_service.url)?;
        Arc::new(
            inventario::DatabaseManager::new(
                &config.data_service.url,
                config.data_service.max_connections,
                config.data_service.auto_migrate,
                config.session.session_ttl(),
            )
            .await?,
        )
    };
    #[cfg(feature = "database")]
    let data: Arc<dyn DataService> = database.clone();

    #[cfg(not(feature = "database"))]
    let data: Arc<dyn DataService> = {
        warn!("Built without the database feature, using an empty in-memory store");
        Arc::new(inventario::InMemoryDataService::new(config.session.session_ttl()))
    };

    let correlation_id = generate_correlation_id();
    let span = create_request_span(
        cli.command.name(),
        &cli.command.guarded_path(),
        None,
        &correlation_id,
    );

    let code = handle(&cli, &config, data, &correlation_id)
        .instrument(span)
        .await?;

    #[cfg(feature = "database")]
    database.shutdown().await;
    shutdown_telemetry();

    Ok(code)
}

/// Guard first, then role gate, then the command itself
async fn handle(
    cli: &Cli,
    config: &InventarioConfig,
    data: Arc<dyn DataService>,
    correlation_id: &str,
) -> Result<ExitCode> {
    let policy = GuardPolicy::new(&config.routes)?;
    let guard = SessionGuard::new(policy, data.clone(), config.session.refresh_window());

    let path = cli.command.guarded_path();
    let outcome = guard.mediate(&path, cli.token.as_deref()).await;

    if let Some(token) = outcome.refreshed_token() {
        eprintln!("🔄 Sesión renovada. Nuevo token: {token}");
    }

    if let Commands::Check { .. } = &cli.command {
        #[derive(Serialize)]
        struct CheckReport<'a> {
            path: &'a str,
            allowed: bool,
            location: Option<&'a str>,
            authenticated: bool,
            /// Role gate result, present when the guard let a signed-in request through
            authorized: Option<bool>,
        }
        let authorized = if outcome.is_allowed() && outcome.session.is_some() {
            let ctx = resolve_context(data.as_ref(), &outcome, cli.command.route(), correlation_id).await;
            Some(ctx.authorize().is_ok())
        } else {
            None
        };
        let report = CheckReport {
            path: &path,
            allowed: outcome.is_allowed(),
            location: outcome.decision.location(),
            authenticated: outcome.session.is_some(),
            authorized,
        };
        return emit(cli.json, &report, || match (report.location, report.authorized) {
            (Some(location), _) => println!("↪️  {path}: redirigir a {location}"),
            (None, Some(false)) => println!("⛔ {path}: rol sin permiso"),
            (None, _) => println!("✅ {path}: permitido"),
        });
    }

    if let Some(location) = outcome.decision.location() {
        info!(location = %location, "Command redirected by session guard");
        println!("↪️  Redirigir a {location}");
        return Ok(ExitCode::from(2));
    }

    let ctx = resolve_context(data.as_ref(), &outcome, cli.command.route(), correlation_id).await;
    if let Some(identity) = ctx.identity() {
        tracing::Span::current().record("user.id", identity.user_id.as_str());
    }

    let result = match ctx.authorize() {
        Ok(()) => {
            let token = outcome.refreshed_token().or(cli.token.as_deref());
            dispatch(cli, &ctx, data, token).await
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(code) => Ok(code),
        Err(e) => {
            warn!(error = %e, "Command failed");
            eprintln!("❌ {}", e.user_message());
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn dispatch(
    cli: &Cli,
    ctx: &RequestContext,
    data: Arc<dyn DataService>,
    token: Option<&str>,
) -> Result<ExitCode, InventoryError> {
    let controller = CatalogController::new(data.clone());

    match &cli.command {
        Commands::List { filter } => {
            controller.list(filter).await?;
            let view = controller.view().await;
            emit_or_fail(cli.json, &view, || print_items(&view.items))
        }
        Commands::Toggle { id, filter } => {
            controller.open(filter).await;
            let item = controller.show(id).await?;
            let outcome = controller.toggle_lifecycle(ctx, id, item.estado).await?;
            let view = controller.view().await;

            #[derive(Serialize)]
            struct ToggleReport<'a> {
                movement: &'a inventario::Movement,
                estado: ItemStatus,
                view: &'a inventario::CatalogView,
            }
            let report = ToggleReport {
                movement: &outcome.movement,
                estado: outcome.plan.to,
                view: &view,
            };
            emit_or_fail(cli.json, &report, || {
                println!(
                    "✅ Elemento {id}: {} → {} ({} registrado, cantidad {})",
                    outcome.plan.from, outcome.plan.to, outcome.movement.tipo_movimiento, outcome.movement.cantidad
                );
                if let Some(message) = &view.error {
                    println!("⚠️  {message}");
                }
                print_items(&view.items);
            })
        }
        Commands::Show { id } => {
            let item = controller.show(id).await?;
            emit_or_fail(cli.json, &item, || {
                println!("📦 {} [{}]", item.placa, item.id);
                println!("   Regional: {}", item.regional);
                println!("   Stock físico: {}", item.stock_fisico);
                println!("   Estado: {}", item.estado);
                if let Some(deleted_at) = item.deleted_at {
                    println!("   Desactivado: {}", deleted_at.to_rfc3339());
                }
            })
        }
        Commands::History { id } => {
            let movements = controller.history(id).await?;
            emit_or_fail(cli.json, &movements, || {
                if movements.is_empty() {
                    println!("📋 Sin movimientos registrados para {id}");
                }
                for movement in &movements {
                    println!(
                        "{}  {:<13} {:>5}  {}  {}",
                        movement.created_at.format("%Y-%m-%d %H:%M:%S"),
                        movement.tipo_movimiento.as_str(),
                        movement.cantidad,
                        movement.usuario_id,
                        movement.observaciones
                    );
                }
            })
        }
        Commands::Nav => {
            let links = navigation_for(ctx.role());
            emit_or_fail(cli.json, &links, || {
                for link in &links {
                    println!("{:<22} {}", link.label, link.href);
                }
            })
        }
        Commands::Logout => {
            if let Some(token) = token {
                data.sign_out(token)
                    .await
                    .map_err(|source| InventoryError::SignOut { source })?;
            }
            println!("👋 Sesión cerrada");
            Ok(ExitCode::SUCCESS)
        }
        Commands::Check { .. } | Commands::Config { .. } => Ok(ExitCode::SUCCESS),
    }
}

fn print_items(items: &[inventario::Item]) {
    if items.is_empty() {
        println!("📋 No hay elementos activos");
        return;
    }
    println!("{:<12} {:<12} {:<16} {:>6}", "ID", "PLACA", "REGIONAL", "STOCK");
    for item in items {
        println!(
            "{:<12} {:<12} {:<16} {:>6}",
            item.id, item.placa, item.regional, item.stock_fisico
        );
    }
}

fn emit<T: Serialize>(json: bool, value: &T, human: impl FnOnce()) -> Result<ExitCode> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        human();
    }
    Ok(ExitCode::SUCCESS)
}

fn emit_or_fail<T: Serialize>(json: bool, value: &T, human: impl FnOnce()) -> Result<ExitCode, InventoryError> {
    match emit(json, value, human) {
        Ok(code) => Ok(code),
        Err(e) => {
            warn!(error = %e, "Failed to serialize output");
            Ok(ExitCode::FAILURE)
        }
    }
}

/// SQLite creates the database file but not its directory
#[cfg(feature = "database")]
fn ensure_database_dir(url: &str) -> Result<()> {
    let file = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    let file = file.split('?').next().unwrap_or(file);
    if file.is_empty() || file.contains(":memory:") {
        return Ok(());
    }
    if let Some(parent) = std::path::Path::new(file).parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}
