use actix_web::{web, App, HttpServer};
use anyhow::Context;
use clap::Parser;
use sqlx::MySqlPool;
use std::sync::Arc;
use tracing_actix_web::TracingLogger;

use feeledger::cli::{self, Cli, Commands};
use feeledger::config::{Config, DatabaseConfig};
use feeledger::core::telemetry;
use feeledger::middleware::{json_error_handler, path_error_handler, RequestId};
use feeledger::modules::gateways::services::StripeGateway;
use feeledger::modules::ledger::MySqlLedgerStore;
use feeledger::modules::notifications::TracingNotifier;
use feeledger::AppState;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::from_env().context("Failed to load configuration")?;
    config
        .validate()
        .context("Configuration validation failed")?;
    telemetry::init_tracing(&config.app);

    tracing::info!(env = %config.app.env, "Starting feeledger");

    let pool = config
        .database
        .create_pool()
        .await
        .context("Failed to create database pool")?;
    tracing::info!(
        pool_size = config.database.pool_size,
        "Database pool initialized"
    );

    let command = cli.command.unwrap_or(Commands::Serve);
    if let Commands::Migrate = command {
        DatabaseConfig::migrate(&pool).await?;
        tracing::info!("Migrations applied");
        return Ok(());
    }

    let gateway = StripeGateway::new(&config.stripe).context("Failed to build gateway client")?;
    let state = AppState::new(
        Arc::new(MySqlLedgerStore::new(pool.clone())),
        Arc::new(gateway),
        Arc::new(TracingNotifier),
        config.stripe.webhook_secret.clone(),
        config.app.default_currency,
    );

    match command {
        Commands::Serve | Commands::Migrate => serve(&config, pool, state).await,
        Commands::Repair { student, dry_run } => {
            cli::handle_repair(&state, student.as_deref(), dry_run).await
        }
        Commands::Recompute { student_id } => cli::handle_recompute(&state, &student_id).await,
        Commands::SweepOverdue { student } => {
            cli::handle_sweep_overdue(&state, student.as_deref()).await
        }
    }
}

async fn serve(config: &Config, pool: MySqlPool, state: AppState) -> anyhow::Result<()> {
    let bind_address = config.server.bind_address();
    tracing::info!(
        bind_address = %bind_address,
        workers = config.server.workers,
        "Starting HTTP server"
    );

    HttpServer::new(move || {
        App::new()
            .wrap(RequestId)
            .wrap(TracingLogger::default())
            .app_data(web::Data::new(pool.clone()))
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .app_data(web::PathConfig::default().error_handler(path_error_handler))
            .configure(|cfg| state.configure(cfg))
    })
    .workers(config.server.workers)
    .bind(&bind_address)
    .with_context(|| format!("Failed to bind {}", bind_address))?
    .run()
    .await?;

    Ok(())
}
