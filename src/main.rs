//! SweetLife
//!
//! An MCP server for diabetes-aware nutrition tracking.

use std::sync::Arc;
use std::time::Duration;

use rmcp::ServiceExt;
use tokio::io::{stdin, stdout};
use tracing::info;
use tracing_subscriber::EnvFilter;

use sweetlife::build_info;
use sweetlife::config::AppConfig;
use sweetlife::db;
use sweetlife::external::{
    FoodDataCentralClient, LocalBlobStore, LogMailer, Mailer, MailgunMailer, MlApiClient, RetryPolicy,
};
use sweetlife::mcp::{Collaborators, SweetlifeService};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logging goes to stderr; stdout carries the MCP transport
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("sweetlife=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    build_info::print_startup_banner();
    eprintln!("Starting MCP server on stdio...");

    let config = AppConfig::from_env()?;
    eprintln!("Database path: {}", config.database_path.display());

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    eprintln!("Initializing database...");
    let database = db::Database::new(&config.database_path)?;

    database.with_conn(|conn| {
        if db::migrations::needs_migration(conn)? {
            eprintln!("Applying migrations...");
        }
        db::migrations::run_migrations(conn)?;
        let version = db::migrations::get_schema_version(conn)?;
        eprintln!("Database schema version: {}", version);
        Ok(())
    })?;

    let retry = RetryPolicy::new(config.retry_attempts, Duration::from_millis(500));
    let mailer: Arc<dyn Mailer> = if config.mail.is_configured() {
        Arc::new(MailgunMailer::new(config.mail.clone(), config.http_timeout)?)
    } else {
        info!("Mailgun is not configured, verification emails are only logged");
        Arc::new(LogMailer)
    };
    let external = Collaborators {
        inference: Arc::new(MlApiClient::new(&config.ml_base_url, config.http_timeout, retry)?),
        lookup: Arc::new(FoodDataCentralClient::new(
            &config.fdc_base_url,
            &config.fdc_api_key,
            config.http_timeout,
            retry,
        )?),
        store: Arc::new(LocalBlobStore::new(&config.storage_dir, &config.storage_public_url)),
        mailer,
    };

    let service = SweetlifeService::new(&config, database, external);

    let transport = (stdin(), stdout());
    let server = service.serve(transport).await?;
    server.waiting().await?;

    Ok(())
}
