//! Keystone - website backend for a structural-engineering consultancy

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use keystone::{
    api::{self, AppState},
    config::Config,
    remote::RemoteStore,
    services::{ContactService, Mailer},
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keystone=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Keystone...");

    // Load configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");

    let (store, mailer) = connect(&config)?;

    let contact = ContactService::new(store.clone(), mailer, config.mail.recipients.clone());
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::new(config, store, contact);

    // Build router
    let app = api::build_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Demo mode: an in-memory store with one admin account and a mailer that
/// only records messages
#[cfg(feature = "demo")]
fn connect(_config: &Config) -> Result<(Arc<dyn RemoteStore>, Option<Arc<dyn Mailer>>)> {
    use keystone::remote::MemoryStore;
    use keystone::services::MemoryMailer;

    let store = MemoryStore::new();
    store.add_user("admin@example.com", "demo1234");
    tracing::info!("Demo mode: in-memory store with admin@example.com / demo1234");

    let mailer: Arc<dyn Mailer> = Arc::new(MemoryMailer::default());
    Ok((Arc::new(store), Some(mailer)))
}

#[cfg(not(feature = "demo"))]
fn connect(config: &Config) -> Result<(Arc<dyn RemoteStore>, Option<Arc<dyn Mailer>>)> {
    use keystone::remote::HostedStore;
    use keystone::services::SmtpMailer;

    let store = HostedStore::new(&config.remote)?;
    tracing::info!("Data store: {}", config.remote.url);

    let mailer: Option<Arc<dyn Mailer>> = if config.mail.is_configured() {
        let mailer = SmtpMailer::from_config(&config.mail)?;
        tracing::info!("Mail relay: {}:{}", config.mail.smtp_host, config.mail.smtp_port);
        Some(Arc::new(mailer))
    } else {
        tracing::warn!("Mail is not configured; contact requests will be rejected");
        None
    };

    Ok((Arc::new(store), mailer))
}
