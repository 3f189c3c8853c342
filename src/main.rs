//! Feline & Friend storefront service

use std::sync::Arc;

use anyhow::Result;
use feline_storefront::{
    cart_store::{CartPersistence, CartSessions, InMemoryCartPersistence, JsonFileCartPersistence},
    http::{self, AppState},
    CheckoutService, CommerceStore, Config, InMemoryStore, NotificationSink, PgStore, TracingNotifier,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();

    let store: Arc<dyn CommerceStore> = match (&config.database_url, &config.catalog_seed) {
        (Some(url), _) => {
            let store = PgStore::connect(url, config.database_max_connections).await?;
            store.migrate().await?;
            tracing::info!("using PostgreSQL store");
            Arc::new(store)
        }
        (None, Some(seed)) => {
            tracing::info!(seed = %seed.display(), "using in-memory store seeded from catalog file");
            Arc::new(InMemoryStore::from_catalog_file(seed)?)
        }
        (None, None) => {
            tracing::warn!("no DATABASE_URL or CATALOG_SEED set; starting with an empty in-memory catalog");
            Arc::new(InMemoryStore::new())
        }
    };

    let persistence: Arc<dyn CartPersistence> = match &config.cart_storage_dir {
        Some(dir) => Arc::new(JsonFileCartPersistence::new(dir)?),
        None => Arc::new(InMemoryCartPersistence::new()),
    };
    let notifier: Arc<dyn NotificationSink> = Arc::new(TracingNotifier);

    let checkout = CheckoutService::new(store.clone(), notifier.clone())
        .with_currency(config.currency.clone())
        .with_commit_timeout(config.checkout_timeout);
    let state = AppState { store, carts: Arc::new(CartSessions::new(persistence, notifier)), checkout: Arc::new(checkout) };

    let addr = config.socket_addr();
    tracing::info!("Feline & Friend storefront listening on {}", addr);
    axum::serve(tokio::net::TcpListener::bind(&addr).await?, http::router(state)).await?;
    Ok(())
}
