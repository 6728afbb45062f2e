mod config;
mod error;
mod routes;
mod state;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use db::DBService;
use remote::{
    DirectTransport, GatewayTransport, HttpTokenProvider, RemoteStore, StaticTokenProvider,
    TokenProvider,
};
use services::services::{
    cache_sync::CacheSyncService, chores::ChoreService, notification::NotificationService,
    reconcile::ReconcileService,
};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::state::AppState;

fn token_provider(config: &Config) -> anyhow::Result<Arc<dyn TokenProvider>> {
    if let (Some(token_url), Some(client_id), Some(refresh_token)) = (
        config.token_url.as_ref(),
        config.client_id.as_ref(),
        config.refresh_token.as_ref(),
    ) {
        let provider =
            HttpTokenProvider::new(token_url.as_str(), client_id.as_str(), refresh_token.as_str())
                .context("building token provider")?;
        return Ok(Arc::new(provider));
    }
    if let Some(token) = config.access_token.as_deref() {
        info!("using a fixed access token; it will not be refreshed");
        return Ok(Arc::new(StaticTokenProvider::new(Some(token), Some(token))));
    }
    warn!("no credential configured; all remote operations will use the gateway");
    Ok(Arc::new(StaticTokenProvider::new(None, None)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    info!(family_id = %config.family_id, "starting choreboard server");

    let db = DBService::new(&config.database_url)
        .await
        .context("opening local cache database")?;

    let direct = DirectTransport::new(&config.store_base_url, &config.family_id)
        .context("building direct transport")?;
    let gateway = GatewayTransport::new(&config.gateway_url, &config.family_id)
        .context("building gateway transport")?;
    let remote = Arc::new(RemoteStore::new(direct, gateway, token_provider(&config)?));

    let notifications = NotificationService::new(config.desktop_notifications);
    let cache_sync = CacheSyncService::new(db.clone(), notifications);
    let reconciler = Arc::new(ReconcileService::new(remote.clone(), cache_sync.clone()));
    let chores = Arc::new(ChoreService::new(
        remote.clone(),
        cache_sync,
        reconciler.clone(),
    ));

    // One pass right away so the cache is warm, then the periodic loop.
    let startup = reconciler.clone();
    tokio::spawn(async move {
        if let Err(e) = startup.run_once().await {
            warn!(error = %e, "startup reconcile failed");
        }
    });
    reconciler
        .clone()
        .spawn(Duration::from_secs(config.reconcile_interval_secs));

    let state = AppState {
        db,
        chores,
        reconciler,
    };
    let app = axum::Router::new()
        .nest("/api", routes::router())
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    info!("listening on {}", config.bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
