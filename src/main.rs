//! Kidswear Store API server

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kidswear_store::services::{self, CoolSmsClient, EventPublisher, KakaoClient, SessionKeys, TossClient};
use kidswear_store::{app, AppState, Config, Database, MemoryStore, Repositories, SystemClock};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kidswear_store=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!(environment = config.environment.as_str(), "configuration loaded");

    let repos = match &config.database_url {
        Some(url) => {
            let db = Database::connect(url).await?;
            db.run_migrations().await?;
            tracing::info!("database connected, migrations applied");
            Repositories::from_store(Arc::new(db))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using the in-memory store, data is lost on restart");
            Repositories::from_store(Arc::new(MemoryStore::new()))
        }
    };

    let nats = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => {
                tracing::info!(url, "NATS connected");
                Some(client)
            }
            Err(e) => {
                tracing::warn!(url, "NATS unavailable, events disabled: {e}");
                None
            }
        },
        None => None,
    };

    let http = services::http_client()?;
    let state = AppState {
        repos,
        gateway: Arc::new(TossClient::new(http.clone(), config.toss.clone())),
        identity: Arc::new(KakaoClient::new(http.clone(), config.kakao.clone())),
        sms: Arc::new(CoolSmsClient::new(http, config.sms.clone())),
        sessions: SessionKeys::new(&config.session_secret, !config.is_development()),
        events: EventPublisher::new(nats),
        clock: Arc::new(SystemClock),
        config: Arc::new(config.clone()),
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}
