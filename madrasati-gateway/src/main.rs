use std::sync::Arc;
use std::time::Duration;

use madrasati_gateway::config::AppConfig;
use madrasati_gateway::{router, AppState};
use madrasati_shared::clients::redis::RedisClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    madrasati_shared::middleware::init_tracing("madrasati-gateway");

    let config = AppConfig::load()?;
    let port = config.port;

    let redis = match RedisClient::connect(&config.redis_url).await {
        Ok(client) => Some(client),
        Err(e) => {
            tracing::warn!(error = %e, url = %config.redis_url, "Redis unavailable, rate limiting disabled");
            None
        }
    };

    let metrics_handle = madrasati_shared::middleware::init_metrics()?;

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;

    let state = Arc::new(AppState {
        config,
        http_client,
        redis,
        metrics_handle,
    });

    let app = router(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(addr = %addr, "madrasati-gateway starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
