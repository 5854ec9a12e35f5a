use std::sync::Arc;

use madrasati_shared::clients::db;
use madrasati_shared::clients::minio::MinioClient;
use madrasati_shared::clients::rabbitmq::RabbitMQClient;

use madrasati_school::clients::users::UserDirectory;
use madrasati_school::config::AppConfig;
use madrasati_school::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    madrasati_shared::middleware::init_tracing("madrasati-school");

    let config = AppConfig::load()?;
    let port = config.port;

    let db = db::create_pool(&config.database_url, config.db_pool_size)?;
    let rabbitmq = RabbitMQClient::connect(&config.rabbitmq_url).await?;
    let minio = MinioClient::new(
        &config.minio_endpoint,
        &config.minio_access_key,
        &config.minio_secret_key,
        &config.minio_bucket,
        &config.minio_public_url,
    )
    .await;
    let users = UserDirectory::new(&config.auth_service_url)?;

    let state = Arc::new(AppState { db, config, rabbitmq, minio, users });
    let app = madrasati_school::router(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(addr = %addr, "madrasati-school starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
