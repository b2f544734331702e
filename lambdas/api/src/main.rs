use std::sync::Arc;

use aws_config::BehaviorVersion;
use rx_api::{build_router, AppState};
use rx_domain::{
    config::RegistryBackend,
    prescriptions::{
        assets::{AssetGenerator, NoopAssetGenerator, S3AssetGenerator},
        dynamo::DynamoRegistry,
        MemRegistry, OrderService, Registry,
    },
    OrderConfig,
};

#[tokio::main]
async fn main() -> Result<(), lambda_http::Error> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();

    let config = OrderConfig::from_env();
    check_config(&config)?;
    let aws = aws_config::defaults(BehaviorVersion::latest()).load().await;

    let registry: Arc<dyn Registry> = match config.registry {
        RegistryBackend::Dynamo => Arc::new(DynamoRegistry::new(
            aws_sdk_dynamodb::Client::new(&aws),
            config.tables.clone(),
        )),
        RegistryBackend::Memory => {
            tracing::warn!("using in-memory registry; orders will not survive a restart");
            Arc::new(MemRegistry::new())
        }
    };

    let assets: Arc<dyn AssetGenerator> = match &config.qr_asset_bucket {
        Some(bucket) => Arc::new(S3AssetGenerator::new(aws_sdk_s3::Client::new(&aws), bucket)),
        None => Arc::new(NoopAssetGenerator),
    };

    tracing::info!(registry = ?config.registry, qr_assets = config.qr_asset_bucket.is_some(), "starting");

    let state = AppState::new(OrderService::new(config, registry, assets));
    let app = build_router(state);

    let app = tower::ServiceBuilder::new()
        .layer(axum_aws_lambda::LambdaLayer::default())
        .service(app);

    lambda_http::run(app).await?;
    Ok(())
}

fn check_config(config: &OrderConfig) -> anyhow::Result<()> {
    anyhow::ensure!(
        config.share_base_url.starts_with("https://") || config.share_base_url.starts_with("http://"),
        "SHARE_BASE_URL must be an http(s) URL"
    );
    anyhow::ensure!(config.token_attempts > 0, "TOKEN_ATTEMPTS must be at least 1");
    Ok(())
}
