use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_s3::{error::DisplayErrorContext, primitives::ByteStream};
use derive_new::new;
use serde::{Deserialize, Serialize};

use crate::errors::Error;

use super::PublicToken;

/// Input for the external QR asset renderer.
#[derive(Clone, Debug, new)]
pub struct AssetRequest {
    pub order_id: String,
    pub token: PublicToken,
    pub shareable_url: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct AssetReference(pub String);

#[async_trait]
pub trait AssetGenerator: Send + Sync {
    async fn generate(&self, request: &AssetRequest) -> Result<AssetReference, Error>;
}

/// Used when no asset bucket is configured.
#[derive(Clone, Default)]
pub struct NoopAssetGenerator;

#[async_trait]
impl AssetGenerator for NoopAssetGenerator {
    async fn generate(&self, request: &AssetRequest) -> Result<AssetReference, Error> {
        Ok(AssetReference(format!("noop://{}", request.order_id)))
    }
}

#[derive(Serialize)]
struct QrPayload<'a> {
    order_id: &'a str,
    payload: &'a str,
}

/// Drops the QR payload document into S3 for the renderer to pick up.
pub struct S3AssetGenerator {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3AssetGenerator {
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl AssetGenerator for S3AssetGenerator {
    async fn generate(&self, request: &AssetRequest) -> Result<AssetReference, Error> {
        // keyed by order id so the token never shows up in object listings
        let key = format!("qr-payloads/{}.json", request.order_id);
        let body = serde_json::to_vec(&QrPayload {
            order_id: &request.order_id,
            payload: &request.shareable_url,
        })
        .map_err(Error::upstream)?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type("application/json")
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| Error::upstream(DisplayErrorContext(&e)))?;

        Ok(AssetReference(format!("s3://{}/{}", self.bucket, key)))
    }
}

/// Fire-and-forget: the order is already committed, so a failure here is
/// only logged.
pub fn dispatch(generator: Arc<dyn AssetGenerator>, request: AssetRequest) {
    tokio::spawn(async move {
        match generator.generate(&request).await {
            Ok(reference) => {
                tracing::info!(order_id = %request.order_id, asset = %reference.0, "QR asset generated");
            }
            Err(err) => {
                tracing::warn!(
                    order_id = %request.order_id,
                    kind = err.kind(),
                    error = %err,
                    "QR asset generation failed"
                );
            }
        }
    });
}
