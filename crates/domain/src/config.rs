use std::env;

use crate::prescriptions::PublicToken;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum RegistryBackend {
    #[default]
    Memory,
    Dynamo,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DynamoTables {
    pub orders: String,
    pub tokens: String,
    pub history: String,
}

impl Default for DynamoTables {
    fn default() -> Self {
        Self {
            orders: "rx-orders".to_string(),
            tokens: "rx-order-tokens".to_string(),
            history: "rx-patient-history".to_string(),
        }
    }
}

/// Settings injected into [`crate::prescriptions::OrderService`]. Nothing
/// below the service reads process state.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OrderConfig {
    /// Base of the link encoded into the QR asset.
    pub share_base_url: String,
    /// How many fresh tokens to try before giving up on a collision.
    pub token_attempts: u32,
    pub registry: RegistryBackend,
    pub tables: DynamoTables,
    /// No bucket means QR generation is skipped.
    pub qr_asset_bucket: Option<String>,
}

impl Default for OrderConfig {
    fn default() -> Self {
        Self {
            share_base_url: "http://localhost:3000".to_string(),
            token_attempts: 3,
            registry: RegistryBackend::default(),
            tables: DynamoTables::default(),
            qr_asset_bucket: None,
        }
    }
}

impl OrderConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let registry = match env::var("REGISTRY_BACKEND").as_deref() {
            Ok("dynamodb") => RegistryBackend::Dynamo,
            _ => RegistryBackend::Memory,
        };

        Self {
            share_base_url: env::var("SHARE_BASE_URL").unwrap_or(defaults.share_base_url),
            token_attempts: env::var("TOKEN_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.token_attempts),
            registry,
            tables: DynamoTables {
                orders: env::var("DYNAMODB_ORDERS_TABLE").unwrap_or(defaults.tables.orders),
                tokens: env::var("DYNAMODB_ORDER_TOKENS_TABLE").unwrap_or(defaults.tables.tokens),
                history: env::var("DYNAMODB_PATIENT_HISTORY_TABLE")
                    .unwrap_or(defaults.tables.history),
            },
            qr_asset_bucket: env::var("QR_ASSET_BUCKET").ok().filter(|b| !b.is_empty()),
        }
    }

    pub fn shareable_url(&self, token: &PublicToken) -> String {
        format!(
            "{}/orders/{}",
            self.share_base_url.trim_end_matches('/'),
            token.expose()
        )
    }
}
