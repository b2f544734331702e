use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::errors::Error;

use super::{Prescription, PublicToken, AGGREGATE_TYPE};

/// Durable order store.
///
/// Orders are keyed by internal id; the public token is served from a
/// separate index. Writes after creation are conditional on the stored
/// version and the registry never resolves conflicts itself.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Stores a brand new order. Fails with `Uniqueness` if the id or token
    /// is already taken; nothing is stored in that case.
    async fn insert(&self, order: &Prescription) -> Result<(), Error>;

    async fn get_by_id(&self, id: &str) -> Result<Option<Prescription>, Error>;

    async fn get_by_token(&self, token: &PublicToken) -> Result<Option<Prescription>, Error>;

    /// Replaces the stored order only if its version still equals
    /// `expected_version` and it is not frozen.
    async fn update(&self, order: &Prescription, expected_version: u64) -> Result<(), Error>;

    /// Appends to the patient's ordered order-id list. Appending an id that is
    /// already present is a no-op.
    async fn append_to_patient_history(&self, patient_id: &str, order_id: &str) -> Result<(), Error>;

    async fn patient_history(&self, patient_id: &str) -> Result<Vec<String>, Error>;
}

#[derive(Default)]
struct Tables {
    orders: HashMap<String, Prescription>,
    tokens: HashMap<PublicToken, String>,
    history: HashMap<String, Vec<String>>,
}

/// In-process registry used by tests and local runs.
#[derive(Default)]
pub struct MemRegistry {
    tables: RwLock<Tables>,
}

impl MemRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Registry for MemRegistry {
    async fn insert(&self, order: &Prescription) -> Result<(), Error> {
        let mut tables = self.tables.write().await;

        if tables.orders.contains_key(&order.id) {
            return Err(Error::Uniqueness { field: "id".to_string() });
        }
        if let Some(token) = &order.public_token {
            if tables.tokens.contains_key(token) {
                return Err(Error::Uniqueness { field: "publicToken".to_string() });
            }
            tables.tokens.insert(token.clone(), order.id.clone());
        }
        tables.orders.insert(order.id.clone(), order.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Prescription>, Error> {
        Ok(self.tables.read().await.orders.get(id).cloned())
    }

    async fn get_by_token(&self, token: &PublicToken) -> Result<Option<Prescription>, Error> {
        let tables = self.tables.read().await;
        Ok(tables
            .tokens
            .get(token)
            .and_then(|id| tables.orders.get(id))
            .cloned())
    }

    async fn update(&self, order: &Prescription, expected_version: u64) -> Result<(), Error> {
        let mut tables = self.tables.write().await;

        let stored = tables.orders.get(&order.id).ok_or_else(|| Error::NotFound {
            entity: AGGREGATE_TYPE.to_string(),
        })?;
        if stored.submitted_lock {
            return Err(Error::OrderFrozen);
        }
        if stored.version != expected_version {
            return Err(Error::Conflict {
                expected: expected_version,
                actual: stored.version,
            });
        }

        tables.orders.insert(order.id.clone(), order.clone());
        Ok(())
    }

    async fn append_to_patient_history(&self, patient_id: &str, order_id: &str) -> Result<(), Error> {
        let mut tables = self.tables.write().await;
        let ids = tables.history.entry(patient_id.to_string()).or_default();
        if !ids.iter().any(|id| id == order_id) {
            ids.push(order_id.to_string());
        }
        Ok(())
    }

    async fn patient_history(&self, patient_id: &str) -> Result<Vec<String>, Error> {
        Ok(self
            .tables
            .read()
            .await
            .history
            .get(patient_id)
            .cloned()
            .unwrap_or_default())
    }
}
