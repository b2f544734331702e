use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::{
    error::DisplayErrorContext,
    operation::transact_write_items::TransactWriteItemsError,
    types::{AttributeValue, Put, TransactWriteItem},
    Client,
};
use serde::{Deserialize, Serialize};

use crate::config::DynamoTables;
use crate::errors::Error;

use super::{Prescription, PublicToken, Registry, AGGREGATE_TYPE};

type Item = HashMap<String, AttributeValue>;

#[derive(Debug, Default, Serialize, Deserialize)]
struct TokenRecord {
    token: String,
    order_id: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct HistoryRecord {
    patient_id: String,
    #[serde(default)]
    order_ids: Vec<String>,
}

/// DynamoDB-backed registry: one table per concern (orders by id, token
/// index, patient history).
pub struct DynamoRegistry {
    client: Client,
    tables: DynamoTables,
}

impl DynamoRegistry {
    pub fn new(client: Client, tables: DynamoTables) -> Self {
        Self { client, tables }
    }

    async fn get_item(&self, table: &str, key: &str, value: &str) -> Result<Option<Item>, Error> {
        let output = self
            .client
            .get_item()
            .table_name(table)
            .key(key, AttributeValue::S(value.to_string()))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| Error::persistence(DisplayErrorContext(&e)))?;

        Ok(output.item().cloned())
    }

    /// A failed update condition means the order moved on, froze, or vanished.
    async fn classify_rejected_update(&self, order_id: &str, expected_version: u64) -> Error {
        match self.get_by_id(order_id).await {
            Ok(Some(stored)) if stored.submitted_lock => Error::OrderFrozen,
            Ok(Some(stored)) => Error::Conflict {
                expected: expected_version,
                actual: stored.version,
            },
            Ok(None) => Error::NotFound {
                entity: AGGREGATE_TYPE.to_string(),
            },
            Err(err) => err,
        }
    }
}

fn cancelled_field(err: &TransactWriteItemsError) -> Option<&'static str> {
    let TransactWriteItemsError::TransactionCanceledException(cancelled) = err else {
        return None;
    };
    // reasons are positional: 0 = order put, 1 = token put
    cancelled
        .cancellation_reasons()
        .iter()
        .position(|r| r.code() == Some("ConditionalCheckFailed"))
        .map(|i| if i == 0 { "id" } else { "publicToken" })
}

#[async_trait]
impl Registry for DynamoRegistry {
    async fn insert(&self, order: &Prescription) -> Result<(), Error> {
        let item: Item = serde_dynamo::to_item(order).map_err(Error::persistence)?;

        let put_order = Put::builder()
            .table_name(&self.tables.orders)
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(#id)")
            .expression_attribute_names("#id", "id")
            .build()
            .map_err(Error::persistence)?;

        let mut request = self
            .client
            .transact_write_items()
            .transact_items(TransactWriteItem::builder().put(put_order).build());

        if let Some(token) = &order.public_token {
            let record = TokenRecord {
                token: token.expose().to_string(),
                order_id: order.id.clone(),
            };
            let put_token = Put::builder()
                .table_name(&self.tables.tokens)
                .set_item(Some(serde_dynamo::to_item(record).map_err(Error::persistence)?))
                .condition_expression("attribute_not_exists(#token)")
                .expression_attribute_names("#token", "token")
                .build()
                .map_err(Error::persistence)?;
            request = request.transact_items(TransactWriteItem::builder().put(put_token).build());
        }

        match request.send().await {
            Ok(_) => Ok(()),
            Err(err) => match err.as_service_error().and_then(cancelled_field) {
                Some(field) => Err(Error::Uniqueness { field: field.to_string() }),
                None => Err(Error::persistence(DisplayErrorContext(&err))),
            },
        }
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Prescription>, Error> {
        match self.get_item(&self.tables.orders, "id", id).await? {
            Some(item) => Ok(Some(serde_dynamo::from_item(item).map_err(Error::persistence)?)),
            None => Ok(None),
        }
    }

    async fn get_by_token(&self, token: &PublicToken) -> Result<Option<Prescription>, Error> {
        let Some(item) = self
            .get_item(&self.tables.tokens, "token", token.expose())
            .await?
        else {
            return Ok(None);
        };
        let record: TokenRecord = serde_dynamo::from_item(item).map_err(Error::persistence)?;
        self.get_by_id(&record.order_id).await
    }

    async fn update(&self, order: &Prescription, expected_version: u64) -> Result<(), Error> {
        let item: Item = serde_dynamo::to_item(order).map_err(Error::persistence)?;

        let result = self
            .client
            .put_item()
            .table_name(&self.tables.orders)
            .set_item(Some(item))
            .condition_expression("#version = :expected AND #locked = :unlocked")
            .expression_attribute_names("#version", "version")
            .expression_attribute_names("#locked", "submitted_lock")
            .expression_attribute_values(":expected", AttributeValue::N(expected_version.to_string()))
            .expression_attribute_values(":unlocked", AttributeValue::Bool(false))
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_conditional_check_failed_exception()) =>
            {
                Err(self.classify_rejected_update(&order.id, expected_version).await)
            }
            Err(err) => Err(Error::persistence(DisplayErrorContext(&err))),
        }
    }

    async fn append_to_patient_history(&self, patient_id: &str, order_id: &str) -> Result<(), Error> {
        let result = self
            .client
            .update_item()
            .table_name(&self.tables.history)
            .key("patient_id", AttributeValue::S(patient_id.to_string()))
            .update_expression("SET #ids = list_append(if_not_exists(#ids, :empty), :appended)")
            .condition_expression("attribute_not_exists(#ids) OR NOT contains(#ids, :order_id)")
            .expression_attribute_names("#ids", "order_ids")
            .expression_attribute_values(":empty", AttributeValue::L(vec![]))
            .expression_attribute_values(
                ":appended",
                AttributeValue::L(vec![AttributeValue::S(order_id.to_string())]),
            )
            .expression_attribute_values(":order_id", AttributeValue::S(order_id.to_string()))
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            // already listed
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_conditional_check_failed_exception()) =>
            {
                Ok(())
            }
            Err(err) => Err(Error::persistence(DisplayErrorContext(&err))),
        }
    }

    async fn patient_history(&self, patient_id: &str) -> Result<Vec<String>, Error> {
        match self
            .get_item(&self.tables.history, "patient_id", patient_id)
            .await?
        {
            Some(item) => {
                let record: HistoryRecord =
                    serde_dynamo::from_item(item).map_err(Error::persistence)?;
                Ok(record.order_ids)
            }
            None => Ok(Vec::new()),
        }
    }
}
