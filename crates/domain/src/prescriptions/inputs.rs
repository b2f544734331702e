use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::Error;

use super::aggregate::{DispenserIdentity, MedicationLine, OrderStatus, PatientSnapshot};
use super::capabilities::Role;

/// Body of an authoring request. Missing members deserialize as empty so the
/// validator can report all of them at once.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CreateOrderInput {
    pub prescriber_id: Option<String>,
    pub patient_id: String,
    pub patient_snapshot: PatientSnapshot,
    pub valid_until: Option<DateTime<Utc>>,
    pub lines: Vec<MedicationLine>,
}

impl CreateOrderInput {
    pub fn from_json(body: Value) -> Result<Self, Error> {
        serde_json::from_value(body).map_err(|e| Error::validation(e.to_string()))
    }
}

/// A write request against an existing order, already checked against the
/// caller's capability allow-list.
#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct OrderPatch {
    pub status: Option<OrderStatus>,
    pub dispensing_notes: Option<String>,
    pub dispenser_identity: Option<DispenserIdentity>,
    pub submit: Option<bool>,
    pub valid_until: Option<DateTime<Utc>>,
    /// Version the caller last read; defaults to the version loaded for the write.
    pub version: Option<u64>,
}

impl OrderPatch {
    pub fn from_json(role: Role, body: Value) -> Result<Self, Error> {
        let Value::Object(map) = body else {
            return Err(Error::validation("body must be a JSON object"));
        };
        role.check_payload(&map)?;

        let patch: OrderPatch = serde_json::from_value(Value::Object(map))
            .map_err(|e| Error::validation(e.to_string()))?;

        if patch.status.is_none() {
            if role == Role::Fulfillment {
                return Err(Error::validation("status is required"));
            }
            if patch.touches_fulfillment() {
                return Err(Error::validation(
                    "status is required when recording fulfillment fields",
                ));
            }
        }
        if !patch.has_changes() {
            return Err(Error::validation("no fields to update"));
        }

        Ok(patch)
    }

    fn touches_fulfillment(&self) -> bool {
        self.dispensing_notes.is_some() || self.dispenser_identity.is_some() || self.submit.is_some()
    }

    fn has_changes(&self) -> bool {
        self.status.is_some() || self.touches_fulfillment() || self.valid_until.is_some()
    }
}
