//! Which order fields each caller role may write.
//!
//! Every write payload is checked against the caller's allow-list before any
//! field is looked at; one disallowed key rejects the whole payload.

use serde_json::{Map, Value};

use crate::errors::Error;

/// Write precondition accepted from every writing role. Not a field.
pub const VERSION_KEY: &str = "version";

/// Roles that may write. Link holders outside the pharmacy only get the
/// public read route and have no entry here.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Role {
    /// Pharmacy staff holding the token
    Fulfillment,
    /// Authenticated platform staff
    Clinical,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Field {
    Status,
    DispensingNotes,
    DispenserIdentity,
    Submit,
    ValidUntil,
}

const FULFILLMENT_FIELDS: &[Field] = &[
    Field::Status,
    Field::DispensingNotes,
    Field::DispenserIdentity,
    Field::Submit,
];

const CLINICAL_FIELDS: &[Field] = &[
    Field::Status,
    Field::DispensingNotes,
    Field::DispenserIdentity,
    Field::Submit,
    Field::ValidUntil,
];

impl Field {
    pub fn key(&self) -> &'static str {
        match self {
            Field::Status => "status",
            Field::DispensingNotes => "dispensingNotes",
            Field::DispenserIdentity => "dispenserIdentity",
            Field::Submit => "submit",
            Field::ValidUntil => "validUntil",
        }
    }
}

impl Role {
    pub fn writable_fields(&self) -> &'static [Field] {
        match self {
            Role::Fulfillment => FULFILLMENT_FIELDS,
            Role::Clinical => CLINICAL_FIELDS,
        }
    }

    pub fn can_write(&self, key: &str) -> bool {
        key == VERSION_KEY || self.writable_fields().iter().any(|f| f.key() == key)
    }

    /// Rejects the payload if any key falls outside this role's allow-list.
    pub fn check_payload(&self, payload: &Map<String, Value>) -> Result<(), Error> {
        let mut denied: Vec<&String> = payload.keys().filter(|k| !self.can_write(k)).collect();
        if denied.is_empty() {
            return Ok(());
        }
        denied.sort();
        Err(Error::Validation {
            errors: denied
                .into_iter()
                .map(|k| format!("field '{}' is not writable", k))
                .collect(),
        })
    }
}
