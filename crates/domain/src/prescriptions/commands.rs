use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::aggregate::{
    DispenserIdentity, MedicationLine, OrderKind, OrderStatus, PatientSnapshot, Prescriber,
};
use super::PublicToken;

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub enum Command {
    /// Write a new order; the full set of lines is supplied here and never again
    Issue {
        id: String,
        kind: OrderKind,
        public_token: Option<PublicToken>,
        prescriber: Prescriber,
        patient_id: String,
        patient: PatientSnapshot,
        valid_until: Option<DateTime<Utc>>,
        lines: Vec<MedicationLine>,
        at: DateTime<Utc>,
    },

    /// Record a dispensing outcome, optionally freezing the order
    RecordFulfillment {
        status: OrderStatus,
        dispensing_notes: Option<String>,
        dispenser: Option<DispenserIdentity>,
        submit: bool,
        at: DateTime<Utc>,
    },

    /// Move the validity window (clinical staff only)
    AmendValidity {
        valid_until: DateTime<Utc>,
        at: DateTime<Utc>,
    },
}
