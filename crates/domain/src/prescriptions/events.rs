use chrono::{DateTime, Utc};
use cqrs_es::DomainEvent;
use serde::{Deserialize, Serialize};

use super::aggregate::{
    DispenserIdentity, MedicationLine, OrderKind, OrderStatus, PatientSnapshot, Prescriber,
};
use super::PublicToken;

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(tag = "type")]
pub enum Event {
    Issued {
        id: String,
        kind: OrderKind,
        public_token: Option<PublicToken>,
        prescriber: Prescriber,
        patient_id: String,
        patient: PatientSnapshot,
        issued_at: DateTime<Utc>,
        valid_until: DateTime<Utc>,
        lines: Vec<MedicationLine>,
    },

    FulfillmentRecorded {
        id: String,
        status: OrderStatus,
        dispensing_notes: Option<String>,
        dispenser: Option<DispenserIdentity>,
        recorded_at: DateTime<Utc>,
    },

    Submitted {
        id: String,
        submitted_at: DateTime<Utc>,
    },

    ValidityAmended {
        id: String,
        valid_until: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    },
}

impl DomainEvent for Event {
    fn event_type(&self) -> String {
        match self {
            Event::Issued { .. } => "Prescription:Issued".to_string(),
            Event::FulfillmentRecorded { .. } => "Prescription:FulfillmentRecorded".to_string(),
            Event::Submitted { .. } => "Prescription:Submitted".to_string(),
            Event::ValidityAmended { .. } => "Prescription:ValidityAmended".to_string(),
        }
    }

    fn event_version(&self) -> String {
        "1.0".to_string()
    }
}
