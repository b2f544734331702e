use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cqrs_es::EventEnvelope;
use serde::{Deserialize, Serialize};

use super::aggregate::{
    DispenserIdentity, MedicationLine, OrderKind, OrderStatus, PatientSnapshot, Prescriber,
};
use super::{Event, Prescription, PublicToken, Registry};

/// What anyone holding the link may see.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublicView {
    pub status: OrderStatus,
    pub lines: Vec<MedicationLine>,
    pub valid_until: DateTime<Utc>,
    pub prescriber_name: String,
    pub prescriber_specialty: String,
}

/// Pharmacy projection: the public fields plus the dispensing record and
/// the version to send back with the next write.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FulfillmentView {
    #[serde(flatten)]
    pub order: PublicView,
    pub dispensing_notes: Option<String>,
    pub dispenser_identity: Option<DispenserIdentity>,
    pub submitted_lock: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub version: u64,
}

/// Everything, for the clinician who wrote the order and platform staff.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FullView {
    pub id: String,
    pub kind: OrderKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_token: Option<PublicToken>,
    pub prescriber: Prescriber,
    pub patient_id: String,
    pub patient_snapshot: PatientSnapshot,
    pub issued_at: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub lines: Vec<MedicationLine>,
    pub status: OrderStatus,
    pub dispensing_notes: Option<String>,
    pub dispenser_identity: Option<DispenserIdentity>,
    pub submitted_lock: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl From<&Prescription> for PublicView {
    fn from(order: &Prescription) -> Self {
        Self {
            status: order.status,
            lines: order.lines.clone(),
            valid_until: order.valid_until,
            prescriber_name: order.prescriber.name.clone(),
            prescriber_specialty: order.prescriber.specialty.clone(),
        }
    }
}

impl From<&Prescription> for FulfillmentView {
    fn from(order: &Prescription) -> Self {
        Self {
            order: PublicView::from(order),
            dispensing_notes: order.dispensing_notes.clone(),
            dispenser_identity: order.dispenser.clone(),
            submitted_lock: order.submitted_lock,
            completed_at: order.completed_at,
            version: order.version,
        }
    }
}

impl From<Prescription> for FullView {
    fn from(order: Prescription) -> Self {
        Self {
            id: order.id,
            kind: order.kind,
            public_token: order.public_token,
            prescriber: order.prescriber,
            patient_id: order.patient_id,
            patient_snapshot: order.patient,
            issued_at: order.issued_at,
            valid_until: order.valid_until,
            lines: order.lines,
            status: order.status,
            dispensing_notes: order.dispensing_notes,
            dispenser_identity: order.dispenser,
            submitted_lock: order.submitted_lock,
            completed_at: order.completed_at,
            updated_at: order.updated_at,
            version: order.version,
        }
    }
}

/// Ordered list of order ids on the patient aggregate.
#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PatientHistory {
    pub patient_id: String,
    pub order_ids: Vec<String>,
}

/// Keeps patient history in step with committed order events. The registry
/// stays the only source of order content; this only records references.
pub struct PatientHistoryQuery {
    registry: Arc<dyn Registry>,
}

impl PatientHistoryQuery {
    pub fn new(registry: Arc<dyn Registry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl cqrs_es::Query<Prescription> for PatientHistoryQuery {
    async fn dispatch(&self, order_id: &str, events: &[EventEnvelope<Prescription>]) {
        for envelope in events {
            let Event::Issued { patient_id, .. } = &envelope.payload else {
                continue;
            };
            if let Err(err) = self
                .registry
                .append_to_patient_history(patient_id, order_id)
                .await
            {
                tracing::error!(order_id, error = %err, "patient history append failed");
            }
        }
    }
}
