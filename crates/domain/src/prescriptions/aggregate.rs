use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use cqrs_es::Aggregate;
use serde::{Deserialize, Serialize};

use crate::errors::Error;

use super::{Command, Event, PublicToken};

/// Fulfillment status of an order
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
pub enum OrderStatus {
    /// Initial state - nobody at the pharmacy has acted yet
    #[default]
    NotReviewed,
    /// Some of the medication was dispensed; notes say what
    PartiallyFilled,
    /// Pharmacy refused to fill
    Declined,
    /// Fully dispensed
    Completed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::NotReviewed => "NotReviewed",
            OrderStatus::PartiallyFilled => "PartiallyFilled",
            OrderStatus::Declined => "Declined",
            OrderStatus::Completed => "Completed",
        }
    }

    /// NotReviewed fans out to any outcome. After that only the same outcome
    /// may be re-recorded until the order is submitted.
    pub fn can_record(&self, requested: OrderStatus) -> bool {
        match (self, requested) {
            (_, OrderStatus::NotReviewed) => false,
            (OrderStatus::NotReviewed, _) => true,
            (current, requested) => *current == requested,
        }
    }
}

/// Prescriptions go to an outside pharmacy by token; medication orders are
/// dispensed in-house and never get one.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
pub enum OrderKind {
    #[default]
    Prescription,
    Medication,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Prescriber {
    pub id: String,
    pub name: String,
    pub specialty: String,
}

/// Copy of the patient's demographics taken when the order was written.
#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct PatientSnapshot {
    pub name: String,
    pub phone: String,
    pub city: String,
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<NaiveDate>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct MedicationLine {
    pub diagnosis: String,
    pub medication: String,
    pub dosage: String,
    pub frequency: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct DispenserIdentity {
    pub name: String,
    pub contact: String,
}

/// Prescription order aggregate
#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct Prescription {
    pub id: String,
    pub kind: OrderKind,
    pub public_token: Option<PublicToken>,

    // Snapshots taken at issue time
    pub prescriber: Prescriber,
    pub patient_id: String,
    pub patient: PatientSnapshot,

    pub issued_at: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub lines: Vec<MedicationLine>,

    // Fulfillment
    pub status: OrderStatus,
    pub dispensing_notes: Option<String>,
    pub dispenser: Option<DispenserIdentity>,
    pub submitted_lock: bool,
    pub completed_at: Option<DateTime<Utc>>,

    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

pub const AGGREGATE_TYPE: &str = "Prescription";

#[derive(Clone, Default)]
pub struct Services {}

#[async_trait]
impl Aggregate for Prescription {
    type Command = Command;
    type Event = Event;
    type Error = Error;
    type Services = Services;

    fn aggregate_type() -> String {
        AGGREGATE_TYPE.to_string()
    }

    async fn handle(
        &self,
        command: Self::Command,
        _services: &Self::Services,
    ) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            Command::Issue {
                id,
                kind,
                public_token,
                prescriber,
                patient_id,
                patient,
                valid_until,
                lines,
                at,
            } => {
                self.validate_new()?;
                let valid_until = validate_issue(
                    kind,
                    public_token.as_ref(),
                    &prescriber,
                    &patient_id,
                    &patient,
                    valid_until,
                    &lines,
                    at,
                )?;

                Ok(vec![Event::Issued {
                    id,
                    kind,
                    public_token,
                    prescriber,
                    patient_id,
                    patient,
                    issued_at: at,
                    valid_until,
                    lines,
                }])
            }

            Command::RecordFulfillment {
                status,
                dispensing_notes,
                dispenser,
                submit,
                at,
            } => {
                self.validate_existing()?;
                self.validate_unlocked()?;
                self.validate_transition(status)?;
                validate_fulfillment(
                    status,
                    dispensing_notes.as_deref(),
                    dispenser.as_ref(),
                    self.dispenser.as_ref(),
                    submit,
                )?;

                let mut events = vec![Event::FulfillmentRecorded {
                    id: self.id.clone(),
                    status,
                    dispensing_notes,
                    dispenser,
                    recorded_at: at,
                }];
                if submit {
                    events.push(Event::Submitted {
                        id: self.id.clone(),
                        submitted_at: at,
                    });
                }
                Ok(events)
            }

            Command::AmendValidity { valid_until, at } => {
                self.validate_existing()?;
                self.validate_unlocked()?;
                if valid_until <= self.issued_at {
                    return Err(Error::validation("validUntil must be after issuedAt"));
                }

                Ok(vec![Event::ValidityAmended {
                    id: self.id.clone(),
                    valid_until,
                    updated_at: at,
                }])
            }
        }
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            Event::Issued {
                id,
                kind,
                public_token,
                prescriber,
                patient_id,
                patient,
                issued_at,
                valid_until,
                lines,
            } => {
                self.id = id;
                self.kind = kind;
                self.public_token = public_token;
                self.prescriber = prescriber;
                self.patient_id = patient_id;
                self.patient = patient;
                self.issued_at = issued_at;
                self.valid_until = valid_until;
                self.lines = lines;
                self.status = OrderStatus::NotReviewed;
                self.submitted_lock = false;
                self.updated_at = issued_at;
                self.version = 0;
            }

            Event::FulfillmentRecorded {
                status,
                dispensing_notes,
                dispenser,
                recorded_at,
                ..
            } => {
                self.status = status;
                if dispensing_notes.is_some() {
                    self.dispensing_notes = dispensing_notes;
                }
                if dispenser.is_some() {
                    self.dispenser = dispenser;
                }
                self.updated_at = recorded_at;
            }

            Event::Submitted { submitted_at, .. } => {
                self.submitted_lock = true;
                self.completed_at = Some(submitted_at);
                self.updated_at = submitted_at;
            }

            Event::ValidityAmended {
                valid_until,
                updated_at,
                ..
            } => {
                self.valid_until = valid_until;
                self.updated_at = updated_at;
            }
        }
    }
}

impl Prescription {
    /// Runs `command` against the current state and returns the resulting
    /// state together with the events that produced it.
    pub async fn decide(&self, command: Command) -> Result<(Prescription, Vec<Event>), Error> {
        let events = self.handle(command, &Services::default()).await?;
        let mut next = self.clone();
        for event in events.iter().cloned() {
            next.apply(event);
        }
        Ok((next, events))
    }

    fn validate_new(&self) -> Result<(), Error> {
        if !self.id.is_empty() {
            return Err(Error::Uniqueness { field: "id".to_string() });
        }
        Ok(())
    }

    fn validate_existing(&self) -> Result<(), Error> {
        if self.id.is_empty() {
            return Err(Error::NotFound { entity: AGGREGATE_TYPE.to_string() });
        }
        Ok(())
    }

    fn validate_unlocked(&self) -> Result<(), Error> {
        if self.submitted_lock {
            return Err(Error::OrderFrozen);
        }
        Ok(())
    }

    fn validate_transition(&self, requested: OrderStatus) -> Result<(), Error> {
        if !self.status.can_record(requested) {
            return Err(Error::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: requested.as_str().to_string(),
            });
        }
        Ok(())
    }
}

fn blank(value: &str) -> bool {
    value.trim().is_empty()
}

#[allow(clippy::too_many_arguments)]
fn validate_issue(
    kind: OrderKind,
    public_token: Option<&PublicToken>,
    prescriber: &Prescriber,
    patient_id: &str,
    patient: &PatientSnapshot,
    valid_until: Option<DateTime<Utc>>,
    lines: &[MedicationLine],
    issued_at: DateTime<Utc>,
) -> Result<DateTime<Utc>, Error> {
    let mut errors = Vec::new();

    match (kind, public_token) {
        (OrderKind::Prescription, None) => errors.push("publicToken is required".to_string()),
        (OrderKind::Prescription, Some(token)) if blank(token.expose()) => {
            errors.push("publicToken is required".to_string())
        }
        (OrderKind::Medication, Some(_)) => {
            errors.push("publicToken is not allowed on medication orders".to_string())
        }
        _ => {}
    }

    for (field, value) in [
        ("prescriber.id", &prescriber.id),
        ("prescriber.name", &prescriber.name),
        ("prescriber.specialty", &prescriber.specialty),
        ("patientSnapshot.name", &patient.name),
    ] {
        if blank(value) {
            errors.push(format!("{} is required", field));
        }
    }
    if blank(patient_id) {
        errors.push("patientId is required".to_string());
    }

    match valid_until {
        None => errors.push("validUntil is required".to_string()),
        Some(v) if v <= issued_at => errors.push("validUntil must be after issuedAt".to_string()),
        Some(_) => {}
    }

    if lines.is_empty() {
        errors.push("lines must not be empty".to_string());
    }
    for (i, line) in lines.iter().enumerate() {
        for (field, value) in [
            ("diagnosis", &line.diagnosis),
            ("medication", &line.medication),
            ("dosage", &line.dosage),
            ("frequency", &line.frequency),
        ] {
            if blank(value) {
                errors.push(format!("lines[{}].{} is required", i, field));
            }
        }
    }

    match valid_until {
        Some(valid_until) if errors.is_empty() => Ok(valid_until),
        _ => Err(Error::Validation { errors }),
    }
}

/// Completion is judged on the payload alone. Freezing a partial fill may
/// lean on a dispenser saved by an earlier write.
fn validate_fulfillment(
    status: OrderStatus,
    dispensing_notes: Option<&str>,
    dispenser: Option<&DispenserIdentity>,
    saved_dispenser: Option<&DispenserIdentity>,
    submit: bool,
) -> Result<(), Error> {
    let mut missing = Vec::new();

    let dispenser = match status {
        OrderStatus::Completed => Some(dispenser),
        OrderStatus::PartiallyFilled if submit => Some(dispenser.or(saved_dispenser)),
        _ => None,
    };
    if let Some(dispenser) = dispenser {
        if dispenser.map_or(true, |d| blank(&d.name)) {
            missing.push("dispenserIdentity.name".to_string());
        }
        if dispenser.map_or(true, |d| blank(&d.contact)) {
            missing.push("dispenserIdentity.contact".to_string());
        }
    }

    if status == OrderStatus::PartiallyFilled && dispensing_notes.map_or(true, blank) {
        missing.push("dispensingNotes".to_string());
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::IncompleteFulfillment { missing })
    }
}
