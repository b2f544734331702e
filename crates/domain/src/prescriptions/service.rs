//! Order authoring and the token-gated resolver.
//!
//! Every write goes load → aggregate decision → version-guarded registry
//! write → query dispatch. Nothing is dispatched for a rejected write.

use std::{collections::HashMap, sync::Arc};

use chrono::Utc;
use cqrs_es::{EventEnvelope, Query};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ulid::Ulid;

use crate::config::OrderConfig;
use crate::errors::Error;

use super::{
    assets::{self, AssetGenerator, AssetRequest},
    capabilities::Role,
    inputs::{CreateOrderInput, OrderPatch},
    view::{FulfillmentView, FullView, PatientHistory, PatientHistoryQuery, PublicView},
    Command, Event, OrderKind, Prescriber, Prescription, PublicToken, Registry, AGGREGATE_TYPE,
};

/// Authenticated platform user, as handed over by the auth subsystem.
#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StaffIdentity {
    pub id: String,
    pub name: String,
    pub specialty: String,
}

impl From<&StaffIdentity> for Prescriber {
    fn from(staff: &StaffIdentity) -> Self {
        Prescriber {
            id: staff.id.clone(),
            name: staff.name.clone(),
            specialty: staff.specialty.clone(),
        }
    }
}

pub struct OrderService {
    config: OrderConfig,
    registry: Arc<dyn Registry>,
    assets: Arc<dyn AssetGenerator>,
    queries: Vec<Box<dyn Query<Prescription>>>,
}

impl OrderService {
    pub fn new(
        config: OrderConfig,
        registry: Arc<dyn Registry>,
        assets: Arc<dyn AssetGenerator>,
    ) -> Self {
        let history = Box::new(PatientHistoryQuery::new(registry.clone()));
        Self {
            config,
            registry,
            assets,
            queries: vec![history],
        }
    }

    // ------------------------------------------------------------------
    // Authoring
    // ------------------------------------------------------------------

    /// Issues a prescription for an outside pharmacy and hands its link to the
    /// asset generator.
    pub async fn create_order(
        &self,
        prescriber: &StaffIdentity,
        input: CreateOrderInput,
    ) -> Result<FullView, Error> {
        if let Some(claimed) = &input.prescriber_id {
            if claimed != &prescriber.id {
                tracing::warn!(staff_id = %prescriber.id, "prescriberId does not match caller");
                return Err(Error::Forbidden);
            }
        }

        let order = self.issue(OrderKind::Prescription, prescriber, input).await?;

        if let Some(token) = &order.public_token {
            let request = AssetRequest::new(
                order.id.clone(),
                token.clone(),
                self.config.shareable_url(token),
            );
            assets::dispatch(self.assets.clone(), request);
        }

        Ok(order.into())
    }

    /// Issues an in-house medication order. No token, no QR asset.
    pub async fn create_medication_order(
        &self,
        staff: &StaffIdentity,
        input: CreateOrderInput,
    ) -> Result<FullView, Error> {
        let order = self.issue(OrderKind::Medication, staff, input).await?;
        Ok(order.into())
    }

    async fn issue(
        &self,
        kind: OrderKind,
        staff: &StaffIdentity,
        input: CreateOrderInput,
    ) -> Result<Prescription, Error> {
        let at = Utc::now();
        let attempts = self.config.token_attempts.max(1);

        for attempt in 1..=attempts {
            let command = Command::Issue {
                id: Ulid::new().to_string(),
                kind,
                public_token: (kind == OrderKind::Prescription).then(PublicToken::generate),
                prescriber: staff.into(),
                patient_id: input.patient_id.clone(),
                patient: input.patient_snapshot.clone(),
                valid_until: input.valid_until,
                lines: input.lines.clone(),
                at,
            };
            let (order, events) = Prescription::default().decide(command).await?;

            match self.registry.insert(&order).await {
                Ok(()) => {
                    tracing::info!(
                        order_id = %order.id,
                        kind = ?order.kind,
                        staff_id = %staff.id,
                        lines = order.lines.len(),
                        "order issued"
                    );
                    self.dispatch(&order.id, 0, events).await;
                    return Ok(order);
                }
                Err(Error::Uniqueness { field }) => {
                    tracing::warn!(attempt, %field, "order key collision, retrying");
                }
                Err(err) => return Err(err),
            }
        }

        Err(Error::Uniqueness {
            field: "publicToken".to_string(),
        })
    }

    // ------------------------------------------------------------------
    // Token-gated resolver
    // ------------------------------------------------------------------

    pub async fn resolve_public(&self, token: &PublicToken) -> Result<PublicView, Error> {
        let order = self.load_by_token(token).await?;
        Ok(PublicView::from(&order))
    }

    pub async fn resolve_fulfillment(&self, token: &PublicToken) -> Result<FulfillmentView, Error> {
        let order = self.load_by_token(token).await?;
        Ok(FulfillmentView::from(&order))
    }

    /// Records a pharmacy outcome against the order behind `token`. `body` is
    /// the request payload as sent; it is only judged once the order is known
    /// to accept writes.
    pub async fn transition(
        &self,
        token: &PublicToken,
        body: Value,
    ) -> Result<FulfillmentView, Error> {
        let order = self.load_by_token(token).await?;
        let updated = self.write(order, body, Role::Fulfillment).await?;
        Ok(FulfillmentView::from(&updated))
    }

    /// Unknown, malformed and medication-order tokens all end here the same way.
    async fn load_by_token(&self, token: &PublicToken) -> Result<Prescription, Error> {
        self.registry
            .get_by_token(token)
            .await?
            .filter(|order| order.kind == OrderKind::Prescription)
            .ok_or_else(not_found)
    }

    // ------------------------------------------------------------------
    // Internal (authenticated) access
    // ------------------------------------------------------------------

    pub async fn resolve_internal(&self, id: &str, staff: &StaffIdentity) -> Result<FullView, Error> {
        let order = self.load_by_id(id).await?;
        tracing::info!(order_id = %order.id, staff_id = %staff.id, "internal read");
        Ok(order.into())
    }

    pub async fn update_internal(
        &self,
        id: &str,
        staff: &StaffIdentity,
        body: Value,
    ) -> Result<FullView, Error> {
        let order = self.load_by_id(id).await?;
        tracing::info!(order_id = %order.id, staff_id = %staff.id, "internal write");
        let updated = self.write(order, body, Role::Clinical).await?;
        Ok(updated.into())
    }

    pub async fn patient_history(&self, patient_id: &str) -> Result<PatientHistory, Error> {
        Ok(PatientHistory {
            patient_id: patient_id.to_string(),
            order_ids: self.registry.patient_history(patient_id).await?,
        })
    }

    async fn load_by_id(&self, id: &str) -> Result<Prescription, Error> {
        self.registry.get_by_id(id).await?.ok_or_else(not_found)
    }

    // ------------------------------------------------------------------
    // Shared write path
    // ------------------------------------------------------------------

    /// Checks run in a fixed order: frozen, payload against the role's
    /// allow-list, transition and completeness, then the caller's version.
    async fn write(&self, order: Prescription, body: Value, role: Role) -> Result<Prescription, Error> {
        if order.submitted_lock {
            return Err(Error::OrderFrozen);
        }
        let patch = OrderPatch::from_json(role, body)?;
        let expected = patch.version.unwrap_or(order.version);

        let at = Utc::now();
        let mut next = order.clone();
        let mut events = Vec::new();

        // validity first: a submit in the same patch would freeze the order
        if let Some(valid_until) = patch.valid_until {
            let (amended, produced) = next.decide(Command::AmendValidity { valid_until, at }).await?;
            next = amended;
            events.extend(produced);
        }

        if let Some(status) = patch.status {
            let (recorded, produced) = next
                .decide(Command::RecordFulfillment {
                    status,
                    dispensing_notes: patch.dispensing_notes,
                    dispenser: patch.dispenser_identity,
                    submit: patch.submit.unwrap_or(false),
                    at,
                })
                .await?;
            next = recorded;
            events.extend(produced);
        }

        if expected != order.version {
            tracing::warn!(order_id = %order.id, expected, actual = order.version, "stale write rejected");
            return Err(Error::Conflict {
                expected,
                actual: order.version,
            });
        }

        // the registry re-checks the version atomically
        next.version = order.version + 1;
        if let Err(err) = self.registry.update(&next, expected).await {
            tracing::warn!(order_id = %order.id, kind = err.kind(), "conditional write rejected");
            return Err(err);
        }

        tracing::info!(
            order_id = %next.id,
            ?role,
            from = order.status.as_str(),
            to = next.status.as_str(),
            submitted = next.submitted_lock,
            version = next.version,
            "order updated"
        );
        self.dispatch(&next.id, order.version as usize, events).await;
        Ok(next)
    }

    async fn dispatch(&self, order_id: &str, base_sequence: usize, events: Vec<Event>) {
        let metadata = HashMap::from([("command_id".to_string(), Ulid::new().to_string())]);
        let envelopes: Vec<EventEnvelope<Prescription>> = events
            .into_iter()
            .enumerate()
            .map(|(i, payload)| EventEnvelope {
                aggregate_id: order_id.to_string(),
                sequence: base_sequence + i + 1,
                payload,
                metadata: metadata.clone(),
            })
            .collect();

        for query in &self.queries {
            query.dispatch(order_id, &envelopes).await;
        }
    }
}

fn not_found() -> Error {
    Error::NotFound {
        entity: AGGREGATE_TYPE.to_string(),
    }
}
