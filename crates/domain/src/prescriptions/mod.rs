/// Prescription order aggregate
pub mod aggregate;

/// Commands
pub mod commands;

/// Events
pub mod events;

/// Input DTOs and write patches
pub mod inputs;

/// Role allow-lists
pub mod capabilities;

/// Public bearer token
pub mod token;

/// Role-scoped projections and the patient history query
pub mod view;

/// Order storage
pub mod registry;

/// DynamoDB registry
pub mod dynamo;

/// QR asset generation
pub mod assets;

/// Authoring and resolver
pub mod service;

pub use aggregate::{
    DispenserIdentity, MedicationLine, OrderKind, OrderStatus, PatientSnapshot, Prescriber,
    Prescription, Services, AGGREGATE_TYPE,
};
pub use commands::Command;
pub use events::Event;
pub use registry::{MemRegistry, Registry};
pub use service::{OrderService, StaffIdentity};
pub use token::PublicToken;
pub use view::{FulfillmentView, FullView, PatientHistory, PublicView};
