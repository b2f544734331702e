use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap, StatusCode},
    Json,
};
use rx_domain::prescriptions::StaffIdentity;

use crate::error::ErrorBody;

pub const STAFF_ID_HEADER: &str = "x-staff-id";
pub const STAFF_NAME_HEADER: &str = "x-staff-name";
pub const STAFF_SPECIALTY_HEADER: &str = "x-staff-specialty";

/// Staff identity asserted by the platform authorizer in front of the API.
/// All three headers are required; the specialty goes onto every order the
/// caller writes.
#[derive(Clone, Debug)]
pub struct Authenticated(pub StaffIdentity);

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ErrorBody>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = header(&parts.headers, STAFF_ID_HEADER);
        let name = header(&parts.headers, STAFF_NAME_HEADER);
        let specialty = header(&parts.headers, STAFF_SPECIALTY_HEADER);

        match (id, name, specialty) {
            (Some(id), Some(name), Some(specialty)) => Ok(Self(StaffIdentity { id, name, specialty })),
            _ => Err((
                StatusCode::UNAUTHORIZED,
                Json(ErrorBody {
                    error: "Unauthenticated",
                    message: "authentication required".to_string(),
                    details: Vec::new(),
                }),
            )),
        }
    }
}
