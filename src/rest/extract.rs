use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use super::error::ApiError;
use crate::types::{UserId, Viewer};

/// Header the fronting auth layer sets to the signed-in user's id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The requesting viewer. A missing header means anonymous; a header that is
/// not an integer id is rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CurrentViewer(pub Viewer);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentViewer {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(raw) = parts.headers.get(USER_ID_HEADER) else {
            return Ok(CurrentViewer(Viewer::Anonymous));
        };
        let id = raw
            .to_str()
            .ok()
            .and_then(|s| s.trim().parse::<i64>().ok())
            .ok_or_else(|| {
                log::warn!("Invalid {} header: {:?}", USER_ID_HEADER, raw);
                ApiError::BadRequest(format!("invalid {USER_ID_HEADER} header"))
            })?;
        Ok(CurrentViewer(Viewer::User(UserId(id))))
    }
}
