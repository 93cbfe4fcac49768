use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};

use kitabee_types::api::Claims;

use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, blocking};

/// Extract and validate JWT from Authorization header.
///
/// Tokens outlive account deletion, so the subject must still exist.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> ApiResult<Response> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(ApiError::Unauthorized)?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError::Unauthorized)?;

    let user_id = token_data.claims.sub;
    let known = blocking(&state, move |db| Ok(db.get_user_by_id(user_id)?)).await?;
    if !known.is_some_and(|u| u.is_active) {
        return Err(ApiError::Unauthorized);
    }

    req.extensions_mut().insert(token_data.claims);
    Ok(next.run(req).await)
}
