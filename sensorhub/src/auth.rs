use crate::rest::{ApiError, AppState};
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Audience the auth platform stamps on signed-in user sessions.
pub const SESSION_AUDIENCE: &str = "authenticated";

/// Session claims issued by the auth platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub aud: String,
    pub exp: usize,
}

/// The signed-in user a dashboard request acts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Owner(pub Uuid);

/// Verify the bearer session token and attach its [`Owner`] to the request.
pub async fn require_user(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;

    let owner = verify_token(token, &state.jwt_secret).ok_or(ApiError::Unauthorized)?;

    req.extensions_mut().insert(owner);
    Ok(next.run(req).await)
}

fn verify_token(token: &str, secret: &str) -> Option<Owner> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[SESSION_AUDIENCE]);

    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| Owner(data.claims.sub))
        .ok()
}
