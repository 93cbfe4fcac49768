use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::info;

use kitabee_types::api::{
    ActionResponse, ActivateRequest, Claims, LoginRequest, LoginResponse, PasswordResetConfirm,
    PasswordResetRequest, RegisterRequest, RegisterResponse,
};

use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, blocking};

const MIN_PASSWORD_LEN: usize = 8;
const TOKEN_TTL_DAYS: i64 = 30;

fn valid_login(login: &str) -> bool {
    (3..=32).contains(&login.chars().count())
        && login.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
}

fn valid_email(email: &str) -> bool {
    email.len() <= 254
        && email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'))
}

fn hash_password(password: &str) -> ApiResult<String> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::invalid("password must be at least 8 characters"));
    }
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
        .to_string();
    Ok(hash)
}

/// Creates an inactive account. The activation token would normally be mailed;
/// until a mailer exists it is written to the log.
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    let login = req.login.trim().to_string();
    let email = req.email.trim().to_lowercase();
    if !valid_login(&login) {
        return Err(ApiError::invalid(
            "login must be 3-32 characters of letters, digits, '.', '_' or '-'",
        ));
    }
    if !valid_email(&email) {
        return Err(ApiError::invalid("invalid email address"));
    }

    // Hash password with Argon2id
    let password_hash = hash_password(&req.password)?;

    let (user_id, token) = blocking(&state, move |db| {
        db.create_user(&login, &email, &password_hash)?
            .ok_or(ApiError::Conflict("login or email already taken"))
    })
    .await?;

    info!(user_id, activation_token = %token, "Activation token issued");

    Ok((StatusCode::CREATED, Json(RegisterResponse { user_id })))
}

pub async fn activate(
    State(state): State<AppState>,
    Json(req): Json<ActivateRequest>,
) -> ApiResult<Json<ActionResponse>> {
    let activated = blocking(&state, move |db| Ok(db.activate_user(req.token.trim())?)).await?;
    if !activated {
        return Err(ApiError::invalid("unknown or already used activation token"));
    }
    Ok(Json(ActionResponse {
        ok: true,
        new_badges: vec![],
    }))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let login = req.login.trim().to_string();
    let user = blocking(&state, move |db| Ok(db.get_user_by_login(&login)?))
        .await?
        .ok_or(ApiError::Unauthorized)?;

    // Verify password
    let parsed_hash = PasswordHash::new(&user.password_hash)
        .map_err(|e| anyhow::anyhow!("stored hash for user {} unreadable: {}", user.id, e))?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Unauthorized)?;

    if !user.is_active {
        return Err(ApiError::Forbidden("account not activated"));
    }

    let token = create_token(&state.jwt_secret, user.id, &user.login)?;

    Ok(Json(LoginResponse {
        user_id: user.id,
        login: user.login,
        token,
    }))
}

/// Always answers the same way so the endpoint cannot be used to probe for emails.
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(req): Json<PasswordResetRequest>,
) -> ApiResult<impl IntoResponse> {
    let email = req.email.trim().to_lowercase();
    let token = blocking(&state, move |db| Ok(db.create_reset_token(&email)?)).await?;
    if let Some(token) = token {
        info!(reset_token = %token, "Password reset token issued");
    }
    Ok(StatusCode::ACCEPTED)
}

pub async fn confirm_password_reset(
    State(state): State<AppState>,
    Json(req): Json<PasswordResetConfirm>,
) -> ApiResult<Json<ActionResponse>> {
    let password_hash = hash_password(&req.password)?;
    let reset = blocking(&state, move |db| {
        Ok(db.reset_password(req.token.trim(), &password_hash)?)
    })
    .await?;
    if !reset {
        return Err(ApiError::invalid("invalid or expired reset token"));
    }
    Ok(Json(ActionResponse {
        ok: true,
        new_badges: vec![],
    }))
}

pub fn create_token(secret: &str, user_id: i64, login: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        login: login.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(TOKEN_TTL_DAYS)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_rules() {
        assert!(valid_login("ada_l"));
        assert!(!valid_login("ab"));
        assert!(!valid_login("has space"));
        assert!(!valid_login(&"x".repeat(33)));
    }

    #[test]
    fn email_rules() {
        assert!(valid_email("ada@example.com"));
        assert!(!valid_email("ada.example.com"));
        assert!(!valid_email("@example.com"));
        assert!(!valid_email("ada@localhost"));
    }

    #[test]
    fn short_passwords_are_refused_before_hashing() {
        assert!(matches!(hash_password("short"), Err(ApiError::InvalidInput(_))));
        let hash = hash_password("long enough").unwrap();
        let parsed = PasswordHash::new(&hash).unwrap();
        assert!(Argon2::default().verify_password(b"long enough", &parsed).is_ok());
    }
}
