use actix_web::{http::header, HttpRequest};
use log::info;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::auth_token::AuthToken;

pub const SESSION_COOKIE: &str = "session_id";

/// Reads the token from `Authorization: Token <key>` (or `Bearer <key>`),
/// falling back to the session cookie set at login.
pub fn extract_token(req: &HttpRequest) -> Option<String> {
    let from_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| {
            let (scheme, key) = value.trim().split_once(' ')?;
            let scheme = scheme.to_ascii_lowercase();
            (scheme == "token" || scheme == "bearer").then(|| key.trim().to_string())
        })
        .filter(|key| !key.is_empty());

    from_header.or_else(|| {
        req.cookie(SESSION_COOKIE)
            .map(|cookie| cookie.value().to_string())
            .filter(|key| !key.is_empty())
    })
}

/// Resolves the calling customer's id from their token.
pub async fn authenticate(pool: &PgPool, req: &HttpRequest) -> Result<i32, ApiError> {
    let token = extract_token(req).ok_or(ApiError::Unauthenticated)?;

    let found = sqlx::query_as::<_, AuthToken>(
        "SELECT token, customer_id, created_at FROM auth_tokens WHERE token = $1",
    )
    .bind(&token)
    .fetch_optional(pool)
    .await?;

    match found {
        Some(auth) => Ok(auth.customer_id),
        None => {
            info!("Rejected unknown token");
            Err(ApiError::Unauthenticated)
        }
    }
}

/// Returns the customer's token, creating it on first login.
pub async fn issue_token(pool: &PgPool, customer_id: i32) -> Result<AuthToken, ApiError> {
    sqlx::query(
        "INSERT INTO auth_tokens (token, customer_id) VALUES ($1, $2)
         ON CONFLICT (customer_id) DO NOTHING",
    )
    .bind(Uuid::new_v4().simple().to_string())
    .bind(customer_id)
    .execute(pool)
    .await?;

    let token = sqlx::query_as::<_, AuthToken>(
        "SELECT token, customer_id, created_at FROM auth_tokens WHERE customer_id = $1",
    )
    .bind(customer_id)
    .fetch_one(pool)
    .await?;
    Ok(token)
}

pub fn ensure_owner(caller: i32, owner: i32, message: &'static str) -> Result<(), ApiError> {
    if caller == owner {
        Ok(())
    } else {
        Err(ApiError::Forbidden(message))
    }
}
