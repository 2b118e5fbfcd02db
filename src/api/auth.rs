use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use sea_orm::*;
use serde::Deserialize;
use serde_json::json;

use crate::auth::{Claims, ROLE_ADMIN, ROLE_LIBRARIAN, create_jwt, hash_password, verify_password};
use crate::domain::DomainError;
use crate::domain::validation::require_non_empty;
use crate::models::user;
use crate::utils::time::format_timestamp;

const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Deserialize)]
pub struct LoginRequest {
    username: String,
    password: String,
}

fn invalid_credentials() -> DomainError {
    DomainError::Unauthorized("Invalid credentials".to_string())
}

pub async fn login(
    State(db): State<DatabaseConnection>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, DomainError> {
    tracing::info!("Login attempt for user: {}", payload.username);

    let Some(account) = user::Entity::find()
        .filter(user::Column::Username.eq(&payload.username))
        .one(&db)
        .await?
    else {
        tracing::warn!("User not found: {}", payload.username);
        return Err(invalid_credentials());
    };

    match verify_password(&payload.password, &account.password_hash) {
        Ok(true) => {
            let token = create_jwt(&account.username, &account.role).map_err(DomainError::Internal)?;
            tracing::info!("User {} logged in", account.username);
            Ok(Json(json!({ "token": token, "role": account.role })))
        }
        _ => {
            tracing::warn!("Password verification failed for user: {}", account.username);
            Err(invalid_credentials())
        }
    }
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    username: String,
    password: String,
    role: Option<String>,
}

/// Creates the first admin account on an empty database. Once any account
/// exists, only an admin may create further accounts.
pub async fn register(
    State(db): State<DatabaseConnection>,
    claims: Option<Claims>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, DomainError> {
    let bootstrap = user::Entity::find().count(&db).await? == 0;
    let role = if bootstrap {
        ROLE_ADMIN.to_string()
    } else {
        let claims = claims.ok_or_else(|| {
            DomainError::Unauthorized("An admin token is required to create accounts".to_string())
        })?;
        claims.require_admin()?;
        match payload.role.as_deref().unwrap_or(ROLE_LIBRARIAN) {
            r @ (ROLE_ADMIN | ROLE_LIBRARIAN) => r.to_string(),
            other => {
                return Err(DomainError::Validation(format!(
                    "Invalid role '{}'. Must be admin or librarian",
                    other
                )));
            }
        }
    };

    let username = require_non_empty("username", &payload.username)?;
    if payload.password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(DomainError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    if user::Entity::find()
        .filter(user::Column::Username.eq(username.as_str()))
        .one(&db)
        .await?
        .is_some()
    {
        return Err(DomainError::Conflict(format!(
            "User {} already exists",
            username
        )));
    }

    let password_hash = hash_password(&payload.password).map_err(DomainError::Internal)?;
    let now = format_timestamp(chrono::Utc::now());
    let account = user::ActiveModel {
        username: Set(username),
        password_hash: Set(password_hash),
        role: Set(role),
        created_at: Set(now.clone()),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&db)
    .await?;

    tracing::info!("Created {} account {}", account.role, account.username);
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Account created",
            "username": account.username,
            "role": account.role,
        })),
    ))
}

pub async fn me(claims: Claims) -> impl IntoResponse {
    Json(json!({
        "username": claims.sub,
        "role": claims.role,
        "expires_at": claims.exp,
    }))
}
