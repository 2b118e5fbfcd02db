//! Copy API handlers using repository pattern

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{page, parse_opt};
use crate::auth::Claims;
use crate::domain::repositories::double_option;
use crate::domain::{
    AcquisitionType, BulkStatusResult, Copy, CopyCondition, CopyFilter, CopyStatus,
    CopyStatusChange, CreateCopyInput, DomainError, UpdateCopyInput,
};
use crate::domain::validation::validate_limit;
use crate::infrastructure::AppState;
use crate::utils::time::parse_date;

/// Most copies a single batch status update may touch
const MAX_BATCH_SIZE: usize = 500;
const DEFAULT_TITLE_MATCHES: u64 = 5;
const MAX_TITLE_MATCHES: u64 = 50;

#[derive(Debug, Deserialize)]
pub struct CopyListQuery {
    pub title: Option<String>,
    pub status: Option<String>,
    pub condition: Option<String>,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

pub async fn list_copies(
    State(state): State<AppState>,
    Query(params): Query<CopyListQuery>,
) -> Result<Json<Value>, DomainError> {
    let (offset, limit) = page(params.skip, params.limit)?;
    let result = state
        .copy_repo
        .find_all(CopyFilter {
            book_id: None,
            title: params.title,
            status: parse_opt(params.status.as_deref())?,
            condition: parse_opt(params.condition.as_deref())?,
            offset,
            limit,
        })
        .await?;

    Ok(Json(json!({
        "copies": result.copies,
        "total": result.total
    })))
}

/// Request DTO for creating a copy
#[derive(Debug, Deserialize)]
pub struct CreateCopyRequest {
    pub book_id: i32,
    pub acquisition_type: Option<String>,
    /// `YYYY-MM-DD`, defaults to today
    pub acquisition_date: Option<String>,
    pub price: Option<f64>,
    pub condition: Option<String>,
    pub status: Option<String>,
    pub notes: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/copies",
    responses(
        (status = 201, description = "Copy created", body = Copy),
        (status = 400, description = "Invalid input"),
        (status = 404, description = "Book not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_copy(
    State(state): State<AppState>,
    _claims: Claims,
    Json(payload): Json<CreateCopyRequest>,
) -> Result<impl IntoResponse, DomainError> {
    let acquisition_date = match payload.acquisition_date.as_deref() {
        Some(raw) => parse_date("acquisition_date", raw)?,
        None => Utc::now().date_naive(),
    };

    let input = CreateCopyInput {
        book_id: payload.book_id,
        acquisition_type: parse_opt(payload.acquisition_type.as_deref())?
            .unwrap_or(AcquisitionType::Purchased),
        acquisition_date,
        price: payload.price,
        condition: parse_opt(payload.condition.as_deref())?.unwrap_or(CopyCondition::Good),
        status: parse_opt(payload.status.as_deref())?.unwrap_or(CopyStatus::Available),
        notes: payload.notes,
    };

    let copy = state.copy_repo.create(input).await?;
    Ok((StatusCode::CREATED, Json(copy)))
}

#[utoipa::path(
    get,
    path = "/api/copies/{id}",
    params(("id" = i32, Path, description = "Copy ID")),
    responses(
        (status = 200, description = "Copy detail", body = Copy),
        (status = 404, description = "Copy not found")
    )
)]
pub async fn get_copy(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<Copy>, DomainError> {
    state
        .copy_repo
        .find_by_id(id)
        .await?
        .map(Json)
        .ok_or_else(|| DomainError::not_found("Copy", id))
}

pub async fn get_copy_by_qr(
    State(state): State<AppState>,
    Path(qr_code): Path<String>,
) -> Result<Json<Copy>, DomainError> {
    let qr = uuid::Uuid::parse_str(qr_code.trim())
        .map_err(|_| DomainError::Validation(format!("Invalid QR code '{}'", qr_code)))?;
    state
        .copy_repo
        .find_by_qr_code(qr)
        .await?
        .map(Json)
        .ok_or_else(|| DomainError::NotFound(format!("Copy with QR code {} not found", qr)))
}

pub async fn get_copies_by_call_number(
    State(state): State<AppState>,
    Path(call_number): Path<String>,
) -> Result<Json<Vec<Copy>>, DomainError> {
    let copies = state.copy_repo.find_by_call_number(&call_number).await?;
    if copies.is_empty() {
        return Err(DomainError::NotFound(format!(
            "No copies found with call number '{}'",
            call_number
        )));
    }
    Ok(Json(copies))
}

/// Request DTO for a partial copy update. `null` clears price or notes.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateCopyRequest {
    pub acquisition_type: Option<String>,
    pub acquisition_date: Option<String>,
    #[serde(default, deserialize_with = "double_option::deserialize")]
    pub price: Option<Option<f64>>,
    pub condition: Option<String>,
    pub status: Option<String>,
    #[serde(default, deserialize_with = "double_option::deserialize")]
    pub notes: Option<Option<String>>,
}

pub async fn update_copy(
    State(state): State<AppState>,
    _claims: Claims,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateCopyRequest>,
) -> Result<Json<Copy>, DomainError> {
    let input = UpdateCopyInput {
        acquisition_type: parse_opt(payload.acquisition_type.as_deref())?,
        acquisition_date: payload
            .acquisition_date
            .as_deref()
            .map(|raw| parse_date("acquisition_date", raw))
            .transpose()?,
        price: payload.price,
        condition: parse_opt(payload.condition.as_deref())?,
        status: parse_opt(payload.status.as_deref())?,
        notes: payload.notes,
    };
    Ok(Json(state.copy_repo.update(id, input).await?))
}

#[derive(Debug, Deserialize)]
pub struct StatusChangeRequest {
    pub status: String,
    pub condition: Option<String>,
    pub notes: Option<String>,
}

impl StatusChangeRequest {
    fn into_change(self) -> Result<CopyStatusChange, DomainError> {
        Ok(CopyStatusChange {
            status: self.status.parse()?,
            condition: parse_opt(self.condition.as_deref())?,
            notes: self.notes,
        })
    }
}

pub async fn update_copy_status(
    State(state): State<AppState>,
    claims: Claims,
    Path(id): Path<i32>,
    Json(payload): Json<StatusChangeRequest>,
) -> Result<Json<Copy>, DomainError> {
    let change = payload.into_change()?;
    let copy = state
        .copy_repo
        .change_status(id, change, Utc::now().date_naive())
        .await?;
    tracing::info!("{} set copy {} to {}", claims.sub, id, copy.status);
    Ok(Json(copy))
}

#[derive(Debug, Deserialize)]
pub struct BatchStatusRequest {
    pub copy_ids: Vec<i32>,
    pub status: String,
    pub condition: Option<String>,
    pub notes: Option<String>,
}

pub async fn batch_update_status(
    State(state): State<AppState>,
    _claims: Claims,
    Json(payload): Json<BatchStatusRequest>,
) -> Result<Json<BulkStatusResult>, DomainError> {
    if payload.copy_ids.is_empty() {
        return Err(DomainError::Validation(
            "copy_ids cannot be empty".to_string(),
        ));
    }
    if payload.copy_ids.len() > MAX_BATCH_SIZE {
        return Err(DomainError::Validation(format!(
            "At most {} copies can be updated at once",
            MAX_BATCH_SIZE
        )));
    }

    let mut ids = payload.copy_ids;
    ids.sort_unstable();
    ids.dedup();
    let change = CopyStatusChange {
        status: payload.status.parse()?,
        condition: parse_opt(payload.condition.as_deref())?,
        notes: payload.notes,
    };

    let result = state
        .copy_repo
        .bulk_change_status(ids, change, Utc::now().date_naive())
        .await?;
    tracing::info!(
        "Batch status update: {} updated, {} failed",
        result.updated.len(),
        result.failed.len()
    );
    Ok(Json(result))
}

#[derive(Debug, Default, Deserialize)]
pub struct TitleStatusQuery {
    #[serde(default)]
    pub exact_match: bool,
    pub limit: Option<u64>,
}

pub async fn borrow_status_by_title(
    State(state): State<AppState>,
    Path(title): Path<String>,
    Query(params): Query<TitleStatusQuery>,
) -> Result<Json<Value>, DomainError> {
    if title.trim().is_empty() {
        return Err(DomainError::Validation("title cannot be empty".to_string()));
    }
    let limit = validate_limit(
        params.limit.unwrap_or(DEFAULT_TITLE_MATCHES),
        MAX_TITLE_MATCHES,
    )?;
    let books = state
        .copy_repo
        .borrow_status_by_title(&title, params.exact_match, limit, Utc::now())
        .await?;
    if books.is_empty() {
        return Err(DomainError::NotFound(format!(
            "No books found matching '{}'",
            title
        )));
    }

    Ok(Json(json!({
        "title": title,
        "books": books,
    })))
}

pub async fn delete_copy(
    State(state): State<AppState>,
    claims: Claims,
    Path(id): Path<i32>,
) -> Result<StatusCode, DomainError> {
    state.copy_repo.delete(id).await?;
    tracing::info!("{} deleted copy {}", claims.sub, id);
    Ok(StatusCode::NO_CONTENT)
}
