//! Circulation endpoints. Each handler fixes `now` once and passes it down,
//! so derived statuses within one response agree with each other.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use sea_orm::{DatabaseConnection, Order};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{page, parse_opt, parse_opt_date};
use crate::auth::Claims;
use crate::domain::DomainError;
use crate::domain::statistics::{self, DateRange, PopularBook};
use crate::domain::validation::validate_limit;
use crate::services::borrowing_service::{
    self, ActiveBorrowings, BorrowDetail, RecordFilter, parse_order,
};
use crate::services::load_snapshot;

const MAX_HISTORY: u64 = 100;
const MAX_POPULAR: u64 = 50;

#[derive(Debug, Deserialize)]
pub struct BorrowRequest {
    pub copy_id: i32,
    pub matric_number: String,
    /// 14 to 30 days, default 14
    pub loan_days: Option<i64>,
}

#[utoipa::path(
    post,
    path = "/api/borrowings",
    responses(
        (status = 201, description = "Copy lent out", body = BorrowDetail),
        (status = 400, description = "Copy unavailable, borrowing limit reached or invalid loan period"),
        (status = 403, description = "Student suspended"),
        (status = 404, description = "Student or copy not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_borrowing(
    State(db): State<DatabaseConnection>,
    claims: Claims,
    Json(payload): Json<BorrowRequest>,
) -> Result<impl IntoResponse, DomainError> {
    let record = borrowing_service::borrow_copy(
        &db,
        payload.copy_id,
        &payload.matric_number,
        payload.loan_days,
        Utc::now(),
    )
    .await?;
    tracing::debug!("Borrow {} recorded by {}", record.id, claims.sub);
    Ok((StatusCode::CREATED, Json(record)))
}

#[derive(Debug, Deserialize)]
pub struct BorrowingListQuery {
    /// active, returned, overdue or all
    pub status: Option<String>,
    /// borrow_date, due_date or return_date
    pub sort_by: Option<String>,
    /// asc or desc
    pub order: Option<String>,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

pub async fn list_borrowings(
    State(db): State<DatabaseConnection>,
    Query(params): Query<BorrowingListQuery>,
) -> Result<Json<Value>, DomainError> {
    let (offset, limit) = page(params.skip, params.limit)?;
    let filter = RecordFilter {
        state: parse_opt(params.status.as_deref())?.unwrap_or_default(),
        sort_by: parse_opt(params.sort_by.as_deref())?.unwrap_or_default(),
        order: params
            .order
            .as_deref()
            .map(parse_order)
            .transpose()?
            .unwrap_or(Order::Desc),
        offset,
        limit,
    };

    let result = borrowing_service::list_records(&db, filter, Utc::now()).await?;
    Ok(Json(json!({
        "borrowings": result.borrowings,
        "total": result.total
    })))
}

#[utoipa::path(
    get,
    path = "/api/borrowings/{id}",
    params(("id" = i32, Path, description = "Borrowing record ID")),
    responses(
        (status = 200, description = "Borrowing record", body = BorrowDetail),
        (status = 404, description = "Record not found")
    )
)]
pub async fn get_borrowing(
    State(db): State<DatabaseConnection>,
    Path(id): Path<i32>,
) -> Result<Json<BorrowDetail>, DomainError> {
    Ok(Json(borrowing_service::get_record(&db, id, Utc::now()).await?))
}

#[utoipa::path(
    post,
    path = "/api/borrowings/{id}/return",
    params(("id" = i32, Path, description = "Borrowing record ID")),
    responses(
        (status = 200, description = "Copy returned", body = BorrowDetail),
        (status = 400, description = "Already returned"),
        (status = 404, description = "Record not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn return_borrowing(
    State(db): State<DatabaseConnection>,
    _claims: Claims,
    Path(id): Path<i32>,
) -> Result<Json<BorrowDetail>, DomainError> {
    Ok(Json(borrowing_service::return_record(&db, id, Utc::now()).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct ExtendRequest {
    /// 1 to 30 days, default 14
    pub days: Option<i64>,
}

/// An empty body (or `null`) asks for the default extension; anything else
/// must be a well-formed `ExtendRequest`.
fn extend_days(body: &[u8]) -> Result<Option<i64>, DomainError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    let request: Option<ExtendRequest> = serde_json::from_slice(body)
        .map_err(|e| DomainError::Validation(format!("Invalid extension request: {}", e)))?;
    Ok(request.and_then(|r| r.days))
}

#[utoipa::path(
    post,
    path = "/api/borrowings/{id}/extend",
    params(("id" = i32, Path, description = "Borrowing record ID")),
    responses(
        (status = 200, description = "Due date extended", body = BorrowDetail),
        (status = 400, description = "Already returned, already extended or invalid days"),
        (status = 404, description = "Record not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn extend_borrowing(
    State(db): State<DatabaseConnection>,
    _claims: Claims,
    Path(id): Path<i32>,
    body: Bytes,
) -> Result<Json<BorrowDetail>, DomainError> {
    let days = extend_days(&body)?;
    Ok(Json(
        borrowing_service::extend_record(&db, id, days, Utc::now()).await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct ActiveQuery {
    #[serde(default)]
    pub overdue_only: bool,
    pub matric_number: Option<String>,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

pub async fn active_borrowings(
    State(db): State<DatabaseConnection>,
    Query(params): Query<ActiveQuery>,
) -> Result<Json<ActiveBorrowings>, DomainError> {
    let (offset, limit) = page(params.skip, params.limit)?;
    Ok(Json(
        borrowing_service::active_records(
            &db,
            params.overdue_only,
            params.matric_number.as_deref(),
            offset,
            limit,
            Utc::now(),
        )
        .await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct OverdueQuery {
    /// Minimum whole days past due
    #[serde(default)]
    pub days_overdue: i64,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

pub async fn overdue_borrowings(
    State(db): State<DatabaseConnection>,
    Query(params): Query<OverdueQuery>,
) -> Result<Json<Value>, DomainError> {
    let (offset, limit) = page(params.skip, params.limit)?;
    let result =
        borrowing_service::overdue_records(&db, params.days_overdue, offset, limit, Utc::now())
            .await?;
    Ok(Json(json!({
        "borrowings": result.borrowings,
        "total": result.total
    })))
}

#[derive(Debug, Deserialize)]
pub struct DueSoonQuery {
    pub days: Option<i64>,
    pub limit: Option<u64>,
}

pub async fn due_soon(
    State(db): State<DatabaseConnection>,
    Query(params): Query<DueSoonQuery>,
) -> Result<Json<Vec<BorrowDetail>>, DomainError> {
    let (_, limit) = page(None, params.limit)?;
    Ok(Json(
        borrowing_service::due_soon(&db, params.days.unwrap_or(3), limit, Utc::now()).await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct PopularQuery {
    pub days: Option<i64>,
    pub limit: Option<u64>,
}

pub async fn popular_books(
    State(db): State<DatabaseConnection>,
    Query(params): Query<PopularQuery>,
) -> Result<Json<Vec<PopularBook>>, DomainError> {
    let now = Utc::now();
    let range = DateRange::last_days(params.days.unwrap_or(30), now)?;
    let limit = validate_limit(params.limit.unwrap_or(10), MAX_POPULAR)?;
    let snapshot = load_snapshot(&db).await?;
    Ok(Json(statistics::popular_books(
        &snapshot,
        &range,
        limit as usize,
    )))
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub category_id: Option<i32>,
}

pub async fn borrowing_stats(
    State(db): State<DatabaseConnection>,
    Query(params): Query<SummaryQuery>,
) -> Result<impl IntoResponse, DomainError> {
    let now = Utc::now();
    let range = DateRange::resolve(
        parse_opt_date("start_date", params.start_date.as_deref())?,
        parse_opt_date("end_date", params.end_date.as_deref())?,
        30,
        now,
    )?;
    let snapshot = load_snapshot(&db).await?;
    if let Some(category_id) = params.category_id
        && !snapshot.categories.iter().any(|c| c.id == category_id)
    {
        return Err(DomainError::not_found("Category", category_id));
    }
    Ok(Json(statistics::borrowing_summary(
        &snapshot,
        &range,
        params.category_id,
        now,
    )))
}

#[derive(Debug, Deserialize)]
pub struct StudentBorrowingsQuery {
    #[serde(default)]
    pub active_only: bool,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

pub async fn student_borrowings(
    State(db): State<DatabaseConnection>,
    Path(matric): Path<String>,
    Query(params): Query<StudentBorrowingsQuery>,
) -> Result<Json<Value>, DomainError> {
    let (offset, limit) = page(params.skip, params.limit)?;
    let result = borrowing_service::records_for_student(
        &db,
        &matric,
        params.active_only,
        offset,
        limit,
        Utc::now(),
    )
    .await?;
    Ok(Json(json!({
        "borrowings": result.borrowings,
        "total": result.total
    })))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<u64>,
    pub include_active: Option<bool>,
}

pub async fn student_history(
    State(db): State<DatabaseConnection>,
    Path(matric): Path<String>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<Vec<BorrowDetail>>, DomainError> {
    let limit = validate_limit(params.limit.unwrap_or(10), MAX_HISTORY)?;
    Ok(Json(
        borrowing_service::student_history(
            &db,
            &matric,
            limit,
            params.include_active.unwrap_or(true),
            Utc::now(),
        )
        .await?,
    ))
}

pub async fn student_stats(
    State(db): State<DatabaseConnection>,
    Path(matric): Path<String>,
) -> Result<impl IntoResponse, DomainError> {
    let snapshot = load_snapshot(&db).await?;
    statistics::student_summary(&snapshot, matric.trim(), Utc::now())
        .map(Json)
        .ok_or_else(|| DomainError::not_found("Student", &matric))
}

#[derive(Debug, Deserialize)]
pub struct BookBorrowingsQuery {
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

pub async fn book_borrowings(
    State(db): State<DatabaseConnection>,
    Path(book_id): Path<i32>,
    Query(params): Query<BookBorrowingsQuery>,
) -> Result<Json<Value>, DomainError> {
    let (offset, limit) = page(params.skip, params.limit)?;
    let result =
        borrowing_service::records_for_book(&db, book_id, offset, limit, Utc::now()).await?;
    Ok(Json(json!({
        "borrowings": result.borrowings,
        "total": result.total
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_body_defaults_only_when_absent() {
        assert_eq!(extend_days(b"").unwrap(), None);
        assert_eq!(extend_days(b"  \n").unwrap(), None);
        assert_eq!(extend_days(b"null").unwrap(), None);
        assert_eq!(extend_days(b"{}").unwrap(), None);
        assert_eq!(extend_days(br#"{"days": 7}"#).unwrap(), Some(7));

        assert!(matches!(
            extend_days(br#"{"days": "7"}"#),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            extend_days(b"days=7"),
            Err(DomainError::Validation(_))
        ));
    }
}
