use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{page, parse_opt};
use crate::auth::Claims;
use crate::domain::validation::validate_limit;
use crate::domain::{
    CreateStudentInput, DomainError, MatricNumber, Student, StudentFilter, StudentStatus,
    UpdateStudentInput,
};
use crate::infrastructure::AppState;

const MAX_SEARCH_RESULTS: u64 = 100;

#[derive(Debug, Deserialize)]
pub struct StudentListQuery {
    pub status: Option<String>,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

pub async fn list_students(
    State(state): State<AppState>,
    Query(params): Query<StudentListQuery>,
) -> Result<Json<Value>, DomainError> {
    let (offset, limit) = page(params.skip, params.limit)?;
    let result = state
        .student_repo
        .find_all(StudentFilter {
            status: parse_opt(params.status.as_deref())?,
            offset,
            limit,
        })
        .await?;

    Ok(Json(json!({
        "students": result.students,
        "total": result.total
    })))
}

#[derive(Debug, Deserialize)]
pub struct StudentSearchQuery {
    pub q: String,
    pub limit: Option<u64>,
}

pub async fn search_students(
    State(state): State<AppState>,
    Query(params): Query<StudentSearchQuery>,
) -> Result<Json<Vec<Student>>, DomainError> {
    let limit = validate_limit(params.limit.unwrap_or(20), MAX_SEARCH_RESULTS)?;
    Ok(Json(state.student_repo.search(&params.q, limit).await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateStudentRequest {
    pub matric_number: String,
    pub full_name: String,
    pub email: String,
    pub status: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/students",
    responses(
        (status = 201, description = "Student registered", body = Student),
        (status = 400, description = "Invalid matric number, email or status"),
        (status = 409, description = "Matric number or email already registered")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_student(
    State(state): State<AppState>,
    _claims: Claims,
    Json(payload): Json<CreateStudentRequest>,
) -> Result<impl IntoResponse, DomainError> {
    let input = CreateStudentInput {
        matric_number: MatricNumber::parse(&payload.matric_number)?,
        full_name: payload.full_name,
        email: payload.email,
        status: parse_opt(payload.status.as_deref())?.unwrap_or(StudentStatus::Active),
    };
    let student = state.student_repo.create(input).await?;
    Ok((StatusCode::CREATED, Json(student)))
}

#[utoipa::path(
    get,
    path = "/api/students/{matric}",
    params(("matric" = String, Path, description = "Matric number")),
    responses(
        (status = 200, description = "Student with open borrowing count", body = Student),
        (status = 404, description = "Student not found")
    )
)]
pub async fn get_student(
    State(state): State<AppState>,
    Path(matric): Path<String>,
) -> Result<Json<Student>, DomainError> {
    state
        .student_repo
        .find_by_matric(&matric)
        .await?
        .map(Json)
        .ok_or_else(|| DomainError::not_found("Student", &matric))
}

#[derive(Debug, Deserialize)]
pub struct UpdateStudentRequest {
    /// Present only to reject attempts to change it
    pub matric_number: Option<String>,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub status: Option<String>,
}

pub async fn update_student(
    State(state): State<AppState>,
    _claims: Claims,
    Path(matric): Path<String>,
    Json(payload): Json<UpdateStudentRequest>,
) -> Result<Json<Student>, DomainError> {
    if let Some(requested) = payload.matric_number.as_deref()
        && requested.trim() != matric.trim()
    {
        return Err(DomainError::Validation(
            "matric_number cannot be changed".to_string(),
        ));
    }

    let input = UpdateStudentInput {
        full_name: payload.full_name,
        email: payload.email,
        status: parse_opt(payload.status.as_deref())?,
    };
    Ok(Json(state.student_repo.update(&matric, input).await?))
}

#[derive(Debug, Deserialize)]
pub struct StudentStatusRequest {
    pub status: String,
}

pub async fn update_student_status(
    State(state): State<AppState>,
    claims: Claims,
    Path(matric): Path<String>,
    Json(payload): Json<StudentStatusRequest>,
) -> Result<Json<Student>, DomainError> {
    let status: StudentStatus = payload.status.parse()?;
    let student = state
        .student_repo
        .update(
            &matric,
            UpdateStudentInput {
                status: Some(status),
                ..Default::default()
            },
        )
        .await?;
    tracing::info!("{} set student {} to {}", claims.sub, matric, status);
    Ok(Json(student))
}
