use axum::{Json, extract::State};
use sea_orm::*;
use serde_json::{Value, json};

use crate::domain::DomainError;
use crate::models::{book, borrowing_record, copy, student};

#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is healthy")
    )
)]
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "reading-room",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[utoipa::path(
    get,
    path = "/api/health/database",
    responses(
        (status = 200, description = "Database reachable"),
        (status = 500, description = "Database unreachable")
    )
)]
pub async fn database_health(
    State(db): State<DatabaseConnection>,
) -> Result<Json<Value>, DomainError> {
    db.execute(Statement::from_string(
        db.get_database_backend(),
        "SELECT 1".to_owned(),
    ))
    .await?;

    Ok(Json(json!({
        "status": "ok",
        "database": "connected",
    })))
}

#[utoipa::path(
    get,
    path = "/api/health/details",
    responses(
        (status = 200, description = "Database engine version and row counts"),
        (status = 500, description = "Database unreachable")
    )
)]
pub async fn database_details(
    State(db): State<DatabaseConnection>,
) -> Result<Json<Value>, DomainError> {
    let version = db
        .query_one(Statement::from_string(
            db.get_database_backend(),
            "SELECT sqlite_version() AS version".to_owned(),
        ))
        .await?
        .map(|row| row.try_get::<String>("", "version"))
        .transpose()?
        .unwrap_or_default();

    let books = book::Entity::find().count(&db).await?;
    let copies = copy::Entity::find().count(&db).await?;
    let students = student::Entity::find().count(&db).await?;
    let borrowings = borrowing_record::Entity::find().count(&db).await?;

    Ok(Json(json!({
        "status": "ok",
        "database_version": version,
        "stats": {
            "books_count": books,
            "copies_count": copies,
            "students_count": students,
            "borrowings_count": borrowings,
        }
    })))
}
