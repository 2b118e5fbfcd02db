use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use crate::auth::Claims;
use crate::domain::{Author, Category, CreateCategoryInput, DomainError, Language, Publisher};
use crate::infrastructure::AppState;

#[derive(Debug, Deserialize)]
pub struct AuthorQuery {
    pub name: Option<String>,
}

pub async fn list_authors(
    State(state): State<AppState>,
    Query(params): Query<AuthorQuery>,
) -> Result<Json<Vec<Author>>, DomainError> {
    Ok(Json(state.metadata_repo.list_authors(params.name).await?))
}

pub async fn get_author(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<Author>, DomainError> {
    state
        .metadata_repo
        .find_author(id)
        .await?
        .map(Json)
        .ok_or_else(|| DomainError::not_found("Author", id))
}

#[derive(Debug, Deserialize)]
pub struct NameRequest {
    pub name: String,
}

pub async fn create_author(
    State(state): State<AppState>,
    _claims: Claims,
    Json(payload): Json<NameRequest>,
) -> Result<impl IntoResponse, DomainError> {
    let author = state.metadata_repo.create_author(payload.name).await?;
    Ok((StatusCode::CREATED, Json(author)))
}

pub async fn update_author(
    State(state): State<AppState>,
    _claims: Claims,
    Path(id): Path<i32>,
    Json(payload): Json<NameRequest>,
) -> Result<Json<Author>, DomainError> {
    Ok(Json(state.metadata_repo.rename_author(id, payload.name).await?))
}

pub async fn list_publishers(
    State(state): State<AppState>,
) -> Result<Json<Vec<Publisher>>, DomainError> {
    Ok(Json(state.metadata_repo.list_publishers().await?))
}

pub async fn get_publisher(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<Publisher>, DomainError> {
    state
        .metadata_repo
        .find_publisher(id)
        .await?
        .map(Json)
        .ok_or_else(|| DomainError::not_found("Publisher", id))
}

/// Returns the existing publisher when the name is already known
pub async fn create_publisher(
    State(state): State<AppState>,
    _claims: Claims,
    Json(payload): Json<NameRequest>,
) -> Result<Json<Publisher>, DomainError> {
    Ok(Json(
        state
            .metadata_repo
            .get_or_create_publisher(payload.name)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct CategoryQuery {
    #[serde(default)]
    pub main_only: bool,
}

pub async fn list_categories(
    State(state): State<AppState>,
    Query(params): Query<CategoryQuery>,
) -> Result<Json<Vec<Category>>, DomainError> {
    Ok(Json(
        state.metadata_repo.list_categories(params.main_only).await?,
    ))
}

pub async fn get_category(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<Category>, DomainError> {
    state
        .metadata_repo
        .find_category(id)
        .await?
        .map(Json)
        .ok_or_else(|| DomainError::not_found("Category", id))
}

pub async fn list_subcategories(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<Vec<Category>>, DomainError> {
    Ok(Json(state.metadata_repo.subcategories(id).await?))
}

pub async fn create_category(
    State(state): State<AppState>,
    _claims: Claims,
    Json(payload): Json<CreateCategoryInput>,
) -> Result<impl IntoResponse, DomainError> {
    let category = state.metadata_repo.create_category(payload).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn list_languages(
    State(state): State<AppState>,
) -> Result<Json<Vec<Language>>, DomainError> {
    Ok(Json(state.metadata_repo.list_languages().await?))
}

#[derive(Debug, Deserialize)]
pub struct LanguageRequest {
    pub code: String,
    pub name: String,
}

pub async fn create_language(
    State(state): State<AppState>,
    _claims: Claims,
    Json(payload): Json<LanguageRequest>,
) -> Result<impl IntoResponse, DomainError> {
    let language = state
        .metadata_repo
        .create_language(payload.code, payload.name)
        .await?;
    Ok((StatusCode::CREATED, Json(language)))
}
