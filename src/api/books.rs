//! Book API handlers using repository pattern

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::{Value, json};

use super::page;
use crate::auth::Claims;
use crate::domain::{
    BookAvailability, BookDetail, BookFilter, CopyFilter, CreateBookInput, DomainError,
    UpdateBookInput,
};
use crate::infrastructure::AppState;

#[derive(Debug, Deserialize)]
pub struct BookListQuery {
    pub title: Option<String>,
    pub author: Option<String>,
    pub publisher: Option<String>,
    pub category: Option<String>,
    pub language: Option<String>,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

#[utoipa::path(
    get,
    path = "/api/books",
    params(
        ("title" = Option<String>, Query, description = "Title substring"),
        ("author" = Option<String>, Query, description = "Author name substring"),
        ("category" = Option<String>, Query, description = "Category name substring"),
        ("skip" = Option<u64>, Query, description = "Rows to skip"),
        ("limit" = Option<u64>, Query, description = "Page size (1-1000)")
    ),
    responses(
        (status = 200, description = "Matching books with copy counts"),
        (status = 400, description = "Invalid pagination")
    )
)]
pub async fn list_books(
    State(state): State<AppState>,
    Query(params): Query<BookListQuery>,
) -> Result<Json<Value>, DomainError> {
    let (offset, limit) = page(params.skip, params.limit)?;
    let result = state
        .book_repo
        .find_all(BookFilter {
            title: params.title,
            author: params.author,
            publisher: params.publisher,
            category: params.category,
            language: params.language,
            query: None,
            offset,
            limit,
        })
        .await?;

    Ok(Json(json!({
        "books": result.books,
        "total": result.total
    })))
}

#[derive(Debug, Deserialize)]
pub struct BookSearchQuery {
    /// Free text matched against title, ISBN, author, publisher and category
    pub q: Option<String>,
    /// Title lookup, exact when `exact=true`
    pub title: Option<String>,
    #[serde(default)]
    pub exact: bool,
    pub limit: Option<u64>,
}

pub async fn search_books(
    State(state): State<AppState>,
    Query(params): Query<BookSearchQuery>,
) -> Result<Json<Value>, DomainError> {
    let (_, limit) = page(None, params.limit)?;

    let books = match (params.q, params.title) {
        (Some(q), _) if !q.trim().is_empty() => {
            state
                .book_repo
                .find_all(BookFilter {
                    query: Some(q),
                    limit,
                    ..Default::default()
                })
                .await?
                .books
        }
        (_, Some(title)) if !title.trim().is_empty() => {
            let mut books = state.book_repo.find_by_title(&title, params.exact).await?;
            books.truncate(limit as usize);
            books
        }
        _ => {
            return Err(DomainError::Validation(
                "Provide a search query `q` or a `title`".to_string(),
            ));
        }
    };

    Ok(Json(json!({
        "total": books.len(),
        "books": books,
    })))
}

#[utoipa::path(
    post,
    path = "/api/books",
    request_body = CreateBookInput,
    responses(
        (status = 201, description = "Book created", body = BookDetail),
        (status = 400, description = "Invalid input"),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Referenced author, publisher, category or language missing"),
        (status = 409, description = "Duplicate ISBN or call number")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_book(
    State(state): State<AppState>,
    claims: Claims,
    Json(payload): Json<CreateBookInput>,
) -> Result<impl IntoResponse, DomainError> {
    let book = state.book_repo.create(payload).await?;
    tracing::info!("{} created book {} ({})", claims.sub, book.id, book.title);
    Ok((StatusCode::CREATED, Json(book)))
}

#[utoipa::path(
    get,
    path = "/api/books/{id}",
    params(("id" = i32, Path, description = "Book ID")),
    responses(
        (status = 200, description = "Book detail", body = BookDetail),
        (status = 404, description = "Book not found")
    )
)]
pub async fn get_book(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<BookDetail>, DomainError> {
    state
        .book_repo
        .find_by_id(id)
        .await?
        .map(Json)
        .ok_or_else(|| DomainError::not_found("Book", id))
}

pub async fn get_book_by_isbn(
    State(state): State<AppState>,
    Path(isbn): Path<String>,
) -> Result<Json<BookDetail>, DomainError> {
    state
        .book_repo
        .find_by_isbn(&isbn)
        .await?
        .map(Json)
        .ok_or_else(|| DomainError::NotFound(format!("Book with ISBN {} not found", isbn)))
}

pub async fn get_book_by_call_number(
    State(state): State<AppState>,
    Path(call_number): Path<String>,
) -> Result<Json<BookDetail>, DomainError> {
    state
        .book_repo
        .find_by_call_number(&call_number)
        .await?
        .map(Json)
        .ok_or_else(|| {
            DomainError::NotFound(format!("Book with call number {} not found", call_number))
        })
}

#[utoipa::path(
    put,
    path = "/api/books/{id}",
    params(("id" = i32, Path, description = "Book ID")),
    responses(
        (status = 200, description = "Book updated", body = BookDetail),
        (status = 404, description = "Book not found"),
        (status = 409, description = "Duplicate ISBN or call number")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_book(
    State(state): State<AppState>,
    _claims: Claims,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateBookInput>,
) -> Result<Json<BookDetail>, DomainError> {
    Ok(Json(state.book_repo.update(id, payload).await?))
}

#[utoipa::path(
    delete,
    path = "/api/books/{id}",
    params(("id" = i32, Path, description = "Book ID")),
    responses(
        (status = 204, description = "Book deleted"),
        (status = 400, description = "Book still has copies"),
        (status = 404, description = "Book not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_book(
    State(state): State<AppState>,
    claims: Claims,
    Path(id): Path<i32>,
) -> Result<StatusCode, DomainError> {
    state.book_repo.delete(id).await?;
    tracing::info!("{} deleted book {}", claims.sub, id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_availability(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<BookAvailability>, DomainError> {
    Ok(Json(state.book_repo.availability(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct BookCopiesQuery {
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

pub async fn list_book_copies(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Query(params): Query<BookCopiesQuery>,
) -> Result<Json<Value>, DomainError> {
    let (offset, limit) = page(params.skip, params.limit)?;
    if state.book_repo.find_by_id(id).await?.is_none() {
        return Err(DomainError::not_found("Book", id));
    }

    let result = state
        .copy_repo
        .find_all(CopyFilter {
            book_id: Some(id),
            offset,
            limit,
            ..Default::default()
        })
        .await?;

    Ok(Json(json!({
        "copies": result.copies,
        "total": result.total
    })))
}

pub async fn copy_status_counts(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, DomainError> {
    Ok(Json(state.copy_repo.status_counts(id).await?))
}
