pub mod auth;
pub mod books;
pub mod borrowing;
pub mod copy;
pub mod error;
pub mod health;
pub mod metadata;
pub mod statistics;
pub mod student;

use axum::{
    Router,
    routing::{get, post, put},
};
use chrono::NaiveDate;
use std::str::FromStr;

use crate::domain::DomainError;
use crate::domain::validation::validate_limit;
use crate::infrastructure::AppState;
use crate::utils::time::parse_date;

pub const DEFAULT_PAGE_SIZE: u64 = 100;
pub const MAX_PAGE_SIZE: u64 = 1000;

/// `(offset, limit)` from optional `skip`/`limit` query parameters
pub(crate) fn page(skip: Option<u64>, limit: Option<u64>) -> Result<(u64, u64), DomainError> {
    let limit = validate_limit(limit.unwrap_or(DEFAULT_PAGE_SIZE), MAX_PAGE_SIZE)?;
    Ok((skip.unwrap_or(0), limit))
}

/// Parse an optional enum-like query or body value; blank means absent.
pub(crate) fn parse_opt<T>(raw: Option<&str>) -> Result<Option<T>, DomainError>
where
    T: FromStr<Err = DomainError>,
{
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(T::from_str)
        .transpose()
}

pub(crate) fn parse_opt_date(
    field: &str,
    raw: Option<&str>,
) -> Result<Option<NaiveDate>, DomainError> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| parse_date(field, s))
        .transpose()
}

pub fn api_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .route("/health/database", get(health::database_health))
        .route("/health/details", get(health::database_details))
        // Auth
        .route("/auth/login", post(auth::login))
        .route("/auth/register", post(auth::register))
        .route("/auth/me", get(auth::me))
        // Books
        .route("/books", get(books::list_books).post(books::create_book))
        .route("/books/search", get(books::search_books))
        .route("/books/isbn/:isbn", get(books::get_book_by_isbn))
        .route(
            "/books/call-number/:call_number",
            get(books::get_book_by_call_number),
        )
        .route(
            "/books/:id",
            get(books::get_book)
                .put(books::update_book)
                .delete(books::delete_book),
        )
        .route("/books/:id/availability", get(books::get_availability))
        .route("/books/:id/copies", get(books::list_book_copies))
        .route(
            "/books/:id/copies/status-counts",
            get(books::copy_status_counts),
        )
        // Copies
        .route("/copies", get(copy::list_copies).post(copy::create_copy))
        .route("/copies/batch/status", put(copy::batch_update_status))
        .route("/copies/qr/:qr_code", get(copy::get_copy_by_qr))
        .route(
            "/copies/call-number/:call_number",
            get(copy::get_copies_by_call_number),
        )
        .route(
            "/copies/by-title/:title/status",
            get(copy::borrow_status_by_title),
        )
        .route(
            "/copies/:id",
            get(copy::get_copy)
                .put(copy::update_copy)
                .delete(copy::delete_copy),
        )
        .route("/copies/:id/status", put(copy::update_copy_status))
        // Students
        .route(
            "/students",
            get(student::list_students).post(student::create_student),
        )
        .route("/students/search", get(student::search_students))
        .route(
            "/students/:matric",
            get(student::get_student).put(student::update_student),
        )
        .route(
            "/students/:matric/status",
            put(student::update_student_status),
        )
        // Borrowings
        .route(
            "/borrowings",
            get(borrowing::list_borrowings).post(borrowing::create_borrowing),
        )
        .route("/borrowings/active", get(borrowing::active_borrowings))
        .route("/borrowings/overdue", get(borrowing::overdue_borrowings))
        .route("/borrowings/due-soon", get(borrowing::due_soon))
        .route("/borrowings/popular", get(borrowing::popular_books))
        .route("/borrowings/stats", get(borrowing::borrowing_stats))
        .route(
            "/borrowings/student/:matric",
            get(borrowing::student_borrowings),
        )
        .route(
            "/borrowings/student/:matric/history",
            get(borrowing::student_history),
        )
        .route(
            "/borrowings/student/:matric/stats",
            get(borrowing::student_stats),
        )
        .route("/borrowings/book/:book_id", get(borrowing::book_borrowings))
        .route("/borrowings/:id", get(borrowing::get_borrowing))
        .route("/borrowings/:id/return", post(borrowing::return_borrowing))
        .route("/borrowings/:id/extend", post(borrowing::extend_borrowing))
        // Statistics
        .route("/statistics/kpi", get(statistics::kpi))
        .route("/statistics/daily", get(statistics::daily))
        .route("/statistics/categories", get(statistics::categories))
        .route("/statistics/overdue", get(statistics::overdue))
        .route("/statistics/students", get(statistics::students))
        .route("/statistics/popular-books", get(statistics::popular_books))
        .route(
            "/statistics/borrowing-trends",
            get(statistics::borrowing_trends),
        )
        .route(
            "/statistics/category-trends",
            get(statistics::category_trends),
        )
        .route(
            "/statistics/student-activity",
            get(statistics::student_activity),
        )
        .route(
            "/statistics/library-utilization",
            get(statistics::library_utilization),
        )
        // Metadata
        .route(
            "/metadata/authors",
            get(metadata::list_authors).post(metadata::create_author),
        )
        .route(
            "/metadata/authors/:id",
            get(metadata::get_author).put(metadata::update_author),
        )
        .route(
            "/metadata/publishers",
            get(metadata::list_publishers).post(metadata::create_publisher),
        )
        .route("/metadata/publishers/:id", get(metadata::get_publisher))
        .route(
            "/metadata/categories",
            get(metadata::list_categories).post(metadata::create_category),
        )
        .route("/metadata/categories/:id", get(metadata::get_category))
        .route(
            "/metadata/categories/:id/subcategories",
            get(metadata::list_subcategories),
        )
        .route(
            "/metadata/languages",
            get(metadata::list_languages).post(metadata::create_language),
        )
        .with_state(state)
}
