//! Repository trait definitions
//!
//! These traits define the contract for catalog, inventory and registry data
//! access. Implementations live in the infrastructure layer. Circulation
//! (the borrowing ledger) is not behind a trait: its operations are
//! multi-table transactions and live in `services::borrowing_service`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

use super::DomainError;
use super::lifecycle::{AcquisitionType, CopyCondition, CopyStatus, StudentStatus};

// ---------------------------------------------------------------------------
// Catalog metadata
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Author {
    pub id: i32,
    pub name: String,
    pub book_count: u64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Publisher {
    pub id: i32,
    pub name: String,
    pub created_at: String,
}

/// Dewey decimal category
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Category {
    pub id: i32,
    pub code: String,
    pub name: String,
    pub parent_id: Option<i32>,
    pub parent_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Language {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCategoryInput {
    pub code: String,
    pub name: String,
    pub parent_id: Option<i32>,
}

/// Authors, publishers, categories and languages.
#[async_trait]
pub trait MetadataRepository: Send + Sync {
    /// List authors, optionally filtered by a name substring
    async fn list_authors(&self, name: Option<String>) -> Result<Vec<Author>, DomainError>;

    async fn find_author(&self, id: i32) -> Result<Option<Author>, DomainError>;

    async fn create_author(&self, name: String) -> Result<Author, DomainError>;

    async fn rename_author(&self, id: i32, name: String) -> Result<Author, DomainError>;

    async fn list_publishers(&self) -> Result<Vec<Publisher>, DomainError>;

    async fn find_publisher(&self, id: i32) -> Result<Option<Publisher>, DomainError>;

    /// Return the publisher with this exact name, creating it if needed
    async fn get_or_create_publisher(&self, name: String) -> Result<Publisher, DomainError>;

    /// List categories; `main_only` keeps top-level categories
    async fn list_categories(&self, main_only: bool) -> Result<Vec<Category>, DomainError>;

    async fn find_category(&self, id: i32) -> Result<Option<Category>, DomainError>;

    async fn subcategories(&self, parent_id: i32) -> Result<Vec<Category>, DomainError>;

    async fn create_category(&self, input: CreateCategoryInput) -> Result<Category, DomainError>;

    async fn list_languages(&self) -> Result<Vec<Language>, DomainError>;

    async fn create_language(&self, code: String, name: String) -> Result<Language, DomainError>;
}

// ---------------------------------------------------------------------------
// Books
// ---------------------------------------------------------------------------

/// Book with the names of its related entities and copy counts
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BookDetail {
    pub id: i32,
    pub title: String,
    pub isbn: Option<String>,
    pub call_number: String,
    pub author_id: i32,
    pub author_name: String,
    pub publisher_id: Option<i32>,
    pub publisher_name: Option<String>,
    pub publication_year: Option<i32>,
    pub language_code: Option<String>,
    pub language_name: Option<String>,
    pub category_id: i32,
    pub category_code: String,
    pub category_name: String,
    pub total_copies: u64,
    pub available_copies: u64,
    pub created_at: String,
    pub updated_at: String,
}

/// Filter criteria for book queries. Set fields are AND-combined,
/// each a case-insensitive substring match.
#[derive(Debug, Default, Clone)]
pub struct BookFilter {
    pub title: Option<String>,
    pub author: Option<String>,
    pub publisher: Option<String>,
    pub category: Option<String>,
    pub language: Option<String>,
    /// Free text matched against title, ISBN, author, publisher and category
    pub query: Option<String>,
    pub offset: u64,
    pub limit: u64,
}

/// Paginated result with total count
#[derive(Debug, Serialize)]
pub struct PaginatedBooks {
    pub books: Vec<BookDetail>,
    pub total: u64,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateBookInput {
    pub title: String,
    pub isbn: Option<String>,
    pub call_number: String,
    pub author_id: i32,
    pub publisher_id: Option<i32>,
    pub publication_year: Option<i32>,
    pub language_code: Option<String>,
    pub category_id: i32,
    /// Copies created together with the book (purchased, new, available)
    #[serde(default)]
    pub initial_copies: u32,
}

/// Partial book update. `Some(None)` clears a nullable field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateBookInput {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "double_option::deserialize")]
    pub isbn: Option<Option<String>>,
    pub call_number: Option<String>,
    pub author_id: Option<i32>,
    #[serde(default, deserialize_with = "double_option::deserialize")]
    pub publisher_id: Option<Option<i32>>,
    #[serde(default, deserialize_with = "double_option::deserialize")]
    pub publication_year: Option<Option<i32>>,
    #[serde(default, deserialize_with = "double_option::deserialize")]
    pub language_code: Option<Option<String>>,
    pub category_id: Option<i32>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BookAvailability {
    pub book_id: i32,
    pub title: String,
    pub total_copies: u64,
    pub available_copies: u64,
    pub is_available: bool,
    pub available_copy_ids: Vec<i32>,
}

/// Repository trait for Book entity
#[async_trait]
pub trait BookRepository: Send + Sync {
    /// Find all books matching the filter criteria with pagination support
    async fn find_all(&self, filter: BookFilter) -> Result<PaginatedBooks, DomainError>;

    /// Books whose title equals (`exact`) or contains `title`
    async fn find_by_title(&self, title: &str, exact: bool) -> Result<Vec<BookDetail>, DomainError>;

    async fn find_by_id(&self, id: i32) -> Result<Option<BookDetail>, DomainError>;

    async fn find_by_isbn(&self, isbn: &str) -> Result<Option<BookDetail>, DomainError>;

    async fn find_by_call_number(&self, call_number: &str) -> Result<Option<BookDetail>, DomainError>;

    /// Create a book and its initial copies in one transaction
    async fn create(&self, input: CreateBookInput) -> Result<BookDetail, DomainError>;

    async fn update(&self, id: i32, input: UpdateBookInput) -> Result<BookDetail, DomainError>;

    /// Delete a book. Fails while copies still exist.
    async fn delete(&self, id: i32) -> Result<(), DomainError>;

    async fn availability(&self, id: i32) -> Result<BookAvailability, DomainError>;
}

// ---------------------------------------------------------------------------
// Copies
// ---------------------------------------------------------------------------

/// Copy data for API responses
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Copy {
    pub id: i32,
    pub book_id: i32,
    pub book_title: String,
    pub call_number: String,
    pub qr_code: String,
    #[schema(value_type = String)]
    pub acquisition_type: AcquisitionType,
    pub acquisition_date: String,
    pub price: Option<f64>,
    #[schema(value_type = String)]
    pub condition: CopyCondition,
    #[schema(value_type = String)]
    pub status: CopyStatus,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Default, Clone)]
pub struct CopyFilter {
    pub book_id: Option<i32>,
    /// Substring of the book title
    pub title: Option<String>,
    pub status: Option<CopyStatus>,
    pub condition: Option<CopyCondition>,
    pub offset: u64,
    pub limit: u64,
}

/// Paginated copies result
#[derive(Debug, Serialize)]
pub struct PaginatedCopies {
    pub copies: Vec<Copy>,
    pub total: u64,
}

/// Input for creating a copy
#[derive(Debug, Clone)]
pub struct CreateCopyInput {
    pub book_id: i32,
    pub acquisition_type: AcquisitionType,
    pub acquisition_date: NaiveDate,
    pub price: Option<f64>,
    pub condition: CopyCondition,
    pub status: CopyStatus,
    pub notes: Option<String>,
}

/// Input for updating a copy
#[derive(Debug, Clone, Default)]
pub struct UpdateCopyInput {
    pub acquisition_type: Option<AcquisitionType>,
    pub acquisition_date: Option<NaiveDate>,
    pub price: Option<Option<f64>>,
    pub condition: Option<CopyCondition>,
    pub status: Option<CopyStatus>,
    pub notes: Option<Option<String>>,
}

/// Status change with an optional note appended to the copy's history.
#[derive(Debug, Clone)]
pub struct CopyStatusChange {
    pub status: CopyStatus,
    pub condition: Option<CopyCondition>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CopyStatusCounts {
    pub book_id: i32,
    pub total: u64,
    /// Every copy status, including those with zero copies
    pub counts: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FailedCopyUpdate {
    pub copy_id: i32,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BulkStatusResult {
    pub updated: Vec<i32>,
    pub failed: Vec<FailedCopyUpdate>,
}

/// The open borrow on a copy, as shown in title lookups
#[derive(Debug, Clone, Serialize)]
pub struct OpenBorrowInfo {
    pub borrow_id: i32,
    pub matric_number: String,
    pub student_name: String,
    pub borrow_date: String,
    pub due_date: String,
    pub is_overdue: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CopyBorrowState {
    pub copy_id: i32,
    pub qr_code: String,
    pub status: CopyStatus,
    pub condition: CopyCondition,
    pub borrow: Option<OpenBorrowInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TitleBorrowStatus {
    pub book_id: i32,
    pub title: String,
    pub call_number: String,
    pub total_copies: u64,
    pub available_copies: u64,
    pub copies: Vec<CopyBorrowState>,
}

/// Repository trait for Copy entity
#[async_trait]
pub trait CopyRepository: Send + Sync {
    /// Find copies with book titles
    async fn find_all(&self, filter: CopyFilter) -> Result<PaginatedCopies, DomainError>;

    /// Find a copy by ID
    async fn find_by_id(&self, id: i32) -> Result<Option<Copy>, DomainError>;

    /// Every copy of the book shelved under `call_number`
    async fn find_by_call_number(&self, call_number: &str) -> Result<Vec<Copy>, DomainError>;

    async fn find_by_qr_code(&self, qr_code: uuid::Uuid) -> Result<Option<Copy>, DomainError>;

    async fn status_counts(&self, book_id: i32) -> Result<CopyStatusCounts, DomainError>;

    /// Create a new copy
    async fn create(&self, input: CreateCopyInput) -> Result<Copy, DomainError>;

    /// Update a copy
    async fn update(&self, id: i32, input: UpdateCopyInput) -> Result<Copy, DomainError>;

    /// Change the status and append a dated line to the notes
    async fn change_status(
        &self,
        id: i32,
        change: CopyStatusChange,
        today: NaiveDate,
    ) -> Result<Copy, DomainError>;

    /// Apply the same status change to many copies; failures do not abort the batch
    async fn bulk_change_status(
        &self,
        ids: Vec<i32>,
        change: CopyStatusChange,
        today: NaiveDate,
    ) -> Result<BulkStatusResult, DomainError>;

    /// Per-copy borrow state for up to `limit` books whose title contains
    /// `title`, or equals it when `exact` is set
    async fn borrow_status_by_title(
        &self,
        title: &str,
        exact: bool,
        limit: u64,
        now: DateTime<Utc>,
    ) -> Result<Vec<TitleBorrowStatus>, DomainError>;

    /// Delete a copy
    async fn delete(&self, id: i32) -> Result<(), DomainError>;
}

// ---------------------------------------------------------------------------
// Students
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Student {
    pub matric_number: String,
    pub full_name: String,
    pub email: String,
    #[schema(value_type = String)]
    pub status: StudentStatus,
    pub open_borrowings: u64,
    pub can_borrow: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Default, Clone)]
pub struct StudentFilter {
    pub status: Option<StudentStatus>,
    pub offset: u64,
    pub limit: u64,
}

#[derive(Debug, Serialize)]
pub struct PaginatedStudents {
    pub students: Vec<Student>,
    pub total: u64,
}

#[derive(Debug, Clone)]
pub struct CreateStudentInput {
    pub matric_number: super::MatricNumber,
    pub full_name: String,
    pub email: String,
    pub status: StudentStatus,
}

/// The matric number is the primary key and cannot change.
#[derive(Debug, Clone, Default)]
pub struct UpdateStudentInput {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub status: Option<StudentStatus>,
}

#[async_trait]
pub trait StudentRepository: Send + Sync {
    async fn find_all(&self, filter: StudentFilter) -> Result<PaginatedStudents, DomainError>;

    /// Substring search over name, matric number and email
    async fn search(&self, query: &str, limit: u64) -> Result<Vec<Student>, DomainError>;

    async fn find_by_matric(&self, matric_number: &str) -> Result<Option<Student>, DomainError>;

    async fn create(&self, input: CreateStudentInput) -> Result<Student, DomainError>;

    async fn update(&self, matric_number: &str, input: UpdateStudentInput) -> Result<Student, DomainError>;
}

/// Serde helper distinguishing an absent field from an explicit `null`.
pub(crate) mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}
