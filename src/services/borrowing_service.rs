//! Borrowing Service - the circulation ledger
//!
//! Borrow, return and extend each run in one transaction. Every state change
//! is a compare-and-set `UPDATE ... WHERE <expected state>`; zero affected
//! rows means a concurrent request got there first.

use chrono::{DateTime, Duration, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::*;
use serde::Serialize;
use std::collections::HashMap;
use std::str::FromStr;
use utoipa::ToSchema;

use crate::domain::lifecycle::{
    MAX_OPEN_BORROWS, check_borrow_eligibility, check_copy_borrowable, loan_due_date,
    plan_extension, plan_return,
};
use crate::domain::{BorrowStatus, CopyStatus, DomainError, MatricNumber, StudentStatus};
use crate::models::book::Entity as Book;
use crate::models::borrowing_record::{self, Entity as BorrowingRecord};
use crate::models::copy::{self, Entity as BookCopy};
use crate::models::student::{self, Entity as Student};
use crate::utils::time::format_timestamp;

/// Longest look-ahead accepted by [`due_soon`].
pub const MAX_DUE_SOON_DAYS: i64 = 7;

/// Ledger entry enriched with the copy, book and student it refers to
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BorrowDetail {
    pub id: i32,
    pub copy_id: i32,
    pub matric_number: String,
    pub borrow_date: String,
    pub due_date: String,
    pub extension_date: Option<String>,
    pub return_date: Option<String>,
    #[schema(value_type = String)]
    pub status: BorrowStatus,
    pub is_overdue: bool,
    pub days_remaining: i64,
    pub effective_due_date: String,
    pub book_id: i32,
    pub book_title: String,
    pub call_number: String,
    pub student_name: String,
    pub student_email: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize)]
pub struct PaginatedBorrowings {
    pub borrowings: Vec<BorrowDetail>,
    pub total: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ActiveBorrowings {
    pub total_count: u64,
    pub overdue_count: u64,
    pub borrowings: Vec<BorrowDetail>,
}

/// Which part of the ledger a listing covers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RecordState {
    Active,
    Returned,
    Overdue,
    #[default]
    All,
}

impl FromStr for RecordState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(RecordState::Active),
            "returned" => Ok(RecordState::Returned),
            "overdue" => Ok(RecordState::Overdue),
            "all" => Ok(RecordState::All),
            other => Err(DomainError::Validation(format!(
                "Invalid status filter '{}'. Must be one of: active, returned, overdue, all",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortField {
    #[default]
    BorrowDate,
    DueDate,
    ReturnDate,
}

impl FromStr for SortField {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "borrow_date" => Ok(SortField::BorrowDate),
            "due_date" => Ok(SortField::DueDate),
            "return_date" => Ok(SortField::ReturnDate),
            other => Err(DomainError::Validation(format!(
                "Invalid sort_by '{}'. Must be one of: borrow_date, due_date, return_date",
                other
            ))),
        }
    }
}

impl SortField {
    fn column(&self) -> borrowing_record::Column {
        match self {
            SortField::BorrowDate => borrowing_record::Column::BorrowDate,
            SortField::DueDate => borrowing_record::Column::DueDate,
            SortField::ReturnDate => borrowing_record::Column::ReturnDate,
        }
    }
}

/// Sort direction, `desc` unless asked otherwise
pub fn parse_order(raw: &str) -> Result<Order, DomainError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "asc" => Ok(Order::Asc),
        "desc" => Ok(Order::Desc),
        other => Err(DomainError::Validation(format!(
            "Invalid order '{}'. Must be asc or desc",
            other
        ))),
    }
}

/// Filter parameters for listing ledger entries
#[derive(Debug, Clone)]
pub struct RecordFilter {
    pub state: RecordState,
    pub sort_by: SortField,
    pub order: Order,
    pub offset: u64,
    pub limit: u64,
}

impl Default for RecordFilter {
    fn default() -> Self {
        Self {
            state: RecordState::All,
            sort_by: SortField::BorrowDate,
            order: Order::Desc,
            offset: 0,
            limit: 100,
        }
    }
}

/// Open records whose effective due date is before `cutoff`. The extension
/// date is always later than the due date, so this equals
/// `COALESCE(extension_date, due_date) < cutoff`.
fn due_before(cutoff: DateTime<Utc>) -> Condition {
    let cutoff = format_timestamp(cutoff);
    Condition::all()
        .add(borrowing_record::Column::ReturnDate.is_null())
        .add(
            Condition::any()
                .add(
                    Condition::all()
                        .add(borrowing_record::Column::ExtensionDate.is_null())
                        .add(borrowing_record::Column::DueDate.lt(cutoff.clone())),
                )
                .add(borrowing_record::Column::ExtensionDate.lt(cutoff)),
        )
}

fn state_condition(state: RecordState, now: DateTime<Utc>) -> Condition {
    match state {
        RecordState::Active => Condition::all().add(borrowing_record::Column::ReturnDate.is_null()),
        RecordState::Returned => {
            Condition::all().add(borrowing_record::Column::ReturnDate.is_not_null())
        }
        RecordState::Overdue => due_before(now),
        RecordState::All => Condition::all(),
    }
}

/// Attach copy, book and student details to raw ledger rows, keeping order
async fn details<C: ConnectionTrait>(
    conn: &C,
    records: Vec<borrowing_record::Model>,
    now: DateTime<Utc>,
) -> Result<Vec<BorrowDetail>, DomainError> {
    if records.is_empty() {
        return Ok(Vec::new());
    }

    let copy_ids: Vec<i32> = records.iter().map(|r| r.copy_id).collect();
    let copies: HashMap<i32, copy::Model> = BookCopy::find()
        .filter(copy::Column::Id.is_in(copy_ids))
        .all(conn)
        .await?
        .into_iter()
        .map(|c| (c.id, c))
        .collect();

    let book_ids: Vec<i32> = copies.values().map(|c| c.book_id).collect();
    let books: HashMap<i32, crate::models::book::Model> = Book::find()
        .filter(crate::models::book::Column::Id.is_in(book_ids))
        .all(conn)
        .await?
        .into_iter()
        .map(|b| (b.id, b))
        .collect();

    let matrics: Vec<String> = records.iter().map(|r| r.matric_number.clone()).collect();
    let students: HashMap<String, student::Model> = Student::find()
        .filter(student::Column::MatricNumber.is_in(matrics))
        .all(conn)
        .await?
        .into_iter()
        .map(|s| (s.matric_number.clone(), s))
        .collect();

    records
        .into_iter()
        .map(|record| {
            let dates = record.dates()?;
            let book = copies
                .get(&record.copy_id)
                .and_then(|c| books.get(&c.book_id));
            let student = students.get(&record.matric_number);

            Ok(BorrowDetail {
                status: dates.status(now),
                is_overdue: dates.is_overdue(now),
                days_remaining: dates.days_remaining(now),
                effective_due_date: format_timestamp(dates.effective_due()),
                book_id: book.map(|b| b.id).unwrap_or_default(),
                book_title: book
                    .map(|b| b.title.clone())
                    .unwrap_or_else(|| "Unknown".to_string()),
                call_number: book.map(|b| b.call_number.clone()).unwrap_or_default(),
                student_name: student
                    .map(|s| s.full_name.clone())
                    .unwrap_or_else(|| "Unknown".to_string()),
                student_email: student.map(|s| s.email.clone()).unwrap_or_default(),
                id: record.id,
                copy_id: record.copy_id,
                matric_number: record.matric_number,
                borrow_date: record.borrow_date,
                due_date: record.due_date,
                extension_date: record.extension_date,
                return_date: record.return_date,
                created_at: record.created_at,
                updated_at: record.updated_at,
            })
        })
        .collect()
}

async fn detail_of<C: ConnectionTrait>(
    conn: &C,
    record: borrowing_record::Model,
    now: DateTime<Utc>,
) -> Result<BorrowDetail, DomainError> {
    let id = record.id;
    details(conn, vec![record], now)
        .await?
        .pop()
        .ok_or_else(|| DomainError::Internal(format!("Borrowing record {} lost its details", id)))
}

async fn paginate(
    db: &DatabaseConnection,
    query: Select<BorrowingRecord>,
    offset: u64,
    limit: u64,
    now: DateTime<Utc>,
) -> Result<PaginatedBorrowings, DomainError> {
    let total = query.clone().count(db).await?;
    let records = query.offset(offset).limit(limit).all(db).await?;
    Ok(PaginatedBorrowings {
        borrowings: details(db, records, now).await?,
        total,
    })
}

async fn ensure_student(db: &DatabaseConnection, matric_number: &str) -> Result<String, DomainError> {
    let key = matric_number.trim().to_string();
    if Student::find_by_id(key.clone()).one(db).await?.is_none() {
        return Err(DomainError::not_found("Student", &key));
    }
    Ok(key)
}

/// Lend `copy_id` to a student for `loan_days` (default 14).
pub async fn borrow_copy(
    db: &DatabaseConnection,
    copy_id: i32,
    matric_number: &str,
    loan_days: Option<i64>,
    now: DateTime<Utc>,
) -> Result<BorrowDetail, DomainError> {
    let matric = MatricNumber::parse(matric_number)?;
    let due_date = loan_due_date(now, loan_days)?;
    let stamp = format_timestamp(now);

    let txn = db.begin().await?;

    // 1. Student checks
    let student = Student::find_by_id(matric.as_str().to_string())
        .one(&txn)
        .await?
        .ok_or_else(|| DomainError::not_found("Student", &matric))?;
    let student_status = StudentStatus::from_str(&student.status)?;
    let open_borrows = BorrowingRecord::find()
        .filter(borrowing_record::Column::MatricNumber.eq(matric.as_str()))
        .filter(borrowing_record::Column::ReturnDate.is_null())
        .count(&txn)
        .await?;
    check_borrow_eligibility(&student.full_name, student_status, open_borrows)?;

    // 2. Copy checks
    let copy = BookCopy::find_by_id(copy_id)
        .one(&txn)
        .await?
        .ok_or_else(|| DomainError::not_found("Book copy", copy_id))?;
    check_copy_borrowable(copy_id, CopyStatus::from_str(&copy.status)?)?;

    // 3. Claim the copy
    let claimed = BookCopy::update_many()
        .col_expr(copy::Column::Status, Expr::value(CopyStatus::Borrowed.as_str()))
        .col_expr(copy::Column::UpdatedAt, Expr::value(stamp.clone()))
        .filter(copy::Column::Id.eq(copy_id))
        .filter(copy::Column::Status.eq(CopyStatus::Available.as_str()))
        .exec(&txn)
        .await?;
    if claimed.rows_affected == 0 {
        return Err(DomainError::CopyUnavailable(format!(
            "Book copy {} was borrowed by another request",
            copy_id
        )));
    }

    // 4. Ledger entry
    let record = borrowing_record::ActiveModel {
        copy_id: Set(copy_id),
        matric_number: Set(matric.as_str().to_string()),
        borrow_date: Set(stamp.clone()),
        due_date: Set(format_timestamp(due_date)),
        extension_date: Set(None),
        return_date: Set(None),
        created_at: Set(stamp.clone()),
        updated_at: Set(stamp),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    // The limit is checked again under the write lock this transaction now holds
    let open_after = BorrowingRecord::find()
        .filter(borrowing_record::Column::MatricNumber.eq(matric.as_str()))
        .filter(borrowing_record::Column::ReturnDate.is_null())
        .count(&txn)
        .await?;
    if open_after > MAX_OPEN_BORROWS {
        return Err(DomainError::BorrowLimitExceeded(format!(
            "Student {} has reached maximum borrowing limit ({})",
            student.full_name, MAX_OPEN_BORROWS
        )));
    }

    let detail = detail_of(&txn, record, now).await?;
    txn.commit().await?;

    tracing::info!(
        "Copy {} borrowed by {} (record {}, due {})",
        copy_id,
        matric,
        detail.id,
        detail.due_date
    );
    Ok(detail)
}

/// Close an open record and put the copy back on the shelf.
pub async fn return_record(
    db: &DatabaseConnection,
    id: i32,
    now: DateTime<Utc>,
) -> Result<BorrowDetail, DomainError> {
    let txn = db.begin().await?;

    let record = BorrowingRecord::find_by_id(id)
        .one(&txn)
        .await?
        .ok_or_else(|| DomainError::not_found("Borrowing record", id))?;
    let returned_at = plan_return(&record.dates()?, now)?;
    let stamp = format_timestamp(now);

    let closed = BorrowingRecord::update_many()
        .col_expr(
            borrowing_record::Column::ReturnDate,
            Expr::value(format_timestamp(returned_at)),
        )
        .col_expr(borrowing_record::Column::UpdatedAt, Expr::value(stamp.clone()))
        .filter(borrowing_record::Column::Id.eq(id))
        .filter(borrowing_record::Column::ReturnDate.is_null())
        .exec(&txn)
        .await?;
    if closed.rows_affected == 0 {
        return Err(DomainError::AlreadyReturned(
            "Book has already been returned".to_string(),
        ));
    }

    let released = BookCopy::update_many()
        .col_expr(copy::Column::Status, Expr::value(CopyStatus::Available.as_str()))
        .col_expr(copy::Column::UpdatedAt, Expr::value(stamp))
        .filter(copy::Column::Id.eq(record.copy_id))
        .filter(copy::Column::Status.eq(CopyStatus::Borrowed.as_str()))
        .exec(&txn)
        .await?;
    if released.rows_affected == 0 {
        tracing::warn!(
            "Copy {} was not marked borrowed while record {} was open",
            record.copy_id,
            id
        );
    }

    let record = BorrowingRecord::find_by_id(id)
        .one(&txn)
        .await?
        .ok_or_else(|| DomainError::not_found("Borrowing record", id))?;
    let detail = detail_of(&txn, record, now).await?;
    txn.commit().await?;

    tracing::info!("Record {} returned (copy {})", id, detail.copy_id);
    Ok(detail)
}

/// One-time extension of an open record by `days` (default 14).
pub async fn extend_record(
    db: &DatabaseConnection,
    id: i32,
    days: Option<i64>,
    now: DateTime<Utc>,
) -> Result<BorrowDetail, DomainError> {
    let txn = db.begin().await?;

    let record = BorrowingRecord::find_by_id(id)
        .one(&txn)
        .await?
        .ok_or_else(|| DomainError::not_found("Borrowing record", id))?;
    let new_due = plan_extension(&record.dates()?, days)?;

    let extended = BorrowingRecord::update_many()
        .col_expr(
            borrowing_record::Column::ExtensionDate,
            Expr::value(format_timestamp(new_due)),
        )
        .col_expr(
            borrowing_record::Column::UpdatedAt,
            Expr::value(format_timestamp(now)),
        )
        .filter(borrowing_record::Column::Id.eq(id))
        .filter(borrowing_record::Column::ExtensionDate.is_null())
        .filter(borrowing_record::Column::ReturnDate.is_null())
        .exec(&txn)
        .await?;

    let record = BorrowingRecord::find_by_id(id)
        .one(&txn)
        .await?
        .ok_or_else(|| DomainError::not_found("Borrowing record", id))?;
    if extended.rows_affected == 0 {
        // Report whichever state the concurrent request left behind
        plan_extension(&record.dates()?, days)?;
        return Err(DomainError::InvalidState(format!(
            "Borrowing record {} changed while it was being extended",
            id
        )));
    }

    let detail = detail_of(&txn, record, now).await?;
    txn.commit().await?;

    tracing::info!("Record {} extended until {}", id, detail.effective_due_date);
    Ok(detail)
}

pub async fn get_record(
    db: &DatabaseConnection,
    id: i32,
    now: DateTime<Utc>,
) -> Result<BorrowDetail, DomainError> {
    let record = BorrowingRecord::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| DomainError::not_found("Borrowing record", id))?;
    detail_of(db, record, now).await
}

/// List ledger entries by state with sorting and pagination
pub async fn list_records(
    db: &DatabaseConnection,
    filter: RecordFilter,
    now: DateTime<Utc>,
) -> Result<PaginatedBorrowings, DomainError> {
    let query = BorrowingRecord::find()
        .filter(state_condition(filter.state, now))
        .order_by(filter.sort_by.column(), filter.order.clone())
        .order_by(borrowing_record::Column::Id, filter.order);
    paginate(db, query, filter.offset, filter.limit, now).await
}

pub async fn records_for_student(
    db: &DatabaseConnection,
    matric_number: &str,
    active_only: bool,
    offset: u64,
    limit: u64,
    now: DateTime<Utc>,
) -> Result<PaginatedBorrowings, DomainError> {
    let matric = ensure_student(db, matric_number).await?;
    let mut query = BorrowingRecord::find().filter(borrowing_record::Column::MatricNumber.eq(matric));
    if active_only {
        query = query.filter(borrowing_record::Column::ReturnDate.is_null());
    }
    let query = query
        .order_by_desc(borrowing_record::Column::BorrowDate)
        .order_by_desc(borrowing_record::Column::Id);
    paginate(db, query, offset, limit, now).await
}

/// Most recent records of a student, newest first
pub async fn student_history(
    db: &DatabaseConnection,
    matric_number: &str,
    limit: u64,
    include_active: bool,
    now: DateTime<Utc>,
) -> Result<Vec<BorrowDetail>, DomainError> {
    let matric = ensure_student(db, matric_number).await?;
    let mut query = BorrowingRecord::find().filter(borrowing_record::Column::MatricNumber.eq(matric));
    if !include_active {
        query = query.filter(borrowing_record::Column::ReturnDate.is_not_null());
    }
    let records = query
        .order_by_desc(borrowing_record::Column::BorrowDate)
        .order_by_desc(borrowing_record::Column::Id)
        .limit(limit)
        .all(db)
        .await?;
    details(db, records, now).await
}

/// Open records at least `min_days_overdue` whole days past their effective due date
pub async fn overdue_records(
    db: &DatabaseConnection,
    min_days_overdue: i64,
    offset: u64,
    limit: u64,
    now: DateTime<Utc>,
) -> Result<PaginatedBorrowings, DomainError> {
    if min_days_overdue < 0 {
        return Err(DomainError::Validation(
            "days_overdue cannot be negative".to_string(),
        ));
    }
    let cutoff = if min_days_overdue == 0 {
        now
    } else {
        // days_overdue >= n  <=>  effective due <= now - n days
        now - Duration::days(min_days_overdue) + Duration::seconds(1)
    };
    let query = BorrowingRecord::find()
        .filter(due_before(cutoff))
        .order_by_asc(borrowing_record::Column::DueDate)
        .order_by_asc(borrowing_record::Column::Id);
    paginate(db, query, offset, limit, now).await
}

/// Open, not yet overdue records due within the next `days` (1..=7), soonest first
pub async fn due_soon(
    db: &DatabaseConnection,
    days: i64,
    limit: u64,
    now: DateTime<Utc>,
) -> Result<Vec<BorrowDetail>, DomainError> {
    if !(1..=MAX_DUE_SOON_DAYS).contains(&days) {
        return Err(DomainError::Validation(format!(
            "days must be between 1 and {}",
            MAX_DUE_SOON_DAYS
        )));
    }
    let horizon = now + Duration::days(days);
    let open = BorrowingRecord::find()
        .filter(borrowing_record::Column::ReturnDate.is_null())
        .filter(borrowing_record::Column::DueDate.lte(format_timestamp(horizon)))
        .all(db)
        .await?;

    let mut upcoming = Vec::new();
    for record in open {
        let dates = record.dates()?;
        let due = dates.effective_due();
        if due >= now && due <= horizon {
            upcoming.push((due, record));
        }
    }
    upcoming.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.id.cmp(&b.1.id)));
    upcoming.truncate(limit as usize);

    details(db, upcoming.into_iter().map(|(_, r)| r).collect(), now).await
}

pub async fn records_for_book(
    db: &DatabaseConnection,
    book_id: i32,
    offset: u64,
    limit: u64,
    now: DateTime<Utc>,
) -> Result<PaginatedBorrowings, DomainError> {
    if Book::find_by_id(book_id).one(db).await?.is_none() {
        return Err(DomainError::not_found("Book", book_id));
    }
    let query = BorrowingRecord::find()
        .join(JoinType::InnerJoin, borrowing_record::Relation::Copy.def())
        .filter(copy::Column::BookId.eq(book_id))
        .order_by_desc(borrowing_record::Column::BorrowDate)
        .order_by_desc(borrowing_record::Column::Id);
    paginate(db, query, offset, limit, now).await
}

/// Open records, optionally only overdue ones or one student's. Both counts
/// cover the whole filtered set, not just the returned page.
pub async fn active_records(
    db: &DatabaseConnection,
    overdue_only: bool,
    matric_number: Option<&str>,
    offset: u64,
    limit: u64,
    now: DateTime<Utc>,
) -> Result<ActiveBorrowings, DomainError> {
    let mut query = BorrowingRecord::find().filter(borrowing_record::Column::ReturnDate.is_null());
    if let Some(matric) = matric_number {
        query = query.filter(borrowing_record::Column::MatricNumber.eq(matric.trim()));
    }
    let overdue_count = query.clone().filter(due_before(now)).count(db).await?;
    if overdue_only {
        query = query.filter(due_before(now));
    }

    let page = paginate(
        db,
        query
            .order_by_asc(borrowing_record::Column::DueDate)
            .order_by_asc(borrowing_record::Column::Id),
        offset,
        limit,
        now,
    )
    .await?;

    Ok(ActiveBorrowings {
        total_count: page.total,
        overdue_count,
        borrowings: page.borrowings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_filters_parse_case_insensitively() {
        assert_eq!("Overdue".parse::<RecordState>().unwrap(), RecordState::Overdue);
        assert_eq!("due_date".parse::<SortField>().unwrap(), SortField::DueDate);
        assert!(matches!(parse_order("ASC").unwrap(), Order::Asc));
        assert!("lost".parse::<RecordState>().is_err());
        assert!(parse_order("sideways").is_err());
    }
}
