//! SeaORM implementation of CopyRepository

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, JoinType, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, RelationTrait, Set,
};
use std::collections::{BTreeMap, HashMap};

use crate::domain::lifecycle::check_manual_status_change;
use crate::domain::validation::validate_price;
use crate::domain::{
    BulkStatusResult, Copy, CopyBorrowState, CopyFilter, CopyRepository, CopyStatus,
    CopyStatusChange, CopyStatusCounts, CreateCopyInput, DomainError, FailedCopyUpdate,
    OpenBorrowInfo, PaginatedCopies, TitleBorrowStatus, UpdateCopyInput,
};
use crate::models::{book, borrowing_record, copy, student};
use crate::utils::time::{format_date, format_timestamp};

/// SeaORM-based implementation of CopyRepository
pub struct SeaOrmCopyRepository {
    db: DatabaseConnection,
}

impl SeaOrmCopyRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn with_books(&self, copies: Vec<copy::Model>) -> Result<Vec<Copy>, DomainError> {
        let book_ids: Vec<i32> = copies.iter().map(|c| c.book_id).collect();
        let books: HashMap<i32, book::Model> = book::Entity::find()
            .filter(book::Column::Id.is_in(book_ids))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|b| (b.id, b))
            .collect();

        copies
            .into_iter()
            .map(|c| {
                let book = books.get(&c.book_id);
                to_copy(c, book)
            })
            .collect()
    }

    async fn load(&self, id: i32) -> Result<copy::Model, DomainError> {
        copy::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| DomainError::not_found("Copy", id))
    }

    async fn fetch(&self, id: i32) -> Result<Copy, DomainError> {
        let model = self.load(id).await?;
        let mut copies = self.with_books(vec![model]).await?;
        copies
            .pop()
            .ok_or_else(|| DomainError::Internal(format!("Copy {} vanished while loading", id)))
    }
}

fn stored<T: std::str::FromStr<Err = DomainError>>(raw: &str, what: &str) -> Result<T, DomainError> {
    raw.parse()
        .map_err(|_| DomainError::Internal(format!("Corrupt {} '{}' in copies table", what, raw)))
}

fn to_copy(model: copy::Model, book: Option<&book::Model>) -> Result<Copy, DomainError> {
    Ok(Copy {
        id: model.id,
        book_id: model.book_id,
        book_title: book.map(|b| b.title.clone()).unwrap_or_default(),
        call_number: book.map(|b| b.call_number.clone()).unwrap_or_default(),
        acquisition_type: stored(&model.acquisition_type, "acquisition type")?,
        condition: stored(&model.condition, "condition")?,
        status: stored(&model.status, "status")?,
        qr_code: model.qr_code,
        acquisition_date: model.acquisition_date,
        price: model.price,
        notes: model.notes,
        created_at: model.created_at,
        updated_at: model.updated_at,
    })
}

/// Existing notes plus a `[YYYY-MM-DD] status: note` line.
fn append_status_note(
    existing: Option<String>,
    status: CopyStatus,
    note: Option<&str>,
    today: NaiveDate,
) -> String {
    let mut line = format!("[{}] {}", format_date(today), status);
    if let Some(note) = note.map(str::trim).filter(|n| !n.is_empty()) {
        line.push_str(": ");
        line.push_str(note);
    }
    match existing.filter(|n| !n.is_empty()) {
        Some(previous) => format!("{}\n{}", previous, line),
        None => line,
    }
}

#[async_trait]
impl CopyRepository for SeaOrmCopyRepository {
    async fn find_all(&self, filter: CopyFilter) -> Result<PaginatedCopies, DomainError> {
        let mut query = copy::Entity::find().join(JoinType::InnerJoin, copy::Relation::Book.def());

        if let Some(book_id) = filter.book_id {
            query = query.filter(copy::Column::BookId.eq(book_id));
        }
        if let Some(title) = filter.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            query = query.filter(book::Column::Title.contains(title));
        }
        if let Some(status) = filter.status {
            query = query.filter(copy::Column::Status.eq(status.as_str()));
        }
        if let Some(condition) = filter.condition {
            query = query.filter(copy::Column::Condition.eq(condition.as_str()));
        }

        let total = query.clone().count(&self.db).await?;
        let copies = query
            .order_by_asc(copy::Column::BookId)
            .order_by_asc(copy::Column::Id)
            .offset(filter.offset)
            .limit(filter.limit)
            .all(&self.db)
            .await?;

        Ok(PaginatedCopies {
            copies: self.with_books(copies).await?,
            total,
        })
    }

    async fn find_by_id(&self, id: i32) -> Result<Option<Copy>, DomainError> {
        match copy::Entity::find_by_id(id).one(&self.db).await? {
            Some(model) => Ok(self.with_books(vec![model]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn find_by_call_number(&self, call_number: &str) -> Result<Vec<Copy>, DomainError> {
        let copies = copy::Entity::find()
            .join(JoinType::InnerJoin, copy::Relation::Book.def())
            .filter(book::Column::CallNumber.eq(call_number.trim()))
            .order_by_asc(copy::Column::Id)
            .all(&self.db)
            .await?;
        self.with_books(copies).await
    }

    async fn find_by_qr_code(&self, qr_code: uuid::Uuid) -> Result<Option<Copy>, DomainError> {
        let model = copy::Entity::find()
            .filter(copy::Column::QrCode.eq(qr_code.to_string()))
            .one(&self.db)
            .await?;
        match model {
            Some(model) => Ok(self.with_books(vec![model]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn status_counts(&self, book_id: i32) -> Result<CopyStatusCounts, DomainError> {
        if book::Entity::find_by_id(book_id).one(&self.db).await?.is_none() {
            return Err(DomainError::not_found("Book", book_id));
        }

        let rows: Vec<(String, i64)> = copy::Entity::find()
            .select_only()
            .column(copy::Column::Status)
            .column_as(copy::Column::Id.count(), "copy_count")
            .filter(copy::Column::BookId.eq(book_id))
            .group_by(copy::Column::Status)
            .into_tuple()
            .all(&self.db)
            .await?;

        let mut counts: BTreeMap<String, u64> = CopyStatus::ALL
            .iter()
            .map(|s| (s.to_string(), 0))
            .collect();
        let mut total = 0;
        for (status, count) in rows {
            total += count as u64;
            *counts.entry(status).or_default() += count as u64;
        }

        Ok(CopyStatusCounts {
            book_id,
            total,
            counts,
        })
    }

    async fn create(&self, input: CreateCopyInput) -> Result<Copy, DomainError> {
        if input.status == CopyStatus::Borrowed {
            return Err(DomainError::InvalidState(
                "A new copy cannot start out borrowed".to_string(),
            ));
        }
        if book::Entity::find_by_id(input.book_id)
            .one(&self.db)
            .await?
            .is_none()
        {
            return Err(DomainError::not_found("Book", input.book_id));
        }
        let price = input.price.map(validate_price).transpose()?;
        let now = Utc::now();
        if input.acquisition_date > now.date_naive() {
            return Err(DomainError::Validation(
                "acquisition_date cannot be in the future".to_string(),
            ));
        }

        let model = copy::ActiveModel {
            book_id: Set(input.book_id),
            qr_code: Set(uuid::Uuid::new_v4().to_string()),
            acquisition_type: Set(input.acquisition_type.to_string()),
            acquisition_date: Set(format_date(input.acquisition_date)),
            price: Set(price),
            condition: Set(input.condition.to_string()),
            status: Set(input.status.to_string()),
            notes: Set(input.notes),
            created_at: Set(format_timestamp(now)),
            updated_at: Set(format_timestamp(now)),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;

        tracing::info!("Created copy {} of book {}", model.id, model.book_id);
        self.fetch(model.id).await
    }

    async fn update(&self, id: i32, input: UpdateCopyInput) -> Result<Copy, DomainError> {
        let existing = self.load(id).await?;
        let current: CopyStatus = stored(&existing.status, "status")?;

        // Guarded on the status we validated against, so a concurrent
        // borrow or return cannot be overwritten.
        let mut update = copy::Entity::update_many()
            .filter(copy::Column::Id.eq(id))
            .filter(copy::Column::Status.eq(current.as_str()))
            .col_expr(
                copy::Column::UpdatedAt,
                Expr::value(format_timestamp(Utc::now())),
            );

        if let Some(status) = input.status {
            check_manual_status_change(current, status)?;
            update = update.col_expr(copy::Column::Status, Expr::value(status.as_str()));
        }
        if let Some(acquisition_type) = input.acquisition_type {
            update = update.col_expr(
                copy::Column::AcquisitionType,
                Expr::value(acquisition_type.as_str()),
            );
        }
        if let Some(date) = input.acquisition_date {
            if date > Utc::now().date_naive() {
                return Err(DomainError::Validation(
                    "acquisition_date cannot be in the future".to_string(),
                ));
            }
            update = update.col_expr(copy::Column::AcquisitionDate, Expr::value(format_date(date)));
        }
        if let Some(price) = input.price {
            let price = price.map(validate_price).transpose()?;
            update = update.col_expr(copy::Column::Price, Expr::value(price));
        }
        if let Some(condition) = input.condition {
            update = update.col_expr(copy::Column::Condition, Expr::value(condition.as_str()));
        }
        if let Some(notes) = input.notes {
            update = update.col_expr(copy::Column::Notes, Expr::value(notes));
        }

        let result = update.exec(&self.db).await?;
        if result.rows_affected == 0 {
            return Err(DomainError::InvalidState(format!(
                "Copy {} changed while it was being updated; reload and retry",
                id
            )));
        }
        self.fetch(id).await
    }

    async fn change_status(
        &self,
        id: i32,
        change: CopyStatusChange,
        today: NaiveDate,
    ) -> Result<Copy, DomainError> {
        let existing = self.load(id).await?;
        let current: CopyStatus = stored(&existing.status, "status")?;
        check_manual_status_change(current, change.status)?;

        let notes = append_status_note(
            existing.notes.clone(),
            change.status,
            change.notes.as_deref(),
            today,
        );

        let mut update = copy::Entity::update_many()
            .filter(copy::Column::Id.eq(id))
            .filter(copy::Column::Status.eq(current.as_str()))
            .col_expr(copy::Column::Status, Expr::value(change.status.as_str()))
            .col_expr(copy::Column::Notes, Expr::value(notes))
            .col_expr(
                copy::Column::UpdatedAt,
                Expr::value(format_timestamp(Utc::now())),
            );
        if let Some(condition) = change.condition {
            update = update.col_expr(copy::Column::Condition, Expr::value(condition.as_str()));
        }

        let result = update.exec(&self.db).await?;
        if result.rows_affected == 0 {
            return Err(DomainError::InvalidState(format!(
                "Copy {} changed while it was being updated; reload and retry",
                id
            )));
        }

        tracing::info!("Copy {} status {} -> {}", id, current, change.status);
        self.fetch(id).await
    }

    async fn bulk_change_status(
        &self,
        ids: Vec<i32>,
        change: CopyStatusChange,
        today: NaiveDate,
    ) -> Result<BulkStatusResult, DomainError> {
        let mut updated = Vec::new();
        let mut failed = Vec::new();

        for id in ids {
            match self.change_status(id, change.clone(), today).await {
                Ok(_) => updated.push(id),
                Err(DomainError::Database(e)) => return Err(DomainError::Database(e)),
                Err(e) => failed.push(FailedCopyUpdate {
                    copy_id: id,
                    error: e.to_string(),
                }),
            }
        }

        Ok(BulkStatusResult { updated, failed })
    }

    async fn borrow_status_by_title(
        &self,
        title: &str,
        exact: bool,
        limit: u64,
        now: DateTime<Utc>,
    ) -> Result<Vec<TitleBorrowStatus>, DomainError> {
        let title = title.trim();
        let matches = if exact {
            book::Column::Title.eq(title)
        } else {
            book::Column::Title.contains(title)
        };
        let books = book::Entity::find()
            .filter(matches)
            .order_by_asc(book::Column::Title)
            .order_by_asc(book::Column::Id)
            .limit(limit)
            .all(&self.db)
            .await?;
        if books.is_empty() {
            return Ok(Vec::new());
        }

        let book_ids: Vec<i32> = books.iter().map(|b| b.id).collect();
        let copies = copy::Entity::find()
            .filter(copy::Column::BookId.is_in(book_ids))
            .order_by_asc(copy::Column::Id)
            .all(&self.db)
            .await?;

        let copy_ids: Vec<i32> = copies.iter().map(|c| c.id).collect();
        let open_records = borrowing_record::Entity::find()
            .filter(borrowing_record::Column::CopyId.is_in(copy_ids))
            .filter(borrowing_record::Column::ReturnDate.is_null())
            .find_also_related(student::Entity)
            .all(&self.db)
            .await?;
        let mut open_by_copy: HashMap<i32, OpenBorrowInfo> = HashMap::new();
        for (record, student) in open_records {
            let dates = record.dates()?;
            open_by_copy.insert(
                record.copy_id,
                OpenBorrowInfo {
                    borrow_id: record.id,
                    student_name: student.map(|s| s.full_name).unwrap_or_default(),
                    matric_number: record.matric_number,
                    borrow_date: record.borrow_date,
                    due_date: format_timestamp(dates.effective_due()),
                    is_overdue: dates.is_overdue(now),
                },
            );
        }

        let mut result = Vec::with_capacity(books.len());
        for book in books {
            let mut states = Vec::new();
            for copy in copies.iter().filter(|c| c.book_id == book.id) {
                states.push(CopyBorrowState {
                    copy_id: copy.id,
                    qr_code: copy.qr_code.clone(),
                    status: stored(&copy.status, "status")?,
                    condition: stored(&copy.condition, "condition")?,
                    borrow: open_by_copy.remove(&copy.id),
                });
            }
            result.push(TitleBorrowStatus {
                book_id: book.id,
                total_copies: states.len() as u64,
                available_copies: states
                    .iter()
                    .filter(|s| s.status == CopyStatus::Available)
                    .count() as u64,
                title: book.title,
                call_number: book.call_number,
                copies: states,
            });
        }
        Ok(result)
    }

    async fn delete(&self, id: i32) -> Result<(), DomainError> {
        let existing = self.load(id).await?;
        if existing.status == CopyStatus::Borrowed.as_str() {
            return Err(DomainError::InvalidState(
                "Cannot delete a copy that is currently borrowed".to_string(),
            ));
        }

        let history = borrowing_record::Entity::find()
            .filter(borrowing_record::Column::CopyId.eq(id))
            .count(&self.db)
            .await?;
        if history > 0 {
            return Err(DomainError::InvalidState(format!(
                "Copy {} has {} borrowing records; mark it missing or damaged instead of deleting it",
                id, history
            )));
        }

        copy::Entity::delete_by_id(id).exec(&self.db).await?;
        tracing::info!("Deleted copy {}", id);
        Ok(())
    }
}
