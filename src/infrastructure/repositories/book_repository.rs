//! SeaORM implementation of BookRepository

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    JoinType, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, RelationTrait, Set,
    TransactionTrait,
};
use std::collections::HashMap;

use crate::domain::validation::{
    require_non_empty, validate_isbn, validate_language_code, validate_publication_year,
};
use crate::domain::{
    AcquisitionType, BookAvailability, BookDetail, BookFilter, BookRepository, CopyCondition,
    CopyStatus, CreateBookInput, DomainError, PaginatedBooks, UpdateBookInput,
};
use crate::models::{author, book, category, copy, language, publisher};
use crate::utils::time::{format_date, format_timestamp};

/// Upper bound for copies created together with a new book
const MAX_INITIAL_COPIES: u32 = 100;

/// SeaORM-based implementation of BookRepository
pub struct SeaOrmBookRepository {
    db: DatabaseConnection,
}

impl SeaOrmBookRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Attach related names and copy counts to a page of books
    async fn details(&self, books: Vec<book::Model>) -> Result<Vec<BookDetail>, DomainError> {
        if books.is_empty() {
            return Ok(Vec::new());
        }

        let book_ids: Vec<i32> = books.iter().map(|b| b.id).collect();
        let author_ids: Vec<i32> = books.iter().map(|b| b.author_id).collect();
        let publisher_ids: Vec<i32> = books.iter().filter_map(|b| b.publisher_id).collect();
        let category_ids: Vec<i32> = books.iter().map(|b| b.category_id).collect();

        let authors: HashMap<i32, String> = author::Entity::find()
            .filter(author::Column::Id.is_in(author_ids))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|a| (a.id, a.name))
            .collect();
        let publishers: HashMap<i32, String> = publisher::Entity::find()
            .filter(publisher::Column::Id.is_in(publisher_ids))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|p| (p.id, p.name))
            .collect();
        let categories: HashMap<i32, category::Model> = category::Entity::find()
            .filter(category::Column::Id.is_in(category_ids))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();
        let languages: HashMap<String, String> = language::Entity::find()
            .all(&self.db)
            .await?
            .into_iter()
            .map(|l| (l.code, l.name))
            .collect();

        let counts: Vec<(i32, String, i64)> = copy::Entity::find()
            .select_only()
            .column(copy::Column::BookId)
            .column(copy::Column::Status)
            .column_as(copy::Column::Id.count(), "copy_count")
            .filter(copy::Column::BookId.is_in(book_ids))
            .group_by(copy::Column::BookId)
            .group_by(copy::Column::Status)
            .into_tuple()
            .all(&self.db)
            .await?;

        let mut totals: HashMap<i32, (u64, u64)> = HashMap::new();
        for (book_id, status, count) in counts {
            let entry = totals.entry(book_id).or_default();
            entry.0 += count as u64;
            if status == CopyStatus::Available.as_str() {
                entry.1 += count as u64;
            }
        }

        Ok(books
            .into_iter()
            .map(|b| {
                let (total_copies, available_copies) =
                    totals.get(&b.id).copied().unwrap_or_default();
                let category = categories.get(&b.category_id);
                BookDetail {
                    id: b.id,
                    author_name: authors.get(&b.author_id).cloned().unwrap_or_default(),
                    publisher_name: b.publisher_id.and_then(|id| publishers.get(&id).cloned()),
                    language_name: b
                        .language_code
                        .as_ref()
                        .and_then(|code| languages.get(code).cloned()),
                    category_code: category.map(|c| c.code.clone()).unwrap_or_default(),
                    category_name: category.map(|c| c.name.clone()).unwrap_or_default(),
                    title: b.title,
                    isbn: b.isbn,
                    call_number: b.call_number,
                    author_id: b.author_id,
                    publisher_id: b.publisher_id,
                    publication_year: b.publication_year,
                    language_code: b.language_code,
                    category_id: b.category_id,
                    total_copies,
                    available_copies,
                    created_at: b.created_at,
                    updated_at: b.updated_at,
                }
            })
            .collect())
    }

    async fn detail(&self, model: book::Model) -> Result<BookDetail, DomainError> {
        let id = model.id;
        self.details(vec![model])
            .await?
            .pop()
            .ok_or_else(|| DomainError::Internal(format!("Book {} vanished while loading", id)))
    }

    async fn ensure_isbn_free(&self, isbn: &str, except: Option<i32>) -> Result<(), DomainError> {
        let mut query = book::Entity::find().filter(book::Column::Isbn.eq(isbn));
        if let Some(id) = except {
            query = query.filter(book::Column::Id.ne(id));
        }
        if query.one(&self.db).await?.is_some() {
            return Err(DomainError::Conflict(
                "A book with this ISBN already exists".to_string(),
            ));
        }
        Ok(())
    }

    async fn ensure_call_number_free(
        &self,
        call_number: &str,
        except: Option<i32>,
    ) -> Result<(), DomainError> {
        let mut query = book::Entity::find().filter(book::Column::CallNumber.eq(call_number));
        if let Some(id) = except {
            query = query.filter(book::Column::Id.ne(id));
        }
        if query.one(&self.db).await?.is_some() {
            return Err(DomainError::Conflict(format!(
                "A book with call number '{}' already exists",
                call_number
            )));
        }
        Ok(())
    }

    async fn ensure_references(
        &self,
        author_id: Option<i32>,
        publisher_id: Option<i32>,
        category_id: Option<i32>,
        language_code: Option<&str>,
    ) -> Result<(), DomainError> {
        if let Some(id) = author_id
            && author::Entity::find_by_id(id).one(&self.db).await?.is_none()
        {
            return Err(DomainError::not_found("Author", id));
        }
        if let Some(id) = publisher_id
            && publisher::Entity::find_by_id(id).one(&self.db).await?.is_none()
        {
            return Err(DomainError::not_found("Publisher", id));
        }
        if let Some(id) = category_id
            && category::Entity::find_by_id(id).one(&self.db).await?.is_none()
        {
            return Err(DomainError::not_found("Category", id));
        }
        if let Some(code) = language_code
            && language::Entity::find_by_id(code.to_string())
                .one(&self.db)
                .await?
                .is_none()
        {
            return Err(DomainError::not_found("Language", code));
        }
        Ok(())
    }
}

fn normalized_isbn(raw: Option<String>) -> Result<Option<String>, DomainError> {
    match raw {
        Some(isbn) if !isbn.trim().is_empty() => validate_isbn(&isbn).map(Some),
        _ => Ok(None),
    }
}

fn normalized_language(raw: Option<String>) -> Result<Option<String>, DomainError> {
    match raw {
        Some(code) if !code.trim().is_empty() => validate_language_code(&code).map(Some),
        _ => Ok(None),
    }
}

async fn insert_initial_copies<C: ConnectionTrait>(
    conn: &C,
    book_id: i32,
    count: u32,
) -> Result<(), DomainError> {
    let now = Utc::now();
    for _ in 0..count {
        copy::ActiveModel {
            book_id: Set(book_id),
            qr_code: Set(uuid::Uuid::new_v4().to_string()),
            acquisition_type: Set(AcquisitionType::Purchased.to_string()),
            acquisition_date: Set(format_date(now.date_naive())),
            price: Set(None),
            condition: Set(CopyCondition::New.to_string()),
            status: Set(CopyStatus::Available.to_string()),
            notes: Set(None),
            created_at: Set(format_timestamp(now)),
            updated_at: Set(format_timestamp(now)),
            ..Default::default()
        }
        .insert(conn)
        .await?;
    }
    Ok(())
}

#[async_trait]
impl BookRepository for SeaOrmBookRepository {
    async fn find_all(&self, filter: BookFilter) -> Result<PaginatedBooks, DomainError> {
        let mut query = book::Entity::find()
            .join(JoinType::InnerJoin, book::Relation::Author.def())
            .join(JoinType::InnerJoin, book::Relation::Category.def())
            .join(JoinType::LeftJoin, book::Relation::Publisher.def())
            .join(JoinType::LeftJoin, book::Relation::Language.def());

        // Apply filters
        let text = |value: &Option<String>| {
            value
                .as_ref()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(title) = text(&filter.title) {
            query = query.filter(book::Column::Title.contains(&title));
        }
        if let Some(name) = text(&filter.author) {
            query = query.filter(author::Column::Name.contains(&name));
        }
        if let Some(name) = text(&filter.publisher) {
            query = query.filter(publisher::Column::Name.contains(&name));
        }
        if let Some(name) = text(&filter.category) {
            query = query.filter(category::Column::Name.contains(&name));
        }
        if let Some(name) = text(&filter.language) {
            query = query.filter(language::Column::Name.contains(&name));
        }
        if let Some(q) = text(&filter.query) {
            let cond = Condition::any()
                .add(book::Column::Title.contains(q.as_str()))
                .add(book::Column::Isbn.contains(q.as_str()))
                .add(author::Column::Name.contains(q.as_str()))
                .add(publisher::Column::Name.contains(q.as_str()))
                .add(category::Column::Name.contains(q.as_str()));
            query = query.filter(cond);
        }

        let total = query.clone().count(&self.db).await?;
        let books = query
            .order_by_asc(book::Column::Title)
            .order_by_asc(book::Column::Id)
            .offset(filter.offset)
            .limit(filter.limit)
            .all(&self.db)
            .await?;

        Ok(PaginatedBooks {
            books: self.details(books).await?,
            total,
        })
    }

    async fn find_by_title(&self, title: &str, exact: bool) -> Result<Vec<BookDetail>, DomainError> {
        let title = title.trim();
        let condition = if exact {
            book::Column::Title.eq(title)
        } else {
            book::Column::Title.contains(title)
        };
        let books = book::Entity::find()
            .filter(condition)
            .order_by_asc(book::Column::Title)
            .all(&self.db)
            .await?;
        self.details(books).await
    }

    async fn find_by_id(&self, id: i32) -> Result<Option<BookDetail>, DomainError> {
        match book::Entity::find_by_id(id).one(&self.db).await? {
            Some(model) => Ok(Some(self.detail(model).await?)),
            None => Ok(None),
        }
    }

    async fn find_by_isbn(&self, isbn: &str) -> Result<Option<BookDetail>, DomainError> {
        let model = book::Entity::find()
            .filter(book::Column::Isbn.eq(isbn.trim()))
            .one(&self.db)
            .await?;
        match model {
            Some(model) => Ok(Some(self.detail(model).await?)),
            None => Ok(None),
        }
    }

    async fn find_by_call_number(&self, call_number: &str) -> Result<Option<BookDetail>, DomainError> {
        let model = book::Entity::find()
            .filter(book::Column::CallNumber.eq(call_number.trim()))
            .one(&self.db)
            .await?;
        match model {
            Some(model) => Ok(Some(self.detail(model).await?)),
            None => Ok(None),
        }
    }

    async fn create(&self, input: CreateBookInput) -> Result<BookDetail, DomainError> {
        let title = require_non_empty("title", &input.title)?;
        let call_number = require_non_empty("call_number", &input.call_number)?;
        let isbn = normalized_isbn(input.isbn)?;
        let language_code = normalized_language(input.language_code)?;
        let now = Utc::now();
        if let Some(year) = input.publication_year {
            validate_publication_year(year, now.year())?;
        }
        if input.initial_copies > MAX_INITIAL_COPIES {
            return Err(DomainError::Validation(format!(
                "initial_copies cannot exceed {}",
                MAX_INITIAL_COPIES
            )));
        }

        if let Some(isbn) = &isbn {
            self.ensure_isbn_free(isbn, None).await?;
        }
        self.ensure_call_number_free(&call_number, None).await?;
        self.ensure_references(
            Some(input.author_id),
            input.publisher_id,
            Some(input.category_id),
            language_code.as_deref(),
        )
        .await?;

        let txn = self.db.begin().await?;
        let model = book::ActiveModel {
            title: Set(title),
            isbn: Set(isbn),
            call_number: Set(call_number),
            author_id: Set(input.author_id),
            publisher_id: Set(input.publisher_id),
            publication_year: Set(input.publication_year),
            language_code: Set(language_code),
            category_id: Set(input.category_id),
            created_at: Set(format_timestamp(now)),
            updated_at: Set(format_timestamp(now)),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
        insert_initial_copies(&txn, model.id, input.initial_copies).await?;
        txn.commit().await?;

        tracing::info!(
            "Created book {} '{}' with {} copies",
            model.id,
            model.title,
            input.initial_copies
        );
        self.detail(model).await
    }

    async fn update(&self, id: i32, input: UpdateBookInput) -> Result<BookDetail, DomainError> {
        let existing = book::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| DomainError::not_found("Book", id))?;

        let mut active: book::ActiveModel = existing.into();

        if let Some(title) = input.title {
            active.title = Set(require_non_empty("title", &title)?);
        }
        if let Some(isbn) = input.isbn {
            let isbn = normalized_isbn(isbn)?;
            if let Some(isbn) = &isbn {
                self.ensure_isbn_free(isbn, Some(id)).await?;
            }
            active.isbn = Set(isbn);
        }
        if let Some(call_number) = input.call_number {
            let call_number = require_non_empty("call_number", &call_number)?;
            self.ensure_call_number_free(&call_number, Some(id)).await?;
            active.call_number = Set(call_number);
        }
        if let Some(year) = input.publication_year {
            if let Some(year) = year {
                validate_publication_year(year, Utc::now().year())?;
            }
            active.publication_year = Set(year);
        }

        let language_code = match input.language_code {
            Some(code) => Some(normalized_language(code)?),
            None => None,
        };
        self.ensure_references(
            input.author_id,
            input.publisher_id.flatten(),
            input.category_id,
            language_code.as_ref().and_then(|c| c.as_deref()),
        )
        .await?;

        if let Some(author_id) = input.author_id {
            active.author_id = Set(author_id);
        }
        if let Some(publisher_id) = input.publisher_id {
            active.publisher_id = Set(publisher_id);
        }
        if let Some(category_id) = input.category_id {
            active.category_id = Set(category_id);
        }
        if let Some(code) = language_code {
            active.language_code = Set(code);
        }
        active.updated_at = Set(format_timestamp(Utc::now()));

        let model = active.update(&self.db).await?;
        self.detail(model).await
    }

    async fn delete(&self, id: i32) -> Result<(), DomainError> {
        let existing = book::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| DomainError::not_found("Book", id))?;

        let copies = copy::Entity::find()
            .filter(copy::Column::BookId.eq(id))
            .count(&self.db)
            .await?;
        if copies > 0 {
            return Err(DomainError::InvalidState(format!(
                "Cannot delete '{}': it still has {} copies",
                existing.title, copies
            )));
        }

        book::Entity::delete_by_id(id).exec(&self.db).await?;
        tracing::info!("Deleted book {} '{}'", id, existing.title);
        Ok(())
    }

    async fn availability(&self, id: i32) -> Result<BookAvailability, DomainError> {
        let book = book::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| DomainError::not_found("Book", id))?;

        let copies = copy::Entity::find()
            .filter(copy::Column::BookId.eq(id))
            .order_by_asc(copy::Column::Id)
            .all(&self.db)
            .await?;
        let available_copy_ids: Vec<i32> = copies
            .iter()
            .filter(|c| c.status == CopyStatus::Available.as_str())
            .map(|c| c.id)
            .collect();

        Ok(BookAvailability {
            book_id: book.id,
            title: book.title,
            total_copies: copies.len() as u64,
            available_copies: available_copy_ids.len() as u64,
            is_available: !available_copy_ids.is_empty(),
            available_copy_ids,
        })
    }
}
