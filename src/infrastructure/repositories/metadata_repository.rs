//! SeaORM implementation of MetadataRepository

use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use std::collections::HashMap;

use crate::domain::validation::{require_non_empty, validate_dewey_code, validate_language_code};
use crate::domain::{
    Author, Category, CreateCategoryInput, DomainError, Language, MetadataRepository, Publisher,
};
use crate::models::{author, book, category, language, publisher};
use crate::utils::time::format_timestamp;

/// SeaORM-based implementation of MetadataRepository
pub struct SeaOrmMetadataRepository {
    db: DatabaseConnection,
}

impl SeaOrmMetadataRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn book_counts(&self) -> Result<HashMap<i32, u64>, DomainError> {
        let rows: Vec<(i32, i64)> = book::Entity::find()
            .select_only()
            .column(book::Column::AuthorId)
            .column_as(book::Column::Id.count(), "book_count")
            .group_by(book::Column::AuthorId)
            .into_tuple()
            .all(&self.db)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(author_id, count)| (author_id, count as u64))
            .collect())
    }

    async fn category_names(&self) -> Result<HashMap<i32, String>, DomainError> {
        let all = category::Entity::find().all(&self.db).await?;
        Ok(all.into_iter().map(|c| (c.id, c.name)).collect())
    }

    async fn ensure_author_name_free(&self, name: &str) -> Result<(), DomainError> {
        let existing = author::Entity::find()
            .filter(author::Column::Name.eq(name))
            .one(&self.db)
            .await?;
        if existing.is_some() {
            return Err(DomainError::Conflict(format!(
                "Author '{}' already exists",
                name
            )));
        }
        Ok(())
    }
}

fn to_author(model: author::Model, book_count: u64) -> Author {
    Author {
        id: model.id,
        name: model.name,
        book_count,
        created_at: model.created_at,
        updated_at: model.updated_at,
    }
}

fn to_publisher(model: publisher::Model) -> Publisher {
    Publisher {
        id: model.id,
        name: model.name,
        created_at: model.created_at,
    }
}

fn to_category(model: category::Model, names: &HashMap<i32, String>) -> Category {
    Category {
        parent_name: model.parent_id.and_then(|id| names.get(&id).cloned()),
        id: model.id,
        code: model.code,
        name: model.name,
        parent_id: model.parent_id,
    }
}

#[async_trait]
impl MetadataRepository for SeaOrmMetadataRepository {
    async fn list_authors(&self, name: Option<String>) -> Result<Vec<Author>, DomainError> {
        let mut query = author::Entity::find();
        if let Some(name) = name
            && !name.trim().is_empty()
        {
            query = query.filter(author::Column::Name.contains(name.trim()));
        }
        let authors = query
            .order_by_asc(author::Column::Name)
            .all(&self.db)
            .await?;
        let counts = self.book_counts().await?;

        Ok(authors
            .into_iter()
            .map(|a| {
                let count = counts.get(&a.id).copied().unwrap_or(0);
                to_author(a, count)
            })
            .collect())
    }

    async fn find_author(&self, id: i32) -> Result<Option<Author>, DomainError> {
        let Some(model) = author::Entity::find_by_id(id).one(&self.db).await? else {
            return Ok(None);
        };
        let count = self.book_counts().await?.get(&id).copied().unwrap_or(0);
        Ok(Some(to_author(model, count)))
    }

    async fn create_author(&self, name: String) -> Result<Author, DomainError> {
        let name = require_non_empty("name", &name)?;
        self.ensure_author_name_free(&name).await?;

        let now = format_timestamp(chrono::Utc::now());
        let model = author::ActiveModel {
            name: Set(name),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;

        tracing::info!("Created author {} ({})", model.id, model.name);
        Ok(to_author(model, 0))
    }

    async fn rename_author(&self, id: i32, name: String) -> Result<Author, DomainError> {
        let name = require_non_empty("name", &name)?;
        let existing = author::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| DomainError::not_found("Author", id))?;

        if existing.name != name {
            self.ensure_author_name_free(&name).await?;
        }

        let mut active: author::ActiveModel = existing.into();
        active.name = Set(name);
        active.updated_at = Set(format_timestamp(chrono::Utc::now()));
        let model = active.update(&self.db).await?;

        let count = self.book_counts().await?.get(&id).copied().unwrap_or(0);
        Ok(to_author(model, count))
    }

    async fn list_publishers(&self) -> Result<Vec<Publisher>, DomainError> {
        let publishers = publisher::Entity::find()
            .order_by_asc(publisher::Column::Name)
            .all(&self.db)
            .await?;
        Ok(publishers.into_iter().map(to_publisher).collect())
    }

    async fn find_publisher(&self, id: i32) -> Result<Option<Publisher>, DomainError> {
        Ok(publisher::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .map(to_publisher))
    }

    async fn get_or_create_publisher(&self, name: String) -> Result<Publisher, DomainError> {
        let name = require_non_empty("name", &name)?;
        if let Some(existing) = publisher::Entity::find()
            .filter(publisher::Column::Name.eq(name.as_str()))
            .one(&self.db)
            .await?
        {
            return Ok(to_publisher(existing));
        }

        let now = format_timestamp(chrono::Utc::now());
        let model = publisher::ActiveModel {
            name: Set(name),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;

        tracing::info!("Created publisher {} ({})", model.id, model.name);
        Ok(to_publisher(model))
    }

    async fn list_categories(&self, main_only: bool) -> Result<Vec<Category>, DomainError> {
        let names = self.category_names().await?;
        let mut query = category::Entity::find();
        if main_only {
            query = query.filter(category::Column::ParentId.is_null());
        }
        let categories = query
            .order_by_asc(category::Column::Code)
            .all(&self.db)
            .await?;
        Ok(categories
            .into_iter()
            .map(|c| to_category(c, &names))
            .collect())
    }

    async fn find_category(&self, id: i32) -> Result<Option<Category>, DomainError> {
        let Some(model) = category::Entity::find_by_id(id).one(&self.db).await? else {
            return Ok(None);
        };
        let names = self.category_names().await?;
        Ok(Some(to_category(model, &names)))
    }

    async fn subcategories(&self, parent_id: i32) -> Result<Vec<Category>, DomainError> {
        let names = self.category_names().await?;
        if !names.contains_key(&parent_id) {
            return Err(DomainError::not_found("Category", parent_id));
        }
        let children = category::Entity::find()
            .filter(category::Column::ParentId.eq(parent_id))
            .order_by_asc(category::Column::Code)
            .all(&self.db)
            .await?;
        Ok(children
            .into_iter()
            .map(|c| to_category(c, &names))
            .collect())
    }

    async fn create_category(&self, input: CreateCategoryInput) -> Result<Category, DomainError> {
        let code = validate_dewey_code(&input.code)?;
        let name = require_non_empty("name", &input.name)?;

        let names = self.category_names().await?;
        if let Some(parent_id) = input.parent_id
            && !names.contains_key(&parent_id)
        {
            return Err(DomainError::Validation(format!(
                "Parent category {} does not exist",
                parent_id
            )));
        }

        let duplicate = category::Entity::find()
            .filter(category::Column::Code.eq(code.as_str()))
            .one(&self.db)
            .await?;
        if duplicate.is_some() {
            return Err(DomainError::Conflict(format!(
                "Category code {} already exists",
                code
            )));
        }

        let now = format_timestamp(chrono::Utc::now());
        let model = category::ActiveModel {
            code: Set(code),
            name: Set(name),
            parent_id: Set(input.parent_id),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;

        Ok(to_category(model, &names))
    }

    async fn list_languages(&self) -> Result<Vec<Language>, DomainError> {
        let languages = language::Entity::find()
            .order_by_asc(language::Column::Name)
            .all(&self.db)
            .await?;
        Ok(languages
            .into_iter()
            .map(|l| Language {
                code: l.code,
                name: l.name,
            })
            .collect())
    }

    async fn create_language(&self, code: String, name: String) -> Result<Language, DomainError> {
        let code = validate_language_code(&code)?;
        let name = require_non_empty("name", &name)?;

        if language::Entity::find_by_id(code.clone())
            .one(&self.db)
            .await?
            .is_some()
        {
            return Err(DomainError::Conflict(format!(
                "Language {} already exists",
                code
            )));
        }

        // Primary key is not auto-generated, so insert via Entity::insert
        language::Entity::insert(language::ActiveModel {
            code: Set(code.clone()),
            name: Set(name.clone()),
        })
        .exec_without_returning(&self.db)
        .await?;

        Ok(Language { code, name })
    }
}
