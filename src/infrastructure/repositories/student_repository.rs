//! SeaORM implementation of StudentRepository

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use std::collections::HashMap;

use crate::domain::lifecycle::MAX_OPEN_BORROWS;
use crate::domain::validation::{require_non_empty, validate_email};
use crate::domain::{
    CreateStudentInput, DomainError, PaginatedStudents, Student, StudentFilter, StudentRepository,
    StudentStatus, UpdateStudentInput,
};
use crate::models::{borrowing_record, student};
use crate::utils::time::format_timestamp;

const MIN_SEARCH_LENGTH: usize = 2;

/// SeaORM-based implementation of StudentRepository
pub struct SeaOrmStudentRepository {
    db: DatabaseConnection,
}

impl SeaOrmStudentRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Open borrowing counts keyed by matric number
    async fn open_counts(&self, matrics: Vec<String>) -> Result<HashMap<String, u64>, DomainError> {
        if matrics.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<(String, i64)> = borrowing_record::Entity::find()
            .select_only()
            .column(borrowing_record::Column::MatricNumber)
            .column_as(borrowing_record::Column::Id.count(), "open_count")
            .filter(borrowing_record::Column::MatricNumber.is_in(matrics))
            .filter(borrowing_record::Column::ReturnDate.is_null())
            .group_by(borrowing_record::Column::MatricNumber)
            .into_tuple()
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(|(m, c)| (m, c as u64)).collect())
    }

    async fn hydrate(&self, models: Vec<student::Model>) -> Result<Vec<Student>, DomainError> {
        let counts = self
            .open_counts(models.iter().map(|s| s.matric_number.clone()).collect())
            .await?;
        models
            .into_iter()
            .map(|m| {
                let open = counts.get(&m.matric_number).copied().unwrap_or(0);
                to_student(m, open)
            })
            .collect()
    }

    async fn ensure_email_free(&self, email: &str, except: Option<&str>) -> Result<(), DomainError> {
        let existing = student::Entity::find()
            .filter(student::Column::Email.eq(email))
            .one(&self.db)
            .await?;
        match existing {
            Some(other) if Some(other.matric_number.as_str()) != except => {
                Err(DomainError::Conflict(format!(
                    "Email {} is already registered to student {}",
                    email, other.matric_number
                )))
            }
            _ => Ok(()),
        }
    }
}

fn to_student(model: student::Model, open_borrowings: u64) -> Result<Student, DomainError> {
    let status: StudentStatus = model.status.parse().map_err(|_| {
        DomainError::Internal(format!(
            "Corrupt status '{}' for student {}",
            model.status, model.matric_number
        ))
    })?;
    Ok(Student {
        can_borrow: status != StudentStatus::Suspended && open_borrowings < MAX_OPEN_BORROWS,
        matric_number: model.matric_number,
        full_name: model.full_name,
        email: model.email,
        status,
        open_borrowings,
        created_at: model.created_at,
        updated_at: model.updated_at,
    })
}

#[async_trait]
impl StudentRepository for SeaOrmStudentRepository {
    async fn find_all(&self, filter: StudentFilter) -> Result<PaginatedStudents, DomainError> {
        let mut query = student::Entity::find();
        if let Some(status) = filter.status {
            query = query.filter(student::Column::Status.eq(status.as_str()));
        }

        let total = query.clone().count(&self.db).await?;
        let models = query
            .order_by_asc(student::Column::FullName)
            .order_by_asc(student::Column::MatricNumber)
            .offset(filter.offset)
            .limit(filter.limit)
            .all(&self.db)
            .await?;

        Ok(PaginatedStudents {
            students: self.hydrate(models).await?,
            total,
        })
    }

    async fn search(&self, query: &str, limit: u64) -> Result<Vec<Student>, DomainError> {
        let query = query.trim();
        if query.chars().count() < MIN_SEARCH_LENGTH {
            return Err(DomainError::Validation(format!(
                "Search query must be at least {} characters",
                MIN_SEARCH_LENGTH
            )));
        }

        let models = student::Entity::find()
            .filter(
                Condition::any()
                    .add(student::Column::FullName.contains(query))
                    .add(student::Column::MatricNumber.contains(query))
                    .add(student::Column::Email.contains(query)),
            )
            .order_by_asc(student::Column::FullName)
            .limit(limit)
            .all(&self.db)
            .await?;
        self.hydrate(models).await
    }

    async fn find_by_matric(&self, matric_number: &str) -> Result<Option<Student>, DomainError> {
        let Some(model) = student::Entity::find_by_id(matric_number.trim().to_string())
            .one(&self.db)
            .await?
        else {
            return Ok(None);
        };
        Ok(self.hydrate(vec![model]).await?.pop())
    }

    async fn create(&self, input: CreateStudentInput) -> Result<Student, DomainError> {
        let full_name = require_non_empty("full_name", &input.full_name)?;
        let email = validate_email(&input.email)?;
        let matric_number = input.matric_number.into_inner();

        if student::Entity::find_by_id(matric_number.clone())
            .one(&self.db)
            .await?
            .is_some()
        {
            return Err(DomainError::Conflict(format!(
                "Student {} already exists",
                matric_number
            )));
        }
        self.ensure_email_free(&email, None).await?;

        let now = format_timestamp(Utc::now());
        // Primary key is supplied by the caller, so insert via Entity::insert
        student::Entity::insert(student::ActiveModel {
            matric_number: Set(matric_number.clone()),
            full_name: Set(full_name),
            email: Set(email),
            status: Set(input.status.to_string()),
            created_at: Set(now.clone()),
            updated_at: Set(now),
        })
        .exec_without_returning(&self.db)
        .await?;

        tracing::info!("Registered student {}", matric_number);
        self.find_by_matric(&matric_number)
            .await?
            .ok_or_else(|| DomainError::Internal(format!("Student {} vanished after insert", matric_number)))
    }

    async fn update(
        &self,
        matric_number: &str,
        input: UpdateStudentInput,
    ) -> Result<Student, DomainError> {
        let existing = student::Entity::find_by_id(matric_number.trim().to_string())
            .one(&self.db)
            .await?
            .ok_or_else(|| DomainError::not_found("Student", matric_number))?;
        let key = existing.matric_number.clone();

        let mut active: student::ActiveModel = existing.into();
        if let Some(name) = input.full_name {
            active.full_name = Set(require_non_empty("full_name", &name)?);
        }
        if let Some(email) = input.email {
            let email = validate_email(&email)?;
            self.ensure_email_free(&email, Some(&key)).await?;
            active.email = Set(email);
        }
        if let Some(status) = input.status {
            active.status = Set(status.to_string());
            tracing::info!("Student {} status set to {}", key, status);
        }
        active.updated_at = Set(format_timestamp(Utc::now()));
        let model = active.update(&self.db).await?;

        Ok(self
            .hydrate(vec![model])
            .await?
            .pop()
            .ok_or_else(|| DomainError::not_found("Student", &key))?)
    }
}
