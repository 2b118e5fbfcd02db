use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::domain::{DomainError, LoanDates};
use crate::utils::time::parse_timestamp;

/// One entry of the borrowing ledger. The status is not stored; see
/// [`LoanDates::status`].
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "borrowing_records")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub copy_id: i32,
    pub matric_number: String,
    pub borrow_date: String,
    pub due_date: String,
    /// Extended due date, set at most once
    pub extension_date: Option<String>,
    pub return_date: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Model {
    pub fn dates(&self) -> Result<LoanDates, DomainError> {
        Ok(LoanDates {
            borrow_date: parse_timestamp(&self.borrow_date)?,
            due_date: parse_timestamp(&self.due_date)?,
            extension_date: self
                .extension_date
                .as_deref()
                .map(parse_timestamp)
                .transpose()?,
            return_date: self.return_date.as_deref().map(parse_timestamp).transpose()?,
        })
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::copy::Entity",
        from = "Column::CopyId",
        to = "super::copy::Column::Id",
        on_update = "NoAction",
        on_delete = "Restrict"
    )]
    Copy,
    #[sea_orm(
        belongs_to = "super::student::Entity",
        from = "Column::MatricNumber",
        to = "super::student::Column::MatricNumber",
        on_update = "NoAction",
        on_delete = "Restrict"
    )]
    Student,
}

impl Related<super::copy::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Copy.def()
    }
}

impl Related<super::student::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Student.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
