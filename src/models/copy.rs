use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "copies")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub book_id: i32,
    /// UUID v4 printed on the copy's label
    #[sea_orm(unique)]
    pub qr_code: String,
    /// `purchased` or `donated`
    pub acquisition_type: String,
    /// `YYYY-MM-DD`
    pub acquisition_date: String,
    pub price: Option<f64>,
    /// `new`, `good`, `fair`, `poor` or `damaged`
    pub condition: String,
    /// Shelf status of this physical copy.
    /// Valid values:
    /// - `available`: On shelf, can be borrowed
    /// - `borrowed`: Has exactly one open borrowing record
    /// - `processing`: Being catalogued or repaired
    /// - `missing`: Cannot be located
    /// - `damaged`: Withdrawn from circulation
    /// - `unpublished`: Not yet released to the shelves
    pub status: String,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::book::Entity",
        from = "Column::BookId",
        to = "super::book::Column::Id"
    )]
    Book,
    #[sea_orm(has_many = "super::borrowing_record::Entity")]
    BorrowingRecords,
}

impl Related<super::book::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Book.def()
    }
}

impl Related<super::borrowing_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BorrowingRecords.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
