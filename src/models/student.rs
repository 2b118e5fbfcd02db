use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "students")]
pub struct Model {
    /// `A` + 7 digits + letter
    #[sea_orm(primary_key, auto_increment = false)]
    pub matric_number: String,
    pub full_name: String,
    #[sea_orm(unique)]
    pub email: String,
    /// `active`, `inactive` or `suspended`
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::borrowing_record::Entity")]
    BorrowingRecords,
}

impl Related<super::borrowing_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BorrowingRecords.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
