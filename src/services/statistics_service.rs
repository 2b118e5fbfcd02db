//! Statistics Service - loads the ledger snapshot the reports are computed from

use sea_orm::*;
use std::str::FromStr;

use crate::domain::statistics::{
    LibrarySnapshot, SnapshotBook, SnapshotCategory, SnapshotCopy, SnapshotEntry, SnapshotStudent,
};
use crate::domain::{CopyStatus, DomainError, StudentStatus};
use crate::models::{author, book, borrowing_record, category, copy, student};

/// Read books, copies, students, categories and the whole ledger inside one
/// transaction, so copy statuses and open ledger entries always agree.
/// Reports are recomputed from a fresh snapshot on every request.
pub async fn load_snapshot(db: &DatabaseConnection) -> Result<LibrarySnapshot, DomainError> {
    let txn = db.begin().await?;

    let books = book::Entity::find()
        .find_also_related(author::Entity)
        .all(&txn)
        .await?
        .into_iter()
        .map(|(b, a)| SnapshotBook {
            id: b.id,
            title: b.title,
            author: a.map(|a| a.name).unwrap_or_default(),
            category_id: b.category_id,
        })
        .collect();

    let copies = copy::Entity::find()
        .all(&txn)
        .await?
        .into_iter()
        .map(|c| {
            Ok(SnapshotCopy {
                id: c.id,
                book_id: c.book_id,
                status: CopyStatus::from_str(&c.status)?,
            })
        })
        .collect::<Result<Vec<_>, DomainError>>()?;

    let students = student::Entity::find()
        .all(&txn)
        .await?
        .into_iter()
        .map(|s| {
            Ok(SnapshotStudent {
                status: StudentStatus::from_str(&s.status)?,
                matric_number: s.matric_number,
                full_name: s.full_name,
                email: s.email,
            })
        })
        .collect::<Result<Vec<_>, DomainError>>()?;

    let categories = category::Entity::find()
        .all(&txn)
        .await?
        .into_iter()
        .map(|c| SnapshotCategory {
            id: c.id,
            code: c.code,
            name: c.name,
        })
        .collect();

    let ledger = borrowing_record::Entity::find()
        .order_by_asc(borrowing_record::Column::Id)
        .all(&txn)
        .await?
        .into_iter()
        .map(|r| {
            Ok(SnapshotEntry {
                dates: r.dates()?,
                id: r.id,
                copy_id: r.copy_id,
                matric_number: r.matric_number,
            })
        })
        .collect::<Result<Vec<_>, DomainError>>()?;

    txn.commit().await?;

    Ok(LibrarySnapshot {
        books,
        copies,
        students,
        categories,
        ledger,
    })
}
