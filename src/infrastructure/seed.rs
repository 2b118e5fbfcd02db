use chrono::Utc;
use sea_orm::*;

use crate::auth::{ROLE_ADMIN, ROLE_LIBRARIAN, hash_password};
use crate::domain::{
    BookRepository, CreateBookInput, CreateCategoryInput, CreateStudentInput, DomainError,
    MatricNumber, MetadataRepository, StudentRepository, StudentStatus,
};
use crate::infrastructure::{SeaOrmBookRepository, SeaOrmMetadataRepository, SeaOrmStudentRepository};
use crate::models::{book, copy, user};
use crate::services::borrowing_service;
use crate::utils::time::format_timestamp;

const DEMO_CATEGORIES: &[(&str, &str, Option<&str>)] = &[
    ("000", "Computer science, information and general works", None),
    ("005", "Computer programming", Some("000")),
    ("500", "Science", None),
    ("510", "Mathematics", Some("500")),
    ("800", "Literature", None),
    ("823", "English fiction", Some("800")),
];

// (title, isbn, call number, author, publisher, year, category code, copies)
const DEMO_BOOKS: &[(&str, &str, &str, &str, &str, i32, &str, u32)] = &[
    (
        "The Rust Programming Language",
        "978-1718503106",
        "005.133 KLA",
        "Steve Klabnik",
        "No Starch Press",
        2023,
        "005",
        3,
    ),
    (
        "Structure and Interpretation of Computer Programs",
        "978-0262510875",
        "005.13 ABE",
        "Harold Abelson",
        "MIT Press",
        1996,
        "005",
        2,
    ),
    (
        "Calculus",
        "978-0914098911",
        "515 SPI",
        "Michael Spivak",
        "Publish or Perish",
        2008,
        "510",
        2,
    ),
    (
        "Pride and Prejudice",
        "978-0141439518",
        "823.7 AUS",
        "Jane Austen",
        "Penguin Classics",
        2002,
        "823",
        4,
    ),
    (
        "Frankenstein",
        "978-0141439471",
        "823.7 SHE",
        "Mary Shelley",
        "Penguin Classics",
        2003,
        "823",
        1,
    ),
];

const DEMO_STUDENTS: &[(&str, &str, &str, StudentStatus)] = &[
    ("A0000001X", "Ada Lovelace", "ada@students.example.edu", StudentStatus::Active),
    ("A0000002Y", "Alan Turing", "alan@students.example.edu", StudentStatus::Active),
    ("A0000003Z", "Grace Hopper", "grace@students.example.edu", StudentStatus::Active),
    ("A0000004W", "Edsger Dijkstra", "edsger@students.example.edu", StudentStatus::Suspended),
];

async fn seed_users(db: &DatabaseConnection) -> Result<(), DomainError> {
    let now = format_timestamp(Utc::now());
    for (username, password, role) in [("admin", "admin", ROLE_ADMIN), ("librarian", "librarian", ROLE_LIBRARIAN)] {
        let password_hash = hash_password(password).map_err(DomainError::Internal)?;
        let account = user::ActiveModel {
            username: Set(username.to_owned()),
            password_hash: Set(password_hash),
            role: Set(role.to_owned()),
            created_at: Set(now.clone()),
            updated_at: Set(now.clone()),
            ..Default::default()
        };

        user::Entity::insert(account)
            .on_conflict(
                sea_orm::sea_query::OnConflict::column(user::Column::Username)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(db)
            .await?;
    }
    Ok(())
}

// A couple of open loans and one returned loan so the reports have data
async fn seed_borrowings(db: &DatabaseConnection) -> Result<(), DomainError> {
    let now = Utc::now();
    let copies = copy::Entity::find()
        .filter(copy::Column::Status.eq("available"))
        .order_by_asc(copy::Column::Id)
        .all(db)
        .await?;
    let mut copy_ids = copies.iter().map(|c| c.id);

    for matric in ["A0000001X", "A0000001X", "A0000002Y", "A0000003Z"] {
        let Some(copy_id) = copy_ids.next() else {
            break;
        };
        borrowing_service::borrow_copy(db, copy_id, matric, None, now).await?;
    }

    if let Some(copy_id) = copy_ids.next() {
        let record = borrowing_service::borrow_copy(db, copy_id, "A0000002Y", None, now).await?;
        borrowing_service::return_record(db, record.id, now).await?;
    }
    Ok(())
}

/// Seed staff accounts and a small demo catalog. Safe to run on every
/// start: the catalog is only seeded into an empty database.
pub async fn seed_demo_data(db: &DatabaseConnection) -> Result<(), DomainError> {
    seed_users(db).await?;

    if book::Entity::find().count(db).await? > 0 {
        tracing::debug!("Catalog already populated, skipping demo books");
        return Ok(());
    }

    let metadata = SeaOrmMetadataRepository::new(db.clone());
    let books = SeaOrmBookRepository::new(db.clone());
    let students = SeaOrmStudentRepository::new(db.clone());

    if metadata.list_languages().await?.is_empty() {
        metadata.create_language("en".into(), "English".into()).await?;
    }

    let mut category_ids = std::collections::HashMap::new();
    for (code, name, parent) in DEMO_CATEGORIES {
        let parent_id = parent.and_then(|p| category_ids.get(p).copied());
        let category = metadata
            .create_category(CreateCategoryInput {
                code: code.to_string(),
                name: name.to_string(),
                parent_id,
            })
            .await?;
        category_ids.insert(*code, category.id);
    }

    for (title, isbn, call_number, author, publisher, year, category, copies) in DEMO_BOOKS {
        let author = match metadata
            .list_authors(Some(author.to_string()))
            .await?
            .into_iter()
            .find(|a| a.name == *author)
        {
            Some(existing) => existing,
            None => metadata.create_author(author.to_string()).await?,
        };
        let publisher = metadata.get_or_create_publisher(publisher.to_string()).await?;
        let category_id = category_ids
            .get(category)
            .copied()
            .ok_or_else(|| DomainError::Internal(format!("Unknown demo category {}", category)))?;

        books
            .create(CreateBookInput {
                title: title.to_string(),
                isbn: Some(isbn.to_string()),
                call_number: call_number.to_string(),
                author_id: author.id,
                publisher_id: Some(publisher.id),
                publication_year: Some(*year),
                language_code: Some("en".to_string()),
                category_id,
                initial_copies: *copies,
            })
            .await?;
    }

    for (matric, name, email, status) in DEMO_STUDENTS {
        if students.find_by_matric(matric).await?.is_some() {
            continue;
        }
        students
            .create(CreateStudentInput {
                matric_number: MatricNumber::parse(matric)?,
                full_name: name.to_string(),
                email: email.to_string(),
                status: *status,
            })
            .await?;
    }

    seed_borrowings(db).await?;

    tracing::info!(
        "Seeded {} books and {} students",
        DEMO_BOOKS.len(),
        DEMO_STUDENTS.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;

    #[tokio::test]
    async fn seeding_twice_keeps_one_catalog() {
        let db = init_db("sqlite::memory:").await.unwrap();
        seed_demo_data(&db).await.unwrap();
        seed_demo_data(&db).await.unwrap();

        assert_eq!(book::Entity::find().count(&db).await.unwrap(), DEMO_BOOKS.len() as u64);
        assert_eq!(user::Entity::find().count(&db).await.unwrap(), 2);
    }
}
