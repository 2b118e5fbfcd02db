use chrono::{Duration, Utc};
use reading_room::db;
use reading_room::domain::{
    AcquisitionType, BookFilter, BookRepository, CopyCondition, CopyFilter, CopyRepository,
    CopyStatus, CopyStatusChange, CreateBookInput, CreateCategoryInput, CreateCopyInput,
    CreateStudentInput, DomainError, MatricNumber, MetadataRepository, StudentFilter,
    StudentRepository, StudentStatus, UpdateBookInput, UpdateStudentInput,
};
use reading_room::infrastructure::{
    SeaOrmBookRepository, SeaOrmCopyRepository, SeaOrmMetadataRepository, SeaOrmStudentRepository,
};
use reading_room::services::borrowing_service;
use sea_orm::DatabaseConnection;

struct Catalog {
    db: DatabaseConnection,
    books: SeaOrmBookRepository,
    copies: SeaOrmCopyRepository,
    metadata: SeaOrmMetadataRepository,
    author_id: i32,
    fiction_id: i32,
    science_id: i32,
}

async fn setup_test_db() -> Catalog {
    let db = db::init_db("sqlite::memory:")
        .await
        .expect("Failed to init DB");
    let metadata = SeaOrmMetadataRepository::new(db.clone());
    let author = metadata.create_author("Mary Shelley".to_string()).await.unwrap();
    let literature = metadata
        .create_category(CreateCategoryInput {
            code: "800".to_string(),
            name: "Literature".to_string(),
            parent_id: None,
        })
        .await
        .unwrap();
    let fiction = metadata
        .create_category(CreateCategoryInput {
            code: "823".to_string(),
            name: "English fiction".to_string(),
            parent_id: Some(literature.id),
        })
        .await
        .unwrap();
    let science = metadata
        .create_category(CreateCategoryInput {
            code: "500".to_string(),
            name: "Science".to_string(),
            parent_id: None,
        })
        .await
        .unwrap();

    Catalog {
        books: SeaOrmBookRepository::new(db.clone()),
        copies: SeaOrmCopyRepository::new(db.clone()),
        metadata,
        db,
        author_id: author.id,
        fiction_id: fiction.id,
        science_id: science.id,
    }
}

fn book_input(catalog: &Catalog, title: &str, call_number: &str, copies: u32) -> CreateBookInput {
    CreateBookInput {
        title: title.to_string(),
        isbn: None,
        call_number: call_number.to_string(),
        author_id: catalog.author_id,
        publisher_id: None,
        publication_year: Some(1818),
        language_code: None,
        category_id: catalog.fiction_id,
        initial_copies: copies,
    }
}

#[tokio::test]
async fn test_book_create_and_lookup() {
    let catalog = setup_test_db().await;
    let mut input = book_input(&catalog, "Frankenstein", "823.7 SHE", 2);
    input.isbn = Some("978-0141439471".to_string());
    let book = catalog.books.create(input).await.unwrap();

    assert_eq!(book.author_name, "Mary Shelley");
    assert_eq!(book.category_name, "English fiction");
    assert_eq!(book.total_copies, 2);
    assert_eq!(book.available_copies, 2);

    let by_call = catalog
        .books
        .find_by_call_number("823.7 SHE")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_call.id, book.id);

    let by_isbn = catalog
        .books
        .find_by_isbn(book.isbn.as_deref().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_isbn.id, book.id);

    let duplicate = catalog
        .books
        .create(book_input(&catalog, "Frankenstein (2nd)", "823.7 SHE", 0))
        .await;
    assert!(matches!(duplicate, Err(DomainError::Conflict(_))));

    let blank = catalog
        .books
        .create(book_input(&catalog, "   ", "823.7 XXX", 0))
        .await;
    assert!(matches!(blank, Err(DomainError::Validation(_))));
}

#[tokio::test]
async fn test_book_filters_combine() {
    let catalog = setup_test_db().await;
    catalog
        .books
        .create(book_input(&catalog, "Frankenstein", "823.7 SHE", 1))
        .await
        .unwrap();
    catalog
        .books
        .create(book_input(&catalog, "The Last Man", "823.7 SHE L", 1))
        .await
        .unwrap();
    let mut science = book_input(&catalog, "Frankenstein and Science", "500 SHE", 0);
    science.category_id = catalog.science_id;
    catalog.books.create(science).await.unwrap();

    let by_title = catalog
        .books
        .find_all(BookFilter {
            title: Some("franken".to_string()),
            limit: 10,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(by_title.total, 2);

    let both = catalog
        .books
        .find_all(BookFilter {
            title: Some("Frankenstein".to_string()),
            category: Some("fiction".to_string()),
            limit: 10,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(both.total, 1);
    assert_eq!(both.books[0].title, "Frankenstein");

    let exact = catalog.books.find_by_title("Frankenstein", true).await.unwrap();
    assert_eq!(exact.len(), 1);

    let paged = catalog
        .books
        .find_all(BookFilter {
            limit: 1,
            offset: 1,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(paged.total, 3);
    assert_eq!(paged.books.len(), 1);
}

#[tokio::test]
async fn test_book_update_and_delete_rules() {
    let catalog = setup_test_db().await;
    let book = catalog
        .books
        .create(book_input(&catalog, "Frankenstein", "823.7 SHE", 1))
        .await
        .unwrap();

    let updated = catalog
        .books
        .update(
            book.id,
            UpdateBookInput {
                title: Some("Frankenstein; or, The Modern Prometheus".to_string()),
                publication_year: Some(None),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.title, "Frankenstein; or, The Modern Prometheus");
    assert_eq!(updated.publication_year, None);

    let refused = catalog.books.delete(book.id).await;
    assert!(matches!(refused, Err(DomainError::InvalidState(_))));

    let copy_id = catalog
        .copies
        .find_all(CopyFilter {
            book_id: Some(book.id),
            limit: 10,
            ..Default::default()
        })
        .await
        .unwrap()
        .copies[0]
        .id;
    catalog.copies.delete(copy_id).await.unwrap();
    catalog.books.delete(book.id).await.unwrap();
    assert!(catalog.books.find_by_id(book.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_copy_lifecycle_and_notes() {
    let catalog = setup_test_db().await;
    let book = catalog
        .books
        .create(book_input(&catalog, "Frankenstein", "823.7 SHE", 0))
        .await
        .unwrap();
    let today = Utc::now().date_naive();

    let copy = catalog
        .copies
        .create(CreateCopyInput {
            book_id: book.id,
            acquisition_type: AcquisitionType::Donated,
            acquisition_date: today,
            price: None,
            condition: CopyCondition::Good,
            status: CopyStatus::Available,
            notes: None,
        })
        .await
        .unwrap();
    assert!(uuid::Uuid::parse_str(&copy.qr_code).is_ok());

    let by_qr = catalog
        .copies
        .find_by_qr_code(uuid::Uuid::parse_str(&copy.qr_code).unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_qr.id, copy.id);

    let future = catalog
        .copies
        .create(CreateCopyInput {
            book_id: book.id,
            acquisition_type: AcquisitionType::Purchased,
            acquisition_date: today + Duration::days(2),
            price: Some(12.5),
            condition: CopyCondition::New,
            status: CopyStatus::Available,
            notes: None,
        })
        .await;
    assert!(matches!(future, Err(DomainError::Validation(_))));

    let damaged = catalog
        .copies
        .change_status(
            copy.id,
            CopyStatusChange {
                status: CopyStatus::Damaged,
                condition: Some(CopyCondition::Poor),
                notes: Some("spine cracked".to_string()),
            },
            today,
        )
        .await
        .unwrap();
    assert_eq!(damaged.status, CopyStatus::Damaged);
    assert_eq!(damaged.condition, CopyCondition::Poor);
    assert!(damaged.notes.as_deref().unwrap().contains("damaged: spine cracked"));

    let borrowed = catalog
        .copies
        .change_status(
            copy.id,
            CopyStatusChange {
                status: CopyStatus::Borrowed,
                condition: None,
                notes: None,
            },
            today,
        )
        .await;
    assert!(matches!(borrowed, Err(DomainError::InvalidState(_))));

    let counts = catalog.copies.status_counts(book.id).await.unwrap();
    assert_eq!(counts.total, 1);
    assert_eq!(counts.counts["damaged"], 1);
    assert_eq!(counts.counts["available"], 0);
}

#[tokio::test]
async fn test_bulk_status_reports_failures() {
    let catalog = setup_test_db().await;
    let book = catalog
        .books
        .create(book_input(&catalog, "Frankenstein", "823.7 SHE", 2))
        .await
        .unwrap();
    let ids: Vec<i32> = catalog
        .copies
        .find_all(CopyFilter {
            book_id: Some(book.id),
            limit: 10,
            ..Default::default()
        })
        .await
        .unwrap()
        .copies
        .into_iter()
        .map(|c| c.id)
        .collect();

    let result = catalog
        .copies
        .bulk_change_status(
            vec![ids[0], ids[1], 4242],
            CopyStatusChange {
                status: CopyStatus::Processing,
                condition: None,
                notes: None,
            },
            Utc::now().date_naive(),
        )
        .await
        .unwrap();
    assert_eq!(result.updated, vec![ids[0], ids[1]]);
    assert_eq!(result.failed.len(), 1);
    assert_eq!(result.failed[0].copy_id, 4242);
}

#[tokio::test]
async fn test_title_lookup_shows_open_borrows() {
    let catalog = setup_test_db().await;
    let book = catalog
        .books
        .create(book_input(&catalog, "Frankenstein", "823.7 SHE", 2))
        .await
        .unwrap();
    let students = SeaOrmStudentRepository::new(catalog.db.clone());
    students
        .create(CreateStudentInput {
            matric_number: MatricNumber::parse("A0000010K").unwrap(),
            full_name: "Victor Frankenstein".to_string(),
            email: "victor@uni.example.edu".to_string(),
            status: StudentStatus::Active,
        })
        .await
        .unwrap();
    let availability = catalog.books.availability(book.id).await.unwrap();
    let lent = availability.available_copy_ids[0];
    borrowing_service::borrow_copy(&catalog.db, lent, "A0000010K", None, Utc::now())
        .await
        .unwrap();

    let states = catalog
        .copies
        .borrow_status_by_title("franken", false, 5, Utc::now())
        .await
        .unwrap();
    assert_eq!(states.len(), 1);
    assert_eq!(states[0].available_copies, 1);
    let borrow = states[0]
        .copies
        .iter()
        .find(|c| c.copy_id == lent)
        .and_then(|c| c.borrow.as_ref())
        .unwrap();
    assert_eq!(borrow.student_name, "Victor Frankenstein");

    let delete = catalog.copies.delete(lent).await;
    assert!(matches!(delete, Err(DomainError::InvalidState(_))));

    let after = catalog.books.availability(book.id).await.unwrap();
    assert_eq!(after.available_copies, 1);
    assert!(after.is_available);
}

#[tokio::test]
async fn test_student_registry() {
    let catalog = setup_test_db().await;
    let students = SeaOrmStudentRepository::new(catalog.db.clone());
    let created = students
        .create(CreateStudentInput {
            matric_number: MatricNumber::parse("A0000020M").unwrap(),
            full_name: "Elizabeth Lavenza".to_string(),
            email: "elizabeth@uni.example.edu".to_string(),
            status: StudentStatus::Active,
        })
        .await
        .unwrap();
    assert_eq!(created.open_borrowings, 0);
    assert!(created.can_borrow);

    let same_email = students
        .create(CreateStudentInput {
            matric_number: MatricNumber::parse("A0000021N").unwrap(),
            full_name: "Someone Else".to_string(),
            email: "elizabeth@uni.example.edu".to_string(),
            status: StudentStatus::Active,
        })
        .await;
    assert!(matches!(same_email, Err(DomainError::Conflict(_))));

    let bad_email = students
        .create(CreateStudentInput {
            matric_number: MatricNumber::parse("A0000022P").unwrap(),
            full_name: "No At Sign".to_string(),
            email: "not-an-email".to_string(),
            status: StudentStatus::Active,
        })
        .await;
    assert!(matches!(bad_email, Err(DomainError::Validation(_))));

    let suspended = students
        .update(
            "A0000020M",
            UpdateStudentInput {
                status: Some(StudentStatus::Suspended),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(!suspended.can_borrow);

    let found = students.search("lavenza", 10).await.unwrap();
    assert_eq!(found.len(), 1);
    let too_short = students.search("l", 10).await;
    assert!(matches!(too_short, Err(DomainError::Validation(_))));

    let active = students
        .find_all(StudentFilter {
            status: Some(StudentStatus::Active),
            limit: 10,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(active.total, 0);
}

#[tokio::test]
async fn test_category_tree_and_publishers() {
    let catalog = setup_test_db().await;

    let main = catalog.metadata.list_categories(true).await.unwrap();
    assert_eq!(
        main.iter().map(|c| c.code.as_str()).collect::<Vec<_>>(),
        vec!["500", "800"]
    );

    let fiction = catalog
        .metadata
        .find_category(catalog.fiction_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fiction.parent_name.as_deref(), Some("Literature"));

    let children = catalog
        .metadata
        .subcategories(fiction.parent_id.unwrap())
        .await
        .unwrap();
    assert_eq!(children.len(), 1);

    let first = catalog
        .metadata
        .get_or_create_publisher("Lackington".to_string())
        .await
        .unwrap();
    let second = catalog
        .metadata
        .get_or_create_publisher("Lackington".to_string())
        .await
        .unwrap();
    assert_eq!(first.id, second.id);

    let duplicate_author = catalog
        .metadata
        .create_author("Mary Shelley".to_string())
        .await;
    assert!(matches!(duplicate_author, Err(DomainError::Conflict(_))));
}
