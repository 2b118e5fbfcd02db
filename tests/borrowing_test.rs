use chrono::{DateTime, Duration, TimeZone, Utc};
use reading_room::db;
use reading_room::domain::statistics::kpi_metrics;
use reading_room::domain::{
    BookRepository, BorrowStatus, CopyFilter, CopyRepository, CopyStatus, CreateBookInput,
    CreateCategoryInput, CreateStudentInput, DomainError, MatricNumber, MetadataRepository,
    StudentRepository, StudentStatus,
};
use reading_room::infrastructure::{
    SeaOrmBookRepository, SeaOrmCopyRepository, SeaOrmMetadataRepository, SeaOrmStudentRepository,
};
use reading_room::services::borrowing_service::{self, RecordFilter, RecordState};
use reading_room::services::load_snapshot;
use reading_room::utils::time::format_timestamp;
use sea_orm::DatabaseConnection;

const ACTIVE: &str = "A0000001A";
const OTHER: &str = "A0000002B";
const SUSPENDED: &str = "A0000003C";

struct Library {
    db: DatabaseConnection,
    copies: SeaOrmCopyRepository,
    book_id: i32,
    copy_ids: Vec<i32>,
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

// In-memory reading room: one book with five copies and three students
async fn setup() -> Library {
    let db = db::init_db("sqlite::memory:")
        .await
        .expect("Failed to init DB");

    let metadata = SeaOrmMetadataRepository::new(db.clone());
    let author = metadata
        .create_author("Ursula K. Le Guin".to_string())
        .await
        .unwrap();
    let category = metadata
        .create_category(CreateCategoryInput {
            code: "813".to_string(),
            name: "American fiction".to_string(),
            parent_id: None,
        })
        .await
        .unwrap();

    let book = SeaOrmBookRepository::new(db.clone())
        .create(CreateBookInput {
            title: "The Dispossessed".to_string(),
            isbn: None,
            call_number: "813.54 LEG".to_string(),
            author_id: author.id,
            publisher_id: None,
            publication_year: Some(1974),
            language_code: None,
            category_id: category.id,
            initial_copies: 5,
        })
        .await
        .unwrap();

    let students = SeaOrmStudentRepository::new(db.clone());
    for (matric, name, status) in [
        (ACTIVE, "Shevek Urras", StudentStatus::Active),
        (OTHER, "Takver Anarres", StudentStatus::Active),
        (SUSPENDED, "Sabul Abbenay", StudentStatus::Suspended),
    ] {
        students
            .create(CreateStudentInput {
                matric_number: MatricNumber::parse(matric).unwrap(),
                full_name: name.to_string(),
                email: format!("{}@uni.example.edu", matric.to_lowercase()),
                status,
            })
            .await
            .unwrap();
    }

    let copies = SeaOrmCopyRepository::new(db.clone());
    let copy_ids = copies
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

    Library {
        db,
        copies,
        book_id: book.id,
        copy_ids,
    }
}

async fn copy_status(lib: &Library, copy_id: i32) -> CopyStatus {
    lib.copies.find_by_id(copy_id).await.unwrap().unwrap().status
}

#[tokio::test]
async fn borrow_and_return_round_trip() {
    let lib = setup().await;
    let copy_id = lib.copy_ids[0];

    let record = borrowing_service::borrow_copy(&lib.db, copy_id, ACTIVE, None, t0())
        .await
        .expect("borrow");
    assert_eq!(record.status, BorrowStatus::Borrowed);
    assert_eq!(record.book_id, lib.book_id);
    assert_eq!(record.student_name, "Shevek Urras");
    assert_eq!(record.due_date, format_timestamp(t0() + Duration::days(14)));
    assert_eq!(record.days_remaining, 14);
    assert_eq!(copy_status(&lib, copy_id).await, CopyStatus::Borrowed);

    let returned = borrowing_service::return_record(&lib.db, record.id, t0() + Duration::days(3))
        .await
        .expect("return");
    assert_eq!(returned.status, BorrowStatus::Returned);
    assert_eq!(
        returned.return_date.as_deref(),
        Some(format_timestamp(t0() + Duration::days(3)).as_str())
    );
    assert_eq!(copy_status(&lib, copy_id).await, CopyStatus::Available);

    let again = borrowing_service::return_record(&lib.db, record.id, t0() + Duration::days(4)).await;
    assert!(matches!(again, Err(DomainError::AlreadyReturned(_))));

    // The first return date is kept
    let stored = borrowing_service::get_record(&lib.db, record.id, t0()).await.unwrap();
    assert_eq!(stored.return_date, returned.return_date);
}

#[tokio::test]
async fn fourth_open_borrow_is_refused() {
    let lib = setup().await;
    let mut records = Vec::new();
    for &copy_id in &lib.copy_ids[..3] {
        records.push(
            borrowing_service::borrow_copy(&lib.db, copy_id, ACTIVE, None, t0())
                .await
                .unwrap(),
        );
    }

    let fourth = borrowing_service::borrow_copy(&lib.db, lib.copy_ids[3], ACTIVE, None, t0()).await;
    assert!(matches!(fourth, Err(DomainError::BorrowLimitExceeded(_))));
    assert_eq!(copy_status(&lib, lib.copy_ids[3]).await, CopyStatus::Available);

    borrowing_service::return_record(&lib.db, records[0].id, t0() + Duration::days(1))
        .await
        .unwrap();
    borrowing_service::borrow_copy(&lib.db, lib.copy_ids[3], ACTIVE, None, t0() + Duration::days(1))
        .await
        .expect("limit frees up after a return");
}

#[tokio::test]
async fn suspended_student_cannot_borrow() {
    let lib = setup().await;
    let result =
        borrowing_service::borrow_copy(&lib.db, lib.copy_ids[0], SUSPENDED, None, t0()).await;
    assert!(matches!(result, Err(DomainError::Forbidden(_))));
    assert_eq!(copy_status(&lib, lib.copy_ids[0]).await, CopyStatus::Available);
}

#[tokio::test]
async fn borrow_rejects_bad_requests() {
    let lib = setup().await;

    let missing_copy = borrowing_service::borrow_copy(&lib.db, 9999, ACTIVE, None, t0()).await;
    assert!(matches!(missing_copy, Err(DomainError::NotFound(_))));

    let missing_student =
        borrowing_service::borrow_copy(&lib.db, lib.copy_ids[0], "A9999999Z", None, t0()).await;
    assert!(matches!(missing_student, Err(DomainError::NotFound(_))));

    let bad_matric =
        borrowing_service::borrow_copy(&lib.db, lib.copy_ids[0], "12345", None, t0()).await;
    assert!(matches!(bad_matric, Err(DomainError::Validation(_))));

    let short_loan =
        borrowing_service::borrow_copy(&lib.db, lib.copy_ids[0], ACTIVE, Some(7), t0()).await;
    assert!(matches!(short_loan, Err(DomainError::Validation(_))));
}

#[tokio::test]
async fn borrowed_or_withdrawn_copy_is_unavailable() {
    let lib = setup().await;
    borrowing_service::borrow_copy(&lib.db, lib.copy_ids[0], ACTIVE, None, t0())
        .await
        .unwrap();

    let taken = borrowing_service::borrow_copy(&lib.db, lib.copy_ids[0], OTHER, None, t0()).await;
    assert!(matches!(taken, Err(DomainError::CopyUnavailable(_))));

    lib.copies
        .change_status(
            lib.copy_ids[1],
            reading_room::domain::CopyStatusChange {
                status: CopyStatus::Damaged,
                condition: None,
                notes: Some("water damage".to_string()),
            },
            t0().date_naive(),
        )
        .await
        .unwrap();
    let damaged = borrowing_service::borrow_copy(&lib.db, lib.copy_ids[1], OTHER, None, t0()).await;
    assert!(matches!(damaged, Err(DomainError::CopyUnavailable(_))));
}

#[tokio::test]
async fn extension_applies_once() {
    let lib = setup().await;
    let record = borrowing_service::borrow_copy(&lib.db, lib.copy_ids[0], ACTIVE, Some(21), t0())
        .await
        .unwrap();

    let too_long =
        borrowing_service::extend_record(&lib.db, record.id, Some(45), t0() + Duration::days(1)).await;
    assert!(matches!(too_long, Err(DomainError::Validation(_))));

    let extended =
        borrowing_service::extend_record(&lib.db, record.id, Some(7), t0() + Duration::days(1))
            .await
            .unwrap();
    assert_eq!(extended.status, BorrowStatus::Extended);
    assert_eq!(
        extended.effective_due_date,
        format_timestamp(t0() + Duration::days(28))
    );
    // The original due date is kept alongside the extension
    assert_eq!(extended.due_date, record.due_date);

    let twice =
        borrowing_service::extend_record(&lib.db, record.id, None, t0() + Duration::days(2)).await;
    assert!(matches!(twice, Err(DomainError::AlreadyExtended(_))));

    borrowing_service::return_record(&lib.db, record.id, t0() + Duration::days(3))
        .await
        .unwrap();
    let after_return =
        borrowing_service::extend_record(&lib.db, record.id, None, t0() + Duration::days(4)).await;
    assert!(matches!(after_return, Err(DomainError::AlreadyReturned(_))));
}

#[tokio::test]
async fn overdue_is_derived_from_the_clock() {
    let lib = setup().await;
    let late = borrowing_service::borrow_copy(&lib.db, lib.copy_ids[0], ACTIVE, None, t0())
        .await
        .unwrap();
    let returned = borrowing_service::borrow_copy(&lib.db, lib.copy_ids[1], OTHER, None, t0())
        .await
        .unwrap();
    borrowing_service::return_record(&lib.db, returned.id, t0() + Duration::days(2))
        .await
        .unwrap();

    let later = t0() + Duration::days(20);
    let detail = borrowing_service::get_record(&lib.db, late.id, later).await.unwrap();
    assert_eq!(detail.status, BorrowStatus::Overdue);
    assert!(detail.is_overdue);
    assert_eq!(detail.days_remaining, -6);

    let overdue = borrowing_service::list_records(
        &lib.db,
        RecordFilter {
            state: RecordState::Overdue,
            ..Default::default()
        },
        later,
    )
    .await
    .unwrap();
    assert_eq!(overdue.total, 1);
    assert_eq!(overdue.borrowings[0].id, late.id);

    let six_days = borrowing_service::overdue_records(&lib.db, 6, 0, 10, later).await.unwrap();
    assert_eq!(six_days.total, 1);
    let seven_days = borrowing_service::overdue_records(&lib.db, 7, 0, 10, later).await.unwrap();
    assert_eq!(seven_days.total, 0);

    let active = borrowing_service::active_records(&lib.db, false, None, 0, 10, later)
        .await
        .unwrap();
    assert_eq!(active.total_count, 1);
    assert_eq!(active.overdue_count, 1);

    // Nothing is overdue before the due date
    let early = borrowing_service::active_records(&lib.db, true, None, 0, 10, t0())
        .await
        .unwrap();
    assert_eq!(early.total_count, 0);
}

#[tokio::test]
async fn due_soon_window() {
    let lib = setup().await;
    let record = borrowing_service::borrow_copy(&lib.db, lib.copy_ids[0], ACTIVE, None, t0())
        .await
        .unwrap();

    let soon = borrowing_service::due_soon(&lib.db, 3, 10, t0() + Duration::days(12))
        .await
        .unwrap();
    assert_eq!(soon.len(), 1);
    assert_eq!(soon[0].id, record.id);

    let not_yet = borrowing_service::due_soon(&lib.db, 3, 10, t0()).await.unwrap();
    assert!(not_yet.is_empty());

    let too_far = borrowing_service::due_soon(&lib.db, 8, 10, t0()).await;
    assert!(matches!(too_far, Err(DomainError::Validation(_))));
}

#[tokio::test]
async fn student_and_book_listings() {
    let lib = setup().await;
    let first = borrowing_service::borrow_copy(&lib.db, lib.copy_ids[0], ACTIVE, None, t0())
        .await
        .unwrap();
    borrowing_service::return_record(&lib.db, first.id, t0() + Duration::days(1))
        .await
        .unwrap();
    let second = borrowing_service::borrow_copy(
        &lib.db,
        lib.copy_ids[1],
        ACTIVE,
        None,
        t0() + Duration::days(2),
    )
    .await
    .unwrap();

    let history = borrowing_service::student_history(&lib.db, ACTIVE, 10, true, t0() + Duration::days(2))
        .await
        .unwrap();
    assert_eq!(
        history.iter().map(|r| r.id).collect::<Vec<_>>(),
        vec![second.id, first.id]
    );

    let returned_only =
        borrowing_service::student_history(&lib.db, ACTIVE, 10, false, t0() + Duration::days(2))
            .await
            .unwrap();
    assert_eq!(returned_only.len(), 1);

    let active = borrowing_service::records_for_student(&lib.db, ACTIVE, true, 0, 10, t0())
        .await
        .unwrap();
    assert_eq!(active.total, 1);

    let unknown = borrowing_service::records_for_student(&lib.db, "A7654321Q", false, 0, 10, t0()).await;
    assert!(matches!(unknown, Err(DomainError::NotFound(_))));

    let for_book = borrowing_service::records_for_book(&lib.db, lib.book_id, 0, 10, t0())
        .await
        .unwrap();
    assert_eq!(for_book.total, 2);
}

#[tokio::test]
async fn kpis_match_the_ledger() {
    let lib = setup().await;
    let open = borrowing_service::borrow_copy(&lib.db, lib.copy_ids[0], ACTIVE, None, t0())
        .await
        .unwrap();
    let closed = borrowing_service::borrow_copy(&lib.db, lib.copy_ids[1], OTHER, None, t0())
        .await
        .unwrap();
    borrowing_service::return_record(&lib.db, closed.id, t0() + Duration::days(4))
        .await
        .unwrap();

    let snapshot = load_snapshot(&lib.db).await.unwrap();
    let kpi = kpi_metrics(&snapshot, t0() + Duration::days(30));
    assert_eq!(kpi.total_books, 1);
    assert_eq!(kpi.total_copies, 5);
    assert_eq!(kpi.total_students, 3);
    assert_eq!(kpi.active_borrows, 1);
    assert_eq!(kpi.overdue_books, 1);
    assert_eq!(kpi.return_rate, 50.0);
    assert_eq!(kpi.average_borrow_duration, 4.0);

    // Student open counts follow the ledger too
    let student = SeaOrmStudentRepository::new(lib.db.clone())
        .find_by_matric(ACTIVE)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(student.open_borrowings, 1);
    assert!(student.can_borrow);
    assert_eq!(open.matric_number, ACTIVE);
}
