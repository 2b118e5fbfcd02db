use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbErr, Statement};

pub async fn init_db(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    let db = Database::connect(database_url).await?;

    // Run migrations manually (simple SQL)
    run_migrations(&db).await?;

    Ok(db)
}

async fn execute(db: &DatabaseConnection, sql: &str) -> Result<(), DbErr> {
    db.execute(Statement::from_string(db.get_database_backend(), sql.to_owned()))
        .await
        .map(|_| ())
}

async fn run_migrations(db: &DatabaseConnection) -> Result<(), DbErr> {
    // Catalog metadata
    execute(
        db,
        r#"
        CREATE TABLE IF NOT EXISTS authors (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .await?;

    execute(
        db,
        r#"
        CREATE TABLE IF NOT EXISTS publishers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .await?;

    execute(
        db,
        r#"
        CREATE TABLE IF NOT EXISTS categories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            code TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            parent_id INTEGER REFERENCES categories(id) ON DELETE SET NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .await?;

    execute(
        db,
        r#"
        CREATE TABLE IF NOT EXISTS languages (
            code TEXT PRIMARY KEY CHECK (length(code) BETWEEN 1 AND 3),
            name TEXT NOT NULL UNIQUE
        )
        "#,
    )
    .await?;

    // Books
    execute(
        db,
        r#"
        CREATE TABLE IF NOT EXISTS books (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            isbn TEXT UNIQUE,
            call_number TEXT NOT NULL UNIQUE,
            author_id INTEGER NOT NULL REFERENCES authors(id),
            publisher_id INTEGER REFERENCES publishers(id),
            publication_year INTEGER,
            language_code TEXT REFERENCES languages(code),
            category_id INTEGER NOT NULL REFERENCES categories(id),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .await?;

    execute(
        db,
        "CREATE INDEX IF NOT EXISTS idx_books_category_id ON books(category_id)",
    )
    .await?;
    execute(db, "CREATE INDEX IF NOT EXISTS idx_books_author_id ON books(author_id)").await?;

    // Copies
    execute(
        db,
        r#"
        CREATE TABLE IF NOT EXISTS copies (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            book_id INTEGER NOT NULL REFERENCES books(id),
            qr_code TEXT NOT NULL UNIQUE,
            acquisition_type TEXT NOT NULL
                CHECK (acquisition_type IN ('purchased', 'donated')),
            acquisition_date TEXT NOT NULL,
            price REAL CHECK (price IS NULL OR price >= 0),
            condition TEXT NOT NULL DEFAULT 'good'
                CHECK (condition IN ('new', 'good', 'fair', 'poor', 'damaged')),
            status TEXT NOT NULL DEFAULT 'available'
                CHECK (status IN ('available', 'borrowed', 'processing', 'missing', 'damaged', 'unpublished')),
            notes TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .await?;

    execute(db, "CREATE INDEX IF NOT EXISTS idx_copies_book_id ON copies(book_id)").await?;
    execute(db, "CREATE INDEX IF NOT EXISTS idx_copies_status ON copies(status)").await?;

    // Students
    execute(
        db,
        r#"
        CREATE TABLE IF NOT EXISTS students (
            matric_number TEXT PRIMARY KEY,
            full_name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            status TEXT NOT NULL DEFAULT 'active'
                CHECK (status IN ('active', 'inactive', 'suspended')),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .await?;

    // Borrowing ledger. Timestamps share one fixed-width UTC format, so the
    // text comparisons in the CHECKs are chronological comparisons.
    execute(
        db,
        r#"
        CREATE TABLE IF NOT EXISTS borrowing_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            copy_id INTEGER NOT NULL REFERENCES copies(id) ON DELETE RESTRICT,
            matric_number TEXT NOT NULL REFERENCES students(matric_number) ON DELETE RESTRICT,
            borrow_date TEXT NOT NULL,
            due_date TEXT NOT NULL,
            extension_date TEXT,
            return_date TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            CHECK (borrow_date <= due_date),
            CHECK (extension_date IS NULL OR extension_date > due_date),
            CHECK (return_date IS NULL OR return_date >= borrow_date)
        )
        "#,
    )
    .await?;

    // At most one open record per copy
    execute(
        db,
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_borrowing_records_open_copy
        ON borrowing_records(copy_id) WHERE return_date IS NULL
        "#,
    )
    .await?;
    execute(
        db,
        "CREATE INDEX IF NOT EXISTS idx_borrowing_records_matric ON borrowing_records(matric_number)",
    )
    .await?;
    execute(
        db,
        "CREATE INDEX IF NOT EXISTS idx_borrowing_records_borrow_date ON borrowing_records(borrow_date)",
    )
    .await?;

    // Staff accounts
    execute(
        db,
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'librarian'
                CHECK (role IN ('admin', 'librarian')),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .await?;

    tracing::debug!("Database migrations applied");
    Ok(())
}
