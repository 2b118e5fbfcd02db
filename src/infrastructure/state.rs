//! Application state containing repositories and shared resources

use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::domain::{BookRepository, CopyRepository, MetadataRepository, StudentRepository};
use crate::infrastructure::{
    SeaOrmBookRepository, SeaOrmCopyRepository, SeaOrmMetadataRepository, SeaOrmStudentRepository,
};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Used directly by the borrowing engine and statistics, which span tables
    db: DatabaseConnection,
    pub book_repo: Arc<dyn BookRepository>,
    pub copy_repo: Arc<dyn CopyRepository>,
    pub student_repo: Arc<dyn StudentRepository>,
    pub metadata_repo: Arc<dyn MetadataRepository>,
}

impl AppState {
    /// Create a new AppState with all repositories initialized
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            book_repo: Arc::new(SeaOrmBookRepository::new(db.clone())),
            copy_repo: Arc::new(SeaOrmCopyRepository::new(db.clone())),
            student_repo: Arc::new(SeaOrmStudentRepository::new(db.clone())),
            metadata_repo: Arc::new(SeaOrmMetadataRepository::new(db.clone())),
            db,
        }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }
}

impl axum::extract::FromRef<AppState> for DatabaseConnection {
    fn from_ref(state: &AppState) -> Self {
        state.db.clone()
    }
}
