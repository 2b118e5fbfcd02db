//! Repository implementations using SeaORM

pub mod book_repository;
pub mod copy_repository;
pub mod metadata_repository;
pub mod student_repository;

pub use book_repository::SeaOrmBookRepository;
pub use copy_repository::SeaOrmCopyRepository;
pub use metadata_repository::SeaOrmMetadataRepository;
pub use student_repository::SeaOrmStudentRepository;
