pub mod author;
pub mod book;
pub mod borrowing_record;
pub mod category;
pub mod copy;
pub mod language;
pub mod publisher;
pub mod student;
pub mod user;
