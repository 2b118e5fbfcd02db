//! Domain layer - Pure business abstractions
//!
//! Circulation rules, reporting aggregations, validation, repository
//! traits and the domain error type. Nothing here talks to the database
//! or to HTTP.

pub mod errors;
pub mod lifecycle;
pub mod repositories;
pub mod statistics;
pub mod validation;

pub use errors::DomainError;
pub use lifecycle::{
    AcquisitionType, BorrowStatus, CopyCondition, CopyStatus, LoanDates, MatricNumber,
    StudentStatus,
};
pub use repositories::*;
