//! Circulation rules
//!
//! Pure decisions about borrowing, returning and extending. Nothing here
//! touches the database: `services::borrowing_service` loads the rows, asks
//! these functions whether the transition is allowed and applies it inside
//! one transaction.
//!
//! Copy state machine:
//!
//! ```text
//!   available --borrow--> borrowed --return--> available
//! ```
//!
//! `overdue` and `extended` are never stored; they are derived from the
//! ledger dates at read time.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::DomainError;

/// A student may hold at most this many unreturned copies.
pub const MAX_OPEN_BORROWS: u64 = 3;
pub const DEFAULT_LOAN_DAYS: i64 = 14;
pub const MIN_LOAN_DAYS: i64 = 14;
pub const MAX_LOAN_DAYS: i64 = 30;
pub const DEFAULT_EXTENSION_DAYS: i64 = 14;
pub const MAX_EXTENSION_DAYS: i64 = 30;

const SECONDS_PER_DAY: i64 = 86_400;

macro_rules! status_enum {
    ($(#[$meta:meta])* $name:ident, $label:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    other => Err(DomainError::Validation(format!(
                        "Invalid {} '{}'. Must be one of: {}",
                        $label,
                        other,
                        [$($text),+].join(", ")
                    ))),
                }
            }
        }
    };
}

status_enum!(
    /// Shelf state of a physical copy.
    CopyStatus, "copy status" {
        Available => "available",
        Borrowed => "borrowed",
        Processing => "processing",
        Missing => "missing",
        Damaged => "damaged",
        Unpublished => "unpublished",
    }
);

status_enum!(
    CopyCondition, "condition" {
        New => "new",
        Good => "good",
        Fair => "fair",
        Poor => "poor",
        Damaged => "damaged",
    }
);

status_enum!(
    AcquisitionType, "acquisition type" {
        Purchased => "purchased",
        Donated => "donated",
    }
);

status_enum!(
    /// Borrowing eligibility of a student. Only `suspended` blocks borrowing.
    StudentStatus, "student status" {
        Active => "active",
        Inactive => "inactive",
        Suspended => "suspended",
    }
);

status_enum!(
    /// Derived state of a ledger entry.
    BorrowStatus, "borrow status" {
        Borrowed => "borrowed",
        Extended => "extended",
        Returned => "returned",
        Overdue => "overdue",
    }
);

/// Student identifier: `A`, seven digits, one letter (e.g. `A0123456X`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MatricNumber(String);

impl MatricNumber {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let candidate = raw.trim();
        let bytes = candidate.as_bytes();
        let valid = bytes.len() == 9
            && bytes[0] == b'A'
            && bytes[1..8].iter().all(u8::is_ascii_digit)
            && bytes[8].is_ascii_alphabetic();

        if valid {
            Ok(Self(candidate.to_string()))
        } else {
            Err(DomainError::Validation(format!(
                "Invalid matric number '{}'. Expected 'A' followed by 7 digits and a letter (e.g. A0123456X)",
                candidate
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for MatricNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The dates of one ledger entry, already parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoanDates {
    pub borrow_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    /// Extended due date. Always later than `due_date` when present.
    pub extension_date: Option<DateTime<Utc>>,
    pub return_date: Option<DateTime<Utc>>,
}

impl LoanDates {
    pub fn effective_due(&self) -> DateTime<Utc> {
        self.extension_date.unwrap_or(self.due_date)
    }

    pub fn is_open(&self) -> bool {
        self.return_date.is_none()
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.is_open() && now > self.effective_due()
    }

    pub fn status(&self, now: DateTime<Utc>) -> BorrowStatus {
        if !self.is_open() {
            BorrowStatus::Returned
        } else if self.is_overdue(now) {
            BorrowStatus::Overdue
        } else if self.extension_date.is_some() {
            BorrowStatus::Extended
        } else {
            BorrowStatus::Borrowed
        }
    }

    /// Whole days left until the effective due date, rounded down.
    /// Negative once overdue, zero once returned.
    pub fn days_remaining(&self, now: DateTime<Utc>) -> i64 {
        if !self.is_open() {
            return 0;
        }
        floor_days(self.effective_due() - now)
    }

    pub fn days_overdue(&self, now: DateTime<Utc>) -> i64 {
        if !self.is_overdue(now) {
            return 0;
        }
        floor_days(now - self.effective_due())
    }

    /// Fractional days between borrow and return, for returned entries.
    pub fn days_kept(&self) -> Option<f64> {
        self.return_date
            .map(|returned| (returned - self.borrow_date).num_seconds() as f64 / SECONDS_PER_DAY as f64)
    }
}

fn floor_days(span: Duration) -> i64 {
    span.num_seconds().div_euclid(SECONDS_PER_DAY)
}

/// Student-side preconditions of a borrow.
pub fn check_borrow_eligibility(
    full_name: &str,
    status: StudentStatus,
    open_borrows: u64,
) -> Result<(), DomainError> {
    if status == StudentStatus::Suspended {
        return Err(DomainError::Forbidden(format!(
            "Student {} is suspended and cannot borrow books",
            full_name
        )));
    }
    if open_borrows >= MAX_OPEN_BORROWS {
        return Err(DomainError::BorrowLimitExceeded(format!(
            "Student {} has reached maximum borrowing limit ({})",
            full_name, MAX_OPEN_BORROWS
        )));
    }
    Ok(())
}

pub fn check_copy_borrowable(copy_id: i32, status: CopyStatus) -> Result<(), DomainError> {
    if status != CopyStatus::Available {
        return Err(DomainError::CopyUnavailable(format!(
            "Book copy {} is not available (current status: {})",
            copy_id, status
        )));
    }
    Ok(())
}

/// Due date of a new borrow. `loan_days` defaults to 14 and must stay in 14..=30.
pub fn loan_due_date(
    borrow_date: DateTime<Utc>,
    loan_days: Option<i64>,
) -> Result<DateTime<Utc>, DomainError> {
    let days = loan_days.unwrap_or(DEFAULT_LOAN_DAYS);
    if !(MIN_LOAN_DAYS..=MAX_LOAN_DAYS).contains(&days) {
        return Err(DomainError::Validation(format!(
            "loan_days must be between {} and {}",
            MIN_LOAN_DAYS, MAX_LOAN_DAYS
        )));
    }
    Ok(borrow_date + Duration::days(days))
}

/// Return timestamp for an open entry. Never earlier than the borrow date.
pub fn plan_return(dates: &LoanDates, now: DateTime<Utc>) -> Result<DateTime<Utc>, DomainError> {
    if let Some(returned) = dates.return_date {
        return Err(DomainError::AlreadyReturned(format!(
            "Book has already been returned on {}",
            returned.format("%Y-%m-%d %H:%M")
        )));
    }
    Ok(now.max(dates.borrow_date))
}

/// New due date for a one-time extension of `days` (default 14, 1..=30)
/// counted from the original due date.
pub fn plan_extension(dates: &LoanDates, days: Option<i64>) -> Result<DateTime<Utc>, DomainError> {
    let days = days.unwrap_or(DEFAULT_EXTENSION_DAYS);
    if !(1..=MAX_EXTENSION_DAYS).contains(&days) {
        return Err(DomainError::Validation(format!(
            "Extension days must be between 1 and {}",
            MAX_EXTENSION_DAYS
        )));
    }
    if dates.return_date.is_some() {
        return Err(DomainError::AlreadyReturned(
            "Cannot extend a returned book".to_string(),
        ));
    }
    if dates.extension_date.is_some() {
        return Err(DomainError::AlreadyExtended(
            "Book has already been extended once".to_string(),
        ));
    }
    Ok(dates.due_date + Duration::days(days))
}

/// Status edits made through the inventory endpoints. `borrowed` is owned
/// by the borrowing engine: it can neither be set nor cleared by hand.
pub fn check_manual_status_change(
    current: CopyStatus,
    requested: CopyStatus,
) -> Result<(), DomainError> {
    if current == requested {
        return Ok(());
    }
    if requested == CopyStatus::Borrowed {
        return Err(DomainError::InvalidState(
            "Copies become borrowed only through a borrowing record".to_string(),
        ));
    }
    if current == CopyStatus::Borrowed {
        return Err(DomainError::InvalidState(
            "Copy is currently borrowed; return it before changing its status".to_string(),
        ));
    }
    Ok(())
}
