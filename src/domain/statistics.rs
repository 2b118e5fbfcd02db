//! Reporting aggregations
//!
//! Every report is computed from a [`LibrarySnapshot`] and an explicit `now`,
//! so the numbers are reproducible and can be tested without a database.
//! `services::statistics_service` builds the snapshot.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::str::FromStr;
use utoipa::ToSchema;

use super::DomainError;
use super::lifecycle::{BorrowStatus, CopyStatus, LoanDates, MAX_OPEN_BORROWS, StudentStatus};
use crate::utils::time::{end_of_day, format_date, format_timestamp, start_of_day};

/// Longest period a report may cover.
pub const MAX_RANGE_DAYS: i64 = 365;

#[derive(Debug, Clone)]
pub struct SnapshotBook {
    pub id: i32,
    pub title: String,
    pub author: String,
    pub category_id: i32,
}

#[derive(Debug, Clone)]
pub struct SnapshotCopy {
    pub id: i32,
    pub book_id: i32,
    pub status: CopyStatus,
}

#[derive(Debug, Clone)]
pub struct SnapshotStudent {
    pub matric_number: String,
    pub full_name: String,
    pub email: String,
    pub status: StudentStatus,
}

#[derive(Debug, Clone)]
pub struct SnapshotCategory {
    pub id: i32,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct SnapshotEntry {
    pub id: i32,
    pub copy_id: i32,
    pub matric_number: String,
    pub dates: LoanDates,
}

/// Everything the reports read, loaded in one pass.
#[derive(Debug, Clone, Default)]
pub struct LibrarySnapshot {
    pub books: Vec<SnapshotBook>,
    pub copies: Vec<SnapshotCopy>,
    pub students: Vec<SnapshotStudent>,
    pub categories: Vec<SnapshotCategory>,
    pub ledger: Vec<SnapshotEntry>,
}

struct Lookup<'a> {
    books: HashMap<i32, &'a SnapshotBook>,
    copy_book: HashMap<i32, i32>,
    students: HashMap<&'a str, &'a SnapshotStudent>,
    categories: HashMap<i32, &'a SnapshotCategory>,
}

impl<'a> Lookup<'a> {
    fn new(snapshot: &'a LibrarySnapshot) -> Self {
        Self {
            books: snapshot.books.iter().map(|b| (b.id, b)).collect(),
            copy_book: snapshot.copies.iter().map(|c| (c.id, c.book_id)).collect(),
            students: snapshot
                .students
                .iter()
                .map(|s| (s.matric_number.as_str(), s))
                .collect(),
            categories: snapshot.categories.iter().map(|c| (c.id, c)).collect(),
        }
    }

    fn book_of(&self, entry: &SnapshotEntry) -> Option<&'a SnapshotBook> {
        self.copy_book
            .get(&entry.copy_id)
            .and_then(|book_id| self.books.get(book_id))
            .copied()
    }

    fn category_of(&self, entry: &SnapshotEntry) -> Option<&'a SnapshotCategory> {
        self.book_of(entry)
            .and_then(|book| self.categories.get(&book.category_id))
            .copied()
    }

    fn category_name(&self, category_id: i32) -> String {
        self.categories
            .get(&category_id)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| "Uncategorized".to_string())
    }

    fn student_name(&self, matric: &str) -> String {
        self.students
            .get(matric)
            .map(|s| s.full_name.clone())
            .unwrap_or_else(|| "Unknown".to_string())
    }
}

/// Inclusive reporting window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, DomainError> {
        if start > end {
            return Err(DomainError::Validation(
                "start_date must be on or before end_date".to_string(),
            ));
        }
        if end - start > Duration::days(MAX_RANGE_DAYS) {
            return Err(DomainError::Validation(format!(
                "Date range cannot exceed {} days",
                MAX_RANGE_DAYS
            )));
        }
        Ok(Self { start, end })
    }

    /// Range from optional client dates. A missing end means `now`; a missing
    /// start means `default_days` before the end.
    pub fn resolve(
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        default_days: i64,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let end = end.map(end_of_day).unwrap_or(now);
        let start = start
            .map(start_of_day)
            .unwrap_or(end - Duration::days(default_days));
        Self::new(start, end)
    }

    pub fn last_days(days: i64, now: DateTime<Utc>) -> Result<Self, DomainError> {
        if days < 1 {
            return Err(DomainError::Validation("days must be at least 1".to_string()));
        }
        Self::new(now - Duration::days(days), now)
    }

    pub fn ensure_not_future(&self, now: DateTime<Utc>) -> Result<(), DomainError> {
        let today = now.date_naive();
        if self.start.date_naive() > today || self.end.date_naive() > today {
            return Err(DomainError::Validation(
                "Date range cannot extend into the future".to_string(),
            ));
        }
        Ok(())
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts <= self.end
    }

    pub fn days(&self) -> Vec<NaiveDate> {
        let last = self.end.date_naive();
        let mut day = self.start.date_naive();
        let mut days = Vec::new();
        while day <= last {
            days.push(day);
            match day.succ_opt() {
                Some(next) => day = next,
                None => break,
            }
        }
        days
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    #[default]
    Day,
    Week,
    Month,
}

impl Interval {
    /// Bucket label: the day itself, the Monday starting its week, or `YYYY-MM`.
    pub fn bucket(&self, date: NaiveDate) -> String {
        match self {
            Interval::Day => format_date(date),
            Interval::Week => {
                let offset = date.weekday().num_days_from_monday() as i64;
                format_date(date - Duration::days(offset))
            }
            Interval::Month => date.format("%Y-%m").to_string(),
        }
    }

    pub fn periods(&self, range: &DateRange) -> Vec<String> {
        let mut periods: Vec<String> = Vec::new();
        for day in range.days() {
            let bucket = self.bucket(day);
            if periods.last() != Some(&bucket) {
                periods.push(bucket);
            }
        }
        periods
    }
}

impl FromStr for Interval {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" => Ok(Interval::Day),
            "week" => Ok(Interval::Week),
            "month" => Ok(Interval::Month),
            other => Err(DomainError::Validation(format!(
                "Invalid interval '{}'. Must be one of: day, week, month",
                other
            ))),
        }
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        round1(part as f64 * 100.0 / whole as f64)
    }
}

fn average_days_kept<'a>(entries: impl Iterator<Item = &'a SnapshotEntry>) -> f64 {
    let kept: Vec<f64> = entries.filter_map(|e| e.dates.days_kept()).collect();
    if kept.is_empty() {
        0.0
    } else {
        round1(kept.iter().sum::<f64>() / kept.len() as f64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct KpiMetrics {
    pub total_books: u64,
    pub total_copies: u64,
    pub total_students: u64,
    pub active_borrows: u64,
    pub overdue_books: u64,
    /// Mean days between borrow and return over returned entries.
    pub average_borrow_duration: f64,
    /// Percentage of ledger entries that have been returned.
    pub return_rate: f64,
}

pub fn kpi_metrics(snapshot: &LibrarySnapshot, now: DateTime<Utc>) -> KpiMetrics {
    let total = snapshot.ledger.len() as u64;
    let active = snapshot.ledger.iter().filter(|e| e.dates.is_open()).count() as u64;
    let overdue = snapshot
        .ledger
        .iter()
        .filter(|e| e.dates.is_overdue(now))
        .count() as u64;

    KpiMetrics {
        total_books: snapshot.books.len() as u64,
        total_copies: snapshot.copies.len() as u64,
        total_students: snapshot.students.len() as u64,
        active_borrows: active,
        overdue_books: overdue,
        average_borrow_duration: average_days_kept(snapshot.ledger.iter()),
        return_rate: percentage(total - active, total),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct DailyStat {
    pub date: String,
    pub total_borrows: u64,
    pub total_returns: u64,
    /// Distinct students who borrowed that day.
    pub active_readers: u64,
}

pub fn daily_stats(snapshot: &LibrarySnapshot, range: &DateRange) -> Vec<DailyStat> {
    let mut borrows: HashMap<NaiveDate, u64> = HashMap::new();
    let mut returns: HashMap<NaiveDate, u64> = HashMap::new();
    let mut readers: HashMap<NaiveDate, HashSet<&str>> = HashMap::new();

    for entry in &snapshot.ledger {
        if range.contains(entry.dates.borrow_date) {
            let day = entry.dates.borrow_date.date_naive();
            *borrows.entry(day).or_default() += 1;
            readers
                .entry(day)
                .or_default()
                .insert(entry.matric_number.as_str());
        }
        if let Some(returned) = entry.dates.return_date
            && range.contains(returned)
        {
            *returns.entry(returned.date_naive()).or_default() += 1;
        }
    }

    range
        .days()
        .into_iter()
        .map(|day| DailyStat {
            date: format_date(day),
            total_borrows: borrows.get(&day).copied().unwrap_or(0),
            total_returns: returns.get(&day).copied().unwrap_or(0),
            active_readers: readers.get(&day).map(|r| r.len() as u64).unwrap_or(0),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct CategoryStat {
    pub category_id: i32,
    pub code: String,
    pub category: String,
    pub total_books: u64,
    pub total_copies: u64,
    pub available_books: u64,
    pub borrowed_books: u64,
    /// Ledger entries for copies in this category, all time.
    pub borrow_count: u64,
}

pub fn category_stats(snapshot: &LibrarySnapshot) -> Vec<CategoryStat> {
    let lookup = Lookup::new(snapshot);
    let mut stats: BTreeMap<&str, CategoryStat> = snapshot
        .categories
        .iter()
        .map(|c| {
            (
                c.code.as_str(),
                CategoryStat {
                    category_id: c.id,
                    code: c.code.clone(),
                    category: c.name.clone(),
                    total_books: 0,
                    total_copies: 0,
                    available_books: 0,
                    borrowed_books: 0,
                    borrow_count: 0,
                },
            )
        })
        .collect();

    let code_of = |category_id: i32| lookup.categories.get(&category_id).map(|c| c.code.as_str());

    for book in &snapshot.books {
        if let Some(stat) = code_of(book.category_id).and_then(|code| stats.get_mut(code)) {
            stat.total_books += 1;
        }
    }

    for copy in &snapshot.copies {
        let Some(book) = lookup.books.get(&copy.book_id) else {
            continue;
        };
        if let Some(stat) = code_of(book.category_id).and_then(|code| stats.get_mut(code)) {
            stat.total_copies += 1;
            match copy.status {
                CopyStatus::Available => stat.available_books += 1,
                CopyStatus::Borrowed => stat.borrowed_books += 1,
                _ => {}
            }
        }
    }

    for entry in &snapshot.ledger {
        if let Some(stat) = lookup
            .category_of(entry)
            .and_then(|c| stats.get_mut(c.code.as_str()))
        {
            stat.borrow_count += 1;
        }
    }

    stats.into_values().collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct OverdueBook {
    pub borrow_id: i32,
    pub book_id: i32,
    pub title: String,
    pub copy_id: i32,
    pub student_id: String,
    pub student_name: String,
    pub due_date: String,
    pub days_overdue: i64,
}

/// Open entries past their effective due date, most overdue first.
pub fn overdue_books(snapshot: &LibrarySnapshot, now: DateTime<Utc>) -> Vec<OverdueBook> {
    let lookup = Lookup::new(snapshot);
    let mut overdue: Vec<OverdueBook> = snapshot
        .ledger
        .iter()
        .filter(|e| e.dates.is_overdue(now))
        .map(|e| {
            let book = lookup.book_of(e);
            OverdueBook {
                borrow_id: e.id,
                book_id: book.map(|b| b.id).unwrap_or_default(),
                title: book.map(|b| b.title.clone()).unwrap_or_default(),
                copy_id: e.copy_id,
                student_id: e.matric_number.clone(),
                student_name: lookup.student_name(&e.matric_number),
                due_date: format_timestamp(e.dates.effective_due()),
                days_overdue: e.dates.days_overdue(now),
            }
        })
        .collect();

    overdue.sort_by(|a, b| {
        b.days_overdue
            .cmp(&a.days_overdue)
            .then(a.borrow_id.cmp(&b.borrow_id))
    });
    overdue
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct StudentStat {
    pub student_id: String,
    pub student_name: String,
    pub total_borrows: u64,
    pub active_borrows: u64,
    pub overdue_count: u64,
}

pub fn student_stats(snapshot: &LibrarySnapshot, now: DateTime<Utc>) -> Vec<StudentStat> {
    let mut stats: Vec<StudentStat> = snapshot
        .students
        .iter()
        .map(|s| {
            let entries = snapshot
                .ledger
                .iter()
                .filter(|e| e.matric_number == s.matric_number);
            let (mut total, mut active, mut overdue) = (0, 0, 0);
            for entry in entries {
                total += 1;
                if entry.dates.is_open() {
                    active += 1;
                }
                if entry.dates.is_overdue(now) {
                    overdue += 1;
                }
            }
            StudentStat {
                student_id: s.matric_number.clone(),
                student_name: s.full_name.clone(),
                total_borrows: total,
                active_borrows: active,
                overdue_count: overdue,
            }
        })
        .collect();

    stats.sort_by(|a, b| {
        b.total_borrows
            .cmp(&a.total_borrows)
            .then_with(|| a.student_id.cmp(&b.student_id))
    });
    stats
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PopularBook {
    pub book_id: i32,
    pub title: String,
    pub author: String,
    pub category: String,
    pub available_copies: u64,
    pub total_copies: u64,
    pub borrow_count: u64,
}

/// Books ranked by borrows that started inside `range`.
pub fn popular_books(snapshot: &LibrarySnapshot, range: &DateRange, limit: usize) -> Vec<PopularBook> {
    let lookup = Lookup::new(snapshot);
    let mut counts: HashMap<i32, u64> = HashMap::new();
    for entry in snapshot
        .ledger
        .iter()
        .filter(|e| range.contains(e.dates.borrow_date))
    {
        if let Some(book) = lookup.book_of(entry) {
            *counts.entry(book.id).or_default() += 1;
        }
    }

    let mut ranked: Vec<PopularBook> = counts
        .into_iter()
        .filter_map(|(book_id, borrow_count)| {
            let book = lookup.books.get(&book_id)?;
            let copies = snapshot.copies.iter().filter(|c| c.book_id == book_id);
            let (mut total, mut available) = (0, 0);
            for copy in copies {
                total += 1;
                if copy.status == CopyStatus::Available {
                    available += 1;
                }
            }
            Some(PopularBook {
                book_id,
                title: book.title.clone(),
                author: book.author.clone(),
                category: lookup.category_name(book.category_id),
                available_copies: available,
                total_copies: total,
                borrow_count,
            })
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.borrow_count
            .cmp(&a.borrow_count)
            .then_with(|| a.title.cmp(&b.title))
    });
    ranked.truncate(limit);
    ranked
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub period: String,
    pub borrowings: u64,
    pub returns: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BorrowingTrends {
    pub interval: Interval,
    pub start_date: String,
    pub end_date: String,
    pub total_borrows: u64,
    pub total_returns: u64,
    pub unique_readers: u64,
    pub average_duration: f64,
    pub category_distribution: BTreeMap<String, u64>,
    pub data: Vec<TrendPoint>,
}

pub fn borrowing_trends(
    snapshot: &LibrarySnapshot,
    range: &DateRange,
    interval: Interval,
) -> BorrowingTrends {
    let lookup = Lookup::new(snapshot);
    let mut borrows: HashMap<String, u64> = HashMap::new();
    let mut returns: HashMap<String, u64> = HashMap::new();
    let mut readers: HashSet<&str> = HashSet::new();
    let mut categories: BTreeMap<String, u64> = BTreeMap::new();
    let mut borrowed_in_range: Vec<&SnapshotEntry> = Vec::new();
    let mut total_returns = 0;

    for entry in &snapshot.ledger {
        if range.contains(entry.dates.borrow_date) {
            *borrows
                .entry(interval.bucket(entry.dates.borrow_date.date_naive()))
                .or_default() += 1;
            readers.insert(entry.matric_number.as_str());
            let category = lookup
                .category_of(entry)
                .map(|c| c.name.clone())
                .unwrap_or_else(|| "Uncategorized".to_string());
            *categories.entry(category).or_default() += 1;
            borrowed_in_range.push(entry);
        }
        if let Some(returned) = entry.dates.return_date
            && range.contains(returned)
        {
            *returns.entry(interval.bucket(returned.date_naive())).or_default() += 1;
            total_returns += 1;
        }
    }

    let data = interval
        .periods(range)
        .into_iter()
        .map(|period| TrendPoint {
            borrowings: borrows.get(&period).copied().unwrap_or(0),
            returns: returns.get(&period).copied().unwrap_or(0),
            period,
        })
        .collect();

    BorrowingTrends {
        interval,
        start_date: format_date(range.start.date_naive()),
        end_date: format_date(range.end.date_naive()),
        total_borrows: borrowed_in_range.len() as u64,
        total_returns,
        unique_readers: readers.len() as u64,
        average_duration: average_days_kept(borrowed_in_range.into_iter()),
        category_distribution: categories,
        data,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTrendPoint {
    pub period: String,
    pub borrowings: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTrend {
    pub category_id: i32,
    pub code: String,
    pub category: String,
    pub total_borrows: u64,
    pub data: Vec<CategoryTrendPoint>,
}

/// Per-category borrow series. Categories without borrows in range are omitted.
pub fn category_trends(
    snapshot: &LibrarySnapshot,
    range: &DateRange,
    interval: Interval,
) -> Vec<CategoryTrend> {
    let lookup = Lookup::new(snapshot);
    let mut per_category: HashMap<i32, HashMap<String, u64>> = HashMap::new();

    for entry in snapshot
        .ledger
        .iter()
        .filter(|e| range.contains(e.dates.borrow_date))
    {
        if let Some(category) = lookup.category_of(entry) {
            *per_category
                .entry(category.id)
                .or_default()
                .entry(interval.bucket(entry.dates.borrow_date.date_naive()))
                .or_default() += 1;
        }
    }

    let periods = interval.periods(range);
    let mut trends: Vec<CategoryTrend> = per_category
        .into_iter()
        .filter_map(|(category_id, buckets)| {
            let category = lookup.categories.get(&category_id)?;
            let data: Vec<CategoryTrendPoint> = periods
                .iter()
                .map(|period| CategoryTrendPoint {
                    period: period.clone(),
                    borrowings: buckets.get(period).copied().unwrap_or(0),
                })
                .collect();
            Some(CategoryTrend {
                category_id,
                code: category.code.clone(),
                category: category.name.clone(),
                total_borrows: buckets.values().sum(),
                data,
            })
        })
        .collect();

    trends.sort_by(|a, b| {
        b.total_borrows
            .cmp(&a.total_borrows)
            .then_with(|| a.code.cmp(&b.code))
    });
    trends
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct StudentActivity {
    pub student_id: String,
    pub student_name: String,
    pub borrow_count: u64,
    pub favorite_category: Option<String>,
    pub average_borrow_duration: f64,
    pub return_rate: f64,
}

/// Most active borrowers in `range`. The favourite category is the most
/// borrowed one, ties broken alphabetically.
pub fn student_activity(
    snapshot: &LibrarySnapshot,
    range: &DateRange,
    limit: usize,
) -> Vec<StudentActivity> {
    let lookup = Lookup::new(snapshot);
    let mut per_student: BTreeMap<&str, Vec<&SnapshotEntry>> = BTreeMap::new();
    for entry in snapshot
        .ledger
        .iter()
        .filter(|e| range.contains(e.dates.borrow_date))
    {
        per_student
            .entry(entry.matric_number.as_str())
            .or_default()
            .push(entry);
    }

    let mut activity: Vec<StudentActivity> = per_student
        .into_iter()
        .map(|(matric, entries)| {
            let mut category_counts: BTreeMap<String, u64> = BTreeMap::new();
            for entry in &entries {
                if let Some(category) = lookup.category_of(entry) {
                    *category_counts.entry(category.name.clone()).or_default() += 1;
                }
            }
            let favorite_category = category_counts
                .iter()
                .fold(None::<(&String, u64)>, |best, (name, count)| match best {
                    Some((_, best_count)) if best_count >= *count => best,
                    _ => Some((name, *count)),
                })
                .map(|(name, _)| name.clone());

            let total = entries.len() as u64;
            let returned = entries.iter().filter(|e| !e.dates.is_open()).count() as u64;

            StudentActivity {
                student_id: matric.to_string(),
                student_name: lookup.student_name(matric),
                borrow_count: total,
                favorite_category,
                average_borrow_duration: average_days_kept(entries.iter().copied()),
                return_rate: percentage(returned, total),
            }
        })
        .collect();

    activity.sort_by(|a, b| {
        b.borrow_count
            .cmp(&a.borrow_count)
            .then_with(|| a.student_id.cmp(&b.student_id))
    });
    activity.truncate(limit);
    activity
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LibraryUtilization {
    pub start_date: String,
    pub end_date: String,
    pub total_copies: u64,
    pub borrowed_copies: u64,
    pub available_copies: u64,
    /// Copies neither borrowed nor available (processing, missing...).
    pub unavailable_copies: u64,
    /// Borrowed copies as a percentage of all copies.
    pub utilization_rate: f64,
    /// Copies on loan at the end of each day in range.
    pub daily_utilization: BTreeMap<String, u64>,
}

pub fn library_utilization(snapshot: &LibrarySnapshot, range: &DateRange) -> LibraryUtilization {
    let total = snapshot.copies.len() as u64;
    let borrowed = snapshot
        .copies
        .iter()
        .filter(|c| c.status == CopyStatus::Borrowed)
        .count() as u64;
    let available = snapshot
        .copies
        .iter()
        .filter(|c| c.status == CopyStatus::Available)
        .count() as u64;

    let daily_utilization = range
        .days()
        .into_iter()
        .map(|day| {
            let cutoff = end_of_day(day).min(range.end);
            let on_loan = snapshot
                .ledger
                .iter()
                .filter(|e| {
                    e.dates.borrow_date <= cutoff
                        && e.dates.return_date.is_none_or(|returned| returned > cutoff)
                })
                .count() as u64;
            (format_date(day), on_loan)
        })
        .collect();

    LibraryUtilization {
        start_date: format_date(range.start.date_naive()),
        end_date: format_date(range.end.date_naive()),
        total_copies: total,
        borrowed_copies: borrowed,
        available_copies: available,
        unavailable_copies: total - borrowed - available,
        utilization_rate: percentage(borrowed, total),
        daily_utilization,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedBook {
    pub book_id: i32,
    pub title: String,
    pub borrow_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedStudent {
    pub matric_number: String,
    pub full_name: String,
    pub borrow_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BorrowingSummary {
    pub start_date: String,
    pub end_date: String,
    pub category_id: Option<i32>,
    pub total_borrowings: u64,
    pub active_borrowings: u64,
    pub overdue_borrowings: u64,
    pub average_days_kept: f64,
    pub most_borrowed_books: Vec<RankedBook>,
    pub most_active_students: Vec<RankedStudent>,
    pub borrowings_by_month: BTreeMap<String, u64>,
}

const SUMMARY_TOP: usize = 10;

/// Circulation summary for borrows started in `range`, optionally limited to
/// one category.
pub fn borrowing_summary(
    snapshot: &LibrarySnapshot,
    range: &DateRange,
    category_id: Option<i32>,
    now: DateTime<Utc>,
) -> BorrowingSummary {
    let lookup = Lookup::new(snapshot);
    let entries: Vec<&SnapshotEntry> = snapshot
        .ledger
        .iter()
        .filter(|e| range.contains(e.dates.borrow_date))
        .filter(|e| match category_id {
            Some(wanted) => lookup.book_of(e).is_some_and(|b| b.category_id == wanted),
            None => true,
        })
        .collect();

    let mut per_book: HashMap<i32, u64> = HashMap::new();
    let mut per_student: HashMap<&str, u64> = HashMap::new();
    let mut by_month: BTreeMap<String, u64> = BTreeMap::new();
    for entry in &entries {
        if let Some(book) = lookup.book_of(entry) {
            *per_book.entry(book.id).or_default() += 1;
        }
        *per_student.entry(entry.matric_number.as_str()).or_default() += 1;
        *by_month
            .entry(Interval::Month.bucket(entry.dates.borrow_date.date_naive()))
            .or_default() += 1;
    }

    let mut most_borrowed_books: Vec<RankedBook> = per_book
        .into_iter()
        .filter_map(|(book_id, borrow_count)| {
            lookup.books.get(&book_id).map(|b| RankedBook {
                book_id,
                title: b.title.clone(),
                borrow_count,
            })
        })
        .collect();
    most_borrowed_books.sort_by(|a, b| {
        b.borrow_count
            .cmp(&a.borrow_count)
            .then_with(|| a.title.cmp(&b.title))
    });
    most_borrowed_books.truncate(SUMMARY_TOP);

    let mut most_active_students: Vec<RankedStudent> = per_student
        .into_iter()
        .map(|(matric, borrow_count)| RankedStudent {
            matric_number: matric.to_string(),
            full_name: lookup.student_name(matric),
            borrow_count,
        })
        .collect();
    most_active_students.sort_by(|a, b| {
        b.borrow_count
            .cmp(&a.borrow_count)
            .then_with(|| a.matric_number.cmp(&b.matric_number))
    });
    most_active_students.truncate(SUMMARY_TOP);

    BorrowingSummary {
        start_date: format_date(range.start.date_naive()),
        end_date: format_date(range.end.date_naive()),
        category_id,
        total_borrowings: entries.len() as u64,
        active_borrowings: entries.iter().filter(|e| e.dates.is_open()).count() as u64,
        overdue_borrowings: entries.iter().filter(|e| e.dates.is_overdue(now)).count() as u64,
        average_days_kept: average_days_kept(entries.iter().copied()),
        most_borrowed_books,
        most_active_students,
        borrowings_by_month: by_month,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentBorrow {
    pub borrow_id: i32,
    pub copy_id: i32,
    pub book_title: String,
    pub borrow_date: String,
    pub due_date: String,
    pub return_date: Option<String>,
    pub status: BorrowStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentSummary {
    pub matric_number: String,
    pub full_name: String,
    pub email: String,
    pub status: StudentStatus,
    pub can_borrow: bool,
    pub total_borrowings: u64,
    pub active_borrowings: u64,
    pub overdue_borrowings: u64,
    pub returned_borrowings: u64,
    pub average_days_kept: f64,
    pub recent_history: Vec<RecentBorrow>,
}

const RECENT_HISTORY: usize = 5;

pub fn student_summary(
    snapshot: &LibrarySnapshot,
    matric_number: &str,
    now: DateTime<Utc>,
) -> Option<StudentSummary> {
    let lookup = Lookup::new(snapshot);
    let student = lookup.students.get(matric_number)?;
    let mut entries: Vec<&SnapshotEntry> = snapshot
        .ledger
        .iter()
        .filter(|e| e.matric_number == matric_number)
        .collect();
    entries.sort_by(|a, b| {
        b.dates
            .borrow_date
            .cmp(&a.dates.borrow_date)
            .then(b.id.cmp(&a.id))
    });

    let active = entries.iter().filter(|e| e.dates.is_open()).count() as u64;
    let overdue = entries.iter().filter(|e| e.dates.is_overdue(now)).count() as u64;

    let recent_history = entries
        .iter()
        .take(RECENT_HISTORY)
        .map(|e| RecentBorrow {
            borrow_id: e.id,
            copy_id: e.copy_id,
            book_title: lookup.book_of(e).map(|b| b.title.clone()).unwrap_or_default(),
            borrow_date: format_timestamp(e.dates.borrow_date),
            due_date: format_timestamp(e.dates.effective_due()),
            return_date: e.dates.return_date.map(format_timestamp),
            status: e.dates.status(now),
        })
        .collect();

    Some(StudentSummary {
        matric_number: student.matric_number.clone(),
        full_name: student.full_name.clone(),
        email: student.email.clone(),
        status: student.status,
        can_borrow: student.status != StudentStatus::Suspended && active < MAX_OPEN_BORROWS,
        total_borrowings: entries.len() as u64,
        active_borrowings: active,
        overdue_borrowings: overdue,
        returned_borrowings: entries.len() as u64 - active,
        average_days_kept: average_days_kept(entries.iter().copied()),
        recent_history,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, month, day, 10, 0, 0).unwrap()
    }

    fn entry(id: i32, copy_id: i32, matric: &str, borrowed: DateTime<Utc>, returned: Option<DateTime<Utc>>) -> SnapshotEntry {
        SnapshotEntry {
            id,
            copy_id,
            matric_number: matric.to_string(),
            dates: LoanDates {
                borrow_date: borrowed,
                due_date: borrowed + Duration::days(14),
                extension_date: None,
                return_date: returned,
            },
        }
    }

    fn student(matric: &str, name: &str) -> SnapshotStudent {
        SnapshotStudent {
            matric_number: matric.to_string(),
            full_name: name.to_string(),
            email: format!("{}@uni.edu", matric.to_lowercase()),
            status: StudentStatus::Active,
        }
    }

    /// Two categories, three books, four copies, five ledger entries.
    fn sample() -> LibrarySnapshot {
        LibrarySnapshot {
            categories: vec![
                SnapshotCategory { id: 1, code: "005".into(), name: "Computing".into() },
                SnapshotCategory { id: 2, code: "823".into(), name: "Fiction".into() },
            ],
            books: vec![
                SnapshotBook { id: 1, title: "Rust in Action".into(), author: "McNamara".into(), category_id: 1 },
                SnapshotBook { id: 2, title: "Dune".into(), author: "Herbert".into(), category_id: 2 },
                SnapshotBook { id: 3, title: "Emma".into(), author: "Austen".into(), category_id: 2 },
            ],
            copies: vec![
                SnapshotCopy { id: 10, book_id: 1, status: CopyStatus::Borrowed },
                SnapshotCopy { id: 11, book_id: 1, status: CopyStatus::Available },
                SnapshotCopy { id: 20, book_id: 2, status: CopyStatus::Borrowed },
                SnapshotCopy { id: 30, book_id: 3, status: CopyStatus::Missing },
            ],
            students: vec![student("A0000001A", "Ada"), student("A0000002B", "Grace")],
            ledger: vec![
                entry(1, 11, "A0000001A", at(3, 1), Some(at(3, 5))),
                entry(2, 20, "A0000001A", at(3, 2), Some(at(3, 4))),
                entry(3, 11, "A0000002B", at(3, 10), Some(at(3, 20))),
                entry(4, 10, "A0000002B", at(3, 25), None),
                entry(5, 20, "A0000001A", at(4, 1), None),
            ],
        }
    }

    #[test]
    fn kpis_never_count_returned_entries_as_active() {
        let now = at(4, 9);
        let kpi = kpi_metrics(&sample(), now);
        assert_eq!(kpi.total_books, 3);
        assert_eq!(kpi.total_copies, 4);
        assert_eq!(kpi.active_borrows, 2);
        // entry 4 was due on 8 April, entry 5 is due on 15 April
        assert_eq!(kpi.overdue_books, 1);
        assert_eq!(kpi.return_rate, 60.0);
        // kept 4, 2 and 10 days
        assert_eq!(kpi.average_borrow_duration, 5.3);
    }

    #[test]
    fn overdue_list_matches_kpi() {
        let snapshot = sample();
        let now = at(4, 20);
        let overdue = overdue_books(&snapshot, now);
        assert_eq!(overdue.len() as u64, kpi_metrics(&snapshot, now).overdue_books);
        assert_eq!(overdue[0].borrow_id, 4);
        assert_eq!(overdue[0].days_overdue, 12);
        assert_eq!(overdue[0].student_name, "Grace");
        assert_eq!(overdue[1].title, "Dune");
    }

    #[test]
    fn daily_stats_fill_every_day() {
        let range = DateRange::new(at(3, 1), at(3, 5)).unwrap();
        let days = daily_stats(&sample(), &range);
        assert_eq!(days.len(), 5);
        assert_eq!(days[0].date, "2024-03-01");
        assert_eq!(days[0].total_borrows, 1);
        assert_eq!(days[2].total_borrows, 0);
        assert_eq!(days[3].total_returns, 1);
        assert_eq!(days[4].total_returns, 1);
        assert_eq!(days[1].active_readers, 1);
    }

    #[test]
    fn category_stats_count_copies_not_joins() {
        let stats = category_stats(&sample());
        let computing = &stats[0];
        assert_eq!(computing.category, "Computing");
        assert_eq!(computing.total_books, 1);
        assert_eq!(computing.total_copies, 2);
        assert_eq!(computing.available_books, 1);
        assert_eq!(computing.borrowed_books, 1);
        assert_eq!(computing.borrow_count, 3);

        let fiction = &stats[1];
        assert_eq!(fiction.total_books, 2);
        assert_eq!(fiction.available_books, 0);
        assert_eq!(fiction.borrow_count, 2);
    }

    #[test]
    fn popular_books_rank_by_borrows_in_range() {
        let range = DateRange::new(at(3, 1), at(4, 30)).unwrap();
        let popular = popular_books(&sample(), &range, 10);
        assert_eq!(popular[0].title, "Rust in Action");
        assert_eq!(popular[0].borrow_count, 3);
        assert_eq!(popular[0].available_copies, 1);
        assert_eq!(popular[1].title, "Dune");
        assert_eq!(popular.len(), 2);

        let narrow = DateRange::new(at(4, 1), at(4, 2)).unwrap();
        let popular = popular_books(&sample(), &narrow, 10);
        assert_eq!(popular.len(), 1);
        assert_eq!(popular[0].title, "Dune");
    }

    #[test]
    fn weekly_buckets_start_on_monday() {
        // 2024-03-06 is a Wednesday
        let wednesday = NaiveDate::from_ymd_opt(2024, 3, 6).unwrap();
        assert_eq!(Interval::Week.bucket(wednesday), "2024-03-04");
        assert_eq!(Interval::Month.bucket(wednesday), "2024-03");
        assert!("fortnight".parse::<Interval>().is_err());
    }

    #[test]
    fn monthly_trends_cover_the_range() {
        let range = DateRange::new(at(3, 1), at(4, 9)).unwrap();
        let trends = borrowing_trends(&sample(), &range, Interval::Month);
        assert_eq!(trends.data.len(), 2);
        assert_eq!(trends.data[0].period, "2024-03");
        assert_eq!(trends.data[0].borrowings, 4);
        assert_eq!(trends.data[0].returns, 3);
        assert_eq!(trends.data[1].borrowings, 1);
        assert_eq!(trends.total_borrows, 5);
        assert_eq!(trends.unique_readers, 2);
        assert_eq!(trends.category_distribution.get("Fiction"), Some(&2));
    }

    #[test]
    fn category_trends_are_per_category() {
        let range = DateRange::new(at(3, 1), at(4, 9)).unwrap();
        let trends = category_trends(&sample(), &range, Interval::Month);
        assert_eq!(trends.len(), 2);
        assert_eq!(trends[0].category, "Computing");
        assert_eq!(trends[0].total_borrows, 3);
        assert_eq!(trends[1].data[1].borrowings, 1);
    }

    #[test]
    fn student_activity_picks_favorite_category() {
        let range = DateRange::new(at(3, 1), at(4, 9)).unwrap();
        let activity = student_activity(&sample(), &range, 10);
        assert_eq!(activity[0].student_id, "A0000001A");
        assert_eq!(activity[0].borrow_count, 3);
        assert_eq!(activity[0].favorite_category.as_deref(), Some("Fiction"));
        assert_eq!(activity[1].favorite_category.as_deref(), Some("Computing"));
        assert_eq!(activity[1].return_rate, 50.0);
    }

    #[test]
    fn utilization_tracks_copies_on_loan_per_day() {
        let range = DateRange::new(at(3, 24), at(3, 26)).unwrap();
        let util = library_utilization(&sample(), &range);
        assert_eq!(util.total_copies, 4);
        assert_eq!(util.borrowed_copies, 2);
        assert_eq!(util.available_copies, 1);
        assert_eq!(util.unavailable_copies, 1);
        assert_eq!(util.utilization_rate, 50.0);
        assert_eq!(util.daily_utilization.get("2024-03-24"), Some(&0));
        assert_eq!(util.daily_utilization.get("2024-03-25"), Some(&1));
    }

    #[test]
    fn summary_can_be_limited_to_one_category() {
        let range = DateRange::new(at(3, 1), at(4, 9)).unwrap();
        let all = borrowing_summary(&sample(), &range, None, at(4, 9));
        assert_eq!(all.total_borrowings, 5);
        assert_eq!(all.most_borrowed_books[0].title, "Rust in Action");
        assert_eq!(all.borrowings_by_month.get("2024-04"), Some(&1));

        let fiction = borrowing_summary(&sample(), &range, Some(2), at(4, 9));
        assert_eq!(fiction.total_borrowings, 2);
        assert_eq!(fiction.active_borrowings, 1);
        assert_eq!(fiction.most_active_students[0].full_name, "Ada");
    }

    #[test]
    fn student_summary_lists_recent_history_first() {
        let summary = student_summary(&sample(), "A0000001A", at(4, 9)).unwrap();
        assert_eq!(summary.total_borrowings, 3);
        assert_eq!(summary.active_borrowings, 1);
        assert_eq!(summary.returned_borrowings, 2);
        assert!(summary.can_borrow);
        assert_eq!(summary.recent_history[0].borrow_id, 5);
        assert_eq!(summary.recent_history[0].status, BorrowStatus::Borrowed);
        assert!(student_summary(&sample(), "A9999999Z", at(4, 9)).is_none());
    }

    #[test]
    fn date_ranges_are_validated() {
        assert!(DateRange::new(at(3, 2), at(3, 1)).is_err());
        assert!(DateRange::new(at(1, 1), at(1, 1) + Duration::days(366)).is_err());

        let now = at(4, 9);
        let range = DateRange::resolve(None, None, 30, now).unwrap();
        assert_eq!(range.end, now);
        assert_eq!(range.start, now - Duration::days(30));

        let tomorrow = NaiveDate::from_ymd_opt(2024, 4, 10).unwrap();
        let future = DateRange::resolve(None, Some(tomorrow), 30, now).unwrap();
        assert!(future.ensure_not_future(now).is_err());
        assert!(range.ensure_not_future(now).is_ok());
    }
}
