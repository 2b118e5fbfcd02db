//! Reporting endpoints. Every handler loads one ledger snapshot and hands it
//! to the pure aggregations in `domain::statistics`.

use axum::{
    Json,
    extract::{Query, State},
};
use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;
use serde::Deserialize;

use super::{parse_opt, parse_opt_date};
use crate::domain::DomainError;
use crate::domain::statistics::{
    self, BorrowingTrends, CategoryStat, CategoryTrend, DailyStat, DateRange, Interval,
    KpiMetrics, LibraryUtilization, OverdueBook, PopularBook, StudentActivity, StudentStat,
};
use crate::domain::validation::validate_limit;
use crate::services::load_snapshot;

const DEFAULT_WINDOW_DAYS: i64 = 30;
const MAX_RANKING: u64 = 100;

/// Reporting window: explicit dates, or the last `days` days
#[derive(Debug, Default, Deserialize)]
pub struct RangeQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub days: Option<i64>,
    pub interval: Option<String>,
    pub limit: Option<u64>,
}

impl RangeQuery {
    fn range(&self, now: DateTime<Utc>) -> Result<DateRange, DomainError> {
        let start = parse_opt_date("start_date", self.start_date.as_deref())?;
        let end = parse_opt_date("end_date", self.end_date.as_deref())?;
        match (start, end, self.days) {
            (None, None, Some(days)) => DateRange::last_days(days, now),
            _ => DateRange::resolve(start, end, DEFAULT_WINDOW_DAYS, now),
        }
    }

    fn limit(&self, default: u64) -> Result<usize, DomainError> {
        Ok(validate_limit(self.limit.unwrap_or(default), MAX_RANKING)? as usize)
    }

    fn interval(&self) -> Result<Interval, DomainError> {
        Ok(parse_opt(self.interval.as_deref())?.unwrap_or_default())
    }
}

#[utoipa::path(
    get,
    path = "/api/statistics/kpi",
    responses(
        (status = 200, description = "Headline circulation numbers", body = KpiMetrics)
    )
)]
pub async fn kpi(State(db): State<DatabaseConnection>) -> Result<Json<KpiMetrics>, DomainError> {
    let snapshot = load_snapshot(&db).await?;
    Ok(Json(statistics::kpi_metrics(&snapshot, Utc::now())))
}

#[utoipa::path(
    get,
    path = "/api/statistics/daily",
    params(
        ("start_date" = Option<String>, Query, description = "YYYY-MM-DD"),
        ("end_date" = Option<String>, Query, description = "YYYY-MM-DD"),
        ("days" = Option<i64>, Query, description = "Trailing window when no dates are given")
    ),
    responses(
        (status = 200, description = "One row per day in range", body = [DailyStat]),
        (status = 400, description = "Invalid range")
    )
)]
pub async fn daily(
    State(db): State<DatabaseConnection>,
    Query(params): Query<RangeQuery>,
) -> Result<Json<Vec<DailyStat>>, DomainError> {
    let range = params.range(Utc::now())?;
    let snapshot = load_snapshot(&db).await?;
    Ok(Json(statistics::daily_stats(&snapshot, &range)))
}

pub async fn categories(
    State(db): State<DatabaseConnection>,
) -> Result<Json<Vec<CategoryStat>>, DomainError> {
    let snapshot = load_snapshot(&db).await?;
    Ok(Json(statistics::category_stats(&snapshot)))
}

pub async fn overdue(
    State(db): State<DatabaseConnection>,
) -> Result<Json<Vec<OverdueBook>>, DomainError> {
    let snapshot = load_snapshot(&db).await?;
    Ok(Json(statistics::overdue_books(&snapshot, Utc::now())))
}

pub async fn students(
    State(db): State<DatabaseConnection>,
) -> Result<Json<Vec<StudentStat>>, DomainError> {
    let snapshot = load_snapshot(&db).await?;
    Ok(Json(statistics::student_stats(&snapshot, Utc::now())))
}

pub async fn popular_books(
    State(db): State<DatabaseConnection>,
    Query(params): Query<RangeQuery>,
) -> Result<Json<Vec<PopularBook>>, DomainError> {
    let range = params.range(Utc::now())?;
    let limit = params.limit(10)?;
    let snapshot = load_snapshot(&db).await?;
    Ok(Json(statistics::popular_books(&snapshot, &range, limit)))
}

pub async fn borrowing_trends(
    State(db): State<DatabaseConnection>,
    Query(params): Query<RangeQuery>,
) -> Result<Json<BorrowingTrends>, DomainError> {
    let now = Utc::now();
    let range = params.range(now)?;
    range.ensure_not_future(now)?;
    let interval = params.interval()?;
    let snapshot = load_snapshot(&db).await?;
    Ok(Json(statistics::borrowing_trends(&snapshot, &range, interval)))
}

pub async fn category_trends(
    State(db): State<DatabaseConnection>,
    Query(params): Query<RangeQuery>,
) -> Result<Json<Vec<CategoryTrend>>, DomainError> {
    let now = Utc::now();
    let range = params.range(now)?;
    range.ensure_not_future(now)?;
    let interval = params.interval()?;
    let snapshot = load_snapshot(&db).await?;
    Ok(Json(statistics::category_trends(&snapshot, &range, interval)))
}

pub async fn student_activity(
    State(db): State<DatabaseConnection>,
    Query(params): Query<RangeQuery>,
) -> Result<Json<Vec<StudentActivity>>, DomainError> {
    let range = params.range(Utc::now())?;
    let limit = params.limit(10)?;
    let snapshot = load_snapshot(&db).await?;
    Ok(Json(statistics::student_activity(&snapshot, &range, limit)))
}

pub async fn library_utilization(
    State(db): State<DatabaseConnection>,
    Query(params): Query<RangeQuery>,
) -> Result<Json<LibraryUtilization>, DomainError> {
    let range = params.range(Utc::now())?;
    let snapshot = load_snapshot(&db).await?;
    Ok(Json(statistics::library_utilization(&snapshot, &range)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_days_apply_only_without_dates() {
        let now = Utc::now();
        let query = RangeQuery {
            days: Some(7),
            ..Default::default()
        };
        let range = query.range(now).unwrap();
        assert_eq!(range.end, now);
        assert_eq!((range.end - range.start).num_days(), 7);

        let query = RangeQuery {
            start_date: Some("not-a-date".into()),
            ..Default::default()
        };
        assert!(query.range(now).is_err());
    }
}
