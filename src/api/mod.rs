pub mod attendance_mark;
pub mod attendance_record;
pub mod attendance_type;
pub mod employee;
pub mod position;
pub mod shift;

use actix_web::HttpResponse;
use chrono::{DateTime, Local, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

use crate::db::{self, Table};
use crate::error::{AppError, AppResult};

#[derive(Debug, Deserialize, ToSchema)]
pub struct BulkDelete {
    #[schema(example = json!([1, 2, 3]))]
    pub ids: Vec<u64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BulkDeleteResponse {
    #[schema(example = 3)]
    pub deleted: u64,
}

/// `(page, per_page, offset)` with page >= 1 and per_page in 1..=100.
pub fn page_bounds(page: Option<u32>, per_page: Option<u32>, default_per_page: u32) -> (u32, u32, u32) {
    let page = page.unwrap_or(1).max(1);
    let per_page = per_page.unwrap_or(default_per_page).clamp(1, 100);
    (page, per_page, (page - 1).saturating_mul(per_page))
}

pub fn message(status: actix_web::http::StatusCode, text: &str) -> HttpResponse {
    HttpResponse::build(status).json(json!({ "message": text }))
}

/// Start of `date` as a UTC timestamp, for `created_at` range filters.
pub fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Start of the day after `date`, exclusive upper bound.
pub fn day_end(date: NaiveDate) -> DateTime<Utc> {
    day_start(date.succ_opt().unwrap_or(date))
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Maps FK RESTRICT failures on delete to 409.
pub fn delete_error(e: sqlx::Error, referenced: &str) -> AppError {
    if db::is_fk_restricted(&e) {
        AppError::Conflict(referenced.to_string())
    } else {
        AppError::Database(e)
    }
}

pub async fn bulk_delete(
    pool: &sqlx::MySqlPool,
    table: Table,
    ids: &[u64],
    referenced: &str,
) -> AppResult<HttpResponse> {
    let deleted = db::delete_many(pool, table, ids)
        .await
        .map_err(|e| delete_error(e, referenced))?;

    tracing::info!(table = %table, requested = ids.len(), deleted, "Bulk delete");
    Ok(HttpResponse::Ok().json(BulkDeleteResponse { deleted }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_bounds_are_clamped() {
        assert_eq!(page_bounds(None, None, 20), (1, 20, 0));
        assert_eq!(page_bounds(Some(0), Some(500), 20), (1, 100, 0));
        assert_eq!(page_bounds(Some(3), Some(10), 20), (3, 10, 20));
        assert_eq!(page_bounds(Some(u32::MAX), Some(100), 20), (u32::MAX, 100, u32::MAX));
    }

    #[test]
    fn day_range_covers_the_whole_day() {
        let date = NaiveDate::from_ymd_opt(2025, 4, 18).unwrap();
        assert_eq!(day_start(date).to_rfc3339(), "2025-04-18T00:00:00+00:00");
        assert_eq!(day_end(date).to_rfc3339(), "2025-04-19T00:00:00+00:00");
    }
}
