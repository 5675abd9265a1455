use chrono::NaiveTime;
use serde::Serialize;
use utoipa::ToSchema;

/// Mark joined with its shift and type, as listed under a record.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct MarkDetail {
    pub id: u64,
    pub attendance_record_id: u64,
    pub shift_id: u64,
    #[schema(example = "Mañana")]
    pub shift_name: String,
    #[schema(example = "06:00:00", value_type = String, format = "time")]
    pub shift_start_time: NaiveTime,
    pub attendance_type_id: u64,
    #[schema(example = "Entrada")]
    pub attendance_type_name: String,
    #[schema(example = "08:00:00", value_type = String, format = "time")]
    pub marked_time: NaiveTime,
}
