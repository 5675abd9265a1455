use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(example = json!({
    "id": 3,
    "name": "Noche",
    "description": "Turno de noche",
    "start_time": "20:00:00",
    "end_time": "06:00:00",
    "created_at": "2025-04-18T01:02:54Z",
    "updated_at": "2025-04-18T01:02:54Z"
}))]
pub struct Shift {
    pub id: u64,
    pub name: String,
    #[schema(nullable = true)]
    pub description: Option<String>,
    #[schema(value_type = String, format = "time")]
    pub start_time: NaiveTime,
    #[schema(value_type = String, format = "time")]
    pub end_time: NaiveTime,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String, format = "date-time")]
    pub updated_at: DateTime<Utc>,
}

impl Shift {
    /// A shift whose end falls before its start runs past midnight.
    pub fn is_overnight(&self) -> bool {
        self.end_time < self.start_time
    }
}
