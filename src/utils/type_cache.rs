use moka::future::Cache;
use once_cell::sync::Lazy;
use sqlx::MySqlPool;
use std::time::Duration;

use crate::model::attendance_type::{ENTRY_TYPE_NAME, EXIT_TYPE_NAME};

/// attendance type name (lowercase) => id
static TYPE_IDS: Lazy<Cache<String, u64>> = Lazy::new(|| {
    Cache::builder()
        .max_capacity(64)
        .time_to_live(Duration::from_secs(3600))
        .build()
});

#[inline]
fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

pub async fn get(name: &str) -> Option<u64> {
    TYPE_IDS.get(&normalize(name)).await
}

pub async fn put(name: &str, id: u64) {
    TYPE_IDS.insert(normalize(name), id).await;
}

/// Drop every cached id; called after any attendance type write.
pub fn invalidate() {
    TYPE_IDS.invalidate_all();
}

/// Load the seeded entry/exit type ids so the first reconciliation
/// doesn't pay for the lookups.
pub async fn warmup(pool: &MySqlPool) -> anyhow::Result<()> {
    let rows = sqlx::query_as::<_, (u64, String)>(
        "SELECT id, name FROM attendance_types WHERE name IN (?, ?)",
    )
    .bind(ENTRY_TYPE_NAME)
    .bind(EXIT_TYPE_NAME)
    .fetch_all(pool)
    .await?;

    for (id, name) in &rows {
        put(name, *id).await;
    }

    log::info!("Attendance type cache warmup complete: {} types", rows.len());
    Ok(())
}
