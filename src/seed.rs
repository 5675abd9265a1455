//! Startup seeders. Safe to run on every boot.

use anyhow::{Context, Result};
use chrono::NaiveTime;
use sqlx::MySqlPool;
use tracing::info;

use crate::auth::handlers::ensure_user;
use crate::config::Config;
use crate::model::attendance_type::{ENTRY_TYPE_NAME, EXIT_TYPE_NAME};

pub const ATTENDANCE_TYPES: [(&str, &str); 2] = [
    (ENTRY_TYPE_NAME, "Marcación de entrada"),
    (EXIT_TYPE_NAME, "Marcación de salida"),
];

/// name, description, start, end
pub const SHIFTS: [(&str, &str, (u32, u32), (u32, u32)); 3] = [
    ("Mañana", "Turno de mañana", (6, 0), (12, 30)),
    ("Tarde", "Turno de tarde", (14, 0), (16, 30)),
    ("Noche", "Turno de noche", (20, 0), (6, 0)),
];

fn hm((h, m): (u32, u32)) -> Result<NaiveTime> {
    NaiveTime::from_hms_opt(h, m, 0).with_context(|| format!("invalid seed time {h}:{m}"))
}

pub async fn run(pool: &MySqlPool, config: &Config) -> Result<()> {
    for (name, description) in ATTENDANCE_TYPES {
        sqlx::query(
            r#"
            INSERT INTO attendance_types (name, description) VALUES (?, ?)
            ON DUPLICATE KEY UPDATE description = VALUES(description)
            "#,
        )
        .bind(name)
        .bind(description)
        .execute(pool)
        .await
        .with_context(|| format!("Failed to seed attendance type {name}"))?;
    }

    for (name, description, start, end) in SHIFTS {
        // edited hours are kept
        sqlx::query(
            r#"
            INSERT INTO shifts (name, description, start_time, end_time) VALUES (?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE description = description
            "#,
        )
        .bind(name)
        .bind(description)
        .bind(hm(start)?)
        .bind(hm(end)?)
        .execute(pool)
        .await
        .with_context(|| format!("Failed to seed shift {name}"))?;
    }

    if let (Some(username), Some(password)) = (&config.admin_username, &config.admin_password) {
        if ensure_user(pool, username, password).await? {
            info!(%username, "Admin user created");
        }
    }

    info!(
        attendance_types = ATTENDANCE_TYPES.len(),
        shifts = SHIFTS.len(),
        "Seeders finished"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_times_are_valid() {
        for (_, _, start, end) in SHIFTS {
            assert!(hm(start).is_ok());
            assert!(hm(end).is_ok());
        }
    }

    #[test]
    fn night_shift_runs_past_midnight() {
        let (_, _, start, end) = SHIFTS[2];
        assert!(hm(end).unwrap() < hm(start).unwrap());
    }

    #[test]
    fn seeded_type_names_match_the_mark_rules() {
        let names: Vec<&str> = ATTENDANCE_TYPES.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, [ENTRY_TYPE_NAME, EXIT_TYPE_NAME]);
    }
}
