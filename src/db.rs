use anyhow::{Context, Result};
use sqlx::MySqlPool;
use sqlx::mysql::MySqlPoolOptions;

use crate::config::Config;

pub async fn init_db(config: &Config) -> Result<MySqlPool> {
    let pool = MySqlPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    Ok(pool)
}

/// Constraint failures the handlers turn into client errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    /// Duplicate key on insert/update.
    Unique,
    /// Row is still referenced by a RESTRICT foreign key.
    Restricted,
    /// Referenced parent row does not exist.
    MissingParent,
}

impl Violation {
    pub fn from_mysql_code(code: u16) -> Option<Self> {
        match code {
            1062 => Some(Violation::Unique),
            1451 | 1217 => Some(Violation::Restricted),
            1452 | 1216 => Some(Violation::MissingParent),
            _ => None,
        }
    }
}

pub fn violation(e: &sqlx::Error) -> Option<Violation> {
    mysql_error_code(e).and_then(Violation::from_mysql_code)
}

pub fn is_unique_violation(e: &sqlx::Error) -> bool {
    violation(e) == Some(Violation::Unique)
}

pub fn is_fk_restricted(e: &sqlx::Error) -> bool {
    violation(e) == Some(Violation::Restricted)
}

pub fn is_fk_missing_parent(e: &sqlx::Error) -> bool {
    violation(e) == Some(Violation::MissingParent)
}

fn mysql_error_code(e: &sqlx::Error) -> Option<u16> {
    match e {
        sqlx::Error::Database(db_err) => db_err
            .try_downcast_ref::<sqlx::mysql::MySqlDatabaseError>()
            .map(|my| my.number()),
        _ => None,
    }
}

/// Tables that accept bulk deletes. Keeps table names out of user input.
#[derive(Debug, Clone, Copy, strum_macros::Display, strum_macros::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Table {
    Positions,
    Employees,
    Shifts,
    AttendanceTypes,
    AttendanceRecords,
}

/// `DELETE ... WHERE id IN (...)`; returns the number of rows removed.
pub async fn delete_many(
    pool: &MySqlPool,
    table: Table,
    ids: &[u64],
) -> Result<u64, sqlx::Error> {
    if ids.is_empty() {
        return Ok(0);
    }

    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!("DELETE FROM {} WHERE id IN ({})", table.as_ref(), placeholders);

    let mut query = sqlx::query(&sql);
    for id in ids {
        query = query.bind(*id);
    }

    let result = query.execute(pool).await?;
    Ok(result.rows_affected())
}

/// Row builders for tests that run against a migrated database.
#[cfg(test)]
pub mod fixtures {
    use chrono::NaiveTime;
    use sqlx::MySqlPool;

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    pub async fn position(pool: &MySqlPool, name: &str) -> u64 {
        sqlx::query("INSERT INTO positions (name) VALUES (?)")
            .bind(name)
            .execute(pool)
            .await
            .unwrap()
            .last_insert_id()
    }

    pub async fn employee(pool: &MySqlPool, position_id: u64, dni: &str, phone: &str) -> u64 {
        sqlx::query(
            r#"
            INSERT INTO employees
                (dni, paternal_surname, maternal_surname, names, position_id, date_of_birth, phone)
            VALUES (?, 'Quispe', 'Huamán', 'María Elena', ?, '1990-05-14', ?)
            "#,
        )
        .bind(dni)
        .bind(position_id)
        .bind(phone)
        .execute(pool)
        .await
        .unwrap()
        .last_insert_id()
    }

    pub async fn shift(pool: &MySqlPool, name: &str, start: u32, end: u32) -> u64 {
        sqlx::query("INSERT INTO shifts (name, start_time, end_time) VALUES (?, ?, ?)")
            .bind(name)
            .bind(hm(start, 0))
            .bind(hm(end, 0))
            .execute(pool)
            .await
            .unwrap()
            .last_insert_id()
    }

    pub async fn attendance_type(pool: &MySqlPool, name: &str) -> u64 {
        sqlx::query("INSERT INTO attendance_types (name) VALUES (?)")
            .bind(name)
            .execute(pool)
            .await
            .unwrap()
            .last_insert_id()
    }

    pub async fn record(pool: &MySqlPool, employee_id: u64, date: &str) -> Result<u64, sqlx::Error> {
        sqlx::query("INSERT INTO attendance_records (employee_id, date) VALUES (?, ?)")
            .bind(employee_id)
            .bind(date)
            .execute(pool)
            .await
            .map(|done| done.last_insert_id())
    }

    pub async fn mark(pool: &MySqlPool, record_id: u64, shift_id: u64, type_id: u64) -> u64 {
        sqlx::query(
            "INSERT INTO attendance_marks (attendance_record_id, shift_id, attendance_type_id, marked_time) VALUES (?, ?, ?, ?)",
        )
        .bind(record_id)
        .bind(shift_id)
        .bind(type_id)
        .bind(hm(8, 0))
        .execute(pool)
        .await
        .unwrap()
        .last_insert_id()
    }

    pub async fn mark_count(pool: &MySqlPool) -> i64 {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM attendance_marks")
            .fetch_one(pool)
            .await
            .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn table_names_match_schema() {
        assert_eq!(Table::AttendanceRecords.as_ref(), "attendance_records");
        assert_eq!(Table::AttendanceTypes.as_ref(), "attendance_types");
        assert_eq!(Table::Positions.to_string(), "positions");
    }

    #[test]
    fn mysql_codes_map_to_violations() {
        assert_eq!(Violation::from_mysql_code(1062), Some(Violation::Unique));
        assert_eq!(Violation::from_mysql_code(1451), Some(Violation::Restricted));
        assert_eq!(Violation::from_mysql_code(1217), Some(Violation::Restricted));
        assert_eq!(Violation::from_mysql_code(1452), Some(Violation::MissingParent));
        assert_eq!(Violation::from_mysql_code(1216), Some(Violation::MissingParent));
        assert_eq!(Violation::from_mysql_code(1064), None);
    }

    #[test]
    fn non_database_errors_are_not_violations() {
        assert_eq!(violation(&sqlx::Error::RowNotFound), None);
        assert!(!is_unique_violation(&sqlx::Error::PoolTimedOut));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a MySQL server in DATABASE_URL"]
    async fn deleting_shift_type_or_record_removes_their_marks(pool: MySqlPool) {
        let position = position(&pool, "Auxiliar").await;
        let employee = employee(&pool, position, "45871236", "987654321").await;
        let morning = shift(&pool, "Mañana", 6, 12).await;
        let afternoon = shift(&pool, "Tarde", 13, 18).await;
        let entry = attendance_type(&pool, "Entrada").await;
        let exit = attendance_type(&pool, "Salida").await;
        let first = record(&pool, employee, "2025-04-18").await.unwrap();
        let second = record(&pool, employee, "2025-04-19").await.unwrap();

        mark(&pool, first, morning, entry).await;
        mark(&pool, first, afternoon, exit).await;
        mark(&pool, second, afternoon, entry).await;
        mark(&pool, second, morning, entry).await;

        assert_eq!(delete_many(&pool, Table::Shifts, &[morning]).await.unwrap(), 1);
        assert_eq!(mark_count(&pool).await, 2);

        assert_eq!(delete_many(&pool, Table::AttendanceTypes, &[exit]).await.unwrap(), 1);
        assert_eq!(mark_count(&pool).await, 1);

        assert_eq!(delete_many(&pool, Table::AttendanceRecords, &[second]).await.unwrap(), 1);
        assert_eq!(mark_count(&pool).await, 0);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a MySQL server in DATABASE_URL"]
    async fn referenced_position_is_restricted(pool: MySqlPool) {
        let position = position(&pool, "Auxiliar").await;
        employee(&pool, position, "45871236", "987654321").await;

        let err = delete_many(&pool, Table::Positions, &[position]).await.unwrap_err();
        assert_eq!(violation(&err), Some(Violation::Restricted));
    }
}
