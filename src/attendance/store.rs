//! Persistence seam for the mark rules.
//!
//! `reconcile` and `guard` only talk to a [`MarkStore`], so they run the
//! same way against MySQL (inside the request's transaction) and against
//! the in-memory store used by the tests.

use chrono::NaiveTime;
use sqlx::{FromRow, MySqlConnection};

use crate::utils::type_cache;

/// id + display name of a shift or attendance type.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Named {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMark {
    pub record_id: u64,
    pub shift_id: u64,
    pub attendance_type_id: u64,
    pub marked_time: NaiveTime,
}

#[allow(async_fn_in_trait)]
pub trait MarkStore {
    /// Holds the record row until the surrounding transaction ends, so
    /// concurrent writers to the same record's marks run one at a time.
    /// `false` when the record does not exist.
    async fn lock_record(&mut self, record_id: u64) -> Result<bool, sqlx::Error>;

    async fn shift(&mut self, shift_id: u64) -> Result<Option<Named>, sqlx::Error>;

    async fn attendance_type(&mut self, type_id: u64) -> Result<Option<Named>, sqlx::Error>;

    async fn attendance_type_id(&mut self, name: &str) -> Result<Option<u64>, sqlx::Error>;

    /// First mark of the given type on the record.
    async fn mark_of_type(
        &mut self,
        record_id: u64,
        type_id: u64,
    ) -> Result<Option<u64>, sqlx::Error>;

    async fn count_marks(
        &mut self,
        record_id: u64,
        shift_id: u64,
        type_id: u64,
    ) -> Result<u64, sqlx::Error>;

    async fn update_mark(
        &mut self,
        mark_id: u64,
        shift_id: u64,
        marked_time: NaiveTime,
    ) -> Result<(), sqlx::Error>;

    async fn insert_mark(&mut self, mark: NewMark) -> Result<u64, sqlx::Error>;

    async fn delete_marks(&mut self, record_id: u64) -> Result<u64, sqlx::Error>;
}

pub struct MySqlMarkStore<'c> {
    conn: &'c mut MySqlConnection,
}

impl<'c> MySqlMarkStore<'c> {
    pub fn new(conn: &'c mut MySqlConnection) -> Self {
        Self { conn }
    }
}

impl MarkStore for MySqlMarkStore<'_> {
    async fn lock_record(&mut self, record_id: u64) -> Result<bool, sqlx::Error> {
        let id = sqlx::query_scalar::<_, u64>("SELECT id FROM attendance_records WHERE id = ? FOR UPDATE")
            .bind(record_id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(id.is_some())
    }

    async fn shift(&mut self, shift_id: u64) -> Result<Option<Named>, sqlx::Error> {
        sqlx::query_as::<_, Named>("SELECT id, name FROM shifts WHERE id = ?")
            .bind(shift_id)
            .fetch_optional(&mut *self.conn)
            .await
    }

    async fn attendance_type(&mut self, type_id: u64) -> Result<Option<Named>, sqlx::Error> {
        sqlx::query_as::<_, Named>("SELECT id, name FROM attendance_types WHERE id = ?")
            .bind(type_id)
            .fetch_optional(&mut *self.conn)
            .await
    }

    async fn attendance_type_id(&mut self, name: &str) -> Result<Option<u64>, sqlx::Error> {
        if let Some(id) = type_cache::get(name).await {
            return Ok(Some(id));
        }

        let id = sqlx::query_scalar::<_, u64>("SELECT id FROM attendance_types WHERE name = ?")
            .bind(name)
            .fetch_optional(&mut *self.conn)
            .await?;

        if let Some(id) = id {
            type_cache::put(name, id).await;
        }
        Ok(id)
    }

    async fn mark_of_type(
        &mut self,
        record_id: u64,
        type_id: u64,
    ) -> Result<Option<u64>, sqlx::Error> {
        sqlx::query_scalar::<_, u64>(
            r#"
            SELECT id FROM attendance_marks
            WHERE attendance_record_id = ? AND attendance_type_id = ?
            ORDER BY id
            LIMIT 1
            "#,
        )
        .bind(record_id)
        .bind(type_id)
        .fetch_optional(&mut *self.conn)
        .await
    }

    async fn count_marks(
        &mut self,
        record_id: u64,
        shift_id: u64,
        type_id: u64,
    ) -> Result<u64, sqlx::Error> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM attendance_marks
            WHERE attendance_record_id = ? AND shift_id = ? AND attendance_type_id = ?
            "#,
        )
        .bind(record_id)
        .bind(shift_id)
        .bind(type_id)
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(count.max(0) as u64)
    }

    async fn update_mark(
        &mut self,
        mark_id: u64,
        shift_id: u64,
        marked_time: NaiveTime,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE attendance_marks SET shift_id = ?, marked_time = ? WHERE id = ?")
            .bind(shift_id)
            .bind(marked_time)
            .bind(mark_id)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }

    async fn insert_mark(&mut self, mark: NewMark) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO attendance_marks
            (attendance_record_id, shift_id, attendance_type_id, marked_time)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(mark.record_id)
        .bind(mark.shift_id)
        .bind(mark.attendance_type_id)
        .bind(mark.marked_time)
        .execute(&mut *self.conn)
        .await?;

        Ok(result.last_insert_id())
    }

    async fn delete_marks(&mut self, record_id: u64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM attendance_marks WHERE attendance_record_id = ?")
            .bind(record_id)
            .execute(&mut *self.conn)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
pub mod memory {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct StoredMark {
        pub id: u64,
        pub record_id: u64,
        pub shift_id: u64,
        pub attendance_type_id: u64,
        pub marked_time: NaiveTime,
    }

    /// Vec-backed store for rule tests.
    #[derive(Debug, Default)]
    pub struct MemoryStore {
        pub shifts: Vec<Named>,
        pub types: Vec<Named>,
        pub marks: Vec<StoredMark>,
        /// Records locked so far, in call order.
        pub locked: Vec<u64>,
        pub missing_records: Vec<u64>,
        next_id: u64,
    }

    impl MemoryStore {
        pub fn with_shift(mut self, id: u64, name: &str) -> Self {
            self.shifts.push(Named { id, name: name.to_string() });
            self
        }

        pub fn with_type(mut self, id: u64, name: &str) -> Self {
            self.types.push(Named { id, name: name.to_string() });
            self
        }

        pub fn marks_of(&self, record_id: u64) -> Vec<&StoredMark> {
            self.marks.iter().filter(|m| m.record_id == record_id).collect()
        }
    }

    impl MarkStore for MemoryStore {
        async fn lock_record(&mut self, record_id: u64) -> Result<bool, sqlx::Error> {
            self.locked.push(record_id);
            Ok(!self.missing_records.contains(&record_id))
        }

        async fn shift(&mut self, shift_id: u64) -> Result<Option<Named>, sqlx::Error> {
            Ok(self.shifts.iter().find(|s| s.id == shift_id).cloned())
        }

        async fn attendance_type(&mut self, type_id: u64) -> Result<Option<Named>, sqlx::Error> {
            Ok(self.types.iter().find(|t| t.id == type_id).cloned())
        }

        async fn attendance_type_id(&mut self, name: &str) -> Result<Option<u64>, sqlx::Error> {
            Ok(self.types.iter().find(|t| t.name == name).map(|t| t.id))
        }

        async fn mark_of_type(
            &mut self,
            record_id: u64,
            type_id: u64,
        ) -> Result<Option<u64>, sqlx::Error> {
            Ok(self
                .marks
                .iter()
                .find(|m| m.record_id == record_id && m.attendance_type_id == type_id)
                .map(|m| m.id))
        }

        async fn count_marks(
            &mut self,
            record_id: u64,
            shift_id: u64,
            type_id: u64,
        ) -> Result<u64, sqlx::Error> {
            Ok(self
                .marks
                .iter()
                .filter(|m| {
                    m.record_id == record_id
                        && m.shift_id == shift_id
                        && m.attendance_type_id == type_id
                })
                .count() as u64)
        }

        async fn update_mark(
            &mut self,
            mark_id: u64,
            shift_id: u64,
            marked_time: NaiveTime,
        ) -> Result<(), sqlx::Error> {
            if let Some(mark) = self.marks.iter_mut().find(|m| m.id == mark_id) {
                mark.shift_id = shift_id;
                mark.marked_time = marked_time;
            }
            Ok(())
        }

        async fn insert_mark(&mut self, mark: NewMark) -> Result<u64, sqlx::Error> {
            self.next_id += 1;
            self.marks.push(StoredMark {
                id: self.next_id,
                record_id: mark.record_id,
                shift_id: mark.shift_id,
                attendance_type_id: mark.attendance_type_id,
                marked_time: mark.marked_time,
            });
            Ok(self.next_id)
        }

        async fn delete_marks(&mut self, record_id: u64) -> Result<u64, sqlx::Error> {
            let before = self.marks.len();
            self.marks.retain(|m| m.record_id != record_id);
            Ok((before - self.marks.len()) as u64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fixtures;
    use sqlx::MySqlPool;

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a MySQL server in DATABASE_URL"]
    async fn lock_record_reports_missing_rows(pool: MySqlPool) {
        let position_id = fixtures::position(&pool, "Auxiliar").await;
        let employee_id = fixtures::employee(&pool, position_id, "45871236", "987654321").await;
        let record_id = fixtures::record(&pool, employee_id, "2025-04-18").await.unwrap();

        let mut tx = pool.begin().await.unwrap();
        let mut store = MySqlMarkStore::new(&mut *tx);
        assert!(store.lock_record(record_id).await.unwrap());
        assert!(!store.lock_record(record_id + 1).await.unwrap());
        tx.rollback().await.unwrap();
    }
}
