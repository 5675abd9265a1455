use chrono::NaiveTime;
use serde::Deserialize;
use tracing::info;
use utoipa::ToSchema;

use super::notification::Notification;
use super::store::{MarkStore, NewMark};
use crate::error::{AppError, AppResult};

/// Manually entered mark for an existing record.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ManualMark {
    #[schema(example = 1)]
    pub shift_id: u64,
    #[schema(example = 1)]
    pub attendance_type_id: u64,
    #[schema(example = "08:00:00", value_type = String, format = "time")]
    pub marked_time: NaiveTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    Created {
        mark_id: u64,
        notification: Notification,
    },
    /// Same record/shift/type already marked for the record's day.
    Rejected { notification: Notification },
}

/// Creates the mark unless the record already holds one with the same
/// shift and type. Marks carry no date of their own: a record is one
/// employee-day, so "the same day" is the record's date.
///
/// The record row is locked first, which makes the count and the insert
/// atomic with respect to other guarded writes on the same record.
pub async fn create_guarded<S: MarkStore>(
    store: &mut S,
    record_id: u64,
    mark: &ManualMark,
) -> AppResult<GuardOutcome> {
    if !store.lock_record(record_id).await? {
        return Err(AppError::NotFound("Attendance record not found"));
    }

    let shift = store
        .shift(mark.shift_id)
        .await?
        .ok_or(AppError::NotFound("Shift not found"))?;
    let attendance_type = store
        .attendance_type(mark.attendance_type_id)
        .await?
        .ok_or(AppError::NotFound("Attendance type not found"))?;

    let existing = store
        .count_marks(record_id, shift.id, attendance_type.id)
        .await?;
    if existing > 0 {
        info!(
            record_id,
            shift_id = shift.id,
            attendance_type_id = attendance_type.id,
            "Duplicate mark rejected"
        );
        return Ok(GuardOutcome::Rejected {
            notification: Notification::danger("Mark rejected").body(format!(
                "There is already a {} mark for shift {} on this day.",
                attendance_type.name.to_lowercase(),
                shift.name.to_lowercase()
            )),
        });
    }

    let mark_id = store
        .insert_mark(NewMark {
            record_id,
            shift_id: shift.id,
            attendance_type_id: attendance_type.id,
            marked_time: mark.marked_time,
        })
        .await?;

    Ok(GuardOutcome::Created {
        mark_id,
        notification: Notification::success("Mark created"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::notification::NotificationLevel;
    use crate::attendance::store::memory::MemoryStore;

    fn store() -> MemoryStore {
        MemoryStore::default()
            .with_type(1, "Entrada")
            .with_type(2, "Salida")
            .with_shift(10, "Mañana")
            .with_shift(11, "Tarde")
    }

    fn mark(shift_id: u64, attendance_type_id: u64, h: u32) -> ManualMark {
        ManualMark {
            shift_id,
            attendance_type_id,
            marked_time: NaiveTime::from_hms_opt(h, 0, 0).unwrap(),
        }
    }

    #[actix_web::test]
    async fn first_mark_is_created() {
        let mut store = store();

        let outcome = create_guarded(&mut store, 5, &mark(10, 1, 8)).await.unwrap();

        assert!(matches!(outcome, GuardOutcome::Created { mark_id: 1, .. }));
        assert_eq!(store.marks_of(5).len(), 1);
    }

    #[actix_web::test]
    async fn second_entry_for_same_shift_is_rejected_without_mutation() {
        let mut store = store();
        create_guarded(&mut store, 5, &mark(10, 1, 8)).await.unwrap();

        let outcome = create_guarded(&mut store, 5, &mark(10, 1, 9)).await.unwrap();

        match outcome {
            GuardOutcome::Rejected { notification } => {
                assert_eq!(notification.level, NotificationLevel::Danger);
                assert_eq!(
                    notification.body.as_deref(),
                    Some("There is already a entrada mark for shift mañana on this day.")
                );
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        assert_eq!(store.marks_of(5).len(), 1);
    }

    #[actix_web::test]
    async fn other_shift_type_or_record_is_allowed() {
        let mut store = store();
        create_guarded(&mut store, 5, &mark(10, 1, 8)).await.unwrap();

        for (record, m) in [(5, mark(10, 2, 12)), (5, mark(11, 1, 14)), (6, mark(10, 1, 8))] {
            let outcome = create_guarded(&mut store, record, &m).await.unwrap();
            assert!(matches!(outcome, GuardOutcome::Created { .. }));
        }
        assert_eq!(store.marks.len(), 4);
    }

    #[actix_web::test]
    async fn unknown_shift_or_type_is_not_found() {
        let mut store = store();

        let err = create_guarded(&mut store, 5, &mark(99, 1, 8)).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound("Shift not found")));

        let err = create_guarded(&mut store, 5, &mark(10, 99, 8)).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound("Attendance type not found")));
        assert!(store.marks.is_empty());
    }

    #[actix_web::test]
    async fn record_is_locked_before_the_duplicate_check() {
        let mut store = store();
        create_guarded(&mut store, 5, &mark(10, 1, 8)).await.unwrap();
        create_guarded(&mut store, 5, &mark(10, 1, 9)).await.unwrap();

        assert_eq!(store.locked, [5, 5]);
    }

    #[actix_web::test]
    async fn missing_record_is_not_found() {
        let mut store = store();
        store.missing_records.push(7);

        let err = create_guarded(&mut store, 7, &mark(10, 1, 8)).await.unwrap_err();

        assert!(matches!(err, AppError::NotFound("Attendance record not found")));
        assert!(store.marks.is_empty());
    }
}
