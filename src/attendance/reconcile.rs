//! Derives the entry/exit marks of a record from the "present"/"absent"
//! choice made when the record is saved.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use utoipa::ToSchema;

use super::notification::Notification;
use super::store::{MarkStore, NewMark};
use crate::model::attendance_type::{ENTRY_TYPE_NAME, EXIT_TYPE_NAME};
use crate::utils::validation::ValidationErrors;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    ToSchema,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RecordKind {
    #[serde(alias = "asistencia")]
    #[strum(to_string = "present", serialize = "asistencia")]
    Present,
    #[serde(alias = "falta")]
    #[strum(to_string = "absent", serialize = "falta")]
    Absent,
}

/// What the submit handler hands to the post-save step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileRequest {
    pub kind: RecordKind,
    pub shift_id: Option<u64>,
    pub start: Option<NaiveTime>,
    pub end: Option<NaiveTime>,
}

impl ReconcileRequest {
    /// A present record needs the shift and both manual times.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        if self.kind == RecordKind::Present {
            if self.shift_id.is_none() {
                errors.add("shift_id", "The shift is required");
            }
            if self.start.is_none() {
                errors.add("manual_start_time", "The start time is required");
            }
            if self.end.is_none() {
                errors.add("manual_end_time", "The end time is required");
            }
        }
        errors.into_result()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkWrite {
    Created,
    Updated,
    /// The mark type isn't seeded; this half was skipped.
    TypeMissing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    MarksUpserted {
        shift_name: String,
        entry: MarkWrite,
        exit: MarkWrite,
    },
    MarksCleared {
        removed: u64,
    },
    Skipped,
}

impl ReconcileOutcome {
    pub fn notification(&self) -> Option<Notification> {
        match self {
            ReconcileOutcome::MarksUpserted { shift_name, .. } => Some(
                Notification::success("Attendance saved")
                    .body(format!("Attendance marks saved for shift {shift_name}")),
            ),
            ReconcileOutcome::MarksCleared { removed } => Some(
                Notification::info("Absence recorded").body(if *removed > 0 {
                    format!("Absence recorded, {removed} existing marks removed")
                } else {
                    "Absence recorded".to_string()
                }),
            ),
            ReconcileOutcome::Skipped => None,
        }
    }
}

pub async fn reconcile<S: MarkStore>(
    store: &mut S,
    record_id: u64,
    request: &ReconcileRequest,
) -> Result<ReconcileOutcome, sqlx::Error> {
    match (request.kind, request.shift_id, request.start, request.end) {
        (RecordKind::Present, Some(shift_id), Some(start), Some(end)) => {
            let Some(shift) = store.shift(shift_id).await? else {
                debug!(record_id, shift_id, "Shift not found, marks left untouched");
                return Ok(ReconcileOutcome::Skipped);
            };

            let entry = upsert_mark(store, record_id, ENTRY_TYPE_NAME, shift.id, start).await?;
            let exit = upsert_mark(store, record_id, EXIT_TYPE_NAME, shift.id, end).await?;

            info!(record_id, shift = %shift.name, ?entry, ?exit, "Attendance marks reconciled");
            Ok(ReconcileOutcome::MarksUpserted {
                shift_name: shift.name,
                entry,
                exit,
            })
        }
        (RecordKind::Absent, ..) => {
            let removed = store.delete_marks(record_id).await?;
            info!(record_id, removed, "Absence recorded, marks cleared");
            Ok(ReconcileOutcome::MarksCleared { removed })
        }
        _ => Ok(ReconcileOutcome::Skipped),
    }
}

async fn upsert_mark<S: MarkStore>(
    store: &mut S,
    record_id: u64,
    type_name: &str,
    shift_id: u64,
    marked_time: NaiveTime,
) -> Result<MarkWrite, sqlx::Error> {
    let Some(type_id) = store.attendance_type_id(type_name).await? else {
        debug!(record_id, type_name, "Attendance type not seeded, skipping mark");
        return Ok(MarkWrite::TypeMissing);
    };

    match store.mark_of_type(record_id, type_id).await? {
        Some(mark_id) => {
            store.update_mark(mark_id, shift_id, marked_time).await?;
            Ok(MarkWrite::Updated)
        }
        None => {
            store
                .insert_mark(NewMark {
                    record_id,
                    shift_id,
                    attendance_type_id: type_id,
                    marked_time,
                })
                .await?;
            Ok(MarkWrite::Created)
        }
    }
}
