use crate::api::attendance_mark::{MarkCreated, UpdateMark};
use crate::api::attendance_record::{
    CreateAttendanceRecord, ExportRequest, RecordDetail, RecordFilter, RecordListResponse,
    RecordSaved, UpdateAttendanceRecord,
};
use crate::api::attendance_type::{CreateAttendanceType, UpdateAttendanceType};
use crate::api::employee::{CreateEmployee, EmployeeListResponse, EmployeeView, UpdateEmployee};
use crate::api::position::{CreatePosition, PositionListResponse, UpdatePosition};
use crate::api::shift::{CreateShift, ShiftListResponse, ShiftView, UpdateShift};
use crate::api::{BulkDelete, BulkDeleteResponse};
use crate::attendance::guard::ManualMark;
use crate::attendance::notification::{Notification, NotificationLevel};
use crate::attendance::reconcile::RecordKind;
use crate::auth::handlers::TokenPair;
use crate::model::attendance_mark::MarkDetail;
use crate::model::attendance_record::{AttendanceRecord, AttendanceRecordRow};
use crate::model::attendance_type::AttendanceType;
use crate::model::employee::Employee;
use crate::model::position::Position;
use crate::model::shift::Shift;
use crate::models::LoginReqDto;
use utoipa::Modify;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Attendance Admin API",
        version = "1.0.0",
        description = r#"
## Attendance administration

Back office for daily attendance of staff.

### Key Features
- **Catalogs**: positions, shifts and attendance mark types
- **Employees**: personal data validated on every write
- **Attendance records**: one record per employee and day. Saving a record
  as `present` with a shift and manual times writes its entry and exit
  marks; `absent` clears them
- **Marks**: manual marks are rejected when the record already has one of
  the same type for the same shift
- **Export**: records to an `.xlsx` workbook, one row per record and shift

### Security
All `/api` endpoints require a JWT Bearer access token from `/auth/login`.

### Response Format
- JSON responses, `{ "message", "errors" }` on validation failures (422)
- Pagination on list endpoints
"#,
    ),
    paths(
        crate::auth::handlers::login,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::logout,

        crate::api::position::create_position,
        crate::api::position::list_positions,
        crate::api::position::get_position,
        crate::api::position::update_position,
        crate::api::position::delete_position,
        crate::api::position::bulk_delete_positions,

        crate::api::employee::create_employee,
        crate::api::employee::list_employees,
        crate::api::employee::get_employee,
        crate::api::employee::update_employee,
        crate::api::employee::delete_employee,
        crate::api::employee::bulk_delete_employees,

        crate::api::shift::create_shift,
        crate::api::shift::list_shifts,
        crate::api::shift::get_shift,
        crate::api::shift::update_shift,
        crate::api::shift::delete_shift,
        crate::api::shift::bulk_delete_shifts,

        crate::api::attendance_type::create_attendance_type,
        crate::api::attendance_type::list_attendance_types,
        crate::api::attendance_type::get_attendance_type,
        crate::api::attendance_type::update_attendance_type,
        crate::api::attendance_type::delete_attendance_type,
        crate::api::attendance_type::bulk_delete_attendance_types,

        crate::api::attendance_record::create_record,
        crate::api::attendance_record::list_records,
        crate::api::attendance_record::get_record,
        crate::api::attendance_record::update_record,
        crate::api::attendance_record::delete_record,
        crate::api::attendance_record::bulk_delete_records,
        crate::api::attendance_record::export_records,

        crate::api::attendance_mark::list_marks,
        crate::api::attendance_mark::create_mark,
        crate::api::attendance_mark::update_mark,
        crate::api::attendance_mark::delete_mark
    ),
    components(
        schemas(
            LoginReqDto,
            TokenPair,
            BulkDelete,
            BulkDeleteResponse,
            Position,
            CreatePosition,
            UpdatePosition,
            PositionListResponse,
            Employee,
            EmployeeView,
            CreateEmployee,
            UpdateEmployee,
            EmployeeListResponse,
            Shift,
            ShiftView,
            CreateShift,
            UpdateShift,
            ShiftListResponse,
            AttendanceType,
            CreateAttendanceType,
            UpdateAttendanceType,
            AttendanceRecord,
            AttendanceRecordRow,
            CreateAttendanceRecord,
            UpdateAttendanceRecord,
            RecordKind,
            RecordFilter,
            ExportRequest,
            RecordListResponse,
            RecordSaved,
            RecordDetail,
            MarkDetail,
            ManualMark,
            UpdateMark,
            MarkCreated,
            Notification,
            NotificationLevel
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Login and token rotation"),
        (name = "Position", description = "Position catalog"),
        (name = "Employee", description = "Employee management"),
        (name = "Shift", description = "Shift catalog"),
        (name = "Attendance Type", description = "Attendance mark types"),
        (name = "Attendance Record", description = "Daily attendance records and export"),
        (name = "Attendance Mark", description = "Entry and exit marks of a record"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_resource() {
        let doc = ApiDoc::openapi();
        for path in [
            "/auth/login",
            "/api/positions",
            "/api/employees/{id}",
            "/api/shifts/bulk-delete",
            "/api/attendance-types",
            "/api/attendance-records/export",
            "/api/attendance-records/{id}/marks",
            "/api/attendance-marks/{id}",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }

    #[test]
    fn bearer_scheme_is_registered() {
        let doc = ApiDoc::openapi();
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
