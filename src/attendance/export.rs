//! Spreadsheet projection of attendance records: one row per
//! record and shift.

use chrono::{NaiveDate, NaiveTime};
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use std::collections::{BTreeMap, HashMap};

use crate::model::attendance_mark::MarkDetail;
use crate::model::attendance_record::AttendanceRecordRow;

pub const HEADINGS: [&str; 8] = [
    "DNI",
    "Apellido Paterno",
    "Apellido Materno",
    "Nombres",
    "Fecha",
    "Turno",
    "Ingreso",
    "Salida",
];

pub const NO_MARK: &str = "--:--:--";

const DATE_FORMAT: &str = "%d/%m/%Y";
const TIME_FORMAT: &str = "%H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRow {
    pub dni: String,
    pub paternal_surname: String,
    pub maternal_surname: String,
    pub names: String,
    pub date: String,
    pub shift: String,
    pub ingreso: String,
    pub salida: String,
}

impl ExportRow {
    fn cells(&self) -> [&str; 8] {
        [
            &self.dni,
            &self.paternal_surname,
            &self.maternal_surname,
            &self.names,
            &self.date,
            &self.shift,
            &self.ingreso,
            &self.salida,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimeColumn {
    Ingreso,
    Salida,
}

/// Lower-cased type name -> column. "entrada" is the seeded entry type.
fn column_for(type_name: &str) -> Option<TimeColumn> {
    match type_name.trim().to_lowercase().as_str() {
        "ingreso" | "entrada" => Some(TimeColumn::Ingreso),
        "salida" => Some(TimeColumn::Salida),
        _ => None,
    }
}

/// Rows for a single record, ordered by shift start time then shift name.
pub fn project(record: &AttendanceRecordRow, marks: &[MarkDetail]) -> Vec<ExportRow> {
    let mut by_shift: BTreeMap<(NaiveTime, &str), Vec<&MarkDetail>> = BTreeMap::new();
    for mark in marks {
        by_shift
            .entry((mark.shift_start_time, mark.shift_name.as_str()))
            .or_default()
            .push(mark);
    }

    let date = record.date.format(DATE_FORMAT).to_string();

    by_shift
        .into_iter()
        .map(|((_, shift_name), mut group)| {
            group.sort_by_key(|m| (m.marked_time, m.id));

            let mut row = ExportRow {
                dni: record.dni.clone(),
                paternal_surname: record.paternal_surname.clone(),
                maternal_surname: record.maternal_surname.clone(),
                names: record.names.clone(),
                date: date.clone(),
                shift: shift_name.to_string(),
                ingreso: NO_MARK.to_string(),
                salida: NO_MARK.to_string(),
            };

            // later marks of the same type overwrite earlier ones
            for mark in group {
                let time = mark.marked_time.format(TIME_FORMAT).to_string();
                match column_for(&mark.attendance_type_name) {
                    Some(TimeColumn::Ingreso) => row.ingreso = time,
                    Some(TimeColumn::Salida) => row.salida = time,
                    None => {}
                }
            }
            row
        })
        .collect()
}

/// Rows for many records, records ordered by date then DNI.
pub fn project_all(
    records: &[AttendanceRecordRow],
    marks_by_record: &HashMap<u64, Vec<MarkDetail>>,
) -> Vec<ExportRow> {
    let mut ordered: Vec<&AttendanceRecordRow> = records.iter().collect();
    ordered.sort_by(|a, b| (a.date, &a.dni, a.id).cmp(&(b.date, &b.dni, b.id)));

    ordered
        .into_iter()
        .flat_map(|record| {
            let marks = marks_by_record
                .get(&record.id)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            project(record, marks)
        })
        .collect()
}

pub fn filename(today: NaiveDate) -> String {
    format!("Registros_Asistencia_{}.xlsx", today.format("%Y-%m-%d"))
}

pub fn write_workbook(rows: &[ExportRow]) -> Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();

    let sheet = workbook.add_worksheet();
    sheet.set_name("Registros")?;

    for (col, heading) in HEADINGS.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *heading, &header_format)?;
    }

    for (i, row) in rows.iter().enumerate() {
        let r = i as u32 + 1;
        for (col, cell) in row.cells().iter().enumerate() {
            sheet.write_string(r, col as u16, *cell)?;
        }
    }

    sheet.autofit();
    workbook.save_to_buffer()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn record(id: u64, dni: &str, date: NaiveDate) -> AttendanceRecordRow {
        AttendanceRecordRow {
            id,
            employee_id: id,
            date,
            observations: None,
            dni: dni.to_string(),
            paternal_surname: "Quispe".into(),
            maternal_surname: "Huamán".into(),
            names: "María".into(),
        }
    }

    fn mark(id: u64, shift: &str, shift_start: NaiveTime, kind: &str, at: NaiveTime) -> MarkDetail {
        MarkDetail {
            id,
            attendance_record_id: 1,
            shift_id: 1,
            shift_name: shift.to_string(),
            shift_start_time: shift_start,
            attendance_type_id: if kind == "Entrada" { 1 } else { 2 },
            attendance_type_name: kind.to_string(),
            marked_time: at,
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, 18).unwrap()
    }

    #[test]
    fn one_row_per_shift_with_placeholders() {
        let marks = vec![
            mark(3, "Evening", t(18, 0), "Entrada", t(18, 0)),
            mark(1, "Morning", t(6, 0), "Entrada", t(8, 0)),
            mark(2, "Morning", t(6, 0), "Salida", t(12, 0)),
        ];

        let rows = project(&record(1, "45871236", day()), &marks);

        assert_eq!(rows.len(), 2);
        assert_eq!(
            (rows[0].shift.as_str(), rows[0].ingreso.as_str(), rows[0].salida.as_str()),
            ("Morning", "08:00:00", "12:00:00")
        );
        assert_eq!(
            (rows[1].shift.as_str(), rows[1].ingreso.as_str(), rows[1].salida.as_str()),
            ("Evening", "18:00:00", NO_MARK)
        );
        assert_eq!(rows[0].date, "18/04/2025");
        assert_eq!(rows[0].dni, "45871236");
    }

    #[test]
    fn unknown_types_are_ignored() {
        let marks = vec![mark(1, "Morning", t(6, 0), "Refrigerio", t(10, 0))];

        let rows = project(&record(1, "45871236", day()), &marks);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].ingreso, NO_MARK);
        assert_eq!(rows[0].salida, NO_MARK);
    }

    #[test]
    fn type_matching_is_case_insensitive() {
        let marks = vec![
            mark(1, "Morning", t(6, 0), "ENTRADA", t(7, 55)),
            mark(2, "Morning", t(6, 0), "salida", t(12, 30)),
        ];

        let rows = project(&record(1, "45871236", day()), &marks);

        assert_eq!(rows[0].ingreso, "07:55:00");
        assert_eq!(rows[0].salida, "12:30:00");
    }

    #[test]
    fn record_without_marks_yields_no_rows() {
        assert!(project(&record(1, "45871236", day()), &[]).is_empty());
    }

    #[test]
    fn project_all_orders_records_by_date_then_dni() {
        let later = NaiveDate::from_ymd_opt(2025, 4, 19).unwrap();
        let records = vec![
            record(1, "20000000", later),
            record(2, "30000000", day()),
            record(3, "10000000", day()),
        ];
        let mut marks = HashMap::new();
        for id in [1, 2, 3] {
            marks.insert(id, vec![mark(id, "Morning", t(6, 0), "Entrada", t(8, 0))]);
        }

        let rows = project_all(&records, &marks);

        let dnis: Vec<&str> = rows.iter().map(|r| r.dni.as_str()).collect();
        assert_eq!(dnis, ["10000000", "30000000", "20000000"]);
    }

    #[test]
    fn filename_uses_iso_date() {
        assert_eq!(filename(day()), "Registros_Asistencia_2025-04-18.xlsx");
    }

    #[test]
    fn workbook_is_a_zip_container() {
        let rows = project(
            &record(1, "45871236", day()),
            &[mark(1, "Morning", t(6, 0), "Entrada", t(8, 0))],
        );

        let bytes = write_workbook(&rows).unwrap();

        assert!(bytes.starts_with(b"PK"));
    }
}
