pub mod attendance_mark;
pub mod attendance_record;
pub mod attendance_type;
pub mod employee;
pub mod position;
pub mod shift;
pub mod user;
