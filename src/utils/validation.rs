use chrono::{Months, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;

static LETTERS_AND_SPACES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-ZáéíóúÁÉÍÓÚñÑ\s]+$").expect("valid letters regex"));

static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]+$").expect("valid digits regex"));

static PHONE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^9[0-9]{8}$").expect("valid phone regex"));

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@(gmail|hotmail|outlook|yahoo)\.(com|es)$")
        .expect("valid email regex")
});

/// Field name -> messages, serialized as the `errors` object of a 422 body.
#[derive(Debug, Default, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<&'static str, Vec<String>>);

impl ValidationErrors {
    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.entry(field).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn messages(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// `Ok(())` when nothing was collected.
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }

    /// Convenience for a single-field failure.
    pub fn single(field: &'static str, message: impl Into<String>) -> Self {
        let mut errors = Self::default();
        errors.add(field, message);
        errors
    }
}

/// Required text whose char count lies in `min..=max` and that contains only
/// letters (Spanish accents and ñ included) and spaces.
pub fn check_name(
    errors: &mut ValidationErrors,
    field: &'static str,
    value: &str,
    min: usize,
    max: usize,
    label: &str,
) {
    let value = value.trim();
    if value.is_empty() {
        errors.add(field, format!("The {label} is required"));
        return;
    }

    let len = value.chars().count();
    if len < min {
        errors.add(field, format!("The {label} must be at least {min} characters"));
    } else if len > max {
        errors.add(field, format!("The {label} may not be greater than {max} characters"));
    }

    if !LETTERS_AND_SPACES.is_match(value) {
        errors.add(field, format!("The {label} may only contain letters and spaces"));
    }
}

pub fn check_max_len(errors: &mut ValidationErrors, field: &'static str, value: &str, max: usize) {
    if value.chars().count() > max {
        errors.add(field, format!("The {field} may not be greater than {max} characters"));
    }
}

pub fn check_dni(errors: &mut ValidationErrors, value: &str) {
    if value.is_empty() {
        errors.add("dni", "The DNI is required");
        return;
    }
    if !DIGITS.is_match(value) {
        errors.add("dni", "The DNI may only contain digits");
    }
    if value.chars().count() != 8 {
        errors.add("dni", "The DNI must be exactly 8 digits");
    }
}

pub fn check_phone(errors: &mut ValidationErrors, value: &str) {
    if value.is_empty() {
        errors.add("phone", "The phone is required");
        return;
    }
    if value.chars().count() != 9 {
        errors.add("phone", "The phone must be exactly 9 digits");
    }
    if !PHONE.is_match(value) {
        errors.add("phone", "The phone must start with 9 and have 9 digits");
    }
}

pub fn check_email(errors: &mut ValidationErrors, value: &str) {
    if value.chars().count() > 255 {
        errors.add("email", "The email may not be greater than 255 characters");
    }
    if !EMAIL.is_match(value) {
        errors.add("email", "The email address is not valid");
    }
}

/// Birth date must put the person at 18 or older on `today`.
pub fn check_adult(errors: &mut ValidationErrors, date_of_birth: NaiveDate, today: NaiveDate) {
    let latest_allowed = today
        .checked_sub_months(Months::new(18 * 12))
        .unwrap_or(NaiveDate::MIN);
    if date_of_birth > latest_allowed {
        errors.add("date_of_birth", "The employee must be at least 18 years old");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn dni_must_be_eight_digits() {
        let mut errors = ValidationErrors::default();
        check_dni(&mut errors, "12345678");
        assert!(errors.is_empty());

        let mut errors = ValidationErrors::default();
        check_dni(&mut errors, "1234567");
        assert_eq!(errors.messages("dni"), ["The DNI must be exactly 8 digits"]);

        let mut errors = ValidationErrors::default();
        check_dni(&mut errors, "1234567a");
        assert_eq!(errors.messages("dni"), ["The DNI may only contain digits"]);
    }

    #[test]
    fn names_accept_spanish_letters() {
        let mut errors = ValidationErrors::default();
        check_name(&mut errors, "names", "José Ñuñez", 2, 255, "name");
        assert!(errors.is_empty());

        check_name(&mut errors, "names", "R2D2", 2, 255, "name");
        assert!(errors.has("names"));
    }

    #[test]
    fn name_length_is_counted_in_chars() {
        let mut errors = ValidationErrors::default();
        check_name(&mut errors, "name", "Año", 3, 255, "shift name");
        assert!(errors.is_empty());

        check_name(&mut errors, "name", "Ab", 3, 255, "shift name");
        assert_eq!(
            errors.messages("name"),
            ["The shift name must be at least 3 characters"]
        );
    }

    #[test]
    fn phone_starts_with_nine() {
        let mut errors = ValidationErrors::default();
        check_phone(&mut errors, "987654321");
        assert!(errors.is_empty());

        check_phone(&mut errors, "887654321");
        assert!(errors.has("phone"));
    }

    #[test]
    fn email_is_limited_to_known_providers() {
        let mut errors = ValidationErrors::default();
        check_email(&mut errors, "ana.perez@gmail.com");
        check_email(&mut errors, "ana@yahoo.es");
        assert!(errors.is_empty());

        check_email(&mut errors, "ana@company.com");
        assert!(errors.has("email"));
    }

    #[test]
    fn adult_check_uses_eighteenth_birthday() {
        let today = date(2026, 10, 16);

        let mut errors = ValidationErrors::default();
        check_adult(&mut errors, date(2008, 10, 16), today);
        assert!(errors.is_empty());

        check_adult(&mut errors, date(2008, 10, 17), today);
        assert!(errors.has("date_of_birth"));
    }
}
