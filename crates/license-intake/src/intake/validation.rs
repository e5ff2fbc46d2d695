use std::fmt;
use std::sync::OnceLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::domain::{Address, PersonalDetails};

pub const MAX_EMAIL_LENGTH: usize = 254;
pub const MAX_NOTES_LENGTH: usize = 500;
pub const MINIMUM_AGE_YEARS: u32 = 18;

/// A single field-level problem reported back to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Every problem found in one request; never empty when returned as an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            errors: vec![FieldError::new(field, message)],
        }
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError::new(field, message));
    }

    pub fn extend(&mut self, other: ValidationErrors) {
        self.errors.extend(other.errors);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    pub fn mentions(&self, field: &str) -> bool {
        self.errors.iter().any(|error| error.field == field)
    }

    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "validation failed")?;
        for (index, error) in self.errors.iter().enumerate() {
            let separator = if index == 0 { ": " } else { "; " };
            write!(f, "{separator}{} {}", error.field, error.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Raw text fields captured from the submission form before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmissionForm {
    pub full_name: Option<String>,
    pub phone_number: Option<String>,
    pub email: Option<String>,
    pub date_of_birth: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub pincode: Option<String>,
}

impl SubmissionForm {
    /// Record a form field by its wire name. Returns `false` for unknown names.
    pub fn set(&mut self, name: &str, value: String) -> bool {
        let slot = match name {
            "fullName" => &mut self.full_name,
            "phoneNumber" => &mut self.phone_number,
            "email" => &mut self.email,
            "dateOfBirth" => &mut self.date_of_birth,
            "address[street]" | "address.street" => &mut self.street,
            "address[city]" | "address.city" => &mut self.city,
            "address[state]" | "address.state" => &mut self.state,
            "address[pincode]" | "address.pincode" => &mut self.pincode,
            _ => return false,
        };
        *slot = Some(value);
        true
    }
}

fn full_name_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z\s]+$")
            .unwrap_or_else(|error| panic!("full name regex failed to compile: {error}"))
    })
}

fn phone_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[6-9][0-9]{9}$")
            .unwrap_or_else(|error| panic!("phone regex failed to compile: {error}"))
    })
}

fn email_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$")
            .unwrap_or_else(|error| panic!("email regex failed to compile: {error}"))
    })
}

fn pincode_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[0-9]{6}$")
            .unwrap_or_else(|error| panic!("pincode regex failed to compile: {error}"))
    })
}

pub fn is_valid_email(raw: &str) -> bool {
    raw.len() <= MAX_EMAIL_LENGTH && email_pattern().is_match(raw)
}

fn required<'a>(
    errors: &mut ValidationErrors,
    field: &str,
    label: &str,
    value: &'a Option<String>,
) -> Option<&'a str> {
    match value.as_deref().map(str::trim) {
        Some(trimmed) if !trimmed.is_empty() => Some(trimmed),
        _ => {
            errors.push(field, format!("{label} is required"));
            None
        }
    }
}

fn bounded_text(
    errors: &mut ValidationErrors,
    field: &str,
    label: &str,
    value: &Option<String>,
    min: usize,
    max: usize,
) -> Option<String> {
    let trimmed = required(errors, field, label, value)?;
    let length = trimmed.chars().count();
    if length < min || length > max {
        errors.push(
            field,
            format!("{label} must be between {min} and {max} characters"),
        );
        return None;
    }
    Some(trimmed.to_string())
}

/// Parse `YYYY-MM-DD`, tolerating a trailing ISO time component.
pub fn parse_birth_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    let date_part = trimmed.split('T').next().unwrap_or(trimmed);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

/// Completed years between `birth` and `today`, counting the birthday itself.
pub fn age_on(birth: NaiveDate, today: NaiveDate) -> i32 {
    let mut years = today.year() - birth.year();
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        years -= 1;
    }
    years
}

/// Validate and normalize the personal fields of a submission.
///
/// All problems are collected; nothing short-circuits after the first failure.
pub fn validate_personal_details(
    form: &SubmissionForm,
    today: NaiveDate,
) -> Result<PersonalDetails, ValidationErrors> {
    let mut errors = ValidationErrors::default();

    let full_name = bounded_text(&mut errors, "fullName", "Full name", &form.full_name, 2, 100)
        .and_then(|name| {
            if full_name_pattern().is_match(&name) {
                Some(name)
            } else {
                errors.push("fullName", "Full name can only contain letters and spaces");
                None
            }
        });

    let phone_number = required(&mut errors, "phoneNumber", "Phone number", &form.phone_number)
        .and_then(|phone| {
            if phone_pattern().is_match(phone) {
                Some(phone.to_string())
            } else {
                errors.push(
                    "phoneNumber",
                    "Please enter a valid 10-digit Indian mobile number",
                );
                None
            }
        });

    let email = required(&mut errors, "email", "Email", &form.email).and_then(|email| {
        let email = email.to_lowercase();
        if is_valid_email(&email) {
            Some(email)
        } else {
            errors.push("email", "Please enter a valid email address");
            None
        }
    });

    let date_of_birth = required(&mut errors, "dateOfBirth", "Date of birth", &form.date_of_birth)
        .and_then(|raw| match parse_birth_date(raw) {
            None => {
                errors.push("dateOfBirth", "Date of birth must be a valid date (YYYY-MM-DD)");
                None
            }
            Some(birth) if birth > today => {
                errors.push("dateOfBirth", "Date of birth cannot be in the future");
                None
            }
            Some(birth) if age_on(birth, today) < MINIMUM_AGE_YEARS as i32 => {
                errors.push(
                    "dateOfBirth",
                    format!("Applicant must be at least {MINIMUM_AGE_YEARS} years old"),
                );
                None
            }
            Some(birth) => Some(birth),
        });

    let street = bounded_text(&mut errors, "address.street", "Street address", &form.street, 5, 200);
    let city = bounded_text(&mut errors, "address.city", "City", &form.city, 2, 50);
    let state = bounded_text(&mut errors, "address.state", "State", &form.state, 2, 50);
    let pincode = required(&mut errors, "address.pincode", "Pincode", &form.pincode).and_then(
        |pincode| {
            if pincode_pattern().is_match(pincode) {
                Some(pincode.to_string())
            } else {
                errors.push("address.pincode", "Pincode must be exactly 6 digits");
                None
            }
        },
    );

    match (
        full_name,
        phone_number,
        email,
        date_of_birth,
        street,
        city,
        state,
        pincode,
    ) {
        (
            Some(full_name),
            Some(phone_number),
            Some(email),
            Some(date_of_birth),
            Some(street),
            Some(city),
            Some(state),
            Some(pincode),
        ) if errors.is_empty() => Ok(PersonalDetails {
            full_name,
            phone_number,
            email,
            date_of_birth,
            address: Address {
                street,
                city,
                state,
                pincode,
            },
        }),
        _ => Err(errors),
    }
}

/// Normalize reviewer notes: trimmed, empty treated as absent, bounded length.
pub fn normalize_notes(
    field: &str,
    notes: Option<String>,
) -> Result<Option<String>, ValidationErrors> {
    let Some(raw) = notes else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.chars().count() > MAX_NOTES_LENGTH {
        return Err(ValidationErrors::single(
            field,
            format!("Notes cannot exceed {MAX_NOTES_LENGTH} characters"),
        ));
    }
    Ok(Some(trimmed.to_string()))
}
