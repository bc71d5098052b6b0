//! Intake validation for new requests.
//!
//! Lengths are counted in characters (not bytes) on the input exactly as
//! submitted, without trimming.

use crate::types::NewRequest;
use serde::Serialize;
use std::fmt;

/// Minimum length of the client name.
pub const MIN_CLIENT_NAME_CHARS: usize = 2;
/// Minimum length of the phone number.
pub const MIN_PHONE_CHARS: usize = 5;
/// Minimum length of the address.
pub const MIN_ADDRESS_CHARS: usize = 5;
/// Minimum length of the problem description.
pub const MIN_PROBLEM_TEXT_CHARS: usize = 10;

/// A single rejected field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Wire name of the field (`clientName`, `phone`, ...).
    pub field: &'static str,
    /// Human-readable reason.
    pub message: String,
}

/// All field errors found in one intake payload.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    /// The individual field errors.
    #[must_use]
    pub fn fields(&self) -> &[FieldError] {
        &self.0
    }

    /// Whether no field was rejected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether the given field was rejected.
    #[must_use]
    pub fn has_field(&self, field: &str) -> bool {
        self.0.iter().any(|e| e.field == field)
    }

    fn check_min_chars(&mut self, field: &'static str, label: &str, value: &str, min: usize) {
        if value.chars().count() < min {
            self.0.push(FieldError {
                field,
                message: format!("{label} must be at least {min} characters"),
            });
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<&str> = self.0.iter().map(|e| e.message.as_str()).collect();
        f.write_str(&messages.join("; "))
    }
}

impl NewRequest {
    /// Validates the intake payload.
    ///
    /// # Errors
    ///
    /// Returns every field that is shorter than its minimum length.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        errors.check_min_chars(
            "clientName",
            "Client name",
            &self.client_name,
            MIN_CLIENT_NAME_CHARS,
        );
        errors.check_min_chars("phone", "Phone", &self.phone, MIN_PHONE_CHARS);
        errors.check_min_chars("address", "Address", &self.address, MIN_ADDRESS_CHARS);
        errors.check_min_chars(
            "problemText",
            "Problem description",
            &self.problem_text,
            MIN_PROBLEM_TEXT_CHARS,
        );

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}
