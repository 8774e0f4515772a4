//! Field-level format rules for customer records
//!
//! Each rule trims spaces and control characters from its input and rejects
//! empty values. Patterns are compiled in ASCII mode, so `\s` and `\d` never
//! match non-ASCII whitespace or digits.

use crate::customer::{trim_field, Customer};
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use std::fmt;

const NAME_PATTERN: &str = r"^[A-Za-z\s]+$";
const EMAIL_PATTERN: &str = r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$";
const MOBILE_PATTERN: &str = r"^[6-9]\d{9}$";
const AADHAAR_PATTERN: &str = r"^\d{12}$";
const PAN_PATTERN: &str = r"^[A-Z]{5}[0-9]{4}[A-Z]$";

/// Customer fields in validation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Field {
    Name,
    Email,
    PhoneNumber,
    AadhaarNumber,
    PanNumber,
    State,
    City,
}

impl Field {
    /// All fields, in the order the processor checks them
    pub const ORDER: [Field; 7] = [
        Field::Name,
        Field::Email,
        Field::PhoneNumber,
        Field::AadhaarNumber,
        Field::PanNumber,
        Field::State,
        Field::City,
    ];

    /// Human-readable label used in error messages
    pub fn label(&self) -> &'static str {
        match self {
            Field::Name => "name",
            Field::Email => "email",
            Field::PhoneNumber => "phone number",
            Field::AadhaarNumber => "aadhaar number",
            Field::PanNumber => "PAN number",
            Field::State => "state",
            Field::City => "city",
        }
    }

    /// Borrow this field's value from a customer
    pub fn value_of<'a>(&self, customer: &'a Customer) -> Option<&'a str> {
        match self {
            Field::Name => customer.name.as_deref(),
            Field::Email => customer.email.as_deref(),
            Field::PhoneNumber => customer.phone_number.as_deref(),
            Field::AadhaarNumber => customer.aadhaar_number.as_deref(),
            Field::PanNumber => customer.pan_number.as_deref(),
            Field::State => customer.state.as_deref(),
            Field::City => customer.city.as_deref(),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome of checking every field of a record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub failed_fields: Vec<Field>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.failed_fields.is_empty()
    }

    /// First failing field in validation order
    pub fn first_failure(&self) -> Option<Field> {
        self.failed_fields.first().copied()
    }
}

/// Compiled format rules
#[derive(Debug, Clone)]
pub struct CustomerValidator {
    name: Regex,
    email: Regex,
    mobile: Regex,
    aadhaar: Regex,
    pan: Regex,
}

impl CustomerValidator {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            name: ascii_regex(NAME_PATTERN)?,
            email: ascii_regex(EMAIL_PATTERN)?,
            mobile: ascii_regex(MOBILE_PATTERN)?,
            aadhaar: ascii_regex(AADHAAR_PATTERN)?,
            pan: ascii_regex(PAN_PATTERN)?,
        })
    }

    pub fn is_valid_name(&self, value: &str) -> bool {
        matches(&self.name, value)
    }

    pub fn is_valid_email(&self, value: &str) -> bool {
        matches(&self.email, value)
    }

    pub fn is_valid_mobile(&self, value: &str) -> bool {
        matches(&self.mobile, value)
    }

    pub fn is_valid_aadhaar(&self, value: &str) -> bool {
        matches(&self.aadhaar, value)
    }

    /// Case-sensitive: callers upper-case the value first to accept lower-case input.
    pub fn is_valid_pan(&self, value: &str) -> bool {
        matches(&self.pan, value)
    }

    pub fn is_valid_state(&self, value: &str) -> bool {
        matches(&self.name, value)
    }

    pub fn is_valid_city(&self, value: &str) -> bool {
        matches(&self.name, value)
    }

    /// Apply the rule for `field` to `value`.
    ///
    /// The PAN rule is applied to the trimmed, upper-cased value.
    pub fn check(&self, field: Field, value: &str) -> bool {
        match field {
            Field::Name => self.is_valid_name(value),
            Field::Email => self.is_valid_email(value),
            Field::PhoneNumber => self.is_valid_mobile(value),
            Field::AadhaarNumber => self.is_valid_aadhaar(value),
            Field::PanNumber => self.is_valid_pan(&trim_field(value).to_uppercase()),
            Field::State => self.is_valid_state(value),
            Field::City => self.is_valid_city(value),
        }
    }

    /// Run all seven checks. Unset fields are not checked.
    pub fn validate_customer(&self, customer: &Customer) -> ValidationReport {
        let failed_fields = Field::ORDER
            .into_iter()
            .filter(|field| {
                field
                    .value_of(customer)
                    .is_some_and(|value| !self.check(*field, value))
            })
            .collect();

        ValidationReport { failed_fields }
    }
}

fn ascii_regex(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).unicode(false).build()
}

fn matches(regex: &Regex, value: &str) -> bool {
    let value = trim_field(value);
    !value.is_empty() && regex.is_match(value)
}
