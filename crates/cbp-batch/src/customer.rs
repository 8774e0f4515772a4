//! Customer record flowing through the import pipeline

use serde::{Deserialize, Serialize};

/// Positional column order of the input file
pub const COLUMNS: [&str; 7] = [
    "name",
    "email",
    "phoneNumber",
    "aadhaarNumber",
    "panNumber",
    "state",
    "city",
];

/// One customer row.
///
/// Fields are optional so that programmatic callers can leave a column unset;
/// the reader always fills every column (short lines are padded with `""`).
/// `id` is only assigned by the store after a successful persist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub aadhaar_number: Option<String>,
    pub pan_number: Option<String>,
    pub state: Option<String>,
    pub city: Option<String>,
}

impl Customer {
    /// Build a customer from positional fields. Missing trailing fields become `""`,
    /// fields past the seventh are ignored.
    pub fn from_fields<'a, I>(fields: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut values = fields.into_iter().map(str::to_owned);
        let mut next = || Some(values.next().unwrap_or_default());

        Self {
            id: None,
            name: next(),
            email: next(),
            phone_number: next(),
            aadhaar_number: next(),
            pan_number: next(),
            state: next(),
            city: next(),
        }
    }

    /// Identifier used in diagnostics (the raw name)
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<unnamed>")
    }
}

/// Strip leading and trailing spaces and ASCII control characters.
///
/// Non-ASCII whitespace such as U+00A0 is kept, so it still fails the field rules.
pub fn trim_field(value: &str) -> &str {
    value.trim_matches(|c: char| c <= ' ')
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_field_strips_controls_not_unicode_spaces() {
        assert_eq!(trim_field("\x01 John\t\r"), "John");
        assert_eq!(trim_field("\u{a0}John"), "\u{a0}John");
        assert_eq!(trim_field(" \x1f "), "");
    }

    #[test]
    fn test_from_fields_positional() {
        let customer = Customer::from_fields([
            "John Doe",
            "john@x.com",
            "9876543210",
            "123456789012",
            "ABCDE1234F",
            "Karnataka",
            "Bangalore",
        ]);

        assert_eq!(customer.id, None);
        assert_eq!(customer.name.as_deref(), Some("John Doe"));
        assert_eq!(customer.aadhaar_number.as_deref(), Some("123456789012"));
        assert_eq!(customer.city.as_deref(), Some("Bangalore"));
    }

    #[test]
    fn test_from_fields_pads_short_rows() {
        let customer = Customer::from_fields(["Jane", "jane@x.com"]);

        assert_eq!(customer.email.as_deref(), Some("jane@x.com"));
        assert_eq!(customer.phone_number.as_deref(), Some(""));
        assert_eq!(customer.city.as_deref(), Some(""));
    }

    #[test]
    fn test_from_fields_ignores_extra_columns() {
        let customer =
            Customer::from_fields(["A", "a@b.co", "9", "1", "P", "S", "C", "extra", "more"]);
        assert_eq!(customer.city.as_deref(), Some("C"));
    }

    #[test]
    fn test_display_name_fallback() {
        assert_eq!(Customer::default().display_name(), "<unnamed>");
    }

    #[test]
    fn test_serialization_uses_camel_case() {
        let json = serde_json::to_value(Customer::from_fields(["A"])).unwrap();
        assert!(json.get("phoneNumber").is_some());
        assert!(json.get("id").is_none());
    }
}
