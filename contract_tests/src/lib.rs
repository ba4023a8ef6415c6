//! # Wire Contract Tests
//!
//! "Golden" tests for the RPC wire schema, so field names and error kinds
//! don't drift accidentally over time. Both peers of a link may be built from
//! different versions; these names are what they agree on.
//!
//! ## Structure
//!
//! - [`request`]: request envelope fields
//! - [`response`]: response envelope fields, error body, progress flag
//! - [`cancel`]: the reserved cancel notice

pub mod cancel;
pub mod request;
pub mod response;

/// Common helpers for contract validation
pub mod test_helpers {
    use serde_json::Value;

    /// Asserts that an object payload has exactly these top-level fields
    pub fn verify_field_set(payload: &Value, expected: &[&str]) {
        let object = payload
            .as_object()
            .unwrap_or_else(|| panic!("payload is not an object: {}", payload));
        let mut actual: Vec<&str> = object.keys().map(String::as_str).collect();
        actual.sort_unstable();
        let mut expected = expected.to_vec();
        expected.sort_unstable();
        assert_eq!(
            actual, expected,
            "Wire fields changed: expected {:?}, got {:?}",
            expected, actual
        );
    }

    /// Asserts a string field's value
    pub fn verify_str_field(payload: &Value, field: &str, expected: &str) {
        assert_eq!(
            payload.get(field).and_then(Value::as_str),
            Some(expected),
            "Field '{}' changed in {}",
            field,
            payload
        );
    }
}
