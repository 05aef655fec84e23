//! Engine tests, split by concern.

mod resp_parser_tests;
mod transaction_tests;

use bytes::Bytes;

/// Build an argument vector from string literals.
pub(crate) fn argv(parts: &[&str]) -> Vec<Bytes> {
    parts.iter().map(|p| Bytes::from(p.to_string())).collect()
}
