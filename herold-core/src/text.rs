//! Byte-capped string handling for event and alert fields.
//!
//! Oversized values are truncated, never rejected. Truncation always lands on
//! a UTF-8 character boundary so the result is still valid text.

/// Channel names, tags and other identifiers.
pub const MAX_NAME_BYTES: usize = 64;
/// Sources, ids, correlation ids and error type names.
pub const MAX_IDENTIFIER_BYTES: usize = 128;
/// Alert messages and failure reasons.
pub const MAX_MESSAGE_BYTES: usize = 512;

/// Returns `value` cut down to at most `max_bytes` bytes.
pub fn truncate_bytes(value: &str, max_bytes: usize) -> String {
    if value.len() <= max_bytes {
        return value.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !value.is_char_boundary(end) {
        end -= 1;
    }
    value[..end].to_string()
}

/// Owned variant of [`truncate_bytes`] that avoids a copy when nothing is cut.
pub fn truncate_owned(mut value: String, max_bytes: usize) -> String {
    if value.len() <= max_bytes {
        return value;
    }
    let mut end = max_bytes;
    while end > 0 && !value.is_char_boundary(end) {
        end -= 1;
    }
    value.truncate(end);
    value
}
