//! Redaction of bearer values before they reach logs or the audit trail.

pub const MASK_CHAR: char = '*';

/// Number of trailing characters left readable.
pub const VISIBLE_SUFFIX: usize = 4;

/// Mask every character that has at least [`VISIBLE_SUFFIX`] characters
/// after it. Values of length <= 4 come back unchanged.
///
/// Operates on chars, not bytes, so multi-byte input never splits.
pub fn mask_token(value: &str) -> String {
    let len = value.chars().count();
    if len <= VISIBLE_SUFFIX {
        return value.to_string();
    }
    let masked = len - VISIBLE_SUFFIX;
    value
        .chars()
        .enumerate()
        .map(|(i, c)| if i < masked { MASK_CHAR } else { c })
        .collect()
}
