//! Conversation key folding.
//!
//! Channel and nick targets compare case-insensitively under the RFC 1459
//! case mapping, where `[]\~` are the uppercase forms of `{}|^`. Every map in
//! the store is keyed by the folded form; the display form is kept alongside.

#[inline]
const fn fold_char(c: char) -> char {
    match c {
        '[' => '{',
        ']' => '}',
        '\\' => '|',
        '~' => '^',
        'A'..='Z' => c.to_ascii_lowercase(),
        _ => c,
    }
}

/// Fold a conversation key (channel or nick) for lookup.
pub fn fold_key(key: &str) -> String {
    key.chars().map(fold_char).collect()
}

/// Compare two nicks or conversation keys under the folded mapping.
pub fn keys_match(a: &str, b: &str) -> bool {
    a.len() == b.len() && a.chars().zip(b.chars()).all(|(x, y)| fold_char(x) == fold_char(y))
}
