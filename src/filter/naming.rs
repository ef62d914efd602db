//! Field-name conversion between the external (camelCase) and storage
//! (snake_case) conventions.
//!
//! Every filter key, sort key and result-row key crosses this boundary.
//! For identifiers made of lowercase ASCII words and digits the two
//! functions are exact inverses of each other.

/// `createTime` -> `create_time`
pub fn to_storage_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// `create_time` -> `createTime`
///
/// A segment that does not start with a lowercase letter (digit-leading
/// words, empty segments from doubled underscores) keeps its underscore so
/// that [`to_storage_name`] can restore it.
pub fn to_external_name(name: &str) -> String {
    let mut parts = name.split('_');
    let mut out = String::with_capacity(name.len());
    if let Some(first) = parts.next() {
        out.push_str(first);
    }
    for part in parts {
        let mut chars = part.chars();
        match chars.next() {
            Some(c) if c.is_ascii_lowercase() => {
                out.push(c.to_ascii_uppercase());
                out.push_str(chars.as_str());
            }
            _ => {
                out.push('_');
                out.push_str(part);
            }
        }
    }
    out
}

/// Plain SQL identifier: `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Identifier optionally qualified by one alias or schema: `t.name`
pub fn is_qualified_identifier(name: &str) -> bool {
    match name.split_once('.') {
        Some((qualifier, column)) => is_identifier(qualifier) && is_identifier(column),
        None => is_identifier(name),
    }
}
