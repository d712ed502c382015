//! Slug derivation and validation.
//!
//! Agent slugs are caller-provided and validated; project slugs are derived
//! from the project name. Both obey `^[a-z0-9][a-z0-9_-]*$`.

/// Check a caller-provided slug against `^[a-z0-9][a-z0-9_-]*$`.
pub fn validate_slug(slug: &str) -> bool {
    let mut chars = slug.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c.is_ascii_digit() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

/// Derive a slug from free text: lowercase, non-alphanumerics collapse to a
/// single `-`, leading/trailing dashes trimmed.
pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_dash = true; // suppress a leading dash
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}
