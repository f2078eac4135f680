//! Plural matching - read-time English singular/plural equivalence
//!
//! "Cats" and "Cat" are treated as the same lookup key when the feature is
//! enabled. The transform is a single trailing-`s` add or strip; it never
//! recurses and never mutates the underlying indexes.

use crate::name;

/// The singular/plural counterpart of a page name, if one exists.
///
/// Returns `None` for empty names, attachments, and names whose tail is
/// not alphabetic (`"Release 1.0"` has no meaningful plural).
pub fn plural_variant(page: &str) -> Option<String> {
    if page.is_empty() || name::is_attachment(page) {
        return None;
    }
    let last = page.chars().last()?;
    if !last.is_ascii_alphabetic() {
        return None;
    }
    if last == 's' || last == 'S' {
        let stripped = &page[..page.len() - 1];
        if stripped.is_empty() {
            return None;
        }
        Some(stripped.to_string())
    } else {
        Some(format!("{}s", page))
    }
}
