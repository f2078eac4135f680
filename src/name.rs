//! Page names - canonical identity for every page in the graph
//!
//! Every name entering the engine passes through a [`NameResolver`] before
//! it is used as a map key. Attachments share the page namespace using the
//! `Page/file.ext` convention.

/// Resolves user-supplied page names to canonical map keys.
///
/// The page store decides what "canonical" means (case folding, alias
/// tables). The engine only promises to resolve every name through this
/// seam before touching either index.
pub trait NameResolver: Send + Sync {
    /// Resolve a raw name to its canonical form.
    fn resolve(&self, name: &str) -> String;
}

/// Default canonicalization: trim, collapse internal whitespace runs, and
/// uppercase the first character.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultResolver;

impl NameResolver for DefaultResolver {
    fn resolve(&self, name: &str) -> String {
        let mut out = String::with_capacity(name.len());
        let mut in_gap = false;
        for ch in name.trim().chars() {
            if ch.is_whitespace() {
                in_gap = true;
                continue;
            }
            if in_gap && !out.is_empty() {
                out.push(' ');
            }
            in_gap = false;
            if out.is_empty() {
                out.extend(ch.to_uppercase());
            } else {
                out.push(ch);
            }
        }
        out
    }
}

/// Check whether a name refers to an attachment (`Page/file.ext`).
pub fn is_attachment(name: &str) -> bool {
    name.contains('/')
}

/// The page that owns an attachment, or `None` for plain page names.
pub fn parent_page(name: &str) -> Option<&str> {
    name.split_once('/').map(|(page, _)| page)
}
