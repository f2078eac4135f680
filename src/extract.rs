//! Link extraction - pulls outgoing link targets out of raw page text
//!
//! The engine never parses markup itself; it talks to a [`LinkExtractor`]
//! and stores whatever targets come back. The bundled extractor understands
//! bracket markup:
//! - `[Target]` and `[label|Target]`
//! - `[[` escapes a literal bracket
//! - external links, variables and numeric footnotes are not page links
//! - `{{{ ... }}}` blocks are opaque code

use regex::Regex;
use std::sync::OnceLock;

/// Extracts the outgoing link targets a page's current text contains.
///
/// Returned targets keep their order of appearance and may repeat; the
/// graph deduplicates. Targets may name pages that do not exist, and may
/// be attachments (`Page/file.ext`).
pub trait LinkExtractor: Send + Sync {
    /// Extract targets from `text`, the raw content of `page`.
    fn extract(&self, page: &str, text: &str) -> Vec<String>;
}

static LINK_RE: OnceLock<Regex> = OnceLock::new();
static CODE_RE: OnceLock<Regex> = OnceLock::new();

// "[[", or a bracket link whose body contains no brackets.
fn link_re() -> &'static Regex {
    LINK_RE.get_or_init(|| Regex::new(r"\[\[|\[([^\[\]]+)\]").expect("link regex"))
}

fn code_re() -> &'static Regex {
    CODE_RE.get_or_init(|| Regex::new(r"(?s)\{\{\{.*?\}\}\}").expect("code regex"))
}

/// Bracket-markup link extractor.
#[derive(Debug, Default, Clone, Copy)]
pub struct WikiLinkExtractor;

impl WikiLinkExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Interpret one bracket body as a link target, or reject it.
    fn target_of(&self, page: &str, body: &str) -> Option<String> {
        // [label|Target] - the target is after the last pipe
        let target = match body.rsplit_once('|') {
            Some((_, t)) => t.trim(),
            None => body.trim(),
        };
        if target.is_empty() {
            return None;
        }
        // Variables and plugins: [{$username}], [{Counter}]
        if target.starts_with('{') {
            return None;
        }
        // External links are not page references
        if target.contains("://") || target.starts_with("mailto:") {
            return None;
        }
        // Footnote references: [1], [2]
        if target.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        // Drop a section anchor: [Page#Heading] points at Page
        let target = match target.split_once('#') {
            Some((page_part, _)) if !page_part.is_empty() => page_part,
            Some(_) => return None, // pure [#anchor] stays on this page
            None => target,
        };
        // A bare file-looking name links to an attachment of this page
        if !target.contains('/') && looks_like_attachment(target) {
            return Some(format!("{}/{}", page, target));
        }
        Some(target.to_string())
    }
}

impl LinkExtractor for WikiLinkExtractor {
    fn extract(&self, page: &str, text: &str) -> Vec<String> {
        let text = code_re().replace_all(text, "");
        let mut targets = Vec::new();
        for caps in link_re().captures_iter(&text) {
            // "[[" matches without a capture group; it is an escape
            let Some(body) = caps.get(1) else { continue };
            if let Some(target) = self.target_of(page, body.as_str()) {
                targets.push(target);
            }
        }
        targets
    }
}

// "file.png" but not "Release 1.0" or "e.g. this"
fn looks_like_attachment(target: &str) -> bool {
    match target.rsplit_once('.') {
        Some((stem, ext)) => {
            !stem.is_empty()
                && !stem.contains(' ')
                && (1..=4).contains(&ext.len())
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        }
        None => false,
    }
}
