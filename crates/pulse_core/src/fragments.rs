//! Post-processing passes over extracted text fragments.
//!
//! Both passes preserve input order; the numbering pass depends on it.

/// Category labels recognized by the numbering pass, as they appear at the
/// start of a fragment on the overview pages.
pub const CATEGORY_KEYWORDS: [&str; 6] = [
    "Performance",
    "Valuation",
    "Growth",
    "Profitability",
    "Entry point",
    "Red flags",
];

/// Cleans raw fragments: flattens embedded line breaks to single spaces,
/// trims, and drops fragments that are empty after trimming.
pub fn tidy_fragments(raw: impl IntoIterator<Item = String>) -> Vec<String> {
    raw.into_iter()
        .map(|fragment| flatten_lines(&fragment))
        .filter(|fragment| !fragment.is_empty())
        .collect()
}

fn flatten_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(line);
    }
    out
}

/// Rewrites fragments under their current category heading.
///
/// A fragment starting with a keyword becomes the current category; each
/// following non-keyword fragment is rewritten `"<category> <n>): <text>"`,
/// with `n` restarting at 1 under every new category. Fragments seen before
/// the first keyword pass through unchanged.
pub fn number_by_category<S: AsRef<str>>(fragments: Vec<String>, keywords: &[S]) -> Vec<String> {
    let mut current: Option<String> = None;
    let mut ordinal = 0usize;
    fragments
        .into_iter()
        .map(|fragment| {
            let keyword = keywords
                .iter()
                .map(|keyword| -> &str { keyword.as_ref() })
                .find(|keyword| fragment.starts_with(keyword));
            if let Some(keyword) = keyword {
                current = Some(keyword.to_string());
                ordinal = 0;
                fragment
            } else if let Some(category) = current.as_deref() {
                ordinal += 1;
                format!("{category} {ordinal}): {fragment}")
            } else {
                fragment
            }
        })
        .collect()
}
