//! Splits a wikitext page into titled sections.

use log::warn;
use once_cell::sync::Lazy;
use regex::Regex;

static HEADER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*={2,}[ \t]*(?P<title>[^=\s].*?)[ \t]*={2,}[ \t]*\r?$")
        .expect("Failed to compile HEADER_REGEX")
});

/// A titled block of wikitext. Both fields borrow from the page source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Section<'a> {
    pub title: &'a str,
    pub body: &'a str,
}

/// Splits `wikitext` at every `==`-style header line.
///
/// Header depth is ignored, so `== A ==` and `==== A ====` both open a section titled `A`.
/// One trailing `:` is dropped from titles. Text before the first header belongs to no section.
/// When a title repeats, the later body replaces the earlier one in place.
pub fn split_sections(wikitext: &str) -> Vec<Section<'_>> {
    let headers: Vec<(usize, usize, &str)> = HEADER_REGEX
        .captures_iter(wikitext)
        .filter_map(|captures| {
            let whole = captures.get(0)?;
            let title = captures.name("title")?.as_str();
            Some((whole.start(), whole.end(), normalize_title(title)))
        })
        .collect();

    let mut sections: Vec<Section<'_>> = Vec::with_capacity(headers.len());
    for (index, (_, body_start, title)) in headers.iter().enumerate() {
        let body_end = headers
            .get(index + 1)
            .map_or(wikitext.len(), |(next_start, _, _)| *next_start);
        let body = wikitext.get(*body_start..body_end).unwrap_or_default().trim();

        if title.is_empty() {
            continue;
        }

        if let Some(existing) = sections.iter_mut().find(|section| section.title == *title) {
            warn!("Section '{title}' appears more than once, keeping the last one");
            existing.body = body;
        } else {
            sections.push(Section { title, body });
        }
    }

    sections
}

fn normalize_title(title: &str) -> &str {
    let title = title.trim();
    title.strip_suffix(':').unwrap_or(title).trim_end()
}
