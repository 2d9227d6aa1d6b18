//! Decides which shape a section body has and parses it accordingly.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::error::ParseError;
use crate::table::{Table, extract_table};

static KEY_VALUE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\*[ \t]*(?P<key>.+?):(?:[ \t]+(?P<value>.*?))?[ \t]*\r?$")
        .expect("Failed to compile KEY_VALUE_REGEX")
});

static FILE_EMBED_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\[\[[ \t]*(?:file|datei|image|bild)[ \t]*:(?P<name>[^|\]]*)(?:\|[^\]]*)?\]\]")
        .expect("Failed to compile FILE_EMBED_REGEX")
});

/// Parsed content of one section.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParsedValue {
    /// `* key: value` bullet lines.
    KeyValueMap(BTreeMap<String, String>),
    /// File names of `[[File:...]]` embeds in document order.
    FileRefList(Vec<String>),
    /// Rows of a wikitable.
    Table(Table),
    /// The trimmed body when nothing else matched.
    OpaqueText(String),
}

impl ParsedValue {
    /// Whether this is the shape-appropriate empty value.
    pub fn is_empty(&self) -> bool {
        match self {
            ParsedValue::KeyValueMap(map) => map.is_empty(),
            ParsedValue::FileRefList(files) => files.is_empty(),
            ParsedValue::Table(rows) => rows.is_empty(),
            ParsedValue::OpaqueText(text) => text.is_empty(),
        }
    }
}

/// The content shapes a section can take, in detection order.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SectionShape {
    KeyValueMap,
    FileRefList,
    Table,
    OpaqueText,
}

impl SectionShape {
    /// First match wins. `OpaqueText` matches everything and therefore comes last.
    pub const PRECEDENCE: [SectionShape; 4] = [
        SectionShape::KeyValueMap,
        SectionShape::FileRefList,
        SectionShape::Table,
        SectionShape::OpaqueText,
    ];

    /// Whether a trimmed section body qualifies for this shape.
    pub fn matches(self, body: &str) -> bool {
        match self {
            SectionShape::KeyValueMap => body.starts_with('*'),
            SectionShape::FileRefList => FILE_EMBED_REGEX.is_match(body),
            SectionShape::Table => body.contains("{|"),
            SectionShape::OpaqueText => true,
        }
    }
}

/// Returns the first shape of [`SectionShape::PRECEDENCE`] that `body` matches.
pub fn detect_shape(body: &str) -> SectionShape {
    let body = body.trim();
    SectionShape::PRECEDENCE
        .into_iter()
        .find(|shape| shape.matches(body))
        .unwrap_or(SectionShape::OpaqueText)
}

/// Classifies a section body and parses it into the matching [`ParsedValue`].
///
/// # Errors
///
/// Returns [`ParseError::MalformedTable`] if the body is a table whose delimiters or rows are broken.
pub fn classify(body: &str) -> Result<ParsedValue, ParseError> {
    let body = body.trim();
    Ok(match detect_shape(body) {
        SectionShape::KeyValueMap => ParsedValue::KeyValueMap(parse_key_values(body)),
        SectionShape::FileRefList => ParsedValue::FileRefList(parse_file_refs(body)),
        SectionShape::Table => ParsedValue::Table(extract_table(body)?),
        SectionShape::OpaqueText => ParsedValue::OpaqueText(body.to_owned()),
    })
}

/// Collects every `* key: value` line. Other lines are skipped.
pub fn parse_key_values(body: &str) -> BTreeMap<String, String> {
    KEY_VALUE_REGEX
        .captures_iter(body)
        .filter_map(|captures| {
            let key = captures.name("key")?.as_str().trim();
            let value = captures.name("value").map_or("", |value| value.as_str());
            Some((key.to_owned(), value.to_owned()))
        })
        .collect()
}

/// Collects the file name of every embed, dropping display options after the first `|`.
pub fn parse_file_refs(body: &str) -> Vec<String> {
    FILE_EMBED_REGEX
        .captures_iter(body)
        .filter_map(|captures| {
            let name = captures.name("name")?.as_str().trim();
            (!name.is_empty()).then(|| name.to_owned())
        })
        .collect()
}
