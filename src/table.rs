//! Extracts rows from a `{| ... |}` wikitable.

use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ParseError;

static ATTRIBUTE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:class|style)="[^"]*"[ \t]*"#).expect("Failed to compile ATTRIBUTE_REGEX")
});

/// One table row, cells in written order.
pub type Row = Vec<String>;

/// Table rows in written order. Rows may differ in length.
pub type Table = Vec<Row>;

/// Returns the text strictly between the first `{|` and the last `|}`.
///
/// # Errors
///
/// Returns [`ParseError::MalformedTable`] if either delimiter is missing or they are out of order.
pub fn inner_block(wikitext: &str) -> Result<&str, ParseError> {
    let start = wikitext.find("{|").ok_or(ParseError::MalformedTable {
        row: None,
        reason: "missing table start marker '{|'",
    })?;
    let end = wikitext.rfind("|}").ok_or(ParseError::MalformedTable {
        row: None,
        reason: "missing table end marker '|}'",
    })?;

    wikitext
        .get(start + 2..end)
        .ok_or(ParseError::MalformedTable {
            row: None,
            reason: "table end marker precedes start marker",
        })
}

/// Extracts the data rows of the first table in `wikitext`.
///
/// Caption and header rows are dropped, as is an undecorated first row. Rows with
/// `rowspan`/`colspan` are skipped with a warning. `class="..."` and `style="..."`
/// attributes are removed before cells are split.
///
/// # Errors
///
/// Returns [`ParseError::MalformedTable`] if the delimiters are broken or a row after the
/// first one does not start with a cell prefix. No rows are returned in that case.
pub fn extract_table(wikitext: &str) -> Result<Table, ParseError> {
    let inner = inner_block(wikitext)?;
    let mut table = Table::new();

    for (index, raw_row) in inner.split("|-").enumerate() {
        if let Some(row) = parse_row(index, raw_row)? {
            table.push(row);
        }
    }

    Ok(table)
}

/// A single line of a table row.
#[derive(Debug, PartialEq)]
enum Line {
    Blank,
    /// Caption, header cells or stray table delimiters. A `|+` caption only exists before
    /// the first `|-`; later it is a cell whose value starts with `+`.
    Control,
    /// Content after the `|` prefix.
    Cell(String),
    /// A line without prefix, continuing the previous cell.
    Text(String),
}

impl Line {
    fn parse(raw: &str, caption_allowed: bool) -> Self {
        let had_attributes = ATTRIBUTE_REGEX.is_match(raw);
        let stripped = ATTRIBUTE_REGEX.replace_all(raw, " ");
        let line = stripped.trim();

        if line.is_empty() {
            return Line::Blank;
        }
        let is_caption = caption_allowed && line.starts_with("|+");
        if is_caption
            || ["!", "{|", "|}"]
                .iter()
                .any(|marker| line.starts_with(marker))
        {
            return Line::Control;
        }

        match line.strip_prefix('|') {
            Some(content) => {
                let content = content.trim_start();
                // `| style="..." | value` leaves the attribute separator behind.
                let content = match content.strip_prefix('|') {
                    Some(rest) if had_attributes && !rest.starts_with('|') => rest,
                    _ => content,
                };
                Line::Cell(content.to_owned())
            }
            None => Line::Text(line.to_owned()),
        }
    }
}

fn parse_row(index: usize, raw_row: &str) -> Result<Option<Row>, ParseError> {
    if raw_row.contains("rowspan=") || raw_row.contains("colspan=") {
        warn!(
            "Skipping row: {}",
            ParseError::UnsupportedRowShape { row: index }
        );
        return Ok(None);
    }

    let lines: Vec<Line> = raw_row
        .lines()
        .map(|line| Line::parse(line, index == 0))
        .filter(|line| *line != Line::Blank)
        .collect();

    match lines.first() {
        None => return Ok(None),
        Some(Line::Text(_)) if index == 0 => {
            debug!("Ignoring undecorated first row");
            return Ok(None);
        }
        Some(Line::Text(_)) => {
            return Err(ParseError::MalformedTable {
                row: Some(index),
                reason: "row does not start with a cell prefix",
            });
        }
        Some(_) => {}
    }

    let mut cell_lines: Vec<String> = Vec::new();
    let mut continues_cell = false;
    for line in lines {
        match line {
            Line::Cell(content) => {
                cell_lines.push(content);
                continues_cell = true;
            }
            Line::Text(text) if continues_cell => {
                if let Some(last) = cell_lines.last_mut() {
                    last.push('\n');
                    last.push_str(&text);
                }
            }
            Line::Control => continues_cell = false,
            Line::Text(_) | Line::Blank => {}
        }
    }

    if cell_lines.is_empty() {
        debug!("Ignoring caption/header row {index}");
        return Ok(None);
    }

    Ok(Some(split_cells(&cell_lines)))
}

/// Splits on `||` when any line contains it, otherwise every line is one cell.
fn split_cells(cell_lines: &[String]) -> Row {
    if cell_lines.iter().any(|line| line.contains("||")) {
        cell_lines
            .iter()
            .flat_map(|line| line.split("||"))
            .map(|cell| cell.trim().to_owned())
            .collect()
    } else {
        cell_lines
            .iter()
            .map(|cell| cell.trim().to_owned())
            .collect()
    }
}
