//! The export module writes the rows of a page's wikitable to a CSV file.

use anyhow::{Context, Result};
use log::info;
use std::fs::{self, OpenOptions};
use std::io::Write;

use crate::table::{Table, extract_table};
use crate::wiki::WikiClient;

/// Writes `table` as comma separated rows without a header row.
///
/// Rows may have different lengths.
///
/// # Errors
///
/// Returns an error if writing to `writer` fails.
pub fn write_csv<W: Write>(writer: W, table: &Table) -> Result<()> {
    let mut csv_writer = csv::WriterBuilder::new()
        .flexible(true)
        .has_headers(false)
        .from_writer(writer);

    for row in table {
        csv_writer.write_record(row)?;
    }
    csv_writer.flush()?;

    Ok(())
}

/// Extracts the table of `wikitext` and writes it to `output_path`.
///
/// # Returns
///
/// The number of rows written.
///
/// # Errors
///
/// Returns an error if:
/// * The wikitext holds no well formed table
/// * File operations fail
pub fn export_table(wikitext: &str, output_path: &str) -> Result<usize> {
    let table = extract_table(wikitext).context("Did not find table in wiki content")?;

    let file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(output_path)
        .context(format!("Failed to open output file: {output_path}"))?;
    write_csv(file, &table)?;

    Ok(table.len())
}

/// Exports the table of a wiki page, or of a local `.md` file holding wikitext, to CSV.
///
/// # Arguments
///
/// * `client` - Wiki client used when `source` names a page
/// * `source` - A page name, or a path ending in `.md`
/// * `output_path` - Path to the CSV file to write
///
/// # Errors
///
/// Returns an error if:
/// * The page cannot be fetched or the file cannot be read
/// * The content holds no well formed table
/// * File operations fail
pub async fn export(client: &WikiClient, source: &str, output_path: &str) -> Result<()> {
    let wikitext = if source.ends_with(".md") {
        fs::read_to_string(source).context(format!("Failed to read input file: {source}"))?
    } else {
        client.fetch_wikitext(source).await?
    };

    let rows = export_table(&wikitext, output_path)?;
    info!("Exported {rows} rows from {source} to {output_path}");

    Ok(())
}
