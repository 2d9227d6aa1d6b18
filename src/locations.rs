//! Reads the list of all locations, a wikitable with a fixed five column layout.

use log::debug;
use serde::Serialize;

use crate::error::ParseError;

/// One row of the location list. Fields the row did not supply stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LocationRecord {
    #[serde(rename = "Bezeichnung / ID", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "Adresse", skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(rename = "Latitude", skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(rename = "Longitude", skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(rename = "Kategorie", skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl LocationRecord {
    /// Puts `value` into the next unfilled field. Returns `Ok(false)` when all fields are set.
    fn fill_next(&mut self, value: &str, row: usize) -> Result<bool, ParseError> {
        if self.id.is_none() {
            self.id = Some(value.to_owned());
        } else if self.address.is_none() {
            self.address = Some(value.to_owned());
        } else if self.latitude.is_none() {
            self.latitude = Some(parse_coordinate(value, row, "Latitude")?);
        } else if self.longitude.is_none() {
            self.longitude = Some(parse_coordinate(value, row, "Longitude")?);
        } else if self.category.is_none() {
            self.category = Some(value.to_owned());
        } else {
            return Ok(false);
        }
        Ok(true)
    }
}

fn parse_coordinate(value: &str, row: usize, field: &'static str) -> Result<f64, ParseError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|number| number.is_finite())
        .ok_or_else(|| ParseError::InvalidNumber {
            row,
            field,
            value: value.to_owned(),
        })
}

/// Reducer state between two `|-` separators.
#[derive(Debug)]
enum RowState {
    /// No cell seen since the last separator.
    Idle,
    /// Cells of the current row are being collected. A bad coordinate poisons the record.
    Accumulating(Result<LocationRecord, ParseError>),
}

/// Iterator over the records of a location list, one item per non-empty row.
///
/// A row with an unparsable coordinate yields an `Err` for that row only; reading continues
/// with the next row.
#[derive(Debug)]
pub struct LocationReader<'a> {
    lines: std::str::Lines<'a>,
    state: RowState,
    row: usize,
}

impl<'a> LocationReader<'a> {
    pub fn new(wikitext: &'a str) -> Self {
        Self {
            lines: wikitext.lines(),
            state: RowState::Idle,
            row: 0,
        }
    }

    fn commit(&mut self) -> Option<Result<LocationRecord, ParseError>> {
        match std::mem::replace(&mut self.state, RowState::Idle) {
            RowState::Idle => None,
            RowState::Accumulating(record) => Some(record),
        }
    }

    fn accept_cell(&mut self, value: &str) {
        let row = self.row;
        let record = match std::mem::replace(&mut self.state, RowState::Idle) {
            RowState::Idle => Ok(LocationRecord::default()),
            RowState::Accumulating(record) => record,
        };

        let record = record.and_then(|mut pending| {
            if !pending.fill_next(value, row)? {
                debug!("Ignoring surplus cell in row {row}: {value}");
            }
            Ok(pending)
        });

        self.state = RowState::Accumulating(record);
    }
}

impl Iterator for LocationReader<'_> {
    type Item = Result<LocationRecord, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(line) = self.lines.next() {
            let line = line.trim();

            if line.starts_with("|-") {
                let committed = self.commit();
                self.row += 1;
                if committed.is_some() {
                    return committed;
                }
            } else if (self.row == 0 && line.starts_with("|+")) || line.starts_with("|}") {
                continue;
            } else if let Some(value) = line.strip_prefix('|') {
                self.accept_cell(value.trim());
            }
        }

        self.commit()
    }
}

/// Reads every record of a location list.
///
/// # Errors
///
/// Returns [`ParseError::InvalidNumber`] for the first row whose latitude or longitude
/// is not a finite floating point number.
pub fn parse_locations(wikitext: &str) -> Result<Vec<LocationRecord>, ParseError> {
    LocationReader::new(wikitext).collect()
}
