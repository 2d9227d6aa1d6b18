//! The wikipoi library turns MediaWiki pages describing points of interest
//! (giveboxes, public bookshelves, ...) into structured JSON/CSV and serves them over HTTP.

pub mod classify;
pub mod constants;
pub mod error;
pub mod export;
pub mod locations;
pub mod parse;
pub mod sections;
pub mod server;
pub mod table;
pub mod vision;
pub mod wiki;

/// Enum representing how a fetched page is rendered.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum PageView {
    /// Section title to parsed section content
    #[default]
    Structured,
    /// Records of the fixed five column location table
    Locations,
    /// Raw rows of the page's wikitable
    Table,
}

impl std::str::FromStr for PageView {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.to_lowercase().as_str() {
            "structured" => Ok(PageView::Structured),
            "locations" => Ok(PageView::Locations),
            "table" => Ok(PageView::Table),
            _ => Err(format!("Invalid page view: {}", input)),
        }
    }
}

pub use classify::{ParsedValue, SectionShape, classify, detect_shape};
pub use error::{ParseError, SectionError, VisionError, WikiError};
pub use export::export;
pub use locations::{LocationReader, LocationRecord, parse_locations};
pub use parse::{Assembler, Assembly, StructuredDocument, parse_document};
pub use sections::{Section, split_sections};
pub use table::{Table, extract_table};
