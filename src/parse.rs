use std::collections::BTreeMap;

use log::debug;
use url::Url;

use crate::classify::{ParsedValue, classify};
use crate::error::SectionError;
use crate::sections::split_sections;
use crate::wiki::file_url;

/// Section title mapped to its parsed content. Empty values never appear.
pub type StructuredDocument = BTreeMap<String, ParsedValue>;

/// Result of assembling one page.
///
/// Sections that failed to parse are absent from `document` and listed in `errors`.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Assembly {
    pub document: StructuredDocument,
    pub errors: Vec<SectionError>,
}

/// Post-processing step run on the pruned document.
pub trait DocumentHook: Send + Sync {
    fn apply(&self, document: &mut StructuredDocument);
}

/// Adds an `id` entry holding the page name.
#[derive(Debug, Clone)]
pub struct InjectId {
    pub id: String,
}

impl DocumentHook for InjectId {
    fn apply(&self, document: &mut StructuredDocument) {
        document.insert("id".to_owned(), ParsedValue::OpaqueText(self.id.clone()));
    }
}

/// Replaces every file name of a file list with its absolute download URL.
#[derive(Debug, Clone)]
pub struct ResolveImageUrls {
    /// The wiki's `index.php` URL.
    pub index_url: Url,
}

impl DocumentHook for ResolveImageUrls {
    fn apply(&self, document: &mut StructuredDocument) {
        for value in document.values_mut() {
            if let ParsedValue::FileRefList(files) = value {
                for file in files.iter_mut() {
                    *file = file_url(&self.index_url, file).to_string();
                }
            }
        }
    }
}

/// Turns a page's wikitext into a [`StructuredDocument`].
///
/// Runs the section splitter, classifies every section, drops empty values and finally
/// applies the registered hooks in order.
#[derive(Default)]
pub struct Assembler {
    hooks: Vec<Box<dyn DocumentHook>>,
}

impl Assembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a hook to run after the document is assembled.
    pub fn with_hook(mut self, hook: impl DocumentHook + 'static) -> Self {
        self.hooks.push(Box::new(hook));
        self
    }

    /// Parses `wikitext`. A failing section never affects its siblings.
    pub fn assemble(&self, wikitext: &str) -> Assembly {
        let mut assembly = Assembly::default();

        for section in split_sections(wikitext) {
            match classify(section.body) {
                Ok(value) if value.is_empty() => {
                    debug!("Dropping empty section '{}'", section.title);
                }
                Ok(value) => {
                    assembly.document.insert(section.title.to_owned(), value);
                }
                Err(source) => assembly.errors.push(SectionError {
                    title: section.title.to_owned(),
                    source,
                }),
            }
        }

        for hook in &self.hooks {
            hook.apply(&mut assembly.document);
        }

        assembly
    }
}

/// Parses `wikitext` without any post-processing.
pub fn parse_document(wikitext: &str) -> Assembly {
    Assembler::new().assemble(wikitext)
}
