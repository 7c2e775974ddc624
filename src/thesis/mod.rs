//! Thesis-fit classification.
//!
//! The model proposes a fit label, bullets, and snapshot text; everything
//! here turns that into a stable [`ThesisFitResult`](crate::types::ThesisFitResult)
//! that keeps real thesis conflicts apart from missing information.

pub mod classify;
pub mod heuristics;
pub mod prompt;
pub mod response;
pub mod snapshot;

use crate::text::normalize::clean_extracted_text;
use crate::types::DiligenceRecord;

/// Record plus the cleaned text corpus the heuristics scan.
pub struct ThesisContext<'a> {
    pub record: &'a DiligenceRecord,
    pub corpus: String,
}

impl<'a> ThesisContext<'a> {
    pub fn new(record: &'a DiligenceRecord) -> Self {
        let mut parts: Vec<String> = Vec::new();
        for field in [
            record.company_one_liner.as_deref(),
            record.company_description.as_deref(),
            record.notes.as_deref(),
        ]
        .into_iter()
        .flatten()
        {
            parts.push(clean_extracted_text(field));
        }
        parts.extend(
            record
                .categorized_notes
                .iter()
                .map(|n| clean_extracted_text(&n.text)),
        );
        parts.extend(record.usable_documents().map(|d| clean_extracted_text(d.text())));
        parts.retain(|p| !p.is_empty());

        Self {
            record,
            corpus: parts.join("\n"),
        }
    }

    pub fn company_name(&self) -> &str {
        self.record.company_name.trim()
    }

    pub fn has_usable_documents(&self) -> bool {
        self.record.usable_documents().next().is_some()
    }
}
