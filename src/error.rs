//! Error and diagnostic types.
//!
//! Two kinds of problems come out of a conversion:
//! - [`PopulateError`]: fatal. The document and the skeleton disagree about
//!   the score's shape, or an internal invariant broke. The whole conversion
//!   is aborted.
//! - [`Diagnostic`]: recoverable. A sensible default was substituted and
//!   processing went on. Diagnostics are logged through the `log` facade and
//!   collected so callers can inspect them.
//!
//! Both carry the offending input line and, when known, the part and measure.

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PopulateError {
    /// The input file could not be read.
    #[error("Failed to read file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The input is not well-formed XML.
    #[error("XML parse error: {0}")]
    Xml(String),

    /// The `.mxl` archive is unreadable or has no MusicXML root file.
    #[error("MXL archive error: {0}")]
    Archive(String),

    /// The root element is not `<score-partwise>`.
    #[error("Unsupported root element: '{0}'. Only 'score-partwise' is supported.")]
    UnsupportedRoot(String),

    /// The skeleton and the population pass disagree, or an invariant broke.
    ///
    /// # Example
    /// ```
    /// # use msrlib::PopulateError;
    /// let err = PopulateError::Structural {
    ///     line: 42,
    ///     part: "P1".to_string(),
    ///     measure: "3".to_string(),
    ///     message: "tuplet end with no open tuplet".to_string(),
    /// };
    /// assert_eq!(
    ///     err.to_string(),
    ///     "Structural error at line 42 (part P1, measure 3): tuplet end with no open tuplet"
    /// );
    /// ```
    #[error("Structural error at line {line} (part {part}, measure {measure}): {message}")]
    Structural {
        line: u32,
        part: String,
        measure: String,
        message: String,
    },

    /// JSON serialization of the MSR failed.
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// What kind of recoverable problem a diagnostic reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiagnosticCategory {
    /// Unknown enumerated value, missing element, unmatched spanner stop…
    Semantic,
    /// Two encodings of the same information disagree, e.g. `<duration>` vs `<type>`.
    DataConsistency,
}

/// A recoverable problem met during conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub category: DiagnosticCategory,
    pub line: u32,
    pub part: String,
    pub measure: String,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let category = match self.category {
            DiagnosticCategory::Semantic => "warning",
            DiagnosticCategory::DataConsistency => "data consistency warning",
        };
        write!(
            f,
            "{category} at line {} (part {}, measure {}): {}",
            self.line, self.part, self.measure, self.message
        )
    }
}

/// Collects diagnostics and mirrors each one to the `log` facade.
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        log::warn!("{diagnostic}");
        self.entries.push(diagnostic);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_display_names_line_part_and_measure() {
        let d = Diagnostic {
            category: DiagnosticCategory::DataConsistency,
            line: 17,
            part: "P2".to_string(),
            measure: "5".to_string(),
            message: "duration 3 disagrees with type".to_string(),
        };
        assert_eq!(
            d.to_string(),
            "data consistency warning at line 17 (part P2, measure 5): duration 3 disagrees with type"
        );
    }

    #[test]
    fn diagnostics_keep_insertion_order() {
        let mut diags = Diagnostics::new();
        for line in [3, 1, 2] {
            diags.push(Diagnostic {
                category: DiagnosticCategory::Semantic,
                line,
                part: "P1".to_string(),
                measure: "1".to_string(),
                message: String::new(),
            });
        }
        let lines: Vec<u32> = diags.iter().map(|d| d.line).collect();
        assert_eq!(lines, vec![3, 1, 2]);
        assert_eq!(diags.len(), 3);
    }
}
