//! Diagnostics reported back to the caller

use crate::error::{Error, ErrorCategory};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// One finding about a configuration or an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub summary: String,
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

impl Diagnostic {
    pub fn error(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            summary: summary.into(),
            detail: detail.into(),
            attribute: None,
        }
    }

    pub fn at(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }
}

impl From<&Error> for Diagnostic {
    fn from(err: &Error) -> Self {
        Diagnostic::error(err.summary(), err.detail())
    }
}

/// Ordered collection of diagnostics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.0.push(diagnostic);
    }

    /// Record an error against an attribute path
    pub fn attribute_error(
        &mut self,
        path: &str,
        summary: impl Into<String>,
        detail: impl Into<String>,
    ) {
        self.push(Diagnostic::error(summary, detail).at(path));
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.0.extend(other.0);
    }

    pub fn has_errors(&self) -> bool {
        self.0.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter()
    }

    /// Fold error diagnostics into one validation error
    ///
    /// The first summary is kept; details are joined line by line.
    pub fn into_result(self) -> Result<(), Error> {
        let errors: Vec<&Diagnostic> = self
            .0
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .collect();
        let Some(first) = errors.first() else {
            return Ok(());
        };
        let detail = errors
            .iter()
            .map(|d| d.detail.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        Err(Error::validation(first.summary.clone(), detail))
    }

    /// Diagnostics for a failed operation
    pub fn from_error(err: &Error) -> Self {
        let mut diags = Self::new();
        diags.push(Diagnostic::from(err));
        diags
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Category label used in API error bodies
pub fn category_label(err: &Error) -> String {
    match err.category() {
        ErrorCategory::Remote if err.is_not_found() => "not_found".to_string(),
        category => category.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_into_result_joins_details() {
        let mut diags = Diagnostics::new();
        assert!(diags.clone().into_result().is_ok());

        diags.attribute_error("name", "Missing Configuration for Required Attribute", "name is required");
        diags.attribute_error("size", "Incorrect attribute value type", "size must be a number");
        assert!(diags.has_errors());
        assert_eq!(diags.len(), 2);

        let err = diags.into_result().unwrap_err();
        assert_matches!(err, Error::Validation { ref summary, ref detail }
            if summary == "Missing Configuration for Required Attribute"
                && detail == "name is required\nsize must be a number");
    }

    #[test]
    fn test_category_label() {
        let missing = Error::NotFound {
            kind: "host".into(),
            id: "h1".into(),
        };
        assert_eq!(category_label(&missing), "not_found");
        assert_eq!(category_label(&Error::validation("a", "b")), "validation");
    }
}
