//! Diagnostics surfaced to the orchestrating engine.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Diagnostic severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// The operation failed.
    Error,
    /// The operation succeeded but something needs attention.
    Warning,
}

/// A structured message attached to an operation result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// The severity of the diagnostic.
    pub severity: Severity,
    /// A short summary of the issue.
    pub summary: String,
    /// A detailed description of the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// The attribute path where the issue occurred.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

impl Diagnostic {
    /// Create an error diagnostic.
    pub fn error(summary: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    /// Create a warning diagnostic.
    pub fn warning(summary: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    /// Add detail to this diagnostic.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Set the attribute path for this diagnostic.
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    /// Whether this diagnostic fails the operation.
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl From<&Error> for Diagnostic {
    fn from(err: &Error) -> Self {
        let summary = match err {
            Error::Config(_) => "Invalid Configuration",
            Error::PartialFailure { .. } => "Resource Partially Applied",
            Error::AggregatedDelete(_) => "Failed to Unassign IP Addresses",
            Error::Cancelled(_) | Error::DeadlineExceeded(_) => "Operation Interrupted",
            Error::InvalidState(_) | Error::StateStore(_) | Error::Io(_) | Error::Json(_) => {
                "Invalid Resource State"
            }
            Error::Api { .. } | Error::Http(_) | Error::Operation { .. } => {
                "Linode API Request Failed"
            }
        };
        Diagnostic::error(summary).with_detail(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_maps_to_error_diagnostic() {
        let diag = Diagnostic::from(&Error::config("linode_id is required"));
        assert!(diag.is_error());
        assert_eq!(diag.summary, "Invalid Configuration");
        assert_eq!(
            diag.detail.as_deref(),
            Some("Configuration error: linode_id is required")
        );
    }

    #[test]
    fn local_failures_are_not_labelled_as_api_failures() {
        let io = Error::from(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "state.json",
        ));
        assert_eq!(Diagnostic::from(&io).summary, "Invalid Resource State");

        let json = Error::from(serde_json::from_str::<u32>("not json").unwrap_err());
        assert_eq!(Diagnostic::from(&json).summary, "Invalid Resource State");

        let api = Error::api(500, "boom").context("reading IP address 192.0.2.10");
        assert_eq!(Diagnostic::from(&api).summary, "Linode API Request Failed");
    }

    #[test]
    fn warning_builder() {
        let diag = Diagnostic::warning("Assignment drift")
            .with_detail("192.0.2.10 is bound to linode 2, expected 1")
            .with_attribute("assignments[0].linode_id");
        assert!(!diag.is_error());
        assert_eq!(diag.attribute.as_deref(), Some("assignments[0].linode_id"));

        let json = serde_json::to_value(&diag).unwrap();
        assert_eq!(json["severity"], "warning");
    }
}
