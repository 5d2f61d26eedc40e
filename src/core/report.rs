//! Per-request journal of what ran, what was skipped and why.

use serde::Serialize;
use tracing::{debug, warn};

use crate::types::Artifact;

/// An operation that took effect
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedOperation {
    pub operation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
    pub detail: String,
}

/// An operation (or part of one) that was skipped without failing the request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedOperation {
    pub operation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
    pub reason: String,
}

/// Collects outcomes while a request executes
#[derive(Debug, Default)]
pub struct Journal {
    applied: Vec<AppliedOperation>,
    skipped: Vec<SkippedOperation>,
    notes: Vec<String>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn applied(&mut self, operation: &str, sheet: Option<&str>, detail: impl Into<String>) {
        let detail = detail.into();
        debug!(operation, sheet, %detail, "operation applied");
        self.applied.push(AppliedOperation {
            operation: operation.to_string(),
            sheet: sheet.map(str::to_string),
            detail,
        });
    }

    pub fn skipped(&mut self, operation: &str, sheet: Option<&str>, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(operation, sheet, %reason, "operation skipped");
        self.skipped.push(SkippedOperation {
            operation: operation.to_string(),
            sheet: sheet.map(str::to_string),
            reason,
        });
    }

    pub fn note(&mut self, note: impl Into<String>) {
        let note = note.into();
        debug!(%note, "note");
        self.notes.push(note);
    }

    pub fn applied_count(&self) -> usize {
        self.applied.len()
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    pub fn into_report(self, artifact: &Artifact, continuation: &str) -> ApplyReport {
        ApplyReport {
            artifact_id: artifact.id.clone(),
            filename: artifact.filename(),
            sheet_names: artifact.sheet_names(),
            row_counts: artifact.row_counts(),
            continuation: continuation.to_string(),
            applied: self.applied,
            skipped: self.skipped,
            notes: self.notes,
        }
    }
}

/// Result of one `apply`: `{filename, sheetNames, rowCounts}` plus the journal
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyReport {
    pub artifact_id: String,
    pub filename: Option<String>,
    pub sheet_names: Vec<String>,
    pub row_counts: Vec<usize>,
    pub continuation: String,
    pub applied: Vec<AppliedOperation>,
    pub skipped: Vec<SkippedOperation>,
    pub notes: Vec<String>,
}

impl ApplyReport {
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
