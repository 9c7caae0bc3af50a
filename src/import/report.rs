use serde::Serialize;

use super::multiplex::SourceFormat;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorSample {
    pub row: usize,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Warning {
    pub row: usize,
    pub message: String,
}

/// Per-entity counters for one unit or a whole run.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct EntityCounts {
    pub identities_upserted: usize,
    pub identities_created: usize,
    pub subjects_upserted: usize,
    pub subjects_created: usize,
    pub staff_assignments_upserted: usize,
    pub staff_assignments_created: usize,
    pub enrollments_upserted: usize,
    pub enrollments_created: usize,
    pub assessments_upserted: usize,
    pub assessments_created: usize,
}

impl EntityCounts {
    pub fn merge(&mut self, other: &EntityCounts) {
        self.identities_upserted += other.identities_upserted;
        self.identities_created += other.identities_created;
        self.subjects_upserted += other.subjects_upserted;
        self.subjects_created += other.subjects_created;
        self.staff_assignments_upserted += other.staff_assignments_upserted;
        self.staff_assignments_created += other.staff_assignments_created;
        self.enrollments_upserted += other.enrollments_upserted;
        self.enrollments_created += other.enrollments_created;
        self.assessments_upserted += other.assessments_upserted;
        self.assessments_created += other.assessments_created;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub source_path: String,
    pub source_sha256: String,
    pub delimiter: String,
    pub format: SourceFormat,
    pub subjects_detected: Vec<String>,
    pub dry_run: bool,
    pub rows_read: usize,
    pub rows_ok: usize,
    pub rows_error: usize,
    #[serde(flatten)]
    pub counts: EntityCounts,
    pub grades_dropped: usize,
    pub empty_units_skipped: usize,
    pub error_samples: Vec<ErrorSample>,
    pub warnings: Vec<Warning>,
    pub warnings_total: usize,
    #[serde(skip)]
    max_error_samples: usize,
    #[serde(skip)]
    max_warnings: usize,
}

impl ImportReport {
    pub fn new(max_error_samples: usize, max_warnings: usize) -> Self {
        Self {
            source_path: String::new(),
            source_sha256: String::new(),
            delimiter: ",".to_string(),
            format: SourceFormat::Narrow,
            subjects_detected: Vec::new(),
            dry_run: false,
            rows_read: 0,
            rows_ok: 0,
            rows_error: 0,
            counts: EntityCounts::default(),
            grades_dropped: 0,
            empty_units_skipped: 0,
            error_samples: Vec::new(),
            warnings: Vec::new(),
            warnings_total: 0,
            max_error_samples,
            max_warnings,
        }
    }

    /// Counts a failed unit; only the first `max_error_samples` are kept.
    pub fn record_error(&mut self, row: usize, message: String, data: Option<serde_json::Value>) {
        self.rows_error += 1;
        if self.error_samples.len() < self.max_error_samples {
            self.error_samples.push(ErrorSample { row, message, data });
        }
    }

    pub fn record_warning(&mut self, row: usize, message: String) {
        tracing::warn!(row, "{}", message);
        self.warnings_total += 1;
        if self.warnings.len() < self.max_warnings {
            self.warnings.push(Warning { row, message });
        }
    }

    pub fn finalize(&mut self) {
        self.error_samples.truncate(self.max_error_samples);
        self.warnings.truncate(self.max_warnings);
    }

    pub fn has_errors(&self) -> bool {
        self.rows_error > 0
    }
}
