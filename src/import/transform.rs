use serde_json::{Map, Value};

use super::aliases::{AliasTable, FieldKey};
use super::parse;
use super::record::{AssessmentKind, CanonicalRecord, RecordBuilder, Violation};
use super::resolver::ColumnMapping;

/// One data row of the source, borrowed against the shared header row.
#[derive(Debug, Clone, Copy)]
pub struct RawRow<'a> {
    /// 0-based position among the data rows.
    pub index: usize,
    headers: &'a [String],
    values: &'a [String],
}

impl<'a> RawRow<'a> {
    pub fn new(index: usize, headers: &'a [String], values: &'a [String]) -> Self {
        Self {
            index,
            headers,
            values,
        }
    }

    /// Row number used in reports (1-based, header line not counted).
    pub fn row_number(&self) -> usize {
        self.index + 1
    }

    pub fn headers(&self) -> &'a [String] {
        self.headers
    }

    /// Missing trailing cells on short rows read as absent.
    pub fn cell(&self, col: usize) -> Option<&'a str> {
        self.values.get(col).map(String::as_str)
    }

    pub fn snapshot(&self) -> Value {
        let mut obj = Map::new();
        for (i, h) in self.headers.iter().enumerate() {
            let v = self.values.get(i).cloned().unwrap_or_default();
            obj.insert(h.clone(), Value::String(v));
        }
        Value::Object(obj)
    }
}

pub struct RowTransformer<'a> {
    table: &'a AliasTable,
}

impl<'a> RowTransformer<'a> {
    pub fn new(table: &'a AliasTable) -> Self {
        Self { table }
    }

    /// Raw cell for `key`. With a suffix, a wide header (`base + suffix`) is tried
    /// exactly, then case-insensitively, before the generic mapping.
    fn lookup<'r>(
        &self,
        row: &RawRow<'r>,
        mapping: &ColumnMapping,
        key: FieldKey,
        suffix: Option<&str>,
    ) -> Option<&'r str> {
        if let (Some(sfx), Some(base)) = (suffix, self.table.wide_base(key)) {
            let wide = format!("{}{}", base, sfx);
            let headers = row.headers();
            let col = headers.iter().position(|h| *h == wide).or_else(|| {
                headers
                    .iter()
                    .position(|h| h.trim().eq_ignore_ascii_case(&wide))
            });
            if let Some(col) = col {
                return row.cell(col);
            }
        }
        mapping.get(key).and_then(|col| row.cell(col))
    }

    fn text(
        &self,
        row: &RawRow<'_>,
        mapping: &ColumnMapping,
        key: FieldKey,
        suffix: Option<&str>,
    ) -> Option<String> {
        self.lookup(row, mapping, key, suffix)
            .and_then(parse::normalize_str)
    }

    pub fn transform(
        &self,
        row: &RawRow<'_>,
        mapping: &ColumnMapping,
        suffix: Option<&str>,
    ) -> Result<CanonicalRecord, Vec<Violation>> {
        let cell = |key: FieldKey| self.lookup(row, mapping, key, suffix).unwrap_or("");
        let text = |key: FieldKey| self.text(row, mapping, key, suffix);

        let mut b = RecordBuilder::new();
        b.email(text(FieldKey::Email).map(|e| e.to_lowercase()))
            .name(text(FieldKey::Name))
            .gender(text(FieldKey::Gender))
            .birth_date(parse::parse_date(cell(FieldKey::BirthDate)))
            .technical_school(parse::parse_bool(cell(FieldKey::TechnicalSchool)));

        let subject_name = match suffix {
            Some(sfx) => Some(sfx.to_string()),
            None => text(FieldKey::SubjectName),
        };
        b.subject_name(subject_name)
            .academic_year(parse::parse_int(cell(FieldKey::AcademicYear)))
            .subject_kind(text(FieldKey::SubjectKind))
            .modality(text(FieldKey::Modality))
            .tutor(text(FieldKey::Tutor))
            .professor(text(FieldKey::Professor));

        b.period(text(FieldKey::Period))
            .attendance(parse::parse_attendance(cell(FieldKey::Attendance)))
            .repeat_count(parse::parse_int(cell(FieldKey::RepeatCount)))
            .dropout(parse::parse_bool(cell(FieldKey::Dropout)))
            .passed(parse::parse_bool(cell(FieldKey::Passed)));

        for kind in AssessmentKind::ALL {
            let raw = cell(kind.field());
            let grade = parse::parse_grade(raw);
            if grade.is_none() && parse::parse_float(raw).is_some() {
                tracing::debug!(
                    row = row.row_number(),
                    kind = kind.code(),
                    raw,
                    "grade out of range dropped"
                );
            }
            b.grade(kind, grade);
        }

        b.build()
    }

    /// Count of grades present as numbers but outside 1..=10 after rounding.
    pub fn dropped_grades(
        &self,
        row: &RawRow<'_>,
        mapping: &ColumnMapping,
        suffix: Option<&str>,
    ) -> usize {
        AssessmentKind::ALL
            .into_iter()
            .filter(|k| {
                let raw = self.lookup(row, mapping, k.field(), suffix).unwrap_or("");
                parse::parse_float(raw).is_some() && parse::parse_grade(raw).is_none()
            })
            .count()
    }
}
