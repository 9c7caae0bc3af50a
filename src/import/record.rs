use chrono::NaiveDate;
use regex::Regex;
use std::sync::LazyLock;
use serde::Serialize;

use super::aliases::FieldKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentKind {
    Midterm1,
    Midterm2,
    Makeup1,
    Makeup2,
    Final1,
    Final2,
    Final3,
}

impl AssessmentKind {
    pub const ALL: [AssessmentKind; 7] = [
        Self::Midterm1,
        Self::Midterm2,
        Self::Makeup1,
        Self::Makeup2,
        Self::Final1,
        Self::Final2,
        Self::Final3,
    ];

    /// Stored in `assessments.kind`.
    pub fn code(self) -> &'static str {
        match self {
            Self::Midterm1 => "parcial_1",
            Self::Midterm2 => "parcial_2",
            Self::Makeup1 => "recuperatorio_1",
            Self::Makeup2 => "recuperatorio_2",
            Self::Final1 => "final_1",
            Self::Final2 => "final_2",
            Self::Final3 => "final_3",
        }
    }

    pub fn field(self) -> FieldKey {
        match self {
            Self::Midterm1 => FieldKey::Midterm1,
            Self::Midterm2 => FieldKey::Midterm2,
            Self::Makeup1 => FieldKey::Makeup1,
            Self::Makeup2 => FieldKey::Makeup2,
            Self::Final1 => FieldKey::Final1,
            Self::Final2 => FieldKey::Final2,
            Self::Final3 => FieldKey::Final3,
        }
    }

    fn slot(self) -> usize {
        match self {
            Self::Midterm1 => 0,
            Self::Midterm2 => 1,
            Self::Makeup1 => 2,
            Self::Makeup2 => 3,
            Self::Final1 => 4,
            Self::Final2 => 5,
            Self::Final3 => 6,
        }
    }
}

/// The seven graded-assessment slots, each holding an in-range grade or nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Grades([Option<u8>; 7]);

impl Grades {
    pub fn get(&self, kind: AssessmentKind) -> Option<u8> {
        self.0[kind.slot()]
    }

    pub fn set(&mut self, kind: AssessmentKind, grade: Option<u8>) {
        self.0[kind.slot()] = grade;
    }

    /// Present grades in declaration order.
    pub fn present(&self) -> impl Iterator<Item = (AssessmentKind, u8)> + '_ {
        AssessmentKind::ALL
            .into_iter()
            .filter_map(|k| self.get(k).map(|g| (k, g)))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IdentityFields {
    pub email: Option<String>,
    pub name: Option<String>,
    pub gender: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub technical_school: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SubjectFields {
    pub name: Option<String>,
    pub academic_year: Option<i64>,
    pub kind: Option<String>,
    pub modality: Option<String>,
    pub tutor: Option<String>,
    pub professor: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EnrollmentFields {
    pub period: Option<String>,
    pub attendance: Option<f64>,
    pub repeat_count: Option<i64>,
    pub dropout: Option<bool>,
    pub passed: Option<bool>,
}

/// One subject's academic data from one raw row. Every field is optional;
/// absent means unknown.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CanonicalRecord {
    pub identity: IdentityFields,
    pub subject: SubjectFields,
    pub enrollment: EnrollmentFields,
    pub grades: Grades,
}

impl CanonicalRecord {
    /// Subject name of a validated record.
    pub fn subject_name(&self) -> &str {
        self.subject.name.as_deref().unwrap_or_default()
    }

    /// Gate before persistence: every enrollment hangs off a subject.
    pub fn require_subject(self) -> Result<Self, Vec<Violation>> {
        if self.subject.name.is_some() {
            Ok(self)
        } else {
            Err(vec![Violation::new(
                FieldKey::SubjectName,
                "subject name could not be determined",
            )])
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub field: &'static str,
    pub message: String,
}

impl Violation {
    fn new(field: FieldKey, message: impl Into<String>) -> Self {
        Self {
            field: field.as_str(),
            message: message.into(),
        }
    }
}

pub fn describe_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| format!("{}: {}", v.field, v.message))
        .collect::<Vec<_>>()
        .join("; ")
}

pub const GENDERS: [&str; 3] = ["M", "F", "X"];

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

pub fn is_valid_email(s: &str) -> bool {
    EMAIL_RE.is_match(s)
}

/// Accumulates parsed cells before the validation pass.
#[derive(Debug, Default)]
pub struct RecordBuilder {
    record: CanonicalRecord,
}

impl RecordBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn email(&mut self, v: Option<String>) -> &mut Self {
        self.record.identity.email = v;
        self
    }

    pub fn name(&mut self, v: Option<String>) -> &mut Self {
        self.record.identity.name = v;
        self
    }

    /// Case-normalized; membership is checked by `build`.
    pub fn gender(&mut self, v: Option<String>) -> &mut Self {
        self.record.identity.gender = v.map(|g| g.to_uppercase());
        self
    }

    pub fn birth_date(&mut self, v: Option<NaiveDate>) -> &mut Self {
        self.record.identity.birth_date = v;
        self
    }

    pub fn technical_school(&mut self, v: Option<bool>) -> &mut Self {
        self.record.identity.technical_school = v;
        self
    }

    pub fn subject_name(&mut self, v: Option<String>) -> &mut Self {
        self.record.subject.name = v;
        self
    }

    pub fn academic_year(&mut self, v: Option<i64>) -> &mut Self {
        self.record.subject.academic_year = v;
        self
    }

    pub fn subject_kind(&mut self, v: Option<String>) -> &mut Self {
        self.record.subject.kind = v;
        self
    }

    pub fn modality(&mut self, v: Option<String>) -> &mut Self {
        self.record.subject.modality = v;
        self
    }

    pub fn tutor(&mut self, v: Option<String>) -> &mut Self {
        self.record.subject.tutor = v;
        self
    }

    pub fn professor(&mut self, v: Option<String>) -> &mut Self {
        self.record.subject.professor = v;
        self
    }

    pub fn period(&mut self, v: Option<String>) -> &mut Self {
        self.record.enrollment.period = v;
        self
    }

    pub fn attendance(&mut self, v: Option<f64>) -> &mut Self {
        self.record.enrollment.attendance = v;
        self
    }

    pub fn repeat_count(&mut self, v: Option<i64>) -> &mut Self {
        self.record.enrollment.repeat_count = v;
        self
    }

    pub fn dropout(&mut self, v: Option<bool>) -> &mut Self {
        self.record.enrollment.dropout = v;
        self
    }

    pub fn passed(&mut self, v: Option<bool>) -> &mut Self {
        self.record.enrollment.passed = v;
        self
    }

    pub fn grade(&mut self, kind: AssessmentKind, v: Option<u8>) -> &mut Self {
        self.record.grades.set(kind, v);
        self
    }

    /// Field-level validation. A missing subject is not a field error here;
    /// see [`CanonicalRecord::require_subject`].
    pub fn build(self) -> Result<CanonicalRecord, Vec<Violation>> {
        let r = &self.record;
        let mut violations = Vec::new();

        if let Some(email) = &r.identity.email {
            if !is_valid_email(email) {
                violations.push(Violation::new(
                    FieldKey::Email,
                    format!("invalid email address: {}", email),
                ));
            }
        }
        if let Some(gender) = &r.identity.gender {
            if !GENDERS.contains(&gender.as_str()) {
                violations.push(Violation::new(
                    FieldKey::Gender,
                    format!("must be one of {}; got {}", GENDERS.join(", "), gender),
                ));
            }
        }
        if let Some(year) = r.subject.academic_year {
            if year <= 0 {
                violations.push(Violation::new(
                    FieldKey::AcademicYear,
                    format!("must be a positive integer; got {}", year),
                ));
            }
        }
        if let Some(att) = r.enrollment.attendance {
            if !(0.0..=100.0).contains(&att) {
                violations.push(Violation::new(
                    FieldKey::Attendance,
                    format!("must be within 0..=100; got {}", att),
                ));
            }
        }
        if let Some(n) = r.enrollment.repeat_count {
            if n < 0 {
                violations.push(Violation::new(
                    FieldKey::RepeatCount,
                    format!("must be a non-negative integer; got {}", n),
                ));
            }
        }
        for (kind, grade) in r.grades.present() {
            if !(1..=10).contains(&grade) {
                violations.push(Violation::new(
                    kind.field(),
                    format!("grade must be within 1..=10; got {}", grade),
                ));
            }
        }

        if violations.is_empty() {
            Ok(self.record)
        } else {
            Err(violations)
        }
    }
}
