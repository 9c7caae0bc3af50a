use anyhow::Context;
use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use crate::import::identity::IdentityRole;
use crate::import::record::AssessmentKind;

/// Result of one natural-key upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upserted {
    pub id: String,
    pub created: bool,
}

#[derive(Debug, Clone)]
pub struct IdentityUpsert<'a> {
    pub email: &'a str,
    pub name: Option<&'a str>,
    pub gender: Option<&'a str>,
    pub birth_date: Option<NaiveDate>,
    pub technical_school: Option<bool>,
    pub role: IdentityRole,
    pub synthetic: bool,
}

#[derive(Debug, Clone)]
pub struct SubjectUpsert<'a> {
    pub name: &'a str,
    pub kind: Option<&'a str>,
    pub modality: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaffRole {
    Tutor,
    Professor,
}

impl StaffRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tutor => "tutor",
            Self::Professor => "professor",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnrollmentUpsert<'a> {
    pub student_id: &'a str,
    pub subject_id: &'a str,
    pub academic_year: i64,
    pub period: Option<&'a str>,
    pub attendance: Option<f64>,
    pub repeat_count: Option<i64>,
    pub dropout: Option<bool>,
    pub passed: Option<bool>,
}

/// Natural-key persistence used by the importer.
///
/// Optional attributes left as `None` never overwrite a stored value: an
/// absent cell means "unknown", not "cleared".
pub trait AcademicStore {
    /// Opens an atomic scope for one unit's writes. Scopes nest, and a
    /// rollback unwinds only the innermost one.
    fn begin_unit(&mut self) -> anyhow::Result<()>;
    fn commit_unit(&mut self) -> anyhow::Result<()>;
    fn rollback_unit(&mut self) -> anyhow::Result<()>;

    fn upsert_identity(&mut self, identity: &IdentityUpsert<'_>) -> anyhow::Result<Upserted>;
    fn upsert_subject(&mut self, subject: &SubjectUpsert<'_>) -> anyhow::Result<Upserted>;
    fn upsert_staff_assignment(
        &mut self,
        staff_id: &str,
        subject_id: &str,
        role: StaffRole,
    ) -> anyhow::Result<Upserted>;
    fn upsert_enrollment(&mut self, enrollment: &EnrollmentUpsert<'_>)
        -> anyhow::Result<Upserted>;
    fn upsert_assessment(
        &mut self,
        enrollment_id: &str,
        kind: AssessmentKind,
        grade: u8,
    ) -> anyhow::Result<Upserted>;
}

pub struct SqliteStore<'c> {
    conn: &'c Connection,
}

const UNIT_SAVEPOINT: &str = "import_unit";

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

fn date_text(d: Option<NaiveDate>) -> Option<String> {
    d.map(|d| d.format("%Y-%m-%d").to_string())
}

impl<'c> SqliteStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    fn existing_id(&self, sql: &str, params: impl rusqlite::Params) -> anyhow::Result<Option<String>> {
        Ok(self
            .conn
            .query_row(sql, params, |r| r.get::<_, String>(0))
            .optional()?)
    }
}

impl AcademicStore for SqliteStore<'_> {
    fn begin_unit(&mut self) -> anyhow::Result<()> {
        self.conn
            .execute_batch(&format!("SAVEPOINT {}", UNIT_SAVEPOINT))
            .context("failed to open unit savepoint")
    }

    fn commit_unit(&mut self) -> anyhow::Result<()> {
        self.conn
            .execute_batch(&format!("RELEASE SAVEPOINT {}", UNIT_SAVEPOINT))
            .context("failed to release unit savepoint")
    }

    fn rollback_unit(&mut self) -> anyhow::Result<()> {
        self.conn
            .execute_batch(&format!(
                "ROLLBACK TO SAVEPOINT {sp}; RELEASE SAVEPOINT {sp}",
                sp = UNIT_SAVEPOINT
            ))
            .context("failed to roll back unit savepoint")
    }

    fn upsert_identity(&mut self, identity: &IdentityUpsert<'_>) -> anyhow::Result<Upserted> {
        let birth_date = date_text(identity.birth_date);
        let now = now_rfc3339();
        let existing = self.existing_id(
            "SELECT id FROM identities WHERE email = ?",
            [identity.email],
        )?;
        if let Some(id) = existing {
            self.conn
                .execute(
                    "UPDATE identities SET
                       name = COALESCE(?, name),
                       gender = COALESCE(?, gender),
                       birth_date = COALESCE(?, birth_date),
                       technical_school = COALESCE(?, technical_school),
                       updated_at = ?
                     WHERE id = ?",
                    (
                        identity.name,
                        identity.gender,
                        birth_date.as_deref(),
                        identity.technical_school,
                        &now,
                        &id,
                    ),
                )
                .with_context(|| format!("failed to update identity {}", identity.email))?;
            return Ok(Upserted { id, created: false });
        }

        let id = Uuid::new_v4().to_string();
        self.conn
            .execute(
                "INSERT INTO identities(id, email, name, gender, birth_date, technical_school, role, synthetic, updated_at)
                 VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
                (
                    &id,
                    identity.email,
                    identity.name,
                    identity.gender,
                    birth_date.as_deref(),
                    identity.technical_school,
                    identity.role.as_str(),
                    identity.synthetic,
                    &now,
                ),
            )
            .with_context(|| format!("failed to insert identity {}", identity.email))?;
        Ok(Upserted { id, created: true })
    }

    fn upsert_subject(&mut self, subject: &SubjectUpsert<'_>) -> anyhow::Result<Upserted> {
        let now = now_rfc3339();
        let existing = self.existing_id("SELECT id FROM subjects WHERE name = ?", [subject.name])?;
        if let Some(id) = existing {
            self.conn
                .execute(
                    "UPDATE subjects SET
                       kind = COALESCE(?, kind),
                       modality = COALESCE(?, modality),
                       updated_at = ?
                     WHERE id = ?",
                    (subject.kind, subject.modality, &now, &id),
                )
                .with_context(|| format!("failed to update subject {}", subject.name))?;
            return Ok(Upserted { id, created: false });
        }

        let id = Uuid::new_v4().to_string();
        self.conn
            .execute(
                "INSERT INTO subjects(id, name, kind, modality, updated_at) VALUES(?, ?, ?, ?, ?)",
                (&id, subject.name, subject.kind, subject.modality, &now),
            )
            .with_context(|| format!("failed to insert subject {}", subject.name))?;
        Ok(Upserted { id, created: true })
    }

    fn upsert_staff_assignment(
        &mut self,
        staff_id: &str,
        subject_id: &str,
        role: StaffRole,
    ) -> anyhow::Result<Upserted> {
        let now = now_rfc3339();
        let existing = self.existing_id(
            "SELECT id FROM staff_assignments WHERE identity_id = ? AND subject_id = ?",
            (staff_id, subject_id),
        )?;
        if let Some(id) = existing {
            self.conn
                .execute(
                    "UPDATE staff_assignments SET role = ?, updated_at = ? WHERE id = ?",
                    (role.as_str(), &now, &id),
                )
                .context("failed to update staff assignment")?;
            return Ok(Upserted { id, created: false });
        }

        let id = Uuid::new_v4().to_string();
        self.conn
            .execute(
                "INSERT INTO staff_assignments(id, identity_id, subject_id, role, updated_at)
                 VALUES(?, ?, ?, ?, ?)",
                (&id, staff_id, subject_id, role.as_str(), &now),
            )
            .context("failed to insert staff assignment")?;
        Ok(Upserted { id, created: true })
    }

    fn upsert_enrollment(
        &mut self,
        enrollment: &EnrollmentUpsert<'_>,
    ) -> anyhow::Result<Upserted> {
        let now = now_rfc3339();
        let existing = self.existing_id(
            "SELECT id FROM enrollments WHERE student_id = ? AND subject_id = ? AND academic_year = ?",
            (
                enrollment.student_id,
                enrollment.subject_id,
                enrollment.academic_year,
            ),
        )?;
        if let Some(id) = existing {
            self.conn
                .execute(
                    "UPDATE enrollments SET
                       period = COALESCE(?, period),
                       attendance = COALESCE(?, attendance),
                       repeat_count = COALESCE(?, repeat_count),
                       dropout = COALESCE(?, dropout),
                       passed = COALESCE(?, passed),
                       updated_at = ?
                     WHERE id = ?",
                    (
                        enrollment.period,
                        enrollment.attendance,
                        enrollment.repeat_count,
                        enrollment.dropout,
                        enrollment.passed,
                        &now,
                        &id,
                    ),
                )
                .context("failed to update enrollment")?;
            return Ok(Upserted { id, created: false });
        }

        let id = Uuid::new_v4().to_string();
        self.conn
            .execute(
                "INSERT INTO enrollments(
                   id, student_id, subject_id, academic_year, period, attendance,
                   repeat_count, dropout, passed, updated_at
                 ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                (
                    &id,
                    enrollment.student_id,
                    enrollment.subject_id,
                    enrollment.academic_year,
                    enrollment.period,
                    enrollment.attendance,
                    enrollment.repeat_count,
                    enrollment.dropout,
                    enrollment.passed,
                    &now,
                ),
            )
            .context("failed to insert enrollment")?;
        Ok(Upserted { id, created: true })
    }

    fn upsert_assessment(
        &mut self,
        enrollment_id: &str,
        kind: AssessmentKind,
        grade: u8,
    ) -> anyhow::Result<Upserted> {
        let now = now_rfc3339();
        let existing = self.existing_id(
            "SELECT id FROM assessments WHERE enrollment_id = ? AND kind = ?",
            (enrollment_id, kind.code()),
        )?;
        if let Some(id) = existing {
            self.conn
                .execute(
                    "UPDATE assessments SET grade = ?, updated_at = ? WHERE id = ?",
                    (grade, &now, &id),
                )
                .with_context(|| format!("failed to update assessment {}", kind.code()))?;
            return Ok(Upserted { id, created: false });
        }

        let id = Uuid::new_v4().to_string();
        self.conn
            .execute(
                "INSERT INTO assessments(id, enrollment_id, kind, grade, updated_at) VALUES(?, ?, ?, ?, ?)",
                (&id, enrollment_id, kind.code(), grade, &now),
            )
            .with_context(|| format!("failed to insert assessment {}", kind.code()))?;
        Ok(Upserted { id, created: true })
    }
}
