use chrono::{Datelike, Local};
use std::path::Path;
use tracing::{debug, info, warn};

use super::aliases::{AliasTable, FieldKey};
use super::config::ImportConfig;
use super::error::ImportError;
use super::identity::{domain_mismatch, resolve_identity, IdentityRole, ResolvedIdentity, Synthesis};
use super::multiplex::SubjectMultiplexer;
use super::record::{describe_violations, CanonicalRecord};
use super::report::{EntityCounts, ImportReport};
use super::resolver::ColumnResolver;
use super::source::read_source;
use super::transform::{RawRow, RowTransformer};
use crate::store::{AcademicStore, EnrollmentUpsert, IdentityUpsert, StaffRole, SubjectUpsert};

/// Drives one source file through the pipeline.
pub struct Importer<'a> {
    config: &'a ImportConfig,
    table: AliasTable,
}

/// Values resolved for a validated unit before anything is written. The
/// warnings only reach the report once the unit is accepted.
struct UnitPlan {
    student: ResolvedIdentity,
    academic_year: i64,
    warnings: Vec<String>,
}

impl<'a> Importer<'a> {
    pub fn new(config: &'a ImportConfig) -> Self {
        Self {
            config,
            table: AliasTable::default(),
        }
    }

    /// Dry run: parse, transform and validate only.
    pub fn preview(&self, path: &Path) -> Result<ImportReport, ImportError> {
        self.run(path, None)
    }

    pub fn apply(
        &self,
        path: &Path,
        store: &mut dyn AcademicStore,
    ) -> Result<ImportReport, ImportError> {
        self.run(path, Some(store))
    }

    fn run(
        &self,
        path: &Path,
        mut store: Option<&mut dyn AcademicStore>,
    ) -> Result<ImportReport, ImportError> {
        let source = read_source(path, self.config.delimiter)?;

        let mut report =
            ImportReport::new(self.config.max_error_samples, self.config.max_warnings);
        report.source_path = path.to_string_lossy().into_owned();
        report.source_sha256 = source.sha256.clone();
        report.delimiter = source.delimiter.to_string();
        report.dry_run = store.is_none();
        if source.lossy {
            report.record_warning(
                0,
                "source is not valid UTF-8; undecodable bytes were replaced with U+FFFD".to_string(),
            );
        }

        let mapping = ColumnResolver::new(&self.table).map_columns(&source.headers);
        if mapping.is_empty() {
            warn!(headers = ?source.headers, "no header matches a known column");
        }
        debug!(
            fields = ?mapping.keys().map(FieldKey::as_str).collect::<Vec<_>>(),
            "column mapping built"
        );
        let multiplexer =
            SubjectMultiplexer::new(&self.config.subject_suffixes, self.config.empty_subject_units);
        let detection = multiplexer.detect(&source.headers);
        report.format = detection.format.clone();
        report.subjects_detected = detection.suffixes.clone();
        let transformer = RowTransformer::new(&self.table);

        let total = source.rows.len();
        info!(
            path = %report.source_path,
            rows = total,
            mapped_columns = mapping.len(),
            format = ?detection.format,
            dry_run = report.dry_run,
            "import started"
        );

        let progress_every = self.config.progress_every.max(1);
        for (index, values) in source.rows.iter().enumerate() {
            let row = RawRow::new(index, &source.headers, values);
            report.rows_read += 1;

            let (units, skipped) = multiplexer.units(&detection, &transformer, &row, &mapping);
            report.empty_units_skipped += skipped;

            for unit in units {
                report.grades_dropped += unit.dropped_grades;
                let record = match unit.result.and_then(CanonicalRecord::require_subject) {
                    Ok(record) => record,
                    Err(violations) => {
                        let message = describe_violations(&violations);
                        debug!(row = row.row_number(), suffix = ?unit.suffix, %message, "unit rejected");
                        report.record_error(row.row_number(), message, Some(row.snapshot()));
                        continue;
                    }
                };

                let plan = self.plan_unit(&row, &record);
                match store.as_deref_mut() {
                    Some(store) => self.persist_unit(store, &row, &record, plan, &mut report),
                    None => {
                        for message in plan.warnings {
                            report.record_warning(row.row_number(), message);
                        }
                        report.rows_ok += 1;
                    }
                }
            }

            let processed = index + 1;
            if processed % progress_every == 0 {
                info!(processed, total, "import progress");
            }
        }

        report.finalize();
        info!(
            rows_read = report.rows_read,
            rows_ok = report.rows_ok,
            rows_error = report.rows_error,
            warnings = report.warnings_total,
            "import finished"
        );
        Ok(report)
    }

    /// Resolves the student identity and academic year, collecting the
    /// warnings either resolution produces.
    fn plan_unit(&self, row: &RawRow<'_>, record: &CanonicalRecord) -> UnitPlan {
        let row_number = row.row_number();
        let student = resolve_identity(
            IdentityRole::Student,
            record.identity.email.as_deref(),
            record.identity.name.as_deref(),
            row_number,
            &self.config.placeholder_domain,
        );
        let mut warnings = Vec::new();
        match student.synthesis {
            Synthesis::None => {
                if let Some(domain) = self.config.institutional_domain.as_deref() {
                    if domain_mismatch(&student.email, domain) {
                        warnings.push(format!(
                            "email {} is outside institutional domain {}",
                            student.email, domain
                        ));
                    }
                }
            }
            Synthesis::FromName => warnings.push(format!(
                "missing email; synthesized {} from name",
                student.email
            )),
            Synthesis::Generic => warnings.push(format!(
                "missing email and name; using generic identity {}",
                student.email
            )),
        }

        let academic_year = match record.subject.academic_year {
            Some(year) => year,
            None => {
                let year = i64::from(Local::now().year());
                warnings.push(format!(
                    "academic year missing for {}; defaulted to {}",
                    record.subject_name(),
                    year
                ));
                year
            }
        };

        UnitPlan {
            student,
            academic_year,
            warnings,
        }
    }

    /// Writes one unit inside its own store scope. Counters and warnings
    /// reach the report only when the scope commits.
    fn persist_unit(
        &self,
        store: &mut dyn AcademicStore,
        row: &RawRow<'_>,
        record: &CanonicalRecord,
        mut plan: UnitPlan,
        report: &mut ImportReport,
    ) {
        let row_number = row.row_number();
        let mut counts = EntityCounts::default();
        let mut warnings = std::mem::take(&mut plan.warnings);

        let outcome = match store.begin_unit() {
            Err(e) => Err(e),
            Ok(()) => match self.persist_chain(
                store,
                row_number,
                record,
                &plan,
                &mut counts,
                &mut warnings,
            ) {
                Ok(()) => store.commit_unit(),
                Err(e) => {
                    if let Err(rb) = store.rollback_unit() {
                        warn!(row = row_number, error = %rb, "unit rollback failed");
                    }
                    Err(e)
                }
            },
        };

        match outcome {
            Ok(()) => {
                report.counts.merge(&counts);
                report.rows_ok += 1;
                for message in warnings {
                    report.record_warning(row_number, message);
                }
            }
            Err(e) => {
                warn!(row = row_number, subject = record.subject_name(), error = %e, "unit failed");
                report.record_error(row_number, format!("{:#}", e), Some(row.snapshot()));
            }
        }
    }

    fn persist_chain(
        &self,
        store: &mut dyn AcademicStore,
        row_number: usize,
        record: &CanonicalRecord,
        plan: &UnitPlan,
        counts: &mut EntityCounts,
        warnings: &mut Vec<String>,
    ) -> anyhow::Result<()> {
        let identity = &record.identity;
        let student = store.upsert_identity(&IdentityUpsert {
            email: &plan.student.email,
            name: plan.student.name.as_deref(),
            gender: identity.gender.as_deref(),
            birth_date: identity.birth_date,
            technical_school: identity.technical_school,
            role: IdentityRole::Student,
            synthetic: plan.student.is_synthetic(),
        })?;
        counts.identities_upserted += 1;
        counts.identities_created += usize::from(student.created);

        let subject = store.upsert_subject(&SubjectUpsert {
            name: record.subject_name(),
            kind: record.subject.kind.as_deref(),
            modality: record.subject.modality.as_deref(),
        })?;
        counts.subjects_upserted += 1;
        counts.subjects_created += usize::from(subject.created);

        let staff = [
            (StaffRole::Tutor, record.subject.tutor.as_deref()),
            (StaffRole::Professor, record.subject.professor.as_deref()),
        ];
        // A staff failure unwinds only its own nested scope; the unit goes on.
        for (role, name) in staff {
            let Some(name) = name else { continue };
            store.begin_unit()?;
            match self.persist_staff(store, row_number, name, role, &subject.id) {
                Ok(staff_counts) => {
                    store.commit_unit()?;
                    counts.merge(&staff_counts);
                }
                Err(e) => {
                    store.rollback_unit()?;
                    warnings.push(format!(
                        "{} assignment for {} skipped: {:#}",
                        role.as_str(),
                        name,
                        e
                    ));
                }
            }
        }

        let enrollment = &record.enrollment;
        let enrolled = store.upsert_enrollment(&EnrollmentUpsert {
            student_id: &student.id,
            subject_id: &subject.id,
            academic_year: plan.academic_year,
            period: enrollment.period.as_deref(),
            attendance: enrollment.attendance,
            repeat_count: enrollment.repeat_count,
            dropout: enrollment.dropout,
            passed: enrollment.passed,
        })?;
        counts.enrollments_upserted += 1;
        counts.enrollments_created += usize::from(enrolled.created);

        for (kind, grade) in record.grades.present() {
            let a = store.upsert_assessment(&enrolled.id, kind, grade)?;
            counts.assessments_upserted += 1;
            counts.assessments_created += usize::from(a.created);
        }
        Ok(())
    }

    fn persist_staff(
        &self,
        store: &mut dyn AcademicStore,
        row_number: usize,
        name: &str,
        role: StaffRole,
        subject_id: &str,
    ) -> anyhow::Result<EntityCounts> {
        let mut counts = EntityCounts::default();
        let resolved = resolve_identity(
            IdentityRole::Staff,
            None,
            Some(name),
            row_number,
            &self.config.placeholder_domain,
        );
        let staff = store.upsert_identity(&IdentityUpsert {
            email: &resolved.email,
            name: resolved.name.as_deref(),
            gender: None,
            birth_date: None,
            technical_school: None,
            role: IdentityRole::Staff,
            synthetic: resolved.is_synthetic(),
        })?;
        counts.identities_upserted += 1;
        counts.identities_created += usize::from(staff.created);

        let assignment = store.upsert_staff_assignment(&staff.id, subject_id, role)?;
        counts.staff_assignments_upserted += 1;
        counts.staff_assignments_created += usize::from(assignment.created);
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::import::record::AssessmentKind;
    use crate::store::{SqliteStore, Upserted};
    use std::path::PathBuf;

    fn write_source(name: &str, body: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("acadtrackd-orch-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("create dir");
        let p = dir.join(name);
        std::fs::write(&p, body).expect("write source");
        p
    }

    fn count(conn: &rusqlite::Connection, table: &str) -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
            .expect("count")
    }

    /// Counts calls and optionally fails enrollment writes for one subject
    /// or every staff assignment.
    #[derive(Default)]
    struct RecordingStore {
        calls: usize,
        fail_subject: Option<String>,
        fail_staff: bool,
        current_subject: String,
        rollbacks: usize,
    }

    impl RecordingStore {
        fn ok(&mut self) -> anyhow::Result<Upserted> {
            self.calls += 1;
            Ok(Upserted {
                id: format!("id-{}", self.calls),
                created: true,
            })
        }
    }

    impl AcademicStore for RecordingStore {
        fn begin_unit(&mut self) -> anyhow::Result<()> {
            Ok(())
        }
        fn commit_unit(&mut self) -> anyhow::Result<()> {
            Ok(())
        }
        fn rollback_unit(&mut self) -> anyhow::Result<()> {
            self.rollbacks += 1;
            Ok(())
        }
        fn upsert_identity(&mut self, _: &IdentityUpsert<'_>) -> anyhow::Result<Upserted> {
            self.ok()
        }
        fn upsert_subject(&mut self, s: &SubjectUpsert<'_>) -> anyhow::Result<Upserted> {
            self.current_subject = s.name.to_string();
            self.ok()
        }
        fn upsert_staff_assignment(
            &mut self,
            _: &str,
            _: &str,
            role: StaffRole,
        ) -> anyhow::Result<Upserted> {
            if self.fail_staff {
                anyhow::bail!("{} assignments are locked", role.as_str());
            }
            self.ok()
        }
        fn upsert_enrollment(&mut self, _: &EnrollmentUpsert<'_>) -> anyhow::Result<Upserted> {
            if self.fail_subject.as_deref() == Some(self.current_subject.as_str()) {
                anyhow::bail!("enrollment rejected for {}", self.current_subject);
            }
            self.ok()
        }
        fn upsert_assessment(
            &mut self,
            _: &str,
            _: AssessmentKind,
            _: u8,
        ) -> anyhow::Result<Upserted> {
            self.ok()
        }
    }

    #[test]
    fn reimporting_same_file_is_idempotent() {
        let mut body = String::from("email,nombre,materia,anio,asistencia,parcial1\n");
        for i in 1..=10 {
            body.push_str(&format!("s{i}@x.com,Student {i},Algebra,2024,{},{}\n", 70 + i, (i % 10) + 1));
        }
        let path = write_source("ten.csv", &body);
        let conn = db::open_in_memory().expect("db");
        let cfg = ImportConfig::default();
        let importer = Importer::new(&cfg);

        let first = importer
            .apply(&path, &mut SqliteStore::new(&conn))
            .expect("first run");
        let before: Vec<i64> = db::ENTITY_TABLES.iter().map(|t| count(&conn, t)).collect();
        let second = importer
            .apply(&path, &mut SqliteStore::new(&conn))
            .expect("second run");
        let after: Vec<i64> = db::ENTITY_TABLES.iter().map(|t| count(&conn, t)).collect();

        assert_eq!(first.rows_ok, 10);
        assert_eq!(second.rows_error, 0);
        assert_eq!(first.counts.identities_upserted, second.counts.identities_upserted);
        assert_eq!(first.counts.identities_created, 10);
        assert_eq!(second.counts.identities_created, 0);
        assert_eq!(second.counts.enrollments_created, 0);
        assert_eq!(before, after);
        assert_eq!(count(&conn, "enrollments"), 10);
        assert_eq!(count(&conn, "assessments"), 10);
    }

    #[test]
    fn missing_subject_makes_no_store_call_and_samples_are_bounded() {
        let mut body = String::from("email,nombre\n");
        for i in 1..=25 {
            body.push_str(&format!("s{i}@x.com,Student {i}\n"));
        }
        let path = write_source("nosubject.csv", &body);
        let cfg = ImportConfig::default();
        let mut store = RecordingStore::default();

        let report = Importer::new(&cfg).apply(&path, &mut store).expect("run");
        assert_eq!(store.calls, 0);
        assert_eq!(report.rows_read, 25);
        assert_eq!(report.rows_error, 25);
        assert_eq!(report.error_samples.len(), 20);
        assert_eq!(report.error_samples[0].row, 1);
        assert_eq!(report.error_samples[19].row, 20);
        assert!(report.error_samples[0].message.contains("subject_name"));
        assert_eq!(report.error_samples[0].data.as_ref().map(|d| d["email"].clone()), Some("s1@x.com".into()));
    }

    #[test]
    fn failing_unit_is_isolated_and_rolled_back() {
        let body = "email,AnioAM1,Parcial1AM1,AnioAM2,Parcial1AM2\n\
                    a@x.com,2023,7,2024,8\n\
                    b@x.com,2023,6,,\n";
        let path = write_source("isolate.csv", body);
        let cfg = ImportConfig::default();
        let mut store = RecordingStore {
            fail_subject: Some("AM2".into()),
            ..Default::default()
        };

        let report = Importer::new(&cfg).apply(&path, &mut store).expect("run");
        assert_eq!(report.rows_read, 2);
        assert_eq!(report.rows_ok, 2);
        assert_eq!(report.rows_error, 1);
        assert_eq!(report.empty_units_skipped, 1);
        assert_eq!(store.rollbacks, 1);
        assert_eq!(report.counts.enrollments_upserted, 2);
        assert!(report.error_samples[0].message.contains("enrollment rejected for AM2"));
    }

    #[test]
    fn rolled_back_unit_leaves_no_warnings() {
        let body = "nombre,AnioAM1,Parcial1AM1,AnioAM2,Parcial1AM2\n\
                    Ana Ruiz,2023,7,,8\n";
        let path = write_source("rollback-warnings.csv", body);
        let cfg = ImportConfig::default();
        let mut store = RecordingStore {
            fail_subject: Some("AM2".into()),
            ..Default::default()
        };

        let report = Importer::new(&cfg).apply(&path, &mut store).expect("run");
        assert_eq!(report.rows_ok, 1);
        assert_eq!(report.rows_error, 1);
        assert_eq!(report.warnings_total, 1);
        assert!(report.warnings[0].message.contains("ana_ruiz_1@import.local"));
        assert!(!report
            .warnings
            .iter()
            .any(|w| w.message.contains("academic year missing")));
    }

    #[test]
    fn failed_staff_assignment_is_unwound_and_not_counted() {
        let body = "email,materia,anio,tutor\na@x.com,Fisica,2024,Pedro Gómez\n";
        let path = write_source("staff-fail.csv", body);
        let cfg = ImportConfig::default();
        let mut store = RecordingStore {
            fail_staff: true,
            ..Default::default()
        };

        let report = Importer::new(&cfg).apply(&path, &mut store).expect("run");
        assert_eq!(report.rows_ok, 1);
        assert_eq!(report.rows_error, 0);
        assert_eq!(store.rollbacks, 1);
        assert_eq!(report.counts.identities_upserted, 1);
        assert_eq!(report.counts.staff_assignments_upserted, 0);
        assert_eq!(report.counts.enrollments_upserted, 1);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0]
            .message
            .starts_with("tutor assignment for Pedro Gómez skipped"));
    }

    #[test]
    fn wide_rows_split_into_subject_enrollments() {
        let body = "email;AnioAM1;Parcial1AM1;AnioAM2;Parcial1AM2;TutorAM2\n\
                    c@x.com;2023;7;2024;4;Pedro Gómez\n";
        let path = write_source("wide.csv", body);
        let conn = db::open_in_memory().expect("db");
        let cfg = ImportConfig::default();

        let report = Importer::new(&cfg)
            .apply(&path, &mut SqliteStore::new(&conn))
            .expect("run");
        assert_eq!(report.delimiter, ";");
        assert_eq!(report.subjects_detected, vec!["AM1".to_string(), "AM2".to_string()]);
        assert_eq!(report.rows_ok, 2);
        assert_eq!(count(&conn, "subjects"), 2);
        assert_eq!(count(&conn, "enrollments"), 2);
        assert_eq!(count(&conn, "staff_assignments"), 1);

        let staff_email: String = conn
            .query_row(
                "SELECT email FROM identities WHERE role = ?",
                [IdentityRole::Staff.as_str()],
                |r| r.get(0),
            )
            .expect("staff");
        assert_eq!(staff_email, "pedro_gomez@import.local");

        let years: Vec<(String, i64)> = conn
            .prepare(
                "SELECT s.name, e.academic_year FROM enrollments e JOIN subjects s ON s.id = e.subject_id ORDER BY s.name",
            )
            .expect("prepare")
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
            .expect("query")
            .collect::<Result<_, _>>()
            .expect("rows");
        assert_eq!(years, vec![("AM1".to_string(), 2023), ("AM2".to_string(), 2024)]);
    }

    #[test]
    fn preview_counts_without_writing_and_warns() {
        let body = "nombre,materia,final1\nJosé Pérez,Fisica,11\n,Fisica,8\n";
        let path = write_source("preview.csv", body);
        let cfg = ImportConfig::default();

        let report = Importer::new(&cfg).preview(&path).expect("preview");
        assert!(report.dry_run);
        assert_eq!(report.rows_ok, 2);
        assert_eq!(report.counts, EntityCounts::default());
        assert_eq!(report.grades_dropped, 1);
        let messages: Vec<&str> = report.warnings.iter().map(|w| w.message.as_str()).collect();
        assert!(messages.iter().any(|m| m.contains("jose_perez_1@import.local")));
        assert!(messages.iter().any(|m| m.contains("student_row_2@import.local")));
        assert!(messages.iter().any(|m| m.contains("academic year missing")));
    }

    #[test]
    fn institutional_domain_mismatch_is_a_warning() {
        let body = "email,materia,anio\nana@gmail.com,AM1,2024\nbeto@uni.edu.ar,AM1,2024\n";
        let path = write_source("domain.csv", body);
        let cfg = ImportConfig {
            institutional_domain: Some("uni.edu.ar".into()),
            ..ImportConfig::default()
        };
        let report = Importer::new(&cfg).preview(&path).expect("preview");
        assert_eq!(report.rows_error, 0);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].row, 1);
    }

    #[test]
    fn non_utf8_source_is_flagged_before_row_warnings() {
        let path = write_source("latin1.csv", "");
        std::fs::write(&path, b"nombre,materia,anio\nJos\xe9,Fisica,2024\n").expect("write");
        let cfg = ImportConfig::default();

        let report = Importer::new(&cfg).preview(&path).expect("preview");
        assert_eq!(report.rows_ok, 1);
        assert_eq!(report.warnings[0].row, 0);
        assert!(report.warnings[0].message.contains("not valid UTF-8"));
    }

    #[test]
    fn empty_source_is_fatal() {
        let path = write_source("header-only.csv", "email,materia\n");
        let cfg = ImportConfig::default();
        let err = Importer::new(&cfg).preview(&path).unwrap_err();
        assert_eq!(err.code(), "source_empty");
    }
}
