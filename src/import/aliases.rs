/// Canonical fields the importer knows how to read from a spreadsheet export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldKey {
    Email,
    Name,
    Gender,
    BirthDate,
    TechnicalSchool,
    SubjectName,
    AcademicYear,
    SubjectKind,
    Modality,
    Tutor,
    Professor,
    Period,
    Attendance,
    RepeatCount,
    Dropout,
    Passed,
    Midterm1,
    Midterm2,
    Makeup1,
    Makeup2,
    Final1,
    Final2,
    Final3,
}

impl FieldKey {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Name => "name",
            Self::Gender => "gender",
            Self::BirthDate => "birth_date",
            Self::TechnicalSchool => "technical_school",
            Self::SubjectName => "subject_name",
            Self::AcademicYear => "academic_year",
            Self::SubjectKind => "subject_kind",
            Self::Modality => "modality",
            Self::Tutor => "tutor",
            Self::Professor => "professor",
            Self::Period => "period",
            Self::Attendance => "attendance",
            Self::RepeatCount => "repeat_count",
            Self::Dropout => "dropout",
            Self::Passed => "passed",
            Self::Midterm1 => "midterm_1",
            Self::Midterm2 => "midterm_2",
            Self::Makeup1 => "makeup_1",
            Self::Makeup2 => "makeup_2",
            Self::Final1 => "final_1",
            Self::Final2 => "final_2",
            Self::Final3 => "final_3",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldAliases {
    pub key: FieldKey,
    /// Accepted header spellings, highest priority first.
    pub aliases: Vec<String>,
    /// Header stem used by wide exports, e.g. `Anio` for `AnioAM1`.
    pub wide_base: Option<String>,
}

/// Immutable header registry handed to the resolver and transformer.
#[derive(Debug, Clone)]
pub struct AliasTable {
    fields: Vec<FieldAliases>,
}

impl AliasTable {
    pub fn new(fields: Vec<FieldAliases>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[FieldAliases] {
        &self.fields
    }

    pub fn get(&self, key: FieldKey) -> Option<&FieldAliases> {
        self.fields.iter().find(|f| f.key == key)
    }

    pub fn wide_base(&self, key: FieldKey) -> Option<&str> {
        self.get(key).and_then(|f| f.wide_base.as_deref())
    }
}

fn entry(key: FieldKey, wide_base: Option<&str>, aliases: &[&str]) -> FieldAliases {
    FieldAliases {
        key,
        aliases: aliases.iter().map(|s| s.to_string()).collect(),
        wide_base: wide_base.map(str::to_string),
    }
}

impl Default for AliasTable {
    /// Header variants seen in the university's spreadsheet exports. Keep additions
    /// append-only: earlier aliases win when a file carries several of them.
    fn default() -> Self {
        use FieldKey::*;
        Self::new(vec![
            entry(
                Email,
                None,
                &[
                    "alumno_email",
                    "email",
                    "e-mail",
                    "mail",
                    "correo",
                    "correo_electronico",
                    "email_alumno",
                ],
            ),
            entry(
                Name,
                None,
                &[
                    "alumno_nombre",
                    "nombre",
                    "nombre_completo",
                    "apellido_nombre",
                    "alumno",
                    "name",
                    "full_name",
                ],
            ),
            entry(Gender, None, &["genero", "género", "sexo", "gender", "sex"]),
            entry(
                BirthDate,
                None,
                &[
                    "fechanacimiento",
                    "fecha_nacimiento",
                    "fecha_nac",
                    "nacimiento",
                    "birthdate",
                    "birth_date",
                    "dob",
                ],
            ),
            entry(
                TechnicalSchool,
                None,
                &[
                    "colegiotecnico",
                    "colegio_tecnico",
                    "escuela_tecnica",
                    "tecnico",
                    "technical_school",
                ],
            ),
            entry(
                SubjectName,
                None,
                &[
                    "materia",
                    "materia_nombre",
                    "nombre_materia",
                    "asignatura",
                    "subject",
                    "subject_name",
                ],
            ),
            entry(
                AcademicYear,
                Some("Anio"),
                &[
                    "anio",
                    "año",
                    "anio_cursada",
                    "ciclo_lectivo",
                    "year",
                    "academic_year",
                ],
            ),
            entry(
                SubjectKind,
                Some("TipoMateria"),
                &["tipomateria", "tipo_materia", "tipo", "subject_type", "kind"],
            ),
            entry(Modality, Some("Modalidad"), &["modalidad", "modality", "mode"]),
            entry(Tutor, Some("Tutor"), &["tutor", "tutor_nombre", "tutora"]),
            entry(
                Professor,
                Some("Profesor"),
                &[
                    "profesor",
                    "profesor_nombre",
                    "profesora",
                    "docente",
                    "professor",
                    "teacher",
                ],
            ),
            entry(
                Period,
                Some("Periodo"),
                &["periodo", "período", "cuatrimestre", "period", "term"],
            ),
            entry(
                Attendance,
                Some("Asistencia"),
                &[
                    "asistencia",
                    "asistencia_pct",
                    "porcentaje_asistencia",
                    "attendance",
                    "attendance_pct",
                ],
            ),
            entry(
                RepeatCount,
                Some("VecesRecursada"),
                &[
                    "vecesrecursada",
                    "veces_recursada",
                    "recursadas",
                    "repeat_count",
                    "times_repeated",
                ],
            ),
            entry(
                Dropout,
                Some("Abandona"),
                &["abandona", "abandono", "dropout", "dropped_out"],
            ),
            entry(
                Passed,
                Some("Aprueba"),
                &["aprueba", "aprobada", "aprobo", "passed"],
            ),
            entry(
                Midterm1,
                Some("Parcial1"),
                &["parcial1", "parcial_1", "p1", "midterm1", "midterm_1"],
            ),
            entry(
                Midterm2,
                Some("Parcial2"),
                &["parcial2", "parcial_2", "p2", "midterm2", "midterm_2"],
            ),
            entry(
                Makeup1,
                Some("Recuperatorio1"),
                &[
                    "recuperatorio1",
                    "recuperatorio_1",
                    "rec1",
                    "makeup1",
                    "makeup_1",
                ],
            ),
            entry(
                Makeup2,
                Some("Recuperatorio2"),
                &[
                    "recuperatorio2",
                    "recuperatorio_2",
                    "rec2",
                    "makeup2",
                    "makeup_2",
                ],
            ),
            entry(Final1, Some("Final1"), &["final1", "final_1", "f1"]),
            entry(Final2, Some("Final2"), &["final2", "final_2", "f2"]),
            entry(Final3, Some("Final3"), &["final3", "final_3", "f3"]),
        ])
    }
}
