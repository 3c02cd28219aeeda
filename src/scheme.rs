use serde::Serialize;

/// The three mark layouts a workspace can run under. Exactly one is active
/// per workspace and it is locked once student records exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkScheme {
    /// Semester exam + internal assessment + subject total, with term work
    /// on the one designated subject.
    SeIaTw,
    /// Semester exam + IA exam + term marks + viva on every subject.
    SemViva,
    /// Unit test + semester marks on every subject.
    UnitSem,
}

impl MarkScheme {
    pub fn from_key(key: &str) -> Option<MarkScheme> {
        match key {
            "se_ia_tw" => Some(MarkScheme::SeIaTw),
            "sem_viva" => Some(MarkScheme::SemViva),
            "unit_sem" => Some(MarkScheme::UnitSem),
            _ => None,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            MarkScheme::SeIaTw => "se_ia_tw",
            MarkScheme::SemViva => "sem_viva",
            MarkScheme::UnitSem => "unit_sem",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MarkScheme::SeIaTw => "SE/IA/Total/TW",
            MarkScheme::SemViva => "SemExam/IAExam/TermMarks/Viva",
            MarkScheme::UnitSem => "UnitTest/SemMarks",
        }
    }

    pub fn subjects(self) -> &'static [SubjectDef] {
        match self {
            MarkScheme::SeIaTw => &SE_IA_TW_SUBJECTS,
            MarkScheme::SemViva => &SEM_VIVA_SUBJECTS,
            MarkScheme::UnitSem => &UNIT_SEM_SUBJECTS,
        }
    }

    /// Label of the final per-student aggregate column (0-10 scale).
    pub fn summary_label(self) -> &'static str {
        match self {
            MarkScheme::SeIaTw => "Pointer",
            MarkScheme::SemViva | MarkScheme::UnitSem => "Total CGPA",
        }
    }

    pub fn has_result_column(self) -> bool {
        matches!(self, MarkScheme::SeIaTw)
    }

    /// Sum of the per-field maxima that count toward the overall total.
    pub fn max_possible_total(self) -> f64 {
        self.subjects()
            .iter()
            .map(|s| {
                s.fields
                    .iter()
                    .filter(|f| f.counts_in_total)
                    .map(|f| f.max)
                    .sum::<f64>()
            })
            .sum()
    }

    /// CSV column layout in file order. Data cells are read positionally
    /// against this layout once the header set has been accepted.
    pub fn columns(self) -> Vec<Column> {
        let mut cols = Vec::new();
        match self {
            MarkScheme::SeIaTw => {
                cols.push(Column::RollNo);
                cols.push(Column::SeatNumber);
            }
            MarkScheme::SemViva | MarkScheme::UnitSem => {
                cols.push(Column::SeatNumber);
                cols.push(Column::RollNo);
            }
        }
        cols.push(Column::Name);
        cols.push(Column::Gender);
        for (si, subject) in self.subjects().iter().enumerate() {
            for fi in 0..subject.fields.len() {
                cols.push(Column::Mark {
                    subject: si,
                    field: fi,
                });
            }
        }
        if self.has_result_column() {
            cols.push(Column::Result);
        }
        cols.push(Column::Summary);
        cols
    }

    pub fn column_header(self, col: Column) -> String {
        match (self, col) {
            (MarkScheme::SeIaTw, Column::RollNo) => "Sr".to_string(),
            (MarkScheme::SeIaTw, Column::SeatNumber) => "Seat No".to_string(),
            (MarkScheme::SeIaTw, Column::Gender) => "M/F".to_string(),
            (MarkScheme::SeIaTw, Column::Mark { subject, field }) => {
                let s = &self.subjects()[subject];
                format!("{} ({})", s.name, s.fields[field].label)
            }
            (MarkScheme::SeIaTw, Column::Summary) => "Pointer".to_string(),
            (_, Column::SeatNumber) => "Seat Number".to_string(),
            (_, Column::RollNo) => "Roll No".to_string(),
            (_, Column::Name) => "Student Name".to_string(),
            (_, Column::Gender) => "Gender".to_string(),
            (_, Column::Mark { subject, field }) => {
                let s = &self.subjects()[subject];
                format!("{}_{}", s.name, s.fields[field].label)
            }
            (_, Column::Result) => "Result P/F".to_string(),
            (_, Column::Summary) => "Total_CGPA".to_string(),
        }
    }

    pub fn expected_headers(self) -> Vec<String> {
        self.columns()
            .into_iter()
            .map(|c| self.column_header(c))
            .collect()
    }
}

/// One CSV/grid column position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    SeatNumber,
    RollNo,
    Name,
    Gender,
    Mark { subject: usize, field: usize },
    Result,
    Summary,
}

#[derive(Debug)]
pub struct FieldDef {
    pub key: &'static str,
    pub label: &'static str,
    pub max: f64,
    pub counts_in_total: bool,
}

#[derive(Debug)]
pub struct SubjectDef {
    pub name: &'static str,
    pub fields: &'static [FieldDef],
}

static SE_IA_TOTAL_FIELDS: [FieldDef; 3] = [
    FieldDef {
        key: "se",
        label: "SE",
        max: 80.0,
        counts_in_total: false,
    },
    FieldDef {
        key: "ia",
        label: "IA",
        max: 20.0,
        counts_in_total: false,
    },
    FieldDef {
        key: "total",
        label: "Total",
        max: 100.0,
        counts_in_total: true,
    },
];

static SE_IA_TOTAL_TW_FIELDS: [FieldDef; 4] = [
    FieldDef {
        key: "se",
        label: "SE",
        max: 80.0,
        counts_in_total: false,
    },
    FieldDef {
        key: "ia",
        label: "IA",
        max: 20.0,
        counts_in_total: false,
    },
    FieldDef {
        key: "total",
        label: "Total",
        max: 100.0,
        counts_in_total: true,
    },
    FieldDef {
        key: "tw",
        label: "TW",
        max: 25.0,
        counts_in_total: true,
    },
];

static SE_IA_TW_SUBJECTS: [SubjectDef; 5] = [
    SubjectDef {
        name: "Math IV",
        fields: &SE_IA_TOTAL_TW_FIELDS,
    },
    SubjectDef {
        name: "Algo",
        fields: &SE_IA_TOTAL_FIELDS,
    },
    SubjectDef {
        name: "DBMS",
        fields: &SE_IA_TOTAL_FIELDS,
    },
    SubjectDef {
        name: "OS",
        fields: &SE_IA_TOTAL_FIELDS,
    },
    SubjectDef {
        name: "Micro",
        fields: &SE_IA_TOTAL_FIELDS,
    },
];

static SEM_VIVA_FIELDS: [FieldDef; 4] = [
    FieldDef {
        key: "sem_exam",
        label: "SemExam",
        max: 80.0,
        counts_in_total: true,
    },
    FieldDef {
        key: "ia_exam",
        label: "IAExam",
        max: 20.0,
        counts_in_total: true,
    },
    FieldDef {
        key: "term_marks",
        label: "TermMarks",
        max: 100.0,
        counts_in_total: true,
    },
    FieldDef {
        key: "viva_marks",
        label: "Viva",
        max: 25.0,
        counts_in_total: true,
    },
];

static SEM_VIVA_SUBJECTS: [SubjectDef; 5] = [
    SubjectDef {
        name: "S1",
        fields: &SEM_VIVA_FIELDS,
    },
    SubjectDef {
        name: "S2",
        fields: &SEM_VIVA_FIELDS,
    },
    SubjectDef {
        name: "S3",
        fields: &SEM_VIVA_FIELDS,
    },
    SubjectDef {
        name: "S4",
        fields: &SEM_VIVA_FIELDS,
    },
    SubjectDef {
        name: "S5",
        fields: &SEM_VIVA_FIELDS,
    },
];

static UNIT_SEM_FIELDS: [FieldDef; 2] = [
    FieldDef {
        key: "unit_test",
        label: "UnitTest",
        max: 20.0,
        counts_in_total: true,
    },
    FieldDef {
        key: "sem_marks",
        label: "SemMarks",
        max: 90.0,
        counts_in_total: true,
    },
];

static UNIT_SEM_SUBJECTS: [SubjectDef; 5] = [
    SubjectDef {
        name: "Subject1",
        fields: &UNIT_SEM_FIELDS,
    },
    SubjectDef {
        name: "Subject2",
        fields: &UNIT_SEM_FIELDS,
    },
    SubjectDef {
        name: "Subject3",
        fields: &UNIT_SEM_FIELDS,
    },
    SubjectDef {
        name: "Subject4",
        fields: &UNIT_SEM_FIELDS,
    },
    SubjectDef {
        name: "Subject5",
        fields: &UNIT_SEM_FIELDS,
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    /// Import normalization. Unrecognized values drop to unset rather than
    /// failing the row.
    pub fn coerce_or_default(raw: &str) -> Option<Gender> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "m" | "male" => Some(Gender::Male),
            "f" | "female" => Some(Gender::Female),
            "other" => Some(Gender::Other),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
            Gender::Other => "Other",
        }
    }

    pub fn from_stored(raw: &str) -> Option<Gender> {
        match raw {
            "Male" => Some(Gender::Male),
            "Female" => Some(Gender::Female),
            "Other" => Some(Gender::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PassFail {
    Pass,
    Fail,
}

impl PassFail {
    /// CSV form: the single letters P and F, nothing else.
    pub fn from_letter(raw: &str) -> Option<PassFail> {
        match raw.trim() {
            "P" => Some(PassFail::Pass),
            "F" => Some(PassFail::Fail),
            _ => None,
        }
    }

    pub fn from_stored(raw: &str) -> Option<PassFail> {
        match raw {
            "Pass" => Some(PassFail::Pass),
            "Fail" => Some(PassFail::Fail),
            _ => None,
        }
    }

    /// Accepts either the CSV letter or the stored long form.
    pub fn parse(raw: &str) -> Option<PassFail> {
        PassFail::from_letter(raw).or_else(|| PassFail::from_stored(raw.trim()))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PassFail::Pass => "Pass",
            PassFail::Fail => "Fail",
        }
    }

    pub fn letter(self) -> &'static str {
        match self {
            PassFail::Pass => "P",
            PassFail::Fail => "F",
        }
    }
}

/// One student's marks, shaped by the active scheme. `marks[s][f]` lines up
/// with `scheme.subjects()[s].fields[f]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRecord {
    pub seat_number: i64,
    pub roll_no: Option<String>,
    pub student_name: String,
    pub gender: Option<Gender>,
    pub marks: Vec<Vec<f64>>,
    pub result: Option<PassFail>,
    pub total_cgpa: f64,
}

impl StudentRecord {
    pub fn empty(scheme: MarkScheme) -> StudentRecord {
        StudentRecord {
            seat_number: 0,
            roll_no: None,
            student_name: String::new(),
            gender: None,
            marks: scheme
                .subjects()
                .iter()
                .map(|s| vec![0.0; s.fields.len()])
                .collect(),
            result: None,
            total_cgpa: 0.0,
        }
    }

    pub fn mark(&self, subject: usize, field: usize) -> f64 {
        self.marks
            .get(subject)
            .and_then(|fs| fs.get(field))
            .copied()
            .unwrap_or(0.0)
    }
}

/// Parse-or-zero coercion for numeric cells. Parse failures become 0.0 and
/// are left to the range validators instead of being reported separately.
pub fn coerce_or_default(raw: &str) -> f64 {
    raw.trim().parse::<f64>().unwrap_or(0.0)
}

pub fn coerce_seat_or_default(raw: &str) -> i64 {
    raw.trim().parse::<i64>().unwrap_or(0)
}
