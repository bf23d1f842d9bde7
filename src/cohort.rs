use crate::calc::{self, CohortSummary, DivisionDistribution, GradeDistribution, RankKey};
use crate::calc::{StudentRecord, SubjectResult};
use crate::config::{CalcOptions, Limits};
use crate::error::{EngineError, Result};
use crate::grading::{points_of, round_off_2_decimals, Grade};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// One raw mark as it arrives from upstream.
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectScore {
    pub student_id: String,
    pub subject_id: Option<String>,
    pub marks_obtained: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RosterEntry {
    pub student_id: String,
    pub display_name: Option<String>,
    pub sex: Option<String>,
    pub roll_number: Option<String>,
}

/// A record that was skipped or repaired while reading input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub source: String,
    pub index: usize,
    pub code: String,
    pub message: String,
}

impl Diagnostic {
    fn new(source: &str, index: usize, code: &str, message: impl Into<String>) -> Self {
        Self {
            source: source.to_string(),
            index,
            code: code.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReportScope {
    All,
    Subject(String),
}

impl ReportScope {
    pub fn subject_id(&self) -> Option<&str> {
        match self {
            ReportScope::All => None,
            ReportScope::Subject(id) => Some(id),
        }
    }

    fn default_rank_key(&self) -> RankKey {
        match self {
            ReportScope::All => RankKey::Points,
            ReportScope::Subject(_) => RankKey::Marks,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CohortInput {
    pub scores: Vec<SubjectScore>,
    pub roster: Option<Vec<RosterEntry>>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CohortReport {
    pub scope: ReportScope,
    pub scheme: String,
    pub best_subject_count: usize,
    pub students: Vec<StudentRecord>,
    pub grade_distribution: GradeDistribution,
    pub division_distribution: DivisionDistribution,
    pub summary: CohortSummary,
}

#[derive(Debug, Clone)]
pub struct CohortOutcome {
    pub report: CohortReport,
    pub diagnostics: Vec<Diagnostic>,
}

/// Opaque ids may come as strings or numbers; blanks count as missing.
fn id_value(v: Option<&Value>) -> Option<String> {
    match v {
        Some(Value::String(s)) => {
            let t = s.trim();
            (!t.is_empty()).then(|| t.to_string())
        }
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

fn text_value(v: Option<&Value>) -> Option<String> {
    v.and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub enum MarksField {
    Absent,
    Present(f64),
    Invalid,
}

/// Numbers and numeric strings are marks; null, a missing field and blank
/// strings are absent; anything else is invalid.
pub fn parse_marks(raw: Option<&Value>) -> MarksField {
    match raw {
        None | Some(Value::Null) => MarksField::Absent,
        Some(Value::Number(n)) => match n.as_f64() {
            Some(m) if m.is_finite() => MarksField::Present(m),
            _ => MarksField::Invalid,
        },
        Some(Value::String(s)) if s.trim().is_empty() => MarksField::Absent,
        Some(Value::String(s)) => match s.trim().parse::<f64>() {
            Ok(m) if m.is_finite() => MarksField::Present(m),
            _ => MarksField::Invalid,
        },
        Some(_) => MarksField::Invalid,
    }
}

fn marks_value(obj: &serde_json::Map<String, Value>) -> MarksField {
    parse_marks(obj.get("marksObtained").or_else(|| obj.get("marks_obtained")))
}

/// Reads `scores` (required) and `roster` (optional) from request params.
/// Malformed entries are dropped with a diagnostic; only a wrongly typed
/// container is an error.
pub fn parse_cohort_input(params: &Value) -> Result<CohortInput> {
    let mut input = CohortInput::default();

    let Some(raw_scores) = params.get("scores") else {
        return Err(EngineError::bad_params("missing scores"));
    };
    let Some(raw_scores) = raw_scores.as_array() else {
        return Err(EngineError::bad_params("scores must be an array"));
    };

    for (i, raw) in raw_scores.iter().enumerate() {
        let Some(obj) = raw.as_object() else {
            input.diagnostics.push(Diagnostic::new(
                "scores",
                i,
                "not_an_object",
                "score entry is not an object",
            ));
            continue;
        };
        let Some(student_id) = id_value(obj.get("studentId")) else {
            input.diagnostics.push(Diagnostic::new(
                "scores",
                i,
                "missing_student_id",
                "score entry has no studentId",
            ));
            continue;
        };
        let marks_obtained = match marks_value(obj) {
            MarksField::Absent => None,
            MarksField::Present(m) => Some(m),
            MarksField::Invalid => {
                input.diagnostics.push(Diagnostic::new(
                    "scores",
                    i,
                    "invalid_marks",
                    format!("marks for {} are not a number, treated as absent", student_id),
                ));
                None
            }
        };
        input.scores.push(SubjectScore {
            student_id,
            subject_id: id_value(obj.get("subjectId")),
            marks_obtained,
        });
    }

    match params.get("roster") {
        None | Some(Value::Null) => {}
        Some(Value::Array(raw_roster)) => {
            let mut roster = Vec::with_capacity(raw_roster.len());
            let mut seen = HashSet::new();
            for (i, raw) in raw_roster.iter().enumerate() {
                let Some(obj) = raw.as_object() else {
                    input.diagnostics.push(Diagnostic::new(
                        "roster",
                        i,
                        "not_an_object",
                        "roster entry is not an object",
                    ));
                    continue;
                };
                let Some(student_id) = id_value(obj.get("studentId")) else {
                    input.diagnostics.push(Diagnostic::new(
                        "roster",
                        i,
                        "missing_student_id",
                        "roster entry has no studentId",
                    ));
                    continue;
                };
                if !seen.insert(student_id.clone()) {
                    input.diagnostics.push(Diagnostic::new(
                        "roster",
                        i,
                        "duplicate_student",
                        format!("student {} is listed more than once", student_id),
                    ));
                    continue;
                }
                roster.push(RosterEntry {
                    student_id,
                    display_name: text_value(obj.get("displayName")),
                    sex: text_value(obj.get("sex")),
                    roll_number: id_value(obj.get("rollNumber")),
                });
            }
            input.roster = Some(roster);
        }
        Some(_) => return Err(EngineError::bad_params("roster must be an array")),
    }

    Ok(input)
}

/// Reads a single student's `subjects` list for direct classification.
pub fn parse_subject_marks(
    params: &Value,
) -> Result<(Vec<(Option<String>, Option<f64>)>, Vec<Diagnostic>)> {
    let Some(raw) = params.get("subjects").and_then(|v| v.as_array()) else {
        return Err(EngineError::bad_params("subjects must be an array"));
    };
    let mut subjects = Vec::with_capacity(raw.len());
    let mut diagnostics = Vec::new();
    for (i, entry) in raw.iter().enumerate() {
        let Some(obj) = entry.as_object() else {
            diagnostics.push(Diagnostic::new(
                "subjects",
                i,
                "not_an_object",
                "subject entry is not an object",
            ));
            continue;
        };
        let marks = match marks_value(obj) {
            MarksField::Absent => None,
            MarksField::Present(m) => Some(m),
            MarksField::Invalid => {
                diagnostics.push(Diagnostic::new(
                    "subjects",
                    i,
                    "invalid_marks",
                    "marks are not a number, treated as absent",
                ));
                None
            }
        };
        subjects.push((id_value(obj.get("subjectId")), marks));
    }
    Ok((subjects, diagnostics))
}

/// `subjectId` absent, null or "ALL" means every subject.
pub fn parse_scope(params: &Value) -> Result<ReportScope> {
    match params.get("subjectId") {
        None | Some(Value::Null) => Ok(ReportScope::All),
        Some(Value::String(s)) if s.trim().eq_ignore_ascii_case("ALL") => Ok(ReportScope::All),
        v @ Some(Value::String(_)) | v @ Some(Value::Number(_)) => match id_value(v) {
            Some(id) => Ok(ReportScope::Subject(id)),
            None => Err(EngineError::bad_params("subjectId must not be empty")),
        },
        Some(_) => Err(EngineError::bad_params(
            "subjectId must be a string, number or 'ALL'",
        )),
    }
}

fn mean_of_present(results: &[SubjectResult]) -> Option<f64> {
    let present: Vec<f64> = results.iter().filter_map(|r| r.marks_obtained).collect();
    if present.is_empty() {
        return None;
    }
    Some(round_off_2_decimals(
        present.iter().sum::<f64>() / present.len() as f64,
    ))
}

/// Builds the full report: per-subject grades, best-subject classification,
/// ranking and cohort statistics. The input is only read.
pub fn build_cohort_report(
    input: &CohortInput,
    scope: &ReportScope,
    opts: &CalcOptions,
    limits: &Limits,
    sex_fallback: &str,
) -> Result<CohortOutcome> {
    let mut diagnostics = input.diagnostics.clone();

    let roster: Vec<RosterEntry> = match &input.roster {
        Some(r) => r.clone(),
        None => {
            let mut seen = HashSet::new();
            input
                .scores
                .iter()
                .filter(|s| seen.insert(s.student_id.as_str()))
                .map(|s| RosterEntry {
                    student_id: s.student_id.clone(),
                    display_name: None,
                    sex: None,
                    roll_number: None,
                })
                .collect()
        }
    };
    if roster.len() > limits.max_students {
        return Err(EngineError::TooManyStudents {
            count: roster.len(),
            limit: limits.max_students,
        });
    }

    let mut by_student: HashMap<String, Vec<SubjectResult>> = roster
        .iter()
        .map(|r| (r.student_id.clone(), Vec::new()))
        .collect();
    let mut seen_pairs: HashSet<(&str, &str)> = HashSet::new();
    for (i, score) in input.scores.iter().enumerate() {
        let Some(results) = by_student.get_mut(score.student_id.as_str()) else {
            diagnostics.push(Diagnostic::new(
                "scores",
                i,
                "unknown_student",
                format!("student {} is not on the roster", score.student_id),
            ));
            continue;
        };
        if let Some(subject_id) = score.subject_id.as_deref() {
            if !seen_pairs.insert((score.student_id.as_str(), subject_id)) {
                diagnostics.push(Diagnostic::new(
                    "scores",
                    i,
                    "duplicate_subject",
                    format!(
                        "student {} already has a mark for subject {}",
                        score.student_id, subject_id
                    ),
                ));
                continue;
            }
        }
        results.push(SubjectResult::new(
            score.subject_id.clone(),
            score.marks_obtained,
            &opts.scheme,
        ));
        if results.len() > limits.max_subjects_per_student {
            return Err(EngineError::TooManySubjects {
                student_id: score.student_id.clone(),
                count: results.len(),
                limit: limits.max_subjects_per_student,
            });
        }
    }

    let mut students: Vec<StudentRecord> = Vec::with_capacity(roster.len());
    for entry in roster {
        let subject_results = by_student
            .remove(entry.student_id.as_str())
            .unwrap_or_default();
        let classification =
            calc::classify(&subject_results, opts.best_subject_count, &opts.divisions);
        let marks_obtained = match scope {
            ReportScope::All => mean_of_present(&subject_results),
            ReportScope::Subject(id) => subject_results
                .iter()
                .find(|r| r.subject_id.as_deref() == Some(id.as_str()))
                .and_then(|r| r.marks_obtained),
        };
        let grade = opts.scheme.grade_of(marks_obtained);
        students.push(StudentRecord {
            display_name: entry
                .display_name
                .unwrap_or_else(|| entry.student_id.clone()),
            student_id: entry.student_id,
            sex: entry.sex.unwrap_or_else(|| sex_fallback.to_string()),
            roll_number: entry.roll_number,
            subject_results,
            marks_obtained,
            grade,
            points: (grade != Grade::Absent).then(|| points_of(grade)),
            best_subjects: classification.best_subjects,
            total_points: classification.total_points,
            gpa: classification.gpa,
            division: classification.division,
            rank: 0,
        });
    }

    let key = opts.rank_key.unwrap_or_else(|| scope.default_rank_key());
    let students: Vec<StudentRecord> = calc::rank_by(students, opts.rank_policy, |s| key.value(s))
        .into_iter()
        .map(|(rank, mut s)| {
            s.rank = rank;
            s
        })
        .collect();

    let agg = calc::aggregate(&students);
    Ok(CohortOutcome {
        report: CohortReport {
            scope: scope.clone(),
            scheme: opts.scheme.name.clone(),
            best_subject_count: opts.best_subject_count,
            students,
            grade_distribution: agg.grade_distribution,
            division_distribution: agg.division_distribution,
            summary: agg.summary,
        },
        diagnostics,
    })
}
