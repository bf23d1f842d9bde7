use crate::calc::StudentRecord;
use crate::cohort::{CohortReport, ReportScope};
use crate::error::{EngineError, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;

/// Flat rendering of a report for PDF/spreadsheet exporters: every cell is
/// already formatted text.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

fn number_cell(v: Option<f64>) -> String {
    v.map(|m| m.to_string()).unwrap_or_else(|| "-".to_string())
}

/// Subject ids in order of first appearance; anonymous subjects get no column.
fn subject_columns(students: &[StudentRecord]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for s in students {
        for r in &s.subject_results {
            if let Some(id) = r.subject_id.as_deref() {
                if seen.insert(id) {
                    out.push(id.to_string());
                }
            }
        }
    }
    out
}

pub fn report_table(report: &CohortReport) -> ReportTable {
    let subjects = match report.scope {
        ReportScope::All => subject_columns(&report.students),
        ReportScope::Subject(_) => Vec::new(),
    };

    let mut columns: Vec<String> = ["Rank", "Roll No", "Student", "Sex"]
        .iter()
        .map(|c| c.to_string())
        .collect();
    columns.extend(subjects.iter().cloned());
    columns.extend(
        ["Marks", "Grade", "Points", "Total Points", "GPA", "Division"]
            .iter()
            .map(|c| c.to_string()),
    );

    let rows = report
        .students
        .iter()
        .map(|s| {
            let classified = !s.best_subjects.is_empty();
            let mut row = vec![
                s.rank.to_string(),
                s.roll_number.clone().unwrap_or_default(),
                s.display_name.clone(),
                s.sex.clone(),
            ];
            for id in &subjects {
                let marks = s
                    .subject_results
                    .iter()
                    .find(|r| r.subject_id.as_deref() == Some(id.as_str()))
                    .and_then(|r| r.marks_obtained);
                row.push(number_cell(marks));
            }
            row.push(number_cell(s.marks_obtained));
            row.push(s.grade.label().to_string());
            row.push(
                s.points
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            );
            row.push(if classified {
                s.total_points.to_string()
            } else {
                "-".to_string()
            });
            row.push(if classified {
                s.gpa.to_string()
            } else {
                "-".to_string()
            });
            row.push(s.division.label().to_string());
            row
        })
        .collect();

    ReportTable { columns, rows }
}

fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

pub fn to_csv(table: &ReportTable) -> String {
    let mut csv = String::new();
    for line in std::iter::once(&table.columns).chain(table.rows.iter()) {
        let cells: Vec<String> = line.iter().map(|c| csv_quote(c)).collect();
        csv.push_str(&cells.join(","));
        csv.push('\n');
    }
    csv
}

pub fn write_csv(path: &str, csv: &str) -> Result<()> {
    let out = PathBuf::from(path);
    let fail = |e: std::io::Error| EngineError::ExportFailed {
        path: path.to_string(),
        message: e.to_string(),
    };
    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent).map_err(fail)?;
    }
    std::fs::write(&out, csv).map_err(fail)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cohort::{build_cohort_report, parse_cohort_input, parse_scope};
    use crate::config::{CalcOptions, Limits};
    use serde_json::json;

    fn report(params: serde_json::Value) -> CohortReport {
        let input = parse_cohort_input(&params).expect("input");
        let scope = parse_scope(&params).expect("scope");
        build_cohort_report(&input, &scope, &CalcOptions::default(), &Limits::default(), "-")
            .expect("report")
            .report
    }

    #[test]
    fn all_scope_table_has_subject_columns() {
        let r = report(json!({
            "roster": [
                { "studentId": "s1", "displayName": "Okafor, Ada", "sex": "F", "rollNumber": "01" },
                { "studentId": "s2", "displayName": "Banda, Joe", "sex": "M", "rollNumber": "02" }
            ],
            "scores": [
                { "studentId": "s1", "subjectId": "math", "marksObtained": 80 },
                { "studentId": "s1", "subjectId": "bio", "marksObtained": 66 },
                { "studentId": "s2", "subjectId": "math", "marksObtained": 40 }
            ]
        }));
        let t = report_table(&r);
        assert_eq!(
            t.columns,
            vec![
                "Rank", "Roll No", "Student", "Sex", "math", "bio", "Marks", "Grade", "Points",
                "Total Points", "GPA", "Division"
            ]
        );
        assert_eq!(
            t.rows[0],
            vec!["1", "01", "Okafor, Ada", "F", "80", "66", "73", "B", "2", "3", "1.5", "-"]
        );
        assert_eq!(t.rows[1][5], "-");

        let csv = to_csv(&t);
        let first_row = csv.lines().nth(1).expect("row");
        assert!(first_row.starts_with("1,01,\"Okafor, Ada\",F,80,66"));
    }

    #[test]
    fn subject_scope_table_marks_absent_students() {
        let r = report(json!({
            "subjectId": "math",
            "scores": [
                { "studentId": "s1", "subjectId": "math" },
                { "studentId": "s2", "subjectId": "math", "marksObtained": 55 }
            ]
        }));
        let t = report_table(&r);
        assert_eq!(t.columns.len(), 10);
        assert_eq!(t.rows[1][4..7], ["-".to_string(), "-".to_string(), "-".to_string()]);
        assert_eq!(t.rows[0][4], "55");
    }

    #[test]
    fn write_csv_creates_parent_dirs() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("nested/out.csv");
        write_csv(&path.to_string_lossy(), "a,b\n").expect("write");
        assert_eq!(std::fs::read_to_string(&path).expect("read"), "a,b\n");
    }
}
