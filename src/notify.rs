use crate::calc::{CohortSummary, StudentRecord};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentMessage {
    pub student_id: String,
    pub fields: BTreeMap<String, String>,
    pub message: String,
}

/// Values for the `{placeholder}`s a message template may use.
pub fn template_fields(
    record: &StudentRecord,
    summary: &CohortSummary,
) -> BTreeMap<String, String> {
    let classified = !record.best_subjects.is_empty();
    let dash = || "-".to_string();
    let mut fields = BTreeMap::new();
    fields.insert("studentName".to_string(), record.display_name.clone());
    fields.insert(
        "rollNumber".to_string(),
        record.roll_number.clone().unwrap_or_else(dash),
    );
    fields.insert(
        "average".to_string(),
        record.marks_obtained.map(|m| m.to_string()).unwrap_or_else(dash),
    );
    fields.insert("grade".to_string(), record.grade.label().to_string());
    fields.insert("division".to_string(), record.division.label().to_string());
    fields.insert(
        "points".to_string(),
        if classified {
            record.total_points.to_string()
        } else {
            dash()
        },
    );
    fields.insert(
        "gpa".to_string(),
        if classified { record.gpa.to_string() } else { dash() },
    );
    fields.insert("rank".to_string(), record.rank.to_string());
    fields.insert(
        "totalStudents".to_string(),
        summary.total_students.to_string(),
    );
    fields.insert(
        "classAverage".to_string(),
        summary.average_marks.to_string(),
    );
    fields
}

/// Replaces `{name}` with `fields[name]`. Unknown names and unmatched braces
/// are copied through unchanged.
pub fn render_template(template: &str, fields: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let name = &after[..close];
                match fields.get(name) {
                    Some(v) => out.push_str(v),
                    None => {
                        out.push('{');
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

pub fn render_messages(
    students: &[StudentRecord],
    summary: &CohortSummary,
    template: &str,
) -> Vec<StudentMessage> {
    students
        .iter()
        .map(|s| {
            let fields = template_fields(s, summary);
            StudentMessage {
                student_id: s.student_id.clone(),
                message: render_template(template, &fields),
                fields,
            }
        })
        .collect()
}
