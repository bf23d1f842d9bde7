use crate::calc::{self, SubjectResult};
use crate::cohort::{self, MarksField};
use crate::error::EngineError;
use crate::ipc::error::{engine_err, err, ok};
use crate::ipc::helpers::calc_options;
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_schemes(state: &mut AppState, req: &Request) -> serde_json::Value {
    let cfg = &state.config;
    ok(
        &req.id,
        json!({
            "defaultScheme": cfg.default_scheme,
            "schemes": cfg.schemes,
            "divisionBands": cfg.divisions.bands,
            "bestSubjectCount": cfg.best_subject_count,
            "rankPolicy": cfg.rank_policy,
        }),
    )
}

fn handle_grade(state: &mut AppState, req: &Request) -> serde_json::Value {
    let opts = match calc_options(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let raw = req.params.get("marks");
    let marks = match cohort::parse_marks(raw) {
        MarksField::Absent => None,
        MarksField::Present(m) => Some(m),
        MarksField::Invalid => {
            return err(
                &req.id,
                "bad_params",
                "marks must be a number, a numeric string or null",
                Some(json!({ "marks": raw })),
            )
        }
    };
    let r = SubjectResult::new(None, marks, &opts.scheme);
    ok(
        &req.id,
        json!({
            "scheme": opts.scheme.name,
            "grade": r.grade,
            "points": r.points,
        }),
    )
}

fn handle_classify(state: &mut AppState, req: &Request) -> serde_json::Value {
    let opts = match calc_options(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let (subjects, diagnostics) = match cohort::parse_subject_marks(&req.params) {
        Ok(v) => v,
        Err(e) => return engine_err(&req.id, &e),
    };
    let limit = state.config.limits.max_subjects_per_student;
    if subjects.len() > limit {
        let e = EngineError::TooManySubjects {
            student_id: "-".to_string(),
            count: subjects.len(),
            limit,
        };
        return engine_err(&req.id, &e);
    }

    let results: Vec<SubjectResult> = subjects
        .into_iter()
        .map(|(id, marks)| SubjectResult::new(id, marks, &opts.scheme))
        .collect();
    let c = calc::classify(&results, opts.best_subject_count, &opts.divisions);
    ok(
        &req.id,
        json!({
            "scheme": opts.scheme.name,
            "subjectResults": results,
            "bestSubjects": c.best_subjects,
            "totalPoints": c.total_points,
            "gpa": c.gpa,
            "division": c.division,
            "diagnostics": diagnostics,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grading.schemes" => Some(handle_schemes(state, req)),
        "grading.grade" => Some(handle_grade(state, req)),
        "grading.classify" => Some(handle_classify(state, req)),
        _ => None,
    }
}
