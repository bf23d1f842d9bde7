use crate::cohort::{self, CohortOutcome};
use crate::config::CalcOptions;
use crate::ipc::error::{engine_err, err};
use crate::ipc::types::{AppState, Request};

pub fn calc_options(state: &AppState, req: &Request) -> Result<CalcOptions, serde_json::Value> {
    state
        .config
        .calc_options(req.params.get("options"))
        .map_err(|e| engine_err(&req.id, &e))
}

pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

/// Parses the cohort params shared by every `reports.*` method and runs the
/// pipeline.
pub fn compute_cohort(
    state: &AppState,
    req: &Request,
) -> Result<CohortOutcome, serde_json::Value> {
    let opts = calc_options(state, req)?;
    let input = cohort::parse_cohort_input(&req.params).map_err(|e| engine_err(&req.id, &e))?;
    let scope = cohort::parse_scope(&req.params).map_err(|e| engine_err(&req.id, &e))?;

    let outcome = cohort::build_cohort_report(
        &input,
        &scope,
        &opts,
        &state.config.limits,
        &state.config.sex_fallback,
    )
    .map_err(|e| {
        tracing::warn!(id = %req.id, error = %e, "cohort rejected");
        engine_err(&req.id, &e)
    })?;

    for d in &outcome.diagnostics {
        tracing::debug!(
            id = %req.id,
            source = %d.source,
            index = d.index,
            code = %d.code,
            "{}",
            d.message
        );
    }
    tracing::debug!(
        id = %req.id,
        subject = scope.subject_id().unwrap_or("ALL"),
        students = outcome.report.students.len(),
        skipped = outcome.diagnostics.len(),
        "cohort computed"
    );
    Ok(outcome)
}
