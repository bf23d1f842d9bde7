use crate::ipc::error::{engine_err, ok};
use crate::ipc::helpers::{compute_cohort, required_str};
use crate::ipc::types::{AppState, Request};
use crate::{notify, table};
use chrono::Utc;
use serde_json::json;

fn handle_reports_cohort(state: &mut AppState, req: &Request) -> serde_json::Value {
    let outcome = match compute_cohort(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    ok(
        &req.id,
        json!({
            "report": outcome.report,
            "diagnostics": outcome.diagnostics,
            "computedAt": Utc::now().to_rfc3339(),
        }),
    )
}

fn handle_reports_table(state: &mut AppState, req: &Request) -> serde_json::Value {
    let outcome = match compute_cohort(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let t = table::report_table(&outcome.report);
    let csv = table::to_csv(&t);

    let out_path = req.params.get("outPath").and_then(|v| v.as_str());
    if let Some(path) = out_path {
        if let Err(e) = table::write_csv(path, &csv) {
            tracing::warn!(id = %req.id, error = %e, "csv export failed");
            return engine_err(&req.id, &e);
        }
        tracing::info!(path, rows = t.rows.len(), "csv exported");
    }

    ok(
        &req.id,
        json!({
            "columns": t.columns,
            "rows": t.rows,
            "csv": csv,
            "path": out_path,
            "diagnostics": outcome.diagnostics,
        }),
    )
}

fn handle_reports_notifications(state: &mut AppState, req: &Request) -> serde_json::Value {
    let template = match required_str(req, "template") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let outcome = match compute_cohort(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let messages = notify::render_messages(
        &outcome.report.students,
        &outcome.report.summary,
        &template,
    );
    ok(
        &req.id,
        json!({
            "messages": messages,
            "summary": outcome.report.summary,
            "diagnostics": outcome.diagnostics,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.cohort" => Some(handle_reports_cohort(state, req)),
        "reports.table" => Some(handle_reports_table(state, req)),
        "reports.notifications" => Some(handle_reports_notifications(state, req)),
        _ => None,
    }
}
