use crate::backup;
use crate::ipc::error::ok;
use crate::ipc::handlers::core::open_workspace;
use crate::ipc::helpers::{get_optional_str, get_required_str, require_teacher, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn target_workspace(state: &AppState, params: &serde_json::Value) -> Result<PathBuf, HandlerErr> {
    get_optional_str(params, "workspacePath")?
        .map(PathBuf::from)
        .or_else(|| state.workspace.clone())
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

fn export_bundle(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    require_teacher(params)?;
    let out_path = get_required_str(params, "outPath")?;
    let workspace_path = target_workspace(state, params)?;

    if let Some(conn) = state.db.as_ref() {
        if let Err(e) = conn.execute_batch("PRAGMA wal_checkpoint(FULL)") {
            tracing::warn!(error = %e, "wal checkpoint before export failed");
        }
    }

    let export = backup::export_workspace_bundle(&workspace_path, &PathBuf::from(&out_path))
        .map_err(|e| {
            HandlerErr::new("io_failed", format!("{e:#}")).with_details(json!({ "path": out_path }))
        })?;
    Ok(json!({
        "path": out_path,
        "bundleFormat": export.bundle_format,
        "dbSha256": export.db_sha256,
        "dbBytes": export.db_bytes
    }))
}

/// Reopens the workspace recorded in `state` after its handle was released.
fn reopen_current(state: &mut AppState) {
    if state.db.is_some() {
        return;
    }
    let Some(path) = state.workspace.clone() else {
        return;
    };
    if let Err(e) = open_workspace(state, &path) {
        tracing::error!(workspace = %path.display(), error = %format!("{e:#}"), "failed to reopen workspace");
    }
}

fn import_bundle(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    require_teacher(params)?;
    let in_path = get_required_str(params, "inPath")?;
    let workspace_path = target_workspace(state, params)?;
    let src = PathBuf::from(&in_path);
    if !src.is_file() {
        return Err(HandlerErr::not_found("bundle file not found")
            .with_details(json!({ "path": in_path })));
    }
    let io_failed = |e: anyhow::Error| {
        HandlerErr::new("io_failed", format!("{e:#}")).with_details(json!({ "path": in_path }))
    };

    let staged = backup::stage_workspace_import(&src, &workspace_path).map_err(io_failed)?;

    if state.is_current(&workspace_path) {
        // Drop open handle before replacing file.
        state.db = None;
    }
    let committed = match staged.commit() {
        Ok(c) => c,
        Err(e) => {
            reopen_current(state);
            return Err(io_failed(e));
        }
    };
    if let Err(e) = open_workspace(state, &workspace_path) {
        if let Err(re) = committed.roll_back() {
            tracing::error!(error = %format!("{re:#}"), "import roll back failed");
        }
        reopen_current(state);
        return Err(HandlerErr::new("db_open_failed", format!("{e:#}")));
    }
    let import = committed.finish();

    Ok(json!({
        "workspacePath": workspace_path.to_string_lossy(),
        "bundleFormatDetected": import.bundle_format_detected,
        "dbSha256": import.db_sha256
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "backup.exportWorkspaceBundle" => export_bundle(state, &req.params),
        "backup.importWorkspaceBundle" => import_bundle(state, &req.params),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
