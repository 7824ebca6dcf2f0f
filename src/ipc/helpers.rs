use crate::error::CalcError;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::model::{DateRange, Principal};
use crate::session::SessionError;
use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::json;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("not_found", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("forbidden", message)
    }

    pub fn db(code: &'static str, e: anyhow::Error) -> Self {
        tracing::warn!(code, error = %format!("{e:#}"), "store operation failed");
        Self::new(code, format!("{e:#}"))
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<CalcError> for HandlerErr {
    fn from(e: CalcError) -> Self {
        tracing::debug!(code = e.code(), "engine rejected input: {e}");
        Self::new(e.code(), e.to_string()).with_details(e.details())
    }
}

impl From<SessionError> for HandlerErr {
    fn from(e: SessionError) -> Self {
        Self::new(e.code(), e.to_string())
    }
}

pub fn db_query(e: anyhow::Error) -> HandlerErr {
    HandlerErr::db("db_query_failed", e)
}

pub fn db_insert(e: anyhow::Error) -> HandlerErr {
    HandlerErr::db("db_insert_failed", e)
}

pub fn db_tx(e: rusqlite::Error) -> HandlerErr {
    HandlerErr::db("db_tx_failed", e.into())
}

/// Runs `f` against the open workspace and wraps the outcome in a response.
pub fn with_conn<F>(state: &AppState, req: &Request, f: F) -> serde_json::Value
where
    F: FnOnce(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
{
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_optional_str(
    params: &serde_json::Value,
    key: &str,
) -> Result<Option<String>, HandlerErr> {
    match params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => {
            let Some(s) = v.as_str() else {
                return Err(HandlerErr::bad_params(format!(
                    "{} must be string or null",
                    key
                )));
            };
            let t = s.trim();
            Ok(if t.is_empty() { None } else { Some(t.to_string()) })
        }
    }
}

pub fn require_principal(params: &serde_json::Value) -> Result<Principal, HandlerErr> {
    let Some(raw) = params.get("principal").filter(|v| !v.is_null()) else {
        return Err(HandlerErr::new("unauthenticated", "missing principal"));
    };
    serde_json::from_value::<Principal>(raw.clone())
        .map_err(|e| HandlerErr::bad_params(format!("invalid principal: {}", e)))
}

pub fn require_teacher(params: &serde_json::Value) -> Result<Principal, HandlerErr> {
    let principal = require_principal(params)?;
    if !principal.is_teacher() {
        return Err(HandlerErr::forbidden("teacher role required")
            .with_details(json!({ "principalId": principal.id })));
    }
    Ok(principal)
}

pub fn get_optional_date(
    params: &serde_json::Value,
    key: &str,
) -> Result<Option<NaiveDate>, HandlerErr> {
    let Some(raw) = get_optional_str(params, key)? else {
        return Ok(None);
    };
    crate::db::parse_date(&raw)
        .map(Some)
        .map_err(|e| HandlerErr::bad_params(format!("{}: {e:#}", key)))
}

pub fn get_required_date(params: &serde_json::Value, key: &str) -> Result<NaiveDate, HandlerErr> {
    get_optional_date(params, key)?.ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

/// `startDate` / `endDate`, both optional and inclusive.
pub fn get_date_range(params: &serde_json::Value) -> Result<DateRange, HandlerErr> {
    let range = DateRange {
        start: get_optional_date(params, "startDate")?,
        end: get_optional_date(params, "endDate")?,
    };
    if range.is_inverted() {
        return Err(HandlerErr::bad_params("startDate must not be after endDate"));
    }
    Ok(range)
}
