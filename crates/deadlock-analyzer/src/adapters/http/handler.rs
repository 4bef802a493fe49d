use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use serde::de::DeserializeOwned;

use crate::{
    cli::Args,
    core::{
        catalog, limits, query, readonly, xevents,
        types::{
            DatabaseConnectionRequest, DatabaseConnectionResponse, DeadlockEventsRequest,
            DeadlockEventsResponse, DiagnosticQueryRequest, DiagnosticQueryResponse,
            PredefinedQueryRequest,
        },
    },
    error::{AppError, AppResult},
};

use super::protocol::*;

#[derive(Debug, Clone)]
pub struct AppState {
    args: Arc<Args>,
}

impl AppState {
    pub fn new(args: Args) -> Self {
        Self {
            args: Arc::new(args),
        }
    }

    pub fn args(&self) -> &Args {
        &self.args
    }
}

fn parse<T: DeserializeOwned>(body: &Bytes) -> AppResult<T> {
    serde_json::from_slice(body)
        .map_err(|e| AppError::InvalidRequest(format!("invalid request json: {e}")))
}

fn require(value: &str, message: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::InvalidRequest(message.to_string()));
    }
    Ok(())
}

pub fn validate_diagnostic(req: &DiagnosticQueryRequest) -> AppResult<()> {
    require(&req.connection_string, "Connection string is required")?;
    require(&req.query, "Query is required")?;
    if !readonly::is_sql_readonly(&req.query) {
        return Err(AppError::NotReadonly);
    }
    Ok(())
}

fn rejected(e: &AppError) -> StatusCode {
    tracing::warn!(code = e.code(), reason = %e, "request rejected");
    e.status()
}

pub async fn execute_diagnostic_query(State(state): State<AppState>, body: Bytes) -> Response {
    let req = match parse::<DiagnosticQueryRequest>(&body)
        .and_then(|req| validate_diagnostic(&req).map(|_| req))
    {
        Ok(req) => req,
        Err(e) => {
            return json_with_status(
                rejected(&e),
                &DiagnosticQueryResponse::failed(e.to_string(), 0.0),
            )
        }
    };

    let timeout = req
        .timeout_seconds
        .unwrap_or(state.args().default_timeout_secs);
    let resp = query::run_diagnostic_query(&req.connection_string, &req.query, timeout).await;
    json_ok(&resp)
}

/// Catalog entries are trusted SQL and skip the keyword filter.
pub async fn execute_predefined_query(State(state): State<AppState>, body: Bytes) -> Response {
    let res = parse::<PredefinedQueryRequest>(&body).and_then(|req| {
        require(&req.connection_string, "Connection string is required")?;
        require(&req.name, "Query name is required")?;
        let entry = catalog::find(&req.name).ok_or_else(|| {
            AppError::InvalidRequest(format!("Unknown predefined query: {}", req.name))
        })?;
        Ok((req, entry))
    });
    let (req, entry) = match res {
        Ok(v) => v,
        Err(e) => {
            return json_with_status(
                rejected(&e),
                &DiagnosticQueryResponse::failed(e.to_string(), 0.0),
            )
        }
    };

    tracing::debug!(name = entry.name, "running predefined query");
    let timeout = req
        .timeout_seconds
        .unwrap_or(state.args().default_timeout_secs);
    let resp = query::run_diagnostic_query(&req.connection_string, entry.query, timeout).await;
    json_ok(&resp)
}

pub async fn predefined_queries() -> Response {
    json_ok(&catalog::PREDEFINED_QUERIES)
}

pub async fn test_connection(body: Bytes) -> Response {
    let req = match parse::<DatabaseConnectionRequest>(&body)
        .and_then(|req| require(&req.connection_string, "Connection string is required").map(|_| req))
    {
        Ok(req) => req,
        Err(e) => {
            return json_with_status(
                rejected(&e),
                &DatabaseConnectionResponse::failed(e.to_string()),
            )
        }
    };

    json_ok(&xevents::test_connection(&req.connection_string).await)
}

pub async fn extended_event_sessions(
    params: Result<Query<SessionsQuery>, QueryRejection>,
) -> Response {
    let res = params
        .map_err(|e| AppError::InvalidRequest(format!("invalid query string: {}", e.body_text())))
        .and_then(|Query(params)| {
            let connection_string = params.connection_string.unwrap_or_default();
            require(&connection_string, "Connection string is required")?;
            Ok(connection_string)
        });
    let connection_string = match res {
        Ok(cs) => cs,
        Err(e) => return json_with_status(rejected(&e), &ApiFailure::new(e.to_string())),
    };

    json_ok(&xevents::list_sessions(&connection_string).await)
}

pub async fn deadlock_events(State(state): State<AppState>, body: Bytes) -> Response {
    let req = match parse::<DeadlockEventsRequest>(&body).and_then(|req| {
        require(&req.connection_string, "Connection string is required")?;
        require(
            &req.extended_event_session_name,
            "Extended Event session name is required",
        )?;
        Ok(req)
    }) {
        Ok(req) => req,
        Err(e) => {
            return json_with_status(
                rejected(&e),
                &DeadlockEventsResponse::failed(e.to_string()),
            )
        }
    };

    let args = state.args();
    let max = limits::effective_limit(req.max_records, args.max_deadlock_records);
    let timeout = limits::command_timeout(args.deadlock_timeout_secs);
    json_ok(&xevents::deadlock_events(&req, max.max_records, timeout).await)
}
