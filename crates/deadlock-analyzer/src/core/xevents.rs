use std::time::Duration;

use chrono::NaiveDateTime;
use tiberius::{FromSql, Row, ToSql};

use crate::core::connection::{self, SqlClient};
use crate::core::types::{
    DatabaseConnectionResponse, DeadlockEvent, DeadlockEventsRequest, DeadlockEventsResponse,
    ExtendedEventSession,
};
use crate::error::{AppError, AppResult};

const SERVER_INFO_SQL: &str = "SELECT @@VERSION, DB_NAME()";

const SESSION_EXISTS_SQL: &str = r#"
SELECT s.name, s.startup_state
FROM sys.server_event_sessions s
WHERE s.name = @P1"#;

const DEADLOCK_SESSIONS_SQL: &str = r#"
SELECT
    s.name,
    CASE WHEN rs.name IS NOT NULL THEN 'STARTED' ELSE 'STOPPED' END AS state,
    CAST(CASE WHEN rs.name IS NOT NULL THEN 1 ELSE 0 END AS bit) AS is_running,
    rs.create_time
FROM sys.server_event_sessions s
LEFT JOIN sys.dm_xe_sessions rs ON s.name = rs.name
WHERE EXISTS (
    SELECT 1
    FROM sys.server_event_session_events e
    WHERE e.event_session_id = s.event_session_id
    AND e.name = 'xml_deadlock_report'
)
ORDER BY s.name"#;

/// Reads `xml_deadlock_report` events from the session's event_file target,
/// newest first. `@P1` is the session name, `@P2` the row cap; the optional
/// bounds take the next parameter slots in order.
pub fn deadlock_events_sql(has_start: bool, has_end: bool) -> String {
    let mut filters = Vec::new();
    let mut next = 3;
    if has_start {
        filters.push(format!("timestamp_utc >= @P{next}"));
        next += 1;
    }
    if has_end {
        filters.push(format!("timestamp_utc <= @P{next}"));
    }
    let where_clause = if filters.is_empty() {
        String::new()
    } else {
        format!("\nWHERE {}", filters.join("\n  AND "))
    };

    format!(
        r#"
WITH DeadlockEvents AS (
    SELECT
        object_name,
        CAST(event_data AS XML) AS event_data_xml,
        file_name,
        file_offset,
        timestamp_utc
    FROM sys.fn_xe_file_target_read_file(
        (SELECT CAST(t.target_data AS XML).value('(EventFileTarget/File/@name)[1]', 'NVARCHAR(256)')
         FROM sys.dm_xe_sessions s
         INNER JOIN sys.dm_xe_session_targets t ON s.address = t.event_session_address
         WHERE s.name = @P1 AND t.target_name = 'event_file'),
        NULL, NULL, NULL
    )
    WHERE object_name = 'xml_deadlock_report'
)
SELECT TOP (@P2)
    CAST(timestamp_utc AS datetime2) AS timestamp_utc,
    event_data_xml.value('(event/data[@name="xml_report"]/value)[1]', 'NVARCHAR(MAX)') AS xml_report,
    CAST(@P1 AS NVARCHAR(128)) AS session_name
FROM DeadlockEvents{where_clause}
ORDER BY timestamp_utc DESC"#
    )
}

fn required<'a, T: FromSql<'a>>(row: &'a Row, column: &str) -> AppResult<T> {
    row.try_get::<T, _>(column)?
        .ok_or_else(|| AppError::SqlError(format!("unexpected NULL in column {column}")))
}

/// Connectivity check: server version and current database.
pub async fn test_connection(connection_string: &str) -> DatabaseConnectionResponse {
    match server_info(connection_string).await {
        Ok(Some((server_version, database_name))) => DatabaseConnectionResponse {
            is_connected: true,
            message: "Connection successful".into(),
            server_version: Some(server_version),
            database_name: Some(database_name),
        },
        Ok(None) => DatabaseConnectionResponse::failed("Unable to retrieve server information"),
        Err(e) => {
            tracing::error!(error = %e, code = e.code(), "failed to test database connection");
            DatabaseConnectionResponse::failed(format!("Connection failed: {e}"))
        }
    }
}

async fn server_info(connection_string: &str) -> AppResult<Option<(String, String)>> {
    let mut client = connection::connect(connection_string).await?;
    let Some(row) = client.simple_query(SERVER_INFO_SQL).await?.into_row().await? else {
        return Ok(None);
    };
    let version = row.try_get::<&str, _>(0)?.unwrap_or_default().to_string();
    let database = row.try_get::<&str, _>(1)?.unwrap_or("master").to_string();
    Ok(Some((version, database)))
}

/// Sessions that capture `xml_deadlock_report`. Failures are logged and read
/// as "no sessions".
pub async fn list_sessions(connection_string: &str) -> Vec<ExtendedEventSession> {
    match fetch_sessions(connection_string).await {
        Ok(sessions) => {
            tracing::debug!(count = sessions.len(), "listed deadlock sessions");
            sessions
        }
        Err(e) => {
            tracing::error!(error = %e, code = e.code(), "failed to retrieve Extended Event sessions");
            Vec::new()
        }
    }
}

async fn fetch_sessions(connection_string: &str) -> AppResult<Vec<ExtendedEventSession>> {
    let mut client = connection::connect(connection_string).await?;
    let rows = client
        .simple_query(DEADLOCK_SESSIONS_SQL)
        .await?
        .into_first_result()
        .await?;

    rows.iter()
        .map(|row| -> AppResult<ExtendedEventSession> {
            Ok(ExtendedEventSession {
                name: required::<&str>(row, "name")?.to_string(),
                state: required::<&str>(row, "state")?.to_string(),
                is_running: required(row, "is_running")?,
                create_time: row.try_get::<NaiveDateTime, _>("create_time")?,
            })
        })
        .collect()
}

/// Historical deadlock reports for one session, bounded by `max_records` and
/// the optional date range. Runs under `timeout` once connected.
pub async fn deadlock_events(
    req: &DeadlockEventsRequest,
    max_records: usize,
    timeout: Option<Duration>,
) -> DeadlockEventsResponse {
    let res = async {
        let mut client = connection::connect(&req.connection_string).await?;
        connection::with_command_timeout(timeout, read_deadlock_events(&mut client, req, max_records))
            .await
    }
    .await;

    match res {
        Ok(events) => {
            tracing::info!(
                session = %req.extended_event_session_name,
                count = events.len(),
                "retrieved deadlock events"
            );
            DeadlockEventsResponse::ok(events)
        }
        Err(e @ AppError::SessionNotFound(_)) => {
            tracing::warn!(session = %req.extended_event_session_name, "extended event session not found");
            DeadlockEventsResponse::failed(e.to_string())
        }
        Err(e) => {
            tracing::error!(error = %e, code = e.code(), "failed to retrieve deadlock events from Extended Events");
            DeadlockEventsResponse::failed(format!("Failed to retrieve deadlock events: {e}"))
        }
    }
}

async fn read_deadlock_events(
    client: &mut SqlClient,
    req: &DeadlockEventsRequest,
    max_records: usize,
) -> AppResult<Vec<DeadlockEvent>> {
    let session = req.extended_event_session_name.as_str();

    let exists = client
        .query(SESSION_EXISTS_SQL, &[&session])
        .await?
        .into_row()
        .await?;
    if exists.is_none() {
        return Err(AppError::SessionNotFound(session.to_string()));
    }

    let top = i64::try_from(max_records).unwrap_or(i64::MAX);
    let mut params: Vec<&dyn ToSql> = vec![&session, &top];
    if let Some(start) = req.start_date.as_ref() {
        params.push(start);
    }
    if let Some(end) = req.end_date.as_ref() {
        params.push(end);
    }

    let sql = deadlock_events_sql(req.start_date.is_some(), req.end_date.is_some());
    let rows = client.query(sql, &params).await?.into_first_result().await?;

    rows.iter()
        .map(|row| -> AppResult<DeadlockEvent> {
            Ok(DeadlockEvent {
                timestamp: required(row, "timestamp_utc")?,
                xml_report: row
                    .try_get::<&str, _>("xml_report")?
                    .unwrap_or_default()
                    .to_string(),
                session_name: required::<&str>(row, "session_name")?.to_string(),
            })
        })
        .collect()
}
