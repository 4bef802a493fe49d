use super::types::PredefinedQuery;

/// Built-in diagnostic queries offered to operators.
pub static PREDEFINED_QUERIES: &[PredefinedQuery] = &[
    PredefinedQuery {
        name: "Active Deadlock Sessions",
        description: "Shows Extended Event sessions that capture deadlock events",
        query: r#"
SELECT
    s.name AS session_name,
    CASE WHEN rs.name IS NOT NULL THEN 'STARTED' ELSE 'STOPPED' END AS state,
    rs.create_time,
    COUNT(e.name) AS deadlock_events_count
FROM sys.server_event_sessions s
LEFT JOIN sys.dm_xe_sessions rs ON s.name = rs.name
LEFT JOIN sys.server_event_session_events e ON s.event_session_id = e.event_session_id AND e.name = 'xml_deadlock_report'
WHERE EXISTS (
    SELECT 1 FROM sys.server_event_session_events se
    WHERE se.event_session_id = s.event_session_id AND se.name = 'xml_deadlock_report'
)
GROUP BY s.name, rs.name, rs.create_time
ORDER BY s.name"#,
    },
    PredefinedQuery {
        name: "Lock Waits Summary",
        description: "Shows current lock wait statistics",
        query: r#"
SELECT
    wait_type,
    waiting_tasks_count,
    wait_time_ms,
    max_wait_time_ms,
    signal_wait_time_ms,
    wait_time_ms - signal_wait_time_ms AS resource_wait_time_ms,
    CASE
        WHEN waiting_tasks_count > 0
        THEN wait_time_ms / waiting_tasks_count
        ELSE 0
    END AS avg_wait_time_ms
FROM sys.dm_os_wait_stats
WHERE wait_type LIKE 'LCK%'
   OR wait_type IN ('DEADLOCK_MONITOR', 'LOCK_MONITOR')
ORDER BY wait_time_ms DESC"#,
    },
    PredefinedQuery {
        name: "Current Blocking Processes",
        description: "Shows currently blocking and blocked processes",
        query: r#"
SELECT
    r.session_id AS blocked_session_id,
    r.blocking_session_id,
    r.wait_type,
    r.wait_time,
    r.wait_resource,
    r.command,
    s.program_name,
    s.host_name,
    s.login_name,
    r.status,
    t.text AS current_statement
FROM sys.dm_exec_requests r
INNER JOIN sys.dm_exec_sessions s ON r.session_id = s.session_id
OUTER APPLY sys.dm_exec_sql_text(r.sql_handle) t
WHERE r.blocking_session_id > 0
   OR r.session_id IN (SELECT blocking_session_id FROM sys.dm_exec_requests WHERE blocking_session_id > 0)
ORDER BY r.blocking_session_id, r.session_id"#,
    },
    PredefinedQuery {
        name: "Database Lock Usage",
        description: "Shows lock counts by database and resource type",
        query: r#"
SELECT
    DB_NAME(resource_database_id) AS database_name,
    resource_type,
    request_mode,
    COUNT(*) AS lock_count
FROM sys.dm_tran_locks
WHERE resource_database_id > 0
GROUP BY resource_database_id, resource_type, request_mode
ORDER BY DB_NAME(resource_database_id), resource_type, lock_count DESC"#,
    },
    PredefinedQuery {
        name: "Top Queries by CPU",
        description: "Shows queries with highest CPU usage that might be involved in deadlocks",
        query: r#"
SELECT TOP 20
    qs.sql_handle,
    qs.execution_count,
    qs.total_worker_time,
    qs.total_worker_time / qs.execution_count AS avg_worker_time,
    qs.total_elapsed_time,
    qs.total_elapsed_time / qs.execution_count AS avg_elapsed_time,
    qs.total_logical_reads,
    qs.total_logical_reads / qs.execution_count AS avg_logical_reads,
    t.text AS query_text
FROM sys.dm_exec_query_stats qs
CROSS APPLY sys.dm_exec_sql_text(qs.sql_handle) t
ORDER BY avg_worker_time DESC"#,
    },
];

pub fn find(name: &str) -> Option<&'static PredefinedQuery> {
    PREDEFINED_QUERIES
        .iter()
        .find(|q| q.name.eq_ignore_ascii_case(name))
}
