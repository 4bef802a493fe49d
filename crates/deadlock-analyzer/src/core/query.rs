use std::{sync::Arc, time::Instant};

use futures::TryStreamExt;
use tiberius::{Column, ColumnData, QueryItem};

use crate::core::connection::{self, SqlClient};
use crate::core::limits::command_timeout;
use crate::core::types::{ColumnLayout, DbRow, DiagnosticQueryResponse};
use crate::core::value::CellValue;
use crate::error::{AppError, AppResult};

/// A materialized result set: column names in driver order plus rows.
#[derive(Debug, Default)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<DbRow>,
}

/// Runs an already gated statement and shapes the first result set for JSON.
///
/// Never fails: connection and execution errors come back as a
/// `success: false` response carrying the driver message and the time spent
/// up to the failure.
pub async fn run_diagnostic_query(
    connection_string: &str,
    sql: &str,
    timeout_secs: u64,
) -> DiagnosticQueryResponse {
    let started = Instant::now();
    let res = execute(connection_string, sql, timeout_secs).await;
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

    match res {
        Ok(set) => {
            tracing::info!(
                columns = set.columns.len(),
                rows = set.rows.len(),
                elapsed_ms,
                "diagnostic query executed"
            );
            DiagnosticQueryResponse::ok(set.columns, set.rows, elapsed_ms)
        }
        Err(e) => {
            tracing::error!(error = %e, code = e.code(), elapsed_ms, "failed to execute diagnostic query");
            DiagnosticQueryResponse::failed(format!("Query execution failed: {e}"), elapsed_ms)
        }
    }
}

async fn execute(connection_string: &str, sql: &str, timeout_secs: u64) -> AppResult<ResultSet> {
    let mut client = connection::connect(connection_string).await?;
    connection::with_command_timeout(
        command_timeout(timeout_secs),
        read_first_result_set(&mut client, sql),
    )
    .await
}

/// Streams the first result set of `sql`. Later result sets in the same batch
/// are not read. A statement that produces no result set yields no columns.
pub async fn read_first_result_set(client: &mut SqlClient, sql: &str) -> AppResult<ResultSet> {
    let mut stream = client.simple_query(sql).await?;
    let mut set = FirstResultSet::default();

    while let Some(item) = stream.try_next().await? {
        let more = match item {
            QueryItem::Metadata(meta) => set.columns(meta.result_index(), column_names(meta.columns())),
            QueryItem::Row(row) => {
                if !set.has_columns() {
                    set.columns(row.result_index(), column_names(row.columns()));
                }
                set.row(row.result_index(), row)?
            }
        };
        if !more {
            break;
        }
    }

    Ok(set.finish())
}

fn column_names(columns: &[Column]) -> Vec<String> {
    columns.iter().map(|c| c.name().to_string()).collect()
}

/// Collects the first result set of a batch from driver events. Each method
/// returns `false` once the batch has moved past it.
#[derive(Debug, Default)]
pub struct FirstResultSet {
    layout: Option<Arc<ColumnLayout>>,
    rows: Vec<DbRow>,
}

impl FirstResultSet {
    pub fn has_columns(&self) -> bool {
        self.layout.is_some()
    }

    pub fn columns(&mut self, result_index: usize, names: Vec<String>) -> bool {
        if result_index != 0 {
            return false;
        }
        self.layout = Some(Arc::new(ColumnLayout::new(names)));
        true
    }

    pub fn row<I>(&mut self, result_index: usize, cells: I) -> AppResult<bool>
    where
        I: IntoIterator<Item = ColumnData<'static>>,
    {
        if result_index != 0 {
            return Ok(false);
        }
        let Some(layout) = self.layout.clone() else {
            return Err(AppError::Internal("row received before column metadata".into()));
        };
        let values = cells
            .into_iter()
            .map(|data| CellValue::from_column_data(&data))
            .collect::<AppResult<Vec<_>>>()?;
        self.rows.push(DbRow::new(layout, values));
        Ok(true)
    }

    pub fn finish(self) -> ResultSet {
        ResultSet {
            columns: self
                .layout
                .map(|l| l.names().to_vec())
                .unwrap_or_default(),
            rows: self.rows,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tiberius::IntoSql;

    use super::*;

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_result_still_reports_columns() {
        let mut set = FirstResultSet::default();
        assert!(set.columns(0, names(&["session_id", "wait_type"])));
        let resp = DiagnosticQueryResponse::ok(set.finish().columns, Vec::new(), 0.4);
        let v = serde_json::to_value(&resp).unwrap();
        assert_eq!(v["success"], json!(true));
        assert_eq!(v["columnNames"], json!(["session_id", "wait_type"]));
        assert_eq!(v["recordCount"], json!(0));
    }

    #[test]
    fn duplicate_names_survive_in_column_list() {
        let mut set = FirstResultSet::default();
        set.columns(0, names(&["a", "a"]));
        assert!(set
            .row(0, vec![ColumnData::I32(Some(1)), ColumnData::I32(Some(2))])
            .unwrap());
        let rs = set.finish();
        assert_eq!(rs.columns, ["a", "a"]);
        assert_eq!(serde_json::to_value(&rs.rows[0]).unwrap(), json!({ "a": 2 }));
    }

    #[test]
    fn row_keys_match_column_names() {
        let mut set = FirstResultSet::default();
        set.columns(0, names(&["spid", "blocked_by", "cmd"]));
        for spid in [51, 52] {
            set.row(
                0,
                vec![
                    ColumnData::I16(Some(spid)),
                    ColumnData::I16(None),
                    "SELECT".to_string().into_sql(),
                ],
            )
            .unwrap();
        }
        let rs = set.finish();
        assert_eq!(rs.rows.len(), 2);
        for row in &rs.rows {
            let v = serde_json::to_value(row).unwrap();
            let mut keys: Vec<_> = v.as_object().unwrap().keys().cloned().collect();
            let mut expected = rs.columns.clone();
            keys.sort();
            expected.sort();
            assert_eq!(keys, expected);
        }
    }

    #[test]
    fn later_result_sets_are_ignored() {
        let mut set = FirstResultSet::default();
        set.columns(0, names(&["x"]));
        set.row(0, vec![ColumnData::I32(Some(1))]).unwrap();
        assert!(!set.columns(1, names(&["y", "z"])));
        assert!(!set.row(1, vec![ColumnData::I32(Some(2)), ColumnData::I32(Some(3))]).unwrap());
        let rs = set.finish();
        assert_eq!(rs.columns, ["x"]);
        assert_eq!(rs.rows.len(), 1);
    }

    #[test]
    fn statement_without_result_set_has_no_columns() {
        let rs = FirstResultSet::default().finish();
        assert!(rs.columns.is_empty());
        assert!(rs.rows.is_empty());
    }

    /// Needs a reachable server: set DEADLOCK_ANALYZER_TEST_DSN to an ADO
    /// connection string and run with `--ignored`.
    #[tokio::test]
    #[ignore]
    async fn live_server_result_shapes() {
        let Ok(dsn) = std::env::var("DEADLOCK_ANALYZER_TEST_DSN") else {
            return;
        };

        let resp = run_diagnostic_query(&dsn, "SELECT 1 AS a, 2 AS a", 30).await;
        assert!(resp.success, "{}", resp.message);
        assert_eq!(resp.column_names, ["a", "a"]);
        assert_eq!(serde_json::to_value(&resp.results[0]).unwrap(), json!({ "a": 2 }));

        let resp = run_diagnostic_query(&dsn, "SELECT name FROM sys.objects WHERE 1 = 0", 30).await;
        assert!(resp.success, "{}", resp.message);
        assert_eq!(resp.column_names, ["name"]);
        assert_eq!(resp.record_count, 0);

        let resp = run_diagnostic_query(&dsn, "SELECT 1 AS x; SELECT 2 AS y", 30).await;
        assert_eq!(resp.column_names, ["x"]);
        assert_eq!(resp.record_count, 1);

        let resp = run_diagnostic_query(&dsn, "SELECT * FROM dbo.NoSuchTable_4f1c", 30).await;
        assert!(!resp.success);
        assert!(resp.message.contains("Invalid object name"), "{}", resp.message);
    }

    const UNREACHABLE: &str = "Server=tcp:127.0.0.1,1;Database=master;User Id=sa;Password=x;TrustServerCertificate=true";

    #[tokio::test]
    async fn connection_failure_is_a_structured_response() {
        let resp = run_diagnostic_query(UNREACHABLE, "SELECT * FROM dbo.DoesNotExist", 30).await;
        assert!(!resp.success);
        assert!(resp.message.starts_with("Query execution failed: "));
        assert!(resp.message.len() > "Query execution failed: ".len());
        assert!(resp.results.is_empty());
        assert!(resp.column_names.is_empty());
        assert_eq!(resp.record_count, 0);
        assert!(resp.execution_time_ms >= 0.0);
    }

    #[tokio::test]
    async fn concurrent_failures_stay_independent() {
        let a = run_diagnostic_query(UNREACHABLE, "SELECT 1", 5);
        let b = run_diagnostic_query("Server=tcp:127.0.0.1,2;User Id=sa;Password=y", "SELECT 2", 5);
        let (a, b) = tokio::join!(a, b);
        for resp in [a, b] {
            assert!(!resp.success);
            assert_eq!(resp.record_count, resp.results.len());
        }
    }
}
