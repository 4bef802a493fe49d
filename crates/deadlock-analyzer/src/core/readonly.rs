/// Keywords that mark a statement as side-effecting.
pub const DENIED_KEYWORDS: &[&str] = &[
    "DROP", "DELETE", "TRUNCATE", "INSERT", "UPDATE", "ALTER", "CREATE", "EXEC", "EXECUTE",
];

/// Best-effort read-only check for diagnostic SQL.
///
/// Plain substring matching over the uppercased text, not token aware:
/// `name = 'updated'` is refused, while stacked statements or mutating verbs
/// outside the denylist slip through. Treat this as a guard rail for operators,
/// never as a security boundary.
pub fn is_sql_readonly(sql: &str) -> bool {
    let upper = sql.to_uppercase();
    !DENIED_KEYWORDS.iter().any(|kw| upper.contains(kw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_selects_pass() {
        assert!(is_sql_readonly("SELECT * FROM sys.dm_os_wait_stats"));
        assert!(is_sql_readonly(
            "select request_session_id, resource_type, request_mode from sys.dm_tran_locks where resource_database_id > 0"
        ));
    }

    #[test]
    fn every_keyword_rejects_in_any_case() {
        for kw in DENIED_KEYWORDS {
            assert!(!is_sql_readonly(&format!("{kw} something")), "{kw}");
            assert!(!is_sql_readonly(&format!("select 1; {}", kw.to_lowercase())), "{kw}");
        }
    }

    #[test]
    fn substring_match_rejects_literals() {
        assert!(!is_sql_readonly("select * from T where name = 'updated'"));
        assert!(!is_sql_readonly("SELECT create_time FROM sys.server_event_sessions"));
        assert!(!is_sql_readonly(
            "select session_id, blocking_session_id from sys.dm_exec_requests where blocking_session_id > 0"
        ));
    }

    #[test]
    fn unlisted_mutations_are_not_caught() {
        assert!(is_sql_readonly("SELECT 1; DBCC FREEPROCCACHE"));
        assert!(is_sql_readonly("SELECT 1; GRANT VIEW SERVER STATE TO bob"));
    }
}
