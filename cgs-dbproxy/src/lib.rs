//! DB-proxy: an LRU+TTL query cache layered over a primary/replica
//! failover backend, with write-driven cache invalidation scoped by table.

pub mod cache;
pub mod db_backend;
pub mod error;

pub use cache::{QueryCache, QueryCacheConfig, QueryResult};
pub use db_backend::{extract_table_name, DbBackend, DbProxy, SqlxPostgresBackend};
pub use error::{DbProxyError, DbProxyResult};

use slog::{o, Drain, Logger};

/// External config surface (§6): primary + replica DB endpoints plus the
/// cache tuning knobs, loadable from whatever format an out-of-scope
/// external loader chooses.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct DbProxyConfig {
    pub primary_endpoint: String,
    pub replica_endpoints: Vec<String>,
    pub cache: QueryCacheConfig,
}

/// Ties the cache and the failover proxy together: reads check the cache
/// first and populate it on miss, writes go straight to primary and then
/// invalidate whatever table they touched.
pub struct DbProxyService<B: DbBackend> {
    proxy: DbProxy<B>,
    cache: QueryCache,
}

impl<B: DbBackend> DbProxyService<B> {
    pub fn new(proxy: DbProxy<B>, cache_config: QueryCacheConfig) -> Self {
        DbProxyService {
            proxy,
            cache: QueryCache::new(&cache_config),
        }
    }

    pub async fn query(&self, sql: &str) -> DbProxyResult<QueryResult> {
        if let Some(cached) = self.cache.get(sql) {
            return Ok(cached);
        }
        let result = self.proxy.query(sql).await?;
        self.cache.put(sql.to_string(), result.clone());
        Ok(result)
    }

    pub async fn execute(&self, sql: &str) -> DbProxyResult<u64> {
        let affected = self.proxy.execute(sql).await?;
        if let Some(table) = extract_table_name(sql) {
            self.cache.invalidate_by_table(&table);
        }
        Ok(affected)
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }
}

pub fn default_logger() -> Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_envlogger::new(drain).fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    Logger::root(drain, o!("crate" => "cgs-dbproxy"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingBackend {
        queries: AtomicUsize,
    }

    impl CountingBackend {
        fn new() -> Self {
            CountingBackend { queries: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl DbBackend for CountingBackend {
        async fn execute(&self, _sql: &str) -> DbProxyResult<u64> {
            Ok(1)
        }

        async fn query(&self, _sql: &str) -> DbProxyResult<QueryResult> {
            self.queries.fetch_add(1, Ordering::Relaxed);
            Ok(Arc::new(vec![serde_json::json!({"n": 1})]))
        }
    }

    #[async_std::test]
    async fn repeated_query_hits_cache_without_hitting_backend_again() {
        let backend = CountingBackend::new();
        let proxy = DbProxy::new(backend, vec![], default_logger());
        let service = DbProxyService::new(proxy, QueryCacheConfig::default());

        service.query("SELECT * FROM players").await.unwrap();
        service.query("SELECT * FROM players").await.unwrap();

        assert_eq!(service.proxy.primary().queries.load(Ordering::Relaxed), 1);
        assert_eq!(service.cache.hit_count(), 1);
    }

    #[async_std::test]
    async fn write_invalidates_cached_reads_of_its_table() {
        let backend = CountingBackend::new();
        let proxy = DbProxy::new(backend, vec![], default_logger());
        let service = DbProxyService::new(proxy, QueryCacheConfig::default());

        service.query("SELECT * FROM players").await.unwrap();
        service.execute("UPDATE players SET level = 2").await.unwrap();
        service.query("SELECT * FROM players").await.unwrap();

        assert_eq!(service.proxy.primary().queries.load(Ordering::Relaxed), 2);
    }
}
