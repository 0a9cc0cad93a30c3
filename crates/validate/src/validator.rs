//! Existence, reference-count, consistency, and server tool-list checks.

use crate::cache::{existence_key, ValidationCache};
use crate::format::{check_key, check_reference};
use crate::report::{ConsistencyReport, ReferenceIssue};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use time::OffsetDateTime;
use toolgraph_gateway::{all_servers, ListError, RemoteStore};
use toolgraph_graph::Tracker;
use toolgraph_model::{
    CheckError, ErrorKind, McpServer, McpServerKey, ServerId, ToolKey, ToolReference,
};
use tracing::{debug, info};

/// Page size used when enumerating the remote server list.
pub const LIST_PAGE_SIZE: u32 = 100;

/// History entries keep at most this many error messages.
const HISTORY_ERROR_SAMPLE: usize = 5;

/// Outcome of one existence lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Existence {
    pub exists: bool,
    pub detail: String,
    /// Answered from the cache without a remote call.
    pub cached: bool,
}

/// One recorded consistency run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
    pub scope: String,
    pub success: bool,
    pub error_count: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorStats {
    pub total_validations: usize,
    pub successful_validations: usize,
    pub failed_validations: usize,
    pub success_rate: f64,
    pub errors_by_kind: BTreeMap<ErrorKind, usize>,
    pub cache_size: usize,
    pub remote_lookups: u64,
    pub cache_hits: u64,
}

#[derive(Debug, Default)]
struct Counters {
    remote_lookups: u64,
    cache_hits: u64,
    errors_by_kind: BTreeMap<ErrorKind, usize>,
}

/// Runs every check against one remote store.
///
/// Locks guard only in-memory state and are released before any remote
/// call is awaited.
pub struct Validator {
    store: Arc<dyn RemoteStore>,
    cache: ValidationCache,
    history: Mutex<Vec<HistoryEntry>>,
    counters: Mutex<Counters>,
}

impl std::fmt::Debug for Validator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Validator")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl Validator {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self::with_cache(store, ValidationCache::default())
    }

    pub fn with_cache(store: Arc<dyn RemoteStore>, cache: ValidationCache) -> Self {
        Self {
            store,
            cache,
            history: Mutex::new(Vec::new()),
            counters: Mutex::new(Counters::default()),
        }
    }

    pub fn cache(&self) -> &ValidationCache {
        &self.cache
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Drop the cached existence outcome for `key`, after this run created
    /// or removed it.
    pub fn forget(&self, key: &ToolKey) {
        self.cache.remove(&existence_key(key));
    }

    // ===== Format =====

    pub fn check_format(&self, reference: &ToolReference) -> Result<(), CheckError> {
        check_reference(reference)
    }

    // ===== Existence =====

    /// Whether `key` exists in the remote store.
    ///
    /// A fresh cache entry is returned without a remote call. Otherwise one
    /// remote call is made and its found/not-found outcome cached. A remote
    /// failure is returned as [`CheckError::RemoteUnavailable`] and leaves
    /// the cache untouched. A malformed key fails with
    /// [`CheckError::Format`] before any lookup.
    pub async fn check_exists(&self, key: &ToolKey) -> Result<Existence, CheckError> {
        check_key(key)?;
        let cache_key = existence_key(key);
        if let Some(entry) = self.cache.get_fresh(&cache_key) {
            self.counters.lock().cache_hits += 1;
            return Ok(Existence {
                exists: entry.outcome,
                detail: entry.detail,
                cached: true,
            });
        }

        self.counters.lock().remote_lookups += 1;
        let envelope = self
            .store
            .tool_info(key)
            .await
            .map_err(|e| e.into_check_error())?;

        let (exists, detail) = match (envelope.success, envelope.data.as_ref()) {
            (true, Some(spec)) => (true, format!("found at version {}", spec.version)),
            _ => (false, envelope.message_or("not found")),
        };
        debug!(target: "toolgraph::validate", tool = %key, exists, "existence looked up");
        self.cache.insert(cache_key, exists, detail.clone());
        Ok(Existence {
            exists,
            detail,
            cached: false,
        })
    }

    /// Like [`check_exists`](Self::check_exists), but absence is an error.
    pub async fn require_exists(&self, key: &ToolKey) -> Result<(), CheckError> {
        let existence = self.check_exists(key).await?;
        if existence.exists {
            Ok(())
        } else {
            Err(CheckError::dependency_not_found(key.clone(), existence.detail))
        }
    }

    // ===== Reference count =====

    /// Compare the reference count of `key` with `expected`.
    ///
    /// With a tracker the count comes from its dependency graph. Without
    /// one it is recomputed from every page of the remote server list;
    /// that path is never cached. Returns the actual count on agreement.
    pub async fn check_reference_count(
        &self,
        key: &ToolKey,
        expected: usize,
        tracker: Option<&Tracker>,
    ) -> Result<usize, CheckError> {
        let referrers: Vec<McpServerKey> = match tracker {
            Some(tracker) => tracker.referrers_of(key).into_iter().collect(),
            None => self.remote_referrers(key).await?,
        };
        let actual = referrers.len();
        if actual == expected {
            return Ok(actual);
        }
        Err(CheckError::ReferenceCountMismatch {
            tool: key.clone(),
            expected,
            actual,
            referrers,
        })
    }

    /// Distinct remote servers whose tool list contains `key`.
    pub async fn remote_referrers(&self, key: &ToolKey) -> Result<Vec<McpServerKey>, CheckError> {
        let servers = self.remote_servers().await?;
        let referrers: BTreeSet<McpServerKey> = servers
            .into_iter()
            .filter(|s| s.references(key))
            .map(|s| s.key)
            .collect();
        Ok(referrers.into_iter().collect())
    }

    async fn remote_servers(&self) -> Result<Vec<McpServer>, CheckError> {
        all_servers(self.store.as_ref(), LIST_PAGE_SIZE)
            .await
            .map_err(|err| match err {
                ListError::Gateway(e) => e.into_check_error(),
                // the store answered, so this is not an outage
                ListError::Rejected(message) => CheckError::Consistency {
                    scope: "remote server list".to_string(),
                    failures: vec![format!("list rejected: {message}")],
                },
            })
    }

    // ===== Consistency =====

    /// Format and existence checks over every reference of `server`, of
    /// every tracked server when `server` is `None`, or of every remote
    /// server when neither is available.
    ///
    /// All failing references are collected. A reference resolves through
    /// the tracker's registry first and the remote store second. Only a
    /// remote failure ends the check early.
    pub async fn check_consistency(
        &self,
        server: Option<&McpServer>,
        tracker: Option<&Tracker>,
    ) -> Result<ConsistencyReport, CheckError> {
        let (scope, servers) = match (server, tracker) {
            (Some(server), _) => (format!("server {}", server.key), vec![server.clone()]),
            (None, Some(tracker)) => ("all tracked servers".to_string(), tracker.servers()),
            (None, None) => ("all remote servers".to_string(), self.remote_servers().await?),
        };

        let mut report = ConsistencyReport::new(scope);
        for server in &servers {
            report.servers_checked += 1;
            for (index, reference) in server.tools.iter().enumerate() {
                report.references_checked += 1;
                if let Err(err) = check_reference(reference) {
                    report.add_issue(ReferenceIssue::new(server.key.clone(), index, &err));
                    continue;
                }
                if tracker.is_some_and(|t| t.contains_tool(&reference.key)) {
                    continue;
                }
                match self.require_exists(&reference.key).await {
                    Ok(()) => {}
                    Err(err) if err.kind() == ErrorKind::RemoteUnavailable => {
                        self.record(&report, Some(&err));
                        return Err(err);
                    }
                    Err(err) => {
                        report.add_issue(ReferenceIssue::new(server.key.clone(), index, &err));
                    }
                }
            }
        }

        self.record(&report, None);
        info!(
            target: "toolgraph::validate",
            scope = %report.scope,
            servers = report.servers_checked,
            references = report.references_checked,
            issues = report.error_count(),
            "consistency check finished"
        );
        Ok(report)
    }

    // ===== Server tool list =====

    /// Fetch server `id` and compare its tool list with `expected`.
    ///
    /// Differences in the key set (missing or unexpected tools) and in
    /// pinned versions are all reported in one error. An absent pin
    /// compares as version 1.
    pub async fn validate_server_tools(
        &self,
        id: ServerId,
        expected: &[ToolReference],
    ) -> Result<(), CheckError> {
        let envelope = self
            .store
            .server_info(id)
            .await
            .map_err(|e| e.into_check_error())?;
        let scope = format!("server {id} tool list");
        let Some(server) = envelope.data.filter(|_| envelope.success) else {
            return Err(CheckError::Consistency {
                scope,
                failures: vec![format!(
                    "server not found: {}",
                    envelope.message.unwrap_or_else(|| "no data".to_string())
                )],
            });
        };

        let pins = |refs: &[ToolReference]| -> BTreeMap<ToolKey, i64> {
            refs.iter()
                .map(|r| (r.key.clone(), r.version.unwrap_or(1)))
                .collect()
        };
        let want = pins(expected);
        let have = pins(&server.tools);

        let mut failures = Vec::new();
        if expected.len() != server.tools.len() {
            failures.push(format!(
                "tool list has {} entries, expected {}",
                server.tools.len(),
                expected.len()
            ));
        }
        for (key, version) in &want {
            match have.get(key) {
                None => failures.push(format!("missing tool {key}")),
                Some(actual) if actual != version => failures.push(format!(
                    "tool {key} pinned to version {actual}, expected {version}"
                )),
                Some(_) => {}
            }
        }
        for key in have.keys().filter(|k| !want.contains_key(*k)) {
            failures.push(format!("unexpected tool {key}"));
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(CheckError::Consistency { scope, failures })
        }
    }

    // ===== History =====

    fn record(&self, report: &ConsistencyReport, fatal: Option<&CheckError>) {
        let mut errors: Vec<String> = report.issues.iter().map(ToString::to_string).collect();
        if let Some(err) = fatal {
            errors.push(err.to_string());
        }
        let entry = HistoryEntry {
            at: OffsetDateTime::now_utc(),
            scope: report.scope.clone(),
            success: errors.is_empty(),
            error_count: errors.len(),
            errors: errors.into_iter().take(HISTORY_ERROR_SAMPLE).collect(),
        };

        {
            let mut counters = self.counters.lock();
            for issue in &report.issues {
                *counters.errors_by_kind.entry(issue.kind).or_default() += 1;
            }
            if let Some(err) = fatal {
                *counters.errors_by_kind.entry(err.kind()).or_default() += 1;
            }
        }
        self.history.lock().push(entry);
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.history.lock().clone()
    }

    pub fn statistics(&self) -> ValidatorStats {
        let history = self.history.lock();
        let total = history.len();
        let successful = history.iter().filter(|h| h.success).count();
        drop(history);

        let counters = self.counters.lock();
        ValidatorStats {
            total_validations: total,
            successful_validations: successful,
            failed_validations: total - successful,
            success_rate: if total == 0 {
                0.0
            } else {
                successful as f64 / total as f64
            },
            errors_by_kind: counters.errors_by_kind.clone(),
            cache_size: self.cache.len(),
            remote_lookups: counters.remote_lookups,
            cache_hits: counters.cache_hits,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DEFAULT_TTL;
    use crate::clock::ManualClock;
    use std::time::Duration;
    use toolgraph_gateway::{GatewayError, MemoryStore, MockRemoteStore};
    use toolgraph_model::{Envelope, ToolSpec};
    use toolgraph_test_utils::{server, tool_key as key, tool_spec as spec};

    fn unavailable() -> GatewayError {
        GatewayError::Exhausted {
            operation: "toolspec/info".into(),
            attempts: 3,
            last: Box::new(GatewayError::transport("toolspec/info", "connection refused")),
        }
    }

    #[tokio::test]
    async fn absent_key_twice_in_window_makes_one_remote_call() {
        // Given a store that never knows the key
        let mut store = MockRemoteStore::new();
        store
            .expect_tool_info()
            .times(1)
            .returning(|_| Ok(Envelope::fail("ToolSpec not found")));
        let validator = Validator::new(Arc::new(store));

        // When
        let first = validator.check_exists(&key("absent")).await.unwrap();
        let second = validator.check_exists(&key("absent")).await.unwrap();

        // Then
        assert!(!first.exists && !first.cached);
        assert!(!second.exists && second.cached);
        let stats = validator.statistics();
        assert_eq!(stats.remote_lookups, 1);
        assert_eq!(stats.cache_hits, 1);
    }

    #[tokio::test]
    async fn stale_entry_triggers_fresh_call_even_when_found() {
        let mut store = MockRemoteStore::new();
        store
            .expect_tool_info()
            .times(2)
            .returning(|k| Ok(Envelope::ok(ToolSpec::new(k.clone(), serde_json::json!({})))));
        let clock = Arc::new(ManualClock::new());
        let validator = Validator::with_cache(
            Arc::new(store),
            ValidationCache::with_clock(DEFAULT_TTL, clock.clone()),
        );

        assert!(validator.check_exists(&key("a")).await.unwrap().exists);
        clock.advance(Duration::from_secs(30));
        let again = validator.check_exists(&key("a")).await.unwrap();
        assert!(again.exists);
        assert!(!again.cached);
    }

    #[tokio::test]
    async fn remote_error_is_distinct_and_not_cached() {
        let mut store = MockRemoteStore::new();
        let mut seq = mockall::Sequence::new();
        store
            .expect_tool_info()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(unavailable()));
        store
            .expect_tool_info()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Envelope::fail("not found")));
        let validator = Validator::new(Arc::new(store));

        let err = validator.check_exists(&key("a")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RemoteUnavailable);
        assert!(validator.cache().is_empty());

        let retried = validator.check_exists(&key("a")).await.unwrap();
        assert!(!retried.exists);
        assert!(!retried.cached);
    }

    #[tokio::test]
    async fn malformed_key_fails_without_remote_call() {
        let mut store = MockRemoteStore::new();
        store.expect_tool_info().never();
        let validator = Validator::new(Arc::new(store));

        let err = validator
            .check_exists(&ToolKey::new("n1", "", "t"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
        assert!(validator.cache().is_empty());
    }

    #[tokio::test]
    async fn reference_count_uses_tracker_graph() {
        let tracker = Tracker::new();
        tracker.track_tool(spec("tool1"));
        tracker.track_server(server("s1", &["tool1"]));
        tracker.track_server(server("s2", &["tool1", "tool1"]));
        let mut store = MockRemoteStore::new();
        store.expect_list_servers().never();
        let validator = Validator::new(Arc::new(store));

        let count = validator
            .check_reference_count(&key("tool1"), 2, Some(&tracker))
            .await
            .unwrap();
        assert_eq!(count, 2);

        let err = validator
            .check_reference_count(&key("tool1"), 1, Some(&tracker))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CheckError::ReferenceCountMismatch { expected: 1, actual: 2, .. }
        ));
    }

    #[tokio::test]
    async fn reference_count_fallback_enumerates_every_page() {
        let store = Arc::new(MemoryStore::new());
        for i in 0..(LIST_PAGE_SIZE + 5) {
            let tools: &[&str] = if i % 50 == 0 { &["x", "x"] } else { &["y"] };
            store.seed_server(server(&format!("s{i}"), tools));
        }
        let validator = Validator::new(store.clone());

        let count = validator
            .check_reference_count(&key("x"), 3, None)
            .await
            .unwrap();
        assert_eq!(count, 3);
        assert_eq!(store.stats().list_servers, 2);

        // not cached: a second check enumerates again
        validator
            .check_reference_count(&key("x"), 3, None)
            .await
            .unwrap();
        assert_eq!(store.stats().list_servers, 4);
    }

    #[tokio::test]
    async fn consistency_collects_every_failure() {
        let store = Arc::new(MemoryStore::new());
        store.seed_tool(spec("remote-only"));
        let tracker = Tracker::new();
        tracker.track_tool(spec("local"));
        let bad = McpServer::new(McpServerKey::new("n1", "s1")).with_tools(vec![
            ToolReference::new(key("local")),
            ToolReference::new(key("missing-1")),
            ToolReference::pinned(ToolKey::new("n1", "", "t"), 0),
            ToolReference::new(key("remote-only")),
            ToolReference::new(key("missing-2")),
        ]);
        tracker.track_server(bad.clone());
        let validator = Validator::new(store.clone());

        let report = validator.check_consistency(None, Some(&tracker)).await.unwrap();

        assert_eq!(report.references_checked, 5);
        assert_eq!(report.error_count(), 3);
        assert_eq!(report.count_of(ErrorKind::DependencyNotFound), 2);
        assert_eq!(report.count_of(ErrorKind::Format), 1);
        // local tool resolved without a remote call
        assert_eq!(store.stats().tool_info, 3);

        let stats = validator.statistics();
        assert_eq!(stats.total_validations, 1);
        assert_eq!(stats.failed_validations, 1);
        assert_eq!(stats.errors_by_kind[&ErrorKind::DependencyNotFound], 2);
        assert_eq!(validator.history()[0].errors.len(), 3);
    }

    #[tokio::test]
    async fn consistency_of_single_server_against_remote() {
        let store = Arc::new(MemoryStore::new());
        store.seed_tool(spec("a"));
        let validator = Validator::new(store);

        let report = validator
            .check_consistency(Some(&server("s1", &["a"])), None)
            .await
            .unwrap();
        assert!(report.is_consistent());
        assert_eq!(report.scope, "server n1/s1");
        assert!(validator.statistics().success_rate > 0.99);
    }

    #[tokio::test]
    async fn consistency_without_tracker_lists_remote_servers() {
        let store = Arc::new(MemoryStore::new());
        store.seed_tool(spec("a"));
        store.seed_server(server("s1", &["a"]));
        store.seed_server(server("s2", &["gone"]));
        let validator = Validator::new(store);

        let report = validator.check_consistency(None, None).await.unwrap();
        assert_eq!(report.servers_checked, 2);
        assert_eq!(report.error_count(), 1);
        assert!(report.issues[0].message.contains("n1.g1.gone"));
    }

    #[tokio::test]
    async fn consistency_stops_on_remote_failure() {
        let mut store = MockRemoteStore::new();
        store.expect_tool_info().returning(|_| Err(unavailable()));
        let validator = Validator::new(Arc::new(store));

        let err = validator
            .check_consistency(Some(&server("s1", &["a", "b"])), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RemoteUnavailable);
        assert_eq!(validator.statistics().failed_validations, 1);
    }

    #[tokio::test]
    async fn server_tool_list_differences_are_all_reported() {
        let mut store = MockRemoteStore::new();
        store.expect_server_info().returning(|id| {
            Ok(Envelope::ok(
                McpServer::new(McpServerKey::new("n1", "s1"))
                    .with_id(id)
                    .with_tools(vec![
                        ToolReference::new(ToolKey::new("n1", "g1", "a")),
                        ToolReference::pinned(ToolKey::new("n1", "g1", "b"), 2),
                        ToolReference::new(ToolKey::new("n1", "g1", "extra")),
                    ]),
            ))
        });
        let validator = Validator::new(Arc::new(store));

        let expected = vec![
            ToolReference::pinned(key("a"), 1),
            ToolReference::pinned(key("b"), 1),
            ToolReference::new(key("c")),
        ];
        let err = validator
            .validate_server_tools(ServerId(4), &expected)
            .await
            .unwrap_err();

        match err {
            CheckError::Consistency { failures, .. } => {
                assert_eq!(failures.len(), 3);
                assert!(failures.iter().any(|f| f.contains("missing tool n1.g1.c")));
                assert!(failures.iter().any(|f| f.contains("unexpected tool n1.g1.extra")));
                assert!(failures.iter().any(|f| f.contains("version 2, expected 1")));
            }
            other => panic!("unexpected {other:?}"),
        }

        let matching = vec![
            ToolReference::new(key("a")),
            ToolReference::pinned(key("b"), 2),
            ToolReference::new(key("extra")),
        ];
        assert!(validator.validate_server_tools(ServerId(4), &matching).await.is_ok());
    }

    #[tokio::test]
    async fn duplicated_tool_reference_is_a_length_mismatch() {
        // Given a server that lists tool `a` twice
        let mut store = MockRemoteStore::new();
        store.expect_server_info().returning(|id| {
            Ok(Envelope::ok(server("s1", &["a", "a"]).with_id(id)))
        });
        let validator = Validator::new(Arc::new(store));

        // When the expected list names `a` once
        let err = validator
            .validate_server_tools(ServerId(4), &[ToolReference::new(key("a"))])
            .await
            .unwrap_err();

        // Then the extra entry is reported even though the keys match
        match err {
            CheckError::Consistency { failures, .. } => {
                assert_eq!(failures, vec!["tool list has 2 entries, expected 1".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn rejected_server_list_is_not_fatal() {
        // Given a store that answers the list call with success=false
        let mut store = MockRemoteStore::new();
        store
            .expect_list_servers()
            .times(1)
            .returning(|_| Ok(Envelope::fail("pageSize too large")));
        let validator = Validator::new(Arc::new(store));

        // When checking every remote server
        let err = validator.check_consistency(None, None).await.unwrap_err();

        // Then the rejection is its own consistency failure, not an outage
        assert_eq!(err.kind(), ErrorKind::Consistency);
        assert!(!err.kind().is_fatal_to_scenario());
        assert!(err.to_string().contains("pageSize too large"), "{err}");
    }

    #[tokio::test]
    async fn missing_server_is_reported() {
        let mut store = MockRemoteStore::new();
        store
            .expect_server_info()
            .returning(|_| Ok(Envelope::fail("McpServer 9 not found")));
        let validator = Validator::new(Arc::new(store));

        let err = validator.validate_server_tools(ServerId(9), &[]).await.unwrap_err();
        assert!(err.to_string().contains("McpServer 9 not found"));
    }

    #[tokio::test]
    async fn clear_cache_forces_new_lookup() {
        let mut store = MockRemoteStore::new();
        store
            .expect_tool_info()
            .times(2)
            .returning(|_| Ok(Envelope::fail("not found")));
        let validator = Validator::new(Arc::new(store));

        validator.check_exists(&key("a")).await.unwrap();
        validator.clear_cache();
        assert_eq!(validator.statistics().cache_size, 0);
        validator.check_exists(&key("a")).await.unwrap();
    }
}
