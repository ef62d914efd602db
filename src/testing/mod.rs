//! In-memory collaborators for unit tests.

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::cache::{CacheError, CacheStore};
use crate::database::store::{RelationalStore, Row, Statement, StoreError, StoreTransaction};
use crate::org::{value_as_org_id, OrgId, OrgNode};

type ExecuteHandler = dyn Fn(&str, &[Value]) -> Result<u64, StoreError> + Send + Sync;
type QueryHandler = dyn Fn(&str, &[Value]) -> Result<Vec<Row>, StoreError> + Send + Sync;

/// Relational store fake. Hierarchy CTEs are answered from an in-memory
/// org table; other statements go to the scripted handlers.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

struct Inner {
    orgs: Vec<OrgNode>,
    on_execute: Option<Box<ExecuteHandler>>,
    on_query: Option<Box<QueryHandler>>,
    failing: bool,
    queries: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    executed: Mutex<Vec<Statement>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                orgs: Vec::new(),
                on_execute: None,
                on_query: None,
                failing: false,
                queries: AtomicUsize::new(0),
                commits: AtomicUsize::new(0),
                rollbacks: AtomicUsize::new(0),
                executed: Mutex::new(Vec::new()),
            }),
        }
    }

    fn edit(mut self, f: impl FnOnce(&mut Inner)) -> Self {
        let inner = Arc::get_mut(&mut self.inner).expect("configure MemoryStore before sharing it");
        f(inner);
        self
    }

    pub fn org(self, id: OrgId, parent_org_id: OrgId, name: &str) -> Self {
        let node = OrgNode {
            id,
            parent_org_id,
            name: name.to_string(),
        };
        self.edit(|inner| inner.orgs.push(node))
    }

    pub fn on_execute<F>(self, handler: F) -> Self
    where
        F: Fn(&str, &[Value]) -> Result<u64, StoreError> + Send + Sync + 'static,
    {
        self.edit(|inner| inner.on_execute = Some(Box::new(handler)))
    }

    pub fn on_query<F>(self, handler: F) -> Self
    where
        F: Fn(&str, &[Value]) -> Result<Vec<Row>, StoreError> + Send + Sync + 'static,
    {
        self.edit(|inner| inner.on_query = Some(Box::new(handler)))
    }

    /// Every call fails with a connection error.
    pub fn failing(self) -> Self {
        self.edit(|inner| inner.failing = true)
    }

    pub fn query_count(&self) -> usize {
        self.inner.queries.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.inner.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.inner.rollbacks.load(Ordering::SeqCst)
    }

    pub fn executed(&self) -> Vec<Statement> {
        self.inner.executed.lock().unwrap().clone()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    fn check(&self) -> Result<(), StoreError> {
        if self.failing {
            Err(StoreError::Sqlx(sqlx::Error::PoolTimedOut))
        } else {
            Ok(())
        }
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, StoreError> {
        self.check()?;
        self.executed
            .lock()
            .unwrap()
            .push(Statement::new(sql, params.to_vec()));
        match &self.on_execute {
            Some(handler) => handler(sql, params),
            None => Ok(0),
        }
    }

    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, StoreError> {
        self.check()?;
        self.queries.fetch_add(1, Ordering::SeqCst);
        if sql.contains("org_tree") {
            return Ok(self.descendants(params));
        }
        if sql.contains("org_path") {
            return Ok(self.ancestors(params));
        }
        match &self.on_query {
            Some(handler) => handler(sql, params),
            None => Ok(Vec::new()),
        }
    }

    fn node(&self, id: OrgId) -> Option<&OrgNode> {
        self.orgs.iter().find(|n| n.id == id)
    }

    fn descendants(&self, params: &[Value]) -> Vec<Row> {
        let Some(start) = params.first().and_then(value_as_org_id) else {
            return Vec::new();
        };
        if self.node(start).is_none() {
            return Vec::new();
        }
        let mut seen = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);
        while let Some(id) = queue.pop_front() {
            for child in self.orgs.iter().filter(|n| n.parent_org_id == id) {
                if seen.insert(child.id) {
                    queue.push_back(child.id);
                }
            }
        }
        seen.into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(|id| row(json!({ "id": id })))
            .collect()
    }

    fn ancestors(&self, params: &[Value]) -> Vec<Row> {
        let start = params.first().and_then(value_as_org_id);
        let max_depth = params.get(1).and_then(Value::as_i64).unwrap_or(10);
        let mut rows = Vec::new();
        let mut current = start;
        let mut depth = 1;
        while let Some(node) = current.and_then(|id| self.node(id)) {
            rows.push(row(json!({
                "id": node.id,
                "name": node.name,
                "org_id": node.parent_org_id,
                "depth": depth,
            })));
            if node.parent_org_id == 0 || depth >= max_depth {
                break;
            }
            current = Some(node.parent_org_id);
            depth += 1;
        }
        rows.reverse();
        rows
    }
}

fn row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        _ => Row::new(),
    }
}

#[async_trait]
impl RelationalStore for MemoryStore {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, StoreError> {
        self.inner.execute(sql, params)
    }

    async fn query_all(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, StoreError> {
        self.inner.query(sql, params)
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        self.inner.check()?;
        Ok(Box::new(MemoryTransaction {
            inner: self.inner.clone(),
        }))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.check()
    }
}

struct MemoryTransaction {
    inner: Arc<Inner>,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, StoreError> {
        self.inner.execute(sql, params)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.inner.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.inner.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Cache whose every call fails.
pub struct FailingCache;

fn down() -> CacheError {
    CacheError::Unavailable("connection refused".to_string())
}

#[async_trait]
impl CacheStore for FailingCache {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Err(down())
    }

    async fn set_ex(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), CacheError> {
        Err(down())
    }

    async fn delete(&self, _key: &str) -> Result<bool, CacheError> {
        Err(down())
    }

    async fn set_add(&self, _key: &str, _members: &[String], _ttl: Duration) -> Result<(), CacheError> {
        Err(down())
    }

    async fn set_members(&self, _key: &str) -> Result<Vec<String>, CacheError> {
        Err(down())
    }

    async fn delete_matching(&self, _pattern: &str) -> Result<usize, CacheError> {
        Err(down())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Err(down())
    }
}
