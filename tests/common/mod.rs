#![allow(dead_code)]

use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use orgscope_api::cache::MemoryCache;
use orgscope_api::database::{Executor, RelationalStore, Row, Statement, StoreError, StoreTransaction};
use orgscope_api::org::{value_as_org_id, HierarchyConfig, OrgId, OrgResolver};

/// `(id, parent)` pairs; `0` marks a top-level organization.
pub type Edge = (OrgId, OrgId);

/// Store double that answers the hierarchy queries from a fixed edge list
/// and reports a fixed affected-row count for every statement.
pub struct TreeStore {
    edges: Vec<Edge>,
    affected: AtomicU64,
    queries: AtomicUsize,
    executed: Arc<Mutex<Vec<Statement>>>,
}

impl TreeStore {
    pub fn new(edges: &[Edge]) -> Self {
        Self {
            edges: edges.to_vec(),
            affected: AtomicU64::new(0),
            queries: AtomicUsize::new(0),
            executed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn set_affected(&self, n: u64) {
        self.affected.store(n, Ordering::SeqCst);
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn executed(&self) -> Vec<Statement> {
        self.executed.lock().map(|v| v.clone()).unwrap_or_default()
    }

    fn subtree(&self, start: OrgId) -> Vec<Row> {
        if !self.edges.iter().any(|(id, _)| *id == start) {
            return Vec::new();
        }
        let mut seen = BTreeSet::from([start]);
        let mut queue = VecDeque::from([start]);
        while let Some(parent) = queue.pop_front() {
            for (child, _) in self.edges.iter().filter(|(_, p)| *p == parent) {
                if seen.insert(*child) {
                    queue.push_back(*child);
                }
            }
        }
        seen.into_iter().map(|id| row(json!({ "id": id }))).collect()
    }

    fn chain(&self, start: OrgId, max_depth: i64) -> Vec<Row> {
        let mut rows = Vec::new();
        let mut current = start;
        while let Some((id, parent)) = self.edges.iter().find(|(id, _)| *id == current) {
            rows.push(row(json!({ "id": id, "name": format!("org-{}", id) })));
            if *parent == 0 || rows.len() as i64 >= max_depth {
                break;
            }
            current = *parent;
        }
        rows.reverse();
        rows
    }
}

#[async_trait]
impl RelationalStore for TreeStore {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, StoreError> {
        self.record(sql, params);
        Ok(self.affected.load(Ordering::SeqCst))
    }

    async fn query_all(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, StoreError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let start = params.first().and_then(value_as_org_id).unwrap_or(-1);
        if sql.contains("org_tree") {
            return Ok(self.subtree(start));
        }
        if sql.contains("org_path") {
            let max_depth = params.get(1).and_then(Value::as_i64).unwrap_or(10);
            return Ok(self.chain(start, max_depth));
        }
        Ok(Vec::new())
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        Ok(Box::new(TreeTransaction {
            affected: self.affected.load(Ordering::SeqCst),
            executed: self.executed.clone(),
            pending: Vec::new(),
        }))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

impl TreeStore {
    fn record(&self, sql: &str, params: &[Value]) {
        if let Ok(mut executed) = self.executed.lock() {
            executed.push(Statement::new(sql, params.to_vec()));
        }
    }
}

/// Statements become visible in `executed` only on commit.
struct TreeTransaction {
    affected: u64,
    executed: Arc<Mutex<Vec<Statement>>>,
    pending: Vec<Statement>,
}

#[async_trait]
impl StoreTransaction for TreeTransaction {
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, StoreError> {
        self.pending.push(Statement::new(sql, params.to_vec()));
        Ok(self.affected)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let this = *self;
        if let Ok(mut executed) = this.executed.lock() {
            executed.extend(this.pending);
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

fn row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        _ => Row::new(),
    }
}

/// Resolver and executor sharing one [`TreeStore`] and a fresh in-memory cache.
pub fn setup(edges: &[Edge]) -> (Arc<TreeStore>, Arc<OrgResolver>, Executor) {
    let store = Arc::new(TreeStore::new(edges));
    let resolver = Arc::new(
        OrgResolver::new(store.clone(), Arc::new(MemoryCache::new()), HierarchyConfig::default())
            .expect("valid org table"),
    );
    let executor = Executor::new(store.clone(), resolver.clone());
    (store, resolver, executor)
}
