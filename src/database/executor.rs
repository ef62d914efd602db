//! Runs compiled queries and organization-scoped bulk mutations.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, warn};

use super::store::{RelationalStore, Row, Statement, StoreError, StoreTransaction};
use crate::filter::naming::{is_identifier, is_qualified_identifier, to_external_name, to_storage_name};
use crate::filter::{CompiledFind, CompiledQuery};
use crate::org::{AccessScope, OrgId, OrgResolver, ResolverError};

#[derive(Debug, Error)]
pub enum MutationError {
    #[error("No accessible organizations")]
    Unauthorized,

    #[error("No permission for {missing_count} rows")]
    PartialAuthorization {
        missing_count: u64,
        expected: u64,
        affected: u64,
    },

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Nothing to update")]
    EmptyAssignments,

    #[error(transparent)]
    Resolver(#[from] ResolverError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Column names and flag value used by a mutation.
#[derive(Debug, Clone)]
pub struct DeleteOptions {
    /// Remove rows instead of flipping the delete flag
    pub physical: bool,
    pub id_field: String,
    pub org_field: String,
    pub delete_field: String,
    pub delete_value: Value,
}

impl Default for DeleteOptions {
    fn default() -> Self {
        Self {
            physical: false,
            id_field: "id".to_string(),
            org_field: "org_id".to_string(),
            delete_field: "is_delete".to_string(),
            delete_value: Value::from(1),
        }
    }
}

impl DeleteOptions {
    pub fn physical() -> Self {
        Self {
            physical: true,
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<(), MutationError> {
        for field in [&self.id_field, &self.org_field, &self.delete_field] {
            if !is_identifier(field) {
                return Err(MutationError::InvalidIdentifier(field.clone()));
            }
        }
        Ok(())
    }
}

pub struct Executor {
    store: Arc<dyn RelationalStore>,
    resolver: Arc<OrgResolver>,
}

impl Executor {
    pub fn new(store: Arc<dyn RelationalStore>, resolver: Arc<OrgResolver>) -> Self {
        Self { store, resolver }
    }

    /// Rows with keys in external naming.
    pub async fn fetch_all(&self, query: &CompiledQuery) -> Result<Vec<Row>, StoreError> {
        let rows = self.store.query_all(&query.sql, &query.params).await?;
        Ok(rows.into_iter().map(externalize).collect())
    }

    /// First column of the first row, as a count.
    pub async fn fetch_total(&self, query: &CompiledQuery) -> Result<u64, StoreError> {
        let row = self.store.query_one(&query.sql, &query.params).await?;
        Ok(row
            .and_then(|r| r.into_iter().next())
            .and_then(|(_, v)| value_as_count(&v))
            .unwrap_or(0))
    }

    /// Runs the page query and its count concurrently; returns `(total, rows)`.
    pub async fn find(&self, compiled: &CompiledFind) -> Result<(u64, Vec<Row>), StoreError> {
        let (total, rows) = futures::try_join!(
            self.fetch_total(&compiled.count),
            self.fetch_all(&compiled.query)
        )?;
        Ok((total, rows))
    }

    /// Flags (or removes, when `options.physical`) the rows with `ids` that
    /// the caller's organization subtree owns.
    ///
    /// Rows that were affected stay committed when fewer than `ids.len()`
    /// rows matched; the shortfall is reported as
    /// [`MutationError::PartialAuthorization`].
    pub async fn delete(
        &self,
        table: &str,
        ids: &[Value],
        caller_org_id: Option<OrgId>,
        options: &DeleteOptions,
    ) -> Result<u64, MutationError> {
        validate_table(table)?;
        options.validate()?;

        let ids = dedupe_ids(ids);
        if ids.is_empty() {
            return Ok(0);
        }
        let scope = self.scope_for(caller_org_id).await?;

        let mut params = Vec::new();
        let sql = if options.physical {
            format!("DELETE FROM {}", table)
        } else {
            params.push(options.delete_value.clone());
            format!("UPDATE {} SET {} = ?", table, options.delete_field)
        };
        let sql = restrict(sql, &ids, &scope, options, &mut params);

        self.run_checked(Statement::new(sql, params), ids.len() as u64).await
    }

    /// Applies `assignments` (external field names) to the authorized rows
    /// among `ids`, with the same count check as [`Executor::delete`].
    pub async fn update(
        &self,
        table: &str,
        assignments: &Row,
        ids: &[Value],
        caller_org_id: Option<OrgId>,
        options: &DeleteOptions,
    ) -> Result<u64, MutationError> {
        validate_table(table)?;
        options.validate()?;
        if assignments.is_empty() {
            return Err(MutationError::EmptyAssignments);
        }

        let mut sets = Vec::with_capacity(assignments.len());
        let mut params = Vec::with_capacity(assignments.len() + ids.len());
        for (field, value) in assignments {
            let column = to_storage_name(field);
            if !is_identifier(&column) {
                return Err(MutationError::InvalidIdentifier(field.clone()));
            }
            sets.push(format!("{} = ?", column));
            params.push(value.clone());
        }

        let ids = dedupe_ids(ids);
        if ids.is_empty() {
            return Ok(0);
        }
        let scope = self.scope_for(caller_org_id).await?;

        let sql = format!("UPDATE {} SET {}", table, sets.join(", "));
        let sql = restrict(sql, &ids, &scope, options, &mut params);

        self.run_checked(Statement::new(sql, params), ids.len() as u64).await
    }

    /// All statements under one begin/commit; any failure rolls back every one.
    pub async fn transaction(&self, statements: &[Statement]) -> Result<Vec<u64>, StoreError> {
        let mut tx = self.store.begin().await?;
        let mut affected = Vec::with_capacity(statements.len());
        for statement in statements {
            match tx.execute(&statement.sql, &statement.params).await {
                Ok(n) => affected.push(n),
                Err(e) => {
                    error!("Transaction statement failed, rolling back: {}", e);
                    rollback(tx).await;
                    return Err(e);
                }
            }
        }
        tx.commit().await?;
        Ok(affected)
    }

    async fn scope_for(&self, caller_org_id: Option<OrgId>) -> Result<AccessScope, MutationError> {
        let Some(org_id) = caller_org_id else {
            return Ok(AccessScope::Unrestricted);
        };
        match self.resolver.access_scope(org_id).await? {
            AccessScope::Denied => Err(MutationError::Unauthorized),
            scope => Ok(scope),
        }
    }

    async fn run_checked(&self, statement: Statement, expected: u64) -> Result<u64, MutationError> {
        debug!("mutation: {} params={:?}", statement.sql, statement.params);
        let affected = self
            .transaction(std::slice::from_ref(&statement))
            .await?
            .first()
            .copied()
            .unwrap_or(0);

        if affected < expected {
            let missing_count = expected - affected;
            warn!(
                "Mutation affected {} of {} rows ({} unauthorized or missing)",
                affected, expected, missing_count
            );
            return Err(MutationError::PartialAuthorization {
                missing_count,
                expected,
                affected,
            });
        }
        Ok(affected)
    }
}

async fn rollback(tx: Box<dyn StoreTransaction>) {
    if let Err(e) = tx.rollback().await {
        error!("Rollback failed: {}", e);
    }
}

fn restrict(
    mut sql: String,
    ids: &[Value],
    scope: &AccessScope,
    options: &DeleteOptions,
    params: &mut Vec<Value>,
) -> String {
    sql.push_str(&format!(" WHERE {} IN ({})", options.id_field, placeholders(ids.len())));
    params.extend(ids.iter().cloned());

    if let AccessScope::RestrictedTo(orgs) = scope {
        sql.push_str(&format!(" AND {} IN ({})", options.org_field, placeholders(orgs.len())));
        params.extend(orgs.iter().map(|id| Value::from(*id)));
    }
    sql
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn validate_table(table: &str) -> Result<(), MutationError> {
    if is_qualified_identifier(table) {
        Ok(())
    } else {
        Err(MutationError::InvalidIdentifier(table.to_string()))
    }
}

/// First occurrence wins.
pub fn dedupe_ids(ids: &[Value]) -> Vec<Value> {
    let mut seen = HashSet::new();
    ids.iter()
        .filter(|id| !id.is_null())
        .filter(|id| seen.insert(id_key(id)))
        .cloned()
        .collect()
}

// 1 and "1" name the same row
fn id_key(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn externalize(row: Row) -> Row {
    row.into_iter()
        .map(|(k, v)| (to_external_name(&k), v))
        .collect()
}

fn value_as_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::MemoryCache;
    use crate::filter::{FieldRoles, Filter, QuerySpec};
    use crate::org::HierarchyConfig;
    use crate::testing::MemoryStore;
    use serde_json::json;

    fn executor(store: Arc<MemoryStore>) -> Executor {
        let resolver =
            OrgResolver::new(store.clone(), Arc::new(MemoryCache::new()), HierarchyConfig::default()).unwrap();
        Executor::new(store, Arc::new(resolver))
    }

    fn orgs() -> MemoryStore {
        MemoryStore::new()
            .org(10, 0, "Ten")
            .org(20, 10, "Twenty")
            .org(30, 0, "Thirty")
    }

    #[tokio::test]
    async fn partial_authorization_keeps_committed_rows() {
        // Rows 1 and 2 belong to {10, 20}; row 3 belongs elsewhere
        let store = Arc::new(orgs().on_execute(|_, _| Ok(2)));
        let exec = executor(store.clone());

        let err = exec
            .delete("file_resource", &[json!(1), json!(2), json!(3)], Some(10), &DeleteOptions::default())
            .await
            .unwrap_err();

        match err {
            MutationError::PartialAuthorization {
                missing_count,
                expected,
                affected,
            } => {
                assert_eq!(missing_count, 1);
                assert_eq!(expected, 3);
                assert_eq!(affected, 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(store.commits(), 1);
        assert_eq!(store.rollbacks(), 0);

        let executed = store.executed();
        assert_eq!(executed.len(), 1);
        assert_eq!(
            executed[0].sql,
            "UPDATE file_resource SET is_delete = ? WHERE id IN (?, ?, ?) AND org_id IN (?, ?)"
        );
        assert_eq!(
            executed[0].params,
            vec![json!(1), json!(1), json!(2), json!(3), json!(10), json!(20)]
        );
    }

    #[tokio::test]
    async fn full_match_returns_count() {
        let store = Arc::new(orgs().on_execute(|_, _| Ok(2)));
        let exec = executor(store);

        let n = exec
            .delete("file_resource", &[json!(1), json!(2)], Some(10), &DeleteOptions::default())
            .await
            .unwrap();
        assert_eq!(n, 2);
    }

    #[tokio::test]
    async fn physical_delete_skips_flag_parameter() {
        let store = Arc::new(orgs().on_execute(|_, _| Ok(1)));
        let exec = executor(store.clone());

        exec.delete("icon_info", &[json!("7")], Some(20), &DeleteOptions::physical())
            .await
            .unwrap();

        let executed = store.executed();
        assert_eq!(executed[0].sql, "DELETE FROM icon_info WHERE id IN (?) AND org_id IN (?)");
        assert_eq!(executed[0].params, vec![json!("7"), json!(20)]);
    }

    #[tokio::test]
    async fn unknown_caller_org_is_unauthorized_without_mutation() {
        let store = Arc::new(orgs());
        let exec = executor(store.clone());

        let err = exec
            .delete("file_resource", &[json!(1)], Some(99), &DeleteOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, MutationError::Unauthorized));
        assert!(store.executed().is_empty());
        assert_eq!(store.commits(), 0);
    }

    #[tokio::test]
    async fn root_caller_is_not_org_restricted() {
        let store = Arc::new(orgs().on_execute(|_, _| Ok(1)));
        let exec = executor(store.clone());

        exec.delete("users", &[json!(5)], Some(0), &DeleteOptions::default())
            .await
            .unwrap();
        assert_eq!(store.executed()[0].sql, "UPDATE users SET is_delete = ? WHERE id IN (?)");
        assert_eq!(store.query_count(), 0);
    }

    #[tokio::test]
    async fn duplicate_ids_collapse_before_count_check() {
        let store = Arc::new(orgs().on_execute(|_, _| Ok(1)));
        let exec = executor(store.clone());

        let n = exec
            .delete("file_resource", &[json!(4), json!("4"), json!(4)], Some(10), &DeleteOptions::default())
            .await
            .unwrap();
        assert_eq!(n, 1);
        assert_eq!(
            store.executed()[0].sql,
            "UPDATE file_resource SET is_delete = ? WHERE id IN (?) AND org_id IN (?, ?)"
        );
    }

    #[tokio::test]
    async fn empty_ids_skip_the_store() {
        let store = Arc::new(orgs());
        let exec = executor(store.clone());

        let n = exec
            .delete("file_resource", &[], Some(10), &DeleteOptions::default())
            .await
            .unwrap();
        assert_eq!(n, 0);
        assert_eq!(store.query_count(), 0);
        assert!(store.executed().is_empty());
    }

    #[tokio::test]
    async fn store_failure_rolls_back() {
        let store = Arc::new(orgs().on_execute(|_, _| Err(StoreError::QueryError("deadlock".into()))));
        let exec = executor(store.clone());

        let err = exec
            .delete("file_resource", &[json!(1)], Some(10), &DeleteOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, MutationError::Store(_)));
        assert_eq!(store.rollbacks(), 1);
        assert_eq!(store.commits(), 0);
    }

    #[tokio::test]
    async fn update_normalizes_assignment_names() {
        let store = Arc::new(orgs().on_execute(|_, _| Ok(1)));
        let exec = executor(store.clone());

        let mut assignments = Row::new();
        assignments.insert("fileName".to_string(), json!("a.txt"));
        exec.update("file_resource", &assignments, &[json!(9)], Some(20), &DeleteOptions::default())
            .await
            .unwrap();

        let executed = store.executed();
        assert_eq!(
            executed[0].sql,
            "UPDATE file_resource SET file_name = ? WHERE id IN (?) AND org_id IN (?)"
        );
        assert_eq!(executed[0].params, vec![json!("a.txt"), json!(9), json!(20)]);
    }

    #[tokio::test]
    async fn update_rejects_unsafe_names() {
        let exec = executor(Arc::new(orgs()));
        let mut assignments = Row::new();
        assignments.insert("name = 1; --".to_string(), json!("x"));

        let err = exec
            .update("file_resource", &assignments, &[json!(1)], None, &DeleteOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, MutationError::InvalidIdentifier(_)));

        let err = exec
            .delete("file_resource x", &[json!(1)], None, &DeleteOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, MutationError::InvalidIdentifier(_)));
    }

    #[tokio::test]
    async fn transaction_rolls_back_everything_on_failure() {
        let store = Arc::new(orgs().on_execute(|sql, _| {
            if sql.starts_with("DELETE") {
                Err(StoreError::QueryError("constraint".into()))
            } else {
                Ok(1)
            }
        }));
        let exec = executor(store.clone());

        let statements = vec![
            Statement::new("UPDATE a SET x = ? WHERE id = ?", vec![json!(1), json!(2)]),
            Statement::new("DELETE FROM b WHERE id = ?", vec![json!(3)]),
        ];
        assert!(exec.transaction(&statements).await.is_err());
        assert_eq!(store.rollbacks(), 1);
        assert_eq!(store.commits(), 0);

        let ok = vec![Statement::new("UPDATE a SET x = ?", vec![json!(1)])];
        assert_eq!(exec.transaction(&ok).await.unwrap(), vec![1]);
        assert_eq!(store.commits(), 1);
    }

    #[tokio::test]
    async fn find_returns_total_and_external_rows() {
        let store = Arc::new(orgs().on_query(|sql, _| {
            if sql.starts_with("SELECT COUNT(*)") {
                let mut row = Row::new();
                row.insert("COUNT(*)".to_string(), json!(42));
                Ok(vec![row])
            } else {
                let mut row = Row::new();
                row.insert("file_name".to_string(), json!("a.txt"));
                row.insert("create_time".to_string(), json!("2024-01-01 00:00:00"));
                Ok(vec![row])
            }
        }));
        let exec = executor(store);

        let compiled = Filter::new("SELECT * FROM file_resource")
            .unwrap()
            .roles(FieldRoles::default())
            .compile(&QuerySpec::default(), &AccessScope::Unrestricted)
            .unwrap();
        let (total, rows) = exec.find(&compiled).await.unwrap();

        assert_eq!(total, 42);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["fileName"], json!("a.txt"));
        assert!(rows[0].contains_key("createTime"));
    }
}
