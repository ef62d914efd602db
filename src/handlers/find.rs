use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Extension, Json,
};
use serde_json::Value;

use crate::auth::UserProfile;
use crate::database::Row;
use crate::error::ApiError;
use crate::filter::QuerySpec;
use crate::middleware::{ApiResponse, ApiResult};
use crate::resources::Resource;
use crate::state::AppState;

fn resource<'a>(state: &'a AppState, name: &str) -> Result<&'a Resource, ApiError> {
    state
        .resources
        .get(name)
        .ok_or_else(|| ApiError::not_found(format!("Unknown resource: {}", name)))
}

/// POST /api/:resource/find - filtered, sorted, paginated list within the caller's organizations
///
/// Body: `{ body: { field: value, keywords }, page, limit, sorter: { field: 1 | -1 } }`
pub async fn find(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Extension(user): Extension<UserProfile>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Vec<Row>> {
    let resource = resource(&state, &name)?;
    let Json(request) = payload?;

    let spec = QuerySpec::from_request(&request)?;
    resource.filter.validate(&spec)?;
    let scope = state.resolver.access_scope(user.org_id).await?;
    let compiled = resource.filter.compile(&spec, &scope)?;

    let (total, rows) = state.executor(resource.database)?.find(&compiled).await?;
    Ok(ApiResponse::page(rows, total))
}

/// DELETE /api/:resource/delete - body is the id array
pub async fn delete(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Extension(user): Extension<UserProfile>,
    payload: Result<Json<Vec<Value>>, JsonRejection>,
) -> ApiResult<u64> {
    let resource = resource(&state, &name)?;
    let Json(ids) = payload?;
    let executor = state.executor(resource.database)?;

    tracing::info!("User {} deleting {} {} rows", user.username, ids.len(), resource.name);

    if let Some(check) = resource.ownership_query(&user.username, &ids) {
        let expected = crate::database::executor::dedupe_ids(&ids).len() as u64;
        if expected > 0 && executor.fetch_total(&check).await? != expected {
            return Err(ApiError::forbidden("You may only delete rows you created"));
        }
    }

    let affected = executor
        .delete(resource.table, &ids, Some(user.org_id), &resource.delete)
        .await?;
    Ok(ApiResponse::success(affected).with_msg("deleted"))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::database::Row;
    use crate::handlers::test_support::{json_request, Harness};
    use crate::testing::MemoryStore;

    fn system() -> MemoryStore {
        MemoryStore::new().org(10, 0, "Ten").org(20, 10, "Twenty").org(30, 0, "Thirty")
    }

    fn file_rows() -> MemoryStore {
        MemoryStore::new().on_query(|sql, _| {
            let mut row = Row::new();
            if sql.starts_with("SELECT COUNT(*)") {
                row.insert("COUNT(*)".to_string(), json!(2));
            } else {
                row.insert("id".to_string(), json!(1));
                row.insert("file_type".to_string(), json!("pdf"));
            }
            Ok(vec![row])
        })
    }

    #[tokio::test]
    async fn find_scopes_to_caller_subtree() {
        let h = Harness::new(file_rows(), system());
        let token = h.login(1, 10).await;

        let request = json!({
            "body": { "keywords": "report", "fileType": "pdf" },
            "page": 2,
            "limit": 5,
            "sorter": { "createTime": "asc" }
        });
        let (status, body) = h
            .call(json_request("POST", "/api/files/find", Some(&token), &request))
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 2);
        assert_eq!(body["data"][0]["fileType"], "pdf");
        assert_eq!(h.doc.query_count(), 2);
        assert_eq!(h.system.query_count(), 1);
    }

    #[tokio::test]
    async fn unknown_resource_is_not_found() {
        let h = Harness::new(MemoryStore::new(), system());
        let token = h.login(1, 10).await;
        let (status, body) = h
            .call(json_request("POST", "/api/orders/find", Some(&token), &json!({})))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], 404);
    }

    #[tokio::test]
    async fn invalid_filter_never_reaches_store() {
        let h = Harness::new(file_rows(), system());
        let token = h.login(1, 10).await;
        let request = json!({ "body": {}, "page": 0, "limit": 10 });
        let (status, body) = h
            .call(json_request("POST", "/api/files/find", Some(&token), &request))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(h.doc.query_count(), 0);
        assert_eq!(h.system.query_count(), 0);
    }

    #[tokio::test]
    async fn illegal_sort_field_is_rejected_before_hierarchy_lookup() {
        let h = Harness::new(file_rows(), system());
        let token = h.login(1, 10).await;
        let request = json!({ "sorter": { "name; DROP": 1 } });
        let (status, _) = h
            .call(json_request("POST", "/api/files/find", Some(&token), &request))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(h.system.query_count(), 0);
        assert_eq!(h.doc.query_count(), 0);
    }

    #[tokio::test]
    async fn bad_request_stays_400_when_hierarchy_store_is_down() {
        let h = Harness::new(file_rows(), system().failing());
        let token = h.login(1, 10).await;
        let request = json!({ "body": {}, "page": 0, "limit": 10 });
        let (status, _) = h
            .call(json_request("POST", "/api/files/find", Some(&token), &request))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn partial_delete_is_forbidden_with_count() {
        let doc = MemoryStore::new().on_execute(|_, _| Ok(1));
        let h = Harness::new(doc, system());
        let token = h.login(1, 10).await;

        let (status, body) = h
            .call(json_request("DELETE", "/api/icons/delete", Some(&token), &json!([5, 6])))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["missingCount"], 1);
        assert_eq!(h.doc.commits(), 1);
    }

    #[tokio::test]
    async fn caller_without_organizations_is_unauthorized() {
        let h = Harness::new(MemoryStore::new(), system());
        let token = h.login(1, 99).await;

        let (status, _) = h
            .call(json_request("DELETE", "/api/icons/delete", Some(&token), &json!([5])))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(h.doc.executed().is_empty());
    }

    #[tokio::test]
    async fn file_delete_requires_ownership() {
        let doc = MemoryStore::new()
            .on_query(|_, _| {
                let mut row = Row::new();
                row.insert("COUNT(*)".to_string(), json!(1));
                Ok(vec![row])
            })
            .on_execute(|_, _| Ok(2));
        let h = Harness::new(doc, system());
        let token = h.login(1, 10).await;

        let (status, _) = h
            .call(json_request("DELETE", "/api/files/delete", Some(&token), &json!([1, 2])))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(h.doc.executed().is_empty());
    }

    #[tokio::test]
    async fn owned_files_are_flagged_deleted() {
        let doc = MemoryStore::new()
            .on_query(|_, _| {
                let mut row = Row::new();
                row.insert("COUNT(*)".to_string(), json!(2));
                Ok(vec![row])
            })
            .on_execute(|_, _| Ok(2));
        let h = Harness::new(doc, system());
        let token = h.login(1, 10).await;

        let (status, body) = h
            .call(json_request("DELETE", "/api/files/delete", Some(&token), &json!([1, 2])))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], 2);
        assert!(h.doc.executed()[0].sql.starts_with("UPDATE file_resource SET is_delete = ?"));
    }
}
