//! List/delete-capable resources exposed through the generic endpoints.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::config::{FilterConfig, DOC_DB, SYSTEM_DB};
use crate::database::executor::dedupe_ids;
use crate::database::DeleteOptions;
use crate::filter::{CompileOptions, CompiledQuery, FieldRoles, Filter, FilterError};

const NOT_DELETED: &str = "(is_delete IS NULL OR is_delete != 1)";

pub struct Resource {
    pub name: &'static str,
    /// Logical database name
    pub database: &'static str,
    pub table: &'static str,
    pub filter: Filter,
    pub delete: DeleteOptions,
    /// Column holding the creator's username; deletes require ownership of every row
    pub owner_field: Option<&'static str>,
}

impl Resource {
    /// Counts the rows among `ids` created by `owner`.
    pub fn ownership_query(&self, owner: &str, ids: &[Value]) -> Option<CompiledQuery> {
        let owner_field = self.owner_field?;
        let ids = dedupe_ids(ids);
        let placeholders = vec!["?"; ids.len()].join(", ");
        let mut params = Vec::with_capacity(ids.len() + 1);
        params.push(Value::from(owner));
        params.extend(ids);
        Some(CompiledQuery {
            sql: format!(
                "SELECT COUNT(*) FROM {} WHERE {} AND {} = ? AND {} IN ({})",
                self.table, NOT_DELETED, owner_field, self.delete.id_field, placeholders
            ),
            params,
        })
    }
}

pub struct ResourceRegistry {
    resources: BTreeMap<&'static str, Resource>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self {
            resources: BTreeMap::new(),
        }
    }

    pub fn register(mut self, resource: Resource) -> Self {
        self.resources.insert(resource.name, resource);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Resource> {
        self.resources.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.resources.keys().copied()
    }

    /// Files, icons and users.
    pub fn standard(config: &FilterConfig) -> Result<Self, FilterError> {
        let options = CompileOptions {
            max_page_size: config.max_page_size,
            debug_logging: config.debug_logging,
        };

        let files = Resource {
            name: "files",
            database: DOC_DB,
            table: "file_resource",
            filter: Filter::new(format!(
                "SELECT id, name, size, suffix, file_type, url, is_public, create_time, update_time, \
                 creator, updater, org_id, org_name FROM file_resource WHERE {}",
                NOT_DELETED
            ))?
            .roles(FieldRoles::default().keyword_fields(&["name"]).precise_fields(&["id"]))
            .options(options.clone()),
            delete: DeleteOptions::default(),
            owner_field: Some("creator"),
        };

        // icon_info has no delete flag or timestamps
        let icons = Resource {
            name: "icons",
            database: DOC_DB,
            table: "icon_info",
            filter: Filter::new("SELECT id, name, url, size, suffix, app_code, creator, org_id FROM icon_info")?
                .roles(
                    FieldRoles::default()
                        .keyword_fields(&["name"])
                        .precise_fields(&["id", "app_code"])
                        .default_order_field(Some("id")),
                )
                .options(options.clone()),
            delete: DeleteOptions::physical(),
            owner_field: None,
        };

        let users = Resource {
            name: "users",
            database: SYSTEM_DB,
            table: "users",
            filter: Filter::new(format!(
                "SELECT id, phone, username, name, position, join_time, sex, email, org_id, org_name, \
                 last_login_time, create_time, update_time, creator, updater, status FROM users WHERE {}",
                NOT_DELETED
            ))?
            .roles(
                FieldRoles::default()
                    .keyword_fields(&["username", "name", "phone"])
                    .precise_fields(&["id", "status", "sex", "org_id"]),
            )
            .options(options),
            delete: DeleteOptions::default(),
            owner_field: None,
        };

        Ok(Self::new().register(files).register(icons).register(users))
    }
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::QuerySpec;
    use crate::org::AccessScope;
    use serde_json::json;

    fn registry() -> ResourceRegistry {
        ResourceRegistry::standard(&FilterConfig {
            max_page_size: Some(100),
            debug_logging: false,
        })
        .unwrap()
    }

    #[test]
    fn standard_resources() {
        let registry = registry();
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["files", "icons", "users"]);
        assert_eq!(registry.get("users").unwrap().database, SYSTEM_DB);
        assert!(registry.get("icons").unwrap().delete.physical);
        assert!(registry.get("orders").is_none());
    }

    #[test]
    fn icons_order_by_id_without_where() {
        let icons = registry();
        let icons = icons.get("icons").unwrap();
        let compiled = icons
            .filter
            .compile(&QuerySpec::default().equals("appCode", "crm"), &AccessScope::restricted([3]))
            .unwrap();
        assert_eq!(
            compiled.query.sql,
            "SELECT id, name, url, size, suffix, app_code, creator, org_id FROM icon_info \
             WHERE app_code = ? AND org_id IN (?) ORDER BY id DESC LIMIT 10 OFFSET 0"
        );
        assert_eq!(compiled.query.params, vec![json!("crm"), json!(3)]);
    }

    #[test]
    fn files_ownership_query() {
        let registry = registry();
        let files = registry.get("files").unwrap();
        let q = files.ownership_query("ada", &[json!(1), json!(2), json!(1)]).unwrap();
        assert_eq!(
            q.sql,
            "SELECT COUNT(*) FROM file_resource WHERE (is_delete IS NULL OR is_delete != 1) \
             AND creator = ? AND id IN (?, ?)"
        );
        assert_eq!(q.params, vec![json!("ada"), json!(1), json!(2)]);
        assert!(registry.get("users").unwrap().ownership_query("ada", &[json!(1)]).is_none());
    }
}
