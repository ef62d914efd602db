use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::database::store::Row;

pub type OrgId = i64;

/// Virtual root of the organization forest. A caller homed here sees every row.
pub const ROOT_ORG_ID: OrgId = 0;

/// Row-level authorization predicate for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessScope {
    Unrestricted,
    /// Matches nothing
    Denied,
    RestrictedTo(BTreeSet<OrgId>),
}

impl AccessScope {
    /// An empty set collapses to [`AccessScope::Denied`].
    pub fn restricted(ids: impl IntoIterator<Item = OrgId>) -> Self {
        let ids: BTreeSet<OrgId> = ids.into_iter().collect();
        if ids.is_empty() {
            AccessScope::Denied
        } else {
            AccessScope::RestrictedTo(ids)
        }
    }

    pub fn permits(&self, org_id: OrgId) -> bool {
        match self {
            AccessScope::Unrestricted => true,
            AccessScope::Denied => false,
            AccessScope::RestrictedTo(ids) => ids.contains(&org_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgNode {
    pub id: OrgId,
    /// Parent organization; `0` for top-level nodes
    pub parent_org_id: OrgId,
    pub name: String,
}

impl OrgNode {
    /// Decodes an `id, org_id, name` row from the org table.
    pub fn from_row(row: &Row) -> Option<Self> {
        Some(Self {
            id: row.get("id").and_then(value_as_org_id)?,
            parent_org_id: row.get("org_id").and_then(value_as_org_id).unwrap_or(ROOT_ORG_ID),
            name: row
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        })
    }
}

/// Accepts integer JSON numbers and numeric strings.
pub fn value_as_org_id(value: &Value) -> Option<OrgId> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
