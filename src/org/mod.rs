pub mod resolver;
pub mod scope;

pub use resolver::{AncestorPath, HierarchyConfig, OrgResolver, ResolverError};
pub use scope::{value_as_org_id, AccessScope, OrgId, OrgNode, ROOT_ORG_ID};
