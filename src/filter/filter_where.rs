use serde_json::Value;

use super::error::FilterError;
use super::naming::{is_identifier, to_storage_name};
use super::types::{is_empty_value, FieldRoles, FilterValue, QuerySpec};
use crate::org::AccessScope;

/// Predicate that never matches; stands in for `IN ()`.
pub const ALWAYS_FALSE: &str = "1 = 0";

/// Accumulates WHERE conditions and their positional parameters.
///
/// Condition order: keyword clause, field filters in input order, access
/// clause last.
pub struct FilterWhere<'a> {
    roles: &'a FieldRoles,
    conditions: Vec<String>,
    param_values: Vec<Value>,
}

impl<'a> FilterWhere<'a> {
    pub fn new(roles: &'a FieldRoles) -> Self {
        Self {
            roles,
            conditions: vec![],
            param_values: vec![],
        }
    }

    /// Returns the conditions joined with AND (empty when there are none)
    /// and the parameters in placeholder order.
    pub fn generate(
        spec: &QuerySpec,
        roles: &'a FieldRoles,
        scope: &AccessScope,
    ) -> Result<(String, Vec<Value>), FilterError> {
        let mut filter_where = Self::new(roles);
        filter_where.keywords(spec.keywords.as_deref())?;
        for filter in &spec.filters {
            filter_where.field(&filter.field, &filter.value)?;
        }
        filter_where.access(scope)?;
        Ok(filter_where.finish())
    }

    fn finish(self) -> (String, Vec<Value>) {
        (self.conditions.join(" AND "), self.param_values)
    }

    fn keywords(&mut self, keywords: Option<&str>) -> Result<(), FilterError> {
        let keywords = match keywords {
            Some(k) if !k.is_empty() => k,
            _ => return Ok(()),
        };
        let roles = self.roles;
        if roles.keyword_fields.is_empty() {
            return Ok(());
        }

        let pattern = Value::String(format!("%{}%", keywords));
        let mut parts = Vec::with_capacity(roles.keyword_fields.len());
        for field in &roles.keyword_fields {
            let column = self.column(field)?;
            parts.push(format!("{} LIKE {}", column, self.param(pattern.clone())));
        }
        self.conditions.push(format!("({})", parts.join(" OR ")));
        Ok(())
    }

    fn field(&mut self, field: &str, value: &FilterValue) -> Result<(), FilterError> {
        match value {
            FilterValue::Range(low, high) => {
                let column = self.column(field)?;
                let low = self.param(low.clone());
                let high = self.param(high.clone());
                self.conditions.push(format!("{} BETWEEN {} AND {}", column, low, high));
            }
            FilterValue::Equals(v) => {
                if is_empty_value(v) {
                    return Ok(());
                }
                let storage = to_storage_name(field);
                let column = self.column(field)?;
                if self.roles.precise_fields.iter().any(|p| p == &storage) {
                    let p = self.param(v.clone());
                    self.conditions.push(format!("{} = {}", column, p));
                } else {
                    let text = match v {
                        Value::String(s) => s.clone(),
                        Value::Number(_) | Value::Bool(_) => v.to_string(),
                        _ => {
                            return Err(FilterError::UnsupportedFilter {
                                field: field.to_string(),
                                reason: "LIKE matching needs a scalar value".to_string(),
                            })
                        }
                    };
                    let p = self.param(Value::String(format!("%{}%", text)));
                    self.conditions.push(format!("{} LIKE {}", column, p));
                }
            }
        }
        Ok(())
    }

    fn access(&mut self, scope: &AccessScope) -> Result<(), FilterError> {
        match scope {
            AccessScope::Unrestricted => {}
            AccessScope::Denied => self.conditions.push(ALWAYS_FALSE.to_string()),
            AccessScope::RestrictedTo(ids) if ids.is_empty() => {
                self.conditions.push(ALWAYS_FALSE.to_string())
            }
            AccessScope::RestrictedTo(ids) => {
                let roles = self.roles;
                let column = self.column(&roles.org_field)?;
                let placeholders: Vec<&str> = ids.iter().map(|id| self.param(Value::from(*id))).collect();
                self.conditions.push(format!("{} IN ({})", column, placeholders.join(", ")));
            }
        }
        Ok(())
    }

    /// Storage name, validated and alias-qualified.
    fn column(&self, field: &str) -> Result<String, FilterError> {
        let storage = to_storage_name(field);
        if !is_identifier(&storage) {
            return Err(FilterError::InvalidField(field.to_string()));
        }
        Ok(self.roles.qualify(&storage))
    }

    fn param(&mut self, value: Value) -> &'static str {
        self.param_values.push(value);
        "?"
    }
}
