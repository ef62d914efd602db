use super::error::FilterError;
use super::naming::{is_identifier, to_storage_name};
use super::types::{FieldRoles, SortDirection, SortDirective};

pub struct FilterOrder;

impl FilterOrder {
    /// Builds `ORDER BY ...` from the directives.
    ///
    /// The default-order field appears exactly once: an explicit directive
    /// on it replaces any earlier one, and when none is given it is
    /// appended last as `DESC`.
    pub fn generate(directives: &[SortDirective], roles: &FieldRoles) -> Result<String, FilterError> {
        let default_field = roles.default_order_field.as_deref();
        let mut ordering: Vec<(String, String, SortDirection)> = Vec::with_capacity(directives.len() + 1);

        for directive in directives {
            let storage = to_storage_name(&directive.field);
            if !is_identifier(&storage) {
                return Err(FilterError::InvalidField(directive.field.clone()));
            }
            if Some(storage.as_str()) == default_field {
                ordering.retain(|(s, _, _)| Some(s.as_str()) != default_field);
            }
            let qualified = roles.qualify(&storage);
            ordering.push((storage, qualified, directive.direction));
        }

        if let Some(default_field) = default_field {
            if !ordering.iter().any(|(s, _, _)| s == default_field) {
                ordering.push((default_field.to_string(), roles.qualify(default_field), SortDirection::Desc));
            }
        }

        if ordering.is_empty() {
            return Ok(String::new());
        }
        let parts: Vec<String> = ordering
            .iter()
            .map(|(_, column, direction)| format!("{} {}", column, direction.to_sql()))
            .collect();
        Ok(format!("ORDER BY {}", parts.join(", ")))
    }
}
