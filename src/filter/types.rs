use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::FilterError;

/// Sentinel for `page` / `page_size`: return every row.
pub const ALL_PAGES: i64 = -1;

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// Request-body key carrying the free-text search string.
pub const KEYWORDS_KEY: &str = "keywords";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn to_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }

    /// Accepts `1` / `-1` and the usual spellings of asc/desc.
    pub fn parse(field: &str, value: &Value) -> Result<Self, FilterError> {
        let invalid = || FilterError::InvalidSortDirection {
            field: field.to_string(),
            value: value.to_string(),
        };
        match value {
            Value::Number(n) => match n.as_i64() {
                Some(1) => Ok(SortDirection::Asc),
                Some(-1) => Ok(SortDirection::Desc),
                _ => Err(invalid()),
            },
            Value::String(s) => match s.to_ascii_lowercase().as_str() {
                "asc" | "ascend" | "ascending" => Ok(SortDirection::Asc),
                "desc" | "descend" | "descending" => Ok(SortDirection::Desc),
                _ => Err(invalid()),
            },
            _ => Err(invalid()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortDirective {
    /// External field name
    pub field: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// `field = ?` for precise fields, `field LIKE %value%` otherwise
    Equals(Value),
    /// Inclusive `field BETWEEN ? AND ?`
    Range(Value, Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    /// External field name
    pub field: String,
    pub value: FilterValue,
}

/// Structured list request: keyword text, field filters, sort, pagination.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    pub keywords: Option<String>,
    /// Equality and range filters in input order
    pub filters: Vec<FieldFilter>,
    pub sort: Vec<SortDirective>,
    pub page: i64,
    pub page_size: i64,
}

impl Default for QuerySpec {
    fn default() -> Self {
        Self {
            keywords: None,
            filters: vec![],
            sort: vec![],
            page: DEFAULT_PAGE,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl QuerySpec {
    pub fn keywords(mut self, keywords: impl Into<String>) -> Self {
        self.keywords = Some(keywords.into());
        self
    }

    pub fn equals(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(FieldFilter { field: field.into(), value: FilterValue::Equals(value.into()) });
        self
    }

    pub fn range(mut self, field: impl Into<String>, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        self.filters.push(FieldFilter {
            field: field.into(),
            value: FilterValue::Range(low.into(), high.into()),
        });
        self
    }

    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort.push(SortDirective { field: field.into(), direction });
        self
    }

    pub fn page(mut self, page: i64, page_size: i64) -> Self {
        self.page = page;
        self.page_size = page_size;
        self
    }

    /// Parse the wire shape
    /// `{ "body": {..}, "page": 1, "limit": 10, "sorter": { "createTime": -1 } }`.
    pub fn from_request(request: &Value) -> Result<Self, FilterError> {
        let obj = match request {
            Value::Object(obj) => obj,
            Value::Null => return Ok(Self::default()),
            _ => return Err(FilterError::InvalidRequest("request must be a JSON object".to_string())),
        };

        let mut spec = Self {
            page: read_int(obj, "page", DEFAULT_PAGE)?,
            page_size: read_int(obj, "limit", DEFAULT_PAGE_SIZE)?,
            ..Self::default()
        };

        match obj.get("body") {
            None | Some(Value::Null) => {}
            Some(Value::Object(body)) => spec.read_body(body)?,
            Some(_) => return Err(FilterError::InvalidRequest("'body' must be an object".to_string())),
        }

        match obj.get("sorter") {
            None | Some(Value::Null) => {}
            Some(Value::Object(sorter)) => {
                for (field, direction) in sorter {
                    spec.sort.push(SortDirective {
                        field: field.clone(),
                        direction: SortDirection::parse(field, direction)?,
                    });
                }
            }
            Some(_) => return Err(FilterError::InvalidRequest("'sorter' must be an object".to_string())),
        }

        Ok(spec)
    }

    fn read_body(&mut self, body: &Map<String, Value>) -> Result<(), FilterError> {
        for (key, value) in body {
            if key == KEYWORDS_KEY {
                match value {
                    Value::String(s) if !s.is_empty() => self.keywords = Some(s.clone()),
                    Value::String(_) | Value::Null => {}
                    _ => {
                        return Err(FilterError::UnsupportedFilter {
                            field: key.clone(),
                            reason: "keywords must be a string".to_string(),
                        })
                    }
                }
                continue;
            }
            if is_empty_value(value) {
                continue;
            }
            let filter_value = match value {
                Value::Array(items) if is_time_range(key, items) => {
                    FilterValue::Range(items[0].clone(), items[1].clone())
                }
                Value::Array(_) => {
                    return Err(FilterError::UnsupportedFilter {
                        field: key.clone(),
                        reason: "arrays are only accepted as two-element time ranges".to_string(),
                    })
                }
                Value::Object(_) => {
                    return Err(FilterError::UnsupportedFilter {
                        field: key.clone(),
                        reason: "nested objects are not supported".to_string(),
                    })
                }
                scalar => FilterValue::Equals(scalar.clone()),
            };
            self.filters.push(FieldFilter { field: key.clone(), value: filter_value });
        }
        Ok(())
    }
}

fn read_int(obj: &Map<String, Value>, key: &str, default: i64) -> Result<i64, FilterError> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(v) => v
            .as_i64()
            .ok_or_else(|| FilterError::InvalidPagination(format!("'{}' must be an integer", key))),
    }
}

pub(crate) fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        _ => false,
    }
}

fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_))
}

/// Two scalar bounds on a key whose external name contains `Time`.
pub fn is_time_range(key: &str, items: &[Value]) -> bool {
    key.contains("Time") && items.len() == 2 && items.iter().all(is_scalar)
}

/// How each field of a resource participates in a query.
#[derive(Debug, Clone)]
pub struct FieldRoles {
    /// Fields searched by the free-text keywords (OR-ed together)
    pub keyword_fields: Vec<String>,
    /// Storage names compared with `=` instead of `LIKE`
    pub precise_fields: Vec<String>,
    /// Storage name -> table alias, for joined base queries
    pub table_aliases: HashMap<String, String>,
    /// Storage name always present in ORDER BY, descending unless overridden
    pub default_order_field: Option<String>,
    /// Storage name of the owning-organization column
    pub org_field: String,
}

impl Default for FieldRoles {
    fn default() -> Self {
        Self {
            keyword_fields: vec![],
            precise_fields: vec!["id".to_string()],
            table_aliases: HashMap::new(),
            default_order_field: Some("create_time".to_string()),
            org_field: "org_id".to_string(),
        }
    }
}

impl FieldRoles {
    pub fn keyword_fields(mut self, fields: &[&str]) -> Self {
        self.keyword_fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn precise_fields(mut self, fields: &[&str]) -> Self {
        self.precise_fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn alias(mut self, field: &str, alias: &str) -> Self {
        self.table_aliases.insert(field.to_string(), alias.to_string());
        self
    }

    pub fn default_order_field(mut self, field: Option<&str>) -> Self {
        self.default_order_field = field.map(str::to_string);
        self
    }

    /// `alias.field` when the storage name has an alias, else the bare name.
    pub fn qualify(&self, storage_name: &str) -> String {
        match self.table_aliases.get(storage_name) {
            Some(alias) if !alias.is_empty() => format!("{}.{}", alias, storage_name),
            _ => storage_name.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Upper bound applied to `page_size`; `None` leaves it uncapped
    pub max_page_size: Option<i64>,
    pub debug_logging: bool,
}

/// SQL text plus its positional parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Page query and the matching total-count query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledFind {
    pub query: CompiledQuery,
    pub count: CompiledQuery,
}
