use once_cell::sync::Lazy;
use regex::Regex;

use super::error::FilterError;
use super::filter_order::FilterOrder;
use super::filter_where::FilterWhere;
use super::types::{CompileOptions, CompiledFind, CompiledQuery, FieldRoles, QuerySpec, ALL_PAGES};
use crate::org::AccessScope;

static WHERE_KEYWORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bWHERE\b").expect("valid regex"));

/// Compiles a [`QuerySpec`] against a trusted base query.
///
/// ```text
/// base [WHERE|AND] <keywords> AND <filters> AND <access> ORDER BY ... LIMIT n OFFSET m
/// ```
pub struct Filter {
    base_query: String,
    roles: FieldRoles,
    options: CompileOptions,
}

impl Filter {
    pub fn new(base_query: impl Into<String>) -> Result<Self, FilterError> {
        let base_query = base_query.into();
        let trimmed = strip_trailing_noise(&base_query);
        if trimmed.trim().is_empty() {
            return Err(FilterError::InvalidBaseQuery("Base query cannot be empty".to_string()));
        }
        Ok(Self {
            base_query: trimmed.trim_start().to_string(),
            roles: FieldRoles::default(),
            options: CompileOptions::default(),
        })
    }

    pub fn roles(mut self, roles: FieldRoles) -> Self {
        self.roles = roles;
        self
    }

    pub fn options(mut self, options: CompileOptions) -> Self {
        self.options = options;
        self
    }

    /// Runs every input check `compile` performs (pagination, field and sort
    /// identifiers, filter value shapes) without needing an access scope.
    pub fn validate(&self, spec: &QuerySpec) -> Result<(), FilterError> {
        self.build_limit_clause(spec)?;
        FilterOrder::generate(&spec.sort, &self.roles)?;
        FilterWhere::generate(spec, &self.roles, &AccessScope::Denied)?;
        Ok(())
    }

    pub fn compile(&self, spec: &QuerySpec, scope: &AccessScope) -> Result<CompiledFind, FilterError> {
        let limit_clause = self.build_limit_clause(spec)?;
        let order_clause = FilterOrder::generate(&spec.sort, &self.roles)?;
        let (where_clause, params) = FilterWhere::generate(spec, &self.roles, scope)?;

        let filtered = self.append_where(&where_clause);
        let count = CompiledQuery {
            sql: format!("SELECT COUNT(*) FROM ({}) AS total", filtered),
            params: params.clone(),
        };

        let sql = [filtered, order_clause, limit_clause]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        if self.options.debug_logging {
            tracing::debug!("Compiled query: {} params={:?}", sql, params);
        }

        Ok(CompiledFind {
            query: CompiledQuery { sql, params },
            count,
        })
    }

    fn append_where(&self, where_clause: &str) -> String {
        if where_clause.is_empty() {
            self.base_query.clone()
        } else if WHERE_KEYWORD.is_match(&self.base_query) {
            format!("{} AND {}", self.base_query, where_clause)
        } else {
            format!("{} WHERE {}", self.base_query, where_clause)
        }
    }

    fn build_limit_clause(&self, spec: &QuerySpec) -> Result<String, FilterError> {
        if spec.page_size == ALL_PAGES || spec.page == ALL_PAGES {
            return Ok(String::new());
        }
        if spec.page_size < 0 {
            return Err(FilterError::InvalidPagination(format!("page size {} is not allowed", spec.page_size)));
        }
        if spec.page < 1 {
            return Err(FilterError::InvalidPagination(format!("page {} is not allowed; pages start at 1", spec.page)));
        }

        let limit = match self.options.max_page_size {
            Some(max) if spec.page_size > max => {
                tracing::warn!("Page size {} exceeds max {}, capping to max", spec.page_size, max);
                max
            }
            _ => spec.page_size,
        };
        let offset = (spec.page - 1)
            .checked_mul(limit)
            .ok_or_else(|| FilterError::InvalidPagination(format!("page {} is out of range", spec.page)))?;
        Ok(format!("LIMIT {} OFFSET {}", limit, offset))
    }
}

/// Drops trailing whitespace, semicolons and `--` line comments. A `--`
/// inside a quoted literal on the last line is left alone; literals that
/// span lines are not tracked.
fn strip_trailing_noise(sql: &str) -> &str {
    let mut rest = sql;
    loop {
        let trimmed = rest.trim_end_matches(|c: char| c.is_whitespace() || c == ';');
        let line_start = trimmed.rfind('\n').map_or(0, |i| i + 1);
        match line_comment_start(&trimmed[line_start..]) {
            Some(pos) => rest = &trimmed[..line_start + pos],
            None => return trimmed,
        }
    }
}

/// Byte offset of a `--` that sits outside `'`, `"` and backtick quotes.
fn line_comment_start(line: &str) -> Option<usize> {
    let bytes = line.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(_) if b == b'\\' => i += 1,
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if matches!(b, b'\'' | b'"' | b'`') => quote = Some(b),
            None if b == b'-' && bytes.get(i + 1) == Some(&b'-') => return Some(i),
            None => {}
        }
        i += 1;
    }
    None
}
