use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub filter: FilterConfig,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub hierarchy: HierarchySettings,
    pub storage: StorageConfig,
    pub api: ApiConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    pub max_page_size: Option<i64>,
    pub debug_logging: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Server URL; its path is replaced by each schema name.
    pub url: Option<String>,
    /// Logical database name to schema name.
    pub schemas: BTreeMap<String, String>,
    pub min_connections: u32,
    pub max_connections: u32,
    pub connection_timeout: u64,
    pub enable_slow_query_warning: bool,
    pub slow_query_threshold_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// In-memory cache when unset.
    pub redis_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchySettings {
    pub org_table: String,
    pub descendants_ttl_secs: u64,
    pub descendants_jitter_secs: (i64, i64),
    pub ancestors_ttl_secs: u64,
    pub ancestors_jitter_secs: (i64, i64),
    pub max_depth: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub root_dir: PathBuf,
    pub buckets: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub port: u16,
    pub log_level: String,
    pub enable_request_logging: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub jwt_secret: String,
    pub jwt_algorithm: String,
    pub jwt_expiry_minutes: u64,
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
}

pub const SYSTEM_DB: &str = "system";
pub const DOC_DB: &str = "doc";

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        Self::for_environment(environment).with_env_overrides()
    }

    pub fn for_environment(environment: Environment) -> Self {
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
    }

    fn with_env_overrides(mut self) -> Self {
        // Filter overrides
        if let Ok(v) = env::var("FILTER_MAX_PAGE_SIZE") {
            self.filter.max_page_size = v.parse().ok();
        }
        if let Ok(v) = env::var("FILTER_DEBUG_LOGGING") {
            self.filter.debug_logging = v.parse().unwrap_or(self.filter.debug_logging);
        }

        // Database overrides
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = Some(v);
        }
        if let Ok(v) = env::var("DATABASE_SYSTEM_SCHEMA") {
            self.database.schemas.insert(SYSTEM_DB.to_string(), v);
        }
        if let Ok(v) = env::var("DATABASE_DOC_SCHEMA") {
            self.database.schemas.insert(DOC_DB.to_string(), v);
        }
        if let Ok(v) = env::var("DATABASE_MIN_CONNECTIONS") {
            self.database.min_connections = v.parse().unwrap_or(self.database.min_connections);
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }
        if let Ok(v) = env::var("DATABASE_ENABLE_SLOW_QUERY_WARNING") {
            self.database.enable_slow_query_warning = v.parse().unwrap_or(self.database.enable_slow_query_warning);
        }
        if let Ok(v) = env::var("DATABASE_SLOW_QUERY_THRESHOLD_MS") {
            self.database.slow_query_threshold_ms = v.parse().unwrap_or(self.database.slow_query_threshold_ms);
        }

        // Cache overrides
        if let Ok(v) = env::var("REDIS_URL") {
            self.cache.redis_url = Some(v).filter(|s| !s.is_empty());
        }

        // Hierarchy overrides
        if let Ok(v) = env::var("HIERARCHY_ORG_TABLE") {
            self.hierarchy.org_table = v;
        }
        if let Ok(v) = env::var("HIERARCHY_DESCENDANTS_TTL_SECS") {
            self.hierarchy.descendants_ttl_secs = v.parse().unwrap_or(self.hierarchy.descendants_ttl_secs);
        }
        if let Ok(v) = env::var("HIERARCHY_ANCESTORS_TTL_SECS") {
            self.hierarchy.ancestors_ttl_secs = v.parse().unwrap_or(self.hierarchy.ancestors_ttl_secs);
        }
        if let Ok(v) = env::var("HIERARCHY_MAX_DEPTH") {
            self.hierarchy.max_depth = v.parse().unwrap_or(self.hierarchy.max_depth);
        }

        // Storage overrides
        if let Ok(v) = env::var("STORAGE_ROOT_DIR") {
            self.storage.root_dir = PathBuf::from(v);
        }
        if let Ok(v) = env::var("STORAGE_BUCKETS") {
            self.storage.buckets = split_list(&v);
        }

        // API overrides
        if let Ok(v) = env::var("PORT") {
            self.api.port = v.parse().unwrap_or(self.api.port);
        }
        if let Ok(v) = env::var("LOG_LEVEL") {
            self.api.log_level = v;
        }
        if let Ok(v) = env::var("API_ENABLE_REQUEST_LOGGING") {
            self.api.enable_request_logging = v.parse().unwrap_or(self.api.enable_request_logging);
        }

        // Security overrides
        if let Ok(v) = env::var("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("JWT_ALGORITHM") {
            self.security.jwt_algorithm = v;
        }
        if let Ok(v) = env::var("SECURITY_JWT_EXPIRY_MINUTES") {
            self.security.jwt_expiry_minutes = v.parse().unwrap_or(self.security.jwt_expiry_minutes);
        }
        if let Ok(v) = env::var("SECURITY_ENABLE_CORS") {
            self.security.enable_cors = v.parse().unwrap_or(self.security.enable_cors);
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = split_list(&v);
        }

        self
    }

    fn default_schemas() -> BTreeMap<String, String> {
        let mut schemas = BTreeMap::new();
        schemas.insert(SYSTEM_DB.to_string(), "orgscope_system".to_string());
        schemas.insert(DOC_DB.to_string(), "orgscope_doc".to_string());
        schemas
    }

    fn default_hierarchy() -> HierarchySettings {
        HierarchySettings {
            org_table: "sys_org".to_string(),
            descendants_ttl_secs: 3600,
            descendants_jitter_secs: (0, 300),
            ancestors_ttl_secs: 1800,
            ancestors_jitter_secs: (-300, 301),
            max_depth: 10,
        }
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            filter: FilterConfig {
                max_page_size: Some(1000),
                debug_logging: true,
            },
            database: DatabaseConfig {
                url: None,
                schemas: Self::default_schemas(),
                min_connections: 1,
                max_connections: 10,
                connection_timeout: 30,
                enable_slow_query_warning: true,
                slow_query_threshold_ms: 100,
            },
            cache: CacheConfig { redis_url: None },
            hierarchy: Self::default_hierarchy(),
            storage: StorageConfig {
                root_dir: PathBuf::from("./data/objects"),
                buckets: vec!["files".to_string(), "icons".to_string(), "avatars".to_string()],
            },
            api: ApiConfig {
                port: 8000,
                log_level: "debug".to_string(),
                enable_request_logging: true,
            },
            security: SecurityConfig {
                jwt_secret: "development-secret".to_string(),
                jwt_algorithm: "HS256".to_string(),
                jwt_expiry_minutes: 60 * 24 * 7,
                enable_cors: true,
                cors_origins: vec!["http://localhost:3000".to_string(), "http://localhost:5173".to_string()],
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            filter: FilterConfig {
                max_page_size: Some(500),
                debug_logging: false,
            },
            database: DatabaseConfig {
                url: None,
                schemas: Self::default_schemas(),
                min_connections: 2,
                max_connections: 20,
                connection_timeout: 10,
                enable_slow_query_warning: true,
                slow_query_threshold_ms: 500,
            },
            cache: CacheConfig { redis_url: None },
            hierarchy: Self::default_hierarchy(),
            storage: StorageConfig {
                root_dir: PathBuf::from("/var/lib/orgscope/objects"),
                buckets: vec!["files".to_string(), "icons".to_string(), "avatars".to_string()],
            },
            api: ApiConfig {
                port: 8000,
                log_level: "info".to_string(),
                enable_request_logging: true,
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_algorithm: "HS256".to_string(),
                jwt_expiry_minutes: 60 * 24,
                enable_cors: true,
                cors_origins: vec!["https://staging.example.com".to_string()],
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            filter: FilterConfig {
                max_page_size: Some(100),
                debug_logging: false,
            },
            database: DatabaseConfig {
                url: None,
                schemas: Self::default_schemas(),
                min_connections: 5,
                max_connections: 50,
                connection_timeout: 5,
                enable_slow_query_warning: true,
                slow_query_threshold_ms: 1000,
            },
            cache: CacheConfig { redis_url: None },
            hierarchy: Self::default_hierarchy(),
            storage: StorageConfig {
                root_dir: PathBuf::from("/var/lib/orgscope/objects"),
                buckets: vec!["files".to_string(), "icons".to_string(), "avatars".to_string()],
            },
            api: ApiConfig {
                port: 8000,
                log_level: "warn".to_string(),
                enable_request_logging: false,
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_algorithm: "HS256".to_string(),
                jwt_expiry_minutes: 60 * 4,
                enable_cors: true,
                cors_origins: vec!["https://app.example.com".to_string()],
            },
        }
    }

    pub fn is_development(&self) -> bool {
        matches!(self.environment, Environment::Development)
    }
}

fn split_list(v: &str) -> Vec<String> {
    v.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
