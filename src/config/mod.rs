use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::database::connection::PoolConfig;
use crate::database::registry::RegistryConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub tenant_pool: TenantPoolConfig,
    pub tenancy: TenancyConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
}

/// Master store connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

/// Limits applied to every tenant pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantPoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub max_lifetime_secs: u64,
    pub idle_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenancyConfig {
    pub tenant_header: String,
    pub path_param: String,
    pub query_param: String,
    pub base_domain: Option<String>,
    pub reserved_subdomains: Vec<String>,
    pub idle_eviction_secs: u64,
    pub eviction_interval_secs: u64,
    pub template_database: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(skip_serializing)]
    pub encryption_key: String,
    #[serde(skip_serializing)]
    pub jwt_secret: String,
    pub jwt_expiry_hours: u64,
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
}

impl TenantPoolConfig {
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_connections: self.max_connections,
            min_connections: self.min_connections,
            max_lifetime: Duration::from_secs(self.max_lifetime_secs),
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            acquire_timeout: Duration::from_secs(self.connect_timeout_secs),
        }
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        if let Some(v) = env::var("PORT").ok().and_then(|v| v.parse().ok()) {
            self.server.port = v;
        }

        // Master store
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = v;
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }

        // Tenant pools
        if let Ok(v) = env::var("TENANT_POOL_MAX_CONNECTIONS") {
            self.tenant_pool.max_connections = v.parse().unwrap_or(self.tenant_pool.max_connections);
        }
        if let Ok(v) = env::var("TENANT_POOL_MIN_CONNECTIONS") {
            self.tenant_pool.min_connections = v.parse().unwrap_or(self.tenant_pool.min_connections);
        }
        if let Ok(v) = env::var("TENANT_POOL_MAX_LIFETIME_SECS") {
            self.tenant_pool.max_lifetime_secs = v.parse().unwrap_or(self.tenant_pool.max_lifetime_secs);
        }
        if let Ok(v) = env::var("TENANT_POOL_IDLE_TIMEOUT_SECS") {
            self.tenant_pool.idle_timeout_secs = v.parse().unwrap_or(self.tenant_pool.idle_timeout_secs);
        }
        if let Ok(v) = env::var("TENANT_CONNECT_TIMEOUT_SECS") {
            self.tenant_pool.connect_timeout_secs = v.parse().unwrap_or(self.tenant_pool.connect_timeout_secs);
        }

        // Tenant resolution
        if let Ok(v) = env::var("TENANT_HEADER") {
            self.tenancy.tenant_header = v;
        }
        if let Ok(v) = env::var("TENANT_PATH_PARAM") {
            self.tenancy.path_param = v;
        }
        if let Ok(v) = env::var("TENANT_QUERY_PARAM") {
            self.tenancy.query_param = v;
        }
        if let Ok(v) = env::var("TENANT_BASE_DOMAIN") {
            self.tenancy.base_domain = Some(v).filter(|d| !d.trim().is_empty());
        }
        if let Ok(v) = env::var("TENANT_RESERVED_SUBDOMAINS") {
            self.tenancy.reserved_subdomains = v
                .split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Ok(v) = env::var("TENANT_IDLE_EVICTION_SECS") {
            self.tenancy.idle_eviction_secs = v.parse().unwrap_or(self.tenancy.idle_eviction_secs);
        }
        if let Ok(v) = env::var("TENANT_EVICTION_INTERVAL_SECS") {
            self.tenancy.eviction_interval_secs = v.parse().unwrap_or(self.tenancy.eviction_interval_secs);
        }
        if let Ok(v) = env::var("TENANT_TEMPLATE_DATABASE") {
            self.tenancy.template_database = Some(v).filter(|d| !d.trim().is_empty());
        }

        // Security
        if let Ok(v) = env::var("TENANT_ENCRYPTION_KEY") {
            self.security.encryption_key = v;
        }
        if let Ok(v) = env::var("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("SECURITY_JWT_EXPIRY_HOURS") {
            self.security.jwt_expiry_hours = v.parse().unwrap_or(self.security.jwt_expiry_hours);
        }
        if let Ok(v) = env::var("SECURITY_ENABLE_CORS") {
            self.security.enable_cors = v.parse().unwrap_or(self.security.enable_cors);
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v.split(',').map(|s| s.trim().to_string()).collect();
        }

        self
    }

    fn reserved_subdomains() -> Vec<String> {
        ["www", "api", "admin", "app"].iter().map(|s| s.to_string()).collect()
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig { port: 3000 },
            database: DatabaseConfig {
                url: "postgres://postgres@localhost:5432/tenant_master".to_string(),
                max_connections: 10,
                connection_timeout: 5,
            },
            tenant_pool: TenantPoolConfig {
                max_connections: 5,
                min_connections: 0,
                max_lifetime_secs: 30 * 60,
                idle_timeout_secs: 5 * 60,
                connect_timeout_secs: 5,
            },
            tenancy: TenancyConfig {
                tenant_header: "X-Tenant-Slug".to_string(),
                path_param: "tenant".to_string(),
                query_param: "tenant".to_string(),
                base_domain: None,
                reserved_subdomains: Self::reserved_subdomains(),
                idle_eviction_secs: 10 * 60,
                eviction_interval_secs: 60,
                template_database: None,
            },
            security: SecurityConfig {
                encryption_key: "development-only-tenant-encryption-key".to_string(),
                jwt_secret: "development-only-jwt-secret".to_string(),
                jwt_expiry_hours: 24 * 7, // 1 week
                enable_cors: true,
                cors_origins: vec!["http://localhost:3000".to_string(), "http://localhost:5173".to_string()],
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            server: ServerConfig { port: 3000 },
            database: DatabaseConfig {
                url: String::new(),
                max_connections: 20,
                connection_timeout: 10,
            },
            tenant_pool: TenantPoolConfig {
                max_connections: 10,
                min_connections: 0,
                max_lifetime_secs: 30 * 60,
                idle_timeout_secs: 10 * 60,
                connect_timeout_secs: 10,
            },
            tenancy: TenancyConfig {
                tenant_header: "X-Tenant-Slug".to_string(),
                path_param: "tenant".to_string(),
                query_param: "tenant".to_string(),
                base_domain: None,
                reserved_subdomains: Self::reserved_subdomains(),
                idle_eviction_secs: 30 * 60,
                eviction_interval_secs: 5 * 60,
                template_database: None,
            },
            security: SecurityConfig {
                encryption_key: String::new(),
                jwt_secret: String::new(),
                jwt_expiry_hours: 24,
                enable_cors: true,
                cors_origins: vec!["https://staging.example.com".to_string()],
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            server: ServerConfig { port: 8080 },
            database: DatabaseConfig {
                url: String::new(),
                max_connections: 50,
                connection_timeout: 5,
            },
            tenant_pool: TenantPoolConfig {
                max_connections: 20,
                min_connections: 1,
                max_lifetime_secs: 60 * 60,
                idle_timeout_secs: 10 * 60,
                connect_timeout_secs: 5,
            },
            tenancy: TenancyConfig {
                tenant_header: "X-Tenant-Slug".to_string(),
                path_param: "tenant".to_string(),
                query_param: "tenant".to_string(),
                base_domain: None,
                reserved_subdomains: Self::reserved_subdomains(),
                idle_eviction_secs: 60 * 60,
                eviction_interval_secs: 5 * 60,
                template_database: None,
            },
            security: SecurityConfig {
                encryption_key: String::new(),
                jwt_secret: String::new(),
                jwt_expiry_hours: 4,
                enable_cors: true,
                cors_origins: vec!["https://app.example.com".to_string()],
            },
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Settings the service refuses to start without
    pub fn validate(&self) -> Result<(), String> {
        if self.database.url.is_empty() {
            return Err("DATABASE_URL is not set".to_string());
        }
        if self.security.encryption_key.is_empty() {
            return Err("TENANT_ENCRYPTION_KEY is not set".to_string());
        }
        if self.security.jwt_secret.is_empty() {
            return Err("JWT_SECRET is not set".to_string());
        }
        if self.tenant_pool.max_connections == 0 {
            return Err("TENANT_POOL_MAX_CONNECTIONS must be at least 1".to_string());
        }
        if self.tenant_pool.min_connections > self.tenant_pool.max_connections {
            return Err("TENANT_POOL_MIN_CONNECTIONS exceeds TENANT_POOL_MAX_CONNECTIONS".to_string());
        }
        Ok(())
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn development_config_is_runnable() {
        let config = AppConfig::development();
        assert!(config.validate().is_ok());
        assert_eq!(config.tenancy.tenant_header, "X-Tenant-Slug");
        assert!(config.tenancy.reserved_subdomains.contains(&"www".to_string()));
        assert!(config.tenancy.reserved_subdomains.contains(&"api".to_string()));
    }

    #[test]
    fn production_requires_secrets() {
        let mut config = AppConfig::production();
        config.database.url = "postgres://db/master".to_string();
        assert_eq!(config.validate().unwrap_err(), "TENANT_ENCRYPTION_KEY is not set");

        config.security.encryption_key = "k".to_string();
        assert_eq!(config.validate().unwrap_err(), "JWT_SECRET is not set");

        config.security.jwt_secret = "j".to_string();
        assert!(config.validate().is_ok());
        assert!(config.is_production());
        assert!(!AppConfig::development().is_production());
    }

    #[test]
    fn pool_settings_convert_to_durations() {
        let config = AppConfig::development();
        let pool = config.tenant_pool.pool_config();
        assert_eq!(pool.max_connections, 5);
        assert_eq!(pool.acquire_timeout, Duration::from_secs(5));
        assert_eq!(config.tenant_pool.registry_config().connect_timeout, Duration::from_secs(5));
    }

    #[test]
    fn secrets_are_not_serialized() {
        let json = serde_json::to_value(AppConfig::development()).unwrap();
        assert!(json["security"].get("encryption_key").is_none());
        assert!(json["security"].get("jwt_secret").is_none());
    }
}
