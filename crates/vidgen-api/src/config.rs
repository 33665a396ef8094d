//! API configuration.

use std::time::Duration;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Default list page size
    pub list_default_limit: usize,
    /// Maximum list page size
    pub list_max_limit: usize,
    /// How often the reconciliation and stale-running sweeps run
    pub sweep_interval: Duration,
    /// Grace before a pending row with no handle is repaired
    pub dispatch_grace: Duration,
    /// Grace past the hard limit before a running row is failed
    pub stale_grace: Duration,
    /// Age at which terminal rows are deleted
    pub retention_age: Duration,
    /// How often the retention sweep runs
    pub retention_interval: Duration,
    /// Environment (development/production)
    pub environment: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            list_default_limit: 50,
            list_max_limit: 200,
            sweep_interval: Duration::from_secs(60),
            dispatch_grace: Duration::from_secs(120),
            stale_grace: Duration::from_secs(60),
            retention_age: Duration::from_secs(30 * 24 * 3600),
            retention_interval: Duration::from_secs(24 * 3600),
            environment: "development".to_string(),
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        fn env_secs(key: &str, default: u64) -> Duration {
            Duration::from_secs(
                std::env::var(key)
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(default),
            )
        }

        Self {
            host: std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("API_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8000),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_else(|_| vec!["*".to_string()]),
            list_default_limit: 50,
            list_max_limit: 200,
            sweep_interval: env_secs("SWEEP_INTERVAL_SECS", 60),
            dispatch_grace: env_secs("DISPATCH_GRACE_SECS", 120),
            stale_grace: env_secs("STALE_GRACE_SECS", 60),
            retention_age: env_secs("RETENTION_AGE_SECS", 30 * 24 * 3600),
            retention_interval: env_secs("RETENTION_INTERVAL_SECS", 24 * 3600),
            environment: std::env::var("ENVIRONMENT")
                .unwrap_or_else(|_| "development".to_string()),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }
}
