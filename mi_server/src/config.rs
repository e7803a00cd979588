//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use mentor_identity::{
    db::DatabaseConfig,
    email::SmtpConfig,
    upstream::FirebaseConfig,
    verification::{TwilioConfig, VerificationConfig},
};
use std::net::SocketAddr;
use std::time::Duration;

const DEFAULT_BIND: &str = "127.0.0.1:8080";

/// Complete server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind: SocketAddr,
    /// Where credentials and pending verifications live
    pub storage: StorageConfig,
    /// Security configuration
    pub security: SecurityConfig,
    /// Code expiry, attempt limit and consumption policies
    pub verification: VerificationConfig,
    /// Per-identifier limit on code requests
    pub throttle: ThrottleConfig,
    /// Phone channel; disabled when absent
    pub twilio: Option<TwilioConfig>,
    /// Outgoing mail; codes are logged to the console when absent
    pub smtp: Option<SmtpConfig>,
    /// Upstream identity provider; an in-memory one is used when absent
    pub firebase: Option<FirebaseConfig>,
    /// Request timeout for every outbound HTTP client
    pub upstream_timeout: Duration,
    /// Interval between sweeps of expired pending verifications
    pub purge_interval: Duration,
    /// Prometheus scrape endpoint, if any
    pub metrics_bind: Option<SocketAddr>,
}

#[derive(Debug, Clone)]
pub enum StorageConfig {
    Postgres(DatabaseConfig),
    /// Process-local stores, for development
    Memory,
}

/// Security-related configuration
#[derive(Clone)]
pub struct SecurityConfig {
    /// JWT signing secret (required)
    pub jwt_secret: String,
    /// Password hashing pepper (required)
    pub password_pepper: String,
    /// Access token lifetime in seconds
    pub access_token_ttl_secs: i64,
}

impl std::fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("access_token_ttl_secs", &self.access_token_ttl_secs)
            .finish_non_exhaustive()
    }
}

impl SecurityConfig {
    /// Check secret lengths
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if the JWT secret is shorter than 32
    /// characters or the pepper shorter than 16.
    pub fn new(
        jwt_secret: String,
        password_pepper: String,
        access_token_ttl_secs: i64,
    ) -> Result<Self, ConfigError> {
        if jwt_secret.len() < 32 {
            return Err(ConfigError::Invalid {
                var: "JWT_SECRET".to_string(),
                reason: "Must be at least 32 characters (128-bit security)".to_string(),
            });
        }

        if password_pepper.len() < 16 {
            return Err(ConfigError::Invalid {
                var: "PASSWORD_PEPPER".to_string(),
                reason: "Must be at least 16 characters (64-bit security)".to_string(),
            });
        }

        Ok(Self {
            jwt_secret,
            password_pepper,
            access_token_ttl_secs,
        })
    }
}

/// Sliding window applied to verification code requests
#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    /// Requests allowed per identifier within the window
    pub code_request_limit: usize,
    /// Window length in seconds
    pub code_request_window_secs: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            code_request_limit: 3,
            code_request_window_secs: 600,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `bind_override` - Optional bind address override (from CLI args)
    /// * `database_url_override` - Optional database URL override (from CLI args)
    /// * `memory` - Use in-memory stores instead of PostgreSQL (from CLI args)
    ///
    /// # Errors
    ///
    /// Returns error if required variables are missing or invalid
    pub fn from_env(
        bind_override: Option<SocketAddr>,
        database_url_override: Option<String>,
        memory: bool,
    ) -> Result<Self, ConfigError> {
        let bind = match bind_override {
            Some(bind) => bind,
            None => parse_env_required_or("SERVER_BIND", DEFAULT_BIND)?,
        };

        let storage = if memory {
            StorageConfig::Memory
        } else {
            let database_url = database_url_override
                .or_else(|| non_empty_env("DATABASE_URL"))
                .ok_or_else(|| ConfigError::MissingRequired {
                    var: "DATABASE_URL".to_string(),
                    hint: "Set a PostgreSQL URL or start with --memory".to_string(),
                })?;
            StorageConfig::Postgres(DatabaseConfig::new(database_url).with_env_overrides())
        };

        // Security configuration (REQUIRED)
        let jwt_secret = std::env::var("JWT_SECRET").map_err(|_| ConfigError::MissingRequired {
            var: "JWT_SECRET".to_string(),
            hint: "Generate with: openssl rand -hex 32".to_string(),
        })?;

        let password_pepper =
            std::env::var("PASSWORD_PEPPER").map_err(|_| ConfigError::MissingRequired {
                var: "PASSWORD_PEPPER".to_string(),
                hint: "Generate with: openssl rand -hex 16".to_string(),
            })?;

        let security = SecurityConfig::new(
            jwt_secret,
            password_pepper,
            parse_env_or("ACCESS_TOKEN_TTL_SECS", 86_400),
        )?;

        let firebase = match non_empty_env("FIREBASE_API_KEY") {
            Some(api_key) => {
                let config = FirebaseConfig::new(api_key);
                Some(
                    match (
                        non_empty_env("FIREBASE_PROJECT_ID"),
                        non_empty_env("FIREBASE_ADMIN_TOKEN"),
                    ) {
                        (Some(project), Some(token)) => config.with_admin(project, token),
                        _ => config,
                    },
                )
            }
            None if memory => None,
            None => {
                return Err(ConfigError::MissingRequired {
                    var: "FIREBASE_API_KEY".to_string(),
                    hint: "Web API key from the Firebase console, or start with --memory"
                        .to_string(),
                });
            }
        };

        let metrics_bind = match non_empty_env("METRICS_BIND") {
            Some(value) => Some(value.parse().map_err(|_| ConfigError::Invalid {
                var: "METRICS_BIND".to_string(),
                reason: format!("'{}' is not a socket address", value),
            })?),
            None => None,
        };

        Ok(ServerConfig {
            bind,
            storage,
            security,
            verification: VerificationConfig::from_env(),
            throttle: ThrottleConfig {
                code_request_limit: parse_env_or("CODE_REQUEST_LIMIT", 3),
                code_request_window_secs: parse_env_or("CODE_REQUEST_WINDOW_SECS", 600),
            },
            twilio: TwilioConfig::from_env(),
            smtp: SmtpConfig::from_env(),
            firebase,
            upstream_timeout: Duration::from_secs(parse_env_or("UPSTREAM_TIMEOUT_SECS", 10)),
            purge_interval: Duration::from_secs(parse_env_or("PENDING_PURGE_INTERVAL_SECS", 60)),
            metrics_bind,
        })
    }

    /// Validate configuration after loading
    ///
    /// # Returns
    ///
    /// * `Result<(), ConfigError>` - Success or validation error
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.verification.code_ttl <= chrono::Duration::zero() {
            return Err(ConfigError::Invalid {
                var: "VERIFICATION_CODE_TTL_SECS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.security.access_token_ttl_secs <= 0 {
            return Err(ConfigError::Invalid {
                var: "ACCESS_TOKEN_TTL_SECS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.throttle.code_request_limit == 0 {
            return Err(ConfigError::Invalid {
                var: "CODE_REQUEST_LIMIT".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.throttle.code_request_window_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "CODE_REQUEST_WINDOW_SECS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.upstream_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                var: "UPSTREAM_TIMEOUT_SECS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.purge_interval.is_zero() {
            return Err(ConfigError::Invalid {
                var: "PENDING_PURGE_INTERVAL_SECS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if let StorageConfig::Postgres(database) = &self.storage
            && database.min_connections > database.max_connections
        {
            return Err(ConfigError::Invalid {
                var: "DB_MIN_CONNECTIONS".to_string(),
                reason: format!(
                    "Cannot exceed DB_MAX_CONNECTIONS ({})",
                    database.max_connections
                ),
            });
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Helper to parse environment variable with default fallback
fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Like [`parse_env_or`], but a present and unparseable value is an error.
fn parse_env_required_or<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    let value = non_empty_env(key).unwrap_or_else(|| default.to_string());
    value.parse().map_err(|_| ConfigError::Invalid {
        var: key.to_string(),
        reason: format!("Cannot parse '{}'", value),
    })
}
