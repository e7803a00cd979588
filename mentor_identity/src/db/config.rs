//! Database configuration.

use std::env;
use std::str::FromStr;

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub database_url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,

    /// Connection timeout in seconds
    pub connection_timeout_secs: u64,

    /// Idle connection timeout in seconds
    pub idle_timeout_secs: u64,

    /// Maximum connection lifetime in seconds
    pub max_lifetime_secs: u64,
}

impl DatabaseConfig {
    /// Configuration for `database_url` with default pool sizing
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: 10,
            min_connections: 1,
            connection_timeout_secs: 10,
            idle_timeout_secs: 600,
            max_lifetime_secs: 1800,
        }
    }

    /// Apply pool tunables from the environment
    ///
    /// - `DB_MAX_CONNECTIONS` (default: 10)
    /// - `DB_MIN_CONNECTIONS` (default: 1)
    /// - `DB_CONNECTION_TIMEOUT` seconds (default: 10)
    /// - `DB_IDLE_TIMEOUT` seconds (default: 600)
    /// - `DB_MAX_LIFETIME` seconds (default: 1800)
    pub fn with_env_overrides(mut self) -> Self {
        fn read<T: FromStr>(key: &str, current: T) -> T {
            match env::var(key) {
                Ok(value) => value.parse().unwrap_or_else(|_| {
                    log::warn!("Ignoring invalid {}={:?}", key, value);
                    current
                }),
                Err(_) => current,
            }
        }

        self.max_connections = read("DB_MAX_CONNECTIONS", self.max_connections);
        self.min_connections = read("DB_MIN_CONNECTIONS", self.min_connections);
        self.connection_timeout_secs = read("DB_CONNECTION_TIMEOUT", self.connection_timeout_secs);
        self.idle_timeout_secs = read("DB_IDLE_TIMEOUT", self.idle_timeout_secs);
        self.max_lifetime_secs = read("DB_MAX_LIFETIME", self.max_lifetime_secs);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DatabaseConfig::new("postgres://localhost/test");
        assert_eq!(config.max_connections, 10);
        assert!(config.min_connections <= config.max_connections);
    }
}
