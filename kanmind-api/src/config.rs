/// Configuration management for the API server
///
/// Configuration comes from environment variables, with a `.env` file
/// loaded first in development.
///
/// # Environment Variables
///
/// - `API_HOST`: Host to bind to (default: 0.0.0.0)
/// - `API_PORT`: Port to bind to (default: 8080)
/// - `CORS_ORIGINS`: Comma-separated frontend origins, `*` for any
///   (default: `http://localhost:5500,http://127.0.0.1:5500`)
/// - `PRODUCTION`: Enables HSTS (default: false)
/// - `DATABASE_URL`: PostgreSQL connection string (required)
/// - `DATABASE_MAX_CONNECTIONS`: Pool size (default: 10)
/// - `AUTH_TOKEN_TTL_HOURS`: Login token lifetime, 0 for no expiry (default: 720)
/// - `GUEST_LOGIN_ENABLED`: Enables `POST /api/auth/guest-login` (default: false)
/// - `GUEST_EMAIL`: Guest account email (default: guest@kanmind.local)
/// - `GUEST_PASSWORD`: Guest account password (required when guest login is enabled)
///
/// # Example
///
/// ```no_run
/// use kanmind_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use serde::{Deserialize, Serialize};
use std::env;

const DEFAULT_CORS_ORIGINS: &str = "http://localhost:5500,http://127.0.0.1:5500";
const DEFAULT_GUEST_EMAIL: &str = "guest@kanmind.local";

/// Longest accepted token lifetime (100 years)
const MAX_TOKEN_TTL_HOURS: u64 = 876_000;

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// API server configuration
    pub api: ApiConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Login token configuration
    pub auth: AuthConfig,
}

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,

    /// Port to bind to
    pub port: u16,

    /// Allowed CORS origins; `*` switches to permissive CORS
    pub cors_origins: Vec<String>,

    /// Production mode (HSTS on)
    pub production: bool,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in pool
    pub max_connections: u32,
}

/// Login token configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Token lifetime in hours, 0 for tokens that never expire
    pub token_ttl_hours: u64,

    /// Shared guest account, `None` when guest login is disabled
    pub guest: Option<GuestConfig>,
}

/// Guest account credentials
#[derive(Clone, Serialize, Deserialize)]
pub struct GuestConfig {
    /// Guest account email
    pub email: String,

    /// Guest account password
    pub password: String,
}

impl std::fmt::Debug for GuestConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuestConfig")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `DATABASE_URL` is missing
    /// - A numeric or boolean variable has an invalid value
    /// - Guest login is enabled without `GUEST_PASSWORD`
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let api_host = var("API_HOST", "0.0.0.0");
        let api_port = var("API_PORT", "8080")
            .parse::<u16>()
            .map_err(|e| anyhow::anyhow!("API_PORT is invalid: {}", e))?;
        let cors_origins = parse_origins(&var("CORS_ORIGINS", DEFAULT_CORS_ORIGINS));
        let production = parse_bool("PRODUCTION", &var("PRODUCTION", "false"))?;

        let database_url = lookup("DATABASE_URL")
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;
        let max_connections = var("DATABASE_MAX_CONNECTIONS", "10")
            .parse::<u32>()
            .map_err(|e| anyhow::anyhow!("DATABASE_MAX_CONNECTIONS is invalid: {}", e))?;

        let token_ttl_hours = var("AUTH_TOKEN_TTL_HOURS", "720")
            .parse::<u64>()
            .map_err(|e| anyhow::anyhow!("AUTH_TOKEN_TTL_HOURS is invalid: {}", e))?;

        let guest = if parse_bool("GUEST_LOGIN_ENABLED", &var("GUEST_LOGIN_ENABLED", "false"))? {
            let password = lookup("GUEST_PASSWORD").ok_or_else(|| {
                anyhow::anyhow!("GUEST_PASSWORD is required when GUEST_LOGIN_ENABLED is set")
            })?;
            Some(GuestConfig {
                email: var("GUEST_EMAIL", DEFAULT_GUEST_EMAIL),
                password,
            })
        } else {
            None
        };

        Ok(Self {
            api: ApiConfig {
                host: api_host,
                port: api_port,
                cors_origins,
                production,
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections,
            },
            auth: AuthConfig {
                token_ttl_hours,
                guest,
            },
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    /// Whether CORS accepts any origin
    pub fn cors_permissive(&self) -> bool {
        self.api.cors_origins.iter().any(|origin| origin == "*")
    }
}

impl AuthConfig {
    /// Token lifetime, `None` when tokens never expire
    pub fn token_ttl(&self) -> Option<chrono::Duration> {
        match self.token_ttl_hours {
            0 => None,
            hours => Some(chrono::Duration::hours(hours.min(MAX_TOKEN_TTL_HOURS) as i64)),
        }
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|origin| origin.trim().trim_end_matches('/'))
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(key: &str, raw: &str) -> anyhow::Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => anyhow::bail!("{} must be a boolean, got '{}'", key, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[("DATABASE_URL", "postgresql://localhost/kanmind")]).unwrap();

        assert_eq!(config.bind_address(), "0.0.0.0:8080");
        assert_eq!(
            config.api.cors_origins,
            vec!["http://localhost:5500", "http://127.0.0.1:5500"]
        );
        assert!(!config.api.production);
        assert!(!config.cors_permissive());
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.auth.token_ttl(), Some(chrono::Duration::hours(720)));
        assert!(config.auth.guest.is_none());
    }

    #[test]
    fn test_database_url_required() {
        let err = config_from(&[]).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("DATABASE_URL", "postgresql://localhost/kanmind"),
            ("API_HOST", "127.0.0.1"),
            ("API_PORT", "9000"),
            ("CORS_ORIGINS", " https://kanmind.example/ , * "),
            ("PRODUCTION", "TRUE"),
            ("AUTH_TOKEN_TTL_HOURS", "0"),
        ])
        .unwrap();

        assert_eq!(config.bind_address(), "127.0.0.1:9000");
        assert_eq!(config.api.cors_origins, vec!["https://kanmind.example", "*"]);
        assert!(config.cors_permissive());
        assert!(config.api.production);
        assert_eq!(config.auth.token_ttl(), None);
    }

    #[test]
    fn test_invalid_values() {
        assert!(config_from(&[("DATABASE_URL", "x"), ("API_PORT", "http")]).is_err());
        assert!(config_from(&[("DATABASE_URL", "x"), ("PRODUCTION", "maybe")]).is_err());
        assert!(config_from(&[("DATABASE_URL", "x"), ("AUTH_TOKEN_TTL_HOURS", "-1")]).is_err());
    }

    #[test]
    fn test_guest_login() {
        let err = config_from(&[("DATABASE_URL", "x"), ("GUEST_LOGIN_ENABLED", "true")]).unwrap_err();
        assert!(err.to_string().contains("GUEST_PASSWORD"));

        let config = config_from(&[
            ("DATABASE_URL", "x"),
            ("GUEST_LOGIN_ENABLED", "1"),
            ("GUEST_PASSWORD", "Guest#Pass1"),
        ])
        .unwrap();
        let guest = config.auth.guest.unwrap();
        assert_eq!(guest.email, "guest@kanmind.local");
        assert!(!format!("{:?}", guest).contains("Guest#Pass1"));
    }
}
