use crate::{env_parse, env_required, ConfigError, FromEnv};

/// Postgres connection settings
#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    /// Apply pending migrations on startup
    pub run_migrations: bool,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 10,
            run_migrations: true,
        }
    }
}

impl FromEnv for DatabaseConfig {
    /// Requires DATABASE_URL; DATABASE_MAX_CONNECTIONS and DATABASE_RUN_MIGRATIONS are optional
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            url: env_required("DATABASE_URL")?,
            max_connections: env_parse("DATABASE_MAX_CONNECTIONS", 10)?,
            run_migrations: env_parse("DATABASE_RUN_MIGRATIONS", true)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_config_from_env_success() {
        temp_env::with_vars(
            [
                ("DATABASE_URL", Some("postgres://localhost/notifications")),
                ("DATABASE_MAX_CONNECTIONS", Some("4")),
                ("DATABASE_RUN_MIGRATIONS", None),
            ],
            || {
                let config = DatabaseConfig::from_env().unwrap();
                assert_eq!(config.url, "postgres://localhost/notifications");
                assert_eq!(config.max_connections, 4);
                assert!(config.run_migrations);
            },
        );
    }

    #[test]
    fn test_database_config_from_env_missing() {
        temp_env::with_var_unset("DATABASE_URL", || {
            let err = DatabaseConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("DATABASE_URL"));
        });
    }

    #[test]
    fn test_database_config_invalid_flag() {
        temp_env::with_vars(
            [
                ("DATABASE_URL", Some("postgres://localhost/db")),
                ("DATABASE_RUN_MIGRATIONS", Some("sometimes")),
            ],
            || {
                let err = DatabaseConfig::from_env().unwrap_err();
                assert!(err.to_string().contains("DATABASE_RUN_MIGRATIONS"));
            },
        );
    }
}
