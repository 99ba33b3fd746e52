use config::{ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::env;

/// Fractional digits of the `NUMERIC(20,4)` amount and balance columns
pub const STORED_SCALE: u32 = 4;

/// Largest value a `NUMERIC(20,4)` column holds
pub fn stored_max() -> Decimal {
    Decimal::from_i128_with_scale(10i128.pow(20) - 1, STORED_SCALE)
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub ledger: LedgerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    /// Full connection URL; takes precedence over the split fields below
    #[serde(default)]
    pub url: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub name: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
    pub lock_timeout_ms: u64,
    pub run_migrations: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LedgerConfig {
    #[serde(with = "rust_decimal::serde::str")]
    pub max_amount: Decimal,
    pub decimal_precision: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl DatabaseConfig {
    pub fn connection_url(&self) -> String {
        if !self.url.is_empty() {
            return self.url.clone();
        }

        if self.password.is_empty() {
            format!(
                "postgres://{}@{}:{}/{}",
                self.username, self.host, self.port, self.name
            )
        } else {
            format!(
                "postgres://{}:{}@{}:{}/{}",
                self.username, self.password, self.host, self.port, self.name
            )
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let mut builder = config::Config::builder()
            // Start with default configuration
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("server.workers", 4)?
            .set_default("database.url", "")?
            .set_default("database.host", "127.0.0.1")?
            .set_default("database.port", 5432)?
            .set_default("database.username", "postgres")?
            .set_default("database.password", "")?
            .set_default("database.name", "ledger")?
            .set_default("database.max_connections", 20)?
            .set_default("database.min_connections", 2)?
            .set_default("database.acquire_timeout_secs", 5)?
            .set_default("database.lock_timeout_ms", 5000)?
            .set_default("database.run_migrations", true)?
            .set_default("ledger.max_amount", "1000000000")?
            .set_default("ledger.decimal_precision", 4)?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?;

        // Add environment-specific config file if it exists
        if let Ok(config_file) = env::var("CONFIG_FILE") {
            builder = builder.add_source(File::with_name(&config_file).required(false));
        } else {
            builder = builder.add_source(
                File::with_name(&format!("config/{}", environment)).required(false),
            );
        }

        // Override with environment variables
        builder = builder.add_source(
            Environment::with_prefix("LEDGER_ENGINE")
                .separator("__")
                .try_parsing(true),
        );

        // Variables understood by the previous deployment
        let overrides = [
            ("DATABASE_URL", "database.url"),
            ("DB_URL", "database.host"),
            ("DB_PORT", "database.port"),
            ("DB_USERNAME", "database.username"),
            ("DB_PASSWORD", "database.password"),
            ("DB_DATABASE", "database.name"),
            ("LOGGING_LEVEL", "logging.level"),
            ("PORT", "server.port"),
        ];

        for (var, key) in overrides {
            if let Ok(value) = env::var(var) {
                builder = builder.set_override(key, value)?;
            }
        }

        builder.build()?.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("Server port cannot be 0".to_string());
        }

        if self.server.workers == 0 {
            return Err("At least one server worker is required".to_string());
        }

        if self.database.url.is_empty()
            && (self.database.host.is_empty() || self.database.name.is_empty())
        {
            return Err("Database URL or host and name are required".to_string());
        }

        if self.database.max_connections == 0 {
            return Err("Database max_connections must be positive".to_string());
        }

        if self.database.min_connections > self.database.max_connections {
            return Err("Database min_connections exceeds max_connections".to_string());
        }

        if self.ledger.max_amount <= Decimal::ZERO {
            return Err("Ledger max_amount must be positive".to_string());
        }

        if self.ledger.max_amount > stored_max() {
            return Err(format!(
                "Ledger max_amount cannot exceed {}",
                stored_max()
            ));
        }

        if self.ledger.decimal_precision > STORED_SCALE {
            return Err(format!(
                "Ledger decimal_precision cannot exceed {} (the stored column scale)",
                STORED_SCALE
            ));
        }

        Ok(())
    }
}
