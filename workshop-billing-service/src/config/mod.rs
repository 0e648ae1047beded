//! Configuration module for workshop-billing-service.

use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct WorkshopConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub storage: StorageBackend,
    pub database: Option<DatabaseConfig>,
    pub billing: BillingConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Business defaults for quotations and invoices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillingConfig {
    pub default_due_days: i64,
    pub expiring_soon_days: i64,
    pub max_number_retries: u32,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            default_due_days: 30,
            expiring_soon_days: 3,
            max_number_retries: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StorageBackend::Postgres),
            "memory" => Ok(StorageBackend::Memory),
            _ => Err(AppError::ConfigError(anyhow::anyhow!(
                "Invalid storage backend: {}",
                s
            ))),
        }
    }
}

impl WorkshopConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        Self::from_lookup(common, |key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(common: core_config::Config, lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let storage: StorageBackend = lookup("STORAGE_BACKEND")
            .unwrap_or_else(|| "postgres".to_string())
            .parse()?;

        let database = match storage {
            StorageBackend::Postgres => Some(DatabaseConfig {
                url: lookup("DATABASE_URL").ok_or_else(|| {
                    AppError::ConfigError(anyhow::anyhow!("DATABASE_URL is required"))
                })?,
                max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
                min_connections: parse_or(&lookup, "DATABASE_MIN_CONNECTIONS", 1)?,
            }),
            StorageBackend::Memory => None,
        };

        let defaults = BillingConfig::default();
        let billing = BillingConfig {
            default_due_days: parse_or(&lookup, "BILLING_DEFAULT_DUE_DAYS", defaults.default_due_days)?,
            expiring_soon_days: parse_or(
                &lookup,
                "BILLING_EXPIRING_SOON_DAYS",
                defaults.expiring_soon_days,
            )?,
            max_number_retries: parse_or(
                &lookup,
                "BILLING_MAX_NUMBER_RETRIES",
                defaults.max_number_retries,
            )?,
        };
        crate::models::validate_due_days(billing.default_due_days)
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("BILLING_DEFAULT_DUE_DAYS: {}", e)))?;
        if billing.max_number_retries == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "BILLING_MAX_NUMBER_RETRIES must be at least 1"
            )));
        }

        Ok(Self {
            common,
            service_name: lookup("SERVICE_NAME")
                .unwrap_or_else(|| "workshop-billing-service".to_string()),
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            otlp_endpoint: lookup("OTLP_ENDPOINT").filter(|s| !s.is_empty()),
            storage,
            database,
            billing,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| {
            AppError::ConfigError(anyhow::anyhow!("{} has invalid value '{}': {}", key, raw, e))
        }),
        None => Ok(default),
    }
}
