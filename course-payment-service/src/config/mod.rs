use anyhow::{Context, Result};
use dotenvy::dotenv;
use secrecy::Secret;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Config {
    /// Port and OTLP endpoint shared with other services.
    pub common: service_core::config::Config,
    pub service_name: String,
    pub log: LogConfig,
    pub storage: StorageConfig,
    pub fedapay: FedaPayConfig,
    pub checkout: CheckoutConfig,
    pub sweeper: SweeperConfig,
    pub session: SessionConfig,
}

#[derive(Clone, Debug)]
pub struct LogConfig {
    pub level: String,
    pub fedapay_level: String,
}

impl LogConfig {
    /// `EnvFilter` directives: global level plus an override for the
    /// FedaPay client module.
    pub fn filter(&self) -> String {
        format!(
            "{},course_payment_service::services::fedapay={}",
            self.level, self.fedapay_level
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageBackend {
    MongoDb,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mongodb" | "mongo" => Ok(StorageBackend::MongoDb),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(anyhow::anyhow!("Unknown STORAGE_BACKEND '{}'", other)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub mongodb_uri: Secret<String>,
    pub database: String,
}

#[derive(Clone, Debug)]
pub struct FedaPayConfig {
    pub api_url: String,
    pub api_key: Secret<String>,
    /// Webhook signing secret. Webhooks are refused while it is empty.
    pub webhook_secret: Secret<String>,
    pub environment: String,
    pub timeout: Duration,
    /// Replay window for webhook timestamps; 0 disables the check.
    pub signature_tolerance_seconds: u64,
}

#[derive(Clone, Debug)]
pub struct CheckoutConfig {
    pub currency: String,
    pub fallback_phone: String,
    pub fallback_country: String,
    pub public_base_url: Option<String>,
    pub dashboard_url: String,
    pub courses_url: String,
}

#[derive(Clone, Debug)]
pub struct SweeperConfig {
    /// Age after which a pending payment is failed; 0 disables the sweeper.
    pub pending_ttl_minutes: u64,
    pub interval: Duration,
}

/// One year.
pub const MAX_PENDING_TTL_MINUTES: u64 = 525_600;

impl SweeperConfig {
    pub fn enabled(&self) -> bool {
        self.pending_ttl_minutes > 0
    }

    fn validate(&self) -> Result<()> {
        if self.pending_ttl_minutes > MAX_PENDING_TTL_MINUTES {
            anyhow::bail!(
                "PAYMENT_PENDING_TTL_MINUTES must be at most {}",
                MAX_PENDING_TTL_MINUTES
            );
        }
        if self.enabled() && self.interval.is_zero() {
            anyhow::bail!("PAYMENT_SWEEP_INTERVAL_SECONDS must be positive when the sweeper is enabled");
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub secure_cookie: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let common = service_core::config::Config::load()
            .map_err(|e| anyhow::anyhow!("Failed to load common configuration: {}", e))?;

        Self::from_lookup(common, |key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup, `std::env` in production.
    pub fn from_lookup<F>(common: service_core::config::Config, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| -> String {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let get_parsed = |key: &str, default: u64| -> Result<u64> {
            match lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
                Some(v) => v
                    .parse()
                    .with_context(|| format!("{} must be a non-negative integer", key)),
                None => Ok(default),
            }
        };

        let backend: StorageBackend = get("STORAGE_BACKEND", "mongodb").parse()?;
        let mongodb_uri = get("MONGODB_URI", "");
        if backend == StorageBackend::MongoDb && mongodb_uri.is_empty() {
            anyhow::bail!("MONGODB_URI must be set when STORAGE_BACKEND=mongodb");
        }

        let sweeper = SweeperConfig {
            pending_ttl_minutes: get_parsed("PAYMENT_PENDING_TTL_MINUTES", 0)?,
            interval: Duration::from_secs(get_parsed("PAYMENT_SWEEP_INTERVAL_SECONDS", 300)?),
        };
        sweeper.validate()?;

        let public_base_url = Some(get("PUBLIC_BASE_URL", ""))
            .filter(|v| !v.is_empty())
            .map(|v| v.trim_end_matches('/').to_string());

        Ok(Self {
            common,
            service_name: "course-payment-service".to_string(),
            log: LogConfig {
                level: get("LOG_LEVEL", "info"),
                fedapay_level: get("FEDAPAY_LOG_LEVEL", "info"),
            },
            storage: StorageConfig {
                backend,
                mongodb_uri: Secret::new(mongodb_uri),
                database: get("MONGODB_DATABASE", "course_payments"),
            },
            fedapay: FedaPayConfig {
                api_url: get("FEDAPAY_API_URL", "https://sandbox-api.fedapay.com"),
                api_key: Secret::new(get("FEDAPAY_API_KEY", "")),
                webhook_secret: Secret::new(get("FEDAPAY_AUTH_KEY", "")),
                environment: get("FEDAPAY_ENVIRONMENT", "sandbox"),
                timeout: Duration::from_secs(get_parsed("FEDAPAY_TIMEOUT_SECONDS", 30)?),
                signature_tolerance_seconds: get_parsed("FEDAPAY_SIGNATURE_TOLERANCE_SECONDS", 0)?,
            },
            checkout: CheckoutConfig {
                currency: get("PAYMENT_CURRENCY", "XOF"),
                fallback_phone: get("CUSTOMER_FALLBACK_PHONE", "0100000000"),
                fallback_country: get("CUSTOMER_FALLBACK_COUNTRY", "bj"),
                public_base_url,
                dashboard_url: get("DASHBOARD_URL", "/student/dashboard"),
                courses_url: get("COURSES_URL", "/student/courses"),
            },
            sweeper,
            session: SessionConfig {
                secure_cookie: get("SESSION_SECURE_COOKIE", "false")
                    .parse()
                    .unwrap_or(false),
            },
        })
    }
}
