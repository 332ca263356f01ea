use anyhow::Context;
use std::str::FromStr;
use std::time::Duration;

/// Process configuration, read once at startup and passed down explicitly.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub public_url: String,
    pub staff_api_token: String,
    pub payment: PaymentConfig,
    pub policy: BookingPolicy,
    pub cache: CacheConfig,
    pub sweep_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct PaymentConfig {
    pub api_url: String,
    pub access_token: String,
    pub webhook_secret: Option<String>,
    pub timeout: Duration,
}

/// Business thresholds for holds, reschedules and compensation coupons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingPolicy {
    pub hold_window_mins: i64,
    pub free_window_hours: i64,
    pub max_free_reschedules: i64,
    pub surcharge_percentage: i64,
    pub coupon_validity_days: i64,
    pub coupon_code_length: usize,
}

impl Default for BookingPolicy {
    fn default() -> Self {
        Self {
            hold_window_mins: 10,
            free_window_hours: 24,
            max_free_reschedules: 1,
            surcharge_percentage: 20,
            coupon_validity_days: 90,
            coupon_code_length: 10,
        }
    }
}

impl BookingPolicy {
    pub fn hold_window(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.hold_window_mins)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub stats_ttl: Duration,
    pub availability_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stats_ttl: Duration::from_secs(180),
            availability_ttl: Duration::from_secs(30),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; unset keys fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = get("PORT").unwrap_or_else(|| "3000".into());
        let port = parse_value("PORT", &port)?;

        let defaults = BookingPolicy::default();
        let policy = BookingPolicy {
            hold_window_mins: env_or(&get, "HOLD_WINDOW_MINS", defaults.hold_window_mins)?,
            free_window_hours: env_or(
                &get,
                "RESCHEDULE_FREE_WINDOW_HOURS",
                defaults.free_window_hours,
            )?,
            max_free_reschedules: env_or(&get, "RESCHEDULE_MAX_FREE", defaults.max_free_reschedules)?,
            surcharge_percentage: env_or(
                &get,
                "RESCHEDULE_SURCHARGE_PCT",
                defaults.surcharge_percentage,
            )?,
            coupon_validity_days: env_or(&get, "COUPON_VALIDITY_DAYS", defaults.coupon_validity_days)?,
            coupon_code_length: env_or(&get, "COUPON_CODE_LENGTH", defaults.coupon_code_length)?,
        };

        if policy.hold_window_mins <= 0 {
            anyhow::bail!("HOLD_WINDOW_MINS must be positive");
        }
        if !(0..=100).contains(&policy.surcharge_percentage) {
            anyhow::bail!("RESCHEDULE_SURCHARGE_PCT must be between 0 and 100");
        }

        let cache = CacheConfig {
            stats_ttl: Duration::from_secs(env_or(&get, "STATS_CACHE_TTL_SECS", 180)?),
            availability_ttl: Duration::from_secs(env_or(&get, "AVAILABILITY_CACHE_TTL_SECS", 30)?),
        };

        let payment = PaymentConfig {
            api_url: get("PAYMENT_API_URL").unwrap_or_else(|| "https://api.mercadopago.com".into()),
            access_token: get("PAYMENT_ACCESS_TOKEN").unwrap_or_default(),
            webhook_secret: get("PAYMENT_WEBHOOK_SECRET"),
            timeout: Duration::from_secs(env_or(&get, "PAYMENT_TIMEOUT_SECS", 10)?),
        };

        Ok(Self {
            database_url: get("DATABASE_URL").unwrap_or_else(|| "sqlite:barber.db?mode=rwc".into()),
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            public_url: get("PUBLIC_URL").unwrap_or_else(|| "http://localhost:3000".into()),
            staff_api_token: get("STAFF_API_TOKEN").unwrap_or_default(),
            payment,
            policy,
            cache,
            sweep_interval: Duration::from_secs(env_or(&get, "SWEEP_INTERVAL_SECS", 900)?),
        })
    }
}

fn env_or<T, G>(get: &G, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse()
        .with_context(|| format!("{} must be a number, got {:?}", key, raw))
}
