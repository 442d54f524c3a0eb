use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Database connection string.
    pub database_url: String,

    /// Upper bound on pooled database connections.
    pub db_max_connections: u32,

    /// Socket address the HTTP API listens on.
    pub bind_addr: String,

    // =========================
    // Expiry sweep configuration
    // =========================
    /// Fixed delay between two expiry sweeps.
    ///
    /// A sweep that overruns pushes the next one back instead of
    /// triggering a burst of catch-up passes.
    pub sweep_interval: Duration,

    /// Delay before the first sweep after startup.
    pub sweep_initial_delay: Duration,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://trade_store.db?mode=rwc".to_string());

        let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        Self {
            database_url,
            db_max_connections: env_or("DB_MAX_CONNECTIONS", 16),
            bind_addr,

            sweep_interval: Duration::from_millis(env_or("SWEEP_INTERVAL_MS", 60_000)),
            sweep_initial_delay: Duration::from_millis(env_or("SWEEP_INITIAL_DELAY_MS", 30_000)),
        }
    }
}

/// Reads and parses `key`, falling back to `default` when unset or malformed.
fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => parse_or(key, &raw, default),
        Err(_) => default,
    }
}

fn parse_or<T>(key: &str, raw: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    raw.trim().parse().unwrap_or_else(|_| {
        tracing::warn!(key, value = raw, %default, "malformed config value; using default");
        default
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_or_accepts_valid_numbers() {
        assert_eq!(parse_or("SWEEP_INTERVAL_MS", " 2500 ", 60_000u64), 2_500);
    }

    #[test]
    fn parse_or_falls_back_on_garbage() {
        assert_eq!(parse_or("SWEEP_INTERVAL_MS", "soon", 60_000u64), 60_000);
        assert_eq!(parse_or("DB_MAX_CONNECTIONS", "-3", 16u32), 16);
    }

    #[test]
    fn unset_key_uses_default() {
        assert_eq!(env_or("TRADE_STORE_TEST_UNSET_KEY", 30_000u64), 30_000);
    }
}
