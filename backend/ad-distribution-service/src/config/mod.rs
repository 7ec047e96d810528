use anyhow::{bail, Context};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt::Display;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub ranking: RankingConfig,
    pub fairness: FairnessConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub env: String,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => bail!("unknown store backend: {}", other),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: StoreBackend,
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("backend", &self.backend)
            .field("url", &"[REDACTED]")
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .field("acquire_timeout_secs", &self.acquire_timeout_secs)
            .finish()
    }
}

/// Composite score policy.
///
/// `score = tier_value * weight_tier + recency * weight_recency + fairness * weight_fairness`,
/// every component on a 0-100 scale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingConfig {
    pub weight_tier: f64,
    pub weight_recency: f64,
    pub weight_fairness: f64,
    pub premium_tier_value: f64,
    pub featured_tier_value: f64,
    pub recency_half_life_days: f64,
    /// Fairness used when a listing's score cannot be computed
    pub neutral_fairness: f64,
    pub max_limit: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            weight_tier: 0.3,
            weight_recency: 0.2,
            weight_fairness: 0.5,
            premium_tier_value: 100.0,
            featured_tier_value: 60.0,
            recency_half_life_days: 7.0,
            neutral_fairness: 50.0,
            max_limit: 20,
        }
    }
}

impl RankingConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, weight) in [
            ("weight_tier", self.weight_tier),
            ("weight_recency", self.weight_recency),
            ("weight_fairness", self.weight_fairness),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                bail!("{} must be a non-negative number, got {}", name, weight);
            }
        }
        for (name, value) in [
            ("premium_tier_value", self.premium_tier_value),
            ("featured_tier_value", self.featured_tier_value),
            ("neutral_fairness", self.neutral_fairness),
        ] {
            if !(0.0..=100.0).contains(&value) {
                bail!("{} must be within 0..=100, got {}", name, value);
            }
        }
        if !self.recency_half_life_days.is_finite() || self.recency_half_life_days <= 0.0 {
            bail!(
                "recency_half_life_days must be positive, got {}",
                self.recency_half_life_days
            );
        }
        if self.max_limit == 0 {
            bail!("max_limit must be at least 1");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FairnessConfig {
    pub window_hours: i64,
    /// Background refresh interval; 0 disables the job
    pub refresh_interval_secs: u64,
}

impl Default for FairnessConfig {
    fn default() -> Self {
        Self {
            window_hours: 24,
            refresh_interval_secs: 300,
        }
    }
}

impl FairnessConfig {
    pub fn window(&self) -> Duration {
        Duration::hours(self.window_hours)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.window_hours <= 0 {
            bail!("window_hours must be positive, got {}", self.window_hours);
        }
        Ok(())
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let ranking_defaults = RankingConfig::default();
        let fairness_defaults = FairnessConfig::default();

        let backend: StoreBackend = env_or("STORE_BACKEND", StoreBackend::Postgres)?;
        let url = env::var("DATABASE_URL").unwrap_or_default();
        if backend == StoreBackend::Postgres && url.is_empty() {
            bail!("DATABASE_URL must be set when STORE_BACKEND=postgres");
        }

        let config = Config {
            app: AppConfig {
                env: env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
                host: env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env_or("APP_PORT", 8012)?,
            },
            database: DatabaseConfig {
                backend,
                url,
                max_connections: env_or("DATABASE_MAX_CONNECTIONS", 10)?,
                min_connections: env_or("DATABASE_MIN_CONNECTIONS", 2)?,
                acquire_timeout_secs: env_or("DATABASE_ACQUIRE_TIMEOUT_SECS", 10)?,
            },
            ranking: RankingConfig {
                weight_tier: env_or("RANKING_WEIGHT_TIER", ranking_defaults.weight_tier)?,
                weight_recency: env_or("RANKING_WEIGHT_RECENCY", ranking_defaults.weight_recency)?,
                weight_fairness: env_or(
                    "RANKING_WEIGHT_FAIRNESS",
                    ranking_defaults.weight_fairness,
                )?,
                premium_tier_value: env_or(
                    "RANKING_PREMIUM_TIER_VALUE",
                    ranking_defaults.premium_tier_value,
                )?,
                featured_tier_value: env_or(
                    "RANKING_FEATURED_TIER_VALUE",
                    ranking_defaults.featured_tier_value,
                )?,
                recency_half_life_days: env_or(
                    "RANKING_RECENCY_HALF_LIFE_DAYS",
                    ranking_defaults.recency_half_life_days,
                )?,
                neutral_fairness: env_or(
                    "RANKING_NEUTRAL_FAIRNESS",
                    ranking_defaults.neutral_fairness,
                )?,
                max_limit: env_or("RANKING_MAX_LIMIT", ranking_defaults.max_limit)?,
            },
            fairness: FairnessConfig {
                window_hours: env_or("FAIRNESS_WINDOW_HOURS", fairness_defaults.window_hours)?,
                refresh_interval_secs: env_or(
                    "FAIRNESS_REFRESH_INTERVAL_SECS",
                    fairness_defaults.refresh_interval_secs,
                )?,
            },
        };

        config.ranking.validate().context("invalid ranking config")?;
        config.fairness.validate().context("invalid fairness config")?;

        Ok(config)
    }
}

fn env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} has an invalid value {:?}: {}", key, raw, e)),
        Err(_) => Ok(default),
    }
}
