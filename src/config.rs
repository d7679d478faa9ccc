use crate::error::LotteryError;
use std::str::FromStr;

pub const DEFAULT_TRIALS: u32 = 5000;
pub const DEFAULT_PROGRESS_INTERVAL: u32 = 100;
pub const DEFAULT_DATABASE_URL: &str = "sqlite://lottery.db?mode=rwc";

/// 抽签引擎参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// 独立试验次数（seed 1..=trials）
    pub trials: u32,
    /// 每隔多少次试验写一次进度并让出执行权
    pub progress_interval: u32,
    /// 设置后每次试验使用 base + seed 作为 PRNG 种子，可复现；否则使用系统熵
    pub rng_seed: Option<u64>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            trials: DEFAULT_TRIALS,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            rng_seed: None,
        }
    }
}

impl EngineSettings {
    /// 读取 LOTTERY_TRIALS / LOTTERY_PROGRESS_INTERVAL / LOTTERY_RNG_SEED
    pub fn from_env() -> Result<Self, LotteryError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, LotteryError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let trials = parse_var(&lookup, "LOTTERY_TRIALS")?.unwrap_or(defaults.trials);
        let progress_interval = parse_var(&lookup, "LOTTERY_PROGRESS_INTERVAL")?
            .unwrap_or(defaults.progress_interval);
        let rng_seed = parse_var(&lookup, "LOTTERY_RNG_SEED")?;

        let settings = Self {
            trials,
            progress_interval,
            rng_seed,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), LotteryError> {
        if self.trials == 0 {
            return Err(LotteryError::InvalidConfig(
                "LOTTERY_TRIALS must be at least 1".to_string(),
            ));
        }
        if self.progress_interval == 0 {
            return Err(LotteryError::InvalidConfig(
                "LOTTERY_PROGRESS_INTERVAL must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct AppSettings {
    pub database_url: String,
    pub engine: EngineSettings,
}

impl AppSettings {
    pub fn from_env() -> Result<Self, LotteryError> {
        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
        Ok(Self {
            database_url,
            engine: EngineSettings::from_env()?,
        })
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>, LotteryError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| LotteryError::InvalidConfig(format!("{} = {:?} is not a number", key, raw))),
    }
}
