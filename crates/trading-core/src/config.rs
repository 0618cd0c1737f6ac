use anyhow::{bail, Context, Result};
use core_types::PersonaMode;
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use std::env;
use std::str::FromStr;

/// Application-wide configuration, loaded once in the composition root and
/// handed to every component by value or `Arc` clone (§A2). Every field has
/// a documented default, overridable by an environment variable.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub persona_mode: PersonaMode,

    pub max_position_pct: Decimal,
    pub portfolio_risk_cap: Decimal,
    pub position_count_cap: u32,
    pub dedup_window_min: i64,
    pub min_signal_confidence: f64,

    pub llm_rate_limit_per_min: u32,
    pub agent_timeout_s: u64,
    pub deliberation_timeout_s: u64,

    pub nia_window_days: i64,
    pub nia_min_sample: usize,
    pub nia_daily_delta_cap: f64,

    pub blacklist: BTreeSet<String>,
    pub tradeable_keywords: Vec<String>,

    pub shadow_initial_capital: Decimal,
    pub database_url: String,

    pub claim_limit: u32,
    pub cycle_deadline_s: u64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let config = Self {
            persona_mode: parse_persona(&env_or("PERSONA_MODE", "TRADING"))?,

            max_position_pct: parse_dec("MAX_POSITION_PCT", "0.30")?,
            portfolio_risk_cap: parse_dec("PORTFOLIO_RISK_CAP", "0.05")?,
            position_count_cap: parse_num("POSITION_COUNT_CAP", "20")?,
            dedup_window_min: parse_num("DEDUP_WINDOW_MIN", "30")?,
            min_signal_confidence: parse_num("MIN_SIGNAL_CONFIDENCE", "0.60")?,

            llm_rate_limit_per_min: parse_num("LLM_RATE_LIMIT_PER_MIN", "10")?,
            agent_timeout_s: parse_num("AGENT_TIMEOUT_S", "8")?,
            deliberation_timeout_s: parse_num("DELIBERATION_TIMEOUT_S", "12")?,

            nia_window_days: parse_num("NIA_WINDOW_DAYS", "30")?,
            nia_min_sample: parse_num("NIA_MIN_SAMPLE", "50")?,
            nia_daily_delta_cap: parse_num("NIA_DAILY_DELTA_CAP", "0.05")?,

            blacklist: env::var("BLACKLIST")
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect(),
            tradeable_keywords: env::var("TRADEABLE_KEYWORDS")
                .ok()
                .map(|v| v.split(',').map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty()).collect())
                .unwrap_or_else(|| news_poller::poller::DEFAULT_KEYWORDS.iter().map(|s| s.to_string()).collect()),

            shadow_initial_capital: parse_dec("SHADOW_INITIAL_CAPITAL", "100000")?,
            database_url: env_or("DATABASE_URL", "sqlite:trading-core.db"),

            claim_limit: parse_num("SIGNAL_CLAIM_LIMIT", "10")?,
            cycle_deadline_s: parse_num("SIGNAL_CYCLE_DEADLINE_S", "60")?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !(Decimal::ZERO..=Decimal::ONE).contains(&self.max_position_pct) {
            bail!("MAX_POSITION_PCT must be in [0, 1], got {}", self.max_position_pct);
        }
        if !(Decimal::ZERO..=Decimal::ONE).contains(&self.portfolio_risk_cap) {
            bail!("PORTFOLIO_RISK_CAP must be in [0, 1], got {}", self.portfolio_risk_cap);
        }
        if !(0.0..=1.0).contains(&self.min_signal_confidence) {
            bail!("MIN_SIGNAL_CONFIDENCE must be in [0, 1], got {}", self.min_signal_confidence);
        }
        if self.nia_daily_delta_cap <= 0.0 || self.nia_daily_delta_cap > 1.0 {
            bail!("NIA_DAILY_DELTA_CAP must be in (0, 1], got {}", self.nia_daily_delta_cap);
        }
        if self.position_count_cap == 0 {
            bail!("POSITION_COUNT_CAP must be positive");
        }
        if self.shadow_initial_capital <= Decimal::ZERO {
            bail!("SHADOW_INITIAL_CAPITAL must be positive");
        }
        Ok(())
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_num<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    env_or(key, default).parse::<T>().map_err(|e| anyhow::anyhow!("{key}: {e}")).context(format!("parsing {key}"))
}

fn parse_dec(key: &str, default: &str) -> Result<Decimal> {
    Decimal::from_str(&env_or(key, default)).with_context(|| format!("parsing {key}"))
}

fn parse_persona(raw: &str) -> Result<PersonaMode> {
    match raw.to_uppercase().as_str() {
        "AGGRESSIVE" => Ok(PersonaMode::Aggressive),
        "TRADING" => Ok(PersonaMode::Trading),
        "LONG_TERM" => Ok(PersonaMode::LongTerm),
        "DIVIDEND" => Ok(PersonaMode::Dividend),
        other => bail!("unknown PERSONA_MODE: {other}"),
    }
}
