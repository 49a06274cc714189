// src/config/mod.rs
// All tunables load from the environment (.env supported), with inline defaults.

use once_cell::sync::Lazy;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct CaseChatConfig {
    // ── Database Configuration
    pub database_url: String,
    pub sqlite_max_connections: u32,

    // ── Server Configuration
    pub host: String,
    pub port: u16,

    // ── Abandonment Sweep
    pub sweep_interval_secs: u64,
    pub abandon_after_minutes: i64,

    // ── Provider Retry
    pub retry_delay_secs: u64,

    // ── Provider Credentials / Endpoints
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub anthropic_api_key: String,
    pub anthropic_base_url: String,
    pub gemini_api_key: String,
    pub gemini_base_url: String,
    pub provider_timeout_secs: u64,

    // ── Position Inference
    pub inference_model: String,

    // ── Logging Configuration
    pub log_level: String,
}

fn env_var_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    match std::env::var(key) {
        Ok(val) => {
            // Trim whitespace and strip trailing comments before parsing
            let clean_val = val.split('#').next().unwrap_or("").trim();
            match clean_val.parse::<T>() {
                Ok(parsed) => parsed,
                Err(_) => {
                    eprintln!("Config: {} = '{}' (parse failed, using default)", key, val);
                    default
                }
            }
        }
        Err(_) => default,
    }
}

impl CaseChatConfig {
    pub fn from_env() -> Self {
        if dotenvy::dotenv().is_err() {
            eprintln!("Warning: .env file not found. Using environment variables and defaults.");
        }

        Self {
            database_url: env_var_or("DATABASE_URL", "sqlite:./casechat.db".to_string()),
            sqlite_max_connections: env_var_or("SQLITE_MAX_CONNECTIONS", 10),
            host: env_var_or("CASECHAT_HOST", "0.0.0.0".to_string()),
            port: env_var_or("CASECHAT_PORT", 3001),
            sweep_interval_secs: env_var_or("CASECHAT_SWEEP_INTERVAL_SECS", 900),
            abandon_after_minutes: env_var_or("CASECHAT_ABANDON_AFTER_MINUTES", 60),
            retry_delay_secs: env_var_or("CASECHAT_RETRY_DELAY_SECS", 25),
            openai_api_key: env_var_or("OPENAI_API_KEY", String::new()),
            openai_base_url: env_var_or("OPENAI_BASE_URL", "https://api.openai.com".to_string()),
            anthropic_api_key: env_var_or("ANTHROPIC_API_KEY", String::new()),
            anthropic_base_url: env_var_or(
                "ANTHROPIC_BASE_URL",
                "https://api.anthropic.com".to_string(),
            ),
            gemini_api_key: env_var_or("GEMINI_API_KEY", String::new()),
            gemini_base_url: env_var_or(
                "GEMINI_BASE_URL",
                "https://generativelanguage.googleapis.com".to_string(),
            ),
            provider_timeout_secs: env_var_or("CASECHAT_PROVIDER_TIMEOUT_SECS", 120),
            inference_model: env_var_or("CASECHAT_INFERENCE_MODEL", "gpt-4o-mini".to_string()),
            log_level: env_var_or("CASECHAT_LOG_LEVEL", "info".to_string()),
        }
    }

    /// Get server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Abandonment cutoff, in seconds of inactivity
    pub fn abandon_after_secs(&self) -> i64 {
        self.abandon_after_minutes * 60
    }
}

// Global config instance - loaded once at startup
pub static CONFIG: Lazy<CaseChatConfig> = Lazy::new(CaseChatConfig::from_env);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = CaseChatConfig::from_env();

        assert_eq!(config.retry_delay_secs, 25);
        assert_eq!(config.abandon_after_minutes, 60);
        assert_eq!(config.sweep_interval_secs, 900);
    }

    #[test]
    fn test_bind_address() {
        let config = CaseChatConfig::from_env();
        assert!(config.bind_address().contains(':'));
    }

    #[test]
    fn test_abandon_cutoff_in_seconds() {
        let config = CaseChatConfig::from_env();
        assert_eq!(config.abandon_after_secs(), config.abandon_after_minutes * 60);
    }
}
