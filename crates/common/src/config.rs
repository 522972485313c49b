use crate::TradingMode;

/// All configuration loaded from environment variables at startup.
/// Missing required variables cause an immediate panic with a clear
/// message. Per-pair trading parameters live in the `settings` table,
/// not here.
#[derive(Debug, Clone)]
pub struct Config {
    // Database
    pub database_url: String,

    // Trading
    pub trading_mode: TradingMode,

    /// Price paper fills default to when no price was set for a symbol.
    pub paper_fill_price: f64,
    /// Number of status checks before a paper order reports filled.
    pub paper_fill_checks: u32,
}

impl Config {
    /// Load all configuration from environment variables.
    /// Loads `.env` if present. Panics on any missing required variable.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // ignore error if .env not present

        let trading_mode = match required_env("TRADING_MODE").to_lowercase().as_str() {
            "paper" => TradingMode::Paper,
            "live" => TradingMode::Live,
            other => panic!("ERROR: TRADING_MODE must be 'paper' or 'live', got: '{other}'"),
        };

        Config {
            database_url: required_env("DATABASE_URL"),
            trading_mode,
            paper_fill_price: optional_env("PAPER_FILL_PRICE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(1.0),
            paper_fill_checks: optional_env("PAPER_FILL_CHECKS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(1),
        }
    }
}

fn required_env(key: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| {
        panic!("Required environment variable '{key}' is not set. Check your .env file.")
    })
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}
