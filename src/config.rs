//! Configuration loading from TOML.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs. The
//! admin roster and the reset challenge phrases live here so promoting an
//! operator never needs a code change.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub game: GameConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GameConfig {
    /// Balance every account starts (and resets) with.
    #[serde(default = "default_starting_balance")]
    pub starting_balance: u64,
    /// Data file path; defaults to the store's own default when absent.
    #[serde(default)]
    pub data_file: Option<String>,
    /// Identities that sign up as administrators.
    #[serde(default)]
    pub admins: Vec<AdminIdentity>,
    /// Challenge phrases for the full reset confirmation.
    #[serde(default = "default_reset_codes")]
    pub reset_codes: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AdminIdentity {
    pub name: String,
    pub number: u16,
}

impl GameConfig {
    pub fn starting_balance(&self) -> Decimal {
        Decimal::from(self.starting_balance)
    }

    /// Whether `(name, number)` is on the admin roster. `number` arrives as
    /// the raw request string.
    pub fn is_admin(&self, name: &str, number: &str) -> bool {
        let Ok(number) = number.parse::<u16>() else {
            return false;
        };
        self.admins.iter().any(|a| a.name == name && a.number == number)
    }
}

fn default_starting_balance() -> u64 {
    5000
}

fn default_reset_codes() -> Vec<String> {
    [
        "신앙은 덧없는 인간을 위하여",
        "달까지 닿아라 불사의 연기",
        "죽은 왕녀를 위한 셉텟",
        "감정의 마천루",
        "네크로판타지아",
        "풍신소녀",
        "동쪽 나라의 잠들지 않는 밤",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }
}
