use std::fs;

use serde::Deserialize;
use server_api::MAX_RETENTION_DAYS;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Settings {
    pub server_bind: String,
    pub history_retention_days: i64,
    pub seed_prices: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:5000".into(),
            history_retention_days: server_api::DEFAULT_RETENTION_DAYS,
            seed_prices: true,
        }
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("server.toml") {
        apply_file(&mut settings, &raw);
    }
    apply_env(&mut settings, |key| std::env::var(key).ok());

    settings
}

fn apply_file(settings: &mut Settings, raw: &str) {
    let file_cfg = match raw.parse::<toml::Table>() {
        Ok(file_cfg) => file_cfg,
        Err(error) => {
            warn!(%error, "ignoring unreadable server.toml");
            return;
        }
    };

    if let Some(v) = file_cfg.get("bind_addr") {
        match v.as_str() {
            Some(bind) => settings.server_bind = bind.to_string(),
            None => warn!(value = %v, "bind_addr must be a string"),
        }
    }
    if let Some(v) = file_cfg.get("history_retention_days") {
        match v {
            toml::Value::Integer(days) => set_retention(settings, *days),
            toml::Value::String(raw) => parse_retention(settings, raw),
            other => warn!(value = %other, "history_retention_days must be an integer"),
        }
    }
    if let Some(v) = file_cfg.get("seed_prices") {
        match v {
            toml::Value::Boolean(seed) => settings.seed_prices = *seed,
            toml::Value::String(raw) => parse_seed(settings, raw),
            other => warn!(value = %other, "seed_prices must be true or false"),
        }
    }
}

fn apply_env(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Some(v) = lookup("APP__BIND_ADDR") {
        settings.server_bind = v;
    }

    if let Some(v) = lookup("APP__HISTORY_RETENTION_DAYS") {
        parse_retention(settings, &v);
    }

    if let Some(v) = lookup("APP__SEED_PRICES") {
        parse_seed(settings, &v);
    }
}

fn parse_retention(settings: &mut Settings, raw: &str) {
    match raw.trim().parse::<i64>() {
        Ok(days) => set_retention(settings, days),
        Err(_) => warn!(value = raw, "history_retention_days must be an integer"),
    }
}

fn set_retention(settings: &mut Settings, days: i64) {
    if (1..=MAX_RETENTION_DAYS).contains(&days) {
        settings.history_retention_days = days;
    } else {
        warn!(
            days,
            max = MAX_RETENTION_DAYS,
            "history_retention_days out of range; keeping previous value"
        );
    }
}

fn parse_seed(settings: &mut Settings, raw: &str) {
    match raw.trim().parse::<bool>() {
        Ok(seed) => settings.seed_prices = seed,
        Err(_) => warn!(value = raw, "seed_prices must be true or false"),
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
