use std::{env, time::Duration};

use secrecy::{ExposeSecret, SecretString};

use crate::{
    errors::{AppError, AppResult},
    services::{progression_gate::CooldownPolicy, GenerationSettings},
};

const DEFAULT_JWT_SECRET: &str = "dev_secret_key_change_in_production";

#[derive(Clone, Debug)]
pub struct Config {
    pub mongo_conn_string: String,
    pub mongo_db_name: String,
    pub web_server_host: String,
    pub web_server_port: u16,
    pub jwt_secret: SecretString,
    pub jwt_expiration_hours: i64,
    pub openai_api_key: Option<SecretString>,
    pub openai_model: String,
    pub generation_timeout_secs: u64,
    pub generation_max_retries: u32,
    pub premium_level_threshold: u32,
    pub cooldown_category_minutes: Vec<i64>,
    pub cooldown_level_minutes: Vec<i64>,
    pub cooldown_boss_minutes: Vec<i64>,
}

fn parsed_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Parses a comma separated list of minutes, e.g. `"10,30,60"`. Returns
/// `None` when the list is empty or any entry is not a non-negative integer.
pub fn parse_minutes_ladder(raw: &str) -> Option<Vec<i64>> {
    let ladder: Option<Vec<i64>> = raw
        .split(',')
        .map(|part| part.trim().parse::<i64>().ok().filter(|m| *m >= 0))
        .collect();
    ladder.filter(|l| !l.is_empty())
}

fn ladder_or(key: &str, default: &[i64]) -> Vec<i64> {
    match env::var(key) {
        Ok(raw) => parse_minutes_ladder(&raw).unwrap_or_else(|| {
            log::warn!("Ignoring malformed {}={:?}, using {:?}", key, raw, default);
            default.to_vec()
        }),
        Err(_) => default.to_vec(),
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            mongo_conn_string: env::var("MONGO_CONN_STRING")
                .unwrap_or_else(|_| "mongodb://localhost:27017".to_string()),
            mongo_db_name: env::var("MONGO_DB_NAME").unwrap_or_else(|_| "mastery-local".to_string()),
            web_server_host: env::var("WEB_SERVER_HOST")
                .unwrap_or_else(|_| "localhost".to_string()),
            web_server_port: parsed_or("WEB_SERVER_PORT", 8080),
            jwt_secret: SecretString::from(
                env::var("JWT_SECRET").unwrap_or_else(|_| DEFAULT_JWT_SECRET.to_string()),
            ),
            jwt_expiration_hours: parsed_or("JWT_EXPIRATION_HOURS", 24),
            openai_api_key: env::var("OPENAI_API_KEY")
                .ok()
                .filter(|k| !k.is_empty())
                .map(SecretString::from),
            openai_model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            generation_timeout_secs: parsed_or("GENERATION_TIMEOUT_SECS", 90),
            generation_max_retries: parsed_or("GENERATION_MAX_RETRIES", 2),
            premium_level_threshold: parsed_or("PREMIUM_LEVEL_THRESHOLD", 10),
            cooldown_category_minutes: ladder_or("COOLDOWN_CATEGORY_MINUTES", &[10, 30, 60]),
            cooldown_level_minutes: ladder_or("COOLDOWN_LEVEL_MINUTES", &[30, 120]),
            cooldown_boss_minutes: ladder_or("COOLDOWN_BOSS_MINUTES", &[30, 720, 1440]),
        }
    }

    /// Rejects configuration that must never reach production.
    pub fn validate_for_production(&self) -> AppResult<()> {
        let jwt_secret = self.jwt_secret.expose_secret();

        if jwt_secret == DEFAULT_JWT_SECRET {
            return Err(AppError::InternalError(
                "JWT_SECRET is using the default value".to_string(),
            ));
        }

        if jwt_secret.len() < 32 {
            return Err(AppError::InternalError(format!(
                "JWT_SECRET is too short ({}). Must be at least 32 characters",
                jwt_secret.len()
            )));
        }

        if self.openai_api_key.is_none() {
            return Err(AppError::InternalError(
                "OPENAI_API_KEY is not set".to_string(),
            ));
        }

        Ok(())
    }

    pub fn cooldown_policy(&self) -> CooldownPolicy {
        let minutes = |ladder: &[i64]| -> Vec<chrono::Duration> {
            ladder.iter().map(|m| chrono::Duration::minutes(*m)).collect()
        };
        CooldownPolicy {
            category: minutes(&self.cooldown_category_minutes),
            level: minutes(&self.cooldown_level_minutes),
            boss: minutes(&self.cooldown_boss_minutes),
        }
    }

    pub fn generation_settings(&self) -> GenerationSettings {
        GenerationSettings {
            timeout: Duration::from_secs(self.generation_timeout_secs),
            max_retries: self.generation_max_retries,
        }
    }

    #[cfg(test)]
    pub fn test_config() -> Self {
        Self {
            mongo_conn_string: "mongodb://localhost:27017".to_string(),
            mongo_db_name: "mastery-test".to_string(),
            web_server_host: "127.0.0.1".to_string(),
            web_server_port: 8080,
            jwt_secret: SecretString::from("test_jwt_secret_key".to_string()),
            jwt_expiration_hours: 1,
            openai_api_key: None,
            openai_model: "gpt-4o-mini".to_string(),
            generation_timeout_secs: 90,
            generation_max_retries: 2,
            premium_level_threshold: 10,
            cooldown_category_minutes: vec![10, 30, 60],
            cooldown_level_minutes: vec![30, 120],
            cooldown_boss_minutes: vec![30, 720, 1440],
        }
    }
}
