// src/config.rs

use std::env;
use std::str::FromStr;
use dotenvy::dotenv;

/// SMTP relay settings. Absent when mail should only be logged.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    /// Token lifetime in seconds.
    pub jwt_expiration: u64,
    pub rust_log: String,
    pub bind_addr: String,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
    pub admin_email: Option<String>,
    /// Failed logins tolerated inside the lockout window.
    pub login_max_attempts: i64,
    pub login_lockout_seconds: i64,
    pub reset_code_ttl_seconds: i64,
    pub reset_token_ttl_seconds: i64,
    pub smtp: Option<SmtpConfig>,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set");

        let jwt_secret = env::var("JWT_SECRET")
            .expect("JWT_SECRET must be set");

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        let smtp = env::var("SMTP_HOST").ok().map(|host| SmtpConfig {
            host,
            port: parse_or("SMTP_PORT", 587),
            username: env::var("SMTP_USERNAME").unwrap_or_default(),
            password: env::var("SMTP_PASSWORD").unwrap_or_default(),
            from: env::var("SMTP_FROM").unwrap_or_else(|_| "Fithub <no-reply@fithub.local>".to_string()),
        });

        Self {
            database_url,
            jwt_secret,
            jwt_expiration: parse_or("JWT_EXPIRATION", 86_400),
            rust_log,
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            admin_username: env::var("ADMIN_USERNAME").ok(),
            admin_password: env::var("ADMIN_PASSWORD").ok(),
            admin_email: env::var("ADMIN_EMAIL").ok(),
            login_max_attempts: parse_or("LOGIN_MAX_ATTEMPTS", 5),
            login_lockout_seconds: parse_or("LOGIN_LOCKOUT_SECONDS", 900),
            reset_code_ttl_seconds: parse_or("RESET_CODE_TTL_SECONDS", 600),
            reset_token_ttl_seconds: parse_or("RESET_TOKEN_TTL_SECONDS", 900),
            smtp,
        }
    }
}

/// Reads an env var and parses it, falling back when unset or malformed.
fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring malformed {}={:?}", key, raw);
            default
        }),
        Err(_) => default,
    }
}
