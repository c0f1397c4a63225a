use std::{env, net::IpAddr};

use log::{warn, LevelFilter};

use crate::token_sys::DEFAULT_TOKEN_TTL_HOURS;
use crate::util;


const DEBUG_ENVS: [&str; 4] = ["dev", "development", "staging", "stage"];
const DEFAULT_CORS_ORIGIN: &str = "http://localhost:8080";
const ALWAYS_ALLOWED_ORIGINS: [&str; 2] = ["http://localhost:5500", "http://127.0.0.1:5500"];
pub const DEFAULT_BCRYPT_COST: u32 = 10;


#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}


#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapAdmin {
    pub username: String,
    pub password: String,
    pub email: String,
}


#[derive(Debug, Clone)]
pub struct Config {
    pub environment: String,
    pub address: IpAddr,
    pub port: u16,
    pub database_url: Option<String>,
    pub db_pool_size: u32,
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    pub bcrypt_cost: u32,
    pub cors_origins: Vec<String>,
    pub log_level: LevelFilter,
    pub sentry_dsn: Option<String>,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            environment: "development".into(),
            address: IpAddr::from([0, 0, 0, 0]),
            port: 3000,
            database_url: None,
            db_pool_size: 10,
            jwt_secret: util::generate_rand_id(64),
            token_ttl_hours: DEFAULT_TOKEN_TTL_HOURS,
            bcrypt_cost: DEFAULT_BCRYPT_COST,
            cors_origins: cors_origins(DEFAULT_CORS_ORIGIN),
            log_level: LevelFilter::Info,
            sentry_dsn: None,
            bootstrap_admin: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = env::var("APP_ENV")
            .unwrap_or_else(|_| {
                if cfg!(debug_assertions) {
                    "development".into()
                }
                else {
                    "production".into()
                }
            });
        let development = is_development(&environment);

        let database_url = non_empty_var("DATABASE_URL");
        if database_url.is_none() && !development {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let jwt_secret = match non_empty_var("JWT_SECRET") {
            Some(secret) => secret,
            None if development => {
                warn!("JWT_SECRET is not set; tokens will not survive a restart");
                util::generate_rand_id(64)
            },
            None => return Err(ConfigError::Missing("JWT_SECRET")),
        };

        let bootstrap_admin = match (
            non_empty_var("BOOTSTRAP_ADMIN_USERNAME"),
            non_empty_var("BOOTSTRAP_ADMIN_PASSWORD"),
        ) {
            (Some(username), Some(password)) => Some(BootstrapAdmin {
                email: non_empty_var("BOOTSTRAP_ADMIN_EMAIL")
                    .unwrap_or_else(|| format!("{}@localhost", username)),
                username,
                password,
            }),
            _ => None,
        };

        Ok(Config {
            address: parse_var("ADDRESS", IpAddr::from([0, 0, 0, 0]))?,
            port: parse_var("PORT", 3000)?,
            database_url,
            db_pool_size: parse_var("DB_POOL_SIZE", 10)?,
            jwt_secret,
            token_ttl_hours: parse_var("TOKEN_TTL_HOURS", DEFAULT_TOKEN_TTL_HOURS)?,
            bcrypt_cost: parse_var("BCRYPT_COST", DEFAULT_BCRYPT_COST)?,
            cors_origins: cors_origins(
                &non_empty_var("CORS_ORIGIN").unwrap_or_else(|| DEFAULT_CORS_ORIGIN.into())),
            log_level: parse_var("LOG_LEVEL", LevelFilter::Info)?,
            sentry_dsn: non_empty_var("SENTRY_DSN"),
            bootstrap_admin,
            environment,
        })
    }

    pub fn is_development(&self) -> bool {
        is_development(&self.environment)
    }
}


fn is_development(environment: &str) -> bool {
    DEBUG_ENVS.iter().any(|&v| v == environment)
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match non_empty_var(name) {
        Some(value) => value.parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

fn cors_origins(configured: &str) -> Vec<String> {
    let mut origins = configured.split(',')
        .map(|o| o.trim().trim_end_matches('/').to_owned())
        .filter(|o| !o.is_empty())
        .collect::<Vec<_>>();

    for origin in ALWAYS_ALLOWED_ORIGINS.iter() {
        if !origins.iter().any(|o| o == origin) {
            origins.push((*origin).to_owned());
        }
    }

    origins
}
