#[macro_use] extern crate rocket;


pub mod config;
pub mod logger;
pub mod util;
pub mod db;
pub mod token_sys;
pub mod guard;
pub mod api_error;
pub mod cors;
pub mod moderation_sys;
pub mod account_sys;
pub mod user_route;
pub mod admin_route;
pub mod incident_route;
pub mod client;


use chrono::{Duration, Utc};
use log::{info, LevelFilter};
use rocket::{
    fairing::AdHoc,
    serde::json::{json, Json, Value},
    Build, Rocket,
};

use crate::config::Config;
use crate::cors::Cors;
use crate::db::Store;
use crate::token_sys::TokenService;


/// Everything a request handler needs, managed by Rocket.
pub struct AppState {
    pub store: Box<dyn Store>,
    pub tokens: TokenService,
    pub bcrypt_cost: u32,
    /// Include internal error details in 500 responses.
    pub expose_errors: bool,
}

impl AppState {
    pub fn new(config: &Config, store: Box<dyn Store>) -> Self {
        AppState {
            store,
            tokens: TokenService::new(&config.jwt_secret, Duration::hours(config.token_ttl_hours)),
            bcrypt_cost: config.bcrypt_cost,
            expose_errors: config.is_development(),
        }
    }
}


#[get("/health")]
fn health() -> Json<Value> {
    Json(json!({
        "success": true,
        "message": "Server is running",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}


/// Rocket's own records reach the installed `log` logger; this keeps its
/// verbosity in step with `LOG_LEVEL`.
fn rocket_log_level(level: LevelFilter) -> &'static str {
    match level {
        LevelFilter::Off => "off",
        LevelFilter::Error => "critical",
        LevelFilter::Warn | LevelFilter::Info => "normal",
        LevelFilter::Debug | LevelFilter::Trace => "debug",
    }
}

pub fn build(config: &Config, state: AppState) -> Rocket<Build> {
    let figment = rocket::Config::figment()
        .merge(("address", config.address))
        .merge(("port", config.port))
        .merge(("log_level", rocket_log_level(config.log_level)));

    rocket::custom(figment)
        .manage(state)
        .attach(Cors::new(config.cors_origins.clone()))
        .attach(AdHoc::on_request("Request log", |req, _| Box::pin(async move {
            info!("{} {}", req.method(), req.uri().path());
        })))
        .mount("/", routes![health, cors::preflight])
        .mount("/api", routes![
            user_route::post_register,
            user_route::post_login,
            user_route::get_profile,
        ])
        .mount("/api", routes![
            admin_route::post_login,
            admin_route::get_profile,
            admin_route::get_stats,
        ])
        .mount("/api", routes![
            incident_route::post_incident,
            incident_route::get_incidents,
            incident_route::get_incident,
            incident_route::put_incident,
            incident_route::delete_incident,
            incident_route::get_markers,
        ])
        .register("/", catchers![api_error::default_catcher])
}


#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::db::MemoryStore;

    const TEST_COST: u32 = 4;

    pub fn test_config() -> Config {
        Config {
            jwt_secret: "test-secret".into(),
            bcrypt_cost: TEST_COST,
            ..Config::default()
        }
    }

    pub fn state_with_memory_store() -> AppState {
        AppState::new(&test_config(), Box::new(MemoryStore::new()))
    }
}
