use std::process;

use chrono::Utc;
use log::{error, info, warn};

use incident_map_server::{
    account_sys, build,
    config::Config,
    db::{MemoryStore, PgStore, Store},
    logger, AppState,
};


#[rocket::main]
async fn main() {
    if let Err(err) = dotenvy::dotenv() {
        if !err.not_found() {
            eprintln!("Failed to read .env: {}", err);
        }
    }

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Invalid configuration: {}", err);
            process::exit(1);
        },
    };

    let sentry_guard = config.sentry_dsn.as_deref().map(|dsn| {
        sentry::init((dsn, sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: Some(config.environment.clone().into()),
            ..Default::default()
        }))
    });
    if let Err(err) = logger::init(config.log_level, sentry_guard.is_some()) {
        eprintln!("Logger setup failed: {}", err);
    }

    let store: Box<dyn Store> = match &config.database_url {
        Some(url) => match PgStore::connect(url, config.db_pool_size) {
            Ok(store) => Box::new(store),
            Err(err) => {
                error!("Failed to connect to database: {}", err);
                process::exit(1);
            },
        },
        None => {
            warn!("DATABASE_URL is not set; using an in-memory store");
            Box::new(MemoryStore::new())
        },
    };

    let state = AppState::new(&config, store);
    if let Some(seed) = &config.bootstrap_admin {
        match account_sys::bootstrap_admin(&state, seed, Utc::now()) {
            Ok(true) => info!("Created admin account {}", seed.username),
            Ok(false) => {},
            Err(err) => warn!("Admin bootstrap failed: {}", err),
        }
    }

    info!("Incident map server ({}) listening on {}:{}",
        config.environment, config.address, config.port);

    if let Err(err) = build(&config, state).launch().await {
        error!("Server stopped: {}", err);
        process::exit(1);
    }
}
