use chrono::Utc;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};


pub struct Logger {
    level: LevelFilter,
}

impl Logger {
    pub fn new(level: LevelFilter) -> Self {
        Logger { level }
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            println!("{} [{}] {} - {}",
                Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"),
                record.target(), record.level(), record.args());
        }
    }

    fn flush(&self) {}
}


/// Installs the console logger, forwarding errors to Sentry when a client is bound.
pub fn init(level: LevelFilter, with_sentry: bool) -> Result<(), SetLoggerError> {
    let console = Logger::new(level);

    if with_sentry {
        log::set_boxed_logger(Box::new(sentry_log::SentryLogger::with_dest(console)))?;
    }
    else {
        log::set_boxed_logger(Box::new(console))?;
    }
    log::set_max_level(level);

    Ok(())
}
