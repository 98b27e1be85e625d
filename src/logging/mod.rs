/*!
 * Logging Module
 * Subscriber setup and request logging middleware
 */
pub mod middleware;

use std::io;
use std::path::PathBuf;
use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub environment: String,
    pub level: String,
    pub dir: PathBuf,
}

impl LogConfig {
    pub fn from_env() -> Self {
        let environment =
            std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
        let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| {
            if environment == "production" {
                "info".to_string()
            } else {
                "debug".to_string()
            }
        });
        let dir = std::env::var("LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("logs"));

        Self {
            environment,
            level,
            dir,
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Filter used when `RUST_LOG` is not set.
    pub fn default_directives(&self) -> String {
        format!(
            "vagali_backend={},tower_http=debug,axum=debug",
            self.level
        )
    }
}

/// Initialize the logging system.
///
/// The returned guards flush the background writers when dropped; hold them
/// until the process exits.
pub fn init(config: &LogConfig) -> Vec<WorkerGuard> {
    if let Err(e) = std::fs::create_dir_all(&config.dir) {
        eprintln!("could not create log directory {}: {}", config.dir.display(), e);
    }

    let (file_writer, file_guard) = non_blocking(rolling::daily(&config.dir, "app.log"));
    let (error_writer, error_guard) = non_blocking(rolling::daily(&config.dir, "error.log"));
    let (console_writer, console_guard) = non_blocking(io::stdout());

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_directives()));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    if config.is_production() {
        let file_layer = fmt::layer()
            .json()
            .with_writer(file_writer)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);

        let error_layer = fmt::layer()
            .json()
            .with_writer(error_writer)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_filter(tracing_subscriber::filter::LevelFilter::ERROR);

        let console_layer = fmt::layer()
            .json()
            .with_writer(console_writer)
            .with_target(false);

        subscriber
            .with(file_layer)
            .with(error_layer)
            .with(console_layer)
            .init();
    } else {
        let file_layer = fmt::layer()
            .with_writer(file_writer)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false);

        let error_layer = fmt::layer()
            .with_writer(error_writer)
            .with_target(true)
            .with_ansi(false)
            .with_filter(tracing_subscriber::filter::LevelFilter::ERROR);

        let console_layer = fmt::layer()
            .with_writer(console_writer)
            .with_target(true)
            .pretty();

        subscriber
            .with(file_layer)
            .with(error_layer)
            .with(console_layer)
            .init();
    }

    tracing::info!(
        environment = %config.environment,
        level = %config.level,
        dir = %config.dir.display(),
        "logging initialized"
    );

    vec![file_guard, error_guard, console_guard]
}
