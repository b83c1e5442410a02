use std::path::PathBuf;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub log_dir: Option<PathBuf>,
    pub console_enabled: bool,
    pub file_enabled: bool,
    pub json_format: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            console_enabled: true,
            file_enabled: false,
            json_format: false,
        }
    }
}

impl LogConfig {
    pub fn development() -> Self {
        Self::default()
    }

    pub fn production(log_dir: PathBuf) -> Self {
        Self {
            log_dir: Some(log_dir),
            console_enabled: false,
            file_enabled: true,
            json_format: true,
        }
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(
            "calldeck=debug,\
             calldeck::store=info,\
             calldeck::services=debug",
        )
    })
}

pub fn init_logging(config: LogConfig) {
    let registry = tracing_subscriber::registry();

    let console_layer = config.console_enabled.then(|| {
        fmt::layer()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(env_filter())
    });

    let file_layer = config
        .log_dir
        .filter(|_| config.file_enabled)
        .map(|log_dir| {
            std::fs::create_dir_all(&log_dir).expect("Failed to create log directory");

            let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, "calldeck.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            LOG_GUARD.set(guard).ok();

            if config.json_format {
                fmt::layer()
                    .json()
                    .with_writer(non_blocking)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_filter(env_filter())
                    .boxed()
            } else {
                fmt::layer()
                    .with_writer(non_blocking)
                    .with_target(true)
                    .with_ansi(false)
                    .with_filter(env_filter())
                    .boxed()
            }
        });

    registry.with(console_layer).with(file_layer).init();
}
