use std::io;
use tracing::Level;
use tracing_appender::rolling;
use tracing_subscriber::filter::FilterFn;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::environment::get_env_var_or;

/// Default stderr filter, overridable through `RUST_LOG`.
const CONSOLE_FILTER: &str = "info,web_request=warn,source=info,batch=info,local_store=info";
const FILE_FILTER: &str = "debug,web_request=debug,hyper=info,reqwest=info";
const LOG_FILE: &str = "markcheck.log";

/// Console output on stderr plus a daily file under `MARKCHECK_LOG_DIR` (default `logs`).
pub fn configure_logging() {
    let log_dir: String = get_env_var_or("MARKCHECK_LOG_DIR", "logs".to_string());

    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(CONSOLE_FILTER));
    let console_log = fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .with_filter(console_filter)
        .with_filter(quiet_pool_warnings());

    let file_log = fmt::layer()
        .with_ansi(false)
        .with_writer(rolling::daily(log_dir, LOG_FILE))
        .with_filter(EnvFilter::new(FILE_FILTER));

    tracing_subscriber::Registry::default()
        .with(console_log)
        .with(file_log)
        .init();
}

// hyper_util connection pool warnings
fn quiet_pool_warnings() -> FilterFn<impl Fn(&tracing::Metadata<'_>) -> bool> {
    FilterFn::new(|metadata| {
        !(metadata.level() == &Level::WARN && metadata.target().starts_with("hyper_util"))
    })
}
