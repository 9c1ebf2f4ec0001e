use std::sync::OnceLock;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::AppPaths;

const LOG_FILE: &str = "server.log";
const DEFAULT_FILTER: &str = "info,tower_http=debug";
/// Days of rotated logs kept next to the current one.
const KEEP_LOG_FILES: usize = 14;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// `KBQA_LOG` wins over `RUST_LOG`; blank values fall through.
fn filter_directives(app: Option<String>, rust: Option<String>) -> String {
    app.into_iter()
        .chain(rust)
        .find(|d| !d.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}

fn env_filter() -> EnvFilter {
    let directives = filter_directives(
        std::env::var("KBQA_LOG").ok(),
        std::env::var("RUST_LOG").ok(),
    );
    EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Console plus `logs/server.log`, rotated daily.
pub fn init(paths: &AppPaths) -> anyhow::Result<()> {
    std::fs::create_dir_all(&paths.log_dir)
        .with_context(|| format!("Failed to create {}", paths.log_dir.display()))?;
    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE)
        .max_log_files(KEEP_LOG_FILES)
        .build(&paths.log_dir)
        .context("Failed to open the log file")?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_ansi(false)
        .with_writer(non_blocking);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install the log subscriber")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directives_precedence() {
        assert_eq!(filter_directives(None, None), DEFAULT_FILTER);
        assert_eq!(filter_directives(None, Some("warn".into())), "warn");
        assert_eq!(
            filter_directives(Some("kb_qa_lib=debug".into()), Some("warn".into())),
            "kb_qa_lib=debug"
        );
        assert_eq!(filter_directives(Some("  ".into()), Some("warn".into())), "warn");
    }

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }
}
