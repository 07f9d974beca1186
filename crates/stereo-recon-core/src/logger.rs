//! Stderr logging for the pipeline binaries.
//!
//! Plain lines read `[  1.234s  WARN calib] message`: elapsed time, level
//! and the pipeline stage that emitted the record. With the `tracing`
//! feature the same level drives a `tracing-subscriber` filter instead.

use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use log::{LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::SubscriberInitExt;
#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt, EnvFilter};

/// Stage label of a record target: `stereo_recon_match::dense` logs as
/// `match`, the facade as `pipeline`, anything else by its crate name.
pub fn stage_label(target: &str) -> &str {
    let krate = target.split("::").next().unwrap_or(target);
    match krate.strip_prefix("stereo_recon") {
        Some("") => "pipeline",
        Some(rest) => rest.strip_prefix('_').unwrap_or(rest),
        None => krate,
    }
}

struct StageLogger {
    level: LevelFilter,
    started: Instant,
}

impl Log for StageLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!(
            "[{:8.3}s {:>5} {}] {}\n",
            self.started.elapsed().as_secs_f64(),
            record.level(),
            stage_label(record.target()),
            record.args()
        );
        // one write per record keeps lines from parallel stages whole
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: OnceLock<StageLogger> = OnceLock::new();

/// Install the stage logger at `level`. Later calls are no-ops.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_none() {
        let logger = LOGGER.get_or_init(|| StageLogger {
            level,
            started: Instant::now(),
        });
        log::set_logger(logger)?;
        log::set_max_level(level);
    }
    Ok(())
}

/// Install a `tracing` subscriber at `level`, as JSON lines or as text with
/// an uptime column. `RUST_LOG` overrides the level.
#[cfg(feature = "tracing")]
pub fn init_tracing(level: LevelFilter, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string().to_lowercase()));
    if json {
        let _ = fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .json()
            .flatten_event(true)
            .finish()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .with_timer(fmt::time::Uptime::default())
            .finish()
            .try_init();
    }
}
