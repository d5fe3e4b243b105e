//! Logging infrastructure for tuplesift

use log::Level;
use std::sync::Once;

static INIT: Once = Once::new();

/// Initialize the tuplesift logging system
///
/// Call once at the start of the embedding application. The filter can be
/// overridden through `RUST_LOG`.
pub fn init() {
    INIT.call_once(|| {
        let mut builder = env_logger::Builder::new();

        builder
            .format(|buf, record| {
                use std::io::Write;

                let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f");
                let level = record.level();

                let level_str = match level {
                    Level::Error => "\x1b[31mERROR\x1b[0m",
                    Level::Warn => "\x1b[33mWARN\x1b[0m",
                    Level::Info => "\x1b[32mINFO\x1b[0m",
                    Level::Debug => "\x1b[36mDEBUG\x1b[0m",
                    Level::Trace => "\x1b[37mTRACE\x1b[0m",
                };

                writeln!(
                    buf,
                    "{} [{}] {}: {}",
                    timestamp,
                    level_str,
                    record.target(),
                    record.args()
                )
            })
            .filter_level(log::LevelFilter::Info)
            .parse_default_env()
            .init();

        log::info!("tuplesift logging initialized");
    });
}

/// Initialize logging with a specific level and no colors
pub fn init_with_level(level: log::LevelFilter) {
    INIT.call_once(|| {
        let mut builder = env_logger::Builder::new();

        builder
            .format(|buf, record| {
                use std::io::Write;

                let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f");
                writeln!(
                    buf,
                    "{} [{}] {}: {}",
                    timestamp,
                    record.level(),
                    record.target(),
                    record.args()
                )
            })
            .filter_level(level)
            .init();

        log::info!("tuplesift logging initialized with level: {level:?}");
    });
}

/// Log an error message under the tuplesift target
#[macro_export]
macro_rules! sift_error {
    ($($arg:tt)*) => {
        log::error!(target: "tuplesift", $($arg)*)
    };
}

/// Log a warning message under the tuplesift target
#[macro_export]
macro_rules! sift_warn {
    ($($arg:tt)*) => {
        log::warn!(target: "tuplesift", $($arg)*)
    };
}

/// Log an info message under the tuplesift target
#[macro_export]
macro_rules! sift_info {
    ($($arg:tt)*) => {
        log::info!(target: "tuplesift", $($arg)*)
    };
}

/// Log a debug message under the tuplesift target
#[macro_export]
macro_rules! sift_debug {
    ($($arg:tt)*) => {
        log::debug!(target: "tuplesift", $($arg)*)
    };
}

/// Log a trace message under the tuplesift target
#[macro_export]
macro_rules! sift_trace {
    ($($arg:tt)*) => {
        log::trace!(target: "tuplesift", $($arg)*)
    };
}

/// Scan timing helper
///
/// Logs the elapsed time at debug level when stopped and warns when a timed
/// operation ran longer than its threshold.
pub struct Timer {
    start: std::time::Instant,
    operation: String,
    slow_after: std::time::Duration,
}

impl Timer {
    /// Start timing an operation with the default one second threshold
    pub fn start<S: Into<String>>(operation: S) -> Self {
        Self::with_threshold(operation, std::time::Duration::from_secs(1))
    }

    /// Start timing an operation that is considered slow after `slow_after`
    pub fn with_threshold<S: Into<String>>(operation: S, slow_after: std::time::Duration) -> Self {
        let operation = operation.into();
        sift_trace!("starting {}", operation);
        Self {
            start: std::time::Instant::now(),
            operation,
            slow_after,
        }
    }

    /// Get elapsed time without stopping the timer
    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }

    /// Stop the timer and log the elapsed time
    pub fn stop(self) -> std::time::Duration {
        let elapsed = self.start.elapsed();
        sift_debug!("{} finished in {:?}", self.operation, elapsed);
        elapsed
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        if elapsed > self.slow_after {
            sift_warn!("slow operation '{}' took {:?}", self.operation, elapsed);
        }
    }
}
