//! Logger that accumulates formatted messages in a vector buffer, so that tests can assert on
//! what was logged.
//!
//! # Examples
//!
//! Calling [`LoggerBuilder::init`] more than once is a no-op, so every test can initialize the
//! logger it needs.
//! ```
//! # use testing::logger;
//! # fn main() -> anyhow::Result<()> {
//! logger::LoggerBuilder::default()
//!     .level(log::LevelFilter::Info)
//!     .init()?;
//! log::info!("Info message");
//! log::debug!("Debug message");
//! log::warn!("Warn message");
//! assert_eq!(
//!     logger::clear()?,
//!     vec![
//!         String::from("[INFO]  Info message"),
//!         String::from("[WARN]  Warn message"),
//!     ]
//! );
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, RwLock};

use anyhow::anyhow;
use log::LevelFilter;

lazy_static::lazy_static! {
    static ref LOG_BUFFER: Arc<RwLock<Vec<String>>> = Arc::new(RwLock::new(Vec::new()));
    static ref BUFFER_INITIALIZED: Arc<RwLock<bool>> = Arc::new(RwLock::new(false));
}

/// Builds a vector logger.
pub struct LoggerBuilder {
    level: LevelFilter,
    target: Option<String>,
}

impl Default for LoggerBuilder {
    fn default() -> Self {
        Self {
            level: LevelFilter::Warn,
            target: None,
        }
    }
}

impl LoggerBuilder {
    /// Sets level filter.
    #[must_use]
    pub fn level(mut self, level: LevelFilter) -> Self {
        self.level = level;
        self
    }

    /// Only keeps messages whose target starts with `target`.
    #[must_use]
    pub fn target<S: Into<String>>(mut self, target: S) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Initializes the vector logger, unless it has already been initialized.
    ///
    /// # Errors
    ///
    /// Fails if another logger has already been installed.
    pub fn init(self) -> anyhow::Result<()> {
        let mut initialized = BUFFER_INITIALIZED
            .write()
            .map_err(|err| anyhow!("{:?}", err))?;
        if !*initialized {
            let buffer = Arc::clone(&LOG_BUFFER);
            let mut dispatch = fern::Dispatch::new()
                .level(self.level)
                .chain(fern::Output::call(move |record| {
                    buffer.write().expect("Poisoned lock").push(format!(
                        "{:7} {}",
                        format!("[{}]", record.level()),
                        record.args()
                    ));
                }));
            if let Some(target) = self.target {
                dispatch = dispatch.filter(move |metadata| metadata.target().starts_with(&target));
            }
            dispatch.apply()?;
            *initialized = true;
        }
        Ok(())
    }
}

/// Clears the current log buffer and returns its contents.
///
/// # Errors
///
/// Fails if the buffer lock has been poisoned.
pub fn clear() -> anyhow::Result<Vec<String>> {
    let mut handle = LOG_BUFFER.write().map_err(|err| anyhow!("{:?}", err))?;
    Ok(handle.drain(..).collect())
}
