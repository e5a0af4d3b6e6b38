//! Application configuration
//!
//! Process-wide settings that come from the command line rather than from
//! the site configuration file.

/// Environment variable that overrides the verbosity-derived log filter
pub const LOG_ENV_VAR: &str = "SITECOORD_LOG";

/// Application configuration structure
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// Verbosity level for logging
    pub verbose: u8,
}

impl AppConfig {
    pub fn new(verbose: u8) -> Self {
        Self { verbose }
    }

    /// Get the log level string based on verbosity
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }

    /// Log filter, honoring `SITECOORD_LOG` when it is set
    pub fn log_filter(&self) -> String {
        std::env::var(LOG_ENV_VAR)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| self.log_level().to_string())
    }
}
