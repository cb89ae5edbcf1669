//! Runtime configuration
//!
//! Defaults can be overridden with environment variables, and the CLI flags
//! override those in turn:
//!
//! | Variable | Meaning | Default |
//! |---|---|---|
//! | `EVALCHART_SOURCE` | report URL, report file, or records path | none |
//! | `EVALCHART_TIMEOUT_SECS` | fetch timeout, 1..=600 | 10 |

use std::time::Duration;

pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_PORT: u16 = 3002;
pub const DEFAULT_ENDPOINT_PATH: &str = "/api/evaluation-report";

const TIMEOUT_RANGE: std::ops::RangeInclusive<u64> = 1..=600;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Upper bound for the whole fetch, transport and parsing included
    pub timeout: Duration,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self { timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS) }
    }
}

impl LoaderConfig {
    /// Defaults, then environment
    pub fn from_env() -> Self {
        let timeout = std::env::var("EVALCHART_TIMEOUT_SECS")
            .ok()
            .and_then(|s| parse_timeout(&s))
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        Self { timeout: Duration::from_secs(timeout) }
    }

    /// Apply a CLI override, ignoring out-of-range values
    pub fn with_timeout_secs(mut self, secs: Option<u64>) -> Self {
        match secs {
            Some(s) if TIMEOUT_RANGE.contains(&s) => self.timeout = Duration::from_secs(s),
            Some(s) => tracing::warn!(secs = s, "timeout out of range, keeping {:?}", self.timeout),
            None => {}
        }
        self
    }
}

fn parse_timeout(raw: &str) -> Option<u64> {
    raw.trim()
        .parse::<u64>()
        .ok()
        .filter(|n| TIMEOUT_RANGE.contains(n))
}
