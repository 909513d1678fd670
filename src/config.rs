//! Lock tuning flags.
//!
//! Flags use the `-XX:` syntax of the launcher. They come from the `JVM_SYNC_OPTIONS` environment
//! variable, split with shell quoting rules, or are passed in directly.
//!
//! ```text
//! -XX:+UseBiasedLocking  -XX:-UseHeavyMonitors  -XX:RecursionWindow=2048
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Allow objects to be biased toward a single thread.
    pub use_biased_locking: bool,
    /// Skip every fast path and inflate on first lock.
    pub use_heavy_monitors: bool,
    /// Bytes above the current stack pointer a stack-lock record may sit at and still be treated as
    /// this thread's own. At most [`SyncConfig::max_recursion_window`].
    pub recursion_window: usize,
    /// Acquisition attempts before a contended thread parks.
    pub spin_limit: u32,
    /// Upper bound on a single park. Wakes a parked contender that missed its notification.
    pub park_timeout_ms: u64,
    pub collect_statistics: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            use_biased_locking: true,
            use_heavy_monitors: false,
            recursion_window: page_size::get(),
            spin_limit: if num_cpus::get() > 1 { 64 } else { 0 },
            park_timeout_ms: 50,
            collect_statistics: true,
        }
    }
}

impl SyncConfig {
    pub const ENV_VAR: &'static str = "JVM_SYNC_OPTIONS";

    pub fn from_env() -> Result<Self, ConfigError> {
        match env::var(Self::ENV_VAR) {
            Ok(flags) => {
                debug!("Reading lock options from {}: {:?}", Self::ENV_VAR, flags);
                SyncConfig::default().apply_flags(&flags)
            }
            Err(_) => Ok(SyncConfig::default()),
        }
    }

    /// Largest usable recursion window: one page. Another thread's stack is never within a page of our
    /// stack pointer.
    pub fn max_recursion_window() -> usize {
        page_size::get()
    }

    pub fn parse_flags(flags: &str) -> Result<Self, ConfigError> {
        SyncConfig::default().apply_flags(flags)
    }

    pub fn apply_flags(mut self, flags: &str) -> Result<Self, ConfigError> {
        for token in shell_words::split(flags)? {
            let option = match token.strip_prefix("-XX:") {
                Some(x) => x,
                None => return Err(ConfigError::Malformed(token)),
            };

            if let Some(name) = option.strip_prefix('+') {
                self.set_switch(name, true)?;
            } else if let Some(name) = option.strip_prefix('-') {
                self.set_switch(name, false)?;
            } else if let Some((name, value)) = option.split_once('=') {
                self.set_value(name, value)?;
            } else {
                return Err(ConfigError::Malformed(token));
            }
        }

        Ok(self)
    }

    fn set_switch(&mut self, name: &str, value: bool) -> Result<(), ConfigError> {
        match name {
            "UseBiasedLocking" => self.use_biased_locking = value,
            "UseHeavyMonitors" => self.use_heavy_monitors = value,
            "CollectLockStatistics" => self.collect_statistics = value,
            _ => return Err(ConfigError::UnknownFlag(name.to_string())),
        }
        Ok(())
    }

    fn set_value(&mut self, name: &str, value: &str) -> Result<(), ConfigError> {
        match name {
            "RecursionWindow" => {
                self.recursion_window = parse_value(name, value)?;
                if self.recursion_window > Self::max_recursion_window() {
                    return Err(ConfigError::invalid(name, value));
                }
            }
            "SpinLimit" => self.spin_limit = parse_value(name, value)?,
            "ParkTimeoutMillis" => {
                self.park_timeout_ms = parse_value(name, value)?;
                if self.park_timeout_ms == 0 {
                    return Err(ConfigError::invalid(name, value));
                }
            }
            _ => return Err(ConfigError::UnknownFlag(name.to_string())),
        }
        Ok(())
    }

    pub fn park_timeout(&self) -> Duration {
        Duration::from_millis(self.park_timeout_ms)
    }
}

fn parse_value<T: FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::invalid(name, value))
}

#[derive(Debug)]
pub enum ConfigError {
    UnknownFlag(String),
    InvalidValue { flag: String, value: String },
    Malformed(String),
    Split(shell_words::ParseError),
}

impl ConfigError {
    fn invalid(flag: &str, value: &str) -> Self {
        ConfigError::InvalidValue {
            flag: flag.to_string(),
            value: value.to_string(),
        }
    }
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::UnknownFlag(name) => write!(f, "Unrecognized VM option '{}'", name),
            ConfigError::InvalidValue { flag, value } => {
                write!(f, "Improperly specified VM option '{}={}'", flag, value)
            }
            ConfigError::Malformed(token) => write!(f, "Malformed VM option '{}'", token),
            ConfigError::Split(e) => write!(f, "Unable to split options: {}", e),
        }
    }
}

impl Error for ConfigError {}

impl From<shell_words::ParseError> for ConfigError {
    fn from(e: shell_words::ParseError) -> Self {
        ConfigError::Split(e)
    }
}

#[cfg(test)]
mod test {
    use super::{ConfigError, SyncConfig};

    #[test]
    pub fn defaults() {
        let config = SyncConfig::default();
        assert!(config.use_biased_locking);
        assert!(!config.use_heavy_monitors);
        assert_eq!(config.recursion_window, page_size::get());
        assert_eq!(config.park_timeout_ms, 50);
        assert_eq!(SyncConfig::parse_flags("").unwrap(), config);
    }

    #[test]
    pub fn switches_and_values() {
        let config = SyncConfig::parse_flags(
            "-XX:-UseBiasedLocking -XX:+UseHeavyMonitors -XX:RecursionWindow=2048 '-XX:SpinLimit=3'",
        )
        .unwrap();

        assert!(!config.use_biased_locking);
        assert!(config.use_heavy_monitors);
        assert_eq!(config.recursion_window, 2048);
        assert_eq!(config.spin_limit, 3);
    }

    #[test]
    pub fn recursion_window_is_at_most_a_page() {
        let page = page_size::get();
        let config = SyncConfig::parse_flags(&format!("-XX:RecursionWindow={}", page)).unwrap();
        assert_eq!(config.recursion_window, SyncConfig::max_recursion_window());
        assert_eq!(SyncConfig::parse_flags("-XX:RecursionWindow=0").unwrap().recursion_window, 0);

        for value in [(page + 1).to_string(), usize::MAX.to_string()] {
            assert!(matches!(
                SyncConfig::parse_flags(&format!("-XX:RecursionWindow={}", value)),
                Err(ConfigError::InvalidValue { flag, value: v }) if flag == "RecursionWindow" && v == value
            ));
        }
    }

    #[test]
    pub fn rejects_bad_flags() {
        assert!(matches!(
            SyncConfig::parse_flags("-XX:+UseFancyLocks"),
            Err(ConfigError::UnknownFlag(name)) if name == "UseFancyLocks"
        ));
        assert!(matches!(
            SyncConfig::parse_flags("-XX:RecursionWindow=lots"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            SyncConfig::parse_flags("-XX:ParkTimeoutMillis=0"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            SyncConfig::parse_flags("-Xmx2g"),
            Err(ConfigError::Malformed(_))
        ));
        assert!(matches!(
            SyncConfig::parse_flags("'-XX:+UseHeavyMonitors"),
            Err(ConfigError::Split(_))
        ));
    }
}
