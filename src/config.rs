// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Scheduler configuration
//!
//! Stack size and time slice are policy, not mechanism. They default to a
//! 1 MiB stack per logical thread and a 10 ms slice, and can be overridden
//! programmatically or from the environment:
//!
//! | Variable                   | Meaning                          |
//! |----------------------------|----------------------------------|
//! | `GREENSCHED_STACK_SIZE`    | stack bytes per logical thread   |
//! | `GREENSCHED_TIME_SLICE_MS` | preemption interval (ms)         |
//! | `GREENSCHED_PREEMPTION`    | `0`/`false` disables preemption  |

use core::time::Duration;

use log::warn;

use crate::error::{Result, SchedulerError};

/// Default stack size per logical thread (1 MiB)
pub const DEFAULT_STACK_SIZE: usize = 1024 * 1024;

/// Smallest accepted stack size
pub const MIN_STACK_SIZE: usize = 16 * 1024;

/// Default time slice in milliseconds
pub const DEFAULT_TIME_SLICE_MS: u64 = 10;

/// Scheduler configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Usable stack bytes per logical thread
    pub stack_size: usize,
    /// Interval after which a running thread is preempted
    pub time_slice: Duration,
    /// Preemption enabled
    pub preemption: bool,
}

impl SchedulerConfig {
    /// Create the default configuration
    pub const fn new() -> Self {
        Self {
            stack_size: DEFAULT_STACK_SIZE,
            time_slice: Duration::from_millis(DEFAULT_TIME_SLICE_MS),
            preemption: true,
        }
    }

    /// Set the stack size
    pub const fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = bytes;
        self
    }

    /// Set the time slice
    pub const fn time_slice(mut self, slice: Duration) -> Self {
        self.time_slice = slice;
        self
    }

    /// Enable or disable timer preemption
    pub const fn preemption(mut self, enabled: bool) -> Self {
        self.preemption = enabled;
        self
    }

    /// Check the configuration
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The configuration is usable
    /// * `Err(SchedulerError::InvalidConfig)` - Otherwise
    pub fn validate(&self) -> Result<()> {
        if self.stack_size < MIN_STACK_SIZE {
            return Err(SchedulerError::InvalidConfig("stack size below 16 KiB"));
        }
        if self.stack_size % 16 != 0 {
            return Err(SchedulerError::InvalidConfig("stack size not a multiple of 16"));
        }
        if self.preemption && self.time_slice.is_zero() {
            return Err(SchedulerError::InvalidConfig("zero time slice"));
        }
        Ok(())
    }

    /// Build a configuration from `GREENSCHED_*` environment variables
    ///
    /// Unset variables keep their defaults; unparsable ones are logged and
    /// ignored. The result is validated.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::new();

        if let Some(raw) = lookup("GREENSCHED_STACK_SIZE") {
            match raw.trim().parse::<usize>() {
                Ok(bytes) => config.stack_size = bytes,
                Err(_) => warn!("ignoring GREENSCHED_STACK_SIZE={raw:?}"),
            }
        }

        if let Some(raw) = lookup("GREENSCHED_TIME_SLICE_MS") {
            match raw.trim().parse::<u64>() {
                Ok(ms) => config.time_slice = Duration::from_millis(ms),
                Err(_) => warn!("ignoring GREENSCHED_TIME_SLICE_MS={raw:?}"),
            }
        }

        if let Some(raw) = lookup("GREENSCHED_PREEMPTION") {
            match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "on" | "yes" => config.preemption = true,
                "0" | "false" | "off" | "no" => config.preemption = false,
                _ => warn!("ignoring GREENSCHED_PREEMPTION={raw:?}"),
            }
        }

        config.validate()?;
        Ok(config)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn test_config_default() {
        let config = SchedulerConfig::default();
        assert_eq!(config.stack_size, DEFAULT_STACK_SIZE);
        assert_eq!(config.time_slice, Duration::from_millis(DEFAULT_TIME_SLICE_MS));
        assert!(config.preemption);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validate() {
        let small = SchedulerConfig::new().stack_size(4096);
        assert!(matches!(small.validate(), Err(SchedulerError::InvalidConfig(_))));

        let odd = SchedulerConfig::new().stack_size(MIN_STACK_SIZE + 8);
        assert!(matches!(odd.validate(), Err(SchedulerError::InvalidConfig(_))));

        let zero = SchedulerConfig::new().time_slice(Duration::ZERO);
        assert!(zero.validate().is_err());

        // A zero slice is irrelevant without preemption
        assert!(zero.preemption(false).validate().is_ok());
    }

    #[test]
    fn test_config_from_lookup() {
        let vars = [
            ("GREENSCHED_STACK_SIZE", "65536"),
            ("GREENSCHED_TIME_SLICE_MS", "3"),
            ("GREENSCHED_PREEMPTION", "off"),
        ];
        let config = SchedulerConfig::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config.stack_size, 65536);
        assert_eq!(config.time_slice, Duration::from_millis(3));
        assert!(!config.preemption);
    }

    #[test]
    fn test_config_from_lookup_ignores_garbage() {
        let vars = [("GREENSCHED_STACK_SIZE", "lots"), ("GREENSCHED_PREEMPTION", "maybe")];
        let config = SchedulerConfig::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config, SchedulerConfig::default());
    }

    #[test]
    fn test_config_from_lookup_rejects_invalid() {
        let vars = [("GREENSCHED_STACK_SIZE", "100")];
        assert!(SchedulerConfig::from_lookup(lookup(&vars)).is_err());
    }
}
