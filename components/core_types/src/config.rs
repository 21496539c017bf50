//! Runtime configuration.
//!
//! Configuration is plain data: it is deserialized from JSON, validated once,
//! and then handed to the VM. Every field has a default, so an empty object
//! (`{}`) is a valid configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default operand stack capacity per frame.
pub const DEFAULT_STACK_SIZE: usize = 256;
/// Default number of allocations between automatic collections.
pub const DEFAULT_GC_THRESHOLD: usize = 1024;
/// Default maximum depth of the frame chain.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 200;

/// Errors raised while loading a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The input was not valid JSON for [`RuntimeConfig`]
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
    /// A field held a value the runtime cannot use
    #[error("invalid configuration value for `{field}`: {reason}")]
    Invalid {
        /// Name of the offending field
        field: &'static str,
        /// Why the value was rejected
        reason: String,
    },
}

/// Tunables for one VM instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Operand stack capacity of every frame
    pub stack_size: usize,
    /// Allocations between automatic collections
    pub gc_threshold: usize,
    /// Maximum number of simultaneously active frames
    pub max_call_depth: usize,
    /// Default log filter when `RUST_LOG` is unset; the interpreter applies
    /// it when it installs its logging subscriber
    pub log_level: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            stack_size: DEFAULT_STACK_SIZE,
            gc_threshold: DEFAULT_GC_THRESHOLD,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            log_level: "warn".to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Parse and validate a configuration from JSON text.
    ///
    /// # Examples
    ///
    /// ```
    /// use core_types::RuntimeConfig;
    ///
    /// let config = RuntimeConfig::from_json_str(r#"{ "stack_size": 64 }"#).unwrap();
    /// assert_eq!(config.stack_size, 64);
    /// assert_eq!(config.gc_threshold, 1024);
    /// ```
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the runtime cannot operate with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("stack_size", self.stack_size),
            ("gc_threshold", self.gc_threshold),
            ("max_call_depth", self.max_call_depth),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        Ok(())
    }
}
