//! Configuration Module - Barrier & Heap Tuning Parameters
//!
//! Manages all configuration parameters for gcbarrier.
//! The store-buffer overflow threshold is deliberately a parameter here and
//! not a constant: it is collector policy, not barrier protocol.

/// Main configuration for the barrier subsystem and its reference heap
///
/// # Examples
///
/// ```rust
/// use gcbarrier::BarrierConfig;
///
/// // Use default configuration
/// let config = BarrierConfig::default();
///
/// // Small store buffer to exercise eager minor collections
/// let config = BarrierConfig {
///     store_buffer_capacity: 4,
///     strict_checks: true,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct BarrierConfig {
    /// Nursery size in bytes
    ///
    /// Allocation that does not fit triggers a minor collection.
    /// Default: 1MB
    pub nursery_size: usize,

    /// Store buffer entries per zone before an eager minor collection is
    /// requested
    ///
    /// Reaching the capacity never drops an entry.
    /// Default: 4096
    pub store_buffer_capacity: usize,

    /// Enable strict barrier validation
    ///
    /// Selects the strict validator (fatal assertions on slot preconditions,
    /// unexpected gray cells and foreign-thread zone access).
    /// Default: on in debug builds, off in release builds
    pub strict_checks: bool,

    /// Upper bound on unique-id registry entries per zone
    ///
    /// `None` means the registry is only bounded by the allocator.
    /// Default: None
    pub max_unique_ids: Option<usize>,

    /// Gray cells processed per incremental mark slice
    ///
    /// Default: 256
    pub mark_slice_budget: usize,

    /// Enable verbose collector event logging on the console
    ///
    /// Default: false
    pub verbose: bool,

    /// Emit console events as JSON instead of human-readable lines
    ///
    /// Default: false
    pub json_events: bool,
}

impl Default for BarrierConfig {
    fn default() -> Self {
        BarrierConfig {
            nursery_size: MB,
            store_buffer_capacity: 4096,
            strict_checks: cfg!(debug_assertions),
            max_unique_ids: None,
            mark_slice_budget: 256,
            verbose: false,
            json_events: false,
        }
    }
}

impl BarrierConfig {
    /// Validate configuration
    ///
    /// # Examples
    ///
    /// ```rust
    /// use gcbarrier::BarrierConfig;
    ///
    /// let config = BarrierConfig {
    ///     store_buffer_capacity: 0,  // Invalid!
    ///     ..Default::default()
    /// };
    ///
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nursery_size < MIN_NURSERY_SIZE {
            return Err(ConfigError::InvalidNurserySize(format!(
                "nursery_size must be at least {} bytes",
                MIN_NURSERY_SIZE
            )));
        }

        if self.nursery_size > MAX_NURSERY_SIZE {
            return Err(ConfigError::InvalidNurserySize(format!(
                "nursery_size must not exceed {} bytes",
                MAX_NURSERY_SIZE
            )));
        }

        if self.store_buffer_capacity == 0 {
            return Err(ConfigError::InvalidStoreBufferCapacity(
                "store_buffer_capacity must be > 0".to_string(),
            ));
        }

        if self.mark_slice_budget == 0 {
            return Err(ConfigError::InvalidSliceBudget(
                "mark_slice_budget must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Build configuration from environment variables
    ///
    /// Overrides defaults with environment variables:
    /// - GCB_NURSERY_SIZE
    /// - GCB_STORE_BUFFER_CAPACITY
    /// - GCB_STRICT_CHECKS
    /// - GCB_MAX_UNIQUE_IDS
    /// - GCB_MARK_SLICE_BUDGET
    /// - GCB_VERBOSE
    ///
    /// # Examples
    ///
    /// ```bash
    /// export GCB_STORE_BUFFER_CAPACITY=128
    /// export GCB_STRICT_CHECKS=1
    /// ```
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("GCB_NURSERY_SIZE") {
            if let Ok(size) = val.parse::<usize>() {
                config.nursery_size = size;
            }
        }

        if let Ok(val) = std::env::var("GCB_STORE_BUFFER_CAPACITY") {
            if let Ok(capacity) = val.parse::<usize>() {
                config.store_buffer_capacity = capacity;
            }
        }

        if let Ok(val) = std::env::var("GCB_STRICT_CHECKS") {
            config.strict_checks = parse_flag(&val);
        }

        if let Ok(val) = std::env::var("GCB_MAX_UNIQUE_IDS") {
            if let Ok(limit) = val.parse::<usize>() {
                config.max_unique_ids = Some(limit);
            }
        }

        if let Ok(val) = std::env::var("GCB_MARK_SLICE_BUDGET") {
            if let Ok(budget) = val.parse::<usize>() {
                config.mark_slice_budget = budget;
            }
        }

        if let Ok(val) = std::env::var("GCB_VERBOSE") {
            config.verbose = parse_flag(&val);
        }

        config
    }
}

/// Error types for configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid nursery size: {0}")]
    InvalidNurserySize(String),

    #[error("Invalid store buffer capacity: {0}")]
    InvalidStoreBufferCapacity(String),

    #[error("Invalid mark slice budget: {0}")]
    InvalidSliceBudget(String),
}

// ============================================================================
// CONSTANTS & HELPERS
// ============================================================================

const KB: usize = 1024;
const MB: usize = 1024 * 1024;

/// Smallest nursery worth having: a handful of cells
const MIN_NURSERY_SIZE: usize = 4 * KB;

/// Nursery must fit inside its reserved address range
const MAX_NURSERY_SIZE: usize = 256 * MB;

fn parse_flag(val: &str) -> bool {
    val == "1" || val.eq_ignore_ascii_case("true")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BarrierConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.store_buffer_capacity, 4096);
        assert_eq!(config.strict_checks, cfg!(debug_assertions));
    }

    #[test]
    fn test_invalid_nursery_size() {
        let config = BarrierConfig {
            nursery_size: 16,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidNurserySize(_))
        ));
    }

    #[test]
    fn test_zero_store_buffer_capacity() {
        let config = BarrierConfig {
            store_buffer_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("1"));
        assert!(parse_flag("TRUE"));
        assert!(!parse_flag("0"));
        assert!(!parse_flag("yes"));
    }
}
