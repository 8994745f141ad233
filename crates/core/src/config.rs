//! Engine configuration
//!
//! Tunables are fixed when a filesystem handle is opened and shared by
//! every operation on that handle. Handles validate their configuration
//! at open, so a bad value fails up front with *invalid-config* instead
//! of somewhere deep inside a commit.

use crate::error::{FsError, Result};

/// Configuration for one filesystem handle
#[derive(Debug, Clone)]
pub struct FsConfig {
    /// Maximum delta-chain depth the reader will recurse through before
    /// falling back to fulltext reconstruction of the source
    pub max_delta_chain: usize,
    /// Maximum re-runs of a storage scope on transient conflicts
    pub max_retries: u32,
    /// Schedule best-effort deltification of changed file contents after
    /// each commit
    pub deltify_on_commit: bool,
    /// Fulltexts smaller than this are never deltified; keeping small
    /// files as fulltexts favors read latency over space
    pub deltify_min_size: u64,
    /// Maximum target text covered by one svndiff window
    pub delta_window_size: usize,
}

impl FsConfig {
    /// Check the invariants the engine relies on
    ///
    /// Called when a handle is opened; every field is public, so nothing
    /// else stops a caller from assembling an unusable configuration.
    pub fn validate(&self) -> Result<()> {
        if self.delta_window_size == 0 {
            return Err(FsError::invalid_config("delta window size must be positive"));
        }
        if self.max_delta_chain == 0 {
            return Err(FsError::invalid_config("delta chain bound must be positive"));
        }
        if self.max_retries == 0 {
            return Err(FsError::invalid_config("retry bound must be positive"));
        }
        if self.deltify_min_size > self.delta_window_size as u64 {
            return Err(FsError::invalid_config(
                "deltification threshold exceeds the delta window size",
            ));
        }
        Ok(())
    }
}

impl Default for FsConfig {
    fn default() -> Self {
        FsConfig {
            max_delta_chain: 16,
            max_retries: 10,
            deltify_on_commit: true,
            deltify_min_size: 1024,
            delta_window_size: 100 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn defaults_validate() {
        assert!(FsConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_bounds_are_rejected() {
        for config in [
            FsConfig {
                delta_window_size: 0,
                ..FsConfig::default()
            },
            FsConfig {
                max_delta_chain: 0,
                ..FsConfig::default()
            },
            FsConfig {
                max_retries: 0,
                ..FsConfig::default()
            },
        ] {
            let err = config.validate().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidConfig);
        }
    }

    #[test]
    fn threshold_may_not_exceed_the_window() {
        let config = FsConfig {
            deltify_min_size: 4096,
            delta_window_size: 1024,
            ..FsConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);

        let edge = FsConfig {
            deltify_min_size: 1024,
            delta_window_size: 1024,
            ..FsConfig::default()
        };
        assert!(edge.validate().is_ok());
    }
}
