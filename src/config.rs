//! Protocol parameters.
//!
//! A [`SrConfig`] is validated once at construction and then handed to the
//! entities by value; nothing mutates it afterwards.

use std::time::Duration;

use thiserror::Error;

use crate::seq::SeqSpace;

/// Default window size (packets).
pub const DEFAULT_WINDOW_SIZE: usize = 6;
/// Default sequence space; the smallest legal value for the default window.
pub const DEFAULT_SEQ_SPACE: usize = 12;
/// Default retransmission timeout: 16 time units, read as milliseconds.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(16);

/// Window, sequence-space and timer settings shared by sender and receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SrConfig {
    window_size: usize,
    seq_space: usize,
    timeout: Duration,
}

impl Default for SrConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            seq_space: DEFAULT_SEQ_SPACE,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl SrConfig {
    /// Validate and build a configuration.
    ///
    /// The sequence space must hold at least two full windows; otherwise a
    /// retransmitted old packet can be mistaken for a new one after the
    /// receiver's window has rotated.
    pub fn new(window_size: usize, seq_space: usize, timeout: Duration) -> Result<Self, ConfigError> {
        if window_size == 0 {
            return Err(ConfigError::EmptyWindow);
        }
        if seq_space > i32::MAX as usize {
            return Err(ConfigError::SeqSpaceTooLarge(seq_space));
        }
        if seq_space < window_size.saturating_mul(2) {
            return Err(ConfigError::SeqSpaceTooSmall {
                seq_space,
                window_size,
            });
        }
        if timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(Self {
            window_size,
            seq_space,
            timeout,
        })
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn seq_space(&self) -> SeqSpace {
        // Bounded by i32::MAX in `new`.
        SeqSpace::new(self.seq_space as i32)
    }

    /// Retransmission timeout handed to [`crate::timer::TimerControl::start`].
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Reasons a [`SrConfig`] can be rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("window size must be at least 1")]
    EmptyWindow,
    #[error("sequence space {seq_space} is smaller than twice the window size {window_size}")]
    SeqSpaceTooSmall { seq_space: usize, window_size: usize },
    #[error("sequence space {0} does not fit a 32-bit sequence number")]
    SeqSpaceTooLarge(usize),
    #[error("retransmission timeout must be non-zero")]
    ZeroTimeout,
}
