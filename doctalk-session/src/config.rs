//! Session lifecycle configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SessionError};

/// Idle time after which a session is discarded.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Number of past turns shown to the answer synthesizer.
pub const DEFAULT_HISTORY_WINDOW: usize = 5;

/// Configuration for the session store and chat orchestration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    /// A session idle for longer than this is evicted.
    pub ttl: Duration,
    /// Most recent turns passed to the synthesizer as conversational context.
    pub history_window: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { ttl: DEFAULT_TTL, history_window: DEFAULT_HISTORY_WINDOW }
    }
}

impl SessionConfig {
    /// Create a new builder for constructing a [`SessionConfig`].
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }
}

/// Builder for constructing a validated [`SessionConfig`].
#[derive(Debug, Clone, Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    /// Set the idle time-to-live.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.config.ttl = ttl;
        self
    }

    /// Set the number of recent turns shown to the synthesizer.
    pub fn history_window(mut self, turns: usize) -> Self {
        self.config.history_window = turns;
        self
    }

    /// Build the [`SessionConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Config`] if `ttl` is zero.
    pub fn build(self) -> Result<SessionConfig> {
        if self.config.ttl.is_zero() {
            return Err(SessionError::Config("ttl must be greater than zero".to_string()));
        }
        Ok(self.config)
    }
}
