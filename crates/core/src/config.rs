//! Per-session tunables.
//!
//! A plain struct with a `Default` impl, consumed by an alternate
//! constructor rather than threaded through every call site.

/// Tunables for a [`Session`](crate::session::Session), independent of
/// whatever protocol back-end ends up loaded onto it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Lag ceiling in milliseconds before a viewer is suspended from
    /// the broadcast fan-out. A loaded back-end's own
    /// [`Backend::lag_threshold_ms`](crate::backend::Backend::lag_threshold_ms)
    /// overrides this once [`Session::load_plugin`](crate::session::Session::load_plugin)
    /// runs.
    pub lag_threshold_ms: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            lag_threshold_ms: crate::session::DEFAULT_LAG_THRESHOLD_MS,
        }
    }
}

impl SessionConfig {
    pub fn with_lag_threshold_ms(mut self, lag_threshold_ms: i64) -> Self {
        self.lag_threshold_ms = lag_threshold_ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_reference_lag_threshold() {
        assert_eq!(
            SessionConfig::default().lag_threshold_ms,
            crate::session::DEFAULT_LAG_THRESHOLD_MS
        );
    }

    #[test]
    fn builder_overrides_lag_threshold() {
        let config = SessionConfig::default().with_lag_threshold_ms(1000);
        assert_eq!(config.lag_threshold_ms, 1000);
    }
}
