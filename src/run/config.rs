use miette::Diagnostic;
use thiserror::Error;

/// Invalid [`RunConfig`] values.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("max_loop_iterations must be at least 1")]
    #[diagnostic(
        code(flowgraph::config::loop_cap),
        help("pass a cap of 1 or more, or leave the default of 100")
    )]
    ZeroLoopCap,

    #[error("environment variable {name} is not a valid integer: {value:?}")]
    #[diagnostic(
        code(flowgraph::config::env),
        help("unset {name} or set it to a positive integer")
    )]
    MalformedEnv { name: &'static str, value: String },
}

/// Knobs for a single run.
#[derive(Clone, Debug)]
pub struct RunConfig {
    max_loop_iterations: u32,
    event_buffer: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_loop_iterations: Self::DEFAULT_MAX_LOOP_ITERATIONS,
            event_buffer: Self::DEFAULT_EVENT_BUFFER,
        }
    }
}

impl RunConfig {
    pub const DEFAULT_MAX_LOOP_ITERATIONS: u32 = 100;
    pub const DEFAULT_EVENT_BUFFER: usize = 1024;

    const ENV_LOOP_CAP: &'static str = "FLOWGRAPH_MAX_LOOP_ITERATIONS";
    const ENV_EVENT_BUFFER: &'static str = "FLOWGRAPH_EVENT_BUFFER";

    /// Defaults, overridden by `FLOWGRAPH_MAX_LOOP_ITERATIONS` and
    /// `FLOWGRAPH_EVENT_BUFFER` when set (a `.env` file is honored).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let mut config = Self::default();
        if let Some(cap) = Self::env_number(Self::ENV_LOOP_CAP)? {
            let cap = u32::try_from(cap).map_err(|_| ConfigError::MalformedEnv {
                name: Self::ENV_LOOP_CAP,
                value: cap.to_string(),
            })?;
            config = config.with_max_loop_iterations(cap)?;
        }
        if let Some(buffer) = Self::env_number(Self::ENV_EVENT_BUFFER)? {
            config = config.with_event_buffer(buffer as usize);
        }
        Ok(config)
    }

    fn env_number(name: &'static str) -> Result<Option<u64>, ConfigError> {
        match std::env::var(name) {
            Err(_) => Ok(None),
            Ok(raw) => raw
                .parse::<u64>()
                .map(Some)
                .map_err(|_| ConfigError::MalformedEnv { name, value: raw }),
        }
    }

    /// Set the per-loop iteration cap. Zero is rejected rather than treated
    /// as unlimited.
    pub fn with_max_loop_iterations(mut self, cap: u32) -> Result<Self, ConfigError> {
        if cap == 0 {
            return Err(ConfigError::ZeroLoopCap);
        }
        self.max_loop_iterations = cap;
        Ok(self)
    }

    /// Queue capacity used by bounded event forwarding. Zero falls back to
    /// the default.
    #[must_use]
    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = if capacity == 0 {
            Self::DEFAULT_EVENT_BUFFER
        } else {
            capacity
        };
        self
    }

    #[must_use]
    pub fn max_loop_iterations(&self) -> u32 {
        self.max_loop_iterations
    }

    #[must_use]
    pub fn event_buffer(&self) -> usize {
        self.event_buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = RunConfig::default();
        assert_eq!(config.max_loop_iterations(), 100);
        assert_eq!(config.event_buffer(), 1024);
    }

    #[test]
    fn zero_loop_cap_is_rejected() {
        let err = RunConfig::default().with_max_loop_iterations(0).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroLoopCap));
    }

    #[test]
    fn zero_event_buffer_falls_back_to_default() {
        let config = RunConfig::default().with_event_buffer(0);
        assert_eq!(config.event_buffer(), RunConfig::DEFAULT_EVENT_BUFFER);
    }

    #[test]
    fn explicit_values_stick() {
        let config = RunConfig::default()
            .with_max_loop_iterations(3)
            .unwrap()
            .with_event_buffer(16);
        assert_eq!(config.max_loop_iterations(), 3);
        assert_eq!(config.event_buffer(), 16);
    }
}
