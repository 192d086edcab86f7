use thiserror::Error;

/// Errors produced while locating, hooking or reading the opaque SDK.
///
/// Every variant is local to one capture strategy. None of them is allowed
/// to take down the hosting process; callers fall back to the next strategy.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InterceptError {
    #[error("symbol not found: {}", .0.join(", "))]
    SymbolNotFound(Vec<String>),

    #[error("instance not found: {0}")]
    InstanceNotFound(String),

    #[error("intercept failed: {0}")]
    InterceptFailed(String),

    #[error("decode anomaly: {0}")]
    DecodeAnomaly(String),

    #[error("buffer state invalid: {0}")]
    BufferStateInvalid(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("storage error: {0}")]
    StorageFailed(String),

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl InterceptError {
    /// Short label naming the stage that broke, used by diagnostics.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::SymbolNotFound(_) => "symbol",
            Self::InstanceNotFound(_) => "instance",
            Self::InterceptFailed(_) => "intercept",
            Self::DecodeAnomaly(_) => "decode",
            Self::BufferStateInvalid(_) => "buffer",
            Self::Timeout(_) => "timeout",
            Self::ConfigurationFailed(_) => "config",
            Self::StorageFailed(_) => "storage",
            Self::Unknown(_) => "unknown",
        }
    }

    pub fn symbol_not_found(name: impl Into<String>) -> Self {
        Self::SymbolNotFound(vec![name.into()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_not_found_lists_every_name() {
        let err = InterceptError::SymbolNotFound(vec!["a_init".into(), "a_listen".into()]);
        assert_eq!(err.to_string(), "symbol not found: a_init, a_listen");
        assert_eq!(err.stage(), "symbol");
    }

    #[test]
    fn stage_labels_are_distinct() {
        let errors = [
            InterceptError::symbol_not_found("x"),
            InterceptError::InstanceNotFound(String::new()),
            InterceptError::InterceptFailed(String::new()),
            InterceptError::DecodeAnomaly(String::new()),
            InterceptError::BufferStateInvalid(String::new()),
            InterceptError::Timeout(String::new()),
            InterceptError::ConfigurationFailed(String::new()),
            InterceptError::StorageFailed(String::new()),
            InterceptError::Unknown(String::new()),
        ];
        let mut stages: Vec<_> = errors.iter().map(|e| e.stage()).collect();
        stages.sort_unstable();
        stages.dedup();
        assert_eq!(stages.len(), errors.len());
    }
}
