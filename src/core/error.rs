//=========================================================================
// Errors
//=========================================================================
//
// Error taxonomy of the core.
//
//   ConfigError  configuration could not be read or is invalid
//   PoolError    usage error on the pool API (call was a no-op)
//   SceneError   usage error on the transition API (call was a no-op)
//
// Usage errors are logged where they are detected and returned to the
// caller; nothing unwinds across component boundaries.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::path::PathBuf;

use thiserror::Error;

//=== Internal Dependencies ===============================================

use crate::core::stage::{NodeId, Template};

//=== ConfigError =========================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid pool setting for {template}: {reason}")]
    InvalidSetting { template: Template, reason: String },

    #[error("invalid runtime setting: {0}")]
    InvalidRuntime(String),
}

//=== PoolError ===========================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("no pool registered for template {0}")]
    UnknownTemplate(Template),

    #[error("pool {0} already has an async resize in flight")]
    AsyncResizeInFlight(Template),

    #[error("node {node:?} is not owned by pool {template}")]
    NotOwned { template: Template, node: NodeId },

    #[error("invalid resize of pool {template}: {reason}")]
    InvalidResize { template: Template, reason: &'static str },
}

//=== SceneError ==========================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SceneError {
    #[error("cannot load {requested}: transition to {current} is still in progress")]
    TransitionInProgress { requested: String, current: String },
}

//=========================================================================
// Unit Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_template() {
        let err = PoolError::UnknownTemplate(Template::new("bullet"));
        assert_eq!(err.to_string(), "no pool registered for template bullet");

        let err = PoolError::AsyncResizeInFlight(Template::new("shell"));
        assert!(err.to_string().contains("shell"));
    }

    #[test]
    fn transition_error_names_both_scenes() {
        let err = SceneError::TransitionInProgress {
            requested: "Level3".into(),
            current: "Level2".into(),
        };
        let message = err.to_string();
        assert!(message.contains("Level3"));
        assert!(message.contains("Level2"));
    }

    #[test]
    fn parse_errors_convert() {
        let parse = toml::from_str::<toml::Value>("not = [valid").unwrap_err();
        let err: ConfigError = parse.into();
        assert!(err.to_string().starts_with("failed to parse config"));
    }
}
