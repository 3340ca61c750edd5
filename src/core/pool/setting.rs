//=========================================================================
// Pool Settings
//=========================================================================
//
// Per-template sizing policy, loaded once from configuration and never
// mutated afterwards. Scene overrides are whole replacement settings.
//
//=========================================================================

//=== External Dependencies ===============================================

use serde::Deserialize;

//=== Internal Dependencies ===============================================

use crate::core::error::ConfigError;
use crate::core::stage::Template;

//=== Defaults ============================================================

pub const DEFAULT_FRAME_INTERVAL: u32 = 1;
pub const DEFAULT_BATCH_SIZE: usize = 5;

fn default_frame_interval() -> u32 {
    DEFAULT_FRAME_INTERVAL
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

//=== ResizeMode ==========================================================

/// How a pool reaches its target size when a scene is prepared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeMode {
    /// Resize in one call during the PreLoad broadcast.
    Sync,

    /// Resize over several ticks during the PreLoad gate.
    #[default]
    Async,
}

//=== PoolSetting =========================================================

/// Sizing policy for one template.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoolSetting {
    pub template: Template,

    /// Target number of instances.
    pub size: usize,

    #[serde(default)]
    pub resize_mode: ResizeMode,

    /// Ticks to wait between async batches.
    #[serde(default = "default_frame_interval")]
    pub frame_interval: u32,

    /// Instances created or destroyed per async batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl PoolSetting {
    /// A setting resized synchronously.
    pub fn sync(template: impl Into<Template>, size: usize) -> Self {
        Self {
            template: template.into(),
            size,
            resize_mode: ResizeMode::Sync,
            frame_interval: DEFAULT_FRAME_INTERVAL,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// A setting resized over several ticks.
    pub fn sliced(template: impl Into<Template>, size: usize) -> Self {
        Self {
            resize_mode: ResizeMode::Async,
            ..Self::sync(template, size)
        }
    }

    pub fn with_frame_interval(mut self, frames: u32) -> Self {
        self.frame_interval = frames;
        self
    }

    pub fn with_batch_size(mut self, batch: usize) -> Self {
        self.batch_size = batch;
        self
    }

    /// Checks the `>= 1` bounds on interval and batch size.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frame_interval == 0 {
            return Err(ConfigError::InvalidSetting {
                template: self.template.clone(),
                reason: "frame_interval must be at least 1".into(),
            });
        }
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidSetting {
                template: self.template.clone(),
                reason: "batch_size must be at least 1".into(),
            });
        }
        Ok(())
    }
}

//=========================================================================
// Unit Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn omitted_fields_take_defaults() {
        let setting: PoolSetting = toml::from_str(
            r#"
            template = "bullet"
            size = 20
            "#,
        )
        .unwrap();

        assert_eq!(setting.template, Template::new("bullet"));
        assert_eq!(setting.resize_mode, ResizeMode::Async);
        assert_eq!(setting.frame_interval, DEFAULT_FRAME_INTERVAL);
        assert_eq!(setting.batch_size, DEFAULT_BATCH_SIZE);
    }

    #[test]
    fn resize_mode_parses_lowercase() {
        let setting: PoolSetting = toml::from_str(
            r#"
            template = "spark"
            size = 3
            resize_mode = "sync"
            "#,
        )
        .unwrap();
        assert_eq!(setting.resize_mode, ResizeMode::Sync);
    }

    #[test]
    fn zero_batch_is_rejected() {
        let err = PoolSetting::sliced("bullet", 4).with_batch_size(0).validate().unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn zero_interval_is_rejected() {
        assert!(PoolSetting::sync("bullet", 4).with_frame_interval(0).validate().is_err());
    }
}
