//=========================================================================
// Configuration
//=========================================================================
//
// Start-up configuration, read once from TOML.
//
// Layout:
//   [runtime]            pacing and diagnostics
//   [[pools]]            default setting per template
//   [[scenes]]           per-scene overrides
//     [[scenes.pools]]   replacement settings for that scene
//
//=========================================================================

//=== External Dependencies ===============================================

use std::fs;
use std::path::Path;

use log::info;
use serde::Deserialize;

//=== Internal Dependencies ===============================================

use crate::core::error::ConfigError;
use crate::core::pool::PoolSetting;
use crate::core::wait::DEFAULT_SECONDS_CACHE;

//=== RuntimeSettings =====================================================

/// Pacing and diagnostic knobs for the driver.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeSettings {
    /// Ticks per second when the runtime drives its own loop.
    pub tps: f64,

    /// Capacity of the command channel.
    pub channel_capacity: usize,

    /// Warn once when a readiness gate stays closed this many ticks.
    pub stall_warning_ticks: Option<u32>,

    /// Distinct durations kept by the seconds-wait cache.
    pub wait_cache_capacity: usize,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            tps: 60.0,
            channel_capacity: 128,
            stall_warning_ticks: None,
            wait_cache_capacity: DEFAULT_SECONDS_CACHE,
        }
    }
}

//=== SceneOverrides ======================================================

/// Replacement settings applied while preparing one scene.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SceneOverrides {
    pub name: String,

    #[serde(default)]
    pub pools: Vec<PoolSetting>,
}

//=== Config ==============================================================

/// Everything the core reads at start-up.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub runtime: RuntimeSettings,

    #[serde(default)]
    pub pools: Vec<PoolSetting>,

    #[serde(default)]
    pub scenes: Vec<SceneOverrides>,
}

impl Config {
    //--- Loading ----------------------------------------------------------

    /// Parses and validates a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config = Self::from_toml_str(&source)?;
        info!(
            "Loaded config {} ({} pools, {} scene overrides)",
            path.display(),
            config.pools.len(),
            config.scenes.len()
        );
        Ok(config)
    }

    //--- Programmatic Construction ----------------------------------------

    pub fn with_pool(mut self, setting: PoolSetting) -> Self {
        self.pools.push(setting);
        self
    }

    /// Adds an override for `scene`, grouping it with earlier overrides
    /// for the same scene.
    pub fn with_scene_override(mut self, scene: &str, setting: PoolSetting) -> Self {
        match self.scenes.iter_mut().find(|s| s.name == scene) {
            Some(overrides) => overrides.pools.push(setting),
            None => self.scenes.push(SceneOverrides {
                name: scene.to_owned(),
                pools: vec![setting],
            }),
        }
        self
    }

    pub fn with_runtime(mut self, runtime: RuntimeSettings) -> Self {
        self.runtime = runtime;
        self
    }

    //--- Validation -------------------------------------------------------

    /// Checks value bounds. Duplicate keys are not errors here; the pool
    /// registry reports and drops them when it is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.runtime.tps > 0.0) {
            return Err(ConfigError::InvalidRuntime(format!(
                "tps must be positive, got {}",
                self.runtime.tps
            )));
        }
        if self.runtime.channel_capacity == 0 {
            return Err(ConfigError::InvalidRuntime(
                "channel_capacity must be positive".into(),
            ));
        }

        self.pools
            .iter()
            .chain(self.scenes.iter().flat_map(|scene| scene.pools.iter()))
            .try_for_each(PoolSetting::validate)
    }

    /// Overrides flattened to `(scene, setting)` pairs in file order.
    pub fn overrides(&self) -> impl Iterator<Item = (&str, &PoolSetting)> {
        self.scenes.iter().flat_map(|scene| {
            scene
                .pools
                .iter()
                .map(move |setting| (scene.name.as_str(), setting))
        })
    }
}

//=========================================================================
// Unit Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pool::ResizeMode;
    use crate::core::stage::Template;

    const SAMPLE: &str = r#"
        [runtime]
        tps = 30.0
        stall_warning_ticks = 600

        [[pools]]
        template = "bullet"
        size = 20
        resize_mode = "sync"

        [[pools]]
        template = "spark"
        size = 40
        frame_interval = 2
        batch_size = 8

        [[scenes]]
        name = "Level2"

        [[scenes.pools]]
        template = "bullet"
        size = 60
        resize_mode = "async"
    "#;

    #[test]
    fn parses_full_document() {
        let config = Config::from_toml_str(SAMPLE).unwrap();

        assert_eq!(config.runtime.tps, 30.0);
        assert_eq!(config.runtime.channel_capacity, 128);
        assert_eq!(config.runtime.stall_warning_ticks, Some(600));
        assert_eq!(config.pools.len(), 2);
        assert_eq!(config.pools[1].frame_interval, 2);

        let overrides: Vec<_> = config.overrides().collect();
        assert_eq!(overrides.len(), 1);
        assert_eq!(overrides[0].0, "Level2");
        assert_eq!(overrides[0].1.size, 60);
        assert_eq!(overrides[0].1.resize_mode, ResizeMode::Async);
    }

    #[test]
    fn empty_document_is_default() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = Config::from_toml_str("[[pools]]\ntemplate = \"a\"\nsize = 1\ncolour = 3\n");
        assert!(matches!(err, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn invalid_override_fails_validation() {
        let source = r#"
            [[scenes]]
            name = "Boss"
            [[scenes.pools]]
            template = "bullet"
            size = 5
            batch_size = 0
        "#;
        let err = Config::from_toml_str(source).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSetting { .. }));
    }

    #[test]
    fn zero_tps_is_rejected() {
        let config = Config::default().with_runtime(RuntimeSettings {
            tps: 0.0,
            ..RuntimeSettings::default()
        });
        assert!(matches!(config.validate(), Err(ConfigError::InvalidRuntime(_))));
    }

    #[test]
    fn builder_groups_overrides_by_scene() {
        let config = Config::default()
            .with_pool(PoolSetting::sync("bullet", 5))
            .with_scene_override("Level2", PoolSetting::sync("bullet", 10))
            .with_scene_override("Level2", PoolSetting::sliced("spark", 10));

        assert_eq!(config.scenes.len(), 1);
        assert_eq!(config.scenes[0].pools[1].template, Template::new("spark"));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = Config::load("/definitely/not/here.toml").unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.toml"));
    }
}
