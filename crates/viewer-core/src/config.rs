//! Viewer configuration.
//!
//! Settings come from three layers, later ones winning: built-in defaults,
//! an optional TOML file, then `PAGEVIEW_*` environment variables.

use pageview_render::{DEFAULT_SUPERSAMPLING, MAX_RASTER_DIMENSION, THUMBNAIL_SCALE};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use std::str::FromStr;

use crate::viewport::{DEFAULT_ZOOM, MAX_ZOOM, MIN_ZOOM};

/// Runtime settings for a [`Viewer`](crate::Viewer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Pages rasterized at once by a prerender pass
    pub concurrency: usize,
    /// Pages rendered at once by the thumbnail pass
    pub thumbnail_concurrency: usize,
    /// Raster pixels per logical pixel
    pub supersampling: f32,
    /// Largest raster width or height in pixels
    pub max_raster_dimension: u32,
    /// Render scale of sidebar thumbnails
    pub thumbnail_scale: f32,
    /// Zoom a freshly loaded document opens at
    pub default_zoom_percent: u16,
    /// Memory budget for cached page rasters, in megabytes. Unset keeps
    /// every rendered page.
    pub cache_memory_mb: Option<usize>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            thumbnail_concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            supersampling: DEFAULT_SUPERSAMPLING,
            max_raster_dimension: MAX_RASTER_DIMENSION,
            thumbnail_scale: THUMBNAIL_SCALE,
            default_zoom_percent: DEFAULT_ZOOM,
            cache_memory_mb: None,
        }
    }
}

impl ViewerConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_thumbnail_concurrency(mut self, concurrency: usize) -> Self {
        self.thumbnail_concurrency = concurrency;
        self
    }

    pub fn with_supersampling(mut self, supersampling: f32) -> Self {
        self.supersampling = supersampling;
        self
    }

    pub fn with_max_raster_dimension(mut self, max: u32) -> Self {
        self.max_raster_dimension = max;
        self
    }

    pub fn with_thumbnail_scale(mut self, scale: f32) -> Self {
        self.thumbnail_scale = scale;
        self
    }

    pub fn with_default_zoom(mut self, percent: u16) -> Self {
        self.default_zoom_percent = percent;
        self
    }

    pub fn with_cache_memory_mb(mut self, mb: usize) -> Self {
        self.cache_memory_mb = Some(mb);
        self
    }

    /// Memory budget for cached page rasters, in bytes.
    pub fn cache_memory_bytes(&self) -> Option<usize> {
        self.cache_memory_mb.map(|mb| mb.saturating_mul(1024 * 1024))
    }

    /// Defaults with environment overrides applied.
    ///
    /// Environment variables:
    /// - `PAGEVIEW_CONCURRENCY`
    /// - `PAGEVIEW_THUMBNAIL_CONCURRENCY`
    /// - `PAGEVIEW_SUPERSAMPLING`
    /// - `PAGEVIEW_MAX_RASTER_DIMENSION`
    /// - `PAGEVIEW_THUMBNAIL_SCALE`
    /// - `PAGEVIEW_DEFAULT_ZOOM`
    /// - `PAGEVIEW_CACHE_MEMORY_MB`
    ///
    /// # Errors
    /// Returns an error if any variable does not parse or the result fails
    /// [`validate`](Self::validate).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    /// Applies `PAGEVIEW_*` variables on top of `self`.
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        env_override("PAGEVIEW_CONCURRENCY", &mut self.concurrency)?;
        env_override("PAGEVIEW_THUMBNAIL_CONCURRENCY", &mut self.thumbnail_concurrency)?;
        env_override("PAGEVIEW_SUPERSAMPLING", &mut self.supersampling)?;
        env_override("PAGEVIEW_MAX_RASTER_DIMENSION", &mut self.max_raster_dimension)?;
        env_override("PAGEVIEW_THUMBNAIL_SCALE", &mut self.thumbnail_scale)?;
        env_override("PAGEVIEW_DEFAULT_ZOOM", &mut self.default_zoom_percent)?;
        if let Some(mb) = parse_env("PAGEVIEW_CACHE_MEMORY_MB")? {
            self.cache_memory_mb = Some(mb);
        }
        self.validate()?;
        Ok(self)
    }

    /// Loads configuration from a TOML file. Missing keys keep their
    /// defaults.
    ///
    /// ```toml
    /// concurrency = 4
    /// supersampling = 2.0
    /// default_zoom_percent = 100
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref()).map_err(ConfigError::Io)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// File (if any), then environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        base.with_env_overrides()
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        fs::write(path.as_ref(), self.to_toml()?).map_err(ConfigError::Io)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::invalid("concurrency", "must be at least 1"));
        }
        if self.thumbnail_concurrency == 0 {
            return Err(ConfigError::invalid("thumbnail_concurrency", "must be at least 1"));
        }
        if !(self.supersampling.is_finite() && self.supersampling >= 1.0) {
            return Err(ConfigError::invalid("supersampling", "must be a number >= 1"));
        }
        if self.max_raster_dimension == 0 {
            return Err(ConfigError::invalid("max_raster_dimension", "must be at least 1"));
        }
        if !(self.thumbnail_scale.is_finite() && self.thumbnail_scale > 0.0) {
            return Err(ConfigError::invalid("thumbnail_scale", "must be a number > 0"));
        }
        if self.cache_memory_mb == Some(0) {
            return Err(ConfigError::invalid("cache_memory_mb", "must be at least 1 when set"));
        }
        if !(MIN_ZOOM..=MAX_ZOOM).contains(&self.default_zoom_percent) {
            return Err(ConfigError::invalid(
                "default_zoom_percent",
                format!("must be within {MIN_ZOOM}..={MAX_ZOOM}"),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value.trim().parse::<T>().map(Some).map_err(|_| ConfigError::InvalidValue {
            key: name.to_string(),
            reason: format!("cannot parse '{value}'"),
        }),
        Err(_) => Ok(None),
    }
}

fn env_override<T: FromStr>(name: &str, slot: &mut T) -> Result<(), ConfigError> {
    if let Some(value) = parse_env(name)? {
        *slot = value;
    }
    Ok(())
}

/// Errors that can occur during configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[source] io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

impl ConfigError {
    fn invalid(key: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    const VARS: &[&str] = &[
        "PAGEVIEW_CONCURRENCY",
        "PAGEVIEW_THUMBNAIL_CONCURRENCY",
        "PAGEVIEW_SUPERSAMPLING",
        "PAGEVIEW_MAX_RASTER_DIMENSION",
        "PAGEVIEW_THUMBNAIL_SCALE",
        "PAGEVIEW_DEFAULT_ZOOM",
        "PAGEVIEW_CACHE_MEMORY_MB",
    ];

    #[test]
    fn test_default_config() {
        let config = ViewerConfig::default();
        assert_eq!(config.concurrency, 4);
        assert!(config.thumbnail_concurrency >= 1);
        assert_eq!(config.supersampling, 2.0);
        assert_eq!(config.max_raster_dimension, 32767);
        assert_eq!(config.thumbnail_scale, 0.15);
        assert_eq!(config.default_zoom_percent, 100);
        assert_eq!(config.cache_memory_bytes(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_methods() {
        let config = ViewerConfig::default()
            .with_concurrency(8)
            .with_thumbnail_concurrency(2)
            .with_supersampling(1.5)
            .with_max_raster_dimension(4096)
            .with_thumbnail_scale(0.2)
            .with_default_zoom(150)
            .with_cache_memory_mb(64);

        assert_eq!(config.concurrency, 8);
        assert_eq!(config.thumbnail_concurrency, 2);
        assert_eq!(config.supersampling, 1.5);
        assert_eq!(config.max_raster_dimension, 4096);
        assert_eq!(config.thumbnail_scale, 0.2);
        assert_eq!(config.default_zoom_percent, 150);
        assert_eq!(config.cache_memory_mb, Some(64));
        assert_eq!(config.cache_memory_bytes(), Some(64 * 1024 * 1024));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cases = [
            ViewerConfig::default().with_concurrency(0),
            ViewerConfig::default().with_thumbnail_concurrency(0),
            ViewerConfig::default().with_supersampling(0.5),
            ViewerConfig::default().with_supersampling(f32::NAN),
            ViewerConfig::default().with_max_raster_dimension(0),
            ViewerConfig::default().with_thumbnail_scale(0.0),
            ViewerConfig::default().with_default_zoom(10),
            ViewerConfig::default().with_default_zoom(400),
            ViewerConfig::default().with_cache_memory_mb(0),
        ];

        for config in cases {
            assert!(
                matches!(config.validate(), Err(ConfigError::InvalidValue { .. })),
                "{config:?} should be rejected"
            );
        }
    }

    #[test]
    #[serial]
    fn test_from_env() {
        let _guard = EnvGuard::new(VARS);

        env::set_var("PAGEVIEW_CONCURRENCY", "2");
        env::set_var("PAGEVIEW_THUMBNAIL_CONCURRENCY", "3");
        env::set_var("PAGEVIEW_SUPERSAMPLING", "1.5");
        env::set_var("PAGEVIEW_MAX_RASTER_DIMENSION", "8192");
        env::set_var("PAGEVIEW_THUMBNAIL_SCALE", "0.25");
        env::set_var("PAGEVIEW_DEFAULT_ZOOM", "120");
        env::set_var("PAGEVIEW_CACHE_MEMORY_MB", "128");

        let config = ViewerConfig::from_env().unwrap();
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.thumbnail_concurrency, 3);
        assert_eq!(config.supersampling, 1.5);
        assert_eq!(config.max_raster_dimension, 8192);
        assert_eq!(config.thumbnail_scale, 0.25);
        assert_eq!(config.default_zoom_percent, 120);
        assert_eq!(config.cache_memory_mb, Some(128));
    }

    #[test]
    #[serial]
    fn test_from_env_partial() {
        let _guard = EnvGuard::new(VARS);
        for name in VARS {
            env::remove_var(name);
        }
        env::set_var("PAGEVIEW_CONCURRENCY", " 6 ");

        let config = ViewerConfig::from_env().unwrap();
        assert_eq!(config.concurrency, 6);
        assert_eq!(config.supersampling, 2.0); // default
    }

    #[test]
    #[serial]
    fn test_from_env_invalid() {
        let _guard = EnvGuard::new(VARS);

        env::set_var("PAGEVIEW_CONCURRENCY", "lots");
        let err = ViewerConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "PAGEVIEW_CONCURRENCY"));

        env::set_var("PAGEVIEW_CONCURRENCY", "0");
        assert!(ViewerConfig::from_env().is_err());
    }

    #[test]
    #[serial]
    fn test_env_wins_over_file() {
        let _guard = EnvGuard::new(VARS);
        for name in VARS {
            env::remove_var(name);
        }
        env::set_var("PAGEVIEW_DEFAULT_ZOOM", "200");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pageview.toml");
        fs::write(&path, "default_zoom_percent = 150\nconcurrency = 2\n").unwrap();

        let config = ViewerConfig::load(Some(&path)).unwrap();
        assert_eq!(config.default_zoom_percent, 200);
        assert_eq!(config.concurrency, 2);
    }

    // Helper to save and restore environment variables
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(var_names: &[&str]) -> Self {
            let vars = var_names
                .iter()
                .map(|name| (name.to_string(), env::var(name).ok()))
                .collect();
            Self { vars }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (name, value) in &self.vars {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    #[test]
    fn test_from_toml_partial() {
        let config = ViewerConfig::from_toml("concurrency = 8\n").unwrap();
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.default_zoom_percent, 100); // default
        assert_eq!(config.cache_memory_mb, None);
    }

    #[test]
    fn test_from_toml_rejects_invalid() {
        assert!(matches!(
            ViewerConfig::from_toml("concurrency = \"four\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            ViewerConfig::from_toml("supersampling = 0.5"),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_file_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pageview.toml");

        let config = ViewerConfig::default()
            .with_concurrency(3)
            .with_thumbnail_concurrency(2)
            .with_default_zoom(75)
            .with_cache_memory_mb(256);
        config.save_to_file(&path).unwrap();

        let loaded = ViewerConfig::from_file(&path).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_missing_file() {
        let err = ViewerConfig::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
