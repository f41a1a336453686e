//! Renderer configuration.
//!
//! Settings are read with the following precedence, lowest first:
//!
//! 1. `quire.toml` in the working directory, when present
//! 2. an explicit configuration file, which must exist
//! 3. `QUIRE_*` environment variables (`QUIRE_VIEWS_DIR`, `QUIRE_DEBUG`, ...)
//! 4. overrides supplied by the caller, usually command-line flags

use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::ConfigError;
use crate::resolve::TEMPLATE_EXTENSION;

const DEFAULT_CONFIG_BASENAME: &str = "quire";
const DEFAULT_ASSETS_URL: &str = "/assets";

/// Settings as loaded, before defaults and validation.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RawConfig {
    pub views_dir: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub assets_dir: Option<PathBuf>,
    pub assets_url: Option<String>,
    pub template_extension: Option<String>,
    pub debug: Option<bool>,
}

impl RawConfig {
    /// Loads the file and environment layers.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false));
        if let Some(path) = explicit {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix("QUIRE")
                .separator("__")
                .try_parsing(true),
        );
        Ok(builder.build()?.try_deserialize()?)
    }

    /// Layers `overrides` on top; set fields in `overrides` win.
    pub fn merge(self, overrides: RawConfig) -> Self {
        Self {
            views_dir: overrides.views_dir.or(self.views_dir),
            cache_dir: overrides.cache_dir.or(self.cache_dir),
            assets_dir: overrides.assets_dir.or(self.assets_dir),
            assets_url: overrides.assets_url.or(self.assets_url),
            template_extension: overrides.template_extension.or(self.template_extension),
            debug: overrides.debug.or(self.debug),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderingConfig {
    pub views_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub assets_dir: PathBuf,
    pub assets_url: String,
    pub template_extension: String,
    /// Recompile on every render and fail on script errors.
    pub debug: bool,
}

impl RenderingConfig {
    pub fn new(
        views_dir: impl Into<PathBuf>,
        cache_dir: impl Into<PathBuf>,
        assets_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            views_dir: views_dir.into(),
            cache_dir: cache_dir.into(),
            assets_dir: assets_dir.into(),
            assets_url: DEFAULT_ASSETS_URL.to_string(),
            template_extension: TEMPLATE_EXTENSION.to_string(),
            debug: false,
        }
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_assets_url(mut self, url: impl Into<String>) -> Self {
        self.assets_url = url.into();
        self
    }

    /// Loads configuration from all layers, with `overrides` applied last.
    pub fn load(explicit: Option<&Path>, overrides: RawConfig) -> Result<Self, ConfigError> {
        let raw = RawConfig::load(explicit)?.merge(overrides);
        Self::from_raw(raw)
    }

    pub fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let RawConfig {
            views_dir,
            cache_dir,
            assets_dir,
            assets_url,
            template_extension,
            debug,
        } = raw;
        Ok(Self {
            views_dir: views_dir.ok_or(ConfigError::Missing { key: "views_dir" })?,
            cache_dir: cache_dir.ok_or(ConfigError::Missing { key: "cache_dir" })?,
            assets_dir: assets_dir.ok_or(ConfigError::Missing { key: "assets_dir" })?,
            assets_url: assets_url.unwrap_or_else(|| DEFAULT_ASSETS_URL.to_string()),
            template_extension: template_extension
                .unwrap_or_else(|| TEMPLATE_EXTENSION.to_string()),
            debug: debug.unwrap_or(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    fn complete() -> RawConfig {
        RawConfig {
            views_dir: Some("views".into()),
            cache_dir: Some("cache".into()),
            assets_dir: Some("public".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults_applied() {
        let config = RenderingConfig::from_raw(complete()).unwrap();
        assert_eq!(config.assets_url, "/assets");
        assert_eq!(config.template_extension, "quire");
        assert!(!config.debug);
    }

    #[test]
    fn test_missing_required_key() {
        let raw = RawConfig {
            cache_dir: None,
            ..complete()
        };
        assert!(matches!(
            RenderingConfig::from_raw(raw),
            Err(ConfigError::Missing { key: "cache_dir" })
        ));
    }

    #[test]
    fn test_overrides_take_precedence() {
        let overrides = RawConfig {
            views_dir: Some("other".into()),
            debug: Some(true),
            ..Default::default()
        };
        let config = RenderingConfig::from_raw(complete().merge(overrides)).unwrap();
        assert_eq!(config.views_dir, PathBuf::from("other"));
        assert_eq!(config.cache_dir, PathBuf::from("cache"));
        assert!(config.debug);
    }

    #[test]
    #[serial]
    fn test_environment_layer() {
        std::env::set_var("QUIRE_VIEWS_DIR", "/srv/views");
        std::env::set_var("QUIRE_DEBUG", "true");
        let raw = RawConfig::load(None);
        std::env::remove_var("QUIRE_VIEWS_DIR");
        std::env::remove_var("QUIRE_DEBUG");

        let raw = raw.unwrap();
        assert_eq!(raw.views_dir, Some(PathBuf::from("/srv/views")));
        assert_eq!(raw.debug, Some(true));
    }

    #[test]
    #[serial]
    fn test_explicit_file_layer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("site.toml");
        fs::write(
            &path,
            "views_dir = \"views\"\ncache_dir = \"cache\"\nassets_dir = \"public\"\nassets_url = \"/static\"\n",
        )
        .unwrap();

        let config = RenderingConfig::load(Some(&path), RawConfig::default()).unwrap();
        assert_eq!(config.views_dir, PathBuf::from("views"));
        assert_eq!(config.assets_url, "/static");
        assert!(!config.debug);
    }

    #[test]
    #[serial]
    fn test_missing_explicit_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = RawConfig::load(Some(&dir.path().join("absent.toml")));
        assert!(matches!(result, Err(ConfigError::Build(_))));
    }
}
