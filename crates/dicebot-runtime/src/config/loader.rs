//! Configuration loader using figment.
//!
//! # Feature Flags
//!
//! - `toml-config` *(default)*: searches `dicebot.toml`, then `config.toml`
//! - `yaml-config`: searches `dicebot.yaml`, then `dicebot.yml`
//!
//! # Configuration Priority (lowest to highest)
//!
//! 1. Built-in defaults
//! 2. Values passed to [`ConfigLoader::merge`]
//! 3. Main config file (`dicebot.toml` / `dicebot.yaml`)
//! 4. Profile-specific config file (`dicebot.{profile}.toml`)
//! 5. Environment variables (`DICEBOT_*`)
//!
//! # Environment Variable Mapping
//!
//! `__` separates nesting levels after the `DICEBOT_` prefix:
//!
//! - `DICEBOT_LOGGING__LEVEL=debug` → `logging.level = "debug"`
//! - `DICEBOT_ADAPTERS__ONEBOT__ACCESS_TOKEN=xxx` → `adapters.onebot.access_token = "xxx"`
//!
//! `DICEBOT_PROFILE` selects the profile and is not mapped.
//!
//! # Example
//!
//! ```rust,ignore
//! use dicebot_runtime::config::ConfigLoader;
//!
//! let config = ConfigLoader::new()
//!     .profile("production")
//!     .with_current_dir()
//!     .load()?;
//! ```

use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(any(feature = "yaml-config", feature = "toml-config"))]
use figment::providers::Format;
#[cfg(feature = "toml-config")]
use figment::providers::Toml;
#[cfg(feature = "yaml-config")]
use figment::providers::Yaml;
use figment::providers::{Env, Serialized};
use tracing::{debug, info, trace, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::AppConfig;

const ENV_PREFIX: &str = "DICEBOT_";
const PROFILE_VAR: &str = "DICEBOT_PROFILE";

/// Configuration profile for environment-specific settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Profile {
    #[default]
    Development,
    Production,
    Custom(String),
}

impl Profile {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Custom(name) => name,
        }
    }

    /// Parses a profile name; `dev` and `prod` are accepted as short forms.
    pub fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "development" | "dev" => Self::Development,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Reads `DICEBOT_PROFILE`, defaulting to development.
    pub fn from_env() -> Self {
        std::env::var(PROFILE_VAR)
            .map(|p| Self::parse(&p))
            .unwrap_or_default()
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration loader with figment-based multi-source support.
pub struct ConfigLoader {
    figment: Figment,
    profile: Profile,
    search_paths: Vec<PathBuf>,
    load_env: bool,
    /// Overrides the search when set.
    config_file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            figment: Figment::new(),
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            load_env: true,
            config_file: None,
        }
    }

    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.profile = Profile::parse(profile.as_ref());
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    pub fn with_current_dir(self) -> Self {
        match std::env::current_dir() {
            Ok(cwd) => self.search_path(cwd),
            Err(_) => self,
        }
    }

    /// Adds `<user config dir>/dicebot` to the search paths.
    pub fn with_user_config_dir(self) -> Self {
        match dirs::config_dir() {
            Some(config_dir) => self.search_path(config_dir.join("dicebot")),
            None => self,
        }
    }

    /// Loads exactly this file instead of searching.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Layers `config` above the built-in defaults and below every file.
    pub fn merge(mut self, config: AppConfig) -> Self {
        self.figment = self.figment.merge(Serialized::defaults(config));
        self
    }

    /// Loads and returns the configuration.
    pub fn load(self) -> ConfigResult<AppConfig> {
        let profile = self.profile.clone();
        let figment = self.build_figment()?;
        let config: AppConfig = figment.extract()?;

        debug!(
            profile = %profile,
            logging_level = %config.logging.level,
            adapters = config.adapters.len(),
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    fn build_figment(mut self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

        let user_figment = std::mem::take(&mut self.figment);
        figment = figment.merge(user_figment);

        if let Some(path) = &self.config_file {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path.clone()));
            }
            info!(path = %path.display(), "Loading configuration file");
            figment = Self::merge_config_file(figment, path)?;
        } else {
            figment = self.load_config_files(figment);
        }

        if self.load_env {
            trace!("Loading environment variables with {ENV_PREFIX} prefix");
            figment = figment.merge(Env::prefixed(ENV_PREFIX).ignore(&["profile"]).split("__"));
        }

        Ok(figment)
    }

    /// Merges a single config file, dispatching on its extension.
    fn merge_config_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext {
            #[cfg(feature = "toml-config")]
            "toml" => Ok(figment.merge(Toml::file(path))),
            #[cfg(feature = "yaml-config")]
            "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
            _ => Err(ConfigError::UnsupportedFormat(ext.to_string())),
        }
    }

    fn resolve_search_paths(&self) -> Vec<PathBuf> {
        if !self.search_paths.is_empty() {
            return self.search_paths.clone();
        }
        let mut paths = Vec::new();
        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd);
        }
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("dicebot"));
        }
        paths
    }

    /// Searches `search_paths × base_names` for the first base file, then
    /// layers its profile variant on top. Returns whether a file was found.
    #[cfg(any(feature = "toml-config", feature = "yaml-config"))]
    fn load_format_files<F>(
        &self,
        mut figment: Figment,
        search_paths: &[PathBuf],
        base_names: &[&str],
        merge_fn: F,
    ) -> (Figment, bool)
    where
        F: Fn(Figment, &Path) -> Figment,
    {
        for search_path in search_paths {
            for base_name in base_names {
                let base_path = search_path.join(base_name);
                if !base_path.exists() {
                    continue;
                }
                info!(path = %base_path.display(), "Loading configuration file");
                figment = merge_fn(figment, &base_path);

                if let Some((stem, ext)) = base_name.rsplit_once('.') {
                    let profile_path =
                        search_path.join(format!("{stem}.{}.{ext}", self.profile.as_str()));
                    if profile_path.exists() {
                        debug!(path = %profile_path.display(), "Loading profile-specific config");
                        figment = merge_fn(figment, &profile_path);
                    }
                }
                return (figment, true);
            }
        }
        (figment, false)
    }

    fn load_config_files(&self, mut figment: Figment) -> Figment {
        let search_paths = self.resolve_search_paths();
        let mut found = false;

        #[cfg(feature = "toml-config")]
        {
            let (f, ok) = self.load_format_files(
                figment,
                &search_paths,
                &["dicebot.toml", "config.toml"],
                |fig, path| fig.merge(Toml::file(path)),
            );
            figment = f;
            found |= ok;
        }

        #[cfg(feature = "yaml-config")]
        {
            let (f, ok) = self.load_format_files(
                figment,
                &search_paths,
                &["dicebot.yaml", "dicebot.yml"],
                |fig, path| fig.merge(Yaml::file(path)),
            );
            figment = f;
            found |= ok;
        }

        if !found {
            warn!("No configuration file found, using defaults");
        }
        figment
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde::Deserialize;

    use super::*;
    use crate::config::schema::{LogLevel, LoggingConfig};

    #[derive(Debug, Deserialize)]
    struct GatewaySection {
        ws_reverse: String,
        #[serde(default)]
        api_timeout_ms: u64,
    }

    #[test]
    fn test_default_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigLoader::new()
            .search_path(dir.path())
            .without_env()
            .load()
            .unwrap();

        assert_eq!(config.logging.level, LogLevel::Info);
        assert!(config.adapters.is_empty());
    }

    #[test]
    fn test_profile_parse() {
        assert_eq!(Profile::parse("PROD"), Profile::Production);
        assert_eq!(Profile::parse("dev"), Profile::Development);
        assert_eq!(Profile::parse("staging"), Profile::Custom("staging".into()));
        assert_eq!(Profile::parse("staging").to_string(), "staging");
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn test_toml_file_with_profile_overlay() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("dicebot.toml"),
            r#"
[logging]
level = "debug"

[adapters.gateway]
ws_reverse = "ws://127.0.0.1:8100/ws"
api_timeout_ms = 15000
"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("dicebot.production.toml"),
            "[adapters.gateway]\napi_timeout_ms = 3000\n",
        )
        .unwrap();

        let base = ConfigLoader::new()
            .profile("dev")
            .search_path(dir.path())
            .without_env()
            .load()
            .unwrap();
        assert_eq!(base.logging.level, LogLevel::Debug);
        let section: GatewaySection = base.adapter_config("gateway").unwrap().unwrap();
        assert_eq!(section.api_timeout_ms, 15000);

        let prod = ConfigLoader::new()
            .profile("production")
            .search_path(dir.path())
            .without_env()
            .load()
            .unwrap();
        let section: GatewaySection = prod.adapter_config("gateway").unwrap().unwrap();
        assert_eq!(section.ws_reverse, "ws://127.0.0.1:8100/ws");
        assert_eq!(section.api_timeout_ms, 3000);
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn test_file_beats_merged_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        fs::write(&path, "[logging]\nformat = \"pretty\"\n").unwrap();

        let config = ConfigLoader::new()
            .merge(AppConfig {
                logging: LoggingConfig {
                    level: LogLevel::Warn,
                    ..Default::default()
                },
                ..Default::default()
            })
            .file(&path)
            .without_env()
            .load()
            .unwrap();

        assert_eq!(config.logging.level, LogLevel::Warn);
        assert_eq!(
            config.logging.format,
            crate::config::schema::LogFormat::Pretty
        );
    }

    #[cfg(feature = "yaml-config")]
    #[test]
    fn test_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("dicebot.yaml"),
            "adapters:\n  gateway:\n    ws_reverse: ws://gw/ws\n",
        )
        .unwrap();

        let config = ConfigLoader::new()
            .search_path(dir.path())
            .without_env()
            .load()
            .unwrap();
        let section: GatewaySection = config.adapter_config("gateway").unwrap().unwrap();
        assert_eq!(section.ws_reverse, "ws://gw/ws");
    }

    #[test]
    fn test_explicit_file_errors() {
        let dir = tempfile::tempdir().unwrap();

        let missing = ConfigLoader::new()
            .file(dir.path().join("nope.toml"))
            .without_env()
            .load();
        assert!(matches!(missing, Err(ConfigError::FileNotFound(_))));

        let ini = dir.path().join("dicebot.ini");
        fs::write(&ini, "level=debug").unwrap();
        let unsupported = ConfigLoader::new().file(&ini).without_env().load();
        assert!(matches!(unsupported, Err(ConfigError::UnsupportedFormat(ext)) if ext == "ini"));
    }

    #[test]
    fn test_env_overrides() {
        let dir = tempfile::tempdir().unwrap();
        // SAFETY: the variable name is unique to this test.
        unsafe {
            std::env::set_var("DICEBOT_ADAPTERS__ENVPROBE__WS_REVERSE", "ws://from-env/ws");
        }
        let config = ConfigLoader::new().search_path(dir.path()).load();
        unsafe {
            std::env::remove_var("DICEBOT_ADAPTERS__ENVPROBE__WS_REVERSE");
        }

        let section: GatewaySection = config
            .unwrap()
            .adapter_config("envprobe")
            .unwrap()
            .unwrap();
        assert_eq!(section.ws_reverse, "ws://from-env/ws");
    }
}
