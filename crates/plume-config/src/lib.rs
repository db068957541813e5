//! Configuration management for plume.
//!
//! Parses `plume.toml` files with serde and provides auto-discovery of
//! config files in parent directories. CLI settings can be applied during
//! load via [`CliSettings`].
//!
//! ## Environment Variable Expansion
//!
//! String path values support environment variable expansion:
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default
//!
//! Expanded fields: `templates.base_dir`, `cache.dir`. Both also support a
//! leading `~`.

mod expand;

use std::path::{Path, PathBuf};

use serde::Deserialize;

use plume_compiler::CompileOptions;

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "plume.toml";

/// CLI settings that override configuration file values.
///
/// All fields are optional. Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override the default template extension.
    pub extension: Option<String>,
    /// Override the root for absolute include paths.
    pub base_dir: Option<PathBuf>,
    /// Override boolean attribute rendering.
    pub properties: Option<bool>,
    /// Override void tag self-closing.
    pub void_self_close: Option<bool>,
    /// Override empty container self-closing.
    pub container_self_close: Option<bool>,
    /// Override CamelCase-to-kebab tag folding.
    pub kebab_case: Option<bool>,
    /// Override artifact cache enablement.
    pub cache_enabled: Option<bool>,
}

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Template resolution configuration (paths are raw strings from TOML).
    templates: TemplatesRaw,
    /// Output rendering flags.
    pub output: OutputConfig,
    /// Diagnostics configuration.
    pub errors: ErrorsConfig,
    /// Artifact cache configuration (paths are raw strings from TOML).
    cache: CacheRaw,

    /// Resolved template configuration (set after loading).
    #[serde(skip)]
    pub templates_resolved: TemplatesConfig,
    /// Resolved cache configuration (set after loading).
    #[serde(skip)]
    pub cache_resolved: CacheConfig,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Raw template configuration as parsed from TOML.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct TemplatesRaw {
    extension: Option<String>,
    base_dir: Option<String>,
}

/// Resolved template configuration with absolute paths.
#[derive(Debug, Default)]
pub struct TemplatesConfig {
    /// Default suffix for include/extends resolution.
    pub extension: String,
    /// Root for absolute include paths; `None` resolves them against the
    /// including file's directory.
    pub base_dir: Option<PathBuf>,
}

/// Output rendering flags.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Render boolean attributes as `attr` (true) or `attr="attr"` (false).
    pub properties: bool,
    /// Render void tags as `<img />`.
    pub void_self_close: bool,
    /// Render empty containers as `<div />`.
    pub container_self_close: bool,
    /// Lower CamelCase tag names to kebab-case.
    pub kebab_case: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            properties: true,
            void_self_close: false,
            container_self_close: false,
            kebab_case: true,
        }
    }
}

/// Diagnostics configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ErrorsConfig {
    /// Lines of source shown before and after an error location.
    pub context: usize,
}

impl Default for ErrorsConfig {
    fn default() -> Self {
        Self { context: 2 }
    }
}

/// Raw cache configuration as parsed from TOML.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct CacheRaw {
    enabled: Option<bool>,
    dir: Option<String>,
}

/// Resolved artifact cache configuration.
#[derive(Debug, Default)]
pub struct CacheConfig {
    /// Whether compiled artifacts are cached.
    pub enabled: bool,
    /// Cache directory (`.plume/cache/` next to the config by default).
    pub dir: PathBuf,
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`templates.base_dir`").
        field: String,
        /// Error message (e.g., "${`PLUME_VIEWS`} not set").
        message: String,
    },
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file. Otherwise,
    /// searches for `plume.toml` in the current directory and parents.
    ///
    /// CLI settings are applied after loading and path resolution, allowing
    /// CLI arguments to take precedence over config file values.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
        }
        config.validate()?;
        Ok(config)
    }

    /// The core compiler flags this configuration describes.
    #[must_use]
    pub fn compile_options(&self) -> CompileOptions {
        CompileOptions {
            extension: self.templates_resolved.extension.clone(),
            base_dir: self.templates_resolved.base_dir.clone(),
            properties: self.output.properties,
            void_self_close: self.output.void_self_close,
            container_self_close: self.output.container_self_close,
            kebab_case: self.output.kebab_case,
            error_context: self.errors.context,
        }
    }

    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(extension) = &settings.extension {
            self.templates_resolved.extension.clone_from(extension);
        }
        if let Some(base_dir) = &settings.base_dir {
            self.templates_resolved.base_dir = Some(base_dir.clone());
        }
        if let Some(properties) = settings.properties {
            self.output.properties = properties;
        }
        if let Some(void_self_close) = settings.void_self_close {
            self.output.void_self_close = void_self_close;
        }
        if let Some(container_self_close) = settings.container_self_close {
            self.output.container_self_close = container_self_close;
        }
        if let Some(kebab_case) = settings.kebab_case {
            self.output.kebab_case = kebab_case;
        }
        if let Some(cache_enabled) = settings.cache_enabled {
            self.cache_resolved.enabled = cache_enabled;
        }
    }

    /// Search for a config file in the current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Create default config with paths relative to the working directory.
    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    /// Create default config with paths relative to a base directory.
    fn default_with_base(base: &Path) -> Self {
        Self {
            templates: TemplatesRaw::default(),
            output: OutputConfig::default(),
            errors: ErrorsConfig::default(),
            cache: CacheRaw::default(),
            templates_resolved: TemplatesConfig {
                extension: "pug".to_owned(),
                base_dir: None,
            },
            cache_resolved: CacheConfig {
                enabled: false,
                dir: base.join(".plume").join("cache"),
            },
            config_path: None,
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(config_dir)?;
        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Expand and resolve raw path strings against the config directory.
    fn resolve_paths(&mut self, config_dir: &Path) -> Result<(), ConfigError> {
        self.templates_resolved.extension = self
            .templates
            .extension
            .clone()
            .unwrap_or_else(|| "pug".to_owned());
        self.templates_resolved.base_dir = match &self.templates.base_dir {
            Some(raw) => Some(resolve_dir(raw, "templates.base_dir", config_dir)?),
            None => None,
        };

        self.cache_resolved.enabled = self.cache.enabled.unwrap_or(false);
        self.cache_resolved.dir = match &self.cache.dir {
            Some(raw) => resolve_dir(raw, "cache.dir", config_dir)?,
            None => config_dir.join(".plume").join("cache"),
        };
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let extension = &self.templates_resolved.extension;
        if extension.is_empty() {
            return Err(ConfigError::Validation(
                "templates.extension cannot be empty".to_owned(),
            ));
        }
        if extension.starts_with('.') {
            return Err(ConfigError::Validation(
                "templates.extension must not include the leading dot".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Expand env vars and `~`, then resolve a directory against the config dir.
fn resolve_dir(raw: &str, field: &str, config_dir: &Path) -> Result<PathBuf, ConfigError> {
    let expanded = expand::expand_env(raw, field)?;
    let expanded = shellexpand::tilde(&expanded).into_owned();
    let path = PathBuf::from(expanded);
    if path.is_absolute() {
        Ok(path)
    } else {
        Ok(config_dir.join(path))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn write_config(dir: &Path, content: &str) -> PathBuf {
        let path = dir.join(CONFIG_FILENAME);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_defaults_without_file() {
        let config = Config::default();
        assert_eq!(config.templates_resolved.extension, "pug");
        assert_eq!(config.templates_resolved.base_dir, None);
        assert!(config.output.properties);
        assert!(!config.output.void_self_close);
        assert!(config.output.kebab_case);
        assert_eq!(config.errors.context, 2);
        assert!(!config.cache_resolved.enabled);
    }

    #[test]
    fn test_load_full_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_config(
            tmp.path(),
            r#"
[templates]
extension = "tmpl"
base_dir = "views"

[output]
properties = false
void_self_close = true

[errors]
context = 4

[cache]
enabled = true
dir = "build/cache"
"#,
        );

        let config = Config::load(Some(&path), None).unwrap();
        assert_eq!(config.templates_resolved.extension, "tmpl");
        assert_eq!(
            config.templates_resolved.base_dir,
            Some(tmp.path().join("views"))
        );
        assert!(!config.output.properties);
        assert!(config.output.void_self_close);
        assert!(!config.output.container_self_close);
        assert_eq!(config.errors.context, 4);
        assert!(config.cache_resolved.enabled);
        assert_eq!(config.cache_resolved.dir, tmp.path().join("build/cache"));
    }

    #[test]
    fn test_compile_options_mapping() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_config(
            tmp.path(),
            "[output]\nkebab_case = false\ncontainer_self_close = true\n",
        );

        let config = Config::load(Some(&path), None).unwrap();
        let options = config.compile_options();
        assert_eq!(options.extension, "pug");
        assert!(!options.kebab_case);
        assert!(options.container_self_close);
        assert!(options.properties);
        assert_eq!(options.error_context, 2);
    }

    #[test]
    fn test_cli_settings_override_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_config(tmp.path(), "[templates]\nextension = \"tmpl\"\n");

        let settings = CliSettings {
            extension: Some("jade".to_owned()),
            cache_enabled: Some(true),
            properties: Some(false),
            ..CliSettings::default()
        };
        let config = Config::load(Some(&path), Some(&settings)).unwrap();
        assert_eq!(config.templates_resolved.extension, "jade");
        assert!(config.cache_resolved.enabled);
        assert!(!config.output.properties);
    }

    #[test]
    fn test_missing_explicit_path_errors() {
        let err = Config::load(Some(Path::new("/no/plume.toml")), None).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_env_expansion_in_base_dir() {
        let tmp = tempfile::tempdir().unwrap();
        // SAFETY: test-local variable, no concurrent reader depends on it.
        unsafe { std::env::set_var("PLUME_CFG_TEST_ROOT", "/srv/templates") };
        let path = write_config(
            tmp.path(),
            "[templates]\nbase_dir = \"${PLUME_CFG_TEST_ROOT}\"\n",
        );

        let config = Config::load(Some(&path), None).unwrap();
        assert_eq!(
            config.templates_resolved.base_dir,
            Some(PathBuf::from("/srv/templates"))
        );
    }

    #[test]
    fn test_unset_env_var_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_config(
            tmp.path(),
            "[templates]\nbase_dir = \"${PLUME_CFG_TEST_MISSING}\"\n",
        );

        let err = Config::load(Some(&path), None).unwrap_err();
        assert!(matches!(err, ConfigError::EnvVar { .. }));
    }

    #[test]
    fn test_extension_validation() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_config(tmp.path(), "[templates]\nextension = \".pug\"\n");
        let err = Config::load(Some(&path), None).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }
}
