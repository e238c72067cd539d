//! Site configuration module.
//!
//! Loads and validates `site.toml` from the site root and resolves the
//! directories the compiler reads from and writes to.
//!
//! ## Config File Location
//!
//! ```text
//! my-site/
//! ├── site.toml        # optional; stock defaults apply when absent
//! ├── assets/          # bundler inputs
//! ├── contents/        # routed pages
//! └── layouts/         # wrapper templates and partials
//! ```
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [source]
//! assets = "assets"
//! contents = "contents"
//! layouts = "layouts"
//!
//! [compiler]
//! # output_root = "public"           # default: "tmp/build-<env>"
//! output_assets = "assets"           # below output_root
//! output_directory_index = "index.html"
//! minify = false
//! cache = false
//! cache_directory = "tmp/parcel"
//! bundler = ["yarn", "run", "parcel"]
//!
//! [conventions]
//! # default_layout = "default.html.erb"
//! entrypoints = ['\.js$', '\.css$']
//! ```
//!
//! The environment name comes from `CONFINE_ENV` and defaults to
//! `development`. It only affects the default output root.
//!
//! Every path is resolved with [`paths::concat`] against the site root, so
//! `output_root = "/public"` still lands inside the site.
//!
//! Unknown keys are rejected to catch typos early.

use crate::paths;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name of the site configuration, relative to the site root.
pub const CONFIG_FILE: &str = "site.toml";

/// Environment variable naming the build environment.
pub const ENV_VAR: &str = "CONFINE_ENV";

pub const DEFAULT_ENV: &str = "development";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Path does not exist: {0}")]
    PathDoesNotExist(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Contents of `site.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// Source directories, relative to the site root.
    pub source: SourceConfig,
    /// Output locations and bundler invocation.
    pub compiler: CompilerConfig,
    /// Directory conventions applied by the `confine` binary.
    pub conventions: ConventionsConfig,
}

impl SiteConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let index = &self.compiler.output_directory_index;
        if index.is_empty() {
            return Err(ConfigError::Validation(
                "compiler.output_directory_index must not be empty".into(),
            ));
        }
        if index.contains(['/', '\\']) {
            return Err(ConfigError::Validation(format!(
                "compiler.output_directory_index must be a file name, got {index:?}"
            )));
        }
        if self.compiler.bundler.first().is_none_or(|program| program.is_empty()) {
            return Err(ConfigError::Validation(
                "compiler.bundler must name a program".into(),
            ));
        }
        for pattern in &self.conventions.entrypoints {
            Regex::new(pattern).map_err(|e| {
                ConfigError::Validation(format!("conventions.entrypoints: {e}"))
            })?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceConfig {
    pub assets: String,
    pub contents: String,
    pub layouts: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            assets: "assets".to_string(),
            contents: "contents".to_string(),
            layouts: "layouts".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompilerConfig {
    /// Where rendered files go. `None` means `tmp/build-<env>`.
    pub output_root: Option<String>,
    /// Bundler output directory, relative to the output root. Its last
    /// component is also the public URL prefix of compiled assets.
    pub output_assets: String,
    /// File written for routes ending in `/`.
    pub output_directory_index: String,
    pub minify: bool,
    pub cache: bool,
    /// Bundler cache, relative to the site root. Only used when `cache` is on.
    pub cache_directory: Option<String>,
    /// Program and leading arguments of the bundler command.
    pub bundler: Vec<String>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            output_root: None,
            output_assets: "assets".to_string(),
            output_directory_index: "index.html".to_string(),
            minify: false,
            cache: false,
            cache_directory: Some("tmp/parcel".to_string()),
            bundler: vec!["yarn".to_string(), "run".to_string(), "parcel".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConventionsConfig {
    /// Layout for contents whose frontmatter names none, relative to the
    /// layouts directory. Ignored when the file does not exist.
    pub default_layout: Option<String>,
    /// Regexes over asset paths (relative to the assets directory) that mark
    /// an asset as a bundler entrypoint.
    pub entrypoints: Vec<String>,
}

impl Default for ConventionsConfig {
    fn default() -> Self {
        Self {
            default_layout: Some("default.html.erb".to_string()),
            entrypoints: vec![r"\.js$".to_string(), r"\.css$".to_string()],
        }
    }
}

/// `value` if set and non-empty, otherwise [`DEFAULT_ENV`].
pub fn env_or_default(value: Option<&str>) -> String {
    value
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_ENV)
        .to_string()
}

/// The environment named by `CONFINE_ENV`.
pub fn current_env() -> String {
    env_or_default(std::env::var(ENV_VAR).ok().as_deref())
}

/// Load `site.toml` from `root`.
///
/// Returns stock defaults when the file is absent. Rejects unknown keys and
/// validates the result.
pub fn load_config(root: &Path) -> Result<SiteConfig, ConfigError> {
    let config_path = root.join(CONFIG_FILE);
    if !config_path.exists() {
        return Ok(SiteConfig::default());
    }
    let content = fs::read_to_string(&config_path)?;
    let config: SiteConfig = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

// =============================================================================
// Resolved configuration
// =============================================================================

/// A validated [`SiteConfig`] bound to an existing site root.
#[derive(Debug, Clone)]
pub struct Config {
    root: PathBuf,
    env: String,
    site: SiteConfig,
}

impl Config {
    /// Fails with [`ConfigError::PathDoesNotExist`] when `root` is missing.
    pub fn new(
        root: impl AsRef<Path>,
        site: SiteConfig,
        env: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let root = paths::absolute(root.as_ref())?;
        if !root.is_dir() {
            return Err(ConfigError::PathDoesNotExist(root));
        }
        site.validate()?;
        Ok(Self {
            root,
            env: env.into(),
            site,
        })
    }

    /// Read `site.toml` below `root` and take the environment from
    /// `CONFINE_ENV`.
    pub fn load(root: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let root = paths::absolute(root.as_ref())?;
        if !root.is_dir() {
            return Err(ConfigError::PathDoesNotExist(root));
        }
        let site = load_config(&root)?;
        Self::new(root, site, current_env())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn env(&self) -> &str {
        &self.env
    }

    pub fn site(&self) -> &SiteConfig {
        &self.site
    }

    fn resolve(&self, base: &Path, relpath: &str) -> PathBuf {
        paths::clean(&paths::concat(base, [relpath]))
    }

    pub fn assets_path(&self) -> PathBuf {
        self.resolve(&self.root, &self.site.source.assets)
    }

    pub fn contents_path(&self) -> PathBuf {
        self.resolve(&self.root, &self.site.source.contents)
    }

    pub fn layouts_path(&self) -> PathBuf {
        self.resolve(&self.root, &self.site.source.layouts)
    }

    pub fn output_root_path(&self) -> PathBuf {
        match &self.site.compiler.output_root {
            Some(output_root) => self.resolve(&self.root, output_root),
            None => self.resolve(&self.root, &format!("tmp/build-{}", self.env)),
        }
    }

    pub fn output_assets_path(&self) -> PathBuf {
        self.resolve(&self.output_root_path(), &self.site.compiler.output_assets)
    }

    pub fn output_directory_index(&self) -> &str {
        &self.site.compiler.output_directory_index
    }

    pub fn minify(&self) -> bool {
        self.site.compiler.minify
    }

    /// Bundler cache directory, or `None` when caching is off.
    pub fn cache_directory_path(&self) -> Option<PathBuf> {
        if !self.site.compiler.cache {
            return None;
        }
        let directory = self.site.compiler.cache_directory.as_deref()?;
        Some(self.resolve(&self.root, directory))
    }

    pub fn bundler_command(&self) -> &[String] {
        &self.site.compiler.bundler
    }
}

/// Returns a fully-commented stock `site.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Confine Site Configuration
# ==========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Paths are relative to the directory holding this file.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Source directories
# ---------------------------------------------------------------------------
[source]
# Files handed to the bundler.
assets = "assets"

# Routed pages. Frontmatter headers are YAML between `---` lines.
contents = "contents"

# Wrapper templates and partials.
layouts = "layouts"

# ---------------------------------------------------------------------------
# Compiler
# ---------------------------------------------------------------------------
[compiler]
# Where rendered files go. When unset, "tmp/build-<env>" is used, where
# <env> is the CONFINE_ENV environment variable (default "development").
# output_root = "public"

# Bundler output directory, below output_root. Its name is also the
# public URL prefix of compiled assets.
output_assets = "assets"

# File written for routes that end in "/".
output_directory_index = "index.html"

# Let the bundler minify its output.
minify = false

# Let the bundler keep a cache between builds, in cache_directory.
cache = false
cache_directory = "tmp/parcel"

# Program and leading arguments used to run the bundler.
bundler = ["yarn", "run", "parcel"]

# ---------------------------------------------------------------------------
# Conventions used by `confine build`
# ---------------------------------------------------------------------------
[conventions]
# Layout for contents whose frontmatter has no `layout` key, relative to
# the layouts directory. Ignored when the file doesn't exist.
default_layout = "default.html.erb"

# Regexes over asset paths (relative to the assets directory) that mark an
# asset as a bundler entrypoint.
entrypoints = ['\.js$', '\.css$']
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_has_source_dirs() {
        let config = SiteConfig::default();
        assert_eq!(config.source.assets, "assets");
        assert_eq!(config.source.contents, "contents");
        assert_eq!(config.source.layouts, "layouts");
    }

    #[test]
    fn default_config_has_compiler_settings() {
        let config = SiteConfig::default();
        assert_eq!(config.compiler.output_root, None);
        assert_eq!(config.compiler.output_directory_index, "index.html");
        assert!(!config.compiler.minify);
        assert_eq!(config.compiler.bundler, vec!["yarn", "run", "parcel"]);
    }

    #[test]
    fn parse_partial_config() {
        let toml = r##"
[compiler]
output_root = "public"
minify = true
"##;
        let config: SiteConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.compiler.output_root.as_deref(), Some("public"));
        assert!(config.compiler.minify);
        // Unspecified defaults preserved
        assert_eq!(config.compiler.output_assets, "assets");
        assert_eq!(config.source.contents, "contents");
    }

    // =========================================================================
    // load_config tests
    // =========================================================================

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(load_config(tmp.path()).unwrap(), SiteConfig::default());
    }

    #[test]
    fn load_config_reads_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(CONFIG_FILE),
            r##"
[source]
contents = "pages"

[conventions]
entrypoints = ['^main\.ts$']
"##,
        )
        .unwrap();

        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.source.contents, "pages");
        assert_eq!(config.conventions.entrypoints, vec![r"^main\.ts$"]);
        assert_eq!(config.source.layouts, "layouts");
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(CONFIG_FILE), "this is not valid toml [[[").unwrap();
        assert!(matches!(load_config(tmp.path()), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn unknown_key_rejected() {
        let toml = r#"
[compiler]
output_dir = "public"
"#;
        assert!(toml::from_str::<SiteConfig>(toml).is_err());
    }

    #[test]
    fn unknown_section_rejected() {
        assert!(toml::from_str::<SiteConfig>("[server]\nport = 1").is_err());
    }

    // =========================================================================
    // Validation
    // =========================================================================

    #[test]
    fn validate_default_config_passes() {
        assert!(SiteConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_index() {
        let mut config = SiteConfig::default();
        config.compiler.output_directory_index = String::new();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        config.compiler.output_directory_index = "sub/index.html".into();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn validate_rejects_empty_bundler() {
        let mut config = SiteConfig::default();
        config.compiler.bundler.clear();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn validate_rejects_bad_entrypoint_regex() {
        let mut config = SiteConfig::default();
        config.conventions.entrypoints = vec!["(".into()];
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn load_config_validates_values() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(CONFIG_FILE), "[compiler]\nbundler = []\n").unwrap();
        assert!(matches!(
            load_config(tmp.path()),
            Err(ConfigError::Validation(_))
        ));
    }

    // =========================================================================
    // Config paths
    // =========================================================================

    #[test]
    fn missing_root_does_not_exist() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope");
        assert!(matches!(
            Config::new(&missing, SiteConfig::default(), "test"),
            Err(ConfigError::PathDoesNotExist(p)) if p.ends_with("nope")
        ));
        assert!(matches!(
            Config::load(&missing),
            Err(ConfigError::PathDoesNotExist(_))
        ));
    }

    #[test]
    fn derived_paths_hang_off_the_root() {
        let tmp = TempDir::new().unwrap();
        let config = Config::new(tmp.path(), SiteConfig::default(), "test").unwrap();
        let root = config.root().to_path_buf();

        assert_eq!(config.assets_path(), root.join("assets"));
        assert_eq!(config.contents_path(), root.join("contents"));
        assert_eq!(config.layouts_path(), root.join("layouts"));
        assert_eq!(config.output_root_path(), root.join("tmp/build-test"));
        assert_eq!(config.output_assets_path(), root.join("tmp/build-test/assets"));
        assert_eq!(config.cache_directory_path(), None);
    }

    #[test]
    fn absolute_looking_settings_stay_inside_the_root() {
        let tmp = TempDir::new().unwrap();
        let mut site = SiteConfig::default();
        site.compiler.output_root = Some("/public/".into());
        site.compiler.cache = true;
        let config = Config::new(tmp.path(), site, "test").unwrap();

        assert_eq!(config.output_root_path(), config.root().join("public"));
        assert_eq!(
            config.cache_directory_path(),
            Some(config.root().join("tmp/parcel"))
        );
    }

    #[test]
    fn env_defaults_to_development() {
        assert_eq!(env_or_default(None), "development");
        assert_eq!(env_or_default(Some("")), "development");
        assert_eq!(env_or_default(Some("production")), "production");
    }

    // =========================================================================
    // stock_config_toml tests
    // =========================================================================

    #[test]
    fn stock_config_toml_roundtrips_to_defaults() {
        let config: SiteConfig = toml::from_str(stock_config_toml()).unwrap();
        assert_eq!(config, SiteConfig::default());
    }

    #[test]
    fn stock_config_toml_contains_all_sections() {
        let content = stock_config_toml();
        assert!(content.contains("[source]"));
        assert!(content.contains("[compiler]"));
        assert!(content.contains("[conventions]"));
    }
}
