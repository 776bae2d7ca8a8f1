//! Configuration loading from `.aexpyrc.toml`.
//!
//! Configuration is optional; every setting has a default. Command-line flags
//! win over environment variables, which win over the file.
//!
//! # Example Configuration
//!
//! ```toml
//! [extract]
//! python = "python3.12"
//! inspector = "target/release/aexpy-inspect"
//! enrich = true
//! mypy = true
//!
//! [diff]
//! any_suppresses_return_type = true
//! verify = false
//!
//! [verify]
//! timeout_secs = 60
//! python = "python3"
//! venv = false
//!
//! [output]
//! gzip = false
//! color = true
//! format = "table"
//!
//! [cache]
//! enabled = true
//! directory = ".aexpy/cache"
//! ```

use std::path::{Path, PathBuf};

use aexpy_core::{DiffOptions, ExtractOptions, FileCache, VerifyOptions};
use serde::Deserialize;

/// Name of the configuration file looked up in the working directory.
pub const CONFIG_FILE: &str = ".aexpyrc.toml";

/// Environment variable enabling gzip output.
pub const ENV_GZIP: &str = "AEXPY_GZIP";

/// Environment variable naming the interpreter.
pub const ENV_PYTHON: &str = "AEXPY_PYTHON";

const DEFAULT_CACHE_DIR: &str = ".aexpy/cache";

const INSPECTOR_NAME: &str = "aexpy-inspect";

/// Root configuration structure loaded from `.aexpyrc.toml`.
#[derive(Debug, Deserialize, Default)]
pub struct AexpyConfig {
    #[serde(default)]
    pub extract: ExtractSettings,

    #[serde(default)]
    pub diff: DiffSettings,

    #[serde(default)]
    pub verify: VerifySettings,

    #[serde(default)]
    pub output: OutputSettings,

    #[serde(default)]
    pub cache: CacheConfig,
}

/// Extraction settings.
#[derive(Debug, Deserialize)]
pub struct ExtractSettings {
    /// Interpreter the inspector runs against.
    #[serde(default)]
    pub python: Option<String>,

    /// Path of the `aexpy-inspect` binary.
    ///
    /// Defaults to the binary next to the running `aexpy`, then `PATH`.
    #[serde(default)]
    pub inspector: Option<PathBuf>,

    /// Run the source, type and call-graph enrichers.
    #[serde(default = "default_true")]
    pub enrich: bool,

    /// Use mypy for inferred types when the environment has it.
    #[serde(default = "default_true")]
    pub mypy: bool,
}

impl Default for ExtractSettings {
    fn default() -> Self {
        Self {
            python: None,
            inspector: None,
            enrich: true,
            mypy: true,
        }
    }
}

/// Diff settings.
#[derive(Debug, Deserialize)]
pub struct DiffSettings {
    /// Hide return type changes when one side is an inferred `Any` that was
    /// never written as an annotation.
    #[serde(default = "default_true")]
    pub any_suppresses_return_type: bool,

    /// Run the trigger verifier after diffing.
    #[serde(default)]
    pub verify: bool,
}

impl Default for DiffSettings {
    fn default() -> Self {
        Self {
            any_suppresses_return_type: true,
            verify: false,
        }
    }
}

/// Trigger verifier settings.
#[derive(Debug, Deserialize, Default)]
pub struct VerifySettings {
    /// Per-snippet timeout. Default: 60 seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Interpreter snippets run with. Falls back to the extraction one.
    #[serde(default)]
    pub python: Option<String>,

    /// Install each release into a throwaway virtual environment.
    #[serde(default)]
    pub venv: bool,
}

/// Output preferences.
#[derive(Debug, Deserialize, Default)]
pub struct OutputSettings {
    /// Gzip products written to files and stdout.
    #[serde(default)]
    pub gzip: Option<bool>,

    /// Whether to use colored output. Defaults to TTY detection.
    #[serde(default)]
    pub color: Option<bool>,

    /// Default format of `aexpy view`: `table` or `json`.
    #[serde(default)]
    pub format: Option<String>,
}

/// Product cache.
///
/// When enabled, every stage stores its product and captured log under the
/// cache directory, and `extract`/`diff` reuse successful cached products.
#[derive(Debug, Deserialize, Default)]
pub struct CacheConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Defaults to `.aexpy/cache` in the working directory.
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Truthy environment values: `1`, `true`, `yes`, `on`.
fn truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl AexpyConfig {
    /// Load configuration from `.aexpyrc.toml` in the given directory.
    ///
    /// A missing or unparsable file yields defaults; parse errors are logged.
    pub fn load(root: &Path) -> Self {
        let config_path = root.join(CONFIG_FILE);
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match toml::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse {}: {}", CONFIG_FILE, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read {}: {}", CONFIG_FILE, e);
                }
            }
        }
        Self::default()
    }

    /// Whether products are gzipped: `--gzip`, then `AEXPY_GZIP`, then the file.
    pub fn gzip(&self, flag: bool) -> bool {
        self.resolve_gzip(flag, env_var(ENV_GZIP).as_deref())
    }

    fn resolve_gzip(&self, flag: bool, env: Option<&str>) -> bool {
        if flag {
            return true;
        }
        match env {
            Some(value) => truthy(value),
            None => self.output.gzip.unwrap_or(false),
        }
    }

    /// Explicit interpreter for extraction: `--python`, then `AEXPY_PYTHON`,
    /// then the file. `None` lets the distribution's pyversion decide.
    pub fn python(&self, flag: Option<&str>) -> Option<String> {
        self.resolve_python(flag, env_var(ENV_PYTHON).as_deref())
    }

    fn resolve_python(&self, flag: Option<&str>, env: Option<&str>) -> Option<String> {
        flag.or(env)
            .or(self.extract.python.as_deref())
            .map(str::to_string)
    }

    /// Interpreter for trigger snippets. `[verify].python` overrides the
    /// extraction interpreter when no flag or environment variable is set.
    pub fn verify_python(&self, flag: Option<&str>) -> Option<String> {
        match (flag, env_var(ENV_PYTHON), &self.verify.python) {
            (Some(python), _, _) => Some(python.to_string()),
            (None, Some(python), _) => Some(python),
            (None, None, Some(python)) => Some(python.clone()),
            (None, None, None) => self.python(None),
        }
    }

    /// Inspector binary: `--inspector`, then the file, then the binary next
    /// to the running executable, then `aexpy-inspect` on `PATH`.
    pub fn inspector(&self, flag: Option<&Path>) -> PathBuf {
        if let Some(path) = flag.or(self.extract.inspector.as_deref()) {
            return path.to_path_buf();
        }
        let sibling = std::env::current_exe().ok().map(|exe| {
            exe.with_file_name(format!("{}{}", INSPECTOR_NAME, std::env::consts::EXE_SUFFIX))
        });
        match sibling {
            Some(path) if path.is_file() => path,
            _ => PathBuf::from(INSPECTOR_NAME),
        }
    }

    pub fn extract_options(&self, inspector: Option<&Path>, no_enrich: bool, no_mypy: bool, install: bool) -> ExtractOptions {
        ExtractOptions {
            inspector: self.inspector(inspector),
            enrich: self.extract.enrich && !no_enrich,
            install,
            mypy: self.extract.mypy && !no_mypy,
        }
    }

    pub fn verify_options(&self, python: Option<&str>, timeout: Option<u64>, venv: bool) -> VerifyOptions {
        let defaults = VerifyOptions::default();
        VerifyOptions {
            timeout_secs: timeout
                .or(self.verify.timeout_secs)
                .unwrap_or(defaults.timeout_secs),
            python: self.verify_python(python),
            venv: venv || self.verify.venv,
        }
    }

    /// Diff options. Verification runs when `--verify` is given or the file
    /// enables it.
    pub fn diff_options(&self, strict_return_types: bool, verify: Option<VerifyOptions>) -> DiffOptions {
        DiffOptions {
            any_suppresses_return_type: self.diff.any_suppresses_return_type && !strict_return_types,
            verify,
        }
    }

    /// Cache to read from and write to, if enabled.
    pub fn cache(&self, gzip: bool) -> Option<FileCache> {
        if !self.cache.enabled {
            return None;
        }
        let dir = self.cache.directory.as_deref().unwrap_or(DEFAULT_CACHE_DIR);
        Some(FileCache::new(dir, gzip))
    }

    /// Default output format, if configured.
    pub fn default_format(&self) -> Option<&str> {
        self.output.format.as_deref()
    }

    /// Returns the configured value, or `None` to use auto-detection.
    pub fn use_color(&self) -> Option<bool> {
        self.output.color
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = AexpyConfig::default();
        assert!(config.extract.enrich);
        assert!(config.extract.mypy);
        assert!(config.diff.any_suppresses_return_type);
        assert!(!config.diff.verify);
        assert!(!config.cache.enabled);
        assert!(config.cache(false).is_none());
        assert_eq!(config.resolve_python(None, None), None);
        assert!(!config.resolve_gzip(false, None));
    }

    #[test]
    fn test_parse_full_config() {
        let toml_content = r#"
[extract]
python = "python3.11"
inspector = "/opt/aexpy/aexpy-inspect"
enrich = false
mypy = false

[diff]
any_suppresses_return_type = false
verify = true

[verify]
timeout_secs = 5
venv = true

[output]
gzip = true
color = false
format = "json"

[cache]
enabled = true
directory = "/tmp/aexpy-cache"
"#;
        let config: AexpyConfig = toml::from_str(toml_content).unwrap();

        assert_eq!(config.extract.python.as_deref(), Some("python3.11"));
        assert_eq!(config.inspector(None), PathBuf::from("/opt/aexpy/aexpy-inspect"));
        let extract = config.extract_options(None, false, false, false);
        assert!(!extract.enrich);
        assert!(!extract.mypy);

        assert!(config.diff.verify);
        let diff = config.diff_options(false, None);
        assert!(!diff.any_suppresses_return_type);

        let verify = config.verify_options(Some("python3"), None, false);
        assert_eq!(verify.timeout_secs, 5);
        assert!(verify.venv);
        assert_eq!(verify.python.as_deref(), Some("python3"));

        assert!(config.resolve_gzip(false, None));
        assert_eq!(config.use_color(), Some(false));
        assert_eq!(config.default_format(), Some("json"));

        let cache = config.cache(true).unwrap();
        assert_eq!(cache.dir(), Path::new("/tmp/aexpy-cache"));
    }

    #[test]
    fn test_precedence_flag_env_file() {
        let config: AexpyConfig = toml::from_str("[extract]\npython = \"file-python\"\n[output]\ngzip = false\n").unwrap();

        assert_eq!(config.resolve_python(Some("flag-python"), Some("env-python")).as_deref(), Some("flag-python"));
        assert_eq!(config.resolve_python(None, Some("env-python")).as_deref(), Some("env-python"));
        assert_eq!(config.resolve_python(None, None).as_deref(), Some("file-python"));

        assert!(config.resolve_gzip(true, Some("0")));
        assert!(config.resolve_gzip(false, Some("yes")));
        assert!(!config.resolve_gzip(false, Some("off")));
        assert!(!config.resolve_gzip(false, None));
    }

    #[test]
    fn test_partial_sections_keep_defaults() {
        let config: AexpyConfig = toml::from_str("[diff]\nverify = true\n").unwrap();
        assert!(config.diff.any_suppresses_return_type);
        assert!(config.extract.enrich);
        let diff = config.diff_options(true, None);
        assert!(!diff.any_suppresses_return_type);
    }

    #[test]
    fn test_load_falls_back_on_invalid_file() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "[cache\nenabled = yes").unwrap();
        let config = AexpyConfig::load(dir.path());
        assert!(!config.cache.enabled);

        std::fs::write(dir.path().join(CONFIG_FILE), "[cache]\nenabled = true\n").unwrap();
        assert!(AexpyConfig::load(dir.path()).cache.enabled);
    }
}
