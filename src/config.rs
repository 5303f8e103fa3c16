//! Runtime configuration.
//!
//! Loaded in order:
//! 1. built-in defaults
//! 2. the TOML file named by `CAPTIONSCORE_CONFIG`, if set
//! 3. `CAPTIONSCORE_*` environment overrides

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{EvalError, Result};

pub const ENV_PREFIX: &str = "CAPTIONSCORE";

/// NLTK's packaged WordNet 3.0 `dict/` files.
pub const DEFAULT_WORDNET_URL: &str =
    "https://raw.githubusercontent.com/nltk/nltk_data/gh-pages/packages/corpora/wordnet.zip";

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct EvalConfig {
    pub lexicon: LexiconConfig,
    pub spice: SpiceConfig,
    /// `tracing_subscriber::EnvFilter` directive, e.g. `captionscore=debug`.
    pub log_filter: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LexiconConfig {
    /// Directory holding the WordNet `dict/` files.
    pub data_dir: PathBuf,
    /// Where missing dict files come from: a `.zip` archive holding them, or
    /// a base URL serving each file as `{url}/{file}`. `None` disables fetching.
    pub download_url: Option<String>,
    pub auto_download: bool,
}

impl Default for LexiconConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("wordnet/dict"),
            download_url: Some(DEFAULT_WORDNET_URL.to_string()),
            auto_download: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SpiceConfig {
    pub java_bin: String,
    pub jar_path: PathBuf,
    pub cache_dir: PathBuf,
    /// Where payload and result files are written for each call.
    pub work_dir: PathBuf,
    pub max_heap: String,
    pub detailed: bool,
    pub subset: bool,
}

impl Default for SpiceConfig {
    fn default() -> Self {
        Self {
            java_bin: "java".to_string(),
            jar_path: PathBuf::from("SPICE-1.0/spice-1.0.jar"),
            cache_dir: PathBuf::from("spice_cache"),
            work_dir: std::env::temp_dir(),
            max_heap: "8G".to_string(),
            detailed: true,
            subset: true,
        }
    }
}

impl EvalConfig {
    /// Load a TOML file. Fields absent from the file keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| EvalError::io(path, e))?;
        let config: EvalConfig = toml::from_str(&content).map_err(|e| {
            EvalError::Config(format!("failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self> {
        let mut config = match env_var("CONFIG") {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_overrides(env_var);
        config.validate()?;
        Ok(config)
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("WORDNET_DIR") {
            self.lexicon.data_dir = PathBuf::from(dir);
        }
        if let Some(url) = lookup("WORDNET_URL") {
            self.lexicon.download_url = Some(url);
        }
        if let Some(jar) = lookup("SPICE_JAR") {
            self.spice.jar_path = PathBuf::from(jar);
        }
        if let Some(java) = lookup("JAVA") {
            self.spice.java_bin = java;
        }
        if let Some(filter) = lookup("LOG") {
            self.log_filter = Some(filter);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.spice.java_bin.trim().is_empty() {
            return Err(EvalError::Config("spice.java_bin must not be empty".into()));
        }
        if self.spice.max_heap.trim().is_empty() {
            return Err(EvalError::Config("spice.max_heap must not be empty".into()));
        }
        if let Some(url) = &self.lexicon.download_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(EvalError::Config(format!(
                    "lexicon.download_url must be an http(s) URL, got '{}'",
                    url
                )));
            }
        }
        Ok(())
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(format!("{}_{}", ENV_PREFIX, key))
        .ok()
        .filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_validate() {
        let config = EvalConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.spice.java_bin, "java");
        assert!(config.lexicon.auto_download);
        assert_eq!(
            config.lexicon.download_url.as_deref(),
            Some(DEFAULT_WORDNET_URL)
        );
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "log_filter = \"debug\"\n[spice]\nmax_heap = \"2G\"\n[lexicon]\ndata_dir = \"/opt/wn\""
        )
        .unwrap();

        let config = EvalConfig::from_file(file.path()).unwrap();
        assert_eq!(config.spice.max_heap, "2G");
        assert_eq!(config.spice.java_bin, "java");
        assert_eq!(config.lexicon.data_dir, PathBuf::from("/opt/wn"));
        assert_eq!(config.log_filter.as_deref(), Some("debug"));
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[spice\nmax_heap = 1").unwrap();
        let err = EvalConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, EvalError::Config(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = EvalConfig::from_file(Path::new("/nonexistent/captionscore.toml")).unwrap_err();
        assert!(matches!(err, EvalError::Io { .. }));
    }

    #[test]
    fn test_overrides_apply() {
        let vars: HashMap<&str, &str> = [
            ("WORDNET_DIR", "/data/wordnet"),
            ("WORDNET_URL", "https://example.org/dict"),
            ("JAVA", "/usr/bin/java17"),
        ]
        .into_iter()
        .collect();

        let mut config = EvalConfig::default();
        config.apply_overrides(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.lexicon.data_dir, PathBuf::from("/data/wordnet"));
        assert_eq!(
            config.lexicon.download_url.as_deref(),
            Some("https://example.org/dict")
        );
        assert_eq!(config.spice.java_bin, "/usr/bin/java17");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_empty_java_and_bad_url() {
        let mut config = EvalConfig::default();
        config.spice.java_bin = " ".into();
        assert!(config.validate().is_err());

        let mut config = EvalConfig::default();
        config.lexicon.download_url = Some("ftp://mirror/dict".into());
        assert!(config.validate().is_err());
    }
}
