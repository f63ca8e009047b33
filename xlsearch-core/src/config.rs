//! Configuration for xlsearch

use crate::XlsearchError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration as TOML
pub const DEFAULT_CONFIG: &str = r#"# xlsearch Configuration

[core]
# Directory tree scanned for spreadsheets
watch_dir = "."
# SQLite database holding the index
db_path = "xlsearch.db"
# Time between background scans (e.g., "30s", "5m", "1h")
reindex_interval = "5m"
# Page size used when a search does not ask for one
default_limit = 50
# Upper bound on a single page
max_limit = 500

[indexing]
# Files matching this glob (relative to watch_dir) are indexed
glob = "**/*.{xlsx,xlsm,xlsb,xls,ods}"
# Treat the first row of every sheet as a header and leave it out of the index
skip_header = false

[fts]
# FTS5 tokenizer; trigram matches any substring of three or more characters
tokenizer = "trigram"
# Characters of row content shown in a snippet
snippet_chars = 100

[ignore]
# Path components that are never scanned
patterns = [
    ".git",
    "node_modules",
    "__pycache__",
]

[auth]
# Secret required by the reset operation; empty disables reset
secret = ""
"#;

/// xlsearch configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub core: CoreConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub fts: FtsConfig,
    #[serde(default)]
    pub ignore: IgnoreConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    #[serde(default = "default_watch_dir")]
    pub watch_dir: PathBuf,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_reindex_interval")]
    pub reindex_interval: String,
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    #[serde(default = "default_glob")]
    pub glob: String,
    #[serde(default)]
    pub skip_header: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FtsConfig {
    #[serde(default = "default_tokenizer")]
    pub tokenizer: String,
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IgnoreConfig {
    #[serde(default = "default_ignore_patterns")]
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub secret: String,
}

// Default value functions
fn default_watch_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_db_path() -> PathBuf {
    PathBuf::from("xlsearch.db")
}
fn default_reindex_interval() -> String {
    "5m".to_string()
}
fn default_limit() -> usize {
    50
}
fn default_max_limit() -> usize {
    500
}
fn default_glob() -> String {
    "**/*.{xlsx,xlsm,xlsb,xls,ods}".to_string()
}
fn default_tokenizer() -> String {
    "trigram".to_string()
}
fn default_snippet_chars() -> usize {
    100
}
fn default_ignore_patterns() -> Vec<String> {
    vec![
        ".git".to_string(),
        "node_modules".to_string(),
        "__pycache__".to_string(),
    ]
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            watch_dir: default_watch_dir(),
            db_path: default_db_path(),
            reindex_interval: default_reindex_interval(),
            default_limit: default_limit(),
            max_limit: default_max_limit(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            glob: default_glob(),
            skip_header: false,
        }
    }
}

impl Default for FtsConfig {
    fn default() -> Self {
        Self {
            tokenizer: default_tokenizer(),
            snippet_chars: default_snippet_chars(),
        }
    }
}

impl Default for IgnoreConfig {
    fn default() -> Self {
        Self {
            patterns: default_ignore_patterns(),
        }
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn load(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse config from TOML string
    pub fn from_toml(content: &str) -> crate::Result<Self> {
        toml::from_str(content).map_err(|e| XlsearchError::ConfigParse(e.to_string()))
    }

    /// Config rooted at `watch_dir` with the index stored at `db_path`
    pub fn for_paths(watch_dir: impl Into<PathBuf>, db_path: impl Into<PathBuf>) -> Self {
        let mut config = Self::default();
        config.core.watch_dir = watch_dir.into();
        config.core.db_path = db_path.into();
        config
    }

    /// Get the background reindex period as Duration.
    ///
    /// Unparseable and zero periods fall back to five minutes.
    pub fn reindex_interval(&self) -> Duration {
        match parse_duration(&self.core.reindex_interval) {
            Some(period) if !period.is_zero() => period,
            _ => {
                tracing::warn!(
                    value = %self.core.reindex_interval,
                    "invalid reindex_interval, using 5m"
                );
                DEFAULT_REINDEX_PERIOD
            }
        }
    }

    /// Clamp a requested page size to `max_limit`. A limit of 0 yields an empty page.
    pub fn page_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.core.default_limit)
            .min(self.core.max_limit)
    }
}

const DEFAULT_REINDEX_PERIOD: Duration = Duration::from_secs(300);

/// Parse duration string (e.g., "1h", "30m", "1d")
fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let (split, unit) = s.char_indices().last()?;
    let num: u64 = s[..split].parse().ok()?;

    let secs = match unit {
        's' => Some(num),
        'm' => num.checked_mul(60),
        'h' => num.checked_mul(3600),
        'd' => num.checked_mul(86_400),
        _ => None,
    }?;
    Some(Duration::from_secs(secs))
}
