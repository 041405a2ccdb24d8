//! Configuration structures and loading.

use crate::error::{ConfigError, ConfigResult};
use crate::paths::AppPaths;
use castindex_core::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub chunking: ChunkingConfig,

    #[serde(default)]
    pub tagging: TaggingConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub metadata: MetadataConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    /// Load configuration from the default location, then apply environment overrides.
    pub fn load() -> ConfigResult<Self> {
        let paths = AppPaths::new().ok_or(ConfigError::NoConfigDir)?;
        let mut config = Self::load_from(&paths.config_file)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> ConfigResult<()> {
        let contents = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Create a default config file with comments.
    pub fn create_default_file(path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, Self::default_config_string())?;
        Ok(())
    }

    /// Generate a default config file with helpful comments.
    pub fn default_config_string() -> String {
        r#"# castindex configuration
# Transcript ingestion and vector indexing

[source]
# Root directory of the document store. Each group is a subdirectory
# holding one JSON document per file.
root = "~/castindex/documents"

# Groups to ingest when none are given on the command line.
# Empty means every group under root.
groups = []

# File pattern of documents inside a group
file_pattern = "*.json"

# Optional external text normalizer (reads stdin, writes stdout)
# normalizer_command = "opencc -c s2twp.json"

[chunking]
max_chunk_size = 1024          # Characters per chunk, overlap included
overlap = 100                  # Characters carried into the next chunk
unit = "line"                  # line, sentence or paragraph

[tagging]
confidence_threshold = 0.3
max_tags = 3
# mapping_file = "~/castindex/tag_mapping.csv"
# terms_file = "~/castindex/terms.txt"

[embedding]
host = "http://localhost:11434"
model = "bge-m3"
dimension = 1024
batch_size = 32
timeout_seconds = 120

[index]
backend = "milvus"             # milvus or sqlite
host = "localhost"
port = 19530
collection = "podcast_chunks"
batch_size = 100
index_type = "HNSW"
metric_type = "COSINE"
hnsw_m = 16
ef_construction = 200
timeout_seconds = 60

[metadata]
# Minimum Jaro-Winkler similarity between a parsed title and a stored title
title_similarity = 0.85

[retry]
max_retries = 1
initial_backoff_ms = 500
max_backoff_ms = 8000

[output]
progress_format = "json"       # json or log
"#
        .to_string()
    }

    /// Apply overrides from process environment variables.
    pub fn apply_env_overrides(&mut self) -> ConfigResult<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        for (var, key) in ENV_OVERRIDES {
            if let Some(value) = lookup(var) {
                debug!("Config override from {}", var);
                self.set_value(key, &value)?;
            }
        }
        Ok(())
    }

    /// Set a single value addressed as `section.key`.
    pub fn set_value(&mut self, key: &str, value: &str) -> ConfigResult<()> {
        let parts: Vec<&str> = key.split('.').collect();

        match parts.as_slice() {
            ["source", "root"] => self.source.root = value.to_string(),
            ["source", "groups"] => {
                self.source.groups = value
                    .split(',')
                    .map(|g| g.trim().to_string())
                    .filter(|g| !g.is_empty())
                    .collect();
            }
            ["source", "row_limit"] => self.source.row_limit = Some(parse(key, value)?),
            ["source", "file_pattern"] => self.source.file_pattern = value.to_string(),
            ["source", "normalizer_command"] => {
                self.source.normalizer_command = Some(value.to_string())
            }
            ["chunking", "max_chunk_size"] => self.chunking.max_chunk_size = parse(key, value)?,
            ["chunking", "overlap"] => self.chunking.overlap = parse(key, value)?,
            ["chunking", "unit"] => self.chunking.unit = value.to_string(),
            ["tagging", "confidence_threshold"] => {
                self.tagging.confidence_threshold = parse(key, value)?
            }
            ["tagging", "max_tags"] => self.tagging.max_tags = parse(key, value)?,
            ["tagging", "mapping_file"] => self.tagging.mapping_file = Some(value.to_string()),
            ["tagging", "terms_file"] => self.tagging.terms_file = Some(value.to_string()),
            ["embedding", "host"] => self.embedding.host = value.to_string(),
            ["embedding", "model"] => self.embedding.model = value.to_string(),
            ["embedding", "dimension"] => self.embedding.dimension = parse(key, value)?,
            ["embedding", "batch_size"] => self.embedding.batch_size = parse(key, value)?,
            ["embedding", "timeout_seconds"] => {
                self.embedding.timeout_seconds = parse(key, value)?
            }
            ["index", "backend"] => self.index.backend = value.to_string(),
            ["index", "host"] => self.index.host = value.to_string(),
            ["index", "port"] => self.index.port = parse(key, value)?,
            ["index", "collection"] => self.index.collection = value.to_string(),
            ["index", "batch_size"] => self.index.batch_size = parse(key, value)?,
            ["index", "index_type"] => self.index.index_type = value.to_string(),
            ["index", "metric_type"] => self.index.metric_type = value.to_string(),
            ["index", "token"] => self.index.token = Some(value.to_string()),
            ["index", "sqlite_path"] => self.index.sqlite_path = Some(value.to_string()),
            ["metadata", "database_path"] => {
                self.metadata.database_path = Some(value.to_string())
            }
            ["metadata", "title_similarity"] => {
                self.metadata.title_similarity = parse(key, value)?
            }
            ["retry", "max_retries"] => self.retry.max_retries = parse(key, value)?,
            ["retry", "initial_backoff_ms"] => self.retry.initial_backoff_ms = parse(key, value)?,
            ["retry", "max_backoff_ms"] => self.retry.max_backoff_ms = parse(key, value)?,
            ["output", "progress_file"] => self.output.progress_file = Some(value.to_string()),
            ["output", "progress_format"] => self.output.progress_format = value.to_string(),
            ["output", "error_dir"] => self.output.error_dir = Some(value.to_string()),
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }

        Ok(())
    }

    /// Reject combinations the pipeline cannot run with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.chunking.max_chunk_size == 0 {
            return Err(ConfigError::Invalid("chunking.max_chunk_size must be > 0".into()));
        }
        if self.chunking.overlap >= self.chunking.max_chunk_size {
            return Err(ConfigError::Invalid(format!(
                "chunking.overlap ({}) must be smaller than chunking.max_chunk_size ({})",
                self.chunking.overlap, self.chunking.max_chunk_size
            )));
        }
        if !["line", "sentence", "paragraph"].contains(&self.chunking.unit.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "chunking.unit must be line, sentence or paragraph, got '{}'",
                self.chunking.unit
            )));
        }
        if !(0.0..=1.0).contains(&self.tagging.confidence_threshold) {
            return Err(ConfigError::Invalid(
                "tagging.confidence_threshold must be within [0, 1]".into(),
            ));
        }
        if self.tagging.max_tags == 0 || self.tagging.max_tags > 3 {
            return Err(ConfigError::Invalid("tagging.max_tags must be 1..=3".into()));
        }
        if self.embedding.dimension == 0 {
            return Err(ConfigError::Invalid("embedding.dimension must be > 0".into()));
        }
        if self.embedding.batch_size == 0 || self.index.batch_size == 0 {
            return Err(ConfigError::Invalid("batch sizes must be > 0".into()));
        }
        if !["milvus", "sqlite"].contains(&self.index.backend.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "index.backend must be milvus or sqlite, got '{}'",
                self.index.backend
            )));
        }
        if !["json", "log"].contains(&self.output.progress_format.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "output.progress_format must be json or log, got '{}'",
                self.output.progress_format
            )));
        }
        Ok(())
    }

    /// Root directory of the document store, with `~` expanded.
    pub fn source_root(&self) -> PathBuf {
        expand(&self.source.root)
    }

    pub fn metadata_database(&self, paths: &AppPaths) -> PathBuf {
        resolve(self.metadata.database_path.as_deref(), &paths.database_file)
    }

    pub fn progress_file(&self, paths: &AppPaths) -> PathBuf {
        resolve(self.output.progress_file.as_deref(), &paths.progress_file)
    }

    pub fn error_dir(&self, paths: &AppPaths) -> PathBuf {
        resolve(self.output.error_dir.as_deref(), &paths.error_dir)
    }

    pub fn index_file(&self, paths: &AppPaths) -> PathBuf {
        resolve(self.index.sqlite_path.as_deref(), &paths.index_file)
    }
}

/// Environment variables and the config keys they override.
pub const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("CASTINDEX_SOURCE_ROOT", "source.root"),
    ("CASTINDEX_GROUPS", "source.groups"),
    ("CASTINDEX_MAX_CHUNK_SIZE", "chunking.max_chunk_size"),
    ("CASTINDEX_OVERLAP", "chunking.overlap"),
    ("CASTINDEX_TAG_THRESHOLD", "tagging.confidence_threshold"),
    ("CASTINDEX_EMBED_HOST", "embedding.host"),
    ("CASTINDEX_EMBED_MODEL", "embedding.model"),
    ("CASTINDEX_EMBED_DIM", "embedding.dimension"),
    ("CASTINDEX_INDEX_BACKEND", "index.backend"),
    ("CASTINDEX_INDEX_HOST", "index.host"),
    ("CASTINDEX_INDEX_PORT", "index.port"),
    ("CASTINDEX_INDEX_TOKEN", "index.token"),
    ("CASTINDEX_COLLECTION", "index.collection"),
    ("CASTINDEX_BATCH_SIZE", "index.batch_size"),
];

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> ConfigResult<T> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

fn resolve(configured: Option<&str>, default: &Path) -> PathBuf {
    configured.map(expand).unwrap_or_else(|| default.to_path_buf())
}

/// Document store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub root: String,
    pub groups: Vec<String>,
    pub row_limit: Option<usize>,
    pub file_pattern: String,
    pub normalizer_command: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            root: "~/castindex/documents".to_string(),
            groups: vec![],
            row_limit: None,
            file_pattern: "*.json".to_string(),
            normalizer_command: None,
        }
    }
}

/// Text chunking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub max_chunk_size: usize,
    pub overlap: usize,
    pub unit: String,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 1024,
            overlap: 100,
            unit: "line".to_string(),
        }
    }
}

/// Tag extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaggingConfig {
    pub confidence_threshold: f32,
    pub max_tags: usize,
    pub mapping_file: Option<String>,
    pub terms_file: Option<String>,
}

impl Default for TaggingConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.3,
            max_tags: 3,
            mapping_file: None,
            terms_file: None,
        }
    }
}

impl TaggingConfig {
    pub fn mapping_path(&self) -> Option<PathBuf> {
        self.mapping_file.as_deref().map(expand)
    }

    pub fn terms_path(&self) -> Option<PathBuf> {
        self.terms_file.as_deref().map(expand)
    }
}

/// Embedding model settings (Ollama).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub host: String,
    pub model: String,
    pub dimension: usize,
    pub batch_size: usize,
    pub timeout_seconds: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost:11434".to_string(),
            model: "bge-m3".to_string(),
            dimension: 1024,
            batch_size: 32,
            timeout_seconds: 120,
        }
    }
}

/// Vector index settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub backend: String,
    pub host: String,
    pub port: u16,
    pub collection: String,
    pub batch_size: usize,
    pub index_type: String,
    pub metric_type: String,
    pub hnsw_m: u32,
    pub ef_construction: u32,
    pub timeout_seconds: u64,
    pub token: Option<String>,
    pub sqlite_path: Option<String>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: "milvus".to_string(),
            host: "localhost".to_string(),
            port: 19530,
            collection: "podcast_chunks".to_string(),
            batch_size: 100,
            index_type: "HNSW".to_string(),
            metric_type: "COSINE".to_string(),
            hnsw_m: 16,
            ef_construction: 200,
            timeout_seconds: 60,
            token: None,
            sqlite_path: None,
        }
    }
}

impl IndexConfig {
    /// Base URL of the Milvus REST endpoint.
    pub fn endpoint(&self) -> String {
        if self.host.starts_with("http://") || self.host.starts_with("https://") {
            format!("{}:{}", self.host.trim_end_matches('/'), self.port)
        } else {
            format!("http://{}:{}", self.host, self.port)
        }
    }
}

/// Relational metadata store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    pub database_path: Option<String>,
    pub title_similarity: f64,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            title_similarity: 0.85,
        }
    }
}

/// Retry settings for external stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 1,
            initial_backoff_ms: 500,
            max_backoff_ms: 8000,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

/// Progress and error export settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub progress_file: Option<String>,
    pub progress_format: String,
    pub error_dir: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            progress_file: None,
            progress_format: "json".to_string(),
            error_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.chunking.max_chunk_size, 1024);
        assert_eq!(config.chunking.overlap, 100);
        assert_eq!(config.index.port, 19530);
        assert!((config.tagging.confidence_threshold - 0.3).abs() < f32::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_file_parses_to_defaults() {
        let config: Config = toml::from_str(&Config::default_config_string()).unwrap();
        assert_eq!(config.embedding.model, Config::default().embedding.model);
        assert_eq!(config.index.collection, "podcast_chunks");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip() {
        let config = Config::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let deserialized: Config = toml::from_str(&serialized).unwrap();

        assert_eq!(config.index.host, deserialized.index.host);
        assert_eq!(config.embedding.dimension, deserialized.embedding.dimension);
    }

    #[test]
    fn test_load_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
            [chunking]
            max_chunk_size = 512
            "#
        )
        .unwrap();

        let config = Config::load_from(temp_file.path()).unwrap();

        assert_eq!(config.chunking.max_chunk_size, 512);
        // Defaults should still work
        assert_eq!(config.chunking.overlap, 100);
        assert_eq!(config.index.collection, "podcast_chunks");
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("CASTINDEX_GROUPS", "show-a, show-b"),
            ("CASTINDEX_MAX_CHUNK_SIZE", "2048"),
            ("CASTINDEX_INDEX_PORT", "19531"),
            ("CASTINDEX_TAG_THRESHOLD", "0.5"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.source.groups, vec!["show-a", "show-b"]);
        assert_eq!(config.chunking.max_chunk_size, 2048);
        assert_eq!(config.index.port, 19531);
        assert!((config.tagging.confidence_threshold - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_env_override_rejects_bad_number() {
        let mut config = Config::default();
        let result = config.apply_overrides(|key| {
            (key == "CASTINDEX_INDEX_PORT").then(|| "not-a-port".to_string())
        });
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_set_unknown_key() {
        let mut config = Config::default();
        assert!(matches!(
            config.set_value("index.nope", "1"),
            Err(ConfigError::UnknownKey(_))
        ));
    }

    #[test]
    fn test_validate_rejects_overlap_not_smaller_than_max() {
        let mut config = Config::default();
        config.chunking.overlap = config.chunking.max_chunk_size;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_unit_and_backend() {
        let mut config = Config::default();
        config.chunking.unit = "word".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.index.backend = "faiss".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_policy_conversion() {
        let retry = RetryConfig {
            max_retries: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 1000,
        };
        let policy = retry.policy();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.delay(1), Duration::from_millis(100));
    }

    #[test]
    fn test_index_endpoint() {
        let mut index = IndexConfig::default();
        assert_eq!(index.endpoint(), "http://localhost:19530");
        index.host = "https://milvus.example.com/".to_string();
        index.port = 443;
        assert_eq!(index.endpoint(), "https://milvus.example.com:443");
    }

    #[test]
    fn test_resolve_paths_prefers_configured() {
        let paths = AppPaths::rooted(PathBuf::from("/cfg"), PathBuf::from("/data"));
        let mut config = Config::default();
        assert_eq!(config.progress_file(&paths), PathBuf::from("/data/progress.json"));
        config.output.progress_file = Some("/tmp/p.json".to_string());
        assert_eq!(config.progress_file(&paths), PathBuf::from("/tmp/p.json"));
    }
}
