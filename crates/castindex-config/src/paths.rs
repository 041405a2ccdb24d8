//! Application paths management.

use directories::ProjectDirs;
use std::path::PathBuf;

/// Manages all application paths following platform conventions.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
    pub config_file: PathBuf,
    /// Relational metadata store (shows and episodes).
    pub database_file: PathBuf,
    /// Local vector index used by the `sqlite` backend.
    pub index_file: PathBuf,
    pub progress_file: PathBuf,
    pub error_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl AppPaths {
    /// Create paths using platform-specific directories.
    pub fn new() -> Option<Self> {
        let proj_dirs = ProjectDirs::from("com", "castindex", "castindex")?;

        let config_dir = proj_dirs.config_dir().to_path_buf();
        let data_dir = proj_dirs.data_dir().to_path_buf();

        Some(Self::rooted(config_dir, data_dir))
    }

    /// Lay out all paths below explicit config and data directories.
    pub fn rooted(config_dir: PathBuf, data_dir: PathBuf) -> Self {
        Self {
            config_file: config_dir.join("config.toml"),
            database_file: data_dir.join("metadata.db"),
            index_file: data_dir.join("index.db"),
            progress_file: data_dir.join("progress.json"),
            error_dir: data_dir.join("errors"),
            log_dir: data_dir.join("logs"),
            config_dir,
            data_dir,
        }
    }

    /// Create all necessary directories.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.error_dir)?;
        std::fs::create_dir_all(&self.log_dir)?;
        Ok(())
    }

    /// Check if castindex has been initialized.
    pub fn is_initialized(&self) -> bool {
        self.config_file.exists() && self.database_file.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rooted_layout() {
        let paths = AppPaths::rooted(PathBuf::from("/cfg"), PathBuf::from("/data"));
        assert_eq!(paths.config_file, PathBuf::from("/cfg/config.toml"));
        assert_eq!(paths.database_file, PathBuf::from("/data/metadata.db"));
        assert_eq!(paths.progress_file, PathBuf::from("/data/progress.json"));
        assert_eq!(paths.error_dir, PathBuf::from("/data/errors"));
    }

    #[test]
    fn test_rooted_paths_not_initialized() {
        let dir = std::env::temp_dir().join("castindex-paths-test-missing");
        let paths = AppPaths::rooted(dir.join("cfg"), dir.join("data"));
        assert!(!paths.is_initialized());
    }
}
