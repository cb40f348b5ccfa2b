//! Configuration loading and root folder resolution

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV: &str = "JOBTRACK_ROOT";

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "jobtrack.db";

/// Settings loaded from the TOML config file
///
/// Every key is optional; missing keys fall back to the defaults below.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub root_folder: Option<PathBuf>,
    pub bind_address: String,
    pub port: u16,
    pub import: ImportSettings,
    pub admin: Option<AdminSeed>,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            bind_address: "127.0.0.1".to_string(),
            port: 5740,
            import: ImportSettings::default(),
            admin: None,
        }
    }
}

/// `[import]` table
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImportSettings {
    /// Organization file, relative to the root folder unless absolute
    pub organizations_file: PathBuf,
    /// Posting file, relative to the root folder unless absolute
    pub postings_file: PathBuf,
    /// Pending writes per batch transaction before an automatic commit
    pub commit_batch_size: usize,
    /// Rows reconciled at once (1 = strictly sequential)
    pub max_concurrent_rows: usize,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            organizations_file: PathBuf::from("Data").join("companies.csv"),
            postings_file: PathBuf::from("Data").join("job_postings.csv"),
            commit_batch_size: 500,
            max_concurrent_rows: 1,
        }
    }
}

impl ImportSettings {
    /// Resolve the organization file against the root folder
    pub fn organizations_path(&self, root: &Path) -> PathBuf {
        root.join(&self.organizations_file)
    }

    /// Resolve the posting file against the root folder
    pub fn postings_path(&self, root: &Path) -> PathBuf {
        root.join(&self.postings_file)
    }
}

/// `[admin]` table: account created by the startup bootstrap
#[derive(Debug, Clone, Deserialize)]
pub struct AdminSeed {
    pub username: String,
    pub password: String,
}

impl TomlConfig {
    /// Parse config from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid config file: {}", e)))
    }

    /// Load config from the platform config file
    ///
    /// A missing file yields defaults; a malformed file is an error.
    pub fn load() -> Result<Self> {
        match find_config_file() {
            Some(path) => Self::load_from(&path),
            None => {
                debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load config from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }
}

/// Root folder resolution priority:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&Path>, toml_config: &TomlConfig) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
        warn!("{} is set but empty, ignoring", ROOT_FOLDER_ENV);
    }

    // Priority 3: TOML config file
    if let Some(root) = &toml_config.root_folder {
        return root.clone();
    }

    // Priority 4: OS-dependent compiled default
    default_root_folder()
}

/// Database path inside a root folder
pub fn database_path(root: &Path) -> PathBuf {
    root.join(DATABASE_FILE)
}

/// Locate the config file for this platform, if one exists
fn find_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("jobtrack").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/jobtrack/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("jobtrack"))
        .unwrap_or_else(|| PathBuf::from("./jobtrack_data"))
}
