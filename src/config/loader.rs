//! Configuration Loader (Figment-based)
//!
//! Loads and merges configuration from multiple sources using Figment:
//! 1. Built-in defaults (Serialized)
//! 2. Global config (<platform config dir>/repodoc/config.toml)
//! 3. Project config (.repodoc/config.toml)
//! 4. Environment variables (REPODOC_ prefix, `__` between nested keys)

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::types::Config;
use crate::types::{RepodocError, Result};

const ENV_PREFIX: &str = "REPODOC_";
const CONFIG_FILE: &str = "config.toml";
const DATABASE_FILE: &str = "documents.db";

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with full resolution chain using Figment:
    /// defaults → global → project → env vars
    pub fn load() -> Result<Config> {
        Self::load_from(
            Self::global_config_path().as_deref(),
            &Self::project_config_path(),
        )
    }

    /// Load with explicit file locations; missing files are skipped
    pub fn load_from(global: Option<&Path>, project: &Path) -> Result<Config> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        if let Some(global_path) = global
            && global_path.exists()
        {
            debug!("Loading global config from: {}", global_path.display());
            figment = figment.merge(Toml::file(global_path));
        }

        if project.exists() {
            debug!("Loading project config from: {}", project.display());
            figment = figment.merge(Toml::file(project));
        }

        // REPODOC_LLM__MODEL -> llm.model, REPODOC_PIPELINE__FETCH_CONCURRENCY -> pipeline.fetch_concurrency
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Config = figment
            .extract()
            .map_err(|e| RepodocError::Config(format!("Configuration error: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file only
    pub fn load_from_file(path: &Path) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .extract()
            .map_err(|e| RepodocError::Config(format!("Configuration error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    // =========================================================================
    // Path Management
    // =========================================================================

    fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("", "", "repodoc")
    }

    /// Global config directory (e.g. ~/.config/repodoc/)
    pub fn global_dir() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
    }

    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_dir().map(|dir| dir.join(CONFIG_FILE))
    }

    /// Platform data directory holding the document record store
    pub fn data_dir() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.data_dir().to_path_buf())
    }

    pub fn project_dir() -> PathBuf {
        PathBuf::from(".repodoc")
    }

    pub fn project_config_path() -> PathBuf {
        Self::project_dir().join(CONFIG_FILE)
    }

    /// Database location: configured path, else the platform data dir, else the project dir
    pub fn database_path(config: &Config) -> PathBuf {
        config.storage.database_path.clone().unwrap_or_else(|| {
            Self::data_dir()
                .unwrap_or_else(Self::project_dir)
                .join(DATABASE_FILE)
        })
    }

    // =========================================================================
    // Config Commands
    // =========================================================================

    /// Lines describing every config location and whether it exists
    pub fn describe_paths(config: &Config) -> Vec<(&'static str, String, bool)> {
        let mut paths = Vec::new();

        match Self::global_config_path() {
            Some(global) => {
                let exists = global.exists();
                paths.push(("Global", global.display().to_string(), exists));
            }
            None => paths.push(("Global", "(not available)".to_string(), false)),
        }

        let project = Self::project_config_path();
        paths.push(("Project", project.display().to_string(), project.exists()));

        let database = Self::database_path(config);
        paths.push(("Database", database.display().to_string(), database.exists()));

        paths
    }

    /// Render the effective configuration as TOML or JSON
    pub fn render(config: &Config, as_json: bool) -> Result<String> {
        if as_json {
            Ok(serde_json::to_string_pretty(config)?)
        } else {
            toml::to_string_pretty(config).map_err(|e| RepodocError::Config(e.to_string()))
        }
    }

    // =========================================================================
    // Initialization
    // =========================================================================

    /// Write a default config file into the global or project location.
    /// Returns the path and whether a file was written.
    pub fn init(global: bool, force: bool) -> Result<(PathBuf, bool)> {
        let path = if global {
            Self::global_config_path().ok_or_else(|| {
                RepodocError::Config("Cannot determine global config directory".to_string())
            })?
        } else {
            Self::project_config_path()
        };
        let written = Self::write_default(&path, force)?;
        Ok((path, written))
    }

    fn write_default(path: &Path, force: bool) -> Result<bool> {
        if path.exists() && !force {
            info!("Config exists: {}", path.display());
            return Ok(false);
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, Self::default_config_content()?)?;
        info!("Created config: {}", path.display());
        Ok(true)
    }

    /// Default config file content (TOML)
    fn default_config_content() -> Result<String> {
        let body = toml::to_string_pretty(&Config::default())
            .map_err(|e| RepodocError::Config(e.to_string()))?;
        Ok(format!(
            "# repodoc configuration\n\
             # Project settings in .repodoc/config.toml override global ones.\n\
             # The LLM API key is best supplied as REPODOC_LLM__API_KEY or OPENAI_API_KEY.\n\n{}",
            body
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_defaults_without_files() {
        let temp = TempDir::new().unwrap();
        let config =
            ConfigLoader::load_from(None, &temp.path().join("missing.toml")).unwrap();
        assert_eq!(config.version, "1.0");
    }

    #[test]
    fn test_project_overrides_global() {
        let temp = TempDir::new().unwrap();
        let global = temp.path().join("global.toml");
        let project = temp.path().join("project.toml");
        fs::write(
            &global,
            "[llm]\nmodel = \"global-model\"\n[pipeline]\nmax_tokens_per_chunk = 1000\n",
        )
        .unwrap();
        fs::write(&project, "[llm]\nmodel = \"project-model\"\n").unwrap();

        let config = ConfigLoader::load_from(Some(&global), &project).unwrap();
        assert_eq!(config.llm.model, "project-model");
        assert_eq!(config.pipeline.max_tokens_per_chunk, 1000);
    }

    #[test]
    fn test_invalid_file_value_rejected() {
        let temp = TempDir::new().unwrap();
        let project = temp.path().join("config.toml");
        fs::write(&project, "[pipeline]\nsummarize_concurrency = 0\n").unwrap();
        assert!(ConfigLoader::load_from_file(&project).is_err());
    }

    #[test]
    fn test_env_override() {
        // SAFETY: no other test reads this variable
        unsafe {
            std::env::set_var("REPODOC_SOURCE__USER_AGENT", "env-agent");
        }
        let temp = TempDir::new().unwrap();
        let config = ConfigLoader::load_from(None, &temp.path().join("none.toml")).unwrap();
        assert_eq!(config.source.user_agent, "env-agent");
        unsafe {
            std::env::remove_var("REPODOC_SOURCE__USER_AGENT");
        }
    }

    #[test]
    fn test_default_content_roundtrips() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.toml");
        assert!(ConfigLoader::write_default(&path, false).unwrap());
        assert!(!ConfigLoader::write_default(&path, false).unwrap());
        assert!(ConfigLoader::write_default(&path, true).unwrap());

        let config = ConfigLoader::load_from_file(&path).unwrap();
        assert_eq!(config.pipeline.max_publish_retries, 3);
    }

    #[test]
    fn test_render_hides_api_key() {
        let mut config = Config::default();
        config.llm.api_key = Some("sk-hidden".to_string());
        let toml = ConfigLoader::render(&config, false).unwrap();
        let json = ConfigLoader::render(&config, true).unwrap();
        assert!(!toml.contains("sk-hidden"));
        assert!(!json.contains("sk-hidden"));
    }
}
