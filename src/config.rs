//! Engine configuration.
//!
//! [`SchemaConfig`] is loaded from `config/schemaguard.toml` (section
//! `[schema]`) or `SCHEMAGUARD__SCHEMA__*` environment variables via
//! `SchemaConfig::load()`.

use crate::schema::Dialect;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default location of the per-dialect migration folders
pub const DEFAULT_MIGRATIONS_ROOT: &str = "sql/updates";

const CONFIG_FILE: &str = "config/schemaguard.toml";

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SchemaConfig {
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default = "default_table_prefix")]
    pub table_prefix: String,
    #[serde(default = "default_migrations_root")]
    pub migrations_root: PathBuf,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            table_prefix: default_table_prefix(),
            migrations_root: default_migrations_root(),
        }
    }
}

fn default_table_prefix() -> String {
    "jos_".to_string()
}

fn default_migrations_root() -> PathBuf {
    PathBuf::from(DEFAULT_MIGRATIONS_ROOT)
}

impl SchemaConfig {
    /// Load the configuration from `config/schemaguard.toml`, falling back to env vars.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(CONFIG_FILE)
    }

    /// Load the configuration from the given TOML file (optional) and env vars.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let builder = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(Environment::with_prefix("SCHEMAGUARD").separator("__"));

        let settings = match builder.build() {
            Ok(cfg) => cfg,
            Err(err) => {
                // File existed but could not be parsed; keep going with env only
                if path.exists() {
                    log::warn!(
                        "failed to load {}, falling back to env: {}",
                        path.display(),
                        err
                    );
                }
                Config::builder()
                    .add_source(Environment::with_prefix("SCHEMAGUARD").separator("__"))
                    .build()
                    .map_err(|env_err| {
                        ConfigError::Message(format!(
                            "Failed to load configuration from file and env: {}, then env-only error: {}",
                            err, env_err
                        ))
                    })?
            }
        };

        // A missing [schema] section means defaults, not an error
        match settings.get::<SchemaConfig>("schema") {
            Ok(cfg) => Ok(cfg),
            Err(ConfigError::NotFound(_)) => Ok(SchemaConfig::default()),
            Err(e) => Err(ConfigError::Message(format!(
                "Schema configuration could not be loaded from file or environment: {}",
                e
            ))),
        }
    }

    /// Folder holding the migration files for one dialect: `<migrations_root>/<dialect>/`
    #[must_use]
    pub fn dialect_folder(&self, dialect: Dialect) -> PathBuf {
        self.migrations_root.join(dialect.folder_name())
    }
}
