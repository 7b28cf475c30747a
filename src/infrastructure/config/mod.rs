use std::path::Path;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::domain::csv::CsvOptions;
use crate::domain::error::{AppError, Result};
use crate::domain::schema::{ModelSchema, RawTableEntry};
use crate::infrastructure::db::StoreConfig;

pub const DEFAULT_CONFIG_FILE: &str = "datadump.toml";
const ENV_PREFIX: &str = "DATADUMP_";

/// Everything one dump run needs
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DumpConfig {
    #[validate(length(min = 1))]
    pub csv_path: String,
    #[validate(length(min = 1))]
    pub database_url: String,
    #[serde(default)]
    pub csv: CsvOptions,
    #[serde(default)]
    pub store: StoreConfig,
    #[validate(length(min = 1))]
    pub tables: Vec<RawTableEntry>,
}

impl DumpConfig {
    /// Layer the TOML file, `DATABASE_URL`, then `DATADUMP_*` variables
    pub fn load(path: &Path) -> Result<Self> {
        dotenvy::dotenv().ok();

        if !path.exists() {
            return Err(AppError::ConfigError(format!(
                "Config file '{}' not found",
                path.display()
            )));
        }

        let figment = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::raw().only(&["DATABASE_URL"]))
            .merge(Env::prefixed(ENV_PREFIX));

        Self::from_figment(figment)
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: DumpConfig = figment
            .extract()
            .map_err(|e| AppError::ConfigError(e.to_string()))?;

        config
            .validate()
            .map_err(|e| AppError::ConfigError(e.to_string()))?;

        Ok(config)
    }

    /// Validated schema built from the configured table entries
    pub fn model_schema(&self) -> Result<ModelSchema> {
        ModelSchema::from_entries(self.tables.clone())
    }
}
