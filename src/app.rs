use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::application::{DataDumpUseCase, NullProfiler};
use crate::domain::csv::CsvOptions;
use crate::domain::error::{AppError, Result};
use crate::infrastructure::config::{DumpConfig, DEFAULT_CONFIG_FILE};
use crate::infrastructure::csv::CsvTableReader;
use crate::infrastructure::db::SqlTableStore;

const USAGE: &str = "usage: datadump dump [config.toml]\n       datadump profile <file.csv> [--config config.toml]";

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Dump { config: PathBuf },
    Profile { csv: PathBuf, config: Option<PathBuf> },
}

impl Command {
    pub fn parse(args: &[String]) -> Result<Self> {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        match args.as_slice() {
            [] | ["dump"] => Ok(Command::Dump {
                config: PathBuf::from(DEFAULT_CONFIG_FILE),
            }),
            ["dump", config] => Ok(Command::Dump {
                config: PathBuf::from(*config),
            }),
            ["profile", csv] => Ok(Command::Profile {
                csv: PathBuf::from(*csv),
                config: None,
            }),
            ["profile", csv, "--config", config] => Ok(Command::Profile {
                csv: PathBuf::from(*csv),
                config: Some(PathBuf::from(*config)),
            }),
            _ => Err(AppError::ConfigError(USAGE.to_string())),
        }
    }
}

pub async fn run(args: Vec<String>) -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let result = match Command::parse(&args) {
        Ok(command) => execute(command).await,
        Err(err) => Err(err),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "datadump failed");
            eprintln!("{}", err);
            ExitCode::FAILURE
        }
    }
}

async fn execute(command: Command) -> Result<()> {
    match command {
        Command::Dump { config } => {
            let config = DumpConfig::load(&config)?;
            let schema = config.model_schema()?;
            let store = SqlTableStore::connect_with(&config.database_url, &config.store).await?;
            info!(tables = schema.len(), csv = %config.csv_path, "Starting data dump");

            let use_case = DataDumpUseCase::new(schema, Arc::new(store))
                .with_reader(CsvTableReader::new(config.csv.clone()));
            let report = use_case.run(Path::new(&config.csv_path)).await?;

            for event in &report.events {
                println!("{}", event.message);
            }
            println!("{}", report.message);
            Ok(())
        }
        Command::Profile { csv, config } => {
            let options = match config {
                Some(path) => DumpConfig::load(&path)?.csv,
                None => CsvOptions::default(),
            };
            let summary = NullProfiler::new().profile_csv(&CsvTableReader::new(options), &csv)?;
            let json = serde_json::to_string_pretty(&summary)
                .map_err(|e| AppError::IoError(format!("Failed to render summary: {}", e)))?;
            println!("{}", json);
            Ok(())
        }
    }
}
