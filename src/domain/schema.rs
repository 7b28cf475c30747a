//! Declarative model schema
//!
//! Configuration lists table entries in dependency order. Each raw entry is
//! validated into a tagged `TableSpec`: a leaf table with a surrogate key, or
//! a table produced by a merge chain over tables produced earlier.

use crate::domain::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use validator::Validate;

/// Either a surrogate key to synthesize or a natural (possibly composite) key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryKey {
    Surrogate(String),
    Natural(Vec<String>),
}

impl PrimaryKey {
    /// Columns the final table is sorted by
    pub fn sort_columns(&self) -> Vec<String> {
        match self {
            PrimaryKey::Surrogate(name) => vec![name.clone()],
            PrimaryKey::Natural(names) => names.clone(),
        }
    }

    fn is_blank(&self) -> bool {
        match self {
            PrimaryKey::Surrogate(name) => name.trim().is_empty(),
            PrimaryKey::Natural(names) => {
                names.is_empty() || names.iter().any(|n| n.trim().is_empty())
            }
        }
    }
}

/// A table entry as written in configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RawTableEntry {
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(length(min = 1))]
    pub initial_column: Vec<String>,
    pub primary_key: PrimaryKey,
    #[serde(default)]
    pub transform: bool,
    #[serde(default)]
    pub merge_frame_locations: Vec<usize>,
    #[serde(default)]
    pub merge_keys: Vec<String>,
    #[validate(length(min = 1))]
    pub all_columns: Vec<String>,
}

/// Join the accumulator with produced table `frame` on column `key`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeStep {
    pub frame: usize,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TableSpec {
    Leaf {
        initial_columns: Vec<String>,
        primary_key: String,
        all_columns: Vec<String>,
    },
    Merge {
        initial_columns: Vec<String>,
        primary_key: PrimaryKey,
        merges: Vec<MergeStep>,
        all_columns: Vec<String>,
    },
}

impl TableSpec {
    pub fn initial_columns(&self) -> &[String] {
        match self {
            TableSpec::Leaf { initial_columns, .. } | TableSpec::Merge { initial_columns, .. } => {
                initial_columns
            }
        }
    }

    pub fn all_columns(&self) -> &[String] {
        match self {
            TableSpec::Leaf { all_columns, .. } | TableSpec::Merge { all_columns, .. } => {
                all_columns
            }
        }
    }

    pub fn sort_columns(&self) -> Vec<String> {
        match self {
            TableSpec::Leaf { primary_key, .. } => vec![primary_key.clone()],
            TableSpec::Merge { primary_key, .. } => primary_key.sort_columns(),
        }
    }

    /// Name of the synthesized key column, if any
    pub fn surrogate_key(&self) -> Option<&str> {
        match self {
            TableSpec::Leaf { primary_key, .. } => Some(primary_key.as_str()),
            TableSpec::Merge {
                primary_key: PrimaryKey::Surrogate(name),
                ..
            } => Some(name.as_str()),
            TableSpec::Merge { .. } => None,
        }
    }
}

/// Validated schema; entry `i` produces table `i`
#[derive(Debug, Clone, Default)]
pub struct ModelSchema {
    tables: Vec<(String, TableSpec)>,
}

impl ModelSchema {
    pub fn from_entries(entries: Vec<RawTableEntry>) -> Result<Self> {
        let mut seen_names = HashSet::new();
        let mut tables: Vec<(String, TableSpec)> = Vec::with_capacity(entries.len());

        for (position, entry) in entries.into_iter().enumerate() {
            entry.validate().map_err(|e| {
                AppError::SchemaError(format!("Table entry #{} ('{}'): {}", position, entry.name, e))
            })?;

            if !seen_names.insert(entry.name.clone()) {
                return Err(AppError::SchemaError(format!(
                    "Table '{}' is declared more than once",
                    entry.name
                )));
            }

            let spec = Self::validate_entry(position, &entry, &tables)?;
            tables.push((entry.name, spec));
        }

        Ok(Self { tables })
    }

    fn validate_entry(
        position: usize,
        entry: &RawTableEntry,
        produced: &[(String, TableSpec)],
    ) -> Result<TableSpec> {
        if entry.primary_key.is_blank() {
            return Err(AppError::SchemaError(format!(
                "Table '{}' has an empty primary_key",
                entry.name
            )));
        }

        if !entry.transform {
            return match &entry.primary_key {
                PrimaryKey::Surrogate(name) => Ok(TableSpec::Leaf {
                    initial_columns: entry.initial_column.clone(),
                    primary_key: name.clone(),
                    all_columns: entry.all_columns.clone(),
                }),
                PrimaryKey::Natural(_) => Err(AppError::SchemaError(format!(
                    "Table '{}' has neither a surrogate key nor a merge chain",
                    entry.name
                ))),
            };
        }

        if entry.merge_frame_locations.len() != entry.merge_keys.len() {
            return Err(AppError::SchemaError(format!(
                "Table '{}' has {} merge_frame_locations but {} merge_keys",
                entry.name,
                entry.merge_frame_locations.len(),
                entry.merge_keys.len()
            )));
        }

        let mut merges = Vec::with_capacity(entry.merge_keys.len());
        for (&frame, key) in entry.merge_frame_locations.iter().zip(&entry.merge_keys) {
            if frame >= position {
                return Err(AppError::SchemaError(format!(
                    "Table '{}' merges frame {} which is not produced before it",
                    entry.name, frame
                )));
            }
            let (source_name, source_spec) = &produced[frame];
            if !source_spec.all_columns().contains(key) {
                return Err(AppError::SchemaError(format!(
                    "Table '{}' joins '{}' on '{}', which is not one of its columns",
                    entry.name, source_name, key
                )));
            }
            merges.push(MergeStep {
                frame,
                key: key.clone(),
            });
        }

        Ok(TableSpec::Merge {
            initial_columns: entry.initial_column.clone(),
            primary_key: entry.primary_key.clone(),
            merges,
            all_columns: entry.all_columns.clone(),
        })
    }

    pub fn tables(&self) -> &[(String, TableSpec)] {
        &self.tables
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
