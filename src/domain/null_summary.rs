use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

/// Null-like counts for one column
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ColumnNulls {
    /// Boolean and numeric columns
    Count(usize),
    /// String columns; the four counts overlap
    Text {
        standard_nulls: usize,
        empty_strings: usize,
        specific_values: usize,
        whitespace_only: usize,
    },
    /// Date columns: present but unparsable entries
    Date { invalid_dates: usize },
}

/// Per-column summary, in source column order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NullSummary {
    entries: Vec<(String, ColumnNulls)>,
}

impl NullSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: impl Into<String>, nulls: ColumnNulls) {
        self.entries.push((column.into(), nulls));
    }

    pub fn get(&self, column: &str) -> Option<&ColumnNulls> {
        self.entries
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, nulls)| nulls)
    }

    pub fn columns(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ColumnNulls)> {
        self.entries.iter().map(|(name, nulls)| (name.as_str(), nulls))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// Written as a map so column order survives serialization
impl Serialize for NullSummary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, nulls) in &self.entries {
            map.serialize_entry(name, nulls)?;
        }
        map.end()
    }
}
