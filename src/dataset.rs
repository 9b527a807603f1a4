use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use crate::utils::LoadError;

/// Tokens treated as a missing value when parsing a cell (case-insensitive)
const MISSING_TOKENS: &[&str] = &["na", "n/a", "nan", "null", "none", "-"];

/// A single table cell after type inference
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Number(f64),
    Text(String),
    Missing,
}

impl Cell {
    /// Parse a raw text value
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty()
            || MISSING_TOKENS
                .iter()
                .any(|token| trimmed.eq_ignore_ascii_case(token))
        {
            return Cell::Missing;
        }
        match trimmed.parse::<f64>() {
            Ok(value) if value.is_finite() => Cell::Number(value),
            _ => Cell::Text(trimmed.to_string()),
        }
    }

    fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Cell::Missing,
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(v) if v.is_finite() => Cell::Number(v),
                _ => Cell::Text(n.to_string()),
            },
            serde_json::Value::String(s) => Cell::parse(&s),
            serde_json::Value::Bool(b) => Cell::Text(b.to_string()),
            other => Cell::Text(other.to_string()),
        }
    }

    /// Numeric value of the cell, if any
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Number(v) => write!(f, "{}", v),
            Cell::Text(s) => write!(f, "{}", s),
            Cell::Missing => Ok(()),
        }
    }
}

/// Inferred type of a table column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Float,
    Text,
    /// Every cell is missing
    Empty,
}

impl ColumnType {
    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Float)
    }
}

/// Represents a single table row with named fields
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    pub fields: HashMap<String, Cell>,
}

impl Record {
    /// Create a new empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field to the record
    pub fn add_field(&mut self, key: String, value: Cell) {
        self.fields.insert(key, value);
    }

    /// Get a field value; absent fields read as missing
    pub fn get_field(&self, key: &str) -> &Cell {
        self.fields.get(key).unwrap_or(&Cell::Missing)
    }

    /// Get a numeric field value
    pub fn get_numeric(&self, key: &str) -> Option<f64> {
        self.get_field(key).as_number()
    }
}

/// A column-named table as produced by the file loaders
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub name: String,
    columns: Vec<String>,
    pub records: Vec<Record>,
}

impl Table {
    /// Create a new empty table
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Append a row given as ordered `(column, cell)` pairs.
    /// Unseen columns are registered in the order they appear.
    pub fn push_row<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (String, Cell)>,
    {
        let mut record = Record::new();
        for (key, cell) in entries {
            if !self.columns.contains(&key) {
                self.columns.push(key.clone());
            }
            record.add_field(key, cell);
        }
        self.records.push(record);
    }

    /// Get the number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Column names in file order
    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Infer the type of a column.
    ///
    /// A column is numeric when it has at least one number and numbers are
    /// at least as frequent as text cells. It is `Integer` when every number
    /// is integral.
    pub fn column_type(&self, name: &str) -> Option<ColumnType> {
        if !self.has_column(name) {
            return None;
        }

        let mut numbers = 0usize;
        let mut texts = 0usize;
        let mut integral = true;
        for record in &self.records {
            match record.get_field(name) {
                Cell::Number(v) => {
                    numbers += 1;
                    integral &= v.fract() == 0.0;
                }
                Cell::Text(_) => texts += 1,
                Cell::Missing => {}
            }
        }

        let column_type = match (numbers, texts) {
            (0, 0) => ColumnType::Empty,
            (n, t) if n > 0 && n >= t => {
                if integral {
                    ColumnType::Integer
                } else {
                    ColumnType::Float
                }
            }
            _ => ColumnType::Text,
        };
        Some(column_type)
    }

    /// Columns that can be selected for anomaly detection, in file order
    pub fn numeric_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| self.column_type(c).is_some_and(ColumnType::is_numeric))
            .cloned()
            .collect()
    }

    /// Load table from CSV
    pub fn from_csv(name: impl Into<String>, csv_data: &str) -> Result<Self, LoadError> {
        Self::from_csv_reader(name, csv_data.as_bytes())
    }

    /// Load table from any CSV reader
    pub fn from_csv_reader<R: std::io::Read>(
        name: impl Into<String>,
        reader: R,
    ) -> Result<Self, LoadError> {
        let mut table = Table::new(name);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers = reader.headers()?.clone();
        table.columns = headers.iter().map(str::to_string).collect();

        for result in reader.records() {
            let record = result?;
            let entries = headers
                .iter()
                .enumerate()
                .map(|(i, header)| (header.to_string(), Cell::parse(record.get(i).unwrap_or(""))));
            table.push_row(entries);
        }

        Ok(table)
    }

    /// Load table from a JSON array of objects
    pub fn from_json(name: impl Into<String>, json_data: &str) -> Result<Self, LoadError> {
        let mut table = Table::new(name);
        let data: Vec<serde_json::Value> = serde_json::from_str(json_data)?;

        for (index, item) in data.into_iter().enumerate() {
            let serde_json::Value::Object(object) = item else {
                return Err(LoadError::NotAnObject { index });
            };
            table.push_row(
                object
                    .into_iter()
                    .map(|(key, value)| (key, Cell::from_json(value))),
            );
        }

        Ok(table)
    }

    /// Load a `.csv` or `.json` file, named after its file stem
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "csv" => Self::from_csv_reader(name, std::fs::File::open(path)?),
            "json" => Self::from_json(name, &std::fs::read_to_string(path)?),
            other => Err(LoadError::UnsupportedFormat(other.to_string())),
        }
    }
}
