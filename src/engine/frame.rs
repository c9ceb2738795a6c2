//! In-memory columnar data frame.
//!
//! Columns are flat `Vec<Value>` with a declared [`DataType`]; nulls are
//! allowed in any column. This is the materialized form that lazy plans
//! evaluate to, and the carrier for CSV read/write.

use crate::error::{FlowError, Result};
use crate::types::{ColumnDef, DataType, Schema, Value};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use xxhash_rust::xxh3::Xxh3;

/// A single named, typed column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
    pub values: Vec<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            data_type,
            values,
        }
    }
}

/// A materialized table: equal-length columns with unique names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataFrame {
    columns: Vec<Column>,
}

impl DataFrame {
    /// Build a frame, validating that all columns share one length and that
    /// names are unique.
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        if let Some(first) = columns.first() {
            let height = first.values.len();
            for col in &columns {
                if col.values.len() != height {
                    return Err(FlowError::Engine(format!(
                        "column '{}' has {} rows, expected {}",
                        col.name,
                        col.values.len(),
                        height
                    )));
                }
            }
        }
        for (i, col) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name == col.name) {
                return Err(FlowError::Engine(format!(
                    "duplicate column name '{}'",
                    col.name
                )));
            }
        }
        Ok(Self { columns })
    }

    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
        }
    }

    pub fn height(&self) -> usize {
        self.columns.first().map_or(0, |c| c.values.len())
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn schema(&self) -> Schema {
        Schema::new(
            self.columns
                .iter()
                .map(|c| ColumnDef::new(c.name.clone(), c.data_type))
                .collect(),
        )
    }

    /// One row as a value vector, in column order.
    pub fn row(&self, index: usize) -> Vec<Value> {
        self.columns
            .iter()
            .map(|c| c.values[index].clone())
            .collect()
    }

    /// A new frame keeping only the listed row indices, in the given order.
    pub fn take_rows(&self, indices: &[usize]) -> DataFrame {
        let columns = self
            .columns
            .iter()
            .map(|c| Column {
                name: c.name.clone(),
                data_type: c.data_type,
                values: indices.iter().map(|&i| c.values[i].clone()).collect(),
            })
            .collect();
        DataFrame { columns }
    }

    pub fn head(&self, n: usize) -> DataFrame {
        let count = n.min(self.height());
        let indices: Vec<usize> = (0..count).collect();
        self.take_rows(&indices)
    }

    /// Content fingerprint: schema, dimensions, and every cell. Used as the
    /// plan-identity contribution of scan nodes.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = Xxh3::new();
        hasher.update(&(self.height() as u64).to_le_bytes());
        let mut bytes = Vec::new();
        for col in &self.columns {
            hasher.update(col.name.as_bytes());
            hasher.update(format!("{}", col.data_type).as_bytes());
            for value in &col.values {
                bytes.clear();
                value.write_key_bytes(&mut bytes);
                hasher.update(&bytes);
            }
        }
        hasher.digest()
    }

    // ── CSV primitives ──

    /// Parse CSV from any reader, sniffing a column type from the cells:
    /// all-integer → Int64, numeric → Float64, true/false → Boolean,
    /// otherwise String. Empty cells become null in non-string columns.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(reader);

        let headers: Vec<String> = csv_reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut cells: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
        for record in csv_reader.records() {
            let record = record?;
            for (i, field) in record.iter().enumerate() {
                if i < cells.len() {
                    cells[i].push(field.to_string());
                }
            }
        }

        let columns = headers
            .into_iter()
            .zip(cells)
            .map(|(name, raw)| {
                let data_type = sniff_type(&raw);
                let values = raw
                    .into_iter()
                    .map(|cell| parse_cell(&cell, data_type))
                    .collect();
                Column {
                    name,
                    data_type,
                    values,
                }
            })
            .collect();

        DataFrame::new(columns)
    }

    pub fn from_csv_str(text: &str) -> Result<Self> {
        Self::from_csv_reader(text.as_bytes())
    }

    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_csv_reader(file)
    }

    pub fn write_csv_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        self.write_csv(file)
    }

    pub fn write_csv<W: std::io::Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record(self.columns.iter().map(|c| c.name.as_str()))?;
        for i in 0..self.height() {
            csv_writer.write_record(
                self.columns
                    .iter()
                    .map(|c| c.values[i].to_string()),
            )?;
        }
        csv_writer.flush()?;
        Ok(())
    }
}

/// Cheap shared handle; plans and previews pass frames around without
/// copying cell data.
pub type FrameRef = Arc<DataFrame>;

fn sniff_type(raw: &[String]) -> DataType {
    let non_empty: Vec<&str> = raw
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    if non_empty.is_empty() {
        return DataType::String;
    }
    if non_empty.iter().all(|s| s.parse::<i64>().is_ok()) {
        return DataType::Int64;
    }
    if non_empty.iter().all(|s| s.parse::<f64>().is_ok()) {
        return DataType::Float64;
    }
    if non_empty
        .iter()
        .all(|s| matches!(s.to_ascii_lowercase().as_str(), "true" | "false"))
    {
        return DataType::Boolean;
    }
    DataType::String
}

fn parse_cell(cell: &str, data_type: DataType) -> Value {
    let trimmed = cell.trim();
    match data_type {
        DataType::String => Value::Str(cell.to_string()),
        _ if trimmed.is_empty() => Value::Null,
        DataType::Int64 => trimmed
            .parse::<i64>()
            .map(Value::Int)
            .unwrap_or(Value::Null),
        DataType::Float64 => trimmed
            .parse::<f64>()
            .map(Value::Float)
            .unwrap_or(Value::Null),
        DataType::Boolean => match trimmed.to_ascii_lowercase().as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::Null,
        },
    }
}
