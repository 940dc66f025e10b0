//! Dataset loader
//!
//! Reads a dataset file with the separator and encoding stored on its
//! record. Read-only: nothing here mutates a dataset file.

use polars::prelude::*;
use std::fs::{self, File};
use std::io::Cursor;
use std::path::Path;
use std::time::Instant;
use tracing::debug;

use crate::error::{Result, WorkbenchError};
use crate::records::{ColumnSpec, Dataset};

/// Column order used for training: `features` minus `target`, then `target`.
pub fn selection_order(features: &[String], target: &str) -> Vec<String> {
    let mut columns: Vec<String> = Vec::with_capacity(features.len() + 1);
    for feature in features {
        if feature != target && !columns.contains(feature) {
            columns.push(feature.clone());
        }
    }
    columns.push(target.to_string());
    columns
}

/// Separator byte from its stored form. Accepts escapes such as `\t`.
pub fn parse_separator(separator: &str) -> Result<u8> {
    let resolved = match separator {
        "" => ",",
        "\\t" | "tab" => "\t",
        other => other,
    };
    match resolved.as_bytes() {
        [b] => Ok(*b),
        _ => Err(WorkbenchError::DataAccess(format!(
            "separator must be a single byte, got {:?}",
            separator
        ))),
    }
}

/// Decode raw file bytes to UTF-8 text.
pub fn decode(bytes: Vec<u8>, encoding: &str) -> Result<String> {
    match encoding.trim().to_ascii_lowercase().as_str() {
        "" | "utf-8" | "utf8" | "utf-8-sig" | "ascii" => {
            let text = String::from_utf8(bytes).map_err(|e| {
                WorkbenchError::DataAccess(format!("file is not valid {}: {}", encoding, e))
            })?;
            Ok(text.strip_prefix('\u{feff}').map(str::to_string).unwrap_or(text))
        }
        "latin-1" | "latin1" | "iso-8859-1" | "iso8859-1" => {
            Ok(bytes.into_iter().map(char::from).collect())
        }
        other => Err(WorkbenchError::DataAccess(format!("unsupported encoding: {}", other))),
    }
}

pub struct DatasetLoader;

impl DatasetLoader {
    /// Read a CSV file into a frame.
    pub fn read(path: &Path, separator: &str, encoding: &str) -> Result<DataFrame> {
        let start = Instant::now();
        let bytes = fs::read(path).map_err(|e| {
            WorkbenchError::DataAccess(format!("cannot read {}: {}", path.display(), e))
        })?;
        let text = decode(bytes, encoding)?;
        let parse_opts = CsvParseOptions::default().with_separator(parse_separator(separator)?);

        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(1000))
            .with_parse_options(parse_opts)
            .into_reader_with_file_handle(Cursor::new(text.into_bytes()))
            .finish()
            .map_err(|e| {
                WorkbenchError::DataAccess(format!("cannot parse {}: {}", path.display(), e))
            })?;

        debug!(
            path = %path.display(),
            rows = df.height(),
            columns = df.width(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Dataset file read"
        );
        Ok(df)
    }

    /// Full dataset, every column in file order.
    pub fn load(dataset: &Dataset) -> Result<DataFrame> {
        let path = dataset.file.as_deref().ok_or_else(|| {
            WorkbenchError::DataAccess(format!("dataset {} has no file", dataset.id))
        })?;
        Self::read(path, &dataset.separator, &dataset.encoding)
    }

    /// Dataset restricted to `features ++ [target]`. Without a feature
    /// subset every column is kept, but the target must still exist.
    pub fn load_for_training(
        dataset: &Dataset,
        features: Option<&[String]>,
        target: &str,
    ) -> Result<DataFrame> {
        let df = Self::load(dataset)?;
        match features {
            Some(features) if !features.is_empty() => {
                let columns = selection_order(features, target);
                require_columns(&df, &columns)?;
                Ok(df.select(columns)?)
            }
            _ => {
                require_columns(&df, &[target.to_string()])?;
                Ok(df)
            }
        }
    }
}

/// Fail with a schema error naming every missing column.
pub fn require_columns(df: &DataFrame, columns: &[String]) -> Result<()> {
    let present: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
    let missing: Vec<&str> = columns
        .iter()
        .filter(|c| !present.contains(c))
        .map(String::as_str)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(WorkbenchError::Schema(format!(
            "required column(s) not found: {}",
            missing.join(", ")
        )))
    }
}

/// Ordered column schema recorded at dataset creation.
pub fn inspect(df: &DataFrame) -> Vec<ColumnSpec> {
    df.get_columns()
        .iter()
        .map(|col| ColumnSpec { name: col.name().to_string(), dtype: dtype_name(col.dtype()) })
        .collect()
}

pub fn dtype_name(dtype: &DataType) -> String {
    match dtype {
        DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 => "int64",
        DataType::UInt8 | DataType::UInt16 | DataType::UInt32 | DataType::UInt64 => "int64",
        DataType::Float32 | DataType::Float64 => "float64",
        DataType::Boolean => "bool",
        DataType::String => "object",
        _ => "object",
    }
    .to_string()
}

/// Write a frame as comma-separated UTF-8 with a header row.
pub fn write_csv(df: &mut DataFrame, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file).include_header(true).finish(df)?;
    Ok(())
}

/// Serialize a frame to CSV bytes for download responses.
pub fn csv_bytes(df: &mut DataFrame) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    CsvWriter::new(&mut buf).include_header(true).finish(df)?;
    Ok(buf)
}
