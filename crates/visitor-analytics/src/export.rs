//! Delimited-text export.
//!
//! Header cells are column names verbatim; every data cell is quoted with
//! embedded quotes doubled; missing and null values are empty; rows are
//! separated by a single `\n` with no trailing newline.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    /// User-facing notice; no file should be produced.
    #[error("Nothing to export")]
    Empty,

    #[error("Record {0} is not a key/value object")]
    NotARecord(usize),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Serializes homogeneous records to delimited text.
#[derive(Debug, Clone, Copy)]
pub struct TabularExporter {
    delimiter: char,
}

impl Default for TabularExporter {
    fn default() -> Self {
        Self { delimiter: ',' }
    }
}

impl TabularExporter {
    pub fn new(delimiter: char) -> Self {
        Self { delimiter }
    }

    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    /// Render `records` as delimited text.
    ///
    /// Columns are every key seen across the records, in first-seen order.
    /// For records of one shape that is exactly the first record's keys.
    pub fn to_delimited_text<T: Serialize>(&self, records: &[T]) -> Result<String, ExportError> {
        if records.is_empty() {
            return Err(ExportError::Empty);
        }

        let rows: Vec<Map<String, Value>> = records
            .iter()
            .enumerate()
            .map(|(i, record)| match serde_json::to_value(record)? {
                Value::Object(map) => Ok(map),
                _ => Err(ExportError::NotARecord(i)),
            })
            .collect::<Result<_, _>>()?;

        let columns = columns_of(&rows);
        let delimiter = self.delimiter.to_string();

        let mut lines = Vec::with_capacity(rows.len() + 1);
        lines.push(columns.join(&delimiter));
        for row in &rows {
            let cells: Vec<String> = columns
                .iter()
                .map(|column| quote(&cell_text(row.get(*column))))
                .collect();
            lines.push(cells.join(&delimiter));
        }

        tracing::debug!(
            "Exported {} records across {} columns",
            rows.len(),
            columns.len()
        );
        Ok(lines.join("\n"))
    }
}

/// Union of keys in first-seen order.
fn columns_of(rows: &[Map<String, Value>]) -> Vec<&str> {
    let mut seen = HashSet::new();
    rows.iter()
        .flat_map(|row| row.keys())
        .map(String::as_str)
        .filter(|key| seen.insert(*key))
        .collect()
}

fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn quote(text: &str) -> String {
    format!("\"{}\"", text.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Split one exported line back into cell values.
    fn split_line(line: &str, delimiter: char) -> Vec<String> {
        let mut cells = Vec::new();
        let mut current = String::new();
        let mut in_quotes = false;
        let mut chars = line.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '"' if in_quotes && chars.peek() == Some(&'"') => {
                    current.push('"');
                    chars.next();
                }
                '"' => in_quotes = !in_quotes,
                c if c == delimiter && !in_quotes => cells.push(std::mem::take(&mut current)),
                c => current.push(c),
            }
        }
        cells.push(current);
        cells
    }

    #[test]
    fn test_empty_is_a_notice() {
        let records: Vec<Value> = Vec::new();
        let err = TabularExporter::default()
            .to_delimited_text(&records)
            .unwrap_err();
        assert!(matches!(err, ExportError::Empty));
        assert_eq!(err.to_string(), "Nothing to export");
    }

    #[test]
    fn test_exact_format() {
        let records = vec![json!({"a": 1, "b": "x"}), json!({"a": 2, "b": "y\"z"})];
        let text = TabularExporter::default()
            .to_delimited_text(&records)
            .unwrap();
        assert_eq!(text, "a,b\n\"1\",\"x\"\n\"2\",\"y\"\"z\"");
    }

    #[test]
    fn test_round_trip_recovers_values() {
        let records = vec![json!({"a": 1, "b": "x"}), json!({"a": 2, "b": "y\"z"})];
        let text = TabularExporter::default()
            .to_delimited_text(&records)
            .unwrap();
        let lines: Vec<&str> = text.split('\n').collect();
        assert_eq!(split_line(lines[0], ','), vec!["a", "b"]);
        assert_eq!(split_line(lines[1], ','), vec!["1", "x"]);
        assert_eq!(split_line(lines[2], ','), vec!["2", "y\"z"]);
    }

    #[test]
    fn test_nulls_render_empty() {
        let records = vec![json!({"a": null, "b": "x"})];
        let text = TabularExporter::default()
            .to_delimited_text(&records)
            .unwrap();
        assert_eq!(text, "a,b\n\"\",\"x\"");
    }

    #[test]
    fn test_later_columns_are_not_dropped() {
        let records = vec![json!({"a": 1}), json!({"a": 2, "extra": "kept"})];
        let text = TabularExporter::default()
            .to_delimited_text(&records)
            .unwrap();
        assert_eq!(text, "a,extra\n\"1\",\"\"\n\"2\",\"kept\"");
    }

    #[test]
    fn test_custom_delimiter_and_embedded_delimiters() {
        let records = vec![json!({"page": "/a;b", "n": true})];
        let text = TabularExporter::new(';').to_delimited_text(&records).unwrap();
        assert_eq!(text, "page;n\n\"/a;b\";\"true\"");
        let lines: Vec<&str> = text.split('\n').collect();
        assert_eq!(split_line(lines[1], ';'), vec!["/a;b", "true"]);
    }

    #[test]
    fn test_struct_records_keep_field_order() {
        #[derive(Serialize)]
        struct Row {
            zeta: &'static str,
            alpha: u32,
        }
        let text = TabularExporter::default()
            .to_delimited_text(&[Row { zeta: "z", alpha: 1 }])
            .unwrap();
        assert_eq!(text, "zeta,alpha\n\"z\",\"1\"");
    }

    #[test]
    fn test_scalar_record_is_rejected() {
        let err = TabularExporter::default()
            .to_delimited_text(&[json!(1)])
            .unwrap_err();
        assert!(matches!(err, ExportError::NotARecord(0)));
    }
}
