use calamine::{Data, Reader, Xlsx};
use chrono::{NaiveDateTime, TimeDelta};
use serde_json::{Map, Number, Value};
use std::collections::HashMap;
use std::io::Cursor;

use crate::error::AppError;

/// One decoded row: column name to cell value, in header order.
pub type RowRecord = Map<String, Value>;

/// The only upload extension the converter accepts.
pub const SPREADSHEET_EXTENSION: &str = ".xlsx";

/// Largest integer a JSON consumer can hold without losing precision.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Check whether a filename carries the spreadsheet extension
///
/// The comparison ignores ASCII case, so `REPORT.XLSX` is accepted.
///
/// # Examples
/// ```
/// use sheetgate::loader::is_spreadsheet;
///
/// assert!(is_spreadsheet("scores.xlsx"));
/// assert!(!is_spreadsheet("scores.csv"));
/// ```
pub fn is_spreadsheet(filename: &str) -> bool {
    let ext_len = SPREADSHEET_EXTENSION.len();
    filename.len() > ext_len
        && filename.is_char_boundary(filename.len() - ext_len)
        && filename[filename.len() - ext_len..].eq_ignore_ascii_case(SPREADSHEET_EXTENSION)
}

/// Decode an uploaded spreadsheet into row records
///
/// The filename is checked before any decoding happens. The first worksheet
/// is read, its first row becomes the header and every following row that is
/// not completely empty becomes one record.
///
/// # Arguments
/// * `bytes` - Raw contents of the uploaded file
/// * `filename` - Client-supplied filename, used for the extension check
///
/// # Returns
/// * `Result<Vec<RowRecord>, AppError>` - The rows or the reason they could not be read
///
/// # Errors
/// * `AppError::UnsupportedFormat` if the filename does not end in `.xlsx`
/// * `AppError::InvalidSpreadsheet` if the payload is not a readable workbook
pub fn parse(bytes: &[u8], filename: &str) -> Result<Vec<RowRecord>, AppError> {
    if !is_spreadsheet(filename) {
        return Err(AppError::UnsupportedFormat);
    }

    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes))
        .map_err(|e| AppError::InvalidSpreadsheet(e.to_string()))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| AppError::InvalidSpreadsheet("workbook has no worksheets".to_string()))?
        .map_err(|e| AppError::InvalidSpreadsheet(e.to_string()))?;

    let mut rows = range.rows();
    let headers = match rows.next() {
        Some(header_row) => header_names(header_row),
        None => return Ok(Vec::new()),
    };

    let records = rows
        .filter(|row| row.iter().any(|cell| !matches!(cell, Data::Empty)))
        .map(|row| {
            headers
                .iter()
                .zip(row.iter())
                .map(|(name, cell)| (name.clone(), cell_value(cell)))
                .collect::<RowRecord>()
        })
        .collect();

    Ok(records)
}

/// Turn arbitrary JSON into row records
///
/// Arrays become one row per element, a lone object becomes a single row,
/// and anything that is not an object is wrapped as `{"value": ...}`.
pub fn rows_from_json(value: Value) -> Vec<RowRecord> {
    match value {
        Value::Array(items) => items.into_iter().map(into_row).collect(),
        other => vec![into_row(other)],
    }
}

fn into_row(value: Value) -> RowRecord {
    match value {
        Value::Object(map) => map,
        other => {
            let mut row = RowRecord::new();
            row.insert("value".to_string(), other);
            row
        }
    }
}

// Blank headers get a positional name and repeats get a numeric suffix,
// so every column keeps its own key.
fn header_names(row: &[Data]) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();

    row.iter()
        .enumerate()
        .map(|(idx, cell)| {
            let base = match cell {
                Data::Empty => format!("Unnamed: {}", idx),
                other => other.to_string(),
            };

            let count = seen.entry(base.clone()).or_insert(0);
            let name = if *count == 0 {
                base
            } else {
                format!("{}.{}", base, count)
            };
            *count += 1;
            name
        })
        .collect()
}

fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Int(i) => Value::from(*i),
        Data::Float(f) => float_value(*f),
        Data::String(s) => Value::String(s.clone()),
        Data::Bool(b) => Value::Bool(*b),
        // Serials below one day carry no date part, only a clock time.
        Data::DateTime(dt) if dt.is_duration() || dt.as_f64() < 1.0 => {
            match dt.as_duration() {
                Some(elapsed) if elapsed >= TimeDelta::zero() => {
                    Value::String(clock_time(elapsed))
                }
                _ => float_value(dt.as_f64()),
            }
        }
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(naive) => Value::String(iso_datetime(naive)),
            None => float_value(dt.as_f64()),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => Value::String(s.clone()),
        Data::Error(_) | Data::Empty => Value::Null,
    }
}

fn iso_datetime(naive: NaiveDateTime) -> String {
    naive.format("%Y-%m-%dT%H:%M:%S").to_string()
}

// Hours are not wrapped at 24.
fn clock_time(elapsed: TimeDelta) -> String {
    let secs = elapsed.num_seconds();
    format!("{:02}:{:02}:{:02}", secs / 3600, secs % 3600 / 60, secs % 60)
}

fn float_value(f: f64) -> Value {
    if f.fract() == 0.0 && f.abs() <= MAX_SAFE_INTEGER {
        Value::from(f as i64)
    } else {
        Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
    }
}
