use serde_json::Value;

use crate::error::AppError;
use crate::loader::RowRecord;

/// Filename offered to the browser for the CSV attachment.
pub const CSV_FILENAME: &str = "output.csv";

/// Convert row records to CSV
///
/// The header row starts with the keys of the first record, in order, and
/// is extended by any key that only shows up in a later record. Missing
/// keys and null values become empty fields; quoting follows RFC 4180.
///
/// # Arguments
/// * `rows` - The dataset to render
///
/// # Returns
/// * `Result<Vec<u8>, AppError>` - CSV bytes, `\n`-terminated, or an error
///
/// # Errors
/// * `AppError::EmptyDataset` if there are no rows to derive a header from
///
/// # Examples
/// ```
/// use sheetgate::downloader::render_csv;
/// use sheetgate::loader::rows_from_json;
///
/// let rows = rows_from_json(serde_json::json!([{"name": "Alice", "score": 10}]));
/// let csv = render_csv(&rows).unwrap();
/// assert_eq!(csv, b"name,score\nAlice,10\n");
/// ```
pub fn render_csv(rows: &[RowRecord]) -> Result<Vec<u8>, AppError> {
    if rows.is_empty() {
        return Err(AppError::EmptyDataset);
    }

    let columns = column_order(rows);
    let mut writer = csv::Writer::from_writer(Vec::new());

    writer.write_record(&columns).map_err(csv_error)?;
    for row in rows {
        writer
            .write_record(columns.iter().map(|col| cell_text(row.get(*col))))
            .map_err(csv_error)?;
    }

    writer.into_inner().map_err(|e| AppError::Storage(e.into_error()))
}

fn column_order(rows: &[RowRecord]) -> Vec<&str> {
    let mut columns: Vec<&str> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !columns.contains(&key.as_str()) {
                columns.push(key);
            }
        }
    }
    columns
}

fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(nested) => nested.to_string(),
    }
}

fn csv_error(e: csv::Error) -> AppError {
    match e.into_kind() {
        csv::ErrorKind::Io(io) => AppError::Storage(io),
        other => AppError::Storage(std::io::Error::other(format!("{:?}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{parse, rows_from_json};
    use rust_xlsxwriter::{Workbook, Worksheet};
    use serde_json::json;

    #[test]
    fn renders_two_row_example() {
        let rows = rows_from_json(json!([
            {"name": "Alice", "score": 10},
            {"name": "Bob", "score": 20}
        ]));
        let csv = render_csv(&rows).unwrap();
        assert_eq!(String::from_utf8(csv).unwrap(), "name,score\nAlice,10\nBob,20\n");
    }

    #[test]
    fn empty_dataset_is_an_error() {
        assert!(matches!(render_csv(&[]), Err(AppError::EmptyDataset)));
    }

    #[test]
    fn later_keys_extend_header() {
        let rows = rows_from_json(json!([
            {"a": 1},
            {"b": 2, "a": 3}
        ]));
        let csv = String::from_utf8(render_csv(&rows).unwrap()).unwrap();
        assert_eq!(csv, "a,b\n1,\n3,2\n");
    }

    #[test]
    fn quotes_special_characters() {
        let rows = rows_from_json(json!([{"text": "hello, \"world\"", "n": null}]));
        let csv = String::from_utf8(render_csv(&rows).unwrap()).unwrap();
        assert_eq!(csv, "text,n\n\"hello, \"\"world\"\"\",\n");
    }

    #[test]
    fn nested_values_render_as_json() {
        let rows = rows_from_json(json!([{"tags": ["x", "y"], "ok": true}]));
        let csv = String::from_utf8(render_csv(&rows).unwrap()).unwrap();
        assert_eq!(csv, "tags,ok\n\"[\"\"x\"\",\"\"y\"\"]\",true\n");
    }

    // xlsx -> rows -> csv -> rows keeps every (column, value) pair as text.
    #[test]
    fn csv_round_trip_preserves_pairs() {
        let mut workbook = Workbook::new();
        let mut worksheet = Worksheet::new();
        worksheet.write_string(0, 0, "city").unwrap();
        worksheet.write_string(0, 1, "population").unwrap();
        worksheet.write_string(1, 0, "Oslo, Norway").unwrap();
        worksheet.write_number(1, 1, 709037.0).unwrap();
        worksheet.write_string(2, 0, "Lima").unwrap();
        worksheet.write_number(2, 1, 10.5).unwrap();
        workbook.push_worksheet(worksheet);
        let bytes = workbook.save_to_buffer().unwrap();

        let rows = parse(&bytes, "cities.xlsx").unwrap();
        let csv = render_csv(&rows).unwrap();

        let mut reader = csv::Reader::from_reader(csv.as_slice());
        let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        let reparsed: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();

        assert_eq!(reparsed.len(), rows.len());
        for (record, row) in reparsed.iter().zip(&rows) {
            for (header, field) in headers.iter().zip(record.iter()) {
                assert_eq!(field, cell_text(row.get(header)));
            }
        }
        assert_eq!(&reparsed[0][0], "Oslo, Norway");
        assert_eq!(&reparsed[1][1], "10.5");
    }
}
