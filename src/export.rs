use std::path::{Path, PathBuf};

use rust_xlsxwriter::Workbook;
use serde_json::Value as Json;
use tracing::info;

use crate::error::{FinsyncError, Result};
use crate::models::{field_union, Record};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub rows: usize,
    pub columns: usize,
}

fn row_index(i: usize) -> Result<u32> {
    u32::try_from(i).map_err(|_| FinsyncError::Other(format!("row {i} is out of spreadsheet range")))
}

fn col_index(i: usize) -> Result<u16> {
    u16::try_from(i).map_err(|_| FinsyncError::Other(format!("column {i} is out of spreadsheet range")))
}

/// Write `records` to a single-sheet workbook at `path`, replacing any file
/// already there. Row 0 is the header: every field name in first-seen order.
pub fn export_records(records: &[Record], path: &Path) -> Result<ExportSummary> {
    let fields = field_union(records);

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();

    for (c, field) in fields.iter().enumerate() {
        sheet.write_string(0, col_index(c)?, field.as_str())?;
    }

    for (r, record) in records.iter().enumerate() {
        let row = row_index(r + 1)?;
        for (c, field) in fields.iter().enumerate() {
            let col = col_index(c)?;
            match record.get(field) {
                None | Some(Json::Null) => {}
                Some(Json::String(s)) => {
                    sheet.write_string(row, col, s.as_str())?;
                }
                Some(Json::Bool(b)) => {
                    sheet.write_boolean(row, col, *b)?;
                }
                Some(Json::Number(n)) => match n.as_f64() {
                    Some(f) => {
                        sheet.write_number(row, col, f)?;
                    }
                    None => {
                        sheet.write_string(row, col, n.to_string())?;
                    }
                },
                Some(nested) => {
                    sheet.write_string(row, col, nested.to_string())?;
                }
            }
        }
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    workbook.save(path)?;

    info!(path = %path.display(), rows = records.len(), columns = fields.len(), "spreadsheet written");
    Ok(ExportSummary {
        path: path.to_path_buf(),
        rows: records.len(),
        columns: fields.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::{open_workbook, Data, Range, Reader, Xlsx};
    use serde_json::json;

    fn records(items: Json) -> Vec<Record> {
        items
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_object().cloned().unwrap())
            .collect()
    }

    fn read_back(path: &Path) -> Range<Data> {
        let mut workbook: Xlsx<_> = open_workbook(path).unwrap();
        workbook.worksheet_range("Sheet1").unwrap()
    }

    fn text(s: &str) -> Data {
        Data::String(s.to_string())
    }

    #[test]
    fn test_header_is_ordered_union_of_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("FTransactions.xlsx");
        let data = records(json!([
            {"_id": "a1", "amount": 10.5},
            {"_id": "a2", "status": "paid", "amount": 20}
        ]));

        let summary = export_records(&data, &path).unwrap();
        assert_eq!(summary.rows, 2);
        assert_eq!(summary.columns, 3);

        let range = read_back(&path);
        assert_eq!(range.get_size(), (3, 3));
        assert_eq!(range.get_value((0, 0)), Some(&text("_id")));
        assert_eq!(range.get_value((0, 1)), Some(&text("amount")));
        assert_eq!(range.get_value((0, 2)), Some(&text("status")));
        assert_eq!(range.get_value((1, 1)), Some(&Data::Float(10.5)));
        assert_eq!(range.get_value((2, 1)), Some(&Data::Float(20.0)));
        assert_eq!(range.get_value((2, 2)), Some(&text("paid")));
    }

    #[test]
    fn test_missing_and_null_values_stay_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.xlsx");
        let data = records(json!([
            {"_id": "a1", "status": null, "amount": 1},
            {"_id": "a2", "status": "open", "amount": 2}
        ]));
        export_records(&data, &path).unwrap();

        let range = read_back(&path);
        assert!(matches!(range.get_value((1, 1)), None | Some(Data::Empty)));
        assert_eq!(range.get_value((2, 1)), Some(&text("open")));
    }

    #[test]
    fn test_booleans_and_nested_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.xlsx");
        let data = records(json!([
            {"_id": "a1", "recurring": true, "tags": ["rent", "home"]}
        ]));
        export_records(&data, &path).unwrap();

        let range = read_back(&path);
        assert_eq!(range.get_value((1, 1)), Some(&Data::Bool(true)));
        assert_eq!(range.get_value((1, 2)), Some(&text("[\"rent\",\"home\"]")));
    }

    #[test]
    fn test_overwrites_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("FTransactions.xlsx");
        export_records(&records(json!([{"_id": "a1"}, {"_id": "a2"}, {"_id": "a3"}])), &path).unwrap();
        export_records(&records(json!([{"_id": "b1"}])), &path).unwrap();

        let range = read_back(&path);
        assert_eq!(range.get_size(), (2, 1));
        assert_eq!(range.get_value((1, 0)), Some(&text("b1")));
    }

    #[test]
    fn test_empty_input_writes_empty_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("empty.xlsx");
        let summary = export_records(&[], &path).unwrap();
        assert_eq!(summary.rows, 0);
        assert_eq!(summary.columns, 0);
        assert!(path.exists());
    }
}
