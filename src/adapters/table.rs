//! CSV adapters for the tabular inputs and outputs around the core pipeline.

use crate::domain::model::{Dataset, LookupMapping, Record, SendResult, UnmatchedPolicy};
use crate::utils::error::{ConvertError, Result};
use std::collections::HashMap;

/// Reads a table with a header row. Short rows leave the trailing cells missing.
pub fn dataset_from_csv(bytes: &[u8]) -> Result<Dataset> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let columns: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();

    let mut records = Vec::new();
    for (index, row) in reader.records().enumerate() {
        let row = row?;
        if row.len() > columns.len() {
            return Err(ConvertError::mapping(format!(
                "row {} has {} cells but the header declares {} columns",
                index,
                row.len(),
                columns.len()
            )));
        }
        let data: HashMap<String, String> = columns
            .iter()
            .zip(row.iter())
            .map(|(column, value)| (column.clone(), value.to_string()))
            .collect();
        records.push(Record { data });
    }

    Dataset::new(columns, records)
}

/// Reads a two-column lookup file: header row, then `source,target` rows.
pub fn lookup_from_csv(bytes: &[u8], unmatched: UnmatchedPolicy) -> Result<LookupMapping> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(bytes);

    let mut pairs = Vec::new();
    for (index, row) in reader.records().enumerate() {
        let row = row?;
        match (row.get(0), row.get(1)) {
            (Some(source), Some(target)) => pairs.push((source.to_string(), target.to_string())),
            _ => {
                return Err(ConvertError::mapping(format!(
                    "lookup row {} needs a source and a target value",
                    index
                )))
            }
        }
    }

    Ok(LookupMapping::from_pairs(pairs)?.with_policy(unmatched))
}

pub fn dataset_to_csv(dataset: &Dataset) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(dataset.columns())?;
    for record in dataset.records() {
        writer.write_record(
            dataset
                .columns()
                .iter()
                .map(|column| record.get(column).unwrap_or_default()),
        )?;
    }
    writer.into_inner().map_err(|e| ConvertError::Io(e.into_error()))
}

pub const REPORT_COLUMNS: [&str; 4] = ["record_index", "status_code", "outcome", "response_body"];

/// Send report as CSV. The header row is written even when there are no results.
pub fn results_to_csv(results: &[SendResult]) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(REPORT_COLUMNS)?;
    for result in results {
        writer.serialize(result)?;
    }
    writer.into_inner().map_err(|e| ConvertError::Io(e.into_error()))
}

/// Pretty-printed JSON array, for report files named `*.json`.
pub fn results_to_json(results: &[SendResult]) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(results)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::SendOutcome;

    #[test]
    fn test_dataset_from_csv_keeps_order_and_short_rows() {
        let csv = "EMPLID,Dept,Location\nE1,10,HQ\nE2,20\n";
        let dataset = dataset_from_csv(csv.as_bytes()).unwrap();

        assert_eq!(dataset.columns(), &["EMPLID", "Dept", "Location"]);
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.record(0).unwrap().get("Location"), Some("HQ"));
        assert_eq!(dataset.record(1).unwrap().get("Location"), None);
    }

    #[test]
    fn test_dataset_from_csv_rejects_long_rows() {
        let csv = "EMPLID\nE1,extra\n";
        assert!(dataset_from_csv(csv.as_bytes()).is_err());
    }

    #[test]
    fn test_lookup_from_csv() {
        let csv = "legacy,workday\n10,Finance\n20,Sales\n";
        let mapping = lookup_from_csv(csv.as_bytes(), UnmatchedPolicy::PassThrough).unwrap();
        assert_eq!(mapping.len(), 2);
        assert_eq!(mapping.translate("20"), "Sales");
        assert_eq!(mapping.translate("30"), "30");
    }

    #[test]
    fn test_dataset_to_csv_fills_missing_cells() {
        let dataset = dataset_from_csv("A,B\n1,2\n3\n".as_bytes()).unwrap();
        let bytes = dataset_to_csv(&dataset).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "A,B\n1,2\n3,\n");
    }

    #[test]
    fn test_results_to_csv() {
        let results = vec![
            SendResult::from_response(0, 200, "<ok/>".to_string()),
            SendResult::failed(1, SendOutcome::RenderFailed, "unbound".to_string()),
        ];
        let text = String::from_utf8(results_to_csv(&results).unwrap()).unwrap();
        assert_eq!(
            text,
            "record_index,status_code,outcome,response_body\n0,200,delivered,<ok/>\n1,0,render_failed,unbound\n"
        );
    }

    #[test]
    fn test_empty_report_keeps_header() {
        let text = String::from_utf8(results_to_csv(&[]).unwrap()).unwrap();
        assert_eq!(text, "record_index,status_code,outcome,response_body\n");
    }

    #[test]
    fn test_results_to_json() {
        let results = vec![SendResult::failed(0, SendOutcome::Skipped, "not sent".to_string())];
        let value: serde_json::Value =
            serde_json::from_slice(&results_to_json(&results).unwrap()).unwrap();
        assert_eq!(value[0]["outcome"], "skipped");
        assert_eq!(value[0]["status_code"], 0);
    }
}
