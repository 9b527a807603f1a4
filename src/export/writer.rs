use std::collections::HashMap;
use std::io::Write;

use super::builder::AssembledRow;
use crate::dataset::Table;

/// Column holding the normalized anomaly score
pub const SCORE_COLUMN: &str = "anomaly_score";
/// Column holding the `Anomaly` / `Normal` label
pub const LABEL_COLUMN: &str = "anomaly";

/// Which table rows end up in an export
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RowFilter {
    /// Every table row; rows excluded at ingestion get empty labels
    #[default]
    All,
    /// Only rows flagged as anomalies
    AnomaliesOnly,
}

fn label(is_anomaly: bool) -> &'static str {
    if is_anomaly {
        "Anomaly"
    } else {
        "Normal"
    }
}

/// Table rows in output order, paired with their result when they were scored
fn labeled_rows<'a>(
    table: &'a Table,
    rows: &'a [AssembledRow],
    filter: RowFilter,
) -> impl Iterator<Item = (&'a crate::dataset::Record, Option<&'a AssembledRow>)> + 'a {
    let by_index: HashMap<usize, &AssembledRow> = rows.iter().map(|r| (r.row_index, r)).collect();
    table
        .records
        .iter()
        .enumerate()
        .map(move |(index, record)| (record, by_index.get(&index).copied()))
        .filter(move |(_, result)| match filter {
            RowFilter::All => true,
            RowFilter::AnomaliesOnly => result.is_some_and(|r| r.is_anomaly),
        })
}

/// Write the table as CSV with score and label columns appended
pub fn write_labeled_csv<W: Write>(
    table: &Table,
    rows: &[AssembledRow],
    filter: RowFilter,
    writer: W,
) -> crate::Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    let mut header: Vec<&str> = table.column_names().iter().map(String::as_str).collect();
    header.extend([SCORE_COLUMN, LABEL_COLUMN]);
    csv_writer.write_record(&header)?;

    for (record, result) in labeled_rows(table, rows, filter) {
        let mut fields: Vec<String> = table
            .column_names()
            .iter()
            .map(|column| record.get_field(column).to_string())
            .collect();
        match result {
            Some(r) => fields.extend([r.score.to_string(), label(r.is_anomaly).to_string()]),
            None => fields.extend([String::new(), String::new()]),
        }
        csv_writer.write_record(&fields)?;
    }

    csv_writer.flush()?;
    Ok(())
}

/// Write the table as a JSON array of objects with score and label fields appended
pub fn write_labeled_json<W: Write>(
    table: &Table,
    rows: &[AssembledRow],
    filter: RowFilter,
    writer: W,
) -> crate::Result<()> {
    let objects: Vec<serde_json::Map<String, serde_json::Value>> = labeled_rows(table, rows, filter)
        .map(|(record, result)| {
            let mut object = serde_json::Map::new();
            for column in table.column_names() {
                object.insert(column.clone(), serde_json::to_value(record.get_field(column))?);
            }
            let (score, label) = match result {
                Some(r) => (serde_json::json!(r.score), serde_json::json!(label(r.is_anomaly))),
                None => (serde_json::Value::Null, serde_json::Value::Null),
            };
            object.insert(SCORE_COLUMN.to_string(), score);
            object.insert(LABEL_COLUMN.to_string(), label);
            Ok(object)
        })
        .collect::<serde_json::Result<_>>()?;

    serde_json::to_writer_pretty(writer, &objects)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_and_rows() -> (Table, Vec<AssembledRow>) {
        let table = Table::from_csv("orders", "id,amount\na,10\nb,\nc,500").unwrap();
        let rows = vec![
            AssembledRow {
                row_index: 0,
                values: vec![10.0],
                score: 0.25,
                is_anomaly: false,
            },
            AssembledRow {
                row_index: 2,
                values: vec![500.0],
                score: 0.75,
                is_anomaly: true,
            },
        ];
        (table, rows)
    }

    #[test]
    fn test_write_labeled_csv() {
        let (table, rows) = table_and_rows();
        let mut out = Vec::new();
        write_labeled_csv(&table, &rows, RowFilter::All, &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "id,amount,anomaly_score,anomaly\na,10,0.25,Normal\nb,,,\nc,500,0.75,Anomaly\n"
        );
    }

    #[test]
    fn test_write_labeled_csv_anomalies_only() {
        let (table, rows) = table_and_rows();
        let mut out = Vec::new();
        write_labeled_csv(&table, &rows, RowFilter::AnomaliesOnly, &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "id,amount,anomaly_score,anomaly\nc,500,0.75,Anomaly\n");
    }

    #[test]
    fn test_write_labeled_json() {
        let (table, rows) = table_and_rows();
        let mut out = Vec::new();
        write_labeled_json(&table, &rows, RowFilter::All, &mut out).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        let records = value.as_array().unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0]["anomaly"], "Normal");
        assert_eq!(records[1]["amount"], serde_json::Value::Null);
        assert_eq!(records[1]["anomaly_score"], serde_json::Value::Null);
        assert_eq!(records[2]["amount"], 500.0);
        assert_eq!(records[2]["anomaly"], "Anomaly");
    }
}
