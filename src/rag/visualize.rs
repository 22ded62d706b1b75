//! Chart specifications rendered by the dashboard frontend from SQL results.

use super::classify::ChartKind;
use crate::elastic::SqlResponse;
use serde::Serialize;
use serde_json::Value;

const TABLE_TITLE: &str = "Blood Test Results";
const X_COLUMN: &str = "test_date";
/// Columns before the series: patient name, NHI, and test date.
const LEADING_COLUMNS: usize = 3;

/// Frontend-neutral description of a chart or table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSpec {
    /// Chart style.
    pub kind: ChartKind,
    /// Heading shown above the chart.
    pub title: String,
    /// Column plotted on the x axis; absent for tables.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    /// Columns plotted as series; empty for tables.
    pub series: Vec<String>,
    /// Column names of `rows`.
    pub columns: Vec<String>,
    /// Result rows in column order.
    pub rows: Vec<Vec<Value>>,
}

impl ChartSpec {
    /// Describe `result` as a chart of `kind`.
    pub fn from_sql(kind: ChartKind, result: SqlResponse) -> Self {
        let columns: Vec<String> = result.columns.into_iter().map(|column| column.name).collect();
        if kind == ChartKind::Table {
            return Self {
                kind,
                title: TABLE_TITLE.to_string(),
                x: None,
                series: Vec::new(),
                columns,
                rows: result.rows,
            };
        }
        Self {
            kind,
            title: format!("Historical Blood Count ({} Graph)", capitalize(kind.name())),
            x: Some(X_COLUMN.to_string()),
            series: columns.iter().skip(LEADING_COLUMNS).cloned().collect(),
            columns,
            rows: result.rows,
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elastic::SqlColumn;
    use serde_json::json;

    fn result() -> SqlResponse {
        let column = |name: &str| SqlColumn {
            name: name.into(),
            kind: "keyword".into(),
        };
        SqlResponse {
            columns: vec![
                column("patient_name"),
                column("NHI"),
                column("test_date"),
                column("haemoglobin"),
                column("wbc"),
            ],
            rows: vec![vec![
                json!("Jane Doe"),
                json!("ABC1234"),
                json!("2023-04-01"),
                json!(141.2),
                json!(6.3),
            ]],
        }
    }

    #[test]
    fn graphs_plot_every_column_after_the_third() {
        let spec = ChartSpec::from_sql(ChartKind::Scatter, result());
        assert_eq!(spec.title, "Historical Blood Count (Scatter Graph)");
        assert_eq!(spec.x.as_deref(), Some("test_date"));
        assert_eq!(spec.series, ["haemoglobin", "wbc"]);
        assert_eq!(spec.rows.len(), 1);
    }

    #[test]
    fn tables_keep_all_columns_without_axes() {
        let spec = ChartSpec::from_sql(ChartKind::Table, result());
        assert_eq!(spec.title, "Blood Test Results");
        assert!(spec.x.is_none());
        assert!(spec.series.is_empty());
        assert_eq!(spec.columns.len(), 5);

        let json = serde_json::to_value(&spec).expect("json");
        assert_eq!(json["kind"], "table");
        assert!(json.get("x").is_none());
    }
}
