use crate::config::ColumnMap;
use crate::error::{ReportError, Result};
use crate::types::{ComplaintRecord, ComplaintTable, DERIVED_COLUMNS, UNSPECIFIED};
use crate::util::{parse_date_safe, parse_f64_safe};
use csv::{ReaderBuilder, StringRecord};
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub total_rows: usize,
    pub loaded_rows: usize,
    pub parse_errors: usize,
    pub invalid_creation_dates: usize,
    pub invalid_closure_dates: usize,
    /// Optional columns the file did not carry.
    pub missing_columns: Vec<String>,
    /// Input columns dropped because they shadow a derived column.
    pub dropped_columns: Vec<String>,
}

/// Positions of the mapped columns within the kept headers.
struct ColumnIndex {
    creation_date: usize,
    closure_date: Option<usize>,
    family: Option<usize>,
    status: Option<usize>,
    responsible: Option<usize>,
    channel_source: Option<usize>,
    founded_flag: Option<usize>,
    responsible_entity: Option<usize>,
    restitution_flag: Option<usize>,
    restitution_amount: Option<usize>,
}

impl ColumnIndex {
    fn resolve(headers: &[String], columns: &ColumnMap, report: &mut LoadReport) -> Result<Self> {
        let position = |name: &str| headers.iter().position(|h| h == name);
        let mut optional = |name: &str| {
            let idx = position(name);
            if idx.is_none() {
                report.missing_columns.push(name.to_string());
            }
            idx
        };

        let creation_date = position(&columns.creation_date)
            .ok_or_else(|| ReportError::MissingColumn(columns.creation_date.clone()))?;

        Ok(Self {
            creation_date,
            closure_date: optional(&columns.closure_date),
            family: optional(&columns.family),
            status: optional(&columns.status),
            responsible: optional(&columns.responsible),
            channel_source: optional(&columns.channel_source),
            founded_flag: optional(&columns.founded_flag),
            responsible_entity: optional(&columns.responsible_entity),
            restitution_flag: optional(&columns.restitution_flag),
            restitution_amount: optional(&columns.restitution_amount),
        })
    }
}

fn cell(cells: &[String], idx: Option<usize>) -> Option<&str> {
    idx.and_then(|i| cells.get(i)).map(String::as_str)
}

/// Categorical cell, with blanks and absent columns mapped to "unspecified".
fn label(cells: &[String], idx: Option<usize>) -> String {
    match cell(cells, idx).map(str::trim) {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => UNSPECIFIED.to_string(),
    }
}

pub fn load_complaints(path: &Path, columns: &ColumnMap) -> Result<(ComplaintTable, LoadReport)> {
    info!(path = %path.display(), "reading complaint file");
    let file = std::fs::File::open(path)?;
    load_complaints_from_reader(file, columns)
}

pub fn load_complaints_from_reader<R: Read>(
    reader: R,
    columns: &ColumnMap,
) -> Result<(ComplaintTable, LoadReport)> {
    let mut rdr = ReaderBuilder::new().flexible(true).from_reader(reader);
    let mut report = LoadReport::default();

    let raw_headers: Vec<String> = rdr
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    // Derived columns are always recomputed, so stale copies from a previous
    // export are not carried along.
    let keep: Vec<usize> = raw_headers
        .iter()
        .enumerate()
        .filter(|(_, h)| {
            let derived = DERIVED_COLUMNS.contains(&h.as_str());
            if derived {
                report.dropped_columns.push(h.to_string());
            }
            !derived
        })
        .map(|(i, _)| i)
        .collect();
    if !report.dropped_columns.is_empty() {
        warn!(columns = ?report.dropped_columns, "ignoring input columns that shadow derived columns");
    }
    let headers: Vec<String> = keep.iter().map(|&i| raw_headers[i].clone()).collect();

    let idx = ColumnIndex::resolve(&headers, columns, &mut report)?;
    if !report.missing_columns.is_empty() {
        info!(columns = ?report.missing_columns, "optional columns absent, using defaults");
    }

    let mut records = Vec::new();
    for result in rdr.records() {
        report.total_rows += 1;
        let row: StringRecord = match result {
            Ok(r) => r,
            Err(e) => {
                warn!(row = report.total_rows, error = %e, "skipping malformed row");
                report.parse_errors += 1;
                continue;
            }
        };
        let cells: Vec<String> = keep
            .iter()
            .map(|&i| row.get(i).unwrap_or_default().to_string())
            .collect();

        let creation_date = parse_date_safe(cell(&cells, Some(idx.creation_date)));
        if creation_date.is_none() {
            report.invalid_creation_dates += 1;
        }
        let closure_raw = cell(&cells, idx.closure_date);
        let closure_date = parse_date_safe(closure_raw);
        if closure_date.is_none() && closure_raw.is_some_and(|s| !s.trim().is_empty()) {
            // Unparseable closure is treated as absent, i.e. still open.
            report.invalid_closure_dates += 1;
        }

        records.push(ComplaintRecord {
            creation_date,
            closure_date,
            family: label(&cells, idx.family),
            status: label(&cells, idx.status),
            responsible: label(&cells, idx.responsible),
            channel_source: label(&cells, idx.channel_source),
            founded_flag: label(&cells, idx.founded_flag),
            responsible_entity: label(&cells, idx.responsible_entity),
            restitution_flag: cell(&cells, idx.restitution_flag).map(str::to_string),
            restitution_amount: parse_f64_safe(cell(&cells, idx.restitution_amount)),
            cells,
        });
    }

    report.loaded_rows = records.len();
    info!(
        total = report.total_rows,
        loaded = report.loaded_rows,
        invalid_creation_dates = report.invalid_creation_dates,
        "complaint file loaded"
    );
    let table = ComplaintTable {
        headers,
        records,
        has_restitution_amount: idx.restitution_amount.is_some(),
    };
    Ok((table, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn load(csv: &str) -> Result<(ComplaintTable, LoadReport)> {
        load_complaints_from_reader(csv.as_bytes(), &ColumnMap::default())
    }

    #[test]
    fn reads_mapped_and_optional_columns() {
        let (table, report) = load(
            "DATE CREATION,DATE CLOTURE,FAMILLE,STATUS,RESTITUTION,MONTANT RESTITUTION,Note\n\
             2024-03-04,2024-03-11,Cartes,Traitée,OUI,\"1,200.50\",first\n\
             2024-03-05,,Crédit,En cours,,,\n",
        )
        .unwrap();
        assert_eq!(report.total_rows, 2);
        assert_eq!(report.loaded_rows, 2);
        assert!(report.missing_columns.contains(&"RESPONSABLE".to_string()));
        assert!(table.has_restitution_amount);

        let first = &table.records[0];
        assert_eq!(first.creation_date, NaiveDate::from_ymd_opt(2024, 3, 4));
        assert_eq!(first.closure_date, NaiveDate::from_ymd_opt(2024, 3, 11));
        assert_eq!(first.family, "Cartes");
        assert_eq!(first.restitution_amount, Some(1200.5));
        assert_eq!(first.responsible, UNSPECIFIED);
        assert_eq!(first.cells.last().unwrap(), "first");

        let second = &table.records[1];
        assert_eq!(second.closure_date, None);
        assert_eq!(second.restitution_flag.as_deref(), Some(""));
        assert_eq!(second.restitution_amount, None);
    }

    #[test]
    fn french_amounts_keep_their_decimals() {
        let (table, _) = load(
            "DATE CREATION,RESTITUTION,MONTANT RESTITUTION\n\
             2024-03-04,OUI,\"150,75\"\n\
             2024-03-04,OUI,\"1 200,50\"\n",
        )
        .unwrap();
        assert_eq!(table.records[0].restitution_amount, Some(150.75));
        assert_eq!(table.records[1].restitution_amount, Some(1200.5));
    }

    #[test]
    fn missing_creation_column_is_fatal() {
        let err = load("FAMILLE,STATUS\nCartes,Traitée\n").unwrap_err();
        match err {
            ReportError::MissingColumn(c) => assert_eq!(c, "DATE CREATION"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn header_match_is_exact() {
        let err = load("Date Creation\n2024-01-01\n").unwrap_err();
        assert!(matches!(err, ReportError::MissingColumn(_)));
    }

    #[test]
    fn bad_dates_keep_the_row() {
        let (table, report) = load("DATE CREATION,DATE CLOTURE\nsoon,nope\n2024-01-02,\n").unwrap();
        assert_eq!(table.records.len(), 2);
        assert_eq!(report.invalid_creation_dates, 1);
        assert_eq!(report.invalid_closure_dates, 1);
        assert_eq!(table.records[0].creation_date, None);
        assert_eq!(table.records[0].closure_date, None);
        assert!(!table.has_restitution_amount);
    }

    #[test]
    fn derived_columns_in_input_are_dropped() {
        let (table, report) = load(
            "DATE CREATION,state,FAMILLE,alert_flag\n2024-01-02,open,Cartes,alert\n",
        )
        .unwrap();
        assert_eq!(table.headers, vec!["DATE CREATION", "FAMILLE"]);
        assert_eq!(table.records[0].cells, vec!["2024-01-02", "Cartes"]);
        assert_eq!(report.dropped_columns, vec!["state", "alert_flag"]);
        assert_eq!(table.records[0].family, "Cartes");
    }

    #[test]
    fn custom_column_names() {
        let columns = ColumnMap {
            creation_date: "created".to_string(),
            family: "family".to_string(),
            ..ColumnMap::default()
        };
        let (table, _) =
            load_complaints_from_reader("created,family\n2024-01-02,Loans\n".as_bytes(), &columns)
                .unwrap();
        assert_eq!(table.records[0].family, "Loans");
    }
}
