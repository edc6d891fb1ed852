use crate::error::{ReportError, Result};
use crate::filter::FilteredView;
use crate::types::{
    AlertFlag, DayCountRow, DelayBucket, GroupMean, GroupMeanRow, PreviewRow, RestitutionLabel,
    Share, ShareRow, State, SummaryStats, DERIVED_COLUMNS,
};
use crate::util::{format_int, format_number, format_percent, text_bar};
use chrono::NaiveDate;
use serde::Serialize;
use std::io::{Read, Write};
use std::path::Path;
use std::str::FromStr;
use tabled::{settings::Style, Table, Tabled};

const BAR_WIDTH: usize = 30;

/// Write the filtered view as CSV: original columns, then the derived ones.
pub fn write_export<W: Write>(writer: W, headers: &[String], view: &FilteredView<'_>) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    let header_row: Vec<&str> = headers
        .iter()
        .map(String::as_str)
        .chain(DERIVED_COLUMNS)
        .collect();
    wtr.write_record(&header_row)?;
    for r in &view.rows {
        // Short rows from a flexible input are padded so every line has the
        // same width as the header.
        let mut cells = r.record.cells.clone();
        cells.resize(headers.len(), String::new());
        cells.extend(r.derived_cells());
        wtr.write_record(&cells)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_export_file(path: &Path, headers: &[String], view: &FilteredView<'_>) -> Result<()> {
    let file = std::fs::File::create(path)?;
    write_export(file, headers, view)?;
    tracing::info!(path = %path.display(), rows = view.len(), "wrote filtered export");
    Ok(())
}

/// One row of a previously exported file, with the derived columns parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedRow {
    pub cells: Vec<String>,
    pub delay_business_days: Option<i64>,
    pub state: State,
    pub delay_bucket: Option<DelayBucket>,
    pub family_mean_closed_delay: Option<f64>,
    pub alert_flag: Option<AlertFlag>,
    pub restitution_label: RestitutionLabel,
    pub restituted_amount: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportedTable {
    pub headers: Vec<String>,
    pub rows: Vec<ExportedRow>,
}

fn parse_opt<T: FromStr>(column: &str, s: &str) -> Result<Option<T>> {
    if s.is_empty() {
        return Ok(None);
    }
    s.parse::<T>()
        .map(Some)
        .map_err(|_| ReportError::MalformedExport(format!("bad value '{}' in column {}", s, column)))
}

fn parse_req<T: FromStr>(column: &str, s: &str) -> Result<T> {
    parse_opt(column, s)?
        .ok_or_else(|| ReportError::MalformedExport(format!("empty value in column {}", column)))
}

/// Parse a file produced by `write_export`.
pub fn read_export<R: Read>(reader: R) -> Result<ExportedTable> {
    let mut rdr = csv::Reader::from_reader(reader);
    let all_headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
    let n = all_headers.len();
    if n < DERIVED_COLUMNS.len()
        || all_headers[n - DERIVED_COLUMNS.len()..]
            .iter()
            .zip(DERIVED_COLUMNS)
            .any(|(h, want)| h != want)
    {
        return Err(ReportError::MalformedExport(
            "derived columns missing from header".to_string(),
        ));
    }
    let split = n - DERIVED_COLUMNS.len();

    let mut rows = Vec::new();
    for result in rdr.records() {
        let rec = result?;
        let fields: Vec<&str> = rec.iter().collect();
        let (original, derived) = fields.split_at(split);
        rows.push(ExportedRow {
            cells: original.iter().map(|s| s.to_string()).collect(),
            delay_business_days: parse_opt(DERIVED_COLUMNS[0], derived[0])?,
            state: parse_req(DERIVED_COLUMNS[1], derived[1])?,
            delay_bucket: parse_opt(DERIVED_COLUMNS[2], derived[2])?,
            family_mean_closed_delay: parse_opt(DERIVED_COLUMNS[3], derived[3])?,
            alert_flag: parse_opt(DERIVED_COLUMNS[4], derived[4])?,
            restitution_label: parse_req(DERIVED_COLUMNS[5], derived[5])?,
            restituted_amount: parse_req(DERIVED_COLUMNS[6], derived[6])?,
        });
    }
    Ok(ExportedTable {
        headers: all_headers[..split].to_vec(),
        rows,
    })
}

/// Short fixed-field summary with literal labeled lines.
pub fn write_text_summary<W: Write>(
    mut w: W,
    stats: &SummaryStats,
    today: NaiveDate,
    filters: &[String],
) -> Result<()> {
    writeln!(w, "Complaint report")?;
    writeln!(w, "Reference date: {}", today)?;
    writeln!(w, "Total complaints: {}", format_int(stats.total_complaints))?;
    writeln!(w, "Complaints with delay >= 40 days: {}", format_int(stats.delayed_40_plus))?;
    writeln!(w, "Open complaints on alert: {}", format_int(stats.open_alerts))?;
    writeln!(w, "Total restituted amount: {}", format_number(stats.total_restituted, 2))?;
    if !filters.is_empty() {
        writeln!(w, "Filters:")?;
        for f in filters {
            writeln!(w, "  {}", f)?;
        }
    }
    Ok(())
}

pub fn write_text_summary_file(
    path: &Path,
    stats: &SummaryStats,
    today: NaiveDate,
    filters: &[String],
) -> Result<()> {
    let file = std::fs::File::create(path)?;
    write_text_summary(file, stats, today, filters)
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let s = serde_json::to_string_pretty(value)?;
    std::fs::write(path, s)?;
    Ok(())
}

pub fn share_rows(shares: &[Share]) -> Vec<ShareRow> {
    shares
        .iter()
        .map(|s| ShareRow {
            value: s.label.clone(),
            count: format_int(s.count),
            share: format_percent(s.proportion),
            bar: text_bar(s.proportion, BAR_WIDTH),
        })
        .collect()
}

pub fn group_mean_rows(means: &[GroupMean]) -> Vec<GroupMeanRow> {
    means
        .iter()
        .map(|m| GroupMeanRow {
            value: m.label.clone(),
            closed: format_int(m.closed),
            avg_delay: format_number(m.mean_delay, 2),
        })
        .collect()
}

pub fn day_count_rows(counts: &[(u32, usize)]) -> Vec<DayCountRow> {
    let max = counts.iter().map(|(_, c)| *c).max().unwrap_or(0);
    counts
        .iter()
        .map(|&(day, complaints)| DayCountRow {
            day,
            complaints,
            bar: if max == 0 {
                String::new()
            } else {
                text_bar(complaints as f64 / max as f64, BAR_WIDTH)
            },
        })
        .collect()
}

pub fn preview_rows(view: &FilteredView<'_>, max_rows: usize) -> Vec<PreviewRow> {
    let date = |d: Option<NaiveDate>| d.map(|d| d.to_string()).unwrap_or_default();
    view.rows
        .iter()
        .take(max_rows)
        .map(|r| PreviewRow {
            created: date(r.record.creation_date),
            closed: date(r.record.closure_date),
            family: r.record.family.clone(),
            status: r.record.status.clone(),
            delay: r
                .delay_business_days
                .map(|d| d.to_string())
                .unwrap_or_default(),
            bucket: r.delay_bucket.map(|b| b.to_string()).unwrap_or_default(),
            alert: r.alert_flag.map(|a| a.to_string()).unwrap_or_default(),
        })
        .collect()
}

pub fn render_table<T: Tabled + Clone>(rows: &[T]) -> String {
    if rows.is_empty() {
        return "(no rows)".to_string();
    }
    Table::new(rows.to_vec()).with(Style::markdown()).to_string()
}

pub fn preview_table<T: Tabled + Clone>(title: &str, rows: &[T]) {
    println!("{}\n", title);
    println!("{}\n", render_table(rows));
}
