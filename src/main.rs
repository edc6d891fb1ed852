// Entry point and high-level CLI flow.
//
// - `report` runs the whole pipeline once: load, enrich, filter, print the
//   metrics and charts, then write the export files.
// - `interactive` keeps the enriched table in memory so filters can be
//   changed and reports regenerated without reloading the file.
use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use claimdesk::config::ReportConfig;
use claimdesk::filter::{delay_range, distinct_values, Field, FilterSelection};
use claimdesk::types::{AlertFlag, DelayBucket, EnrichedTable, State};
use claimdesk::{loader, output, pipeline, reports, util};
use once_cell::sync::Lazy;
use std::io::{self, BufRead, Write};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const EXPORT_FILE: &str = "complaints_filtered.csv";
const TEXT_SUMMARY_FILE: &str = "summary.txt";
const JSON_SUMMARY_FILE: &str = "summary.json";

#[derive(Parser, Debug)]
#[command(author, version, about = "Complaint delay and alert reporting", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load a complaint file, print the report and write the exports
    Report(ReportArgs),
    /// Menu-driven session over a loaded complaint file
    Interactive(SessionArgs),
}

#[derive(Args, Debug, Clone)]
struct SessionArgs {
    /// Complaint spreadsheet exported as CSV
    #[arg(long, env = "CLAIMDESK_INPUT")]
    input: Option<PathBuf>,
    /// TOML file overriding column names and display settings
    #[arg(long, env = "CLAIMDESK_CONFIG")]
    config: Option<PathBuf>,
    /// End date for open complaints (defaults to the current local date)
    #[arg(long, value_parser = parse_day)]
    today: Option<NaiveDate>,
    /// Directory receiving the export files
    #[arg(long, env = "CLAIMDESK_OUT_DIR", default_value = ".")]
    out_dir: PathBuf,
    /// Number of values shown by name in distributions
    #[arg(long)]
    top_n: Option<usize>,
    /// Rows shown in the terminal preview
    #[arg(long)]
    preview_rows: Option<usize>,
}

#[derive(Args, Debug)]
struct ReportArgs {
    #[command(flatten)]
    session: SessionArgs,
    /// Keep only these delay buckets
    #[arg(long = "bucket")]
    buckets: Vec<DelayBucket>,
    /// Keep only these states (open, closed)
    #[arg(long = "state")]
    states: Vec<State>,
    /// Keep only these alert flags (alert, ok, not_applicable)
    #[arg(long = "alert")]
    alerts: Vec<AlertFlag>,
    /// Keep only these statuses
    #[arg(long = "status")]
    statuses: Vec<String>,
    /// Keep only these families
    #[arg(long = "family")]
    families: Vec<String>,
    /// Constrain any field, e.g. `--where channel=Email,Phone`; an empty
    /// list (`--where status=`) matches nothing
    #[arg(long = "where", value_parser = parse_constraint)]
    constraints: Vec<(Field, Vec<String>)>,
    /// Maximum delay in business days
    #[arg(long)]
    max_delay: Option<i64>,
}

fn parse_day(s: &str) -> std::result::Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("expected YYYY-MM-DD: {}", e))
}

fn parse_constraint(s: &str) -> std::result::Result<(Field, Vec<String>), String> {
    let (field, values) = s
        .split_once('=')
        .ok_or_else(|| format!("expected FIELD=VALUES, got '{}'", s))?;
    let field: Field = field.parse().map_err(|e| format!("{}", e))?;
    Ok((field, split_list(values)))
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

impl SessionArgs {
    fn resolve_config(&self) -> Result<ReportConfig> {
        let mut config = match &self.config {
            Some(path) => ReportConfig::load(path)
                .with_context(|| format!("reading config {}", path.display()))?,
            None => ReportConfig::default(),
        };
        if let Some(n) = self.top_n {
            config.top_n = n;
        }
        if let Some(n) = self.preview_rows {
            config.preview_rows = n;
        }
        Ok(config)
    }

    // The clock is read once here and passed down explicitly.
    fn resolve_today(&self) -> NaiveDate {
        self.today
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }
}

impl ReportArgs {
    fn selection(&self) -> FilterSelection {
        let mut selection = FilterSelection::new();
        if !self.buckets.is_empty() {
            selection.set(Field::Bucket, self.buckets.iter().map(|b| b.to_string()));
        }
        if !self.states.is_empty() {
            selection.set(Field::State, self.states.iter().map(|s| s.to_string()));
        }
        if !self.alerts.is_empty() {
            selection.set(Field::Alert, self.alerts.iter().map(|a| a.to_string()));
        }
        if !self.statuses.is_empty() {
            selection.set(Field::Status, self.statuses.iter().cloned());
        }
        if !self.families.is_empty() {
            selection.set(Field::Family, self.families.iter().cloned());
        }
        for (field, values) in &self.constraints {
            selection.set(*field, values.iter().cloned());
        }
        selection.max_delay = self.max_delay;
        selection
    }
}

fn load_table(path: &Path, config: &ReportConfig, today: NaiveDate) -> Result<EnrichedTable> {
    let (table, load_report) = loader::load_complaints(path, &config.columns)
        .with_context(|| format!("loading {}", path.display()))?;
    println!(
        "Processing dataset... ({} rows read, {} loaded)",
        util::format_int(load_report.total_rows),
        util::format_int(load_report.loaded_rows)
    );
    if load_report.parse_errors > 0 {
        println!(
            "Note: {} rows skipped due to malformed lines.",
            util::format_int(load_report.parse_errors)
        );
    }
    if load_report.invalid_creation_dates > 0 {
        println!(
            "Note: {} rows have no usable creation date; their delay is left empty.",
            util::format_int(load_report.invalid_creation_dates)
        );
    }
    if !load_report.missing_columns.is_empty() {
        println!(
            "Info: optional columns not found: {}",
            load_report.missing_columns.join(", ")
        );
    }
    println!();
    Ok(pipeline::enrich(table, today))
}

/// Print metrics and charts for the current selection and write the exports.
fn generate_reports(
    table: &EnrichedTable,
    selection: &FilterSelection,
    config: &ReportConfig,
    out_dir: &Path,
) -> Result<()> {
    let view = selection.apply(table);
    let filters = selection.describe();
    let stats = reports::summarize(&view);

    println!("Key figures");
    if !filters.is_empty() {
        println!("(Filtered: {})", filters.join("; "));
    }
    println!("Total complaints: {}", util::format_int(stats.total_complaints));
    println!(
        "Complaints with delay >= {} days: {}",
        reports::LONG_DELAY_DAYS,
        util::format_int(stats.delayed_40_plus)
    );
    println!("Open complaints on alert: {}", util::format_int(stats.open_alerts));
    println!("Average delay: {} business days", util::format_number(stats.avg_delay, 2));
    if table.has_restitution_amount {
        println!(
            "Total restituted amount: {}",
            util::format_number(stats.total_restituted, 2)
        );
    }
    println!();

    // Buckets always show all four categories, so no "Other" merging.
    let by_bucket = reports::distribution(&view, Field::Bucket, DelayBucket::ALL.len());
    output::preview_table("By delay bucket", &output::share_rows(&by_bucket));
    let by_family = reports::distribution(&view, Field::Family, config.top_n);
    output::preview_table(
        &format!("By family (top {})", config.top_n),
        &output::share_rows(&by_family),
    );
    let by_state = reports::distribution(&view, Field::State, 2);
    output::preview_table("By state", &output::share_rows(&by_state));
    let days = reports::daily_counts_for_month(&view, view.today);
    output::preview_table(
        &format!("By day of {}", view.today.format("%B %Y")),
        &output::day_count_rows(&days),
    );
    let means = reports::closed_mean_by(&view, Field::Family);
    output::preview_table(
        "Average time to close by family (business days)",
        &output::group_mean_rows(&means),
    );
    output::preview_table(
        "Filtered complaints",
        &output::preview_rows(&view, config.preview_rows),
    );

    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;
    let export = out_dir.join(EXPORT_FILE);
    output::write_export_file(&export, &table.headers, &view)?;
    output::write_text_summary_file(&out_dir.join(TEXT_SUMMARY_FILE), &stats, view.today, &filters)?;
    output::write_json(&out_dir.join(JSON_SUMMARY_FILE), &stats)?;
    println!(
        "(Filtered table exported to {}, summaries in {} and {})\n",
        export.display(),
        TEXT_SUMMARY_FILE,
        JSON_SUMMARY_FILE
    );
    Ok(())
}

fn run_report(args: ReportArgs) -> Result<()> {
    let config = args.session.resolve_config()?;
    let today = args.session.resolve_today();
    let input = args
        .session
        .input
        .clone()
        .context("--input (or CLAIMDESK_INPUT) is required for `report`")?;
    info!(input = %input.display(), %today, "starting report");
    let table = load_table(&input, &config, today)?;
    generate_reports(&table, &args.selection(), &config, &args.session.out_dir)
}

// Simple in-memory app state so the file is loaded and enriched once but
// reports can be generated many times in a single session.
static APP_STATE: Lazy<Mutex<AppState>> = Lazy::new(|| Mutex::new(AppState::default()));

#[derive(Default)]
struct AppState {
    table: Option<EnrichedTable>,
    selection: FilterSelection,
}

fn app_state() -> MutexGuard<'static, AppState> {
    APP_STATE.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Read one trimmed line, `None` once the input is closed.
fn read_answer<R: BufRead>(mut reader: R) -> io::Result<Option<String>> {
    let mut buf = String::new();
    if reader.read_line(&mut buf)? == 0 {
        return Ok(None);
    }
    Ok(Some(buf.trim().to_string()))
}

/// Print `label` and read one answer from stdin.
fn prompt(label: &str) -> Result<Option<String>> {
    print!("{}", label);
    io::stdout().flush()?;
    Ok(read_answer(io::stdin().lock())?)
}

/// Option [1]: load and enrich a file, replacing any previous one.
fn handle_load(
    args: &SessionArgs,
    config: &ReportConfig,
    today: NaiveDate,
) -> Result<ControlFlow<()>> {
    let default = args.input.as_ref().map(|p| p.display().to_string());
    let label = match &default {
        Some(d) => format!("Enter CSV filename [{}]: ", d),
        None => "Enter CSV filename: ".to_string(),
    };
    let Some(answer) = prompt(&label)? else {
        return Ok(ControlFlow::Break(()));
    };
    let path = match (answer.is_empty(), default) {
        (false, _) => PathBuf::from(answer),
        (true, Some(d)) => PathBuf::from(d),
        (true, None) => {
            println!("No file given.\n");
            return Ok(ControlFlow::Continue(()));
        }
    };
    match load_table(&path, config, today) {
        Ok(table) => {
            let mut state = app_state();
            state.table = Some(table);
            state.selection = FilterSelection::new();
        }
        // A failed load leaves the previous table untouched.
        Err(e) => {
            error!(error = %format!("{:#}", e), "load failed");
            eprintln!("Failed to load file: {:#}\n", e);
        }
    }
    Ok(ControlFlow::Continue(()))
}

/// Apply one answer of the filter dialog to `field`.
///
/// Blank keeps the current constraint, `*` removes it, `-` allows nothing,
/// anything else is a comma-separated list of allowed values.
fn apply_filter_answer(selection: &mut FilterSelection, field: Field, answer: &str) {
    match answer {
        "" => {}
        "*" => selection.clear(field),
        "-" => selection.set(field, Vec::<String>::new()),
        list => selection.set(field, split_list(list)),
    }
}

/// Option [2]: ask for allowed values field by field, starting from the
/// current selection.
fn handle_filters() -> Result<ControlFlow<()>> {
    let mut state = app_state();
    let Some(table) = state.table.as_ref() else {
        println!("Error: No data loaded. Please load the CSV file first (option 1).\n");
        return Ok(ControlFlow::Continue(()));
    };
    let mut selection = state.selection.clone();
    for field in [Field::Bucket, Field::State, Field::Status, Field::Alert, Field::Family] {
        let values = distinct_values(table, field);
        println!("{} values: {}", field, values.join(", "));
        let Some(answer) =
            prompt("Keep (comma-separated, blank to keep, '*' for all, '-' for none): ")?
        else {
            return Ok(ControlFlow::Break(()));
        };
        apply_filter_answer(&mut selection, field, &answer);
    }
    if let Some((lo, hi)) = delay_range(table) {
        let label = format!(
            "Maximum delay in business days [{}-{}, blank to keep, '*' for none]: ",
            lo, hi
        );
        let Some(answer) = prompt(&label)? else {
            return Ok(ControlFlow::Break(()));
        };
        match answer.as_str() {
            "" => {}
            "*" => selection.max_delay = None,
            n => match n.parse::<i64>() {
                Ok(max) => selection.max_delay = Some(max.clamp(lo, hi)),
                Err(_) => println!("Invalid number, maximum left unchanged."),
            },
        }
    }
    println!();
    state.selection = selection;
    Ok(ControlFlow::Continue(()))
}

/// Option [3]: print reports for the current selection and export them.
fn handle_generate(config: &ReportConfig, out_dir: &Path) {
    let state = app_state();
    let Some(table) = state.table.as_ref() else {
        println!("Error: No data loaded. Please load the CSV file first (option 1).\n");
        return;
    };
    println!("Generating reports...\n");
    if let Err(e) = generate_reports(table, &state.selection, config, out_dir) {
        eprintln!("Report error: {:#}\n", e);
    }
}

fn run_interactive(args: SessionArgs) -> Result<()> {
    let config = args.resolve_config()?;
    let today = args.resolve_today();
    info!(%today, "starting interactive session");
    loop {
        println!("Select an option:");
        println!("[1] Load the file");
        println!("[2] Set filters");
        println!("[3] Generate reports");
        println!("[4] Exit\n");
        let Some(choice) = prompt("Enter choice: ")? else {
            break;
        };
        let flow = match choice.as_str() {
            "1" => handle_load(&args, &config, today)?,
            "2" => handle_filters()?,
            "3" => {
                handle_generate(&config, &args.out_dir);
                ControlFlow::Continue(())
            }
            "4" => ControlFlow::Break(()),
            _ => {
                println!("Invalid choice. Please enter 1 to 4.\n");
                ControlFlow::Continue(())
            }
        };
        if flow.is_break() {
            break;
        }
    }
    // Reached through option [4] or when stdin is closed.
    println!("Exiting the program.");
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Report(args) => run_report(args),
        Command::Interactive(args) => run_interactive(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_input_ends_the_dialog() {
        assert_eq!(read_answer(&b""[..]).unwrap(), None);
    }

    #[test]
    fn answers_are_trimmed_lines() {
        let mut input = &b" 2 \n\n"[..];
        assert_eq!(read_answer(&mut input).unwrap().as_deref(), Some("2"));
        // An empty line is an answer, not the end of input.
        assert_eq!(read_answer(&mut input).unwrap().as_deref(), Some(""));
        assert_eq!(read_answer(&mut input).unwrap(), None);
    }

    #[test]
    fn filter_answers_edit_the_current_selection() {
        let mut selection = FilterSelection::new().allow(Field::Family, ["Cartes"]);
        apply_filter_answer(&mut selection, Field::Family, "");
        assert_eq!(selection.allowed[&Field::Family].len(), 1);

        apply_filter_answer(&mut selection, Field::Status, "Traitée, En cours");
        assert_eq!(selection.allowed[&Field::Status].len(), 2);

        apply_filter_answer(&mut selection, Field::Alert, "-");
        assert!(selection.allowed[&Field::Alert].is_empty());

        apply_filter_answer(&mut selection, Field::Family, "*");
        assert!(!selection.allowed.contains_key(&Field::Family));
    }
}
