//! termfetch CLI: pull historical data from the local data service and browse
//! the shared data library.
//!
//! Commands:
//! - `fetch`: one batched historical request, printed or written as CSV
//! - `library locate`: find a file in the shared data library
//! - `library show`: load a library CSV and print its first rows
//!
//! Logging goes to stderr; `RUST_LOG` overrides the default filter.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use termfetch_core::service::{FillMethod, NonTradingDayFill};
use termfetch_core::{
    DataLibrary, DateRange, FetchError, FetchOptions, FetchReport, FetcherConfig,
    HistoricalFetcher, HistoricalRequest, Periodicity, RequestOptions,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "termfetch",
    about = "termfetch: historical market data from the local data service"
)]
struct Cli {
    /// Log debug output from termfetch crates.
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch historical data for securities and fields over a date range.
    Fetch(FetchArgs),
    /// Shared data library commands.
    Library {
        #[command(subcommand)]
        action: LibraryAction,
    },
}

#[derive(clap::Args)]
struct FetchArgs {
    /// Security identifiers (repeat or comma-separate), e.g. "AAPL US Equity".
    #[arg(short, long = "security", required = true, value_delimiter = ',')]
    securities: Vec<String>,

    /// Field mnemonics (repeat or comma-separate), e.g. PX_LAST.
    #[arg(short, long = "field", required = true, value_delimiter = ',')]
    fields: Vec<String>,

    /// Start date (YYYY-MM-DD), inclusive.
    #[arg(long)]
    start: String,

    /// End date (YYYY-MM-DD), inclusive. Defaults to today.
    #[arg(long)]
    end: Option<String>,

    /// daily, weekly, monthly, quarterly, semi-annually or yearly.
    #[arg(long, default_value = "daily")]
    periodicity: String,

    /// TOML config file. Flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    /// Upper bound on each wait for the next event, in milliseconds.
    #[arg(long)]
    poll_timeout_ms: Option<u64>,

    /// Give up if the response has not completed after this many seconds.
    #[arg(long)]
    deadline_secs: Option<u64>,

    /// Fail instead of printing an empty table when no data comes back.
    #[arg(long, default_value_t = false)]
    empty_is_error: bool,

    /// How non-trading days are filled.
    #[arg(long, value_enum)]
    fill: Option<FillArg>,

    /// Value used on filled days.
    #[arg(long, value_enum)]
    fill_method: Option<FillMethodArg>,

    /// Three-letter currency for price fields.
    #[arg(long)]
    currency: Option<String>,

    /// Cap on rows per security.
    #[arg(long)]
    max_points: Option<u32>,

    /// Ask for split-adjusted prices.
    #[arg(long, default_value_t = false)]
    adjust_split: bool,

    /// Ask for prices adjusted for regular cash dividends.
    #[arg(long, default_value_t = false)]
    adjust_normal: bool,

    /// Ask for prices adjusted for special distributions.
    #[arg(long, default_value_t = false)]
    adjust_abnormal: bool,

    /// Write CSV here instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum FillArg {
    Weekdays,
    AllDays,
    ActiveDays,
}

impl From<FillArg> for NonTradingDayFill {
    fn from(arg: FillArg) -> Self {
        match arg {
            FillArg::Weekdays => NonTradingDayFill::NonTradingWeekdays,
            FillArg::AllDays => NonTradingDayFill::AllCalendarDays,
            FillArg::ActiveDays => NonTradingDayFill::ActiveDaysOnly,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum FillMethodArg {
    Previous,
    Nil,
}

impl From<FillMethodArg> for FillMethod {
    fn from(arg: FillMethodArg) -> Self {
        match arg {
            FillMethodArg::Previous => FillMethod::PreviousValue,
            FillMethodArg::Nil => FillMethod::NilValue,
        }
    }
}

#[derive(Subcommand)]
enum LibraryAction {
    /// Print the path a library file resolves to.
    Locate {
        /// Root of the shared folder.
        #[arg(long)]
        root: PathBuf,
        /// Team folder, e.g. 02_asset_pricing_factors.
        #[arg(long)]
        team: String,
        /// File name.
        #[arg(long)]
        file: String,
    },
    /// Load a library CSV and print its first rows.
    Show {
        #[arg(long)]
        root: PathBuf,
        #[arg(long)]
        team: String,
        #[arg(long)]
        file: String,
        /// Column holding the date index.
        #[arg(long, default_value = "Date")]
        date_col: String,
        /// Number of rows to print.
        #[arg(long, default_value_t = 5)]
        head: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Fetch(args) => run_fetch(args),
        Commands::Library { action } => match action {
            LibraryAction::Locate { root, team, file } => {
                let path = DataLibrary::new(root).locate(&team, &file)?;
                println!("{}", path.display());
                Ok(())
            }
            LibraryAction::Show {
                root,
                team,
                file,
                date_col,
                head,
            } => run_library_show(root, &team, &file, &date_col, head),
        },
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "termfetch=debug,termfetch_core=debug"
    } else {
        "termfetch=info,termfetch_core=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn parse_date(raw: &str, flag: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("--{flag} must be YYYY-MM-DD, got '{raw}'"))
}

fn build_config(args: &FetchArgs) -> Result<FetcherConfig> {
    let mut config = match &args.config {
        Some(path) => FetcherConfig::from_file(path)?,
        None => FetcherConfig::default(),
    };
    if let Some(host) = &args.host {
        config.host = host.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(ms) = args.poll_timeout_ms {
        config.poll_timeout_ms = ms;
    }
    config.validate()?;
    Ok(config)
}

fn run_fetch(args: FetchArgs) -> Result<()> {
    let start = parse_date(&args.start, "start")?;
    let end = match args.end.as_deref() {
        Some(raw) => parse_date(raw, "end")?,
        None => chrono::Local::now().date_naive(),
    };
    let periodicity: Periodicity = args.periodicity.parse()?;

    let range = DateRange::new(start, end)?;
    let request = HistoricalRequest::from_strs(&args.securities, &args.fields, range)?
        .with_periodicity(periodicity)
        .with_options(RequestOptions {
            non_trading_day_fill: args.fill.map(Into::into),
            fill_method: args.fill_method.map(Into::into),
            currency: args.currency.clone(),
            max_data_points: args.max_points,
            adjustment_split: args.adjust_split.then_some(true),
            adjustment_normal: args.adjust_normal.then_some(true),
            adjustment_abnormal: args.adjust_abnormal.then_some(true),
        });

    let config = build_config(&args)?;
    let options = FetchOptions {
        deadline: args.deadline_secs.map(Duration::from_secs),
        empty_is_error: args.empty_is_error,
    };

    let fetcher = HistoricalFetcher::tcp(config);
    let report = match fetcher.fetch_with(&request, &options) {
        Ok(report) => report,
        Err(e) if e.needs_environment_fix() => {
            return Err(e).context(
                "check that the terminal is running, logged in, and entitled to historical data",
            );
        }
        Err(FetchError::EmptyResult) => bail!("no data returned for the request"),
        Err(e) => return Err(e.into()),
    };

    report_skipped(&report);

    match &args.output {
        Some(path) => {
            report
                .table
                .write_csv(path)
                .with_context(|| format!("writing {}", path.display()))?;
            info!(
                rows = report.table.len(),
                columns = report.table.column_count(),
                path = %path.display(),
                "wrote table"
            );
        }
        None => print!("{}", report.table.to_csv_string()?),
    }
    Ok(())
}

/// Log everything the service rejected or the fetch had to skip.
fn report_skipped(report: &FetchReport) {
    if !report.is_clean() {
        warn!(
            securities_rejected = report.security_errors.len(),
            fields_rejected = report.field_exceptions.len(),
            malformed = report.malformed.len(),
            "fetch completed with skipped items"
        );
    }
    for err in &report.security_errors {
        warn!(security = %err.security, category = %err.category, "rejected: {}", err.message);
    }
    for ex in &report.field_exceptions {
        warn!(security = %ex.security, field = %ex.field, "rejected: {}", ex.message);
    }
}

fn run_library_show(root: PathBuf, team: &str, file: &str, date_col: &str, head: usize) -> Result<()> {
    let frame = DataLibrary::new(root).load(team, file, date_col)?;
    println!("{}", frame.path.display());
    println!("{} rows, columns: {}", frame.len(), frame.columns.join(", "));
    for (date, row) in frame.dates.iter().zip(&frame.values).take(head) {
        let cells: Vec<String> = row
            .iter()
            .map(|v| v.map(|x| x.to_string()).unwrap_or_else(|| "-".to_string()))
            .collect();
        println!("{date}  {}", cells.join("  "));
    }
    Ok(())
}
