//! Keiba CLI - Command-line interface for horse racing odds

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use dialoguer::{theme::ColorfulTheme, Input, Select};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};

use keiba::config::{init_tracing, Config};
use keiba::core::deadline::DeadlineStatus;
use keiba::core::resolver::SourceHint;
use keiba::data::cache::OddsCache;
use keiba::data::parser::decode;
use keiba::data::record::{OddsPayload, OddsRecord, WinPlaceOdds};
use keiba::feed::{DumpFileFeed, RawRecord};
use keiba::models::{venue_name, RaceId};
use keiba::providers::RecordImport;
use keiba::service::{DataService, OddsResponse};

/// Combinations shown per bet type
const TOP_COMBINATIONS: usize = 10;

#[derive(Parser)]
#[command(name = "keiba")]
#[command(author, version, about = "Horse racing odds CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Run in interactive mode
    #[arg(short, long)]
    interactive: bool,

    /// Cache directory (overrides HISTORICAL_CACHE_DIR)
    #[arg(long)]
    cache_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List races for a date
    Races {
        /// Race date (YYYYMMDD format)
        #[arg(short, long)]
        date: String,

        /// Data source: auto, historical, realtime or mock
        #[arg(short, long, default_value = "auto")]
        source: SourceHint,
    },

    /// Show race detail
    Race {
        /// 16-digit race id
        race_id: String,

        #[arg(short, long, default_value = "auto")]
        source: SourceHint,
    },

    /// Show odds for a race
    Odds {
        /// 16-digit race id
        race_id: String,

        /// Replay odds this many seconds before the deadline
        #[arg(short, long)]
        offset: Option<u32>,

        #[arg(short, long, default_value = "auto")]
        source: SourceHint,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// Decode one raw record
    Decode {
        /// Raw record text (tag first)
        record: Option<String>,

        /// Read the first record of a dump file instead
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Import a record dump into the cache
    Import {
        /// Newline-separated record dump
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Inspect or maintain the cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Cache statistics
    Stats,
    /// List cached races
    List {
        /// Only races on this date (YYYYMMDD)
        #[arg(short, long)]
        date: Option<String>,
    },
    /// Delete one cached race
    Delete { race_id: String },
    /// Remove entries older than the retention window
    Evict {
        /// Retention in days (default: CACHE_RETENTION_DAYS)
        #[arg(long)]
        days: Option<u32>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::from_env().context("Failed to load configuration")?;
    if let Some(dir) = cli.cache_dir {
        config.cache_dir = dir;
    }
    init_tracing(&config.log_level, config.log_format);

    println!("{}", "Keiba CLI v0.1.0".cyan().bold());
    println!();

    if cli.interactive {
        let service = DataService::from_config(&config).context("Failed to start data service")?;
        run_interactive(&service)?;
        service.close();
    } else if let Some(command) = cli.command {
        match command {
            Commands::Races { date, source } => {
                let service = DataService::from_config(&config)?;
                list_races(&service, &date, source)?;
            }
            Commands::Race { race_id, source } => {
                let service = DataService::from_config(&config)?;
                show_race(&service, &race_id, source)?;
            }
            Commands::Odds {
                race_id,
                offset,
                source,
                json,
            } => {
                let service = DataService::from_config(&config)?;
                show_odds(&service, &race_id, offset, source, json)?;
            }
            Commands::Decode { record, file } => {
                run_decode(record, file.as_deref())?;
            }
            Commands::Import { file } => {
                run_import(&config.cache_dir, &file)?;
            }
            Commands::Cache { action } => {
                run_cache(&config, action)?;
            }
        }
    } else {
        println!("Use --help for usage information or --interactive for interactive mode.");
    }

    Ok(())
}

fn list_races(service: &DataService, date: &str, source: SourceHint) -> Result<()> {
    let races = service
        .get_race_info(date, source)
        .with_context(|| format!("Failed to list races for {}", date))?;

    if races.is_empty() {
        println!("{}", format!("No races found for {}.", date).red());
        return Ok(());
    }

    println!("{} {}", "Races on".green(), format_date(date));
    println!(
        "{:<18} {:<6} {:>3} {:>6} {:<20}",
        "Race ID", "Venue", "R", "Post", "Name"
    );
    println!("{}", "-".repeat(60));
    for race in &races {
        println!(
            "{:<18} {:<6} {:>3} {:>6} {:<20}",
            race.race_id,
            race.info.venue.as_deref().unwrap_or("-"),
            race.info
                .race_number
                .map(|n| n.to_string())
                .unwrap_or_else(|| "-".to_string()),
            race.info.posted_time.as_deref().unwrap_or("--:--"),
            race.info.race_name.as_deref().unwrap_or(""),
        );
    }
    println!();
    println!("{} races", races.len());
    Ok(())
}

fn show_race(service: &DataService, race_id: &str, source: SourceHint) -> Result<()> {
    let Some(detail) = service.get_race_detail(race_id, source)? else {
        println!("{}", format!("Race {} not found.", race_id).red());
        return Ok(());
    };

    let id = RaceId::parse(&detail.race_id)?;
    println!(
        "{}: {} / {} / {}R",
        "Race".green(),
        format_date(id.date_key()),
        venue_name(id.venue_code()),
        id.race_number()
    );
    if let Some(name) = &detail.race_info.race_name {
        println!("  Name:        {}", name.bold());
    }
    if let Some(posted) = &detail.race_info.posted_time {
        println!("  Post time:   {}", posted);
    }
    if let Some(distance) = detail.race_info.distance {
        println!(
            "  Distance:    {}m {}",
            distance,
            detail.race_info.track_type.as_deref().unwrap_or("")
        );
    }
    println!("  Odds records: {}", detail.odds_count);
    println!("  Source:      {}", detail.data_source);
    if let Some(cached_at) = detail.cached_at {
        println!("  Cached at:   {}", cached_at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    Ok(())
}

fn show_odds(
    service: &DataService,
    race_id: &str,
    offset: Option<u32>,
    source: SourceHint,
    json: bool,
) -> Result<()> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.set_message(format!("Fetching odds for {}...", race_id));
    let response = service.get_realtime_odds(race_id, offset, source);
    pb.finish_and_clear();
    let response = response.with_context(|| format!("Failed to fetch odds for {}", race_id))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    print_deadline(&response);
    println!();
    for record in &response.odds {
        print_record(record);
        println!();
    }
    Ok(())
}

fn print_deadline(response: &OddsResponse) {
    println!(
        "{}: {} ({})",
        "Odds".green(),
        response.race_id,
        response.data_source
    );
    if let Some(name) = &response.race_info.race_name {
        println!("  {}", name.bold());
    }

    let info = &response.deadline_info;
    let status = match info.status {
        DeadlineStatus::Active => "active".green(),
        DeadlineStatus::Past => "past".red(),
        DeadlineStatus::Unknown => "unknown".yellow(),
    };
    match info.deadline {
        Some(deadline) => println!("  Deadline: {} [{}]", deadline.format("%H:%M:%S"), status),
        None => println!(
            "  Deadline: {} ({})",
            status,
            info.error.as_deref().unwrap_or("")
        ),
    }
    if response.posted_time_assumed {
        println!("  {}", "Post time unknown; assumed 10:00".yellow());
    }
    if let Some(time_status) = &response.time_status {
        println!("  Status:   {}", time_status);
    }
    if let Some(note) = &response.past_data_note {
        println!("  {}", note.yellow());
    }
}

fn print_win_place(odds: &WinPlaceOdds) {
    println!("{:>4} {:>8} {:>14}", "馬番", "単勝", "複勝");
    println!("{}", "-".repeat(30));
    for win in &odds.win {
        let place = odds
            .place
            .iter()
            .find(|p| p.horse == win.horse)
            .map(|p| format!("{:.1}-{:.1}", p.odds_min, p.odds_max))
            .unwrap_or_else(|| "-".to_string());
        println!("{:>4} {:>8.1} {:>14}", win.horse, win.odds, place);
    }
}

fn print_top<K: std::fmt::Display>(mut rows: Vec<(K, f64)>) {
    let total = rows.len();
    rows.sort_by(|a, b| a.1.total_cmp(&b.1));
    for (key, odds) in rows.iter().take(TOP_COMBINATIONS) {
        println!("  {:<10} {:>8.1}", key, odds);
    }
    if total > TOP_COMBINATIONS {
        println!("  ... {} more", total - TOP_COMBINATIONS);
    }
}

fn print_record(record: &OddsRecord) {
    let mut header = format!("{} ({})", record.tag().label(), record.tag());
    if let Some(sim) = &record.simulation {
        header.push_str(&format!(" simulated ±{:.0}%", sim.variance_applied * 100.0));
    }
    if let Some(observed) = record.observed_at() {
        header.push_str(&format!(" observed {}", observed));
    }
    println!("{}", header.yellow().bold());

    match &record.payload {
        OddsPayload::WinPlace(odds) => print_win_place(odds),
        OddsPayload::TimeSeries(ts) => print_win_place(&ts.odds),
        OddsPayload::BracketQuinella { combinations }
        | OddsPayload::Quinella { combinations } => print_top(
            combinations
                .iter()
                .map(|c| (format!("{}-{}", c.first, c.second), c.odds))
                .collect(),
        ),
        OddsPayload::Exacta { combinations } => print_top(
            combinations
                .iter()
                .map(|c| (format!("{}→{}", c.first, c.second), c.odds))
                .collect(),
        ),
        OddsPayload::Wide { combinations } => print_top(
            combinations
                .iter()
                .map(|c| (format!("{}-{}", c.first, c.second), c.odds_min))
                .collect(),
        ),
        OddsPayload::Trio(trio) => print_top(
            trio.combinations
                .iter()
                .map(|(key, odds)| (key.clone(), *odds))
                .collect(),
        ),
    }

    if let Some(issue) = &record.decode_issue {
        println!(
            "  {}",
            format!("{} entries skipped", issue.skipped_entries).yellow()
        );
    }
}

fn run_decode(record: Option<String>, file: Option<&Path>) -> Result<()> {
    let raw = match (record, file) {
        (Some(record), _) => RawRecord::from_line(record.as_bytes()),
        (None, Some(path)) => DumpFileFeed::open(path)?.records().first().cloned(),
        (None, None) => bail!("Pass a record or --file"),
    };
    let Some(raw) = raw else {
        bail!("No record to decode");
    };

    match decode(&raw.tag, &raw.bytes) {
        Ok(record) => {
            println!("{}: race {}", "Decoded".green(), record.race_id);
            print_record(&record);
        }
        Err(e) => {
            println!("{}: {}", "Decode error".red(), e);
            println!("  preview: {:?}", e.preview());
        }
    }
    Ok(())
}

fn run_import(cache_dir: &Path, file: &Path) -> Result<()> {
    let feed = DumpFileFeed::open(file)
        .with_context(|| format!("Failed to read dump {:?}", file))?;
    let cache = OddsCache::open(cache_dir)
        .with_context(|| format!("Failed to open cache at {:?}", cache_dir))?;

    let import = RecordImport::from_records(feed.records());
    let errors = import.decode_errors.len();
    println!(
        "{} {} races ({} odds records) from {:?}",
        "Importing".green(),
        import.race_count(),
        import.record_count(),
        file
    );

    let pb = ProgressBar::new(import.race_count() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{bar:40.cyan/blue} {pos}/{len} {msg}")?
            .progress_chars("=>-"),
    );
    let summary = import.commit(&cache, |race_id| {
        pb.set_message(race_id.to_string());
        pb.inc(1);
    })?;
    pb.finish_and_clear();

    println!("Saved {} races to {:?}", summary.saved, cache.root());
    if summary.dropped_snapshot_records > 0 {
        println!(
            "{}",
            format!(
                "{} snapshot records dropped for races with a timeline",
                summary.dropped_snapshot_records
            )
            .yellow()
        );
    }
    if errors > 0 {
        println!("{}", format!("{} records could not be decoded", errors).yellow());
    }
    Ok(())
}

fn run_cache(config: &Config, action: CacheAction) -> Result<()> {
    let cache = OddsCache::open(&config.cache_dir)
        .with_context(|| format!("Failed to open cache at {:?}", config.cache_dir))?;

    match action {
        CacheAction::Stats => {
            let stats = cache.stats();
            println!("{}", "Cache statistics".yellow().bold());
            println!("  Races:    {}", stats.total_races);
            println!("  Dates:    {}", stats.total_dates);
            println!("  Location: {}", stats.location);
            println!("  Index:    {}", stats.index_file);
        }
        CacheAction::List { date } => {
            let race_ids = cache.list_by_date(date.as_deref());
            for race_id in &race_ids {
                let count = RaceId::parse(race_id)
                    .ok()
                    .and_then(|id| cache.index_entry(&id))
                    .map(|entry| entry.record_count())
                    .unwrap_or(0);
                println!("{}  {:>4} records", race_id, count);
            }
            println!("{} races", race_ids.len());
        }
        CacheAction::Delete { race_id } => {
            let id = RaceId::parse(&race_id)?;
            if cache.delete(&id)? {
                println!("{} {}", "Deleted".green(), race_id);
            } else {
                println!("{}", format!("Race {} is not cached.", race_id).red());
            }
        }
        CacheAction::Evict { days } => {
            let days = days.unwrap_or(config.cache_retention_days);
            let removed = cache.evict_older_than(days)?;
            println!(
                "{} {} entries older than {} days",
                "Evicted".green(),
                removed,
                days
            );
        }
    }
    Ok(())
}

fn run_interactive(service: &DataService) -> Result<()> {
    println!("{}", "Interactive mode".green().bold());
    println!("Choose Quit to exit.\n");

    let theme = ColorfulTheme::default();
    let sources = ["auto", "historical", "realtime", "mock"];

    loop {
        let options = vec!["List races", "Race detail", "Odds", "Status", "Quit"];

        let selection = Select::with_theme(&theme)
            .with_prompt("What would you like to do?")
            .items(&options)
            .default(0)
            .interact()?;

        if selection == 4 {
            println!("Goodbye!");
            break;
        }

        if selection == 3 {
            println!("{}", serde_json::to_string_pretty(&service.status())?);
            println!();
            continue;
        }

        let source: SourceHint = sources[Select::with_theme(&theme)
            .with_prompt("Data source")
            .items(&sources)
            .default(0)
            .interact()?]
        .parse()?;

        // Errors are reported and the loop continues
        let result = match selection {
            0 => {
                let date: String = Input::with_theme(&theme)
                    .with_prompt("Date (YYYYMMDD)")
                    .interact_text()?;
                println!();
                list_races(service, &date, source)
            }
            1 => {
                let race_id: String = Input::with_theme(&theme)
                    .with_prompt("Race ID (16 digits)")
                    .interact_text()?;
                println!();
                show_race(service, &race_id, source)
            }
            _ => {
                let race_id: String = Input::with_theme(&theme)
                    .with_prompt("Race ID (16 digits)")
                    .interact_text()?;
                let offset: String = Input::with_theme(&theme)
                    .with_prompt("Seconds before deadline (blank for latest)")
                    .allow_empty(true)
                    .validate_with(|input: &String| parse_offset(input).map(|_| ()))
                    .interact_text()?;
                println!();
                parse_offset(&offset)
                    .map_err(anyhow::Error::msg)
                    .and_then(|offset| show_odds(service, &race_id, offset, source, false))
            }
        };
        if let Err(e) = result {
            println!("{}: {:#}", "Error".red(), e);
        }
        println!();
    }

    Ok(())
}

/// Blank means latest odds; any number, including 0, is a replay offset
fn parse_offset(input: &str) -> Result<Option<u32>, String> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(None);
    }
    input
        .parse()
        .map(Some)
        .map_err(|_| format!("{:?} is not a number of seconds", input))
}

/// Format YYYYMMDD as YYYY-MM-DD
fn format_date(date: &str) -> String {
    if date.len() != 8 || !date.is_ascii() {
        return date.to_string();
    }
    format!("{}-{}-{}", &date[..4], &date[4..6], &date[6..])
}
