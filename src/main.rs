use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use stage::crypto::KdfParams;
use stage::reminders::{InMemoryNotifier, ReminderScheduler};
use stage::tracker::DayToggle;
use stage::{
    CyclePolicy, CycleRecord, EncryptedFileStore, MemoryStore, NewCycle, RecordStore, Symptoms,
    Tracker,
};

#[derive(Parser, Debug)]
#[command(name = "stage")]
#[command(about = "Track cycles, see phases and upcoming dates", long_about = None)]
#[command(version)]
struct Cli {
    /// Encrypted data file
    #[arg(long, env = "STAGE_DATA_FILE", global = true)]
    data_file: Option<PathBuf>,

    /// Passphrase for the data file
    #[arg(long, env = "STAGE_PASSPHRASE", hide_env_values = true, global = true)]
    passphrase: Option<String>,

    /// Use a throwaway in-memory store
    #[arg(long, global = true, conflicts_with = "data_file")]
    memory: bool,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug, Clone)]
struct Ratings {
    /// Flow intensity (0-5)
    #[arg(long, default_value = "2")]
    intensity: u8,
    /// Mood (0-5)
    #[arg(long, default_value = "3")]
    mood: u8,
    /// Energy (0-5)
    #[arg(long, default_value = "3")]
    energy: u8,
    /// Pain (0-5)
    #[arg(long, default_value = "0")]
    pain: u8,
    /// Free-text notes
    #[arg(long)]
    notes: Option<String>,
}

impl Ratings {
    fn symptoms(&self) -> Symptoms {
        Symptoms {
            intensity: self.intensity,
            mood: self.mood,
            energy: self.energy,
            pain: self.pain,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Switch {
    On,
    Off,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start a new cycle, closing the open one
    Start {
        /// Start date (defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,
        #[command(flatten)]
        ratings: Ratings,
    },
    /// End the open cycle
    End {
        /// End date (defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Mark or unmark a single period day
    Toggle { date: NaiveDate },
    /// Log symptoms for the cycle starting on a date
    Symptoms {
        date: NaiveDate,
        #[command(flatten)]
        ratings: Ratings,
    },
    /// Delete a cycle record
    Delete { id: Uuid },
    /// Show or change settings
    Settings {
        #[arg(long)]
        cycle_length: Option<i64>,
        #[arg(long)]
        period_length: Option<i64>,
        #[arg(long, value_enum)]
        reminders: Option<Switch>,
        #[arg(long)]
        days_before: Option<i64>,
    },
    /// Next period and ovulation
    Predict,
    /// Cycle phase of a date
    Phase { date: NaiveDate },
    /// Phase calendar for a month
    Month { year: i32, month: u32 },
    /// Cycle statistics
    Stats,
    /// Most recent cycles
    List {
        #[arg(long, default_value = "5")]
        limit: usize,
    },
    /// Reminders that would be scheduled now
    Reminders,
    /// Dump all records as JSON
    Export,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("STAGE_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print<T: Serialize>(json: bool, value: &T, text: impl FnOnce() -> String) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", text());
    }
    Ok(())
}

fn describe(cycle: &CycleRecord) -> String {
    let end = cycle
        .end_date
        .map(|d| d.to_string())
        .unwrap_or_else(|| "ongoing".into());
    format!("{}  {} .. {}", cycle.id, cycle.start_date, end)
}

fn or_dash<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".into())
}

async fn run<S: RecordStore>(
    mut tracker: Tracker<S>,
    notifier: Arc<InMemoryNotifier>,
    command: Command,
    json: bool,
) -> Result<()> {
    let show_reminders = matches!(command, Command::Reminders);

    match command {
        Command::Start { date, ratings } => {
            let cycle = tracker.start_cycle(NewCycle {
                start_date: date,
                symptoms: ratings.symptoms(),
                notes: ratings.notes,
            })?;
            print(json, &cycle, || format!("started {}", describe(&cycle)))?;
        }
        Command::End { date } => {
            let cycle = tracker.end_current_cycle(date)?;
            print(json, &cycle, || format!("ended {}", describe(&cycle)))?;
        }
        Command::Toggle { date } => match tracker.toggle_day(date)? {
            DayToggle::Marked(cycle) => {
                print(json, &cycle, || format!("marked {}", describe(&cycle)))?
            }
            DayToggle::Cleared(ids) => {
                print(json, &ids, || format!("cleared {} record(s) on {}", ids.len(), date))?
            }
        },
        Command::Symptoms { date, ratings } => {
            let cycle = tracker.log_symptoms(date, ratings.symptoms(), ratings.notes)?;
            print(json, &cycle, || format!("updated {}", describe(&cycle)))?;
        }
        Command::Delete { id } => {
            tracker.delete_cycle(id)?;
            print(json, &id, || format!("deleted {id}"))?;
        }
        Command::Settings {
            cycle_length,
            period_length,
            reminders,
            days_before,
        } => {
            if cycle_length.is_some() || period_length.is_some() {
                let current = tracker.settings().clone();
                tracker.update_settings(
                    cycle_length.unwrap_or(current.average_cycle_length),
                    period_length.unwrap_or(current.average_period_length),
                )?;
            }
            if reminders.is_some() || days_before.is_some() {
                let enabled = match reminders {
                    Some(Switch::On) => true,
                    Some(Switch::Off) => false,
                    None => tracker.settings().reminders_enabled,
                };
                tracker.set_reminders(enabled, days_before)?;
            }
            let settings = tracker.settings();
            print(json, settings, || {
                format!(
                    "cycle length:  {} days\nperiod length: {} days\nreminders:     {}",
                    settings.average_cycle_length,
                    settings.average_period_length,
                    if settings.reminders_enabled { "on" } else { "off" }
                )
            })?;
        }
        Command::Predict => {
            let predictions = tracker.predictions();
            print(json, &predictions, || {
                format!(
                    "next period:    {}\nnext ovulation: {}",
                    or_dash(predictions.next_period),
                    or_dash(predictions.next_ovulation)
                )
            })?;
        }
        Command::Phase { date } => {
            let phase = tracker.classify(date);
            print(json, &phase, || format!("{date}: {phase}"))?;
        }
        Command::Month { year, month } => {
            let overview = tracker
                .month(year, month)
                .with_context(|| format!("invalid month {year}-{month}"))?;
            print(json, &overview, || {
                overview
                    .days
                    .iter()
                    .map(|d| {
                        let mut line = format!("{}  {:<10}", d.date, d.phase.as_str());
                        if d.marked {
                            line.push_str("  marked");
                        }
                        if d.predicted_period {
                            line.push_str("  expected period");
                        }
                        if d.predicted_ovulation {
                            line.push_str("  expected ovulation");
                        }
                        line
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })?;
        }
        Command::Stats => {
            let stats = tracker.stats();
            print(json, &stats, || {
                format!(
                    "cycles:         {}\naverage cycle:  {} days\naverage period: {} days\nshortest:       {}\nlongest:        {}\nlast start:     {}",
                    stats.total_cycles,
                    stats.average_cycle_length,
                    stats.average_period_length,
                    or_dash(stats.shortest_cycle),
                    or_dash(stats.longest_cycle),
                    or_dash(stats.last_period_start),
                )
            })?;
        }
        Command::List { limit } => {
            let cycles = tracker.recent_cycles(limit);
            print(json, &cycles, || {
                if cycles.is_empty() {
                    "no records".to_string()
                } else {
                    cycles.iter().map(describe).collect::<Vec<_>>().join("\n")
                }
            })?;
        }
        Command::Reminders => {
            tracker.reschedule_reminders();
        }
        Command::Export => {
            println!("{}", tracker.export_json()?);
        }
    }

    if let Some(dispatch) = tracker.take_pending_dispatch() {
        let report = dispatch.await.context("reminder dispatch panicked")?;
        tracing::debug!(?report, "reminder dispatch finished");
    }

    if show_reminders {
        let pending = notifier.pending();
        print(json, &pending, || {
            if pending.is_empty() {
                "no upcoming reminders".to_string()
            } else {
                pending
                    .iter()
                    .map(|r| format!("{}  {:<24} {}", r.fire_at, r.id.as_str(), r.body))
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        })?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let policy = CyclePolicy::default();

    let notifier = Arc::new(InMemoryNotifier::new());
    let scheduler = ReminderScheduler::new(notifier.clone());

    if cli.memory {
        let tracker = Tracker::new(MemoryStore::with_policy(policy.clone()), policy)?
            .with_scheduler(scheduler);
        return run(tracker, notifier, cli.command, cli.json).await;
    }

    let path = match cli.data_file {
        Some(path) => path,
        None => EncryptedFileStore::default_path()?,
    };
    let passphrase = cli
        .passphrase
        .context("a passphrase is required (--passphrase or STAGE_PASSPHRASE)")?;
    let store = EncryptedFileStore::open(&path, &passphrase, KdfParams::default(), policy.clone())
        .with_context(|| format!("failed to open {}", path.display()))?;

    let tracker = Tracker::new(store, policy)?.with_scheduler(scheduler);
    run(tracker, notifier, cli.command, cli.json).await
}
