use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tally::config::Config;
use tally::counters::{
    bucket_for, Aggregator, Amount, CounterFamily, CounterKey, CounterTables, DimensionFilter,
    Dimensions, EventRecorder, Granularity, TimeWindow, TrackedEvent,
};
use tally::storage;

#[derive(Parser)]
#[command(name = "tally-admin")]
#[command(about = "Tally counter store management CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create every counter table
    Init,
    /// Record an event by hand
    Record {
        #[command(subcommand)]
        event: RecordCommand,
    },
    /// Count events for a goal and/or variant
    Count {
        #[command(flatten)]
        query: QueryArgs,
    },
    /// Sum conversion values for a goal and/or variant
    TotalValue {
        #[command(flatten)]
        query: QueryArgs,
    },
    /// Show the counter row holding a timestamp at one granularity
    Inspect {
        /// Counter family (conversions, impressions, variant-conversions)
        family: CounterFamily,
        /// Granularity (all, week, day, hour or seconds)
        granularity: Granularity,
        #[arg(long)]
        goal: Option<i64>,
        #[arg(long)]
        variant: Option<i64>,
        /// Unix seconds or RFC 3339; defaults to now
        #[arg(long, value_parser = parse_timestamp)]
        timestamp: Option<i64>,
    },
}

#[derive(Subcommand)]
enum RecordCommand {
    /// Goal conversion
    Conversion {
        goal_id: i64,
        #[arg(long, value_parser = parse_timestamp)]
        timestamp: Option<i64>,
        #[arg(long)]
        value: Option<Amount>,
    },
    /// Variant impression
    Impression {
        variant_id: i64,
        #[arg(long, value_parser = parse_timestamp)]
        timestamp: Option<i64>,
    },
    /// Goal conversion attributed to a variant
    VariantConversion {
        variant_id: i64,
        goal_id: i64,
        #[arg(long, value_parser = parse_timestamp)]
        timestamp: Option<i64>,
        #[arg(long)]
        value: Option<Amount>,
    },
}

#[derive(clap::Args)]
struct QueryArgs {
    #[arg(long)]
    goal: Option<i64>,
    #[arg(long)]
    variant: Option<i64>,
    #[arg(long, value_parser = parse_timestamp)]
    start: Option<i64>,
    #[arg(long, value_parser = parse_timestamp)]
    end: Option<i64>,
}

impl QueryArgs {
    fn filter(&self) -> DimensionFilter {
        DimensionFilter {
            goal_id: self.goal,
            variant_id: self.variant,
        }
    }

    fn window(&self) -> TimeWindow {
        TimeWindow {
            start: self.start,
            end: self.end,
        }
    }
}

/// Accept Unix seconds or an RFC 3339 date-time
fn parse_timestamp(s: &str) -> Result<i64, String> {
    if let Ok(seconds) = s.parse::<i64>() {
        return Ok(seconds);
    }
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.timestamp())
        .map_err(|e| format!("expected Unix seconds or RFC 3339 timestamp: {e}"))
}

fn format_bucket(granularity: Granularity, bucket_start: i64) -> String {
    if granularity == Granularity::All {
        return "all time".to_string();
    }
    chrono::DateTime::from_timestamp(bucket_start, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| bucket_start.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let tables = Arc::new(CounterTables::new());
    let store = storage::connect(&config.database, Arc::clone(&tables)).await?;

    // Ensure counter tables exist
    store.init().await?;

    let now = chrono::Utc::now().timestamp();

    match cli.command {
        Commands::Init => {
            println!("✓ Initialized {} counter tables", tables.len());
        }
        Commands::Record { event } => {
            let event = match event {
                RecordCommand::Conversion {
                    goal_id,
                    timestamp,
                    value,
                } => TrackedEvent::Conversion {
                    goal_id,
                    timestamp: timestamp.unwrap_or(now),
                    value,
                },
                RecordCommand::Impression {
                    variant_id,
                    timestamp,
                } => TrackedEvent::Impression {
                    variant_id,
                    timestamp: timestamp.unwrap_or(now),
                },
                RecordCommand::VariantConversion {
                    variant_id,
                    goal_id,
                    timestamp,
                    value,
                } => TrackedEvent::VariantConversion {
                    variant_id,
                    goal_id,
                    timestamp: timestamp.unwrap_or(now),
                    value,
                },
            };

            let recorder = EventRecorder::new(store, tables);
            let applied = recorder
                .record(event)
                .await?
                .into_result()
                .context("event was not recorded at every granularity")?;

            let names: Vec<String> = applied.iter().map(ToString::to_string).collect();
            println!("✓ Recorded event at granularities: {}", names.join(", "));
        }
        Commands::Count { query } => {
            let aggregator = Aggregator::new(store, tables);
            let count = aggregator.count(&query.filter(), &query.window()).await?;
            println!("{}", count);
        }
        Commands::TotalValue { query } => {
            let aggregator = Aggregator::new(store, tables);
            let total = aggregator
                .total_value(&query.filter(), &query.window())
                .await?;
            println!("{}", total);
        }
        Commands::Inspect {
            family,
            granularity,
            goal,
            variant,
            timestamp,
        } => {
            let dimensions = Dimensions::from_ids(goal, variant)?;
            if dimensions.family() != family {
                anyhow::bail!(
                    "{} counters are keyed by {}",
                    family,
                    family.key_columns().join(" and ")
                );
            }

            let bucket_start = bucket_for(granularity, timestamp.unwrap_or(now))?;
            let table = tables.get(family, granularity);
            let row = store
                .get(table, &CounterKey::new(dimensions, bucket_start))
                .await?;

            println!("{:<12} {}", "Table", table.name);
            println!("{:<12} {}", "Bucket", format_bucket(granularity, bucket_start));
            match row {
                Some(row) => {
                    println!("{:<12} {}", "Count", row.count);
                    if family.has_value() {
                        let value = row
                            .value
                            .map(|v| v.to_string())
                            .unwrap_or_else(|| "NULL".to_string());
                        println!("{:<12} {}", "Value", value);
                    }
                }
                None => println!("No counter row for this key."),
            }
        }
    }

    Ok(())
}
