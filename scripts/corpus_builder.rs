//! Deterministic shard corpus builder.
//!
//! Emits `Shard-<k>-<YYYYMMDD>-<HH>.csv` extracts for every shard and hour in
//! the requested window so the replay simulator can be exercised end to end.
//! Rows are derived from the shard/hour/row indices, so reruns produce
//! byte-identical files.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{ensure, Context, Result};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use clap::Parser;
use ingestion_corpus::NamingTemplate;
use serde::Serialize;

const HEADER: &str = "OrderID,ProductID,ProductName,Amount,Price,Discount";

const PRODUCTS: &[(&str, u32)] = &[
    ("Espresso", 45_000),
    ("Cappuccino", 49_000),
    ("Latte", 45_000),
    ("Americano", 39_000),
    ("Croissant", 29_000),
    ("Sandwich", 35_000),
    ("Cookie", 15_000),
];

const DISCOUNTS: &[u32] = &[0, 0, 0, 5, 10];

#[derive(Debug, Parser)]
#[command(author, version, about = "Deterministic shard corpus builder")]
struct Args {
    /// Directory receiving the generated extracts.
    #[arg(long, value_name = "DIR")]
    output_dir: PathBuf,

    /// Number of shards per hour.
    #[arg(long, default_value_t = 4)]
    shards: u32,

    /// First day of the corpus (YYYY-MM-DD).
    #[arg(long, default_value = "2021-01-01")]
    start_date: NaiveDate,

    /// Number of hourly ticks to emit.
    #[arg(long, default_value_t = 24)]
    hours: u32,

    /// Data rows per extract.
    #[arg(long, default_value_t = 5)]
    rows: u32,
}

#[derive(Serialize)]
struct CorpusIndex {
    version: u32,
    shards: u32,
    hours: u32,
    rows_per_file: u32,
    first_tick: String,
    last_tick: String,
    files: u64,
}

fn run(args: Args) -> Result<()> {
    ensure!(args.shards > 0, "--shards must be at least 1");
    ensure!(args.hours > 0, "--hours must be at least 1");
    fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("creating {}", args.output_dir.display()))?;

    let naming = NamingTemplate::default();
    let start = args
        .start_date
        .and_hms_opt(0, 0, 0)
        .context("start date has no midnight")?;
    let mut files = 0u64;
    for hour in 0..args.hours {
        let tick = start + Duration::hours(i64::from(hour));
        for shard in 1..=args.shards {
            let path = args.output_dir.join(naming.file_name(shard, tick));
            write_extract(&path, shard, hour, tick, args.rows)?;
            files += 1;
        }
    }

    let last = start + Duration::hours(i64::from(args.hours - 1));
    let index = CorpusIndex {
        version: 1,
        shards: args.shards,
        hours: args.hours,
        rows_per_file: args.rows,
        first_tick: start.format("%Y-%m-%dT%H:00").to_string(),
        last_tick: last.format("%Y-%m-%dT%H:00").to_string(),
        files,
    };
    let index_path = args.output_dir.join("corpus.toml");
    fs::write(
        &index_path,
        toml::to_string_pretty(&index).context("serialising corpus index")?,
    )
    .with_context(|| format!("writing {}", index_path.display()))
}

fn write_extract(path: &Path, shard: u32, hour: u32, tick: NaiveDateTime, rows: u32) -> Result<()> {
    let mut file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    writeln!(file, "{HEADER}").with_context(|| format!("writing {}", path.display()))?;
    for row in 0..rows {
        let seed = shard as usize * 31 + hour as usize * 7 + row as usize;
        let (name, price) = PRODUCTS[seed % PRODUCTS.len()];
        let order_id = (u64::from(shard) * 1_000_000) + u64::from(hour) * 1_000 + u64::from(row);
        writeln!(
            file,
            "{order_id},{},{name},{},{price},{}",
            seed % PRODUCTS.len() + 1,
            seed % 4 + 1,
            DISCOUNTS[seed % DISCOUNTS.len()],
        )
        .with_context(|| format!("writing {}", path.display()))?;
    }
    // Stamp the extract with its own hour so mtime ordering matches the timeline.
    let mtime = SystemTime::UNIX_EPOCH
        + std::time::Duration::from_secs(tick.and_utc().timestamp().max(0) as u64);
    file.set_modified(mtime)
        .with_context(|| format!("setting mtime on {}", path.display()))?;
    Ok(())
}

fn main() {
    if let Err(err) = run(Args::parse()) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
