//! # Kasir POS Command-Line Interface
//!
//! Runs one engine operation per invocation and prints the result as JSON.
//!
//! ## Usage
//! ```bash
//! kasir seed
//! kasir products
//! kasir checkout 1:2 2:1
//! kasir checkout --key 6f1c0a4e-1f3b-4d8e-9a53-6b1f0e6f2c11 1:2
//! kasir tx list 20 0
//! kasir tx show 42
//! kasir report daily 2024-01-15
//! kasir report range 2024-01-01 2024-01-31
//!
//! # Global options (before the command)
//! kasir --config ./kasir.toml --db ./data/kasir.db report daily
//! ```
//!
//! ## Startup Sequence
//! 1. Initialize tracing (stderr, so stdout stays pure JSON)
//! 2. Load `EngineConfig` (file → environment → `--db`)
//! 3. Open the database and run migrations
//! 4. Run the command

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use serde_json::json;
use tracing::{debug, info, Level};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use kasir_core::CheckoutLine;
use kasir_engine::{EngineConfig, PosEngine, SeedOutcome};

const USAGE: &str = "\
Kasir POS

Usage: kasir [OPTIONS] <COMMAND>

Commands:
  seed                          Load the demo catalog into an empty database
  products [LIMIT]              List products by name
  checkout [--key UUID] ID:QTY...
                                Sell the given products as one transaction
  tx list [LIMIT] [OFFSET]      List transactions, newest first
  tx show ID                    Show one transaction with its items
  report daily [YYYY-MM-DD]     Sales for a local day (default: today)
  report range START END        Sales for local days START..=END

Options:
  -c, --config <PATH>   Config file (default: platform config dir/kasir.toml)
  -d, --db <PATH>       Database file, overrides config and KASIR_DB_PATH
  -h, --help            Show this help message";

// =============================================================================
// Arguments
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Seed,
    Products { limit: Option<u32> },
    Checkout { key: Option<Uuid>, lines: Vec<CheckoutLine> },
    TxList { limit: Option<u32>, offset: Option<u32> },
    TxShow { id: i64 },
    ReportDaily { date: Option<NaiveDate> },
    ReportRange { start: NaiveDate, end: NaiveDate },
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Cli {
    config: Option<PathBuf>,
    db: Option<PathBuf>,
    command: Command,
}

fn parse_args(args: &[String]) -> Result<Cli> {
    let mut config = None;
    let mut db = None;
    let mut rest: Vec<&str> = Vec::new();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                let path = args.get(i + 1).context("--config needs a path")?;
                config = Some(PathBuf::from(path));
                i += 1;
            }
            "--db" | "-d" => {
                let path = args.get(i + 1).context("--db needs a path")?;
                db = Some(PathBuf::from(path));
                i += 1;
            }
            "--help" | "-h" => {
                return Ok(Cli {
                    config,
                    db,
                    command: Command::Help,
                })
            }
            other => rest.push(other),
        }
        i += 1;
    }

    let command = parse_command(&rest)?;
    Ok(Cli {
        config,
        db,
        command,
    })
}

fn parse_command(words: &[&str]) -> Result<Command> {
    let command = match words {
        [] => Command::Help,
        ["seed"] => Command::Seed,
        ["products"] => Command::Products { limit: None },
        ["products", limit] => Command::Products {
            limit: Some(parse_number(limit, "limit")?),
        },
        ["checkout", "--key", key, lines @ ..] => Command::Checkout {
            key: Some(Uuid::parse_str(key).with_context(|| format!("invalid key '{key}'"))?),
            lines: parse_lines(lines)?,
        },
        ["checkout", lines @ ..] => Command::Checkout {
            key: None,
            lines: parse_lines(lines)?,
        },
        ["tx", "list", page @ ..] if page.len() <= 2 => Command::TxList {
            limit: page.first().map(|v| parse_number(v, "limit")).transpose()?,
            offset: page.get(1).map(|v| parse_number(v, "offset")).transpose()?,
        },
        ["tx", "show", id] => Command::TxShow {
            id: parse_number(id, "transaction id")?,
        },
        ["report", "daily"] => Command::ReportDaily { date: None },
        ["report", "daily", date] => Command::ReportDaily {
            date: Some(parse_date(date)?),
        },
        ["report", "range", start, end] => Command::ReportRange {
            start: parse_date(start)?,
            end: parse_date(end)?,
        },
        _ => bail!("unrecognized command '{}'\n\n{USAGE}", words.join(" ")),
    };

    Ok(command)
}

fn parse_lines(specs: &[&str]) -> Result<Vec<CheckoutLine>> {
    specs
        .iter()
        .map(|spec| {
            let (id, qty) = spec
                .split_once(':')
                .with_context(|| format!("expected ID:QTY, got '{spec}'"))?;
            Ok(CheckoutLine::new(
                parse_number(id, "product id")?,
                parse_number(qty, "quantity")?,
            ))
        })
        .collect()
}

fn parse_number<T: std::str::FromStr>(raw: &str, what: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid {what} '{raw}'"))
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("invalid date '{raw}', expected YYYY-MM-DD"))
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = parse_args(&args)?;

    if cli.command == Command::Help {
        println!("{USAGE}");
        return Ok(());
    }

    let mut config = EngineConfig::load(cli.config.clone()).context("loading configuration")?;
    if let Some(db) = cli.db.clone() {
        config.database.path = db;
    }
    debug!(?config, "Configuration loaded");

    let engine = PosEngine::open(config)
        .await
        .context("opening database")?;

    let output = run(&engine, cli.command).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    engine.database().close().await;
    Ok(())
}

async fn run(engine: &PosEngine, command: Command) -> Result<serde_json::Value> {
    let value = match command {
        Command::Seed => {
            let outcome = engine.seed().await?;
            info!(?outcome, "Seed finished");
            match outcome {
                SeedOutcome::Inserted(count) => json!({ "inserted": count }),
                SeedOutcome::Skipped(existing) => json!({ "skipped": true, "existing": existing }),
            }
        }
        Command::Products { limit } => serde_json::to_value(engine.list_products(limit).await?)?,
        Command::Checkout { key, lines } => {
            let result = match key {
                Some(key) => engine.checkout_idempotent(key, &lines).await,
                None => engine.checkout(&lines).await,
            };
            match result {
                Ok(txn) => serde_json::to_value(txn)?,
                Err(err) if err.is_retryable() => {
                    return Err(err).context("checkout failed, safe to retry")
                }
                Err(err) => return Err(err).context("checkout rejected"),
            }
        }
        Command::TxList { limit, offset } => {
            serde_json::to_value(engine.list_transactions(limit, offset).await?)?
        }
        Command::TxShow { id } => match engine.get_transaction(id).await? {
            Some(txn) => serde_json::to_value(txn)?,
            None => bail!("transaction {id} not found"),
        },
        Command::ReportDaily { date } => {
            let date = date.unwrap_or_else(|| Local::now().date_naive());
            serde_json::to_value(engine.daily_report(date).await?)?
        }
        Command::ReportRange { start, end } => {
            serde_json::to_value(engine.range_report(start, end).await?)?
        }
        Command::Help => json!({ "usage": USAGE }),
    };

    Ok(value)
}

/// Initializes the tracing subscriber for structured logging.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=kasir_engine=trace` - Trace the checkout coordinator only
/// - Default: INFO, DEBUG for kasir crates
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kasir=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::TRACE)
        .with_writer(std::io::stderr)
        .init();
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn args(line: &str) -> Vec<String> {
        line.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn test_parse_checkout_lines() {
        let cli = parse_args(&args("--db /tmp/k.db checkout 1:2 7:1")).unwrap();
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/k.db")));
        assert_eq!(
            cli.command,
            Command::Checkout {
                key: None,
                lines: vec![CheckoutLine::new(1, 2), CheckoutLine::new(7, 1)],
            }
        );
    }

    #[test]
    fn test_parse_idempotent_checkout() {
        let key = Uuid::new_v4();
        let cli = parse_args(&args(&format!("checkout --key {key} 3:1"))).unwrap();
        assert_eq!(
            cli.command,
            Command::Checkout {
                key: Some(key),
                lines: vec![CheckoutLine::new(3, 1)],
            }
        );
    }

    #[test]
    fn test_parse_listing_and_reports() {
        assert_eq!(
            parse_args(&args("tx list 20")).unwrap().command,
            Command::TxList {
                limit: Some(20),
                offset: None
            }
        );
        assert_eq!(
            parse_args(&args("report range 2024-01-01 2024-01-31"))
                .unwrap()
                .command,
            Command::ReportRange {
                start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                end: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            }
        );
        assert_eq!(
            parse_args(&args("report daily")).unwrap().command,
            Command::ReportDaily { date: None }
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_args(&args("checkout 1-2")).is_err());
        assert!(parse_args(&args("checkout x:1")).is_err());
        assert!(parse_args(&args("report daily 15/01/2024")).is_err());
        assert!(parse_args(&args("refund 1")).is_err());
        assert!(parse_args(&args("--db")).is_err());
    }

    #[test]
    fn test_help() {
        assert_eq!(parse_args(&args("")).unwrap().command, Command::Help);
        assert_eq!(parse_args(&args("tx -h")).unwrap().command, Command::Help);
    }
}
