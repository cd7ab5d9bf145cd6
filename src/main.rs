//! PRISM: Position Risk Intelligence & Swap Monitor
//!
//! Prices open interest rate swap positions against current par rates and
//! emits a CLOSE or HOLD signal for each one on every evaluation cycle.

mod db;
mod error;
mod models;
mod monitor;
mod pipeline;
mod risk;

use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::db::Database;
use crate::models::{RateSet, RateSnapshot, SwapPosition, Tenor};
use crate::monitor::{resolve_policy, Monitor, MonitorConfig};
use crate::pipeline::{
    evaluate_cycle, run_cycle, CycleReport, InMemoryPositions, SignalLog, StaticRateFeed,
};
use crate::risk::{DecisionEngine, DynamicThresholds, ThresholdConfig, ThresholdPolicy};

/// Swap position risk monitor CLI.
#[derive(Parser)]
#[command(name = "prism")]
#[command(about = "Monitor swap positions and signal when to close them", long_about = None)]
struct Cli {
    /// Database URL
    #[arg(short, long, env = "PRISM_DATABASE_URL", default_value = "sqlite:./prism.db?mode=rwc")]
    database: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "PRISM_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Close when P&L reaches this gain (USD)
    #[arg(long, env = "PRISM_PROFIT_TAKE", default_value = "50000")]
    profit_take: Decimal,

    /// Close when P&L falls to this loss (USD, negative)
    #[arg(long, env = "PRISM_STOP_LOSS", default_value = "-25000", allow_hyphen_values = true)]
    stop_loss: Decimal,

    /// Size thresholds by notional and rate volatility instead
    #[arg(long)]
    dynamic_thresholds: bool,

    /// Volatility for dynamic thresholds; estimated from rate history if absent
    #[arg(long, env = "PRISM_VOLATILITY")]
    volatility: Option<Decimal>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load sample positions and a sample USD SOFR curve
    Seed,

    /// Evaluate the sample book in memory, close on CLOSE signals, re-evaluate
    Demo,

    /// Record a market rate for a tenor
    Rate {
        /// Tenor (2Y, 5Y, 10Y, 30Y)
        tenor: Tenor,

        /// Par rate in percent, e.g. 4.52
        #[arg(allow_hyphen_values = true)]
        rate: Decimal,

        /// Bid rate in percent
        #[arg(long, requires = "ask", allow_hyphen_values = true)]
        bid: Option<Decimal>,

        /// Ask rate in percent
        #[arg(long, requires = "bid", allow_hyphen_values = true)]
        ask: Option<Decimal>,
    },

    /// Add or update a position
    AddPosition {
        /// Position identifier
        id: String,

        /// Signed notional: positive receives fixed, negative pays fixed
        #[arg(short, long, allow_hyphen_values = true)]
        notional: Decimal,

        /// Fixed rate in percent
        #[arg(short, long)]
        fixed_rate: Decimal,

        /// Tenor (2Y, 5Y, 10Y, 30Y)
        #[arg(short, long)]
        tenor: String,

        /// Trade date (YYYY-MM-DD), defaults to today
        #[arg(short, long)]
        entry_date: Option<NaiveDate>,

        /// Owning trader
        #[arg(long, default_value = "trader-1")]
        trader: String,
    },

    /// List all positions
    Positions,

    /// Show the latest curve with trend against the previous observation
    Rates,

    /// Run a single evaluation cycle
    Once {
        /// Print the signals as JSON
        #[arg(long)]
        json: bool,
    },

    /// Start the monitor loop
    Run {
        /// Polling interval in seconds
        #[arg(short, long, default_value = "60", value_parser = clap::value_parser!(u64).range(1..))]
        interval: u64,
    },

    /// Show recent signals
    Signals {
        /// Only this position's history
        #[arg(short, long)]
        position: Option<String>,

        /// Maximum number of signals to show
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },

    /// Close a position (marks its CLOSE signals executed)
    Close {
        /// Position identifier
        position_id: String,
    },

    /// Show current configuration
    Config,

    /// Show portfolio status
    Status,
}

impl Cli {
    fn monitor_config(&self, poll_interval_secs: u64) -> MonitorConfig {
        let policy = if self.dynamic_thresholds {
            ThresholdPolicy::Dynamic(
                self.volatility
                    .map(DynamicThresholds::new)
                    .unwrap_or_default(),
            )
        } else {
            ThresholdPolicy::Fixed(ThresholdConfig::new(self.profit_take, self.stop_loss))
        };

        MonitorConfig {
            poll_interval_secs,
            policy,
            estimate_volatility: self.dynamic_thresholds && self.volatility.is_none(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if let Commands::Demo = cli.command {
        return run_demo(&cli).await;
    }

    // Initialize database
    let db = Database::new(&cli.database).await?;

    match &cli.command {
        Commands::Seed => {
            let positions = sample_positions()?;
            for position in &positions {
                db.save_position(position).await?;
            }

            let now = Utc::now();
            let curve: Vec<RateSnapshot> = StaticRateFeed::sample_curve()
                .into_iter()
                .map(|(tenor, rate)| {
                    RateSnapshot::new(tenor, rate, now).with_quotes(rate - dec!(0.01), rate + dec!(0.01))
                })
                .collect();
            db.store_rates(&curve).await?;

            info!(positions = positions.len(), rates = curve.len(), "Seeded sample data");
            println!("Seeded {} positions and {} rates.", positions.len(), curve.len());
        }

        // Runs before the database is opened
        Commands::Demo => {}

        Commands::Rate { tenor, rate, bid, ask } => {
            let mut snapshot = RateSnapshot::new(*tenor, *rate, Utc::now());
            if let (Some(bid), Some(ask)) = (bid, ask) {
                if bid > rate || rate > ask {
                    bail!("Quotes must satisfy bid <= rate <= ask, got {} / {} / {}", bid, rate, ask);
                }
                snapshot = snapshot.with_quotes(*bid, *ask);
            }

            db.store_rates(&[snapshot]).await?;
            println!("Recorded {} at {:.4}%", tenor, rate);
        }

        Commands::AddPosition {
            id,
            notional,
            fixed_rate,
            tenor,
            entry_date,
            trader,
        } => {
            let position = SwapPosition {
                id: id.clone(),
                trader_id: trader.clone(),
                notional: *notional,
                fixed_rate: *fixed_rate,
                tenor: tenor.trim().to_uppercase(),
                entry_date: entry_date.unwrap_or_else(|| Utc::now().date_naive()),
                status: Default::default(),
            };
            position.validate()?;

            db.save_position(&position).await?;
            println!(
                "Saved {} {} {} @ {:.4}% ({})",
                position.id,
                position.direction(),
                position.notional.abs(),
                position.fixed_rate,
                position.tenor
            );
        }

        Commands::Positions => {
            let positions = db.get_positions().await?;

            if positions.is_empty() {
                println!("No positions. Use 'prism add-position' or 'prism seed' to add some.");
                return Ok(());
            }

            println!(
                "\n{:<12} {:<12} {:<10} {:>16} {:>8} {:>5} {:<10} {:<10} {:<7} {:<10}",
                "ID", "TRADER", "DIRECTION", "NOTIONAL", "FIXED%", "TENOR", "TRADED", "MATURES", "STATUS", "CLOSED"
            );
            println!("{}", "-".repeat(109));

            for stored in positions {
                let status = stored.status.clone();
                let closed_on = stored
                    .closed_at
                    .as_deref()
                    .map(|t| t.get(..10).unwrap_or(t).to_string())
                    .unwrap_or_else(|| "-".to_string());
                match SwapPosition::try_from(stored) {
                    Ok(pos) => println!(
                        "{:<12} {:<12} {:<10} {:>16.2} {:>8.4} {:>5} {:<10} {:<10} {:<7} {:<10}",
                        truncate(&pos.id, 12),
                        truncate(&pos.trader_id, 12),
                        pos.direction().as_str(),
                        pos.notional.abs(),
                        pos.fixed_rate,
                        pos.tenor,
                        pos.entry_date,
                        pos.maturity_date()
                            .map(|d| d.to_string())
                            .unwrap_or_else(|| "-".to_string()),
                        status,
                        closed_on
                    ),
                    Err(e) => println!("  <unreadable row: {}>", e),
                }
            }
        }

        Commands::Rates => {
            let latest = RateSet::from_snapshots(db.get_latest_rates().await?);
            let previous = RateSet::from_snapshots(db.get_previous_rates().await?);

            if latest.is_empty() {
                println!("No rates recorded. Use 'prism rate <tenor> <rate>' or 'prism seed'.");
                return Ok(());
            }

            println!(
                "\n{:<6} {:>9} {:>9} {:>9} {:>10}  {}",
                "TENOR", "RATE%", "BID", "ASK", "CHANGE", "AS OF"
            );
            println!("{}", "-".repeat(70));

            for snapshot in latest.snapshots() {
                let (arrow, change) = match previous.get(snapshot.tenor) {
                    Some(prev) => {
                        let bps = (snapshot.rate - prev.rate) * dec!(100);
                        (trend_arrow(bps), format!("{:+.1}bp", bps))
                    }
                    None => (" ", "-".to_string()),
                };

                println!(
                    "{:<6} {:>9.4} {:>9} {:>9} {:>10} {} {}",
                    snapshot.tenor,
                    snapshot.rate,
                    format_quote(snapshot.bid),
                    format_quote(snapshot.ask),
                    change,
                    arrow,
                    snapshot.as_of.format("%Y-%m-%d %H:%M:%S")
                );
            }

            let missing = latest.missing_tenors();
            if !missing.is_empty() {
                let names: Vec<_> = missing.iter().map(|t| t.as_str()).collect();
                println!("\nMissing tenors: {}", names.join(", "));
            }
        }

        Commands::Once { json } => {
            let config = cli.monitor_config(0);
            let engine = DecisionEngine::new(resolve_policy(&db, &config).await?)?;
            let report = run_cycle(&db, &db, &db, &engine).await?;

            if *json {
                println!("{}", serde_json::to_string_pretty(&report.signals)?);
                return Ok(());
            }

            print_report(&report);
        }

        Commands::Run { interval } => {
            let config = cli.monitor_config(*interval);
            info!(interval = interval, policy = ?config.policy, "Starting monitor");

            let mut monitor = Monitor::new(config, Arc::new(db))?;

            println!("\n=== PRISM Monitor ===");
            println!("Polling interval: {}s", interval);
            println!("\nPress Ctrl+C to stop.\n");

            if let Err(e) = monitor.run().await {
                tracing::error!(error = %e, "Monitor error");
            }

            println!("\n{}", monitor.stats());
        }

        Commands::Signals { position, limit } => {
            let records = match position {
                Some(id) => {
                    if db.get_position(id).await?.is_none() {
                        bail!("Position {} not found", id);
                    }
                    db.get_signals_for_position(id).await?
                }
                None => db.get_recent_signals(*limit).await?,
            };

            if records.is_empty() {
                println!("No signals recorded. Use 'prism once' or 'prism run' first.");
                return Ok(());
            }

            println!(
                "\n{:<20} {:<12} {:<6} {:>14} {:<24} {:<4}",
                "TIME", "POSITION", "SIGNAL", "P&L", "ACTION", "DONE"
            );
            println!("{}", "-".repeat(86));

            for record in records {
                let s = &record.signal;
                println!(
                    "{:<20} {:<12} {:<6} {:>14.2} {:<24} {:<4}",
                    s.generated_at.format("%Y-%m-%d %H:%M:%S"),
                    truncate(&s.position_id, 12),
                    s.decision,
                    s.pnl,
                    s.recommended_action(),
                    if record.executed { "yes" } else { "" }
                );
            }
        }

        Commands::Close { position_id } => {
            db.close_position(position_id).await?;
            println!("Closed position: {}", position_id);
        }

        Commands::Config => {
            let config = cli.monitor_config(60);

            println!("\n=== PRISM Configuration ===\n");
            println!("Database:             {}", cli.database);
            println!("Log Level:            {}", cli.log_level);

            println!("\nThresholds:");
            match config.policy {
                ThresholdPolicy::Fixed(t) => {
                    println!("  Mode:                 fixed");
                    println!("  Profit Take:          ${:.2}", t.profit_take_threshold);
                    println!("  Stop Loss:            ${:.2}", t.stop_loss_threshold);
                }
                ThresholdPolicy::Dynamic(d) => {
                    println!("  Mode:                 dynamic");
                    if config.estimate_volatility {
                        println!("  Volatility:           from 10Y history (fallback {})", d.volatility);
                    } else {
                        println!("  Volatility:           {}", d.volatility);
                    }
                    for notional in [dec!(5000000), dec!(10000000), dec!(25000000)] {
                        let t = d.for_notional(notional);
                        println!(
                            "  {:>12} notional: take ${:.2} / stop ${:.2}",
                            notional, t.profit_take_threshold, t.stop_loss_threshold
                        );
                    }
                }
            }

            if let Err(e) = config.policy.validate() {
                println!("\nWARNING: {}", e);
            }
        }

        Commands::Status => {
            let book = db.load_open_positions().await?;
            let positions = book.positions;
            let rates = RateSet::from_snapshots(db.get_latest_rates().await?);
            let (total, close, executed) = db.signal_counts().await?;

            println!("\n=== Portfolio ===");
            println!("Open Positions:   {}", positions.len());
            println!("Quoted Tenors:    {}/{}", rates.len(), Tenor::ALL.len());

            if !rates.is_empty() {
                let config = cli.monitor_config(60);
                let engine = DecisionEngine::new(resolve_policy(&db, &config).await?)?;

                // Mark-to-market only; nothing is published
                let report = evaluate_cycle(&positions, &rates, &engine);
                println!("Total P&L:        ${:.2}", report.total_pnl());
                println!("Portfolio DV01:   ${:.2}", report.portfolio_dv01);
                println!("Would Close:      {}", report.close_count());
                println!("Not Priced:       {}", report.failures.len() + book.rejected.len());
            }

            println!("\n=== Signals ===");
            println!("Total:            {}", total);
            println!("CLOSE:            {}", close);
            println!("Executed:         {}", executed);
        }
    }

    Ok(())
}

/// One cycle over the sample book and curve, entirely in memory.
async fn run_demo(cli: &Cli) -> Result<()> {
    let feed = StaticRateFeed::default();
    let store = InMemoryPositions::new(sample_positions()?);
    let log = SignalLog::new();
    let engine = DecisionEngine::new(cli.monitor_config(0).policy)?;

    let first = run_cycle(&feed, &store, &log, &engine).await?;
    print_report(&first);

    // Act on CLOSE signals the way the trader would
    for signal in first.signals.iter().filter(|s| s.is_close()) {
        store.close(&signal.position_id).await?;
        println!("Closed {}: {}", signal.position_id, signal.recommended_action());
    }

    let second = run_cycle(&feed, &store, &log, &engine).await?;
    print_report(&second);

    let entries = log.signals().await;
    println!(
        "Signal log: {} entries ({} CLOSE)",
        log.len().await,
        entries.iter().filter(|s| s.is_close()).count()
    );
    Ok(())
}

fn print_report(report: &CycleReport) {
    println!("\n{}", report);

    if !report.signals.is_empty() {
        println!(
            "{:<12} {:<6} {:<14} {:>14} {:>12} {:>12} {:>12}",
            "POSITION", "SIGNAL", "REASON", "P&L", "DV01", "TAKE", "STOP"
        );
        println!("{}", "-".repeat(88));
        for signal in &report.signals {
            println!(
                "{:<12} {:<6} {:<14} {:>14.2} {:>12.2} {:>12.2} {:>12.2}",
                truncate(&signal.position_id, 12),
                signal.decision,
                signal.reason.as_str(),
                signal.pnl,
                signal.dv01,
                signal.profit_take_threshold,
                signal.stop_loss_threshold
            );
        }
    }

    for failure in &report.failures {
        println!("  ! {}: {}", failure.position_id, failure.error);
    }
}

/// Sample book used by `seed` and `demo`.
fn sample_positions() -> Result<Vec<SwapPosition>> {
    let book = [
        ("POS001", dec!(10000000), dec!(4.10), Tenor::Y5, (2024, 1, 15)),
        ("POS002", dec!(-25000000), dec!(4.25), Tenor::Y10, (2024, 2, 1)),
        ("POS003", dec!(5000000), dec!(3.95), Tenor::Y30, (2024, 3, 1)),
    ];

    let mut positions = Vec::with_capacity(book.len());
    for (id, notional, fixed, tenor, (y, m, d)) in book {
        let Some(entry_date) = NaiveDate::from_ymd_opt(y, m, d) else {
            bail!("Invalid sample date {}-{}-{}", y, m, d);
        };
        positions.push(SwapPosition::new(id, "trader-1", notional, fixed, tenor, entry_date));
    }

    Ok(positions)
}

fn format_quote(quote: Option<Decimal>) -> String {
    quote
        .map(|q| format!("{:.4}", q))
        .unwrap_or_else(|| "-".to_string())
}

fn trend_arrow(change_bps: Decimal) -> &'static str {
    if change_bps > Decimal::ZERO {
        "↑"
    } else if change_bps < Decimal::ZERO {
        "↓"
    } else {
        "→"
    }
}

/// Truncate a string with ellipsis if too long.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
