//! cryptofolio: simulated crypto portfolio tracker.
//!
//! Plans capital allocation, tracks DCA compliance against the plan, and
//! runs a simulated trading wallet with take-profit/stop-loss positions
//! evaluated against a polled price feed.

mod dca;
mod error;
mod feed;
mod models;
mod monitor;
mod planner;
mod stats;
mod store;
mod wallet;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use uuid::Uuid;

use crate::dca::DcaTracker;
use crate::error::PortfolioError;
use crate::feed::{fallback_quote, HttpPriceFeed, PriceSource, StaticPriceFeed};
use crate::models::{AllocationType, MarketCondition, PortfolioSnapshot};
use crate::monitor::{Monitor, MonitorConfig};
use crate::planner::{PlanRequest, Planner};
use crate::store::{SnapshotStore, SqliteStore};
use crate::wallet::OpenPositionRequest;

/// Simulated crypto portfolio tracker CLI.
#[derive(Parser)]
#[command(name = "cryptofolio")]
#[command(about = "Plan, DCA, and simulate TP/SL positions on a crypto portfolio", long_about = None)]
struct Cli {
    /// Database file path
    #[arg(short, long, default_value = "sqlite:cryptofolio.db?mode=rwc")]
    database: String,

    /// Session key scoping the portfolio snapshot
    #[arg(short, long, default_value = "default", env = "CRYPTOFOLIO_SESSION")]
    session: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Use the static price table instead of the live feed
    #[arg(long)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute a new allocation plan (replaces the old one, resets progress)
    Plan {
        /// Total investable capital in USD (minimum 500)
        #[arg(short, long)]
        capital: f64,

        /// Market condition (bull, bear, sideways, volatile)
        #[arg(short, long, default_value = "sideways")]
        market: String,

        /// Use the altcoin-season allocation table
        #[arg(long)]
        altcoin_season: bool,

        /// Carve out an airdrop/presale bucket
        #[arg(long)]
        airdrop: bool,
    },

    /// Record one weekly DCA contribution for a token
    Invest {
        /// Token symbol (must be in the plan)
        symbol: String,

        /// Contribution amount in USD
        amount: f64,
    },

    /// Show the compliance notification snapshot
    Compliance,

    /// Withdraw initial capital for a token (requires the profit milestone)
    Withdraw {
        /// Token symbol
        symbol: String,
    },

    /// Fund the simulated trading wallet
    Deposit {
        /// Amount in USD
        amount: f64,
    },

    /// Open a trading position
    Open {
        /// Token symbol
        symbol: String,

        /// Entry price
        #[arg(short, long)]
        entry: f64,

        /// Take-profit price
        #[arg(short, long)]
        take_profit: f64,

        /// Stop-loss price
        #[arg(short = 'l', long)]
        stop_loss: f64,

        /// Allocation type (btc, eth, sol, fast-recovery, other)
        #[arg(short = 'a', long, default_value = "other")]
        allocation: String,
    },

    /// Close a position by id
    Close {
        /// Position id
        id: String,

        /// Position kind (trading, investment)
        #[arg(short, long, default_value = "trading")]
        kind: String,
    },

    /// List open positions with P&L
    Positions,

    /// Show the portfolio snapshot and equity statistics
    Status,

    /// Start the price monitor loop
    Run {
        /// Polling interval in seconds
        #[arg(short, long, default_value = "30")]
        interval: u64,
    },
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

    let store: Arc<dyn SnapshotStore> = Arc::new(SqliteStore::new(&cli.database).await?);
    let feed: Arc<dyn PriceSource> = if cli.offline {
        Arc::new(StaticPriceFeed)
    } else {
        Arc::new(HttpPriceFeed::from_env()?)
    };
    let tracker = DcaTracker::default();
    let session = cli.session.clone();

    match cli.command {
        Commands::Plan {
            capital,
            market,
            altcoin_season,
            airdrop,
        } => {
            let Some(market_condition) = MarketCondition::parse(&market) else {
                bail!("Unknown market condition '{market}' (expected bull, bear, sideways, or volatile)");
            };

            let request = PlanRequest {
                capital: Decimal::try_from(capital)?,
                market_condition,
                altcoin_season,
                airdrop_participation: airdrop,
            };

            let plan = Planner::calculate(&request)?;

            let mut snapshot = load_or_default(&store, &session).await?;
            let replaced = snapshot.plan.is_some();
            snapshot.plan = Some(plan.clone());
            snapshot.progress.clear();
            snapshot.updated_at = Some(Utc::now());
            store.save(&session, &snapshot).await?;

            if replaced {
                info!("Previous plan replaced, progress reset");
            }

            println!(
                "\nAllocation plan for ${:.2} ({}, max {} tokens)\n",
                plan.capital,
                plan.market_condition.as_str(),
                plan.max_tokens
            );
            println!("{:<14} {:>8} {:>12} {:>7}", "TOKEN", "PCT", "AMOUNT", "WEEKS");
            println!("{}", "-".repeat(45));
            for alloc in &plan.allocations {
                println!(
                    "{:<14} {:>7.2}% {:>12.2} {:>7}",
                    alloc.symbol, alloc.percentage, alloc.amount, alloc.weeks
                );
            }
            println!("{}", "-".repeat(45));
            println!(
                "{:<14} {:>7.2}% {:>12.2}",
                "TOTAL",
                plan.total_percentage(),
                plan.total_amount()
            );
        }

        Commands::Invest { symbol, amount } => {
            let mut snapshot = load_or_default(&store, &session).await?;
            let plan = snapshot.plan.clone().ok_or(PortfolioError::PlanMissing)?;

            let price = fetch_price(feed.as_ref(), &symbol).await?;
            tracker.record_investment(
                &plan,
                &mut snapshot.progress,
                &symbol,
                Decimal::try_from(amount)?,
                price,
                Utc::now(),
            )?;
            snapshot.updated_at = Some(Utc::now());
            store.save(&session, &snapshot).await?;

            let symbol = symbol.to_uppercase();
            let progress = &snapshot.progress[&symbol];
            let target = plan
                .allocation_for(&symbol)
                .map(|a| a.amount)
                .unwrap_or(Decimal::ZERO);

            println!(
                "Recorded ${:.2} into {} (week {}): {:.2} of {:.2} invested{}",
                amount,
                symbol,
                progress.weeks_passed,
                progress.total_invested,
                target,
                if progress.target_reached {
                    " - target reached"
                } else {
                    ""
                }
            );
        }

        Commands::Compliance => {
            let snapshot = load_or_default(&store, &session).await?;
            let plan = snapshot.plan.as_ref().ok_or(PortfolioError::PlanMissing)?;

            let notifications = tracker.check_compliance(plan, &snapshot.progress, Utc::now());

            if notifications.is_empty() {
                println!("All tokens are on schedule.");
            } else {
                for n in &notifications {
                    println!("[{:<7}] {}", n.kind.as_str(), n.message);
                }
            }
        }

        Commands::Withdraw { symbol } => {
            let mut snapshot = load_or_default(&store, &session).await?;

            if tracker.withdraw_capital(&mut snapshot.progress, &symbol) {
                snapshot.updated_at = Some(Utc::now());
                store.save(&session, &snapshot).await?;
                println!("Capital withdrawal recorded for {}", symbol.to_uppercase());
            } else {
                println!(
                    "{} has not reached the profit milestone (or already withdrew).",
                    symbol.to_uppercase()
                );
            }
        }

        Commands::Deposit { amount } => {
            let mut snapshot = load_or_default(&store, &session).await?;
            snapshot.wallet.deposit(Decimal::try_from(amount)?)?;
            snapshot.updated_at = Some(Utc::now());
            store.save(&session, &snapshot).await?;

            println!("Wallet balance: ${:.2}", snapshot.wallet.balance);
        }

        Commands::Open {
            symbol,
            entry,
            take_profit,
            stop_loss,
            allocation,
        } => {
            let Some(allocation_type) = AllocationType::parse(&allocation) else {
                bail!("Unknown allocation type '{allocation}' (expected btc, eth, sol, fast-recovery, or other)");
            };

            let mut snapshot = load_or_default(&store, &session).await?;
            let position = snapshot.wallet.open_position(OpenPositionRequest {
                symbol: symbol.clone(),
                entry_price: Decimal::try_from(entry)?,
                take_profit: Decimal::try_from(take_profit)?,
                stop_loss: Decimal::try_from(stop_loss)?,
                allocation_type,
            })?;

            let id = position.id;
            let units = position.amount;

            snapshot.updated_at = Some(Utc::now());
            store.save(&session, &snapshot).await?;

            println!(
                "Opened {} position {}: {:.6} units @ {:.2} (TP {:.2} / SL {:.2})",
                symbol.to_uppercase(),
                id,
                units,
                entry,
                take_profit,
                stop_loss
            );
            println!("Wallet balance: ${:.2}", snapshot.wallet.balance);
        }

        Commands::Close { id, kind } => {
            let id: Uuid = id.parse().context("Invalid position id")?;
            let mut snapshot = load_or_default(&store, &session).await?;

            match kind.to_lowercase().as_str() {
                "trading" => {
                    let position = snapshot.wallet.close_trading(id)?;
                    println!(
                        "Closed trading position {} ({}): paid out ${:.2}",
                        id,
                        position.status.as_str(),
                        position.current_value()
                    );
                }
                "investment" => {
                    let position = snapshot.wallet.close_investment(id)?;
                    println!(
                        "Closed investment position {}: value ${:.2} (not credited to wallet)",
                        id,
                        position.current_value()
                    );
                }
                other => bail!("Unknown position kind '{other}' (expected trading or investment)"),
            }

            snapshot.updated_at = Some(Utc::now());
            store.save(&session, &snapshot).await?;
            println!("Wallet balance: ${:.2}", snapshot.wallet.balance);
        }

        Commands::Positions => {
            let snapshot = load_or_default(&store, &session).await?;

            if snapshot.wallet.trading.is_empty() && snapshot.wallet.investments.is_empty() {
                println!("No open positions.");
                return Ok(());
            }

            if !snapshot.wallet.trading.is_empty() {
                println!("\n=== Trading Positions ===");
                println!(
                    "{:<38} {:<7} {:>10} {:>10} {:>10} {:>9} {:<8}",
                    "ID", "TOKEN", "ENTRY", "CURRENT", "PNL", "PNL%", "STATUS"
                );
                for p in &snapshot.wallet.trading {
                    println!(
                        "{:<38} {:<7} {:>10.2} {:>10.2} {:>10.2} {:>8.1}% {:<8}",
                        p.id,
                        p.symbol,
                        p.entry_price,
                        p.current_price,
                        p.pnl(),
                        p.pnl_percent(),
                        p.status.as_str()
                    );
                }
            }

            if !snapshot.wallet.investments.is_empty() {
                println!("\n=== Investment Positions ===");
                println!(
                    "{:<38} {:<7} {:>10} {:>10} {:>10} {:>9}",
                    "ID", "TOKEN", "ENTRY", "TARGET", "CURRENT", "PNL%"
                );
                for p in &snapshot.wallet.investments {
                    println!(
                        "{:<38} {:<7} {:>10.2} {:>10.2} {:>10.2} {:>8.1}%",
                        p.id,
                        p.symbol,
                        p.entry_price,
                        p.investment_tp,
                        p.current_price,
                        p.pnl_percent()
                    );
                }
            }
        }

        Commands::Status => {
            let snapshot = load_or_default(&store, &session).await?;

            println!("\n=== Wallet ===");
            println!("Balance:          ${:.2}", snapshot.wallet.balance);
            println!("Positions value:  ${:.2}", snapshot.wallet.positions_value());
            println!("Equity:           ${:.2}", snapshot.wallet.equity());
            println!("Unrealized P&L:   ${:.2}", snapshot.wallet.total_pnl());
            println!(
                "Open positions:   {} trading, {} investment",
                snapshot.wallet.trading.len(),
                snapshot.wallet.investments.len()
            );

            match &snapshot.plan {
                Some(plan) => {
                    println!("\n=== Plan ===");
                    println!("Capital:          ${:.2}", plan.capital);
                    println!("Buckets:          {}", plan.allocations.len());
                    println!("Created:          {}", plan.created_at.format("%Y-%m-%d"));

                    if !snapshot.progress.is_empty() {
                        println!("\n=== DCA Progress ===");
                        for alloc in &plan.allocations {
                            if let Some(p) = snapshot.progress.get(&alloc.symbol) {
                                println!(
                                    "  {:<10} {:>10.2} / {:<10.2} ({} weeks, {:+.1}%){}",
                                    alloc.symbol,
                                    p.total_invested,
                                    alloc.amount,
                                    p.weeks_passed,
                                    p.profit_percentage,
                                    if p.capital_withdrawn { " [withdrawn]" } else { "" }
                                );
                            }
                        }
                    }
                }
                None => println!("\nNo allocation plan. Run `cryptofolio plan` to create one."),
            }

            let curve = store.equity_curve(&session, 500).await?;
            if curve.len() >= 2 {
                let stats = stats::compute(&curve);
                println!("\n=== Equity ({} points) ===", curve.len());
                println!("Peak equity:      ${:.2}", stats.peak_equity);
                println!("Max drawdown:     {:.2}%", stats.max_drawdown * 100.0);
                println!("Tick volatility:  {:.4}%", stats.return_volatility * 100.0);
            }
        }

        Commands::Run { interval } => {
            let snapshot = load_or_default(&store, &session).await?;
            if snapshot.plan.is_none() && snapshot.wallet.trading.is_empty() {
                println!("Nothing to monitor. Create a plan or open a position first.");
                return Ok(());
            }

            let config = MonitorConfig {
                session: session.clone(),
                poll_interval_secs: interval,
            };

            println!("\n=== cryptofolio monitor ===");
            println!("Session:  {}", session);
            println!("Feed:     {}", feed.name());
            println!("Interval: {}s", interval);
            println!("\nPress Ctrl+C to stop.\n");

            let mut monitor = Monitor::new(config, store, feed);
            if let Err(e) = monitor.run().await {
                tracing::error!(error = %e, "Monitor error");
            }
        }
    }

    Ok(())
}

/// Load the session snapshot, or start a fresh one.
async fn load_or_default(store: &Arc<dyn SnapshotStore>, session: &str) -> Result<PortfolioSnapshot> {
    Ok(store.load(session).await?.unwrap_or_default())
}

/// One-shot price lookup: live quote, then the static fallback table.
async fn fetch_price(feed: &dyn PriceSource, symbol: &str) -> Result<Decimal> {
    let symbols = vec![symbol.to_uppercase()];

    match feed.fetch_prices(&symbols).await {
        Ok(quotes) => {
            if let Some(quote) = quotes.get(&symbols[0]) {
                return Ok(quote.price);
            }
        }
        Err(e) => warn!(error = %e, "Price feed unavailable, trying fallback table"),
    }

    fallback_quote(symbol)
        .map(|q| q.price)
        .ok_or_else(|| anyhow::anyhow!("No price available for {}", symbol.to_uppercase()))
}
