//! Price monitor: the polling loop driving position evaluation.
//!
//! Each tick fetches one price snapshot and evaluates every active
//! position and every DCA valuation against it, so all decisions in a
//! tick see the same prices. Feed failures degrade to last-known prices
//! (static fallback for symbols never quoted) and never halt the loop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::dca::DcaTracker;
use crate::feed::{fallback_quote, PriceSource, Quote};
use crate::store::{EquityPoint, SnapshotStore};
use crate::wallet::TickEvent;

/// Monitor configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Session key scoping which snapshot is evaluated
    pub session: String,

    /// Polling interval in seconds
    pub poll_interval_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            session: "default".to_string(),
            poll_interval_secs: 30,
        }
    }
}

/// The polling session runner.
pub struct Monitor {
    config: MonitorConfig,
    store: Arc<dyn SnapshotStore>,
    feed: Arc<dyn PriceSource>,
    tracker: DcaTracker,

    /// Last-known quotes, carried across ticks for feed-failure degrade
    last_prices: HashMap<String, Quote>,

    shutdown: Arc<AtomicBool>,
}

impl Monitor {
    pub fn new(
        config: MonitorConfig,
        store: Arc<dyn SnapshotStore>,
        feed: Arc<dyn PriceSource>,
    ) -> Self {
        Self {
            config,
            store,
            feed,
            tracker: DcaTracker::default(),
            last_prices: HashMap::new(),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get the shutdown flag for external control.
    pub fn shutdown_signal(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Main run loop. Stops on ctrl-c; a tick already in flight completes
    /// and saves before the loop exits.
    pub async fn run(&mut self) -> Result<()> {
        info!(
            session = %self.config.session,
            feed = self.feed.name(),
            poll_interval = self.config.poll_interval_secs,
            "Starting price monitor"
        );

        let mut poll_interval = interval(Duration::from_secs(self.config.poll_interval_secs));

        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown signal received");
            shutdown.store(true, Ordering::SeqCst);
        });

        while !self.shutdown.load(Ordering::SeqCst) {
            poll_interval.tick().await;

            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }

            if let Err(e) = self.tick().await {
                error!(error = %e, "Error in monitor tick");
                // Keep polling; a bad tick must not stop evaluation
            }
        }

        info!("Monitor stopped");
        Ok(())
    }

    /// One evaluation pass over the session snapshot.
    async fn tick(&mut self) -> Result<()> {
        debug!("Monitor tick");

        let Some(mut snapshot) = self.store.load(&self.config.session).await? else {
            debug!(session = %self.config.session, "No snapshot yet, nothing to evaluate");
            return Ok(());
        };

        let symbols = snapshot.symbol_universe();
        if symbols.is_empty() {
            return Ok(());
        }

        // 1. Refresh the price snapshot, degrading on feed failure
        match self.feed.fetch_prices(&symbols).await {
            Ok(quotes) => {
                debug!(count = quotes.len(), "Quotes refreshed");
                self.last_prices.extend(quotes);
            }
            Err(e) => {
                warn!(
                    feed = self.feed.name(),
                    error = %e,
                    "Price feed unavailable, continuing with last known prices"
                );
                for symbol in &symbols {
                    if !self.last_prices.contains_key(symbol) {
                        if let Some(quote) = fallback_quote(symbol) {
                            self.last_prices.insert(symbol.clone(), quote);
                        }
                    }
                }
            }
        }

        if self.last_prices.is_empty() {
            return Ok(());
        }

        // 2. Evaluate every position against the same snapshot
        let events = snapshot.wallet.apply_prices(&self.last_prices);
        for event in &events {
            match event {
                TickEvent::TakeProfit {
                    symbol,
                    gross_profit,
                    credited,
                    ..
                } => info!(
                    symbol = %symbol,
                    gross_profit = %gross_profit,
                    credited = %credited,
                    "Take profit executed"
                ),
                TickEvent::StopLoss {
                    symbol, credited, ..
                } => warn!(symbol = %symbol, credited = %credited, "Stop loss executed"),
                TickEvent::InvestmentTarget { symbol, .. } => {
                    info!(symbol = %symbol, "Investment position reached its target")
                }
            }
        }

        // 3. Informational DCA valuations, same snapshot
        self.tracker
            .refresh_valuations(&mut snapshot.progress, &self.last_prices);

        // 4. Persist
        snapshot.updated_at = Some(Utc::now());
        self.store.save(&self.config.session, &snapshot).await?;

        self.store
            .record_equity_point(
                &self.config.session,
                &EquityPoint {
                    timestamp: Utc::now(),
                    wallet_balance: snapshot.wallet.balance,
                    positions_value: snapshot.wallet.positions_value(),
                    equity: snapshot.wallet.equity(),
                },
            )
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{FeedError, StaticPriceFeed};
    use crate::models::{AllocationType, PortfolioSnapshot, PositionStatus};
    use crate::store::SqliteStore;
    use crate::wallet::OpenPositionRequest;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    struct FailingFeed;

    #[async_trait]
    impl PriceSource for FailingFeed {
        async fn fetch_prices(
            &self,
            _symbols: &[String],
        ) -> std::result::Result<HashMap<String, Quote>, FeedError> {
            Err(FeedError::Status(503))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    async fn seeded_store() -> Arc<SqliteStore> {
        let store = Arc::new(SqliteStore::new("sqlite::memory:").await.unwrap());

        let mut snapshot = PortfolioSnapshot::default();
        snapshot.wallet.deposit(dec!(10000)).unwrap();
        snapshot
            .wallet
            .open_position(OpenPositionRequest {
                symbol: "BTC".to_string(),
                entry_price: dec!(100),
                take_profit: dec!(150),
                stop_loss: dec!(90),
                allocation_type: AllocationType::Btc,
            })
            .unwrap();

        store.save("default", &snapshot).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_tick_evaluates_and_persists() {
        let store = seeded_store().await;
        let mut monitor = Monitor::new(
            MonitorConfig::default(),
            store.clone(),
            Arc::new(StaticPriceFeed),
        );

        // Static feed quotes BTC at 43500, far above the take profit
        monitor.tick().await.unwrap();

        let snapshot = store.load("default").await.unwrap().unwrap();
        assert_eq!(
            snapshot.wallet.trading[0].status,
            PositionStatus::TakeProfitHit
        );
        assert_eq!(snapshot.wallet.investments.len(), 1);

        let curve = store.equity_curve("default", 10).await.unwrap();
        assert_eq!(curve.len(), 1);
    }

    #[tokio::test]
    async fn test_tick_degrades_to_fallback_on_feed_failure() {
        let store = seeded_store().await;
        let mut monitor = Monitor::new(
            MonitorConfig::default(),
            store.clone(),
            Arc::new(FailingFeed),
        );

        // Feed is down: the fallback table still quotes BTC at 43500
        monitor.tick().await.unwrap();

        let snapshot = store.load("default").await.unwrap().unwrap();
        assert_eq!(
            snapshot.wallet.trading[0].status,
            PositionStatus::TakeProfitHit
        );
    }

    #[tokio::test]
    async fn test_tick_without_snapshot_is_noop() {
        let store = Arc::new(SqliteStore::new("sqlite::memory:").await.unwrap());
        let mut monitor =
            Monitor::new(MonitorConfig::default(), store.clone(), Arc::new(StaticPriceFeed));

        monitor.tick().await.unwrap();
        assert!(store.load("default").await.unwrap().is_none());
    }
}
