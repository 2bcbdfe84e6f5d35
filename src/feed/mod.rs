//! Price feed adapters: live quotes normalized to a uniform map.

mod http;

pub use http::HttpPriceFeed;

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Static fallback quotes, used when a symbol has never been quoted live.
/// One table, one place.
pub const FALLBACK_PRICES: [(&str, Decimal); 8] = [
    ("BTC", dec!(43500)),
    ("ETH", dec!(2650)),
    ("SOL", dec!(98)),
    ("CORE", dec!(1.25)),
    ("ADA", dec!(0.52)),
    ("DOT", dec!(7.85)),
    ("LINK", dec!(15.40)),
    ("UNI", dec!(6.80)),
];

/// A normalized quote for one token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    /// Spot price in USD
    pub price: Decimal,

    /// 24-hour change in percent
    pub change_24h: Decimal,
}

impl Quote {
    pub fn new(price: Decimal, change_24h: Decimal) -> Self {
        Self { price, change_24h }
    }
}

/// Errors from a price source. Transient by nature: the polling loop
/// degrades to last-known prices and keeps going.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("feed returned status {0}")]
    Status(u16),

    #[error("malformed feed response: {0}")]
    Malformed(String),
}

/// A source of live quotes.
///
/// Implementations own their retry policy; callers never retry.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Fetch quotes for the given symbols. Symbols the source does not
    /// know are simply absent from the result; an error means the source
    /// itself was unreachable.
    async fn fetch_prices(&self, symbols: &[String]) -> Result<HashMap<String, Quote>, FeedError>;

    /// Source name, for logging.
    fn name(&self) -> &str;
}

/// Fallback quote for a symbol, if the static table knows it.
pub fn fallback_quote(symbol: &str) -> Option<Quote> {
    let symbol = symbol.to_uppercase();
    FALLBACK_PRICES
        .iter()
        .find(|(s, _)| *s == symbol)
        .map(|(_, price)| Quote::new(*price, Decimal::ZERO))
}

/// Price source serving the static fallback table. Used for offline/demo
/// mode and in tests.
pub struct StaticPriceFeed;

#[async_trait]
impl PriceSource for StaticPriceFeed {
    async fn fetch_prices(&self, symbols: &[String]) -> Result<HashMap<String, Quote>, FeedError> {
        Ok(symbols
            .iter()
            .filter_map(|s| fallback_quote(s).map(|q| (s.to_uppercase(), q)))
            .collect())
    }

    fn name(&self) -> &str {
        "static"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_feed_serves_known_symbols() {
        let feed = StaticPriceFeed;
        let quotes = feed
            .fetch_prices(&["BTC".to_string(), "ETH".to_string()])
            .await
            .unwrap();

        assert_eq!(quotes["BTC"].price, dec!(43500));
        assert_eq!(quotes["ETH"].price, dec!(2650));
    }

    #[tokio::test]
    async fn test_static_feed_omits_unknown_symbols() {
        let feed = StaticPriceFeed;
        let quotes = feed
            .fetch_prices(&["BTC".to_string(), "NOTREAL".to_string()])
            .await
            .unwrap();

        assert_eq!(quotes.len(), 1);
        assert!(!quotes.contains_key("NOTREAL"));
    }

    #[test]
    fn test_fallback_quote_lookup() {
        assert_eq!(fallback_quote("uni").unwrap().price, dec!(6.80));
        assert!(fallback_quote("DOGE").is_none());
    }
}
