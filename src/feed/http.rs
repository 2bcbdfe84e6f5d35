//! HTTP price feed backed by a Binance-style 24h ticker endpoint.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use backoff::ExponentialBackoff;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{FeedError, PriceSource, Quote};

const DEFAULT_BASE_URL: &str = "https://api.binance.com";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Retry budget for one symbol; past this the symbol is reported failed.
const MAX_RETRY_ELAPSED: Duration = Duration::from_secs(15);

/// Trading pairs the feed can quote, keyed by token symbol. Symbols not
/// listed here are skipped, not errored.
const SYMBOL_PAIRS: [(&str, &str); 8] = [
    ("BTC", "BTCUSDT"),
    ("ETH", "ETHUSDT"),
    ("SOL", "SOLUSDT"),
    ("CORE", "COREUSDT"),
    ("ADA", "ADAUSDT"),
    ("DOT", "DOTUSDT"),
    ("LINK", "LINKUSDT"),
    ("UNI", "UNIUSDT"),
];

/// 24h ticker payload; prices arrive as decimal strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TickerResponse {
    last_price: Decimal,
    price_change_percent: Decimal,
}

/// Live price feed over HTTP with bounded exponential retry.
pub struct HttpPriceFeed {
    client: Client,
    base_url: String,
}

impl HttpPriceFeed {
    /// Create a feed against the default endpoint.
    pub fn new() -> Result<Self, FeedError> {
        Self::with_base_url(DEFAULT_BASE_URL.to_string())
    }

    /// Create with a custom base URL (env override, tests).
    pub fn with_base_url(base_url: String) -> Result<Self, FeedError> {
        let client = Client::builder().timeout(DEFAULT_TIMEOUT).build()?;

        Ok(Self { client, base_url })
    }

    /// Create from the environment: `CRYPTOFOLIO_FEED_URL` overrides the
    /// default endpoint.
    pub fn from_env() -> Result<Self, FeedError> {
        let base_url =
            std::env::var("CRYPTOFOLIO_FEED_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::with_base_url(base_url)
    }

    fn pair_for(symbol: &str) -> Option<&'static str> {
        let symbol = symbol.to_uppercase();
        SYMBOL_PAIRS
            .iter()
            .find(|(s, _)| *s == symbol)
            .map(|(_, pair)| *pair)
    }

    /// Fetch one trading pair, retrying transient failures with backoff.
    async fn fetch_one(&self, pair: &str) -> Result<Quote, FeedError> {
        let url = format!("{}/api/v3/ticker/24hr?symbol={}", self.base_url, pair);
        debug!(url = %url, "Fetching ticker");

        let policy = ExponentialBackoff {
            max_elapsed_time: Some(MAX_RETRY_ELAPSED),
            ..ExponentialBackoff::default()
        };

        let ticker: TickerResponse = backoff::future::retry(policy, || async {
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| backoff::Error::transient(FeedError::Transport(e)))?;

            let status = response.status();
            if status.is_server_error() {
                return Err(backoff::Error::transient(FeedError::Status(status.as_u16())));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(FeedError::Status(status.as_u16())));
            }

            response
                .json::<TickerResponse>()
                .await
                .map_err(|e| backoff::Error::permanent(FeedError::Transport(e)))
        })
        .await?;

        Ok(Quote::new(ticker.last_price, ticker.price_change_percent))
    }
}

#[async_trait]
impl PriceSource for HttpPriceFeed {
    async fn fetch_prices(&self, symbols: &[String]) -> Result<HashMap<String, Quote>, FeedError> {
        let known: Vec<(String, &'static str)> = symbols
            .iter()
            .filter_map(|s| Self::pair_for(s).map(|pair| (s.to_uppercase(), pair)))
            .collect();

        let requests = known.iter().map(|(_, pair)| self.fetch_one(pair));
        let results = futures::future::join_all(requests).await;

        let mut quotes = HashMap::new();
        let mut first_error = None;

        for ((symbol, _), result) in known.into_iter().zip(results) {
            match result {
                Ok(quote) => {
                    quotes.insert(symbol, quote);
                }
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "Ticker unavailable");
                    first_error.get_or_insert(e);
                }
            }
        }

        // Best effort: partial results are fine, a fully empty fetch is not.
        if quotes.is_empty() {
            if let Some(e) = first_error {
                return Err(e);
            }
        }

        Ok(quotes)
    }

    fn name(&self) -> &str {
        "binance"
    }
}
