use chrono::{DateTime, TimeZone, Utc};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::models::{Candle, SymbolRules};

const BINANCE_API_BASE: &str = "https://api.binance.com";
const RATE_LIMIT_RPM: u32 = 600; // well under the 1200 weight/minute public limit
const MAX_RETRIES: u32 = 3;
const KLINES_PAGE_LIMIT: usize = 1000;

type BinanceRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Binance public REST client
///
/// Cloneable; clones share the rate limiter and the symbol rules cache.
#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
    retry_backoff: Duration,
    rules_cache: Arc<RwLock<HashMap<String, SymbolRules>>>,
    rate_limiter: Arc<BinanceRateLimiter>,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
struct SymbolInfo {
    symbol: String,
    filters: Vec<SymbolFilter>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolFilter {
    filter_type: String,
    step_size: Option<String>,
    min_notional: Option<String>,
}

impl BinanceClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url(BINANCE_API_BASE)
    }

    /// Client against another host (testnet, mirrors, mock servers)
    pub fn with_base_url(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        let quota = Quota::per_minute(NonZeroU32::new(RATE_LIMIT_RPM).unwrap_or(NonZeroU32::MIN));

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry_backoff: Duration::from_secs(1),
            rules_cache: Arc::new(RwLock::new(HashMap::new())),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    /// Base delay for retries; attempt `n` waits `base * 2^n`
    pub fn with_retry_backoff(mut self, base: Duration) -> Self {
        self.retry_backoff = base;
        self
    }

    /// Rate-limited GET with retry on 429 and 5xx
    async fn make_request(&self, path: &str, query: &[(&str, String)]) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);

        for attempt in 1..=MAX_RETRIES {
            self.rate_limiter.until_ready().await;
            let backoff = self.retry_backoff * 2u32.pow(attempt);

            match self.client.get(&url).query(query).send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return Ok(response);
                    }

                    if (status.as_u16() == 429 || status.is_server_error()) && attempt < MAX_RETRIES {
                        tracing::warn!(
                            "Binance returned {}, retrying in {:?} (attempt {}/{})",
                            status,
                            backoff,
                            attempt,
                            MAX_RETRIES
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }

                    let error_text = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());
                    return Err(Error::Api(format!("{} from {}: {}", status, path, error_text)));
                }
                Err(e) if attempt < MAX_RETRIES => {
                    tracing::warn!(
                        "Network error: {}, retrying in {:?} (attempt {}/{})",
                        e,
                        backoff,
                        attempt,
                        MAX_RETRIES
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(Error::Http(e)),
            }
        }

        Err(Error::Api(format!("{} failed after {} retries", path, MAX_RETRIES)))
    }

    /// Lot step size and minimum notional for `symbol`, cached per client
    pub async fn symbol_rules(&self, symbol: &str) -> Result<SymbolRules> {
        let symbol = symbol.to_uppercase();
        if let Some(rules) = self.rules_cache.read().await.get(&symbol) {
            tracing::debug!("Symbol rules for {} served from cache", symbol);
            return Ok(*rules);
        }

        let response = self
            .make_request("/api/v3/exchangeInfo", &[("symbol", symbol.clone())])
            .await?;
        let info: ExchangeInfo = response.json().await?;

        let entry = info
            .symbols
            .into_iter()
            .find(|s| s.symbol == symbol)
            .ok_or_else(|| Error::Api(format!("symbol {} not in exchange info", symbol)))?;
        let rules = parse_rules(&symbol, &entry.filters)?;

        tracing::info!(
            "Symbol rules for {}: step {}, min notional {}",
            symbol,
            rules.step_size,
            rules.min_notional
        );
        self.rules_cache.write().await.insert(symbol, rules);
        Ok(rules)
    }

    /// Download candles with open time in `[start, end]`, following pagination
    pub async fn klines(
        &self,
        symbol: &str,
        interval: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        let symbol = symbol.to_uppercase();
        let end_ms = end.timestamp_millis();
        let mut cursor = start.timestamp_millis();
        let mut candles = Vec::new();

        while cursor <= end_ms {
            let query = [
                ("symbol", symbol.clone()),
                ("interval", interval.to_string()),
                ("startTime", cursor.to_string()),
                ("endTime", end_ms.to_string()),
                ("limit", KLINES_PAGE_LIMIT.to_string()),
            ];
            let rows: Vec<Vec<Value>> = self.make_request("/api/v3/klines", &query).await?.json().await?;
            let page_len = rows.len();

            for row in &rows {
                candles.push(parse_kline(row)?);
            }

            let Some(last) = candles.last() else { break };
            tracing::debug!("Fetched {} {} klines up to {}", page_len, symbol, last.timestamp);
            if page_len < KLINES_PAGE_LIMIT {
                break;
            }
            cursor = last.timestamp.timestamp_millis() + 1;
        }

        tracing::info!("Downloaded {} {} {} candles", candles.len(), symbol, interval);
        Ok(candles)
    }
}

fn parse_decimal_str(value: Option<&String>, what: &str, symbol: &str) -> Result<Option<f64>> {
    value
        .map(|raw| {
            raw.parse::<f64>()
                .map_err(|_| Error::Api(format!("bad {} {:?} for {}", what, raw, symbol)))
        })
        .transpose()
}

fn parse_rules(symbol: &str, filters: &[SymbolFilter]) -> Result<SymbolRules> {
    let step_size = filters
        .iter()
        .find(|f| f.filter_type == "LOT_SIZE")
        .map(|f| parse_decimal_str(f.step_size.as_ref(), "stepSize", symbol))
        .transpose()?
        .flatten()
        .ok_or_else(|| Error::Api(format!("no LOT_SIZE filter for {}", symbol)))?;

    // spot symbols carry NOTIONAL, older listings MIN_NOTIONAL
    let min_notional = filters
        .iter()
        .find(|f| f.filter_type == "NOTIONAL" || f.filter_type == "MIN_NOTIONAL")
        .map(|f| parse_decimal_str(f.min_notional.as_ref(), "minNotional", symbol))
        .transpose()?
        .flatten();

    let min_notional = match min_notional {
        Some(v) => v,
        None => {
            tracing::warn!("No notional filter for {}, assuming 0", symbol);
            0.0
        }
    };

    Ok(SymbolRules {
        step_size,
        min_notional,
    })
}

/// `[open_time, open, high, low, close, volume, close_time, ...]`
fn parse_kline(row: &[Value]) -> Result<Candle> {
    let price = |idx: usize| -> Result<f64> {
        row.get(idx)
            .and_then(|v| match v {
                Value::String(s) => s.parse::<f64>().ok(),
                other => other.as_f64(),
            })
            .ok_or_else(|| Error::Api(format!("malformed kline field {} in {:?}", idx, row)))
    };

    let open_time = row
        .first()
        .and_then(Value::as_i64)
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .ok_or_else(|| Error::Api(format!("malformed kline open time in {:?}", row)))?;

    Ok(Candle {
        timestamp: open_time,
        open: price(1)?,
        high: price(2)?,
        low: price(3)?,
        close: price(4)?,
        volume: price(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    const EXCHANGE_INFO: &str = r#"{
        "timezone": "UTC",
        "symbols": [{
            "symbol": "BTCUSDT",
            "status": "TRADING",
            "filters": [
                {"filterType": "PRICE_FILTER", "minPrice": "0.01", "tickSize": "0.01"},
                {"filterType": "LOT_SIZE", "minQty": "0.00001", "maxQty": "9000", "stepSize": "0.00001000"},
                {"filterType": "NOTIONAL", "minNotional": "5.00000000", "applyMinToMarket": true}
            ]
        }]
    }"#;

    fn kline(open_ms: i64, close: &str) -> String {
        format!(
            r#"[{}, "100.0", "101.5", "99.5", "{}", "12.5", {}, "1250.0", 10, "6.0", "600.0", "0"]"#,
            open_ms,
            close,
            open_ms + 59_999
        )
    }

    #[tokio::test]
    async fn test_symbol_rules_parsed_and_cached() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v3/exchangeInfo")
            .match_query(Matcher::UrlEncoded("symbol".into(), "BTCUSDT".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(EXCHANGE_INFO)
            .expect(1)
            .create_async()
            .await;

        let client = BinanceClient::with_base_url(&server.url()).unwrap();
        let rules = client.symbol_rules("btcusdt").await.unwrap();
        assert_eq!(rules.step_size, 0.00001);
        assert_eq!(rules.min_notional, 5.0);

        // second lookup comes from the cache
        assert_eq!(client.symbol_rules("BTCUSDT").await.unwrap(), rules);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_legacy_min_notional_filter() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v3/exchangeInfo")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"symbols": [{"symbol": "ETHBTC", "filters": [
                    {"filterType": "MIN_NOTIONAL", "minNotional": "0.0001"},
                    {"filterType": "LOT_SIZE", "stepSize": "0.0001"}
                ]}]}"#,
            )
            .create_async()
            .await;

        let client = BinanceClient::with_base_url(&server.url()).unwrap();
        let rules = client.symbol_rules("ETHBTC").await.unwrap();
        assert_eq!(rules.step_size, 0.0001);
        assert_eq!(rules.min_notional, 0.0001);
    }

    #[tokio::test]
    async fn test_missing_lot_size_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v3/exchangeInfo")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"symbols": [{"symbol": "XYZUSDT", "filters": []}]}"#)
            .create_async()
            .await;

        let client = BinanceClient::with_base_url(&server.url()).unwrap();
        assert!(matches!(
            client.symbol_rules("XYZUSDT").await,
            Err(Error::Api(_))
        ));
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v3/exchangeInfo")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(r#"{"code": -1121, "msg": "Invalid symbol."}"#)
            .expect(1)
            .create_async()
            .await;

        let client = BinanceClient::with_base_url(&server.url()).unwrap();
        match client.symbol_rules("NOPE").await {
            Err(Error::Api(msg)) => assert!(msg.contains("Invalid symbol")),
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v3/exchangeInfo")
            .match_query(Matcher::Any)
            .with_status(503)
            .expect(MAX_RETRIES as usize)
            .create_async()
            .await;

        let client = BinanceClient::with_base_url(&server.url())
            .unwrap()
            .with_retry_backoff(Duration::from_millis(1));
        assert!(client.symbol_rules("BTCUSDT").await.is_err());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_klines_single_page() {
        let mut server = mockito::Server::new_async().await;
        let body = format!(
            "[{}, {}]",
            kline(1_704_067_200_000, "100.5"),
            kline(1_704_067_260_000, "101.0")
        );
        server
            .mock("GET", "/api/v3/klines")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("symbol".into(), "BTCUSDT".into()),
                Matcher::UrlEncoded("interval".into(), "1m".into()),
                Matcher::UrlEncoded("startTime".into(), "1704067200000".into()),
            ]))
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let client = BinanceClient::with_base_url(&server.url()).unwrap();
        let start = Utc.timestamp_millis_opt(1_704_067_200_000).unwrap();
        let end = Utc.timestamp_millis_opt(1_704_067_300_000).unwrap();
        let candles = client.klines("BTCUSDT", "1m", start, end).await.unwrap();

        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].timestamp, start);
        assert_eq!(candles[0].high, 101.5);
        assert_eq!(candles[1].close, 101.0);
        assert_eq!(candles[1].volume, 12.5);
    }

    #[test]
    fn test_parse_kline_rejects_short_rows() {
        let row: Vec<Value> = serde_json::from_str(r#"[1704067200000, "1", "2"]"#).unwrap();
        assert!(parse_kline(&row).is_err());
    }
}
