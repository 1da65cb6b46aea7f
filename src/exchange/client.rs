// =============================================================================
// Exchange Client — read-only public HTTP access (C1)
// =============================================================================
//
// No API key, no signing: every endpoint here is public market data. Rate
// limit discipline is the operative concern — a bounded concurrency window,
// a minimum inter-request spacing, and bounded exponential-backoff retries
// for 5xx/timeouts, honoring `Retry-After` on 429.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tracing::{debug, instrument, warn};

use crate::candle::Candle;
use crate::error::EngineError;

const MAX_CONCURRENT_REQUESTS: usize = 10;
const MIN_REQUEST_SPACING: Duration = Duration::from_millis(50);
const MAX_RETRIES: u32 = 3;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A tradeable symbol above the configured volume floor.
#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub symbol: String,
    pub quote_volume_24h: f64,
}

/// Read-only exchange client. Cheap to clone — the inner HTTP client and
/// concurrency primitives are all `Arc`-shared.
#[derive(Clone)]
pub struct ExchangeClient {
    base_url: String,
    http: reqwest::Client,
    semaphore: Arc<Semaphore>,
    last_request_at: Arc<Mutex<Option<Instant>>>,
    rate_limit: Arc<super::rate_limit::RateLimitTracker>,
}

impl ExchangeClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to build reqwest client");

        Self {
            base_url: base_url.into(),
            http,
            semaphore: Arc::new(Semaphore::new(MAX_CONCURRENT_REQUESTS)),
            last_request_at: Arc::new(Mutex::new(None)),
            rate_limit: Arc::new(super::rate_limit::RateLimitTracker::new()),
        }
    }

    pub fn rate_limit_snapshot(&self) -> super::rate_limit::RateLimitSnapshot {
        self.rate_limit.snapshot()
    }

    /// Acquire a concurrency permit and enforce the minimum inter-request
    /// spacing before returning it to the caller.
    async fn throttle(&self) -> tokio::sync::SemaphorePermit<'_> {
        let permit = self
            .semaphore
            .acquire()
            .await
            .expect("semaphore is never closed");

        let wait = {
            let mut last = self.last_request_at.lock();
            let wait = last
                .map(|t| MIN_REQUEST_SPACING.saturating_sub(t.elapsed()))
                .unwrap_or_default();
            *last = Some(Instant::now());
            wait
        };

        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }

        permit
    }

    /// GET `path` with retries, honoring `Retry-After` on 429 and backing off
    /// exponentially on 5xx/timeouts.
    #[instrument(skip(self), fields(path = %path))]
    async fn get_with_retry(&self, path: &str) -> Result<serde_json::Value, EngineError> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempt = 0;

        loop {
            let _permit = self.throttle().await;
            let started = Instant::now();

            let result = self.http.get(&url).send().await;

            match result {
                Ok(resp) => {
                    self.rate_limit.update_from_headers(resp.headers());
                    let status = resp.status();

                    if status.as_u16() == 429 {
                        let retry_after = resp
                            .headers()
                            .get("Retry-After")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|s| s.parse::<u64>().ok())
                            .unwrap_or(1);

                        if attempt >= MAX_RETRIES {
                            warn!(path, attempt, retry_after, "rate limit retries exhausted");
                            return Err(EngineError::RateLimit {
                                retry_after_secs: retry_after,
                            });
                        }

                        warn!(path, attempt, retry_after, "rate limited, honoring retry-after");
                        tokio::time::sleep(Duration::from_secs(retry_after)).await;
                        attempt += 1;
                        continue;
                    }

                    if status.is_server_error() {
                        if attempt >= MAX_RETRIES {
                            warn!(path, attempt, %status, "exchange 5xx retries exhausted");
                            return Err(EngineError::Exchange {
                                status: status.as_u16(),
                                message: format!("server error after {attempt} retries"),
                            });
                        }
                        let backoff = Duration::from_millis(200 * 2u64.pow(attempt));
                        debug!(path, attempt, %status, ?backoff, "retrying after server error");
                        tokio::time::sleep(backoff).await;
                        attempt += 1;
                        continue;
                    }

                    if !status.is_success() {
                        let body = resp.text().await.unwrap_or_default();
                        return Err(EngineError::Exchange {
                            status: status.as_u16(),
                            message: body,
                        });
                    }

                    let elapsed = started.elapsed();
                    debug!(path, attempt, ?elapsed, "request succeeded");

                    return resp.json().await.map_err(|e| EngineError::Exchange {
                        status: status.as_u16(),
                        message: format!("failed to parse response body: {e}"),
                    });
                }
                Err(e) => {
                    if attempt >= MAX_RETRIES {
                        warn!(path, attempt, error = %e, "request retries exhausted");
                        return Err(EngineError::Exchange {
                            status: 0,
                            message: e.to_string(),
                        });
                    }
                    let backoff = Duration::from_millis(200 * 2u64.pow(attempt));
                    debug!(path, attempt, error = %e, ?backoff, "retrying after transport error");
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Symbols quoted in USDT, trading-enabled, spot-allowed, 24h quote
    /// volume at or above `min_quote_volume`, sorted descending by volume.
    #[instrument(skip(self))]
    pub async fn list_active_symbols(
        &self,
        min_quote_volume: f64,
    ) -> Result<Vec<Symbol>, EngineError> {
        let tickers = self.get_with_retry("/api/v3/ticker/24hr").await?;
        let exchange_info = self.get_with_retry("/api/v3/exchangeInfo").await?;

        let tradeable: std::collections::HashSet<String> = exchange_info["symbols"]
            .as_array()
            .into_iter()
            .flatten()
            .filter(|s| {
                s["status"].as_str() == Some("TRADING")
                    && s["quoteAsset"].as_str() == Some("USDT")
                    && s["isSpotTradingAllowed"].as_bool().unwrap_or(false)
            })
            .filter_map(|s| s["symbol"].as_str().map(String::from))
            .collect();

        let mut symbols: Vec<Symbol> = tickers
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|t| {
                let symbol = t["symbol"].as_str()?.to_string();
                if !tradeable.contains(&symbol) {
                    return None;
                }
                let quote_volume_24h: f64 = t["quoteVolume"].as_str()?.parse().ok()?;
                if quote_volume_24h < min_quote_volume {
                    return None;
                }
                Some(Symbol {
                    symbol,
                    quote_volume_24h,
                })
            })
            .collect();

        symbols.sort_by(|a, b| {
            b.quote_volume_24h
                .partial_cmp(&a.quote_volume_24h)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        debug!(count = symbols.len(), "active symbols listed");
        Ok(symbols)
    }

    /// The most recent `limit` candles, ascending by open time.
    #[instrument(skip(self))]
    pub async fn fetch_candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<Candle>, EngineError> {
        let path = format!(
            "/api/v3/klines?symbol={symbol}&interval={interval}&limit={limit}"
        );
        let body = self.get_with_retry(&path).await?;
        parse_klines(&body)
    }

    /// Fan out `fetch_candles` across `symbols`; individual failures are
    /// logged and omitted from the result map rather than aborting the
    /// whole batch.
    #[instrument(skip(self, symbols))]
    pub async fn fetch_candle_batch(
        &self,
        symbols: &[String],
        interval: &str,
        limit: u32,
    ) -> HashMap<String, Vec<Candle>> {
        let handles: Vec<_> = symbols
            .iter()
            .map(|symbol| {
                let client = self.clone();
                let symbol = symbol.clone();
                let interval = interval.to_string();
                tokio::spawn(async move {
                    match client.fetch_candles(&symbol, &interval, limit).await {
                        Ok(candles) => Some((symbol, candles)),
                        Err(e) => {
                            warn!(symbol, error = %e, "dropping symbol from batch fetch");
                            None
                        }
                    }
                })
            })
            .collect();

        let mut out = HashMap::with_capacity(handles.len());
        for handle in handles {
            if let Ok(Some((symbol, candles))) = handle.await {
                out.insert(symbol, candles);
            }
        }
        out
    }

    /// Paginate backwards from `end` until `start` is covered. Used only by
    /// the backtest engine.
    #[instrument(skip(self))]
    pub async fn fetch_historical_candles(
        &self,
        symbol: &str,
        interval: &str,
        start: i64,
        end: i64,
    ) -> Result<Vec<Candle>, EngineError> {
        const PAGE_SIZE: u32 = 1000;
        let mut all = Vec::new();
        let mut cursor_end = end;

        loop {
            let path = format!(
                "/api/v3/klines?symbol={symbol}&interval={interval}&limit={PAGE_SIZE}&startTime={start}&endTime={cursor_end}"
            );
            let body = self.get_with_retry(&path).await?;
            let page = parse_klines(&body)?;

            if page.is_empty() {
                break;
            }

            let earliest = page[0].open_time;
            all.splice(0..0, page);

            if earliest <= start || all.len() as u32 >= PAGE_SIZE.saturating_mul(50) {
                break;
            }
            cursor_end = earliest - 1;
        }

        all.retain(|c| c.open_time >= start && c.open_time <= end);
        Ok(all)
    }
}

fn parse_str_f64(val: &serde_json::Value) -> Result<f64, EngineError> {
    if let Some(s) = val.as_str() {
        s.parse::<f64>().map_err(|e| EngineError::Exchange {
            status: 0,
            message: format!("failed to parse '{s}' as f64: {e}"),
        })
    } else if let Some(n) = val.as_f64() {
        Ok(n)
    } else {
        Err(EngineError::Exchange {
            status: 0,
            message: format!("expected string or number, got: {val}"),
        })
    }
}

fn parse_klines(body: &serde_json::Value) -> Result<Vec<Candle>, EngineError> {
    let raw = body.as_array().ok_or_else(|| EngineError::Exchange {
        status: 0,
        message: "klines response is not an array".to_string(),
    })?;

    let mut candles = Vec::with_capacity(raw.len());

    for entry in raw {
        let Some(arr) = entry.as_array() else {
            continue;
        };
        if arr.len() < 9 {
            warn!(len = arr.len(), "skipping malformed kline entry");
            continue;
        }

        let open_time = arr[0].as_i64().unwrap_or(0);
        let open = parse_str_f64(&arr[1])?;
        let high = parse_str_f64(&arr[2])?;
        let low = parse_str_f64(&arr[3])?;
        let close = parse_str_f64(&arr[4])?;
        let volume = parse_str_f64(&arr[5])?;
        let close_time = arr[6].as_i64().unwrap_or(0);
        let quote_volume = parse_str_f64(&arr[7])?;
        let trades_count = arr[8].as_u64().unwrap_or(0);

        candles.push(Candle::new(
            open_time,
            open,
            high,
            low,
            close,
            volume,
            close_time,
            quote_volume,
            trades_count,
        ));
    }

    Ok(candles)
}

impl std::fmt::Debug for ExchangeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_klines_skips_malformed_entries() {
        let body = serde_json::json!([
            [1, "1", "2", "0.5", "1.5", "10", 2, "15", 3],
            [1, "1", "2"],
        ]);
        let candles = parse_klines(&body).unwrap();
        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].trades_count, 3);
    }

    #[test]
    fn parse_klines_handles_numeric_and_string_fields() {
        let body = serde_json::json!([[100, 1.0, 2.0, 0.5, 1.5, 10.0, 200, 15.0, 5]]);
        let candles = parse_klines(&body).unwrap();
        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].open_time, 100);
        assert!((candles[0].quote_volume - 15.0).abs() < 1e-9);
    }

    #[test]
    fn parse_klines_rejects_non_array_body() {
        let body = serde_json::json!({ "error": "bad request" });
        assert!(parse_klines(&body).is_err());
    }
}
