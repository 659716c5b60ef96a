use crate::config::ClientConfig;
use crate::data_structures::{
    Interval, OptionChain, OptionContract, OptionKind, OptionTable, PriceBar, PriceHistory,
};
use crate::utils::{to_unix_midnight, unix_to_exchange_date, unix_to_utc_date, Timer};
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{Client, Response, Url};
use serde_json::Value;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Earliest `period1` accepted by the chart endpoint when no start date is given.
pub const EARLIEST_PERIOD: i64 = 7_223_400;

#[derive(Debug, Error)]
pub enum YahooError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status} from {url}")]
    HttpStatus { status: u16, url: String },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid ticker '{0}'")]
    InvalidTicker(String),
    #[error("invalid interval '{0}', expected one of 1d, 1wk, 1mo")]
    InvalidInterval(String),
    #[error("invalid date '{0}'")]
    InvalidDate(String),
    #[error("end date {end} must be after start date {start}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("provider error {code}: {description}")]
    Provider { code: String, description: String },
    #[error("could not obtain crumb: {0}")]
    Crumb(String),
    #[error("no options expire on {0}")]
    ExpirationNotFound(NaiveDate),
    #[error("no data returned")]
    NoData,
    #[error("max retries exceeded for {0}")]
    MaxRetries(String),
}

pub fn parse_interval(value: &str) -> Result<Interval, YahooError> {
    value.parse::<Interval>().map_err(YahooError::InvalidInterval)
}

pub struct YahooClient {
    client: Client,
    query_base_url: String,
    cookie_url: String,
    rate_limit_per_minute: u32,
    max_retries: u32,
    request_timestamps: VecDeque<Instant>,
    user_agents: Vec<String>,
    random_agent: bool,
    crumb: Option<String>,
}

impl YahooClient {
    pub fn new(config: &ClientConfig) -> Result<Self, YahooError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .cookie_store(true)
            .gzip(true)
            .build()?;

        let user_agents = vec![
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:120.0) Gecko/20100101 Firefox/120.0".to_string(),
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.3 Safari/605.1.15".to_string(),
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0".to_string(),
        ];

        Ok(YahooClient {
            client,
            query_base_url: config.query_base_url.trim_end_matches('/').to_string(),
            cookie_url: config.cookie_url.clone(),
            rate_limit_per_minute: config.rate_limit_per_minute,
            max_retries: config.max_retries.max(1),
            request_timestamps: VecDeque::new(),
            user_agents,
            random_agent: config.random_agent,
            crumb: None,
        })
    }

    fn get_user_agent(&self) -> String {
        if self.random_agent {
            use rand::seq::IndexedRandom;
            self.user_agents
                .choose(&mut rand::rng())
                .unwrap_or(&self.user_agents[0])
                .clone()
        } else {
            self.user_agents[0].clone()
        }
    }

    async fn enforce_rate_limit(&mut self) {
        // 0 disables the limiter
        if self.rate_limit_per_minute == 0 {
            return;
        }
        let window = Duration::from_secs(60);
        let now = Instant::now();

        while let Some(&oldest) = self.request_timestamps.front() {
            if now.duration_since(oldest) >= window {
                self.request_timestamps.pop_front();
            } else {
                break;
            }
        }

        if self.request_timestamps.len() >= self.rate_limit_per_minute as usize {
            if let Some(&oldest) = self.request_timestamps.front() {
                let wait_time = window.saturating_sub(now.duration_since(oldest));
                if !wait_time.is_zero() {
                    debug!("Rate limit reached, waiting {:?}", wait_time);
                    sleep(wait_time + Duration::from_millis(100)).await;
                }
            }
            self.request_timestamps.pop_front();
        }

        self.request_timestamps.push_back(Instant::now());
    }

    /// Build `{query_base_url}/{prefix}/{ticker}` with the ticker percent-encoded
    fn endpoint(&self, prefix: &str, ticker: &str) -> Result<Url, YahooError> {
        let mut url = Url::parse(&format!("{}/{}", self.query_base_url, prefix))
            .map_err(|e| YahooError::InvalidResponse(format!("bad base url: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| YahooError::InvalidResponse("base url cannot be a base".to_string()))?
            .pop_if_empty()
            .push(ticker);
        Ok(url)
    }

    async fn send_with_retry(
        &mut self,
        url: &Url,
        params: &[(&str, String)],
    ) -> Result<Response, YahooError> {
        let mut last_error = String::new();

        for attempt in 0..self.max_retries {
            self.enforce_rate_limit().await;

            if attempt > 0 {
                let delay = Duration::from_secs_f64(
                    2.0_f64.powi(attempt as i32 - 1) + rand::random::<f64>(),
                );
                let delay = delay.min(Duration::from_secs(60));
                warn!(attempt, ?delay, "Retrying {} after: {}", url, last_error);
                sleep(delay).await;
            }

            debug!("GET {}", url);
            let response = self
                .client
                .get(url.clone())
                .header("Accept", "application/json, text/plain, */*")
                .header("Accept-Language", "en-US,en;q=0.9")
                .header("User-Agent", self.get_user_agent())
                .query(params)
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return Ok(resp);
                    } else if status.as_u16() == 429 || status.is_server_error() {
                        last_error = format!("status {}", status);
                        continue;
                    } else {
                        return Err(YahooError::HttpStatus {
                            status: status.as_u16(),
                            url: url.to_string(),
                        });
                    }
                }
                Err(e) => {
                    last_error = e.to_string();
                    continue;
                }
            }
        }

        Err(YahooError::MaxRetries(format!("{} ({})", url, last_error)))
    }

    async fn get_json(&mut self, url: &Url, params: &[(&str, String)]) -> Result<Value, YahooError> {
        let response = self.send_with_retry(url, params).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn ensure_crumb(&mut self) -> Result<String, YahooError> {
        if let Some(crumb) = &self.crumb {
            return Ok(crumb.clone());
        }

        // The cookie endpoint answers 404 but still sets the session cookie
        self.enforce_rate_limit().await;
        let user_agent = self.get_user_agent();
        if let Err(e) = self
            .client
            .get(&self.cookie_url)
            .header("User-Agent", user_agent)
            .send()
            .await
        {
            debug!("Cookie priming request failed: {}", e);
        }

        let url = Url::parse(&format!("{}/v1/test/getcrumb", self.query_base_url))
            .map_err(|e| YahooError::Crumb(e.to_string()))?;
        let crumb = self.send_with_retry(&url, &[]).await?.text().await?;
        let crumb = crumb.trim().to_string();

        if crumb.is_empty() || crumb.contains('<') || crumb.contains(char::is_whitespace) {
            return Err(YahooError::Crumb(format!("unexpected crumb body '{}'", crumb)));
        }

        debug!("Obtained crumb");
        self.crumb = Some(crumb.clone());
        Ok(crumb)
    }

    async fn request_options(
        &mut self,
        url: &Url,
        date: Option<NaiveDate>,
    ) -> Result<Value, YahooError> {
        let crumb = self.ensure_crumb().await?;
        let mut params = vec![("crumb", crumb)];
        if let Some(date) = date {
            params.push(("date", to_unix_midnight(date).to_string()));
        }
        self.get_json(url, &params).await
    }

    async fn fetch_options(
        &mut self,
        ticker: &str,
        date: Option<NaiveDate>,
    ) -> Result<Value, YahooError> {
        let url = self.endpoint("v7/finance/options", ticker)?;
        match self.request_options(&url, date).await {
            Err(YahooError::HttpStatus { status: 401 | 403, .. }) => {
                warn!("Crumb rejected for {}, refreshing session", ticker);
                self.crumb = None;
                self.request_options(&url, date).await
            }
            other => other,
        }
    }

    /// Historical OHLCV bars. `end` is exclusive.
    pub async fn get_data(
        &mut self,
        ticker: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        interval: Interval,
    ) -> Result<PriceHistory, YahooError> {
        let ticker = normalize_ticker(ticker)?;
        if let (Some(start), Some(end)) = (start, end) {
            if end <= start {
                return Err(YahooError::InvalidDateRange { start, end });
            }
        }

        let period1 = start.map(to_unix_midnight).unwrap_or(EARLIEST_PERIOD);
        let period2 = end
            .map(to_unix_midnight)
            .unwrap_or_else(|| Utc::now().timestamp());

        let timer = Timer::start(&format!("Price history for {}", ticker));
        let url = self.endpoint("v8/finance/chart", &ticker)?;
        let params = [
            ("period1", period1.to_string()),
            ("period2", period2.to_string()),
            ("interval", interval.as_str().to_string()),
            ("events", "div,splits".to_string()),
        ];

        let response = self.get_json(&url, &params).await?;
        let history = parse_chart(&response, &ticker, interval)?;
        info!(
            ticker = %ticker,
            rows = history.bars.len(),
            "Fetched price history"
        );
        timer.log_elapsed();
        Ok(history)
    }

    /// Latest regular-market price
    pub async fn get_live_price(&mut self, ticker: &str) -> Result<f64, YahooError> {
        let ticker = normalize_ticker(ticker)?;
        let url = self.endpoint("v8/finance/chart", &ticker)?;
        let params = [
            ("range", "1d".to_string()),
            ("interval", Interval::Daily.as_str().to_string()),
        ];
        let response = self.get_json(&url, &params).await?;
        parse_live_price(&response)
    }

    pub async fn get_expiration_dates(&mut self, ticker: &str) -> Result<Vec<NaiveDate>, YahooError> {
        let ticker = normalize_ticker(ticker)?;
        let response = self.fetch_options(&ticker, None).await?;
        let dates = parse_expirations(&response)?;
        info!(ticker = %ticker, count = dates.len(), "Fetched expiration dates");
        Ok(dates)
    }

    /// Calls and puts for `date`, or for the nearest expiration when `date` is `None`
    pub async fn get_options_chain(
        &mut self,
        ticker: &str,
        date: Option<NaiveDate>,
    ) -> Result<OptionChain, YahooError> {
        let ticker = normalize_ticker(ticker)?;
        let timer = Timer::start(&format!("Option chain for {}", ticker));
        let response = self.fetch_options(&ticker, date).await?;
        let chain = parse_option_chain(&response, &ticker, date)?;
        info!(
            ticker = %ticker,
            expiration = %chain.expiration(),
            calls = chain.calls.contracts.len(),
            puts = chain.puts.contracts.len(),
            "Fetched option chain"
        );
        timer.log_elapsed();
        Ok(chain)
    }

    pub async fn get_calls(
        &mut self,
        ticker: &str,
        date: Option<NaiveDate>,
    ) -> Result<OptionTable, YahooError> {
        Ok(self.get_options_chain(ticker, date).await?.calls)
    }

    pub async fn get_puts(
        &mut self,
        ticker: &str,
        date: Option<NaiveDate>,
    ) -> Result<OptionTable, YahooError> {
        Ok(self.get_options_chain(ticker, date).await?.puts)
    }
}

fn normalize_ticker(ticker: &str) -> Result<String, YahooError> {
    let trimmed = ticker.trim();
    if trimmed.is_empty() || trimmed.contains(char::is_whitespace) {
        return Err(YahooError::InvalidTicker(ticker.to_string()));
    }
    Ok(trimmed.to_uppercase())
}

fn provider_error(error: &Value) -> Option<YahooError> {
    if error.is_null() {
        return None;
    }
    Some(YahooError::Provider {
        code: error
            .get("code")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string(),
        description: error
            .get("description")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
    })
}

fn as_u64_lenient(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|v| *v >= 0.0).map(|v| v as u64))
}

fn quote_column<'a>(quote: &'a Value, key: &str) -> Result<&'a Vec<Value>, YahooError> {
    quote
        .get(key)
        .and_then(|v| v.as_array())
        .ok_or_else(|| YahooError::InvalidResponse(format!("Missing key: {}", key)))
}

/// Decode a `/v8/finance/chart` response
pub fn parse_chart(response: &Value, ticker: &str, interval: Interval) -> Result<PriceHistory, YahooError> {
    let chart = response
        .get("chart")
        .ok_or_else(|| YahooError::InvalidResponse("Missing key: chart".to_string()))?;
    if let Some(err) = chart.get("error").and_then(provider_error) {
        return Err(err);
    }

    let result = chart
        .get("result")
        .and_then(|r| r.get(0))
        .ok_or(YahooError::NoData)?;

    let meta = result.get("meta");
    let timezone = meta
        .and_then(|m| m.get("exchangeTimezoneName"))
        .and_then(|v| v.as_str());
    let currency = meta
        .and_then(|m| m.get("currency"))
        .and_then(|v| v.as_str())
        .map(String::from);

    let Some(times) = result.get("timestamp").and_then(|v| v.as_array()) else {
        return Err(YahooError::NoData);
    };

    let quote = result
        .get("indicators")
        .and_then(|i| i.get("quote"))
        .and_then(|q| q.get(0))
        .ok_or_else(|| YahooError::InvalidResponse("Missing key: indicators.quote".to_string()))?;

    let opens = quote_column(quote, "open")?;
    let highs = quote_column(quote, "high")?;
    let lows = quote_column(quote, "low")?;
    let closes = quote_column(quote, "close")?;
    let volumes = quote_column(quote, "volume")?;
    let adjcloses = result
        .get("indicators")
        .and_then(|i| i.get("adjclose"))
        .and_then(|a| a.get(0))
        .and_then(|a| a.get("adjclose"))
        .and_then(|v| v.as_array());

    let length = times.len();
    if [opens.len(), highs.len(), lows.len(), closes.len(), volumes.len()]
        .iter()
        .any(|&len| len != length)
    {
        return Err(YahooError::InvalidResponse("Inconsistent array lengths".to_string()));
    }

    let mut bars = Vec::with_capacity(length);
    for i in 0..length {
        let timestamp = times[i].as_i64().ok_or_else(|| {
            YahooError::InvalidResponse(format!("Invalid timestamp at index {}: {:?}", i, times[i]))
        })?;
        let date = unix_to_exchange_date(timestamp, timezone).ok_or_else(|| {
            YahooError::InvalidResponse(format!("Cannot convert timestamp {} at index {}", timestamp, i))
        })?;

        let (Some(open), Some(high), Some(low), Some(close)) = (
            opens[i].as_f64(),
            highs[i].as_f64(),
            lows[i].as_f64(),
            closes[i].as_f64(),
        ) else {
            debug!("Skipping incomplete bar for {} on {}", ticker, date);
            continue;
        };

        bars.push(PriceBar {
            date,
            open,
            high,
            low,
            close,
            adjclose: adjcloses
                .and_then(|a| a.get(i))
                .and_then(|v| v.as_f64())
                .unwrap_or(close),
            volume: as_u64_lenient(&volumes[i]).unwrap_or(0),
            ticker: ticker.to_uppercase(),
        });
    }

    if bars.is_empty() {
        return Err(YahooError::NoData);
    }

    bars.sort_by(|a, b| a.date.cmp(&b.date));
    bars.dedup_by(|later, earlier| later.date == earlier.date);

    Ok(PriceHistory {
        ticker: ticker.to_uppercase(),
        interval,
        currency,
        exchange_timezone: timezone.map(String::from),
        bars,
    })
}

pub fn parse_live_price(response: &Value) -> Result<f64, YahooError> {
    let chart = response
        .get("chart")
        .ok_or_else(|| YahooError::InvalidResponse("Missing key: chart".to_string()))?;
    if let Some(err) = chart.get("error").and_then(provider_error) {
        return Err(err);
    }
    let result = chart
        .get("result")
        .and_then(|r| r.get(0))
        .ok_or(YahooError::NoData)?;

    if let Some(price) = result
        .get("meta")
        .and_then(|m| m.get("regularMarketPrice"))
        .and_then(|v| v.as_f64())
    {
        return Ok(price);
    }

    result
        .get("indicators")
        .and_then(|i| i.get("quote"))
        .and_then(|q| q.get(0))
        .and_then(|q| q.get("close"))
        .and_then(|c| c.as_array())
        .and_then(|closes| closes.iter().rev().find_map(|v| v.as_f64()))
        .ok_or(YahooError::NoData)
}

fn option_result(response: &Value) -> Result<&Value, YahooError> {
    let chain = response
        .get("optionChain")
        .ok_or_else(|| YahooError::InvalidResponse("Missing key: optionChain".to_string()))?;
    if let Some(err) = chain.get("error").and_then(provider_error) {
        return Err(err);
    }
    chain
        .get("result")
        .and_then(|r| r.get(0))
        .ok_or(YahooError::NoData)
}

/// Decode the expiration list from a `/v7/finance/options` response
pub fn parse_expirations(response: &Value) -> Result<Vec<NaiveDate>, YahooError> {
    let result = option_result(response)?;
    let raw = result
        .get("expirationDates")
        .and_then(|v| v.as_array())
        .ok_or(YahooError::NoData)?;

    let mut dates = raw
        .iter()
        .map(|v| {
            v.as_i64()
                .and_then(unix_to_utc_date)
                .ok_or_else(|| YahooError::InvalidResponse(format!("Invalid expiration: {:?}", v)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    if dates.is_empty() {
        return Err(YahooError::NoData);
    }
    dates.sort();
    dates.dedup();
    Ok(dates)
}

fn parse_contract(item: &Value) -> Result<OptionContract, YahooError> {
    let f64_field = |key: &str| item.get(key).and_then(|v| v.as_f64());

    let contract_name = item
        .get("contractSymbol")
        .and_then(|v| v.as_str())
        .ok_or_else(|| YahooError::InvalidResponse("Contract without contractSymbol".to_string()))?
        .to_string();
    let strike = f64_field("strike").ok_or_else(|| {
        YahooError::InvalidResponse(format!("Contract {} without strike", contract_name))
    })?;

    Ok(OptionContract {
        last_trade_date: item
            .get("lastTradeDate")
            .and_then(|v| v.as_i64())
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0)),
        strike,
        last_price: f64_field("lastPrice"),
        bid: f64_field("bid"),
        ask: f64_field("ask"),
        change: f64_field("change"),
        percent_change: f64_field("percentChange"),
        volume: item.get("volume").and_then(as_u64_lenient),
        open_interest: item.get("openInterest").and_then(as_u64_lenient),
        implied_volatility: f64_field("impliedVolatility").map(|iv| iv * 100.0),
        in_the_money: item
            .get("inTheMoney")
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
        currency: item.get("currency").and_then(|v| v.as_str()).map(String::from),
        contract_name,
    })
}

fn parse_side(
    options: &Value,
    kind: OptionKind,
    ticker: &str,
    expiration: NaiveDate,
) -> Result<OptionTable, YahooError> {
    let mut contracts = match options.get(kind.chain_key()).and_then(|v| v.as_array()) {
        Some(items) => items.iter().map(parse_contract).collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };
    contracts.sort_by(|a, b| a.strike.total_cmp(&b.strike));

    Ok(OptionTable {
        ticker: ticker.to_uppercase(),
        kind,
        expiration,
        contracts,
    })
}

/// Decode calls and puts from a `/v7/finance/options` response
pub fn parse_option_chain(
    response: &Value,
    ticker: &str,
    requested: Option<NaiveDate>,
) -> Result<OptionChain, YahooError> {
    let result = option_result(response)?;
    let missing = || match requested {
        Some(date) => YahooError::ExpirationNotFound(date),
        None => YahooError::NoData,
    };

    let options = result
        .get("options")
        .and_then(|o| o.get(0))
        .ok_or_else(missing)?;

    let expiration = options
        .get("expirationDate")
        .and_then(|v| v.as_i64())
        .and_then(unix_to_utc_date)
        .ok_or_else(|| YahooError::InvalidResponse("Missing key: expirationDate".to_string()))?;

    if let Some(date) = requested {
        if date != expiration {
            return Err(YahooError::ExpirationNotFound(date));
        }
    }

    Ok(OptionChain {
        calls: parse_side(options, OptionKind::Call, ticker, expiration)?,
        puts: parse_side(options, OptionKind::Put, ticker, expiration)?,
    })
}
