use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// --- Price History ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub adjclose: f64,
    pub volume: u64,
    pub ticker: String,
}

pub const PRICE_COLUMNS: [&str; 8] = [
    "date", "open", "high", "low", "close", "adjclose", "volume", "ticker",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceHistory {
    pub ticker: String,
    pub interval: Interval,
    pub currency: Option<String>,
    pub exchange_timezone: Option<String>,
    pub bars: Vec<PriceBar>,
}

impl PriceHistory {
    pub fn first_date(&self) -> Option<NaiveDate> {
        self.bars.first().map(|b| b.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.bars.last().map(|b| b.date)
    }

    pub fn last_close(&self) -> Option<f64> {
        self.bars.last().map(|b| b.close)
    }
}

/// Bar size accepted by the chart endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Interval {
    #[default]
    #[serde(rename = "1d")]
    Daily,
    #[serde(rename = "1wk")]
    Weekly,
    #[serde(rename = "1mo")]
    Monthly,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::Daily => "1d",
            Interval::Weekly => "1wk",
            Interval::Monthly => "1mo",
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1d" => Ok(Interval::Daily),
            "1wk" => Ok(Interval::Weekly),
            "1mo" => Ok(Interval::Monthly),
            other => Err(other.to_string()),
        }
    }
}

// --- Options ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionKind {
    Call,
    Put,
}

impl OptionKind {
    /// Key under which this side is stored in an [`OptionChain`].
    pub fn chain_key(&self) -> &'static str {
        match self {
            OptionKind::Call => "calls",
            OptionKind::Put => "puts",
        }
    }
}

impl fmt::Display for OptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionKind::Call => f.write_str("call"),
            OptionKind::Put => f.write_str("put"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionContract {
    pub contract_name: String,
    pub last_trade_date: Option<DateTime<Utc>>,
    pub strike: f64,
    pub last_price: Option<f64>,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub change: Option<f64>,
    pub percent_change: Option<f64>,
    pub volume: Option<u64>,
    pub open_interest: Option<u64>,
    /// Percentage, e.g. `45.3` for 45.3%.
    pub implied_volatility: Option<f64>,
    pub in_the_money: bool,
    pub currency: Option<String>,
}

pub const OPTION_COLUMNS: [&str; 11] = [
    "Contract Name",
    "Last Trade Date",
    "Strike",
    "Last Price",
    "Bid",
    "Ask",
    "Change",
    "% Change",
    "Volume",
    "Open Interest",
    "Implied Volatility",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionTable {
    pub ticker: String,
    pub kind: OptionKind,
    pub expiration: NaiveDate,
    pub contracts: Vec<OptionContract>,
}

impl OptionTable {
    pub fn strikes(&self) -> Vec<f64> {
        self.contracts.iter().map(|c| c.strike).collect()
    }

    pub fn in_the_money_count(&self) -> usize {
        self.contracts.iter().filter(|c| c.in_the_money).count()
    }
}

/// Calls and puts for a single expiration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionChain {
    pub calls: OptionTable,
    pub puts: OptionTable,
}

impl OptionChain {
    pub fn keys(&self) -> [&'static str; 2] {
        [OptionKind::Call.chain_key(), OptionKind::Put.chain_key()]
    }

    pub fn get(&self, key: &str) -> Option<&OptionTable> {
        match key {
            "calls" => Some(&self.calls),
            "puts" => Some(&self.puts),
            _ => None,
        }
    }

    pub fn expiration(&self) -> NaiveDate {
        self.calls.expiration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(kind: OptionKind, strikes: &[f64]) -> OptionTable {
        OptionTable {
            ticker: "NVDA".to_string(),
            kind,
            expiration: NaiveDate::from_ymd_opt(2022, 8, 19).unwrap(),
            contracts: strikes
                .iter()
                .map(|&strike| OptionContract {
                    contract_name: format!("NVDA220819C{:08}", (strike * 1000.0) as u64),
                    last_trade_date: None,
                    strike,
                    last_price: None,
                    bid: None,
                    ask: None,
                    change: None,
                    percent_change: None,
                    volume: None,
                    open_interest: None,
                    implied_volatility: None,
                    in_the_money: strike < 150.0,
                    currency: None,
                })
                .collect(),
        }
    }

    #[test]
    fn test_interval_parsing() {
        assert_eq!("1d".parse::<Interval>().unwrap(), Interval::Daily);
        assert_eq!("1wk".parse::<Interval>().unwrap(), Interval::Weekly);
        assert_eq!("1mo".parse::<Interval>().unwrap(), Interval::Monthly);
        assert_eq!("1h".parse::<Interval>().unwrap_err(), "1h");
        assert_eq!(Interval::default().to_string(), "1d");
    }

    #[test]
    fn test_chain_keys_and_lookup() {
        let chain = OptionChain {
            calls: table(OptionKind::Call, &[100.0, 150.0]),
            puts: table(OptionKind::Put, &[120.0]),
        };
        assert_eq!(chain.keys(), ["calls", "puts"]);
        assert_eq!(chain.get("calls").unwrap().contracts.len(), 2);
        assert_eq!(chain.get("puts").unwrap().strikes(), vec![120.0]);
        assert!(chain.get("straddles").is_none());
        assert_eq!(chain.expiration(), NaiveDate::from_ymd_opt(2022, 8, 19).unwrap());
    }

    #[test]
    fn test_in_the_money_count() {
        let calls = table(OptionKind::Call, &[100.0, 140.0, 160.0]);
        assert_eq!(calls.in_the_money_count(), 2);
    }
}
