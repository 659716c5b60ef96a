use crate::config::AppConfig;
use crate::table::Tabular;
use crate::utils::format_date;
use crate::yahoo::{YahooClient, YahooError};
use chrono::NaiveDate;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ExploreError {
    #[error("cannot change working directory to {path}: {source}")]
    WorkingDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Yahoo(#[from] YahooError),
}

/// Summary of one exploration run
#[derive(Debug, Clone, PartialEq)]
pub struct ExploreReport {
    pub working_dir: PathBuf,
    pub ticker: String,
    pub history_type: &'static str,
    pub history_shape: (usize, usize),
    pub history_span: Option<(NaiveDate, NaiveDate)>,
    pub last_close: Option<f64>,
    pub expiration_count: usize,
    pub first_expiration: NaiveDate,
    pub calls_type: &'static str,
    pub calls_shape: (usize, usize),
    pub call_columns: Vec<String>,
    pub chain_keys: Vec<String>,
    pub chain_sizes: Vec<(String, usize)>,
}

/// Change into `path` and return the resulting absolute working directory
pub fn enter_working_dir(path: Option<&Path>) -> Result<PathBuf, ExploreError> {
    let io_err = |path: &Path, source| ExploreError::WorkingDirectory {
        path: path.to_path_buf(),
        source,
    };
    if let Some(path) = path {
        std::env::set_current_dir(path).map_err(|e| io_err(path, e))?;
    }
    std::env::current_dir().map_err(|e| io_err(path.unwrap_or(Path::new(".")), e))
}

/// Price history, expiration dates, the first expiration's calls and its
/// full chain, in that order.
pub async fn run(client: &mut YahooClient, config: &AppConfig) -> Result<ExploreReport, ExploreError> {
    let working_dir = enter_working_dir(config.workdir.as_deref())?;
    info!("Working directory: {}", working_dir.display());

    let stock = client
        .get_data(&config.ticker, config.start_date, config.end_date, config.interval)
        .await?;

    let expiration_dates = client.get_expiration_dates(&config.ticker).await?;
    let first_expiration = *expiration_dates.first().ok_or(YahooError::NoData)?;
    info!("Using first expiration {}", format_date(first_expiration));

    let call_data = client.get_calls(&config.ticker, Some(first_expiration)).await?;
    let option_chain_data = client
        .get_options_chain(&config.ticker, Some(first_expiration))
        .await?;

    let chain_keys: Vec<String> = option_chain_data.keys().iter().map(|k| k.to_string()).collect();
    let chain_sizes = chain_keys
        .iter()
        .filter_map(|key| {
            option_chain_data
                .get(key)
                .map(|table| (key.clone(), table.row_count()))
        })
        .collect();

    Ok(ExploreReport {
        working_dir,
        ticker: stock.ticker.clone(),
        history_type: stock.type_name(),
        history_shape: stock.shape(),
        history_span: stock.first_date().zip(stock.last_date()),
        last_close: stock.last_close(),
        expiration_count: expiration_dates.len(),
        first_expiration,
        calls_type: call_data.type_name(),
        calls_shape: call_data.shape(),
        call_columns: call_data.columns(),
        chain_keys,
        chain_sizes,
    })
}

impl fmt::Display for ExploreReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Working directory: {}", self.working_dir.display())?;
        write!(
            f,
            "{} history: {} ({} rows x {} columns)",
            self.ticker, self.history_type, self.history_shape.0, self.history_shape.1
        )?;
        if let Some((first, last)) = self.history_span {
            write!(f, " {} .. {}", format_date(first), format_date(last))?;
        }
        if let Some(close) = self.last_close {
            write!(f, ", last close {:.2}", close)?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "Expiration dates: {} (first {})",
            self.expiration_count,
            format_date(self.first_expiration)
        )?;
        writeln!(
            f,
            "Calls: {} ({} rows x {} columns)",
            self.calls_type, self.calls_shape.0, self.calls_shape.1
        )?;
        writeln!(f, "Call columns: [{}]", self.call_columns.join(", "))?;
        let sizes = self
            .chain_sizes
            .iter()
            .map(|(key, n)| format!("{}={}", key, n))
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "Option chain keys: [{}] ({})", self.chain_keys.join(", "), sizes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{fixture_route, spawn_stub, stub_client_config};
    use std::sync::Arc;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn report() -> ExploreReport {
        ExploreReport {
            working_dir: PathBuf::from("/data"),
            ticker: "NVDA".to_string(),
            history_type: "PriceHistory",
            history_shape: (2516, 8),
            history_span: Some((ymd(2010, 6, 30), ymd(2020, 6, 29))),
            last_close: Some(379.5),
            expiration_count: 18,
            first_expiration: ymd(2022, 8, 19),
            calls_type: "OptionTable",
            calls_shape: (3, 11),
            call_columns: vec!["Contract Name".to_string(), "Strike".to_string()],
            chain_keys: vec!["calls".to_string(), "puts".to_string()],
            chain_sizes: vec![("calls".to_string(), 3), ("puts".to_string(), 4)],
        }
    }

    #[test]
    fn test_report_display() {
        let text = report().to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Working directory: /data");
        assert_eq!(
            lines[1],
            "NVDA history: PriceHistory (2516 rows x 8 columns) 2010-06-30 .. 2020-06-29, last close 379.50"
        );
        assert_eq!(lines[2], "Expiration dates: 18 (first 2022-08-19)");
        assert_eq!(lines[4], "Call columns: [Contract Name, Strike]");
        assert_eq!(lines[5], "Option chain keys: [calls, puts] (calls=3, puts=4)");
    }

    #[test]
    fn test_enter_working_dir_missing() {
        let result = enter_working_dir(Some(Path::new("/definitely/not/a/dir")));
        assert!(matches!(result, Err(ExploreError::WorkingDirectory { .. })));
    }

    #[test]
    fn test_enter_working_dir_none_keeps_cwd() {
        let before = std::env::current_dir().unwrap();
        assert_eq!(enter_working_dir(None).unwrap(), before);
    }

    #[tokio::test]
    async fn test_run_against_stubbed_provider() {
        let server = spawn_stub(Arc::new(|target: &str, _: usize| fixture_route(target))).await;
        let config = AppConfig {
            client: stub_client_config(&server.base_url, 1),
            ..AppConfig::default()
        };
        let mut client = YahooClient::new(&config.client).unwrap();

        let report = run(&mut client, &config).await.unwrap();
        assert_eq!(report.working_dir, std::env::current_dir().unwrap());
        assert_eq!(report.ticker, "NVDA");
        assert_eq!(report.history_shape, (3, 8));
        assert_eq!(report.history_span, Some((ymd(2020, 6, 25), ymd(2020, 6, 29))));
        assert_eq!(report.last_close, Some(368.5));
        assert_eq!(report.expiration_count, 3);
        assert_eq!(report.first_expiration, ymd(2022, 8, 19));
        assert_eq!(report.calls_type, "OptionTable");
        assert_eq!(report.calls_shape, (2, 11));
        assert_eq!(report.call_columns[0], "Contract Name");
        assert_eq!(report.chain_keys, vec!["calls", "puts"]);
        assert_eq!(
            report.chain_sizes,
            vec![("calls".to_string(), 2), ("puts".to_string(), 1)]
        );

        assert_eq!(
            server.paths(),
            vec![
                "/v8/finance/chart/NVDA",
                "/cookie",
                "/v1/test/getcrumb",
                "/v7/finance/options/NVDA",
                "/v7/finance/options/NVDA",
                "/v7/finance/options/NVDA",
            ]
        );
        let dated = server
            .targets()
            .iter()
            .filter(|t| t.contains("date=1660867200"))
            .count();
        assert_eq!(dated, 2);
    }
}
