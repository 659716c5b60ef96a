use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use yfin_explorer::{
    config::AppConfig,
    data_structures::Interval,
    explore,
    init_logger,
    table::{render_text, to_json, write_csv, Tabular},
    utils::{format_date, parse_date},
    yahoo::{parse_interval, YahooClient, YahooError},
};

#[derive(Parser)]
#[command(name = "yfin-explorer")]
#[command(about = "Fetch and inspect Yahoo Finance price history and option chains")]
struct Cli {
    /// YAML config file (falls back to CONFIG_FILE, then YFX_* variables)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Change into this directory before fetching
    #[arg(short, long, global = true)]
    workdir: Option<PathBuf>,

    /// Output format for tables
    #[arg(short, long, global = true, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Rows shown in text output (0 shows all)
    #[arg(long, global = true, default_value_t = 10)]
    rows: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Csv,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full sequence: history, expirations, calls and chain for the first expiration
    Explore {
        #[arg(short, long)]
        ticker: Option<String>,
        #[arg(long, value_parser = cli_date)]
        start: Option<NaiveDate>,
        #[arg(long, value_parser = cli_date)]
        end: Option<NaiveDate>,
    },
    /// Historical prices
    History {
        #[arg(short, long)]
        ticker: Option<String>,
        #[arg(long, value_parser = cli_date)]
        start: Option<NaiveDate>,
        #[arg(long, value_parser = cli_date)]
        end: Option<NaiveDate>,
        /// 1d, 1wk or 1mo
        #[arg(short, long, value_parser = cli_interval)]
        interval: Option<Interval>,
    },
    /// List option expiration dates
    Expirations {
        #[arg(short, long)]
        ticker: Option<String>,
    },
    /// Call options for one expiration (nearest when omitted)
    Calls {
        #[arg(short, long)]
        ticker: Option<String>,
        #[arg(short, long, value_parser = cli_date)]
        date: Option<NaiveDate>,
    },
    /// Put options for one expiration (nearest when omitted)
    Puts {
        #[arg(short, long)]
        ticker: Option<String>,
        #[arg(short, long, value_parser = cli_date)]
        date: Option<NaiveDate>,
    },
    /// Calls and puts for one expiration (nearest when omitted)
    Chain {
        #[arg(short, long)]
        ticker: Option<String>,
        #[arg(short, long, value_parser = cli_date)]
        date: Option<NaiveDate>,
    },
    /// Latest market price
    Price {
        #[arg(short, long)]
        ticker: Option<String>,
    },
}

fn cli_date(value: &str) -> Result<NaiveDate, YahooError> {
    parse_date(value).ok_or_else(|| YahooError::InvalidDate(value.to_string()))
}

fn cli_interval(value: &str) -> Result<Interval, YahooError> {
    parse_interval(value)
}

fn print_table<T: Tabular>(table: &T, format: Format, rows: usize) -> anyhow::Result<()> {
    match format {
        Format::Text => println!("{}", render_text(table, rows)),
        Format::Csv => write_csv(table, std::io::stdout().lock()).context("writing CSV")?,
        Format::Json => println!("{}", to_json(table)?),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logger()?;

    let cli = Cli::parse();
    let mut config = AppConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(workdir) = cli.workdir {
        config.workdir = Some(workdir);
    }
    tracing::info!(ticker = %config.ticker, "Loaded configuration");

    let mut client = YahooClient::new(&config.client)?;
    let ticker_or = |ticker: Option<String>| ticker.unwrap_or_else(|| config.ticker.clone());

    // explore reports the directory change itself
    if !matches!(cli.command, Commands::Explore { .. }) {
        let cwd = explore::enter_working_dir(config.workdir.as_deref())?;
        tracing::debug!("Working directory: {}", cwd.display());
    }

    match cli.command {
        Commands::Explore { ticker, start, end } => {
            let mut run_config = config.clone();
            run_config.ticker = ticker_or(ticker);
            if start.is_some() {
                run_config.start_date = start;
            }
            if end.is_some() {
                run_config.end_date = end;
            }
            let report = explore::run(&mut client, &run_config).await?;
            println!("{}", report);
        }
        Commands::History { ticker, start, end, interval } => {
            let history = client
                .get_data(
                    &ticker_or(ticker),
                    start.or(config.start_date),
                    end.or(config.end_date),
                    interval.unwrap_or(config.interval),
                )
                .await?;
            print_table(&history, cli.format, cli.rows)?;
        }
        Commands::Expirations { ticker } => {
            let dates = client.get_expiration_dates(&ticker_or(ticker)).await?;
            match cli.format {
                Format::Json => {
                    let formatted: Vec<String> = dates.iter().map(|d| format_date(*d)).collect();
                    println!("{}", serde_json::to_string_pretty(&formatted)?);
                }
                _ => dates.iter().for_each(|d| println!("{}", format_date(*d))),
            }
        }
        Commands::Calls { ticker, date } => {
            let calls = client.get_calls(&ticker_or(ticker), date).await?;
            print_table(&calls, cli.format, cli.rows)?;
        }
        Commands::Puts { ticker, date } => {
            let puts = client.get_puts(&ticker_or(ticker), date).await?;
            print_table(&puts, cli.format, cli.rows)?;
        }
        Commands::Chain { ticker, date } => {
            let chain = client.get_options_chain(&ticker_or(ticker), date).await?;
            match cli.format {
                Format::Json => println!("{}", serde_json::to_string_pretty(&chain)?),
                format => {
                    for key in chain.keys() {
                        if let Some(table) = chain.get(key) {
                            println!("{} (expiration {})", key, format_date(table.expiration));
                            print_table(table, format, cli.rows)?;
                        }
                    }
                }
            }
        }
        Commands::Price { ticker } => {
            let ticker = ticker_or(ticker);
            let price = client.get_live_price(&ticker).await?;
            println!("{} {}", ticker.to_uppercase(), price);
        }
    }

    Ok(())
}
