//! # yfin-explorer
//!
//! Fetch Yahoo Finance price history and option chains for a ticker and
//! inspect the resulting tables.
//!
//! ```no_run
//! use yfin_explorer::config::ClientConfig;
//! use yfin_explorer::yahoo::YahooClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = YahooClient::new(&ClientConfig::default())?;
//!     let expirations = client.get_expiration_dates("NVDA").await?;
//!     let chain = client.get_options_chain("NVDA", expirations.first().copied()).await?;
//!     println!("{:?}: {} calls", chain.keys(), chain.calls.contracts.len());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod data_structures;
pub mod explore;
pub mod table;
pub mod utils;
pub mod yahoo;

#[cfg(test)]
mod test_support;

pub use utils::{init_logger, Timer};
