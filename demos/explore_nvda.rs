use yfin_explorer::config::ClientConfig;
use yfin_explorer::data_structures::Interval;
use yfin_explorer::table::Tabular;
use yfin_explorer::utils::parse_date;
use yfin_explorer::yahoo::{YahooClient, YahooError};

#[tokio::main]
async fn main() -> Result<(), YahooError> {
    println!("Yahoo Finance Explorer Example");
    println!("==============================");

    let mut client = YahooClient::new(&ClientConfig::default())?;
    let ticker = "NVDA";

    // 1. Price history
    println!("\n📈 Price history for {}", ticker);
    println!("{}", "-".repeat(40));

    match client
        .get_data(ticker, parse_date("2010-06-30"), parse_date("2020-06-30"), Interval::Daily)
        .await
    {
        Ok(history) => {
            let (rows, cols) = history.shape();
            println!("✅ {} rows x {} columns", rows, cols);
            if let (Some(first), Some(last)) = (history.bars.first(), history.bars.last()) {
                println!("📅 Range: {} to {}", first.date, last.date);
                let change_pct = ((last.adjclose - first.adjclose) / first.adjclose) * 100.0;
                println!("📊 Adjusted change: {:+.1}%", change_pct);
            }
        }
        Err(e) => println!("❌ Failed to retrieve price history: {}", e),
    }

    // 2. Expirations
    println!("\n🗓  Option expirations");
    println!("{}", "-".repeat(40));

    let expirations = client.get_expiration_dates(ticker).await?;
    let Some(&first_expiration) = expirations.first() else {
        return Err(YahooError::NoData);
    };
    println!("✅ {} expirations, first {}", expirations.len(), first_expiration);

    // 3. Calls for the first expiration
    let calls = client.get_calls(ticker, Some(first_expiration)).await?;
    println!("\n📞 {} for {}", calls.type_name(), calls.expiration);
    println!("{}", "-".repeat(40));
    println!("Columns: {:?}", calls.columns());
    println!("In the money: {}/{}", calls.in_the_money_count(), calls.row_count());

    // 4. Full chain
    let chain = client.get_options_chain(ticker, Some(first_expiration)).await?;
    println!("\n🔗 Option chain keys: {:?}", chain.keys());
    for key in chain.keys() {
        if let Some(table) = chain.get(key) {
            println!("  {}: {} contracts", key, table.row_count());
        }
    }

    println!("\n{}", "=".repeat(60));
    println!("✅ EXPLORER EXAMPLE COMPLETED");
    println!("{}", "=".repeat(60));

    Ok(())
}
