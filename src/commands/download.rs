//! Download command - fetch historical futures klines into the CSV cache

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use zonebreak::binance::{is_valid_interval, BinanceFuturesClient, ClientConfig};
use zonebreak::gateway::ExchangeGateway;
use zonebreak::{data, Symbol};

pub fn run(symbols: String, timeframes: String, days: u32, output: String) -> Result<()> {
    info!("Starting data download");

    let rt = tokio::runtime::Runtime::new()?;
    let client = BinanceFuturesClient::new(ClientConfig::default());

    let symbols: Vec<&str> = symbols.split(',').map(|s| s.trim()).collect();
    let intervals: Vec<&str> = timeframes.split(',').map(|s| s.trim()).collect();

    for interval in &intervals {
        if !is_valid_interval(interval) {
            anyhow::bail!("invalid interval: {}", interval);
        }
    }

    println!("\n{}", "=".repeat(60));
    println!("DOWNLOADING HISTORICAL FUTURES DATA");
    println!("{}", "=".repeat(60));
    println!("  Symbols:    {:?}", symbols);
    println!("  Timeframes: {:?}", intervals);
    println!("  Days:       {}", days);
    println!("  Output:     {}", output);
    println!("{}\n", "=".repeat(60));

    let total = (symbols.len() * intervals.len()) as u64;
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}")
            .expect("static progress template is valid"),
    );

    let mut total_candles = 0usize;
    let mut failures = Vec::new();

    for symbol in &symbols {
        for interval in &intervals {
            bar.set_message(format!("{} {}", symbol, interval));
            let sym = Symbol::new(*symbol);
            let result = rt.block_on(data::ensure_history(
                &client as &dyn ExchangeGateway,
                &sym,
                interval,
                days,
                &output,
            ));
            match result {
                Ok(candles) => total_candles += candles.len(),
                Err(e) => failures.push(format!("{}_{}: {}", symbol, interval, e)),
            }
            bar.inc(1);
        }
    }
    bar.finish_and_clear();

    println!("\n{}", "=".repeat(60));
    println!("DOWNLOAD COMPLETE");
    println!("{}", "=".repeat(60));
    println!(
        "  Successful: {}/{}",
        total as usize - failures.len(),
        total
    );
    println!("  Total candles: {}", total_candles);
    for failure in &failures {
        println!("  ✗ {}", failure);
    }
    println!("{}", "=".repeat(60));

    Ok(())
}
