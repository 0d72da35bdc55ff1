//! Backtest command implementation

use anyhow::Result;
use rayon::prelude::*;
use tracing::info;

use zonebreak::backtest::{enhanced_statistics, summarize, BacktestEngine, BacktestReport};
use zonebreak::binance::{BinanceFuturesClient, ClientConfig};
use zonebreak::gateway::ExchangeGateway;
use zonebreak::{data, Candle, Config, Symbol};

pub fn run(config_path: String, capital_override: Option<f64>, days_override: Option<u32>) -> Result<()> {
    info!("Starting backtest");

    let mut config = Config::from_file(&config_path)?;
    info!("Loaded configuration from: {}", config_path);

    if let Some(capital) = capital_override {
        info!("Overriding initial capital to: ${:.2}", capital);
        config.backtest.initial_capital = capital;
    }
    if let Some(days) = days_override {
        config.trading.lookback_days = days;
    }

    let symbols = config.trading.symbols();
    let interval = config.trading.interval.clone();

    // top up the CSV cache before simulating
    let rt = tokio::runtime::Runtime::new()?;
    let client = BinanceFuturesClient::new(
        ClientConfig::default().with_rate_limit(config.exchange.rate_limit),
    );

    let mut series: Vec<(Symbol, Vec<Candle>)> = Vec::new();
    for symbol in &symbols {
        let candles = rt.block_on(data::ensure_history(
            &client as &dyn ExchangeGateway,
            symbol,
            &interval,
            config.trading.lookback_days,
            &config.backtest.data_dir,
        ))?;
        series.push((symbol.clone(), candles));
    }

    info!("Running zone simulation for {} symbol(s)", series.len());
    let engine = BacktestEngine::new(config.strategy.clone(), config.backtest.initial_capital);

    let reports: Vec<(Symbol, BacktestReport)> = series
        .par_iter()
        .map(|(symbol, candles)| (symbol.clone(), engine.simulate_all(candles)))
        .collect();

    for (symbol, report) in &reports {
        print_report(symbol, report, config.backtest.initial_capital);
    }

    info!("Backtest completed successfully");
    Ok(())
}

fn print_report(symbol: &Symbol, report: &BacktestReport, initial_capital: f64) {
    let summary = summarize(&report.trades);
    let stats = enhanced_statistics(&report.trades, initial_capital);

    println!("\n{}", "=".repeat(60));
    println!("BACKTEST RESULTS - {}", symbol);
    println!("{}", "=".repeat(60));
    println!("Zones detected:       {}", report.total_zones());
    println!("  traded:             {}", report.trades.len());
    println!("  no breakout:        {}", report.no_breakout);
    println!(
        "  insufficient data:  {}",
        report.no_candle_after_zone + report.no_candle_after_entry
    );
    println!("{}", "-".repeat(60));
    println!("Total Trades:         {}", summary.total_trades);
    println!("Wins / Losses / Open: {} / {} / {}", summary.wins, summary.losses, summary.open);
    println!("Trailing Exits:       {}", summary.trailing_exits);
    println!("Win Rate:             {:.2}%", summary.win_rate_pct);
    println!("Total P&L:            ${:+.2}", summary.total_pnl_usd);
    println!("Average P&L:          ${:+.2}", summary.avg_pnl_usd);
    println!("Avg Duration:         {:.1} min", summary.avg_duration_min);
    println!(
        "Zone Score (avg/min/max): {:.2} / {:.1} / {:.1}",
        summary.avg_zone_score, summary.min_zone_score, summary.max_zone_score
    );
    println!("{}", "-".repeat(60));
    println!("Final Equity:         ${:.2}", stats.equity_end);
    println!(
        "Max Drawdown:         ${:.2} ({:.2}%)",
        stats.max_drawdown_usd, stats.max_drawdown_pct
    );
    println!("Sharpe (per trade):   {:.2}", stats.sharpe_per_trade);
    println!("Expectancy:           ${:+.2}", stats.expectancy_usd);
    println!("Profit Factor:        {:.2}", stats.profit_factor);
    println!(
        "Avg Win / Avg Loss:   ${:+.2} / ${:+.2}",
        stats.avg_win_usd, stats.avg_loss_usd
    );
    println!(
        "Longest Streaks:      {} wins, {} losses",
        stats.max_consecutive_wins, stats.max_consecutive_losses
    );
    println!("{}", "=".repeat(60));
}
