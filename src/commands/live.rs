//! Live trading command

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use zonebreak::binance::{BinanceFuturesClient, ClientConfig};
use zonebreak::notify::{Notifier, NullNotifier, TelegramNotifier};
use zonebreak::{live, Config};

pub fn run(config_path: String, dry_run: bool, real: bool) -> Result<()> {
    if !dry_run && !real {
        anyhow::bail!("Must specify either --dry-run or --live mode");
    }
    if dry_run && real {
        anyhow::bail!("Cannot specify both --dry-run and --live modes");
    }

    dotenv::dotenv().ok();

    let config = Config::from_file(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    runtime.block_on(run_async(config, dry_run))
}

async fn run_async(config: Config, dry_run: bool) -> Result<()> {
    let mode = if dry_run { "DRY-RUN" } else { "LIVE" };
    println!("\n{}", "=".repeat(60));
    println!("ACCUMULATION BREAKOUT TRADER - {} MODE", mode);
    println!("{}", "=".repeat(60));
    println!("  Symbols:   {}", config.trading.symbols.join(", "));
    println!("  Interval:  {}", config.trading.interval);
    println!("  Leverage:  {}x", config.trading.leverage);
    println!("  Trailing:  {}", config.strategy.use_trailing_stop);
    println!("{}\n", "=".repeat(60));

    if !dry_run {
        warn!("LIVE TRADING MODE - REAL MONEY AT RISK!");
        warn!("Press Ctrl+C within 5 seconds to abort...");
        for i in (1..=5).rev() {
            info!("Starting in {} seconds...", i);
            sleep(Duration::from_secs(1)).await;
        }
    }

    let mut client_config = ClientConfig::default()
        .with_rate_limit(config.exchange.rate_limit)
        .with_timeout(Duration::from_secs(config.exchange.request_timeout_secs))
        .dry_run(dry_run);
    if let (Some(key), Some(secret)) = (
        config.exchange.api_key.clone(),
        config.exchange.api_secret.clone(),
    ) {
        client_config = client_config.with_credentials(key, secret);
    } else if !dry_run {
        anyhow::bail!("live mode requires BINANCE_API_KEY and BINANCE_API_SECRET");
    }

    let gateway = Arc::new(BinanceFuturesClient::new(client_config));

    let notifier: Arc<dyn Notifier> = match (
        config.telegram.enabled,
        config.telegram.bot_token.clone(),
        config.telegram.chat_id.clone(),
    ) {
        (true, Some(token), Some(chat_id)) => {
            info!("Telegram notifications enabled");
            Arc::new(TelegramNotifier::new(token, chat_id))
        }
        (true, _, _) => {
            warn!("Telegram enabled but TELEGRAM_BOT_TOKEN/TELEGRAM_CHAT_ID missing");
            Arc::new(NullNotifier)
        }
        _ => Arc::new(NullNotifier),
    };

    live::run(config, gateway, notifier).await?;
    info!("Live trading session ended.");
    Ok(())
}
