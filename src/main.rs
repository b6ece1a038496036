use anyhow::Context;
use lrcbot::api::{AlertChannel, BybitClient, Notifier};
use lrcbot::config::{Credentials, Settings};
use lrcbot::execution::SignalEngine;
use lrcbot::risk::RiskSizer;
use lrcbot::strategy::ChannelBreakoutStrategy;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    tracing::info!("🚀 LRC bot starting");

    let settings = Settings::load().context("Invalid configuration")?;
    let credentials = Credentials::from_env().context("Missing exchange credentials")?;

    let instrument = settings.instrument();
    let strategy = ChannelBreakoutStrategy::new(settings.risk_parameters(), settings.signal_config());
    let sizer = RiskSizer::new(settings.stop_multiplier, settings.fallback_equity, instrument)
        .context("Invalid sizing parameters")?;

    let client = BybitClient::new(
        credentials.api_key,
        credentials.api_secret,
        settings.testnet,
        settings.request_timeout(),
        instrument,
    )
    .context("Failed to create Bybit client")?;

    let alerts = AlertChannel::from_credentials(credentials.telegram_token, credentials.telegram_chat_id)
        .context("Failed to create Telegram notifier")?;

    let engine = SignalEngine::new(
        settings.symbol.clone(),
        settings.interval.clone(),
        settings.candle_limit,
        strategy,
        sizer,
        instrument,
        settings.request_timeout(),
    )
    .context("Failed to create signal engine")?;
    let scheduler = settings.scheduler();

    tracing::info!("\n📊 Configuration:");
    tracing::info!("  Symbol: {} ({}m candles, {} bars)", settings.symbol, settings.interval, settings.candle_limit);
    tracing::info!("  Mode: {}", if settings.testnet { "TESTNET" } else { "MAINNET" });
    tracing::info!(
        "  Channel: {} bars x {} sd | RSI {} | ATR {}",
        settings.channel_period,
        settings.deviation_multiplier,
        settings.rsi_period,
        settings.atr_period
    );
    tracing::info!(
        "  Risk: {}% per trade, {}R target, stop {} ATR",
        settings.risk_fraction * 100.0,
        settings.reward_ratio,
        settings.stop_multiplier
    );
    tracing::info!("\nPress Ctrl+C to stop...\n");

    if let Err(e) = alerts
        .notify(&format!(
            "🤖 *LRC bot started* on {} ({})",
            settings.symbol,
            if settings.testnet { "testnet" } else { "mainnet" }
        ))
        .await
    {
        tracing::warn!(error = %e, "Startup alert not delivered");
    }

    let (engine, exchange, notifier) = (&engine, &client, &alerts);
    let cycle = move || engine.run_cycle(exchange, notifier);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("\n⚠️  Received Ctrl+C, shutting down...");
        }
        _ = scheduler.run(cycle) => {
            tracing::error!("Scheduler exited unexpectedly");
        }
    }

    tracing::info!("👋 LRC bot stopped");
    Ok(())
}

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("lrcbot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
