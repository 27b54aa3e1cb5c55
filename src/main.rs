use std::sync::Arc;

use anyhow::Context;

use devfolio_bot::accrual::{self, AccrualJob};
use devfolio_bot::bot::{Bot, BotDeps};
use devfolio_bot::channels::{ChannelManager, CliChannel, TelegramChannel};
use devfolio_bot::config::BotConfig;
use devfolio_bot::store::{LibSqlBackend, ProfileStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = BotConfig::from_env().context("invalid configuration")?;

    eprintln!("Devfolio bot v{}", env!("CARGO_PKG_VERSION"));

    // ── Database ─────────────────────────────────────────────────────────
    let store: Arc<dyn ProfileStore> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("failed to open database at {}", config.db_path.display()))?,
    );
    eprintln!("   Database: {}", config.db_path.display());

    // ── Experience accrual ───────────────────────────────────────────────
    let _accrual_handle = if config.accrual.enabled {
        let schedule = accrual::parse_schedule(&config.accrual.schedule)?;
        let job = Arc::new(AccrualJob::new(Arc::clone(&store)));
        eprintln!("   Accrual: enabled ({})", config.accrual.schedule);
        Some(accrual::spawn_accrual_ticker(job, schedule))
    } else {
        eprintln!("   Accrual: disabled");
        None
    };

    // ── Channels ─────────────────────────────────────────────────────────
    let mut channels = ChannelManager::new();
    if let Some(token) = config.telegram_token.clone() {
        channels.add(Box::new(TelegramChannel::new(token)));
    }
    if config.cli_enabled {
        channels.add(Box::new(CliChannel::new()));
    }
    if channels.names().is_empty() {
        anyhow::bail!("no channel enabled: set TELEGRAM_BOT_TOKEN or DEVFOLIO_CLI=1");
    }
    eprintln!("   Channels: {}\n", channels.names().join(", "));

    let bot = Bot::new(config, BotDeps { store }, channels);
    bot.run().await?;

    Ok(())
}
