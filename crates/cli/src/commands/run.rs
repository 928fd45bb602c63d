use super::open_desk;
use gex_desk_core::AppConfig;

pub async fn run(config: &AppConfig) -> anyhow::Result<()> {
    let desk = open_desk(config)?;
    let bot = desk.get_bot_config();
    tracing::info!(
        currency = %bot.currency,
        enabled = bot.enabled,
        auto_entry = bot.auto_entry,
        expiries = ?bot.expiries,
        open_positions = desk.list_open_positions().len(),
        tick_ms = config.control.tick_interval_ms,
        "Starting GEX desk control loop"
    );
    if !bot.enabled {
        tracing::warn!(
            "Bot is disabled; stop this process, run `gex-desk bot set --enabled true`, then start it again"
        );
    }

    let handle = desk.start_bot();
    let mut status = handle.subscribe();
    let mut degraded = false;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                result?;
                break;
            }
            changed = status.changed() => {
                if changed.is_err() {
                    tracing::warn!("Control loop exited on its own");
                    break;
                }
                let now_degraded = status.borrow_and_update().ledger_degraded;
                if now_degraded && !degraded {
                    tracing::error!("Persistence is failing; positions are held in memory only");
                } else if degraded && !now_degraded {
                    tracing::info!("Persistence recovered");
                }
                degraded = now_degraded;
            }
        }
    }

    tracing::info!("Stopping control loop...");
    desk.shutdown().await;
    tracing::info!("GEX desk stopped");
    Ok(())
}

async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = sigterm.recv() => tracing::info!("Received SIGTERM, initiating graceful shutdown"),
            res = tokio::signal::ctrl_c() => {
                res?;
                tracing::info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        tracing::info!("Received Ctrl+C, initiating graceful shutdown");
    }
    Ok(())
}
