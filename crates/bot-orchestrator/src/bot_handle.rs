use crate::bot_actor::BotActor;
use crate::commands::{BotCommand, BotStatus};
use crate::events::TickReport;
use crate::state::DeskState;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const COMMAND_BUFFER: usize = 32;

/// Cloneable handle to a running control loop.
#[derive(Clone)]
pub struct BotHandle {
    tx: mpsc::Sender<BotCommand>,
    status_rx: watch::Receiver<BotStatus>,
    cancel: CancellationToken,
}

impl BotHandle {
    /// Spawns the control loop for `state` on the current runtime.
    #[must_use]
    pub fn spawn(state: Arc<DeskState>) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let initial = BotStatus::idle(
            &state.bot_config(),
            state.ledger.open_count(),
            state.ledger.is_degraded() || state.config_degraded(),
        );
        let (status_tx, status_rx) = watch::channel(initial);
        let cancel = CancellationToken::new();

        let actor = BotActor::new(state, rx, status_tx, cancel.clone());
        let task = tokio::spawn(actor.run());

        (
            Self {
                tx,
                status_rx,
                cancel,
            },
            task,
        )
    }

    /// Latest published status, without a round trip to the loop.
    #[must_use]
    pub fn status(&self) -> BotStatus {
        self.status_rx.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<BotStatus> {
        self.status_rx.clone()
    }

    /// Asks the loop for its status.
    ///
    /// # Errors
    /// Returns an error if the loop has exited.
    pub async fn get_status(&self) -> Result<BotStatus> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(BotCommand::GetStatus(tx)).await?;
        Ok(rx.await?)
    }

    /// Runs one tick now, queued behind any tick in progress.
    ///
    /// # Errors
    /// Returns an error if the loop has exited.
    pub async fn tick_now(&self) -> Result<TickReport> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(BotCommand::TickNow(tx)).await?;
        Ok(rx.await?)
    }

    /// Cancels in-flight work and stops the loop. Idempotent.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        // The loop may already be gone; cancellation alone is enough.
        let _ = self.tx.send(BotCommand::Shutdown).await;
    }

    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
