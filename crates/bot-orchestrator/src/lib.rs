//! Paper-trading control loop and the desk facade.
//!
//! [`DeskState`] is the single owned home for the ledger, bot config, wall
//! combiner and decision audit. [`Desk`] serves requests against it and owns
//! the [`BotActor`] task through a [`BotHandle`].

pub mod bot_actor;
pub mod bot_handle;
pub mod bot_store;
pub mod commands;
pub mod desk;
pub mod events;
pub mod state;

pub use bot_actor::{touched_wall, BotActor};
pub use bot_handle::BotHandle;
pub use bot_store::BotConfigStore;
pub use commands::{BotCommand, BotConfigPatch, BotStatus, LoopState};
pub use desk::{Desk, ManualEntry, MarkToMarket, PositionMark};
pub use events::{BlockReason, DecisionAudit, EntryRecord, ExitRecord, TickOutcome, TickReport};
pub use state::{DeskSettings, DeskState};
