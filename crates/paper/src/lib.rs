//! Paper straddle book-keeping.
//!
//! Positions are simulated long straddles priced off live venue quotes.
//! Nothing here places real orders.

pub mod allocation;
pub mod ledger;
pub mod pricing;
pub mod stops;
pub mod store;
pub mod targets;
pub mod types;
pub mod valuation;

pub use allocation::{check_risk, open_risk_usd, RiskCheck, RiskLimits};
pub use ledger::PositionLedger;
pub use pricing::{entry_costs, leg_price, mid_price, min_lot, resolve_quantity, straddle_usd};
pub use stops::{check_exit_rules, check_stop_loss, ExitRules};
pub use store::{
    read_json, write_json_atomic, JsonLedgerStore, LedgerSnapshot, LedgerStore, MemoryLedgerStore,
    SNAPSHOT_VERSION,
};
pub use targets::check_take_profit;
pub use types::{
    CloseInfo, CloseReason, EntryCosts, ExitFill, ExitSignal, MarketKey, OpenRequest, Position,
    PositionSource, PricingBasis,
};
pub use valuation::{move_pct, value_of, valuation_from_value, Valuation};
