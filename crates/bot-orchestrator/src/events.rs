//! Per-tick decision reports and the bounded audit trail.

use chrono::{DateTime, Utc};
use gex_desk_paper::CloseReason;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Why a tick did not open a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockReason {
    Disabled,
    NoSpot,
    Cooldown,
    AutoEntryOff,
    NoExpiries,
    NoWalls,
    NoTouch,
    MaxPositions,
    MaxRisk,
    RiskWouldExceed,
    #[serde(rename = "DUP_STRIKE")]
    DuplicateStrike,
    /// No expiry lists both a call and a put at the touched strike.
    NoChainRow,
    /// Legs exist but cannot be bought (no ask quoted).
    NoInstruments,
    Cancelled,
    Error,
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disabled => "DISABLED",
            Self::NoSpot => "NO_SPOT",
            Self::Cooldown => "COOLDOWN",
            Self::AutoEntryOff => "AUTO_ENTRY_OFF",
            Self::NoExpiries => "NO_EXPIRIES",
            Self::NoWalls => "NO_WALLS",
            Self::NoTouch => "NO_TOUCH",
            Self::MaxPositions => "MAX_POSITIONS",
            Self::MaxRisk => "MAX_RISK",
            Self::RiskWouldExceed => "RISK_WOULD_EXCEED",
            Self::DuplicateStrike => "DUP_STRIKE",
            Self::NoChainRow => "NO_CHAIN_ROW",
            Self::NoInstruments => "NO_INSTRUMENTS",
            Self::Cancelled => "CANCELLED",
            Self::Error => "ERROR",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitRecord {
    pub position_id: String,
    pub key: String,
    pub reason: CloseReason,
    pub exit_value_usd: Decimal,
    pub pnl_usd: Decimal,
    pub pnl_pct: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryRecord {
    pub position_id: String,
    pub key: String,
    pub wall_strike: Decimal,
    pub wall_rank: usize,
    pub ask_cost_usd: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TickOutcome {
    Entered(EntryRecord),
    Blocked { reason: BlockReason, detail: String },
}

/// What one tick saw and did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    pub at: DateTime<Utc>,
    pub currency: String,
    pub spot: Option<f64>,
    pub exits: Vec<ExitRecord>,
    /// Positions whose exit check failed this tick, with the error.
    pub exit_errors: Vec<String>,
    pub outcome: TickOutcome,
}

impl TickReport {
    #[must_use]
    pub fn blocked_reason(&self) -> Option<BlockReason> {
        match &self.outcome {
            TickOutcome::Blocked { reason, .. } => Some(*reason),
            TickOutcome::Entered(_) => None,
        }
    }

    #[must_use]
    pub fn entry(&self) -> Option<&EntryRecord> {
        match &self.outcome {
            TickOutcome::Entered(entry) => Some(entry),
            TickOutcome::Blocked { .. } => None,
        }
    }
}

/// Ring of the most recent tick reports.
#[derive(Debug)]
pub struct DecisionAudit {
    reports: Mutex<VecDeque<TickReport>>,
    capacity: usize,
}

impl DecisionAudit {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            reports: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn record(&self, report: TickReport) {
        let mut reports = self.reports.lock();
        if reports.len() >= self.capacity {
            reports.pop_front();
        }
        reports.push_back(report);
    }

    /// Newest first.
    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<TickReport> {
        self.reports.lock().iter().rev().take(limit).cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.reports.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reports.lock().is_empty()
    }
}
