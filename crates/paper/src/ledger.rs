//! The position ledger.
//!
//! Owns the open/history books and their invariants:
//! at most one open position per market key, every position in exactly
//! one of the two books, and history capped newest-first. Each mutation
//! runs under one mutex and persists the whole book before the lock is
//! released, so the on-disk order of snapshots matches the in-memory order
//! of mutations.

use crate::store::{LedgerSnapshot, LedgerStore, SNAPSHOT_VERSION};
use crate::types::{CloseInfo, ExitFill, OpenRequest, Position};
use chrono::Utc;
use gex_desk_core::{DeskError, Result};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Default)]
struct Book {
    open: Vec<Position>,
    history: Vec<Position>,
}

impl Book {
    fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            version: SNAPSHOT_VERSION,
            open: self.open.clone(),
            history: self.history.clone(),
            saved_at_ms: Utc::now().timestamp_millis(),
        }
    }
}

pub struct PositionLedger {
    book: Mutex<Book>,
    store: Arc<dyn LedgerStore>,
    history_cap: usize,
    degraded: AtomicBool,
}

impl PositionLedger {
    /// Loads the ledger from `store`.
    ///
    /// A stored book that breaks an invariant is repaired on load: duplicate
    /// open keys keep the newest entry, overflow history is truncated.
    ///
    /// # Errors
    ///
    /// Propagates a store read failure.
    pub fn load(store: Arc<dyn LedgerStore>, history_cap: usize) -> Result<Self> {
        let snapshot = store.load()?.unwrap_or_default();

        let mut open: Vec<Position> = Vec::with_capacity(snapshot.open.len());
        let mut history = snapshot.history;
        for pos in snapshot.open {
            if open.iter().any(|p| p.key() == pos.key()) {
                warn!(id = %pos.id, key = %pos.key(), "Dropping duplicate open position from stored ledger");
                continue;
            }
            if pos.close.is_some() {
                history.insert(0, pos);
                continue;
            }
            open.push(pos);
        }
        history.truncate(history_cap);

        info!(open = open.len(), history = history.len(), history_cap, "Position ledger ready");

        Ok(Self {
            book: Mutex::new(Book { open, history }),
            store,
            history_cap,
            degraded: AtomicBool::new(false),
        })
    }

    /// Opens a position.
    ///
    /// # Errors
    ///
    /// `Conflict` if a position is already open at the same market key,
    /// `InvalidRequest` for a non-positive quantity or strike.
    pub fn open(&self, request: OpenRequest) -> Result<Position> {
        if request.quantity <= Decimal::ZERO {
            return Err(DeskError::invalid("quantity must be positive"));
        }
        if request.strike <= Decimal::ZERO {
            return Err(DeskError::invalid("strike must be positive"));
        }

        let key = request.key();
        let mut book = self.book.lock();
        if book.open.iter().any(|p| p.key() == key) {
            return Err(DeskError::conflict(key.currency, key.expiry, key.strike));
        }

        let position = Position {
            id: Uuid::new_v4().to_string(),
            source: request.source,
            currency: key.currency,
            expiry: key.expiry,
            strike: key.strike,
            quantity: request.quantity,
            opened_at: Utc::now(),
            entry_spot: request.entry_spot,
            entry_index: request.entry_index,
            entry_last: request.entry_last,
            call_instrument: request.call_instrument,
            put_instrument: request.put_instrument,
            entry_costs: request.entry_costs,
            basis: request.basis,
            close: None,
        };

        book.open.insert(0, position.clone());
        self.persist(&book);

        info!(
            id = %position.id,
            source = %position.source,
            key = %position.key(),
            quantity = %position.quantity,
            entry_cost = %position.entry_cost(),
            "Opened paper straddle"
        );
        Ok(position)
    }

    /// Closes the open position `id`.
    ///
    /// # Errors
    ///
    /// `NotFound` if no open position has this id.
    pub fn close(&self, id: &str, exit: ExitFill) -> Result<Position> {
        let mut book = self.book.lock();
        let idx = book
            .open
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| DeskError::not_found(id))?;

        let mut position = book.open.remove(idx);
        let cost = position.entry_cost();
        let pnl_usd = exit.exit_value_usd - cost;
        let pnl_pct = if cost.is_zero() {
            Decimal::ZERO
        } else {
            (pnl_usd / cost * Decimal::from(100)).round_dp(4)
        };
        position.close = Some(CloseInfo {
            closed_at: Utc::now(),
            reason: exit.reason,
            exit_spot: exit.exit_spot,
            exit_value_usd: exit.exit_value_usd,
            pnl_usd,
            pnl_pct,
        });

        book.history.insert(0, position.clone());
        book.history.truncate(self.history_cap);
        self.persist(&book);

        info!(
            id = %position.id,
            key = %position.key(),
            reason = %exit.reason,
            pnl_usd = %pnl_usd,
            pnl_pct = %pnl_pct,
            "Closed paper straddle"
        );
        Ok(position)
    }

    #[must_use]
    pub fn list_open(&self) -> Vec<Position> {
        self.book.lock().open.clone()
    }

    /// Closed positions, newest first, up to `limit` if given.
    #[must_use]
    pub fn list_history(&self, limit: Option<usize>) -> Vec<Position> {
        let book = self.book.lock();
        let n = limit.unwrap_or(book.history.len()).min(book.history.len());
        book.history[..n].to_vec()
    }

    #[must_use]
    pub fn get_open(&self, id: &str) -> Option<Position> {
        self.book.lock().open.iter().find(|p| p.id == id).cloned()
    }

    #[must_use]
    pub fn open_count(&self) -> usize {
        self.book.lock().open.len()
    }

    /// True after a failed save, until the next successful one.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    #[must_use]
    pub const fn history_cap(&self) -> usize {
        self.history_cap
    }

    fn persist(&self, book: &Book) {
        match self.store.save(&book.snapshot()) {
            Ok(()) => {
                if self.degraded.swap(false, Ordering::Relaxed) {
                    info!("Ledger persistence recovered");
                }
            }
            Err(e) => {
                self.degraded.store(true, Ordering::Relaxed);
                error!(error = %e, "Ledger save failed, keeping in-memory state");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryLedgerStore;
    use crate::types::{CloseReason, EntryCosts, PricingBasis, PositionSource};
    use rust_decimal_macros::dec;

    fn request(expiry: &str, strike: Decimal) -> OpenRequest {
        OpenRequest {
            source: PositionSource::Manual,
            currency: "BTC".to_string(),
            expiry: expiry.to_string(),
            strike,
            quantity: dec!(0.1),
            entry_spot: 70_000.0,
            entry_index: Some(70_000.0),
            entry_last: Some(70_010.0),
            call_instrument: format!("BTC-{expiry}-{strike}-C"),
            put_instrument: format!("BTC-{expiry}-{strike}-P"),
            entry_costs: EntryCosts {
                ask_usd: dec!(120),
                mid_usd: dec!(110),
                mark_usd: dec!(100),
            },
            basis: PricingBasis::Mark,
        }
    }

    fn exit(value: Decimal) -> ExitFill {
        ExitFill {
            reason: CloseReason::Manual,
            exit_spot: 71_000.0,
            exit_value_usd: value,
        }
    }

    fn ledger(cap: usize) -> (PositionLedger, Arc<MemoryLedgerStore>) {
        let store = Arc::new(MemoryLedgerStore::default());
        let ledger = PositionLedger::load(store.clone(), cap).unwrap();
        (ledger, store)
    }

    #[test]
    fn rejects_second_open_on_same_key() {
        let (ledger, _) = ledger(10);
        ledger.open(request("28MAR25", dec!(70000))).unwrap();

        let err = ledger.open(request("28mar25", dec!(70000.0))).unwrap_err();
        assert!(matches!(err, DeskError::Conflict { .. }));

        ledger.open(request("28MAR25", dec!(71000))).unwrap();
        assert_eq!(ledger.open_count(), 2);
    }

    #[test]
    fn reopen_allowed_after_close() {
        let (ledger, _) = ledger(10);
        let pos = ledger.open(request("28MAR25", dec!(70000))).unwrap();
        ledger.close(&pos.id, exit(dec!(90))).unwrap();
        ledger.open(request("28MAR25", dec!(70000))).unwrap();
    }

    #[test]
    fn close_moves_position_to_history_with_pnl() {
        let (ledger, store) = ledger(10);
        let pos = ledger.open(request("28MAR25", dec!(70000))).unwrap();
        let closed = ledger.close(&pos.id, exit(dec!(130))).unwrap();

        let info = closed.close.unwrap();
        assert_eq!(info.pnl_usd, dec!(30));
        assert_eq!(info.pnl_pct, dec!(30));
        assert_eq!(info.reason, CloseReason::Manual);
        assert!(ledger.list_open().is_empty());
        assert_eq!(ledger.list_history(None).len(), 1);
        assert_eq!(store.save_count(), 2);
    }

    #[test]
    fn close_unknown_id_is_not_found() {
        let (ledger, _) = ledger(10);
        let err = ledger.close("nope", exit(dec!(1))).unwrap_err();
        assert!(matches!(err, DeskError::NotFound { .. }));

        let pos = ledger.open(request("28MAR25", dec!(70000))).unwrap();
        ledger.close(&pos.id, exit(dec!(1))).unwrap();
        assert!(matches!(ledger.close(&pos.id, exit(dec!(1))), Err(DeskError::NotFound { .. })));
    }

    #[test]
    fn history_is_capped_newest_first() {
        let cap = 3;
        let (ledger, _) = ledger(cap);
        let mut ids = Vec::new();
        for i in 0..=cap {
            let strike = Decimal::from(70_000 + i * 1000);
            let pos = ledger.open(request("28MAR25", strike)).unwrap();
            ledger.close(&pos.id, exit(dec!(100))).unwrap();
            ids.push(pos.id);
        }

        let history = ledger.list_history(None);
        assert_eq!(history.len(), cap);
        let expected: Vec<String> = ids.iter().rev().take(cap).cloned().collect();
        assert_eq!(history.iter().map(|p| p.id.clone()).collect::<Vec<_>>(), expected);
        assert_eq!(ledger.list_history(Some(1)).len(), 1);
    }

    #[test]
    fn open_is_newest_first() {
        let (ledger, _) = ledger(10);
        let a = ledger.open(request("28MAR25", dec!(70000))).unwrap();
        let b = ledger.open(request("28MAR25", dec!(71000))).unwrap();
        let open = ledger.list_open();
        assert_eq!(open[0].id, b.id);
        assert_eq!(open[1].id, a.id);
    }

    #[test]
    fn failed_save_keeps_state_and_flags_degraded() {
        let (ledger, store) = ledger(10);
        store.set_fail_saves(true);
        let pos = ledger.open(request("28MAR25", dec!(70000))).unwrap();
        assert!(ledger.is_degraded());
        assert_eq!(ledger.list_open().len(), 1);

        store.set_fail_saves(false);
        ledger.close(&pos.id, exit(dec!(100))).unwrap();
        assert!(!ledger.is_degraded());
        assert_eq!(store.snapshot().unwrap().history.len(), 1);
    }

    #[test]
    fn reload_restores_books() {
        let (ledger, store) = ledger(10);
        let a = ledger.open(request("28MAR25", dec!(70000))).unwrap();
        let b = ledger.open(request("28MAR25", dec!(71000))).unwrap();
        ledger.close(&a.id, exit(dec!(80))).unwrap();

        let reloaded = PositionLedger::load(store, 10).unwrap();
        assert_eq!(reloaded.list_open(), vec![b]);
        assert_eq!(reloaded.list_history(None)[0].id, a.id);
    }

    #[test]
    fn rejects_non_positive_quantity() {
        let (ledger, _) = ledger(10);
        let mut req = request("28MAR25", dec!(70000));
        req.quantity = Decimal::ZERO;
        assert!(matches!(ledger.open(req), Err(DeskError::InvalidRequest(_))));
    }
}
