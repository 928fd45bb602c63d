use super::open_desk;
use gex_desk_core::AppConfig;
use gex_desk_paper::{JsonLedgerStore, Position, PositionLedger};
use std::sync::Arc;

pub async fn positions(
    config: &AppConfig,
    history: usize,
    mark: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    if let Some(currency) = mark {
        let desk = open_desk(config)?;
        let marks = desk.mark_to_market(currency).await?;
        if json {
            println!("{}", serde_json::to_string_pretty(&marks)?);
            return Ok(());
        }
        println!("\n=== {} open positions at spot {:.2} ===", marks.currency, marks.spot);
        println!(
            "{:<22} {:>10} {:>10} {:>10} {:>8}",
            "Key", "Cost", "Value", "P&L", "P&L %"
        );
        for m in &marks.positions {
            match (&m.valuation, &m.error) {
                (Some(v), _) => println!(
                    "{:<22} {:>10} {:>10} {:>10} {:>7}%",
                    m.position.key().to_string(),
                    m.position.entry_cost().to_string(),
                    v.value_usd.to_string(),
                    v.pnl_usd.to_string(),
                    v.pnl_pct.to_string()
                ),
                (None, error) => println!(
                    "{:<22} {:>10}  unavailable: {}",
                    m.position.key().to_string(),
                    m.position.entry_cost().to_string(),
                    error.as_deref().unwrap_or("unknown")
                ),
            }
        }
        println!(
            "Total: cost {}  value {}  P&L {} ({}%)",
            marks.total_cost_usd, marks.total_value_usd, marks.total_pnl_usd, marks.total_pnl_pct
        );
        return Ok(());
    }

    let store = Arc::new(JsonLedgerStore::new(&config.storage.ledger_path));
    let ledger = PositionLedger::load(store, config.storage.history_cap)?;
    let open = ledger.list_open();
    let closed = ledger.list_history(Some(history));

    if json {
        let out = serde_json::json!({ "open": open, "history": closed });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("\n=== Open ({}) ===", open.len());
    print_header();
    for position in &open {
        print_position(position);
    }

    println!("\n=== History (latest {}) ===", closed.len());
    print_header();
    for position in &closed {
        print_position(position);
    }
    Ok(())
}

fn print_header() {
    println!(
        "{:<22} {:<6} {:>6} {:>10} {:<12} {:>10}",
        "Key", "Source", "Qty", "Cost", "Exit", "P&L"
    );
    println!("{}", "-".repeat(72));
}

fn print_position(position: &Position) {
    let (exit, pnl) = position.close.as_ref().map_or_else(
        || ("-".to_string(), "-".to_string()),
        |c| (c.reason.to_string(), c.pnl_usd.to_string()),
    );
    println!(
        "{:<22} {:<6} {:>6} {:>10} {:<12} {:>10}",
        position.key().to_string(),
        position.source.to_string(),
        position.quantity.to_string(),
        position.entry_cost().to_string(),
        exit,
        pnl
    );
}
