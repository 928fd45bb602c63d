use super::open_desk;
use gex_desk_core::{AppConfig, ExpirySelector, SpotSource};
use gex_desk_gex::{ChainSnapshot, CombinedWalls, ExpiryMode, Wall, WallQuery};

pub struct ChainArgs {
    pub currency: String,
    pub expiry: Option<String>,
    pub range: Option<f64>,
    pub walls: Option<usize>,
    pub source: Option<SpotSource>,
    pub json: bool,
}

pub async fn chain(config: &AppConfig, args: ChainArgs) -> anyhow::Result<()> {
    let desk = open_desk(config)?;
    let expiry = args
        .expiry
        .map_or(ExpirySelector::All, |code| ExpirySelector::Code(code.to_ascii_uppercase()));

    let mut request = desk.chain_request(&args.currency, expiry);
    if let Some(range) = args.range {
        request.strike_range_pct = range;
    }
    if let Some(n) = args.walls {
        request.walls_n = n;
    }
    if let Some(source) = args.source {
        request.spot_source = source;
    }

    let snapshot = desk.compute_chain(&request).await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print_chain(&snapshot);
    }
    Ok(())
}

/// Expiry selection from CLI flags; falls back to the bot's configured
/// expiries, then to the nearest one.
pub fn expiry_mode(
    expiries: Vec<String>,
    nearest: Option<usize>,
    dte: Option<(i64, i64)>,
    config: &AppConfig,
) -> ExpiryMode {
    if let Some((min_days, max_days)) = dte {
        return ExpiryMode::DteRange { min_days, max_days };
    }
    if let Some(count) = nearest {
        return ExpiryMode::Nearest { count };
    }
    if !expiries.is_empty() {
        return ExpiryMode::Explicit { codes: expiries };
    }
    if !config.bot.expiries.is_empty() {
        return ExpiryMode::Explicit {
            codes: config.bot.expiries.clone(),
        };
    }
    ExpiryMode::Nearest { count: 1 }
}

pub async fn walls(
    config: &AppConfig,
    currency: &str,
    expiries: ExpiryMode,
    range: Option<f64>,
    walls_n: Option<usize>,
    json: bool,
) -> anyhow::Result<()> {
    let desk = open_desk(config)?;
    let bot = desk.get_bot_config();
    let query = WallQuery {
        currency: currency.to_ascii_uppercase(),
        expiries,
        strike_range_pct: range.unwrap_or(bot.strike_range_pct),
        walls_n: walls_n.unwrap_or(bot.walls_n),
    };

    let combined = desk.compute_walls(&query).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(combined.as_ref())?);
    } else {
        print_combined(&combined);
    }
    Ok(())
}

pub async fn expiries(config: &AppConfig, currency: &str) -> anyhow::Result<()> {
    let desk = open_desk(config)?;
    for code in desk.list_expiries(currency).await? {
        println!("{code}");
    }
    Ok(())
}

fn print_chain(snapshot: &ChainSnapshot) {
    println!("\n=== {} GEX ({:?}) ===", snapshot.currency, snapshot.expiry);
    println!("Spot:       {:.2}", snapshot.spot);
    println!("Regime:     {}", snapshot.regime);
    println!("Gamma flip: {}", fmt_level(snapshot.flip));
    println!("Net GEX:    {:.4}", snapshot.total_gex);
    println!("Rows:       {}", snapshot.rows.len());

    print_walls(&snapshot.walls);

    println!(
        "\nNearest below: {}  above: {}",
        fmt_level(snapshot.nearest.below.map(|w| w.strike)),
        fmt_level(snapshot.nearest.above.map(|w| w.strike)),
    );
    match &snapshot.plan {
        Some(plan) => println!(
            "Plan: {} {}  entry {:.2}  stop {:.2}  target {:.2}  R:R {:.2}",
            plan.setup, plan.bias, plan.entry, plan.stop, plan.target, plan.rr
        ),
        None => println!("Plan: none"),
    }
}

fn print_combined(combined: &CombinedWalls) {
    println!(
        "\n=== {} combined walls ({}) ===",
        combined.currency,
        combined.expiries_used.join(", ")
    );
    if !combined.expiries_skipped.is_empty() {
        println!("Skipped:    {}", combined.expiries_skipped.join(", "));
    }
    println!("Regime:     {}", combined.regime);
    println!("Gamma flip: {}", fmt_level(combined.flip));
    print_walls(&combined.walls);
}

fn print_walls(walls: &[Wall]) {
    println!("\n{:>4}  {:>10}  {:>14}", "Rank", "Strike", "Net GEX");
    println!("{}", "-".repeat(32));
    for wall in walls {
        println!("{:>4}  {:>10}  {:>14.4}", wall.rank, wall.strike.to_string(), wall.net_gex);
    }
}

fn fmt_level(level: Option<rust_decimal::Decimal>) -> String {
    level.map_or_else(|| "-".to_string(), |k| k.to_string())
}
