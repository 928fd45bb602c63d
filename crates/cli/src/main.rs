use clap::{Parser, Subcommand};
use gex_desk_core::SpotSource;

mod commands;

#[derive(Parser)]
#[command(name = "gex-desk")]
#[command(about = "Gamma-exposure walls and a paper straddle bot for Deribit options", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, global = true, default_value = "config/Config.toml", env = "GEX_DESK_CONFIG")]
    config: String,

    /// Profile overlay, read from Config.<profile>.toml next to the config file
    #[arg(short, long, global = true, env = "GEX_DESK_PROFILE")]
    profile: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the paper-trading control loop until Ctrl-C
    Run {
        /// Append logs to this file instead of stderr
        #[arg(long)]
        log_file: Option<String>,
    },
    /// One-shot exposure snapshot for a single expiry (or all)
    Chain {
        /// Underlying currency
        #[arg(long, default_value = "BTC")]
        currency: String,
        /// Expiry code such as 28MAR25; omit for every listed expiry
        #[arg(long)]
        expiry: Option<String>,
        /// Strike window around spot, in percent
        #[arg(long)]
        range: Option<f64>,
        /// Number of walls to rank
        #[arg(long)]
        walls: Option<usize>,
        /// Spot source
        #[arg(long)]
        source: Option<SpotSource>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// One-shot combined walls across several expiries
    Walls {
        #[arg(long, default_value = "BTC")]
        currency: String,
        /// Explicit expiry codes, comma separated
        #[arg(long, value_delimiter = ',', conflicts_with_all = ["nearest", "dte_min"])]
        expiries: Vec<String>,
        /// Use the N nearest expiries
        #[arg(long)]
        nearest: Option<usize>,
        /// Minimum days to expiry (with --dte-max)
        #[arg(long, requires = "dte_max")]
        dte_min: Option<i64>,
        /// Maximum days to expiry (with --dte-min)
        #[arg(long, requires = "dte_min")]
        dte_max: Option<i64>,
        #[arg(long)]
        range: Option<f64>,
        #[arg(long)]
        walls: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Active expiry codes, nearest first
    Expiries {
        #[arg(long, default_value = "BTC")]
        currency: String,
    },
    /// Open positions and closed history from the ledger file
    Positions {
        /// Number of history entries to show
        #[arg(long, default_value_t = 20)]
        history: usize,
        /// Value open positions at live quotes for this currency
        #[arg(long)]
        mark: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Show or change the persisted bot configuration
    Bot {
        #[command(subcommand)]
        action: commands::BotAction,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Run {
            log_file: Some(path),
        } => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        _ => {
            tracing_subscriber::fmt().with_env_filter(env_filter()).init();
        }
    }

    let config = match &cli.profile {
        Some(profile) => gex_desk_core::ConfigLoader::load_with_profile(&cli.config, profile)?,
        None => gex_desk_core::ConfigLoader::load_from(&cli.config)?,
    };

    match cli.command {
        Commands::Run { .. } => commands::run(&config).await?,
        Commands::Chain {
            currency,
            expiry,
            range,
            walls,
            source,
            json,
        } => {
            let args = commands::ChainArgs {
                currency,
                expiry,
                range,
                walls,
                source,
                json,
            };
            commands::chain(&config, args).await?;
        }
        Commands::Walls {
            currency,
            expiries,
            nearest,
            dte_min,
            dte_max,
            range,
            walls,
            json,
        } => {
            let mode = commands::expiry_mode(expiries, nearest, dte_min.zip(dte_max), &config);
            commands::walls(&config, &currency, mode, range, walls, json).await?;
        }
        Commands::Expiries { currency } => commands::expiries(&config, &currency).await?,
        Commands::Positions { history, mark, json } => {
            commands::positions(&config, history, mark.as_deref(), json).await?;
        }
        Commands::Bot { action } => commands::bot(&config, action)?,
    }

    Ok(())
}

fn env_filter() -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
}
