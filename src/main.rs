//! Trailing Stop-Loss Manager
//!
//! Polls open positions on a MetaTrader 5 terminal and ratchets each
//! position's stop-loss behind the current price once it is in profit.

mod api;
mod bot;
mod models;
mod trailing;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::api::{BridgeClient, Credentials, DEFAULT_BRIDGE_URL};
use crate::bot::{Bot, BotConfig};
use crate::models::{MarketTick, PositionSide, PositionSnapshot, SymbolInfo};
use crate::trailing::{evaluate, profit_points, ProfitGate, RatchetMode, TrailingConfig};

/// Trailing stop-loss manager CLI.
#[derive(Parser)]
#[command(name = "trailstop")]
#[command(about = "Move stop-losses behind price on open positions", long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    #[command(flatten)]
    trailing: TrailingArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Trailing-stop settings shared by every subcommand.
#[derive(Args)]
struct TrailingArgs {
    /// Distance in points the stop trails behind price
    #[arg(long, env = "TRAIL_DISTANCE", default_value = "4", global = true)]
    trail_distance: Decimal,

    /// Profit that must be exceeded before trailing starts
    #[arg(long, env = "MIN_PROFIT", default_value = "11", global = true)]
    min_profit: Decimal,

    /// Only trail once price has moved one trail distance in favor
    #[arg(long, env = "USE_BREAK_EVEN", default_value_t = true, action = ArgAction::Set, global = true)]
    break_even: bool,

    /// Seconds between poll cycles
    #[arg(long, env = "CHECK_INTERVAL", default_value = "0.5", global = true)]
    interval: f64,

    /// Unit the minimum profit is measured in
    #[arg(long, env = "PROFIT_GATE", value_enum, default_value = "currency", global = true)]
    profit_gate: ProfitGate,

    /// Whether an equal stop counts as an improvement
    #[arg(long, env = "RATCHET", value_enum, default_value = "strict", global = true)]
    ratchet: RatchetMode,

    /// Only move stops that end up beyond the open price
    #[arg(long, env = "LOCK_BEYOND_ENTRY", global = true)]
    lock_beyond_entry: bool,
}

impl TrailingArgs {
    fn to_config(&self) -> TrailingConfig {
        TrailingConfig {
            trail_distance_points: self.trail_distance,
            min_profit: self.min_profit,
            require_break_even: self.break_even,
            poll_interval_secs: self.interval,
            profit_gate: self.profit_gate,
            ratchet: self.ratchet,
            lock_beyond_entry: self.lock_beyond_entry,
        }
    }
}

/// Broker connection settings.
#[derive(Args)]
struct BrokerArgs {
    /// MT5 REST bridge address
    #[arg(long, env = "MT5_BRIDGE_URL", default_value = DEFAULT_BRIDGE_URL)]
    bridge_url: String,

    /// Account login; omit to use the terminal's active session
    #[arg(long, env = "MT5_LOGIN")]
    login: Option<u64>,

    /// Account password
    #[arg(long, env = "MT5_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Broker server name (e.g. "Broker-Demo")
    #[arg(long, env = "MT5_SERVER")]
    server: Option<String>,

    /// Only manage positions in this symbol (repeatable)
    #[arg(short, long = "symbol")]
    symbols: Vec<String>,

    /// Evaluate and log, but don't modify any stops
    #[arg(long)]
    dry_run: bool,
}

impl BrokerArgs {
    fn credentials(&self) -> Credentials {
        Credentials {
            login: self.login,
            password: self.password.clone(),
            server: self.server.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Poll and trail stops until interrupted
    Run {
        #[command(flatten)]
        broker: BrokerArgs,
    },

    /// Run a single poll cycle and exit
    Once {
        #[command(flatten)]
        broker: BrokerArgs,
    },

    /// Show the effective trailing configuration
    Config,

    /// Evaluate a hypothetical position without contacting the broker
    Evaluate {
        /// Position direction
        #[arg(long, value_enum)]
        side: PositionSide,

        /// Open price
        #[arg(long)]
        open: Decimal,

        /// Current bid
        #[arg(long)]
        bid: Decimal,

        /// Current ask
        #[arg(long)]
        ask: Decimal,

        /// Floating profit in account currency
        #[arg(long)]
        profit: Decimal,

        /// Existing stop-loss, if any
        #[arg(long)]
        stop: Option<Decimal>,

        /// Existing take-profit
        #[arg(long, default_value = "0")]
        take_profit: Decimal,

        /// Symbol point size
        #[arg(long, default_value = "0.001")]
        point: Decimal,

        /// Symbol price digits
        #[arg(long, default_value = "3")]
        digits: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .context("Invalid log level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let trailing = cli.trailing.to_config();
    trailing.validate()?;

    match cli.command {
        Commands::Run { broker } => {
            let mut bot = build_bot(&broker, trailing, None)?;

            let handle = bot.shutdown_handle();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Interrupted by user");
                    handle.trigger();
                }
            });

            bot.run().await?;
        }

        Commands::Once { broker } => {
            let mut bot = build_bot(&broker, trailing, Some(1))?;
            bot.run().await?;

            if let Some(report) = bot.last_report() {
                println!("{}", report);
            }
        }

        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&trailing)?);
        }

        Commands::Evaluate {
            side,
            open,
            bid,
            ask,
            profit,
            stop,
            take_profit,
            point,
            digits,
        } => {
            let position = PositionSnapshot {
                ticket: 0,
                symbol: "SIM".to_string(),
                side,
                open_price: open,
                stop_loss: stop,
                take_profit,
                profit,
            };
            if point <= Decimal::ZERO {
                anyhow::bail!("point size must be positive, got {}", point);
            }
            let symbol = SymbolInfo { point, digits };
            let tick = MarketTick { bid, ask };

            match profit_points(&position, &symbol, &tick) {
                Some(points) => println!("Profit in points: {:.2}", points),
                None => println!("Profit in points: out of range for point {}", point),
            }
            println!("Decision: {}", evaluate(&position, &symbol, &tick, &trailing));
        }
    }

    Ok(())
}

fn build_bot(
    args: &BrokerArgs,
    trailing: TrailingConfig,
    max_cycles: Option<u64>,
) -> Result<Bot<BridgeClient>> {
    let client = BridgeClient::new(&args.bridge_url)?;
    info!(bridge = %client.base_url(), dry_run = args.dry_run, "Using MT5 bridge");
    let config = BotConfig {
        trailing,
        credentials: args.credentials(),
        symbols: args.symbols.clone(),
        dry_run: args.dry_run,
        max_cycles,
    };
    Bot::new(client, config)
}
