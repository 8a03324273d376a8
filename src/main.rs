//! VRF Shootout CLI
//!
//! Plays penalty rounds against the in-process devnet.

use clap::{Parser, Subcommand};
use rand::seq::SliceRandom;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use vrf_shootout::{
    config::{ConfigLoader, ShootoutConfig},
    errors::ShootoutResult,
    DevnetChain, GameSession, Position, RequestCoordinator,
};

/// Verifiable-randomness penalty shootout
#[derive(Parser)]
#[command(name = "vrf-shootout")]
#[command(about = "Penalty shootout driven by verifiable on-chain randomness")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Play one round
    Play {
        /// Keeper position: left, center or right
        #[arg(short, long)]
        keeper: Position,

        /// Override the callback gas limit
        #[arg(short, long)]
        gas_limit: Option<u64>,

        /// Print the round record as JSON
        #[arg(long)]
        json: bool,
    },

    /// Request a raw random number
    Random {
        /// Override the callback gas limit
        #[arg(short, long)]
        gas_limit: Option<u64>,
    },

    /// Play many rounds and report the save rate and shot distribution
    Simulate {
        /// Number of rounds
        #[arg(short, long, default_value = "100")]
        rounds: usize,

        /// Keeper position; random each round when omitted
        #[arg(short, long)]
        keeper: Option<Position>,
    },
}

#[tokio::main]
async fn main() -> ShootoutResult<()> {
    let cli = Cli::parse();

    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_path(path);
    }
    let mut config = loader.load()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Play { keeper, gas_limit, json } => {
            apply_gas_limit(&mut config, gas_limit);
            play(&config, keeper, json).await
        }
        Commands::Random { gas_limit } => {
            apply_gas_limit(&mut config, gas_limit);
            random(&config).await
        }
        Commands::Simulate { rounds, keeper } => simulate(&config, rounds, keeper).await,
    }
}

fn apply_gas_limit(config: &mut ShootoutConfig, gas_limit: Option<u64>) {
    if let Some(gas_limit) = gas_limit {
        config.request.callback_gas_limit = gas_limit;
    }
}

async fn play(config: &ShootoutConfig, keeper: Position, json: bool) -> ShootoutResult<()> {
    let chain = DevnetChain::new(config.devnet.clone());
    let session = GameSession::new(chain.collaborators(), &config.request);

    session.commit(keeper)?;
    let outcome = match session.shoot().await {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("{}", e.user_message());
            return Err(e.into());
        }
    };

    match session.round_record() {
        Some(record) if json => println!("{}", serde_json::to_string_pretty(&record)?),
        Some(record) => {
            println!("{}!", record.verdict);
            println!("  Shot:       {}", record.shot);
            println!("  Keeper:     {}", record.keeper);
            println!("  Randomness: {}", record.randomness);
            println!("  Paid:       {} wei", record.request.price);
            println!("  Tx:         {}", record.request.transaction_handle);
        }
        None => println!("{}!", outcome.verdict()),
    }

    if let Some(delivery) = chain.latest_delivery().await {
        tracing::debug!(
            "Delivery proof for {} verifies: {}",
            delivery.handle,
            chain.verify_delivery(&delivery)
        );
    }
    Ok(())
}

async fn random(config: &ShootoutConfig) -> ShootoutResult<()> {
    let chain = DevnetChain::new(config.devnet.clone());
    let mut coordinator = RequestCoordinator::new(chain.collaborators());

    let (request, value) = coordinator
        .request_randomness(config.request.callback_gas_limit)
        .await?;

    println!("Random number: {}", value.to_decimal_string());
    println!("  Hex: {}", value.to_hex());
    println!("  Tx:  {}", request.transaction_handle);
    Ok(())
}

async fn simulate(config: &ShootoutConfig, rounds: usize, keeper: Option<Position>) -> ShootoutResult<()> {
    let chain = DevnetChain::new(config.devnet.clone());
    let session = GameSession::new(chain.collaborators(), &config.request);
    let mut rng = rand::thread_rng();

    let mut saves = 0usize;
    let mut shots = [0usize; 3];
    for round in 0..rounds {
        session.reset();
        let choice = match keeper {
            Some(position) => position,
            None => *Position::ALL.choose(&mut rng).unwrap_or(&Position::Center),
        };
        session.commit(choice)?;

        let outcome = session.shoot().await?;
        shots[outcome.position.index()] += 1;
        if outcome.is_match {
            saves += 1;
        }
        tracing::debug!("Round {}: keeper {}, {}", round + 1, choice, outcome.verdict());
    }

    println!("Rounds played: {}", rounds);
    if rounds > 0 {
        println!(
            "Saves: {} ({:.1}%)",
            saves,
            saves as f64 * 100.0 / rounds as f64
        );
        println!("Shot distribution:");
        for position in Position::ALL {
            let count = shots[position.index()];
            println!(
                "  {:<6} {:>6} ({:.1}%)",
                position.to_string(),
                count,
                count as f64 * 100.0 / rounds as f64
            );
        }
    }
    println!("Final balance: {} wei", chain.balance().await);
    Ok(())
}
