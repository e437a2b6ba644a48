//! Operator node for quorum-settled auctions.
//!
//! This binary registers an operator with the chain and runs the settlement
//! pipeline:
//! - Watching for settlement tasks
//! - Resolving sealed bids and voting on the winner set

use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use auction_operator::config::parse_address;
use auction_operator::{ChainClient, OperatorConfig, OperatorService, RpcChainClient, RpcResolver};

#[derive(Parser)]
#[command(name = "operator")]
#[command(about = "Auction settlement operator node")]
struct Cli {
    /// Operator address (hex, 32 bytes)
    #[arg(long)]
    address: String,

    /// Mock chain RPC endpoint
    #[arg(long, default_value = "http://127.0.0.1:9944")]
    rpc: String,

    /// Event poll interval in milliseconds
    #[arg(long, default_value = "2000")]
    poll_interval_ms: u64,

    /// Extra resolution attempts per bid
    #[arg(long, default_value = "2")]
    resolve_retries: u32,

    /// Seconds to wait for a task to complete after responding
    #[arg(long, default_value = "60")]
    completion_timeout_secs: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register as an operator, bonding stake
    Register {
        #[arg(long)]
        stake: u64,
    },

    /// Leave the operator set and withdraw remaining stake
    Deregister,

    /// Watch for settlement tasks and respond to each
    Watch,

    /// Respond to a single task and wait for it to complete
    Respond {
        #[arg(long)]
        task_id: u64,
    },

    /// Print this operator's registry entry
    Status,
}

impl Cli {
    fn config(&self) -> Result<OperatorConfig> {
        let address = parse_address(&self.address).map_err(|e| anyhow!("--address: {}", e))?;
        Ok(OperatorConfig {
            address,
            rpc_endpoint: self.rpc.clone(),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            resolve_retries: self.resolve_retries,
            completion_timeout: Duration::from_secs(self.completion_timeout_secs),
            ..Default::default()
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("operator=info".parse()?)
                .add_directive("auction_operator=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.config()?;

    let chain = RpcChainClient::new(&config.rpc_endpoint)?;
    let resolver = RpcResolver::new(chain.inner().clone());

    match cli.command {
        Commands::Register { stake } => {
            chain.register(&config.address, stake).await?;
            info!("Registered operator {} with stake {}", cli.address, stake);
        }

        Commands::Deregister => {
            let refund = chain.deregister(&config.address).await?;
            info!("Deregistered operator {}, refunded {}", cli.address, refund);
        }

        Commands::Watch => {
            let mut service = OperatorService::new(config, chain, resolver);
            service.run().await?;
        }

        Commands::Respond { task_id } => {
            let service = OperatorService::new(config, chain, resolver);
            match service.process_task(task_id).await? {
                Some(submission) => {
                    let matched = service
                        .await_completion(task_id, &submission.commitment)
                        .await?;
                    info!("Task {} completed, commitment matched: {}", task_id, matched);
                }
                None => info!("Task {} already completed", task_id),
            }
        }

        Commands::Status => match chain.operator(&config.address).await? {
            Some(op) => println!("{}", serde_json::to_string_pretty(&op)?),
            None => println!("Operator {} is not registered", cli.address),
        },
    }

    Ok(())
}
