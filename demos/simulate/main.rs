use std::time::Duration;

use alloy_primitives::{Address, Bytes};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use tx_simulator::{
    u256_num::{parse_units, NATIVE_DECIMALS},
    SimulationOptions, SimulationRequest, Simulator, SimulatorConfig, TraceStrategy,
};

/// Simulates a transaction against a development node and prints the transfers it causes.
///
/// The node is read from `RPC_URL`, see `SimulatorConfig::from_env`.
#[derive(Parser)]
struct Cli {
    /// Sender of the transaction
    #[arg(long)]
    from: Address,
    /// Recipient of the transaction
    #[arg(long)]
    to: Address,
    /// Value to send, in ether
    #[arg(long, default_value = "0")]
    value: String,
    /// Hex-encoded calldata
    #[arg(long, default_value = "")]
    data: String,
    /// receipt, flat or call_tree. Defaults to the configured strategy
    #[arg(long)]
    strategy: Option<TraceStrategy>,
    /// Abort the simulation after this many seconds
    #[arg(long)]
    timeout: Option<u64>,
    /// Also print the result as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();
    let cli = Cli::parse();

    let config = SimulatorConfig::from_env()?;
    let strategy = cli.strategy.unwrap_or(config.strategy);
    let simulator = Simulator::connect(config).await?;

    let data = hex::decode(cli.data.trim_start_matches("0x"))?;
    let request = SimulationRequest::new(cli.from, cli.to)
        .with_value(parse_units(&cli.value, NATIVE_DECIMALS)?)
        .with_data(Bytes::from(data));

    let cancel = CancellationToken::new();
    let mut options = SimulationOptions::default().with_cancel(cancel.clone());
    if let Some(secs) = cli.timeout {
        options = options.with_deadline(Duration::from_secs(secs));
    }
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let result = simulator
        .simulate_with_options(&request, strategy, &options)
        .await?;

    println!("Transaction {} ({} strategy)", result.tx_hash, result.strategy);
    println!("Gas used: {}", result.gas_used);
    if let Some(estimated) = result.estimated_gas {
        println!("Estimated gas: {estimated}");
    }
    print!("{}", result.summary());
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    }
    Ok(())
}
