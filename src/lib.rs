//! tx-simulator: transfer-level simulation of EVM transactions
//!
//! This library executes a transaction for real against a development node (anvil, hardhat or
//! any node exposing `evm_snapshot` / `evm_revert`) and reports every value movement it caused:
//! native currency sent by the transaction and its internal calls, fungible (ERC-20) and
//! non-fungible (ERC-721) token transfers. The node's state is restored afterwards, so a
//! simulation never leaves a trace.
//!
//! Internal native transfers are invisible in receipts. They are reconstructed from either a
//! flat Parity-style trace (`trace_transaction`) or a Geth call tree (`debug_traceTransaction`
//! with the `callTracer`), depending on the chosen [`TraceStrategy`].
//!
//! The entry point is [`Simulator`]:
//!
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use tx_simulator::{models::SimulationRequest, Simulator, SimulatorConfig, TraceStrategy};
//!
//! let config = SimulatorConfig::from_env()?;
//! let simulator = Simulator::connect(config).await?;
//! let request = SimulationRequest::new(
//!     "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266".parse()?,
//!     "0x70997970c51812dc3a010c7d01b50e0d17dc79c8".parse()?,
//! )
//! .with_value(tx_simulator::u256_num::parse_units("1.5", 18)?);
//!
//! let result = simulator
//!     .simulate(&request, TraceStrategy::CallTree)
//!     .await?;
//! println!("{}", result.summary());
//! # Ok(())
//! # }
//! ```

// Reexports
pub use alloy_primitives;

pub mod config;
pub mod errors;
pub mod evm;
pub mod models;
pub mod retry;
pub mod serde_helpers;
pub mod summary;
pub mod u256_num;

pub use config::SimulatorConfig;
pub use errors::SimulationError;
pub use evm::simulation::{SimulationOptions, Simulator};
pub use models::{SimulationRequest, SimulationResult, TraceFallback, TraceStrategy};
pub use summary::TransferSummary;
